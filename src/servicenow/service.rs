use crate::config::ServiceNowConfig;
use crate::http::{ApiClient, Endpoint, HttpError, HttpMethod, HttpRequest, HttpResult};
use crate::oauth::service::{OAuthError, TokenManager};
use crate::servicenow::demo::demo_incident;
use crate::servicenow::model::{
    CredentialCheck, IncidentDetails, IncidentLookupResponse, IncidentNumber, TrtCallRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const INCIDENT_FIELDS: &str = "number,short_description,state,priority,assigned_to,sys_id";
const CREDENTIAL_CHECK_FIELDS: &str = "number,short_description";
const LEGACY_TRT_PATH: &str = "/api/x_tr_trt/trigger_call";

#[derive(Error, Debug)]
pub enum ServiceNowError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("ServiceNow API error: {status_code}")]
    Status { status_code: u16, body: String },
    #[error("unexpected ServiceNow response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
}

pub struct ServiceNowClient {
    api: Arc<ApiClient>,
    config: ServiceNowConfig,
    tokens: Option<Arc<TokenManager>>,
}

impl ServiceNowClient {
    pub fn new(api: Arc<ApiClient>, config: ServiceNowConfig, tokens: Option<Arc<TokenManager>>) -> Self {
        ServiceNowClient { api, config, tokens }
    }

    /// Looks the incident up through the scoped API, then the Table API.
    /// Transport failures yield the demo record instead when demo fallback is enabled.
    pub async fn get_incident(
        &self,
        number: &IncidentNumber,
    ) -> Result<Option<IncidentDetails>, ServiceNowError> {
        match self.lookup(number).await {
            Err(ServiceNowError::Http(error)) if error.is_transport() && self.config.demo_fallback => {
                warn!(%number, %error, "ServiceNow unreachable, serving demo record");
                Ok(demo_incident(number))
            }
            other => other,
        }
    }

    async fn lookup(&self, number: &IncidentNumber) -> Result<Option<IncidentDetails>, ServiceNowError> {
        let scoped = self
            .send(
                Endpoint::new(HttpMethod::GET, self.scoped_url(&format!("incident/{number}"))),
                None,
            )
            .await?;
        if scoped.is_success() {
            match scoped.json::<IncidentLookupResponse>() {
                Ok(response) => {
                    if let Some(incident) = response.result.into_iter().next() {
                        info!(%number, "incident found through scoped API");
                        return Ok(Some(incident));
                    }
                }
                Err(error) => debug!(%number, %error, "scoped API returned an unexpected body"),
            }
        }

        info!(%number, status_code = scoped.status_code, "falling back to table API");
        let table = self
            .send(
                Endpoint::new(HttpMethod::GET, self.table_url("incident"))
                    .query("sysparm_query", format!("number={number}"))
                    .query("sysparm_fields", INCIDENT_FIELDS),
                None,
            )
            .await?;
        if !table.is_success() {
            warn!(%number, status_code = table.status_code, "table API lookup failed");
            return Err(ServiceNowError::Status {
                status_code: table.status_code,
                body: table.body,
            });
        }
        let response: IncidentLookupResponse = table.json()?;
        Ok(response.result.into_iter().next())
    }

    /// `true` as soon as either TRT endpoint accepts the call; any error counts as not triggered.
    pub async fn trigger_trt_call(&self, number: &IncidentNumber) -> bool {
        let payload = match serde_json::to_string(&TrtCallRequest::major_incident(number)) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%number, %error, "could not encode TRT payload");
                return false;
            }
        };
        let targets = [
            self.scoped_url("trt_call"),
            format!("{}{}", self.config.instance_url, LEGACY_TRT_PATH),
        ];
        for url in targets {
            match self
                .send(Endpoint::new(HttpMethod::POST, url.clone()), Some(payload.clone()))
                .await
            {
                Ok(result) if result.is_success() => {
                    info!(%number, %url, "TRT call triggered");
                    return true;
                }
                Ok(result) => {
                    info!(%number, %url, status_code = result.status_code, "TRT endpoint declined");
                }
                Err(error) => {
                    warn!(%number, %url, %error, "TRT call failed");
                    return false;
                }
            }
        }
        false
    }

    pub async fn check_credentials(&self) -> Result<CredentialCheck, ServiceNowError> {
        let result = self
            .send(
                Endpoint::new(HttpMethod::GET, self.table_url("incident"))
                    .query("sysparm_limit", "1")
                    .query("sysparm_fields", CREDENTIAL_CHECK_FIELDS),
                None,
            )
            .await?;
        let check = match result.status_code {
            401 => CredentialCheck::Unauthorized,
            403 => CredentialCheck::Forbidden,
            _ if result.is_success() => {
                let response: IncidentLookupResponse = result.json()?;
                CredentialCheck::Valid {
                    incidents_visible: response.result.len(),
                }
            }
            status_code => CredentialCheck::Failed {
                status_code,
                body: result.body,
            },
        };
        info!(?check, "credential check finished");
        Ok(check)
    }

    /// Sends with the current credentials. A 401 on a bearer token refreshes it and retries once.
    async fn send(&self, endpoint: Endpoint, body: Option<String>) -> Result<HttpResult, ServiceNowError> {
        let endpoint = endpoint
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        let bearer = match &self.tokens {
            Some(tokens) => tokens.access_token().await?,
            None => None,
        };
        let result = self
            .api
            .execute(HttpRequest::new(self.authorize(endpoint.clone(), bearer.clone()), body.clone()))
            .await?;

        if let (401, Some(rejected), Some(tokens)) = (result.status_code, bearer, &self.tokens) {
            if tokens.can_refresh().await {
                info!("ServiceNow rejected the access token, refreshing and retrying");
                tokens.refresh_rejected(&rejected).await?;
                let bearer = tokens.access_token().await?;
                let retried = self
                    .api
                    .execute(HttpRequest::new(self.authorize(endpoint, bearer), body))
                    .await?;
                return Ok(retried);
            }
        }
        Ok(result)
    }

    fn authorize(&self, endpoint: Endpoint, bearer: Option<String>) -> Endpoint {
        match bearer {
            Some(token) => endpoint.header("Authorization", format!("Bearer {token}")),
            None => endpoint.headers(self.config.credentials.headers()),
        }
    }

    fn scoped_url(&self, path: &str) -> String {
        format!(
            "{}/api/{}/actr1_incident/{}",
            self.config.instance_url, self.config.scope_id, path
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.config.instance_url, self.config.table_api, table)
    }
}
