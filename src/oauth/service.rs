use crate::config::OAuthConfig;
use crate::http::{ApiClient, Endpoint, HttpError, HttpMethod, HttpRequest};
use crate::oauth::model::{AuthStatus, CallbackParams, OAuthToken, PendingStates, StoredToken};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use url::form_urlencoded;
use url::Url;

const AUTHORIZE_PATH: &str = "/oauth_auth.do";
const TOKEN_PATH: &str = "/oauth_token.do";
/// How long an authorization state waits for its callback.
pub const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("authorization code missing from callback")]
    MissingCode,
    #[error("unknown or already used state")]
    InvalidState,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("token endpoint answered {status_code}")]
    TokenEndpoint { status_code: u16, body: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("token response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid instance url: {0}")]
    Url(#[from] url::ParseError),
}

enum Held {
    Missing,
    Fresh(String),
    Stale { refreshable: bool },
}

/// Holds the relay's ServiceNow token and runs the authorization-code flow on its behalf.
pub struct TokenManager {
    api: Arc<ApiClient>,
    config: OAuthConfig,
    instance_url: String,
    token: RwLock<Option<StoredToken>>,
    pending_states: PendingStates,
    /// Serializes refresh grants so concurrent callers share one exchange.
    refreshing: Mutex<()>,
}

impl TokenManager {
    pub fn new(api: Arc<ApiClient>, config: OAuthConfig, instance_url: impl Into<String>) -> Self {
        Self::with_state_ttl(api, config, instance_url, STATE_TTL)
    }

    pub fn with_state_ttl(
        api: Arc<ApiClient>,
        config: OAuthConfig,
        instance_url: impl Into<String>,
        state_ttl: Duration,
    ) -> Self {
        TokenManager {
            api,
            config,
            instance_url: instance_url.into(),
            token: RwLock::new(None),
            pending_states: PendingStates::new(state_ttl),
            refreshing: Mutex::new(()),
        }
    }

    /// Builds the consent URL; the embedded state is accepted once by [`Self::complete`] within the state ttl.
    pub fn authorize_url(&self) -> Result<Url, OAuthError> {
        let state = uuid::Uuid::new_v4().to_string();
        let mut url = Url::parse(&format!("{}{}", self.instance_url, AUTHORIZE_PATH))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", &state);
        self.pending_states.insert(state);
        Ok(url)
    }

    pub async fn complete(&self, params: CallbackParams) -> Result<AuthStatus, OAuthError> {
        if let Some(error) = params.error {
            let reason = match params.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            warn!(%reason, "authorization denied by provider");
            return Err(OAuthError::Denied(reason));
        }
        let code = params.code.ok_or(OAuthError::MissingCode)?;
        let state = params.state.ok_or(OAuthError::InvalidState)?;
        if !self.pending_states.claim(&state) {
            return Err(OAuthError::InvalidState);
        }

        let token = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;
        info!(token_type = %token.token_type, expires_in = token.expires_in, "authorization code exchanged");
        let stored = StoredToken::new(token);
        let status = AuthStatus::from_stored(&stored, Instant::now());
        *self.token.write().await = Some(stored);
        Ok(status)
    }

    pub async fn refresh(&self) -> Result<(), OAuthError> {
        let _refreshing = self.refreshing.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes after ServiceNow rejected `rejected`, unless a concurrent caller already replaced it.
    pub async fn refresh_rejected(&self, rejected: &str) -> Result<(), OAuthError> {
        let _refreshing = self.refreshing.lock().await;
        let current = self
            .token
            .read()
            .await
            .as_ref()
            .map(|stored| stored.token.access_token.clone());
        if current.as_deref() != Some(rejected) {
            info!("access token already replaced, skipping refresh");
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Current access token, refreshed first when it is stale and a refresh token is held.
    pub async fn access_token(&self) -> Result<Option<String>, OAuthError> {
        match self.held().await {
            Held::Missing | Held::Stale { refreshable: false } => return Ok(None),
            Held::Fresh(token) => return Ok(Some(token)),
            Held::Stale { refreshable: true } => {}
        }
        let _refreshing = self.refreshing.lock().await;
        match self.held().await {
            Held::Missing | Held::Stale { refreshable: false } => Ok(None),
            Held::Fresh(token) => Ok(Some(token)),
            Held::Stale { refreshable: true } => {
                self.refresh_locked().await?;
                Ok(self
                    .token
                    .read()
                    .await
                    .as_ref()
                    .map(|stored| stored.token.access_token.clone()))
            }
        }
    }

    pub async fn can_refresh(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|stored| stored.token.refresh_token.is_some())
    }

    pub async fn status(&self) -> AuthStatus {
        match self.token.read().await.as_ref() {
            Some(stored) => AuthStatus::from_stored(stored, Instant::now()),
            None => AuthStatus::unauthenticated(),
        }
    }

    #[cfg(test)]
    pub(crate) async fn install(&self, token: OAuthToken) {
        *self.token.write().await = Some(StoredToken::new(token));
    }

    async fn held(&self) -> Held {
        match self.token.read().await.as_ref() {
            None => Held::Missing,
            Some(stored) if !stored.is_expired(Instant::now()) => {
                Held::Fresh(stored.token.access_token.clone())
            }
            Some(stored) => Held::Stale {
                refreshable: stored.token.refresh_token.is_some(),
            },
        }
    }

    /// Callers hold `refreshing`. A refresh token the instance rejects is dropped with its access token.
    async fn refresh_locked(&self) -> Result<(), OAuthError> {
        let refresh_token = self
            .token
            .read()
            .await
            .as_ref()
            .and_then(|stored| stored.token.refresh_token.clone())
            .ok_or(OAuthError::NoRefreshToken)?;
        let result = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await;
        let mut token = match result {
            Ok(token) => token,
            Err(error @ OAuthError::TokenEndpoint { .. }) => {
                warn!(%error, "refresh token rejected, clearing stored token");
                *self.token.write().await = None;
                return Err(error);
            }
            Err(error) => return Err(error),
        };
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }
        info!(expires_in = token.expires_in, "access token refreshed");
        *self.token.write().await = Some(StoredToken::new(token));
        Ok(())
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<OAuthToken, OAuthError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(grant.iter().copied())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .finish();
        let endpoint = Endpoint::new(HttpMethod::POST, format!("{}{}", self.instance_url, TOKEN_PATH))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json");
        let result = self.api.execute(HttpRequest::new(endpoint, Some(body))).await?;
        if !result.is_success() {
            warn!(status_code = result.status_code, "token endpoint rejected grant");
            return Err(OAuthError::TokenEndpoint {
                status_code: result.status_code,
                body: result.body,
            });
        }
        Ok(result.json()?)
    }
}
