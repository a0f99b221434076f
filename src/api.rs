use crate::config::Config;
use crate::cors::{attach_cors, CorsPolicy};
use crate::http::{ApiClient, HttpError};
use crate::oauth;
use crate::oauth::service::{OAuthError, TokenManager};
use crate::proxy;
use crate::proxy::service::UpstreamGuard;
use crate::servicenow;
use crate::servicenow::service::{ServiceNowClient, ServiceNowError};
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::map_response_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

const BODY_LIMIT: usize = 5 * 1024 * 1024;
pub const INVOKE_PATH: &str = "/2015-03-31/functions/function/invocations";

#[derive(Clone)]
pub struct AppState {
    pub api_client: Arc<ApiClient>,
    pub cors: Arc<CorsPolicy>,
    pub guard: Arc<UpstreamGuard>,
    pub servicenow: Arc<ServiceNowClient>,
    pub tokens: Option<Arc<TokenManager>>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, HttpError> {
        let api_client = Arc::new(ApiClient::new(config.upstream_timeout)?);
        let tokens = config.oauth.clone().map(|oauth| {
            Arc::new(TokenManager::new(
                api_client.clone(),
                oauth,
                config.servicenow.instance_url.clone(),
            ))
        });
        let servicenow = ServiceNowClient::new(api_client.clone(), config.servicenow.clone(), tokens.clone());
        Ok(AppState {
            api_client,
            cors: Arc::new(CorsPolicy::new(&config.allowed_origin)),
            guard: Arc::new(UpstreamGuard::new(config.upstream_hosts.clone())),
            servicenow: Arc::new(servicenow),
            tokens,
        })
    }

    pub fn tokens(&self) -> Result<&TokenManager, AppError> {
        self.tokens
            .as_deref()
            .ok_or_else(|| AppError::NotConfigured("OAuth is not configured".to_string()))
    }
}

pub fn build_api(app_state: AppState) -> Router {
    Router::new()
        .route("/", post(proxy::api::relay_request).options(proxy::api::relay_request))
        .route(INVOKE_PATH, post(proxy::api::invoke_function))
        .route("/incidents/:number", get(servicenow::api::get_incident))
        .route("/incidents/:number/trt-call", post(servicenow::api::trigger_trt_call))
        .route("/servicenow/credentials", get(servicenow::api::check_credentials))
        .route("/oauth/authorize", get(oauth::api::authorize))
        .route("/oauth/callback", get(oauth::api::callback))
        .route("/oauth/status", get(oauth::api::status))
        .layer(map_response_with_state(app_state.cors.clone(), attach_cors))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new().include_headers(false))
            .on_request(
                DefaultOnRequest::new()
                    .level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Micros)
            ))
        .with_state(app_state)
}

pub struct ApiResponse<T>(pub T);

impl<T> ApiResponse<T> {
    pub fn from(result: Result<T, AppError>) -> Result<ApiResponse<T>, AppError> {
        result.map(ApiResponse)
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.0)).into_response()
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    NotConfigured(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl From<ServiceNowError> for AppError {
    fn from(error: ServiceNowError) -> Self {
        match error {
            ServiceNowError::OAuth(error) => AppError::from(error),
            ServiceNowError::Status { status_code, .. } => {
                AppError::Upstream(format!("ServiceNow API error: {status_code}"))
            }
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::Denied(_) | OAuthError::NoRefreshToken => AppError::Unauthorized(error.to_string()),
            OAuthError::MissingCode | OAuthError::InvalidState => AppError::Validation(error.to_string()),
            OAuthError::TokenEndpoint { .. } | OAuthError::Http(_) | OAuthError::Decode(_) => {
                AppError::Upstream(error.to_string())
            }
            OAuthError::Url(_) => AppError::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = match self {
            AppError::Internal(message) => {
                tracing::error!("{}", message);
                "Internal server error".to_string()
            }
            other => {
                tracing::warn!(status = status.as_u16(), error = %other, "request failed");
                other.to_string()
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
