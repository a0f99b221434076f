use crate::api::{ApiResponse, AppError, AppState};
use crate::oauth::model::{AuthStatus, CallbackParams};
use axum::extract::{Query, State};
use axum::response::Redirect;
use tracing::info;

pub async fn authorize(State(app_state): State<AppState>) -> Result<Redirect, AppError> {
    let url = app_state.tokens()?.authorize_url()?;
    info!("redirecting to ServiceNow consent page");
    Ok(Redirect::to(url.as_str()))
}

pub async fn callback(
    State(app_state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<ApiResponse<AuthStatus>, AppError> {
    let status = app_state.tokens()?.complete(params).await?;
    Ok(ApiResponse(status))
}

pub async fn status(State(app_state): State<AppState>) -> Result<ApiResponse<AuthStatus>, AppError> {
    let status = app_state.tokens()?.status().await;
    Ok(ApiResponse(status))
}
