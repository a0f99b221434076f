use crate::api::{ApiResponse, AppError, AppState};
use crate::servicenow::model::{CredentialCheck, IncidentNumber, IncidentView, TrtCallResult};
use axum::extract::{Path, State};
use std::str::FromStr;

pub async fn get_incident(
    Path(number): Path<String>,
    State(app_state): State<AppState>,
) -> Result<ApiResponse<IncidentView>, AppError> {
    let number = parse_number(&number)?;
    match app_state.servicenow.get_incident(&number).await? {
        Some(incident) => Ok(ApiResponse(incident.into())),
        None => Err(AppError::NotFound(format!("No incident found with number: {number}"))),
    }
}

pub async fn trigger_trt_call(
    Path(number): Path<String>,
    State(app_state): State<AppState>,
) -> Result<ApiResponse<TrtCallResult>, AppError> {
    let number = parse_number(&number)?;
    if !app_state.servicenow.trigger_trt_call(&number).await {
        return Err(AppError::Upstream(
            "Failed to trigger TRT call. Please try again or contact support.".to_string(),
        ));
    }
    Ok(ApiResponse(TrtCallResult {
        incident_number: number.to_string(),
        triggered: true,
        message: format!(
            "TRT call successfully triggered for incident {number}. Emergency response team has been notified."
        ),
    }))
}

pub async fn check_credentials(
    State(app_state): State<AppState>,
) -> Result<ApiResponse<CredentialCheck>, AppError> {
    let result = app_state.servicenow.check_credentials().await;
    ApiResponse::from(result.map_err(AppError::from))
}

fn parse_number(raw: &str) -> Result<IncidentNumber, AppError> {
    IncidentNumber::from_str(&IncidentNumber::normalize(raw)).map_err(AppError::Validation)
}
