use crate::api::AppState;
use crate::proxy::gateway::handle_event;
use crate::proxy::model::{GatewayEvent, GatewayResponse, ProxyOutcome};
use crate::proxy::service::relay;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::Json;

pub async fn relay_request(
    State(app_state): State<AppState>,
    method: Method,
    body: Bytes,
) -> ProxyOutcome {
    relay(&app_state.api_client, &app_state.guard, method.as_str(), &body).await
}

pub async fn invoke_function(
    State(app_state): State<AppState>,
    Json(event): Json<GatewayEvent>,
) -> Json<GatewayResponse> {
    let response = handle_event(
        &app_state.api_client,
        &app_state.guard,
        &app_state.cors,
        event,
    )
    .await;
    Json(response)
}
