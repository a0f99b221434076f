use crate::cors::CorsPolicy;
use crate::http::ApiClient;
use crate::proxy::model::{GatewayEvent, GatewayResponse, ProxyOutcome};
use crate::proxy::service::{relay, UpstreamGuard};
use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

/// Runs a serverless function event through the shared relay and renders the platform response.
pub async fn handle_event(
    client: &ApiClient,
    guard: &UpstreamGuard,
    cors: &CorsPolicy,
    event: GatewayEvent,
) -> GatewayResponse {
    let method = event.method().to_string();
    let raw_body = match decode_body(&event) {
        Ok(body) => body,
        Err(details) => {
            warn!(%details, "event body is not valid base64");
            let outcome = ProxyOutcome::failure(
                StatusCode::BAD_REQUEST,
                "Invalid JSON in request body",
                Some(details),
            );
            return render(cors, outcome);
        }
    };
    let outcome = relay(client, guard, &method, &raw_body).await;
    render(cors, outcome)
}

fn decode_body(event: &GatewayEvent) -> Result<Vec<u8>, String> {
    match &event.body {
        None => Ok(vec![]),
        Some(body) if event.is_base64_encoded => STANDARD.decode(body).map_err(|e| e.to_string()),
        Some(body) => Ok(body.as_bytes().to_vec()),
    }
}

fn render(cors: &CorsPolicy, outcome: ProxyOutcome) -> GatewayResponse {
    let mut headers = cors.to_map();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    GatewayResponse {
        status_code: outcome.status.as_u16(),
        body: outcome.body_text(),
        headers,
        is_base64_encoded: false,
    }
}
