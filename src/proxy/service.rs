use crate::http::{ApiClient, Endpoint, HttpMethod, HttpRequest};
use crate::proxy::model::{ProxyOutcome, ProxyRequest};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_METHOD: HttpMethod = HttpMethod::POST;
const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const DEFAULT_ACCEPT: &str = "application/json";

/// Restricts which hosts the relay forwards to. An empty list allows every host.
#[derive(Clone, Debug, Default)]
pub struct UpstreamGuard {
    hosts: Vec<String>,
}

impl UpstreamGuard {
    pub fn new(hosts: Vec<String>) -> Self {
        UpstreamGuard {
            hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        url.host_str()
            .map(|host| self.hosts.iter().any(|allowed| allowed == &host.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Upstream bodies that are not JSON are wrapped as `{"data": <text>}`.
pub fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "data": text }))
}

/// Single forwarding routine shared by every hosting adapter.
pub async fn relay(
    client: &ApiClient,
    guard: &UpstreamGuard,
    incoming_method: &str,
    raw_body: &[u8],
) -> ProxyOutcome {
    if incoming_method.eq_ignore_ascii_case("OPTIONS") {
        return ProxyOutcome::preflight();
    }

    let request: ProxyRequest = if raw_body.iter().all(u8::is_ascii_whitespace) {
        ProxyRequest::default()
    } else {
        match serde_json::from_slice(raw_body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejecting unparsable proxy request");
                return ProxyOutcome::failure(
                    StatusCode::BAD_REQUEST,
                    "Invalid JSON in request body",
                    Some(e.to_string()),
                );
            }
        }
    };

    let http_request = match build_request(guard, request) {
        Ok(http_request) => http_request,
        Err(outcome) => return outcome,
    };

    info!(
        method = %http_request.endpoint.method,
        endpoint = %http_request.endpoint.url,
        "proxying request"
    );
    match client.execute(http_request).await {
        Ok(result) => {
            let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            info!(status_code = result.status_code, "upstream responded");
            ProxyOutcome::forwarded(status, parse_body(&result.body))
        }
        Err(e) => {
            error!(error = ?e, "proxy request failed");
            ProxyOutcome::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Proxy request failed",
                Some(e.to_string()),
            )
        }
    }
}

fn build_request(guard: &UpstreamGuard, request: ProxyRequest) -> Result<HttpRequest, ProxyOutcome> {
    let endpoint = request
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| {
            ProxyOutcome::failure(StatusCode::BAD_REQUEST, "Missing endpoint parameter", None)
        })?
        .to_string();

    let method = match request.method.as_deref() {
        None => DEFAULT_METHOD,
        Some(name) => HttpMethod::from_str(name).map_err(|e| {
            ProxyOutcome::failure(StatusCode::BAD_REQUEST, "Unsupported method", Some(e))
        })?,
    };

    if let Ok(url) = Url::parse(&endpoint) {
        if !guard.allows(&url) {
            warn!(host = url.host_str().unwrap_or_default(), "endpoint host not allowed");
            return Err(ProxyOutcome::failure(
                StatusCode::FORBIDDEN,
                "Endpoint not allowed",
                Some(format!(
                    "host {} is not an allowed upstream",
                    url.host_str().unwrap_or_default()
                )),
            ));
        }
    }

    let headers = request.header_params().map_err(|details| {
        ProxyOutcome::failure(StatusCode::BAD_REQUEST, "Invalid headers parameter", Some(details))
    })?;
    let body = request.body_text();
    let endpoint = Endpoint::new(method, endpoint)
        .header("Content-Type", DEFAULT_CONTENT_TYPE)
        .header("Accept", DEFAULT_ACCEPT)
        .headers(headers);
    Ok(HttpRequest::new(endpoint, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> ProxyRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn non_json_bodies_are_wrapped() {
        assert_eq!(parse_body("<html>oops</html>"), json!({"data": "<html>oops</html>"}));
        assert_eq!(parse_body(""), json!({"data": ""}));
        assert_eq!(parse_body(r#"{"result":[]}"#), json!({"result": []}));
    }

    #[test]
    fn defaults_are_overridden_by_client_headers() {
        let built = build_request(
            &UpstreamGuard::default(),
            request(json!({
                "endpoint": "https://dev279775.service-now.com/api/now/table/incident",
                "method": "get",
                "headers": {"content-type": "application/json", "Authorization": "Bearer x"}
            })),
        )
        .unwrap();
        assert_eq!(built.endpoint.method, HttpMethod::GET);
        let keys: Vec<&str> = built.endpoint.headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys[0], "Content-Type");
        assert_eq!(keys[1], "Accept");
        assert!(keys.contains(&"content-type"));
        assert!(built.body.is_none());
    }

    #[test]
    fn method_defaults_to_post_and_object_bodies_are_serialized() {
        let built = build_request(
            &UpstreamGuard::default(),
            request(json!({
                "endpoint": "https://dev279775.service-now.com/api/x_tr_trt/trigger_call",
                "body": {"incident_number": "INC0008001"}
            })),
        )
        .unwrap();
        assert_eq!(built.endpoint.method, HttpMethod::POST);
        assert_eq!(built.body.as_deref(), Some(r#"{"incident_number":"INC0008001"}"#));
    }

    #[test]
    fn blank_endpoint_is_missing() {
        let outcome = build_request(&UpstreamGuard::default(), request(json!({"endpoint": "  "}))).unwrap_err();
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body, Some(json!({"error": "Missing endpoint parameter"})));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let outcome = build_request(
            &UpstreamGuard::default(),
            request(json!({"endpoint": "https://a.example.com", "method": "TRACE"})),
        )
        .unwrap_err();
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.unwrap()["error"], "Unsupported method");
    }

    #[test]
    fn guard_limits_hosts_when_configured() {
        let guard = UpstreamGuard::new(vec!["Dev279775.service-now.com".to_string()]);
        assert!(guard.allows(&Url::parse("https://dev279775.service-now.com/oauth_token.do").unwrap()));
        assert!(!guard.allows(&Url::parse("https://evil.example.com/").unwrap()));
        assert!(UpstreamGuard::default().allows(&Url::parse("https://evil.example.com/").unwrap()));

        let outcome = build_request(&guard, request(json!({"endpoint": "https://evil.example.com/x"}))).unwrap_err();
        assert_eq!(outcome.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let client = ApiClient::new(std::time::Duration::from_secs(1)).unwrap();
        let outcome = relay(&client, &UpstreamGuard::default(), "options", b"not json").await;
        assert_eq!(outcome, ProxyOutcome::preflight());
    }

    #[tokio::test]
    async fn empty_body_means_missing_endpoint() {
        let client = ApiClient::new(std::time::Duration::from_secs(1)).unwrap();
        let outcome = relay(&client, &UpstreamGuard::default(), "POST", b"").await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body, Some(json!({"error": "Missing endpoint parameter"})));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let client = ApiClient::new(std::time::Duration::from_secs(1)).unwrap();
        let outcome = relay(&client, &UpstreamGuard::default(), "POST", b"{endpoint:").await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        let body = outcome.body.unwrap();
        assert_eq!(body["error"], "Invalid JSON in request body");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn null_headers_are_treated_as_none() {
        let client = ApiClient::new(std::time::Duration::from_secs(1)).unwrap();
        let body = br#"{"endpoint":"https://dev279775.service-now.com/x","method":"TRACE","headers":null}"#;
        let outcome = relay(&client, &UpstreamGuard::default(), "POST", body).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.unwrap()["error"], "Unsupported method");
    }

    #[test]
    fn scalar_header_values_are_stringified() {
        let built = build_request(
            &UpstreamGuard::default(),
            request(json!({
                "endpoint": "https://dev279775.service-now.com/x",
                "headers": {"X-Count": 5, "X-Debug": true, "X-Skip": null}
            })),
        )
        .unwrap();
        let headers: Vec<(&str, &str)> = built
            .endpoint
            .headers
            .iter()
            .map(|h| (h.key.as_str(), h.value.as_str()))
            .collect();
        assert!(headers.contains(&("X-Count", "5")));
        assert!(headers.contains(&("X-Debug", "true")));
        assert!(!headers.iter().any(|(key, _)| *key == "X-Skip"));
    }

    #[test]
    fn structured_header_values_are_rejected() {
        let outcome = build_request(
            &UpstreamGuard::default(),
            request(json!({
                "endpoint": "https://dev279775.service-now.com/x",
                "headers": {"X-Nested": {"a": 1}}
            })),
        )
        .unwrap_err();
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        let body = outcome.body.unwrap();
        assert_eq!(body["error"], "Invalid headers parameter");
        assert_eq!(body["details"], "header X-Nested must be a string, number or boolean");
    }
}
