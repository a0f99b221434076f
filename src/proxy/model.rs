use crate::http::ReqParam;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Forwarding instruction posted by the browser.
#[derive(Deserialize, Debug, Default)]
pub struct ProxyRequest {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    /// Strings are forwarded verbatim, any other JSON value is re-serialized.
    pub body: Option<Value>,
    /// `null` means no headers; scalar values are sent in their JSON text form.
    #[serde(default)]
    pub headers: Option<HashMap<String, Value>>,
}

impl ProxyRequest {
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Client headers as request params; `Err` names the first header whose value is an object or array.
    pub fn header_params(&self) -> Result<Vec<ReqParam>, String> {
        let Some(headers) = &self.headers else {
            return Ok(vec![]);
        };
        let mut params = Vec::with_capacity(headers.len());
        for (key, value) in headers {
            let value = match value {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(format!("header {key} must be a string, number or boolean"))
                }
            };
            params.push(ReqParam::new(key.clone(), value));
        }
        Ok(params)
    }
}

/// Result of one relay call, independent of the hosting platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyOutcome {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ProxyOutcome {
    pub fn preflight() -> Self {
        ProxyOutcome {
            status: StatusCode::OK,
            body: None,
        }
    }

    pub fn forwarded(status: StatusCode, body: Value) -> Self {
        ProxyOutcome {
            status,
            body: Some(body),
        }
    }

    pub fn failure(status: StatusCode, error: &str, details: Option<String>) -> Self {
        let body = match details {
            Some(details) => json!({ "error": error, "details": details }),
            None => json!({ "error": error }),
        };
        ProxyOutcome {
            status,
            body: Some(body),
        }
    }

    pub fn body_text(&self) -> String {
        self.body
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct HttpContext {
    pub method: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RequestContext {
    pub http: Option<HttpContext>,
}

/// API Gateway / Netlify style function event.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub http_method: Option<String>,
    pub request_context: Option<RequestContext>,
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl GatewayEvent {
    /// REST (v1) events carry `httpMethod`, HTTP API (v2) events `requestContext.http.method`.
    pub fn method(&self) -> &str {
        self.http_method
            .as_deref()
            .or_else(|| {
                self.request_context
                    .as_ref()
                    .and_then(|context| context.http.as_ref())
                    .and_then(|http| http.method.as_deref())
            })
            .unwrap_or("POST")
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}
