use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, Accept";
pub const MAX_AGE_SECS: u32 = 3600;

/// Static CORS header set attached to every response, preflight or not.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl CorsPolicy {
    /// Falls back to the `null` origin when the configured one is not a valid header value.
    pub fn new(allowed_origin: &str) -> Self {
        let origin = HeaderValue::from_str(allowed_origin).unwrap_or_else(|_| {
            tracing::warn!(allowed_origin, "allowed origin is not a valid header value");
            HeaderValue::from_static("null")
        });
        let headers = vec![
            (ACCESS_CONTROL_ALLOW_ORIGIN, origin),
            (ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS)),
            (ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS)),
            (ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true")),
            (ACCESS_CONTROL_MAX_AGE, HeaderValue::from(MAX_AGE_SECS)),
        ];
        CorsPolicy { headers }
    }

    pub fn apply(&self, response: &mut Response) {
        let target = response.headers_mut();
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    /// Header set keyed by canonical (title-cased) name, for event-shaped responses.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(name, value)| {
                (
                    title_case(name.as_str()),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

pub async fn attach_cors(State(policy): State<Arc<CorsPolicy>>, mut response: Response) -> Response {
    policy.apply(&mut response);
    response
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn map_uses_canonical_names() {
        let map = CorsPolicy::new("https://alokshrotritr.github.io").to_map();
        assert_eq!(map.len(), 5);
        assert_eq!(map["Access-Control-Allow-Origin"], "https://alokshrotritr.github.io");
        assert_eq!(map["Access-Control-Allow-Methods"], ALLOW_METHODS);
        assert_eq!(map["Access-Control-Allow-Headers"], ALLOW_HEADERS);
        assert_eq!(map["Access-Control-Allow-Credentials"], "true");
        assert_eq!(map["Access-Control-Max-Age"], "3600");
    }

    #[test]
    fn apply_overrides_existing_values() {
        let mut response = Response::new(Body::empty());
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        CorsPolicy::new("https://teams.example.com").apply(&mut response);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://teams.example.com"
        );
    }

    #[test]
    fn invalid_origin_degrades_to_null() {
        let map = CorsPolicy::new("bad\norigin").to_map();
        assert_eq!(map["Access-Control-Allow-Origin"], "null");
    }
}
