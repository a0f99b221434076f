#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use snow_relay::api::{build_api, AppState};
use snow_relay::config::Config;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const ORIGIN: &str = "https://alokshrotritr.github.io";

/// Serves `router` on an ephemeral local port and returns its base url.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("upstream server");
    });
    format!("http://{addr}")
}

/// A local url nothing listens on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn relay(config: &Config) -> Router {
    build_api(AppState::new(config).expect("app state"))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn assert_cors(&self) {
        assert_eq!(self.headers["access-control-allow-origin"], ORIGIN);
        assert_eq!(self.headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(
            self.headers["access-control-allow-headers"],
            "Content-Type, Authorization, Accept"
        );
        assert_eq!(self.headers["access-control-allow-credentials"], "true");
        assert_eq!(self.headers["access-control-max-age"], "3600");
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}
