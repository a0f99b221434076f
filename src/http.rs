use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReqParam {
    pub key: String,
    pub value: String,
}

impl ReqParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        ReqParam {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub url: String,
    pub query_params: Vec<ReqParam>,
    pub headers: Vec<ReqParam>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Endpoint {
        Endpoint {
            method,
            url: url.into(),
            query_params: vec![],
            headers: vec![],
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push(ReqParam::new(key, value));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(ReqParam::new(key, value));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = ReqParam>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn to_url(&self) -> Result<Url, HttpError> {
        let mut url =
            Url::parse(&self.url).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", self.url, e)))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for param in &self.query_params {
                pairs.append_pair(&param.key, &param.value);
            }
        }
        Ok(url)
    }
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub endpoint: Endpoint,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(endpoint: Endpoint, body: Option<String>) -> HttpRequest {
        HttpRequest { endpoint, body }
    }
}

#[derive(Clone, Debug)]
pub struct HttpResult {
    pub status_code: u16,
    pub body: String,
}

impl HttpResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum HttpError {
    #[error("invalid endpoint url {0}")]
    InvalidUrl(String),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("upstream request timed out")]
    Timeout,
    #[error("could not connect to upstream")]
    Connect,
    #[error("upstream request failed")]
    Io(String),
}

impl HttpError {
    /// Failures where the upstream could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Timeout | HttpError::Connect | HttpError::Io(_))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            HttpError::Timeout
        } else if error.is_connect() {
            HttpError::Connect
        } else {
            HttpError::Io(error.to_string())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    POST,
    GET,
    PUT,
    PATCH,
    DELETE,
    HEAD,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::POST => "POST",
            HttpMethod::GET => "GET",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
        };
        f.write_str(name)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POST" => Ok(HttpMethod::POST),
            "GET" => Ok(HttpMethod::GET),
            "PUT" => Ok(HttpMethod::PUT),
            "PATCH" => Ok(HttpMethod::PATCH),
            "DELETE" => Ok(HttpMethod::DELETE),
            "HEAD" => Ok(HttpMethod::HEAD),
            _ => Err(format!("Invalid HTTP method: {}", s)),
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::POST => Method::POST,
            HttpMethod::GET => Method::GET,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::DELETE => Method::DELETE,
            HttpMethod::HEAD => Method::HEAD,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResult, HttpError> {
        let method = request.endpoint.method;
        let req = self.build_reqwest(request)?;
        let response = req.send().await.map_err(|error| {
            warn!(%method, %error, "http request failed");
            HttpError::from(error)
        })?;
        let status_code = response.status().as_u16();
        let body = response.text().await?;
        info!(%method, status_code, length = body.len(), "http request executed");
        Ok(HttpResult {
            status_code,
            body,
        })
    }

    fn build_reqwest(&self, request: HttpRequest) -> Result<RequestBuilder, HttpError> {
        let endpoint = request.endpoint;
        let url = endpoint.to_url()?;
        info!(method = %endpoint.method, host = url.host_str().unwrap_or_default(), path = url.path(), "building request");

        let mut headers = HeaderMap::new();
        for header in &endpoint.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|_| HttpError::InvalidHeader(header.key.clone()))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|_| HttpError::InvalidHeader(header.key.clone()))?;
            headers.insert(name, value);
        }

        let mut req = self
            .client
            .request(endpoint.method.into(), url)
            .headers(headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }
        Ok(req)
    }
}
