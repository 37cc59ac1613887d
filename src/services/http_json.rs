use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{multipart, redirect, Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;

use crate::services::request_logger::{NoopRequestLogger, RequestLogEntry, RequestLogger};

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// A non-2xx answer from a downstream API.
#[derive(Debug, Clone, Error)]
#[error("{method} {path} responded with status {status}")]
pub struct HttpError {
    pub status: u16,
    pub body: String,
    pub method: String,
    pub path: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("invalid header {0}")]
    InvalidHeader(String),
}

impl ApiError {
    pub fn http_error(&self) -> Option<&HttpError> {
        match self {
            ApiError::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Produces the authentication header attached to every API call.
pub trait AuthStrategy: Send + Sync {
    fn header(&self) -> Option<(HeaderName, String)>;
}

#[derive(Debug, Clone)]
pub struct ApiKeyHeader {
    name: HeaderName,
    key: String,
}

impl ApiKeyHeader {
    pub fn new(name: &'static str, key: impl Into<String>) -> Self {
        Self {
            name: HeaderName::from_static(name),
            key: key.into(),
        }
    }
}

impl AuthStrategy for ApiKeyHeader {
    fn header(&self) -> Option<(HeaderName, String)> {
        Some((self.name.clone(), self.key.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct BasicAuth {
    encoded: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        Self { encoded }
    }
}

impl AuthStrategy for BasicAuth {
    fn header(&self) -> Option<(HeaderName, String)> {
        Some((AUTHORIZATION, format!("Basic {}", self.encoded)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn header(&self) -> Option<(HeaderName, String)> {
        None
    }
}

pub type RequestIdExtractor = fn(&HeaderMap) -> Option<String>;

#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub open: Duration,
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Raw response used by callers that need headers or bytes (downloads).
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Authenticated JSON client shared by the domain clients. One attempt per call.
#[derive(Clone)]
pub struct HttpJsonClient {
    service: &'static str,
    http: Client,
    base_url: String,
    auth: Arc<dyn AuthStrategy>,
    logger: Arc<dyn RequestLogger>,
    default_headers: HeaderMap,
    request_id: Option<RequestIdExtractor>,
}

impl HttpJsonClient {
    pub fn new(
        service: &'static str,
        base_url: &str,
        timeouts: HttpTimeouts,
        auth: Arc<dyn AuthStrategy>,
    ) -> Result<Self, ApiError> {
        // Redirects are never followed implicitly; downloads walk them by hand.
        let http = Client::builder()
            .connect_timeout(timeouts.open)
            .timeout(timeouts.read)
            .redirect(redirect::Policy::none())
            .build()?;
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            service,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            logger: Arc::new(NoopRequestLogger),
            default_headers,
            request_id: None,
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_request_id_extractor(mut self, extractor: RequestIdExtractor) -> Self {
        self.request_id = Some(extractor);
        self
    }

    pub fn with_default_header(mut self, name: &'static str, value: &str) -> Result<Self, ApiError> {
        let value =
            HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader(name.to_string()))?;
        self.default_headers
            .insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// Issues `method path` against the base URL and returns the parsed JSON body.
    /// String bodies are sent verbatim, anything else is JSON-encoded.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&Value>,
        extra_headers: Option<&HeaderMap>,
    ) -> Result<Value, ApiError> {
        let url = self.build_url(path, query)?;
        let mut headers = self.headers(extra_headers)?;

        let mut builder = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let encoded = match body {
                Value::String(raw) => raw.clone().into_bytes(),
                other => serde_json::to_vec(other)
                    .map_err(|err| ApiError::InvalidResponse(err.to_string()))?,
            };
            builder = builder.body(encoded);
        }

        let response = self
            .execute(&method, &url, builder.headers(headers))
            .await?;
        if !response.status.is_success() {
            return Err(self.http_error(&method, &url, response).into());
        }
        parse_json_body(&response.body)
    }

    /// POSTs a multipart form through the same auth, timing and logging path.
    pub async fn request_multipart(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<Value, ApiError> {
        let url = self.build_url(path, None)?;
        let headers = self.headers(None)?;
        let builder = self
            .http
            .request(Method::POST, url.clone())
            .headers(headers)
            .multipart(form);

        let response = self.execute(&Method::POST, &url, builder).await?;
        if !response.status.is_success() {
            return Err(self.http_error(&Method::POST, &url, response).into());
        }
        parse_json_body(&response.body)
    }

    /// Unauthenticated GET against an absolute URL. The status is not classified.
    pub async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<RawResponse, ApiError> {
        let builder = self.http.get(url.clone()).headers(headers);
        self.execute(&Method::GET, url, builder).await
    }

    pub fn request_id_of(&self, headers: &HeaderMap) -> Option<String> {
        self.request_id.and_then(|extract| extract(headers))
    }

    fn headers(&self, extra_headers: Option<&HeaderMap>) -> Result<HeaderMap, ApiError> {
        let mut headers = self.default_headers.clone();
        if let Some(extra) = extra_headers {
            for (name, value) in extra.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some((name, value)) = self.auth.header() {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| ApiError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn build_url(&self, path: &str, query: Option<&[(&str, &str)]>) -> Result<Url, ApiError> {
        let joined = build_url(&self.base_url, path);
        let mut url = Url::parse(&joined).map_err(|err| ApiError::InvalidUrl(err.to_string()))?;
        if let Some(params) = query.filter(|params| !params.is_empty()) {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    fn http_error(&self, method: &Method, url: &Url, response: RawResponse) -> HttpError {
        HttpError {
            status: response.status.as_u16(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
            method: method.to_string(),
            path: url.path().to_string(),
            request_id: self.request_id_of(&response.headers),
        }
    }

    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        builder: RequestBuilder,
    ) -> Result<RawResponse, ApiError> {
        let started = Instant::now();
        let outcome = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        }
        .await;

        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            Ok(response) => {
                let request_id = self.request_id_of(&response.headers);
                self.logger.log(&RequestLogEntry {
                    service: self.service,
                    method,
                    url: url.as_str(),
                    status: Some(response.status.as_u16()),
                    elapsed_ms,
                    request_id: request_id.as_deref(),
                });
                Ok(response)
            }
            Err(err) => {
                self.logger.log(&RequestLogEntry {
                    service: self.service,
                    method,
                    url: url.as_str(),
                    status: None,
                    elapsed_ms,
                    request_id: None,
                });
                Err(ApiError::Transport(err))
            }
        }
    }
}

fn build_url(base: &str, path: &str) -> String {
    let trimmed_base = base.trim_end_matches('/');
    let trimmed_path = path.trim_start_matches('/');
    format!("{}/{}", trimmed_base, trimmed_path)
}

/// Empty bodies are treated as an empty object.
pub fn parse_json_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|err| {
        ApiError::InvalidResponse(format!("failed to parse response body as JSON: {}", err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::request_logger::testing::RecordingRequestLogger;

    fn client(server: &httpmock::MockServer, auth: Arc<dyn AuthStrategy>) -> HttpJsonClient {
        HttpJsonClient::new("test", &server.url(""), HttpTimeouts::default(), auth)
            .expect("client")
    }

    #[test]
    fn build_url_joins_without_double_slashes() {
        assert_eq!(build_url("https://api.test/v1/", "/people"), "https://api.test/v1/people");
        assert_eq!(build_url("https://api.test/v1", "people"), "https://api.test/v1/people");
    }

    #[test]
    fn empty_body_parses_to_empty_object() {
        assert_eq!(parse_json_body(b"").unwrap(), json!({}));
        assert_eq!(parse_json_body(b"  \n").unwrap(), json!({}));
        assert!(matches!(
            parse_json_body(b"<html>"),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let (name, value) = BasicAuth::new("svc", "s3cret").header().unwrap();
        assert_eq!(name, AUTHORIZATION);
        assert_eq!(value, "Basic c3ZjOnMzY3JldA==");
    }

    #[tokio::test]
    async fn get_sends_accept_auth_and_encoded_query() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/items")
                .query_param("filter[name]", "a b")
                .header("accept", "application/json")
                .header("x-api-key", "key-1");
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "data": [1, 2] }).to_string());
        });

        let api = client(&server, Arc::new(ApiKeyHeader::new("x-api-key", "key-1")));
        let value = api
            .request(Method::GET, "/items", Some(&[("filter[name]", "a b")][..]), None, None)
            .await
            .expect("request");

        mock.assert();
        assert_eq!(value["data"], json!([1, 2]));
    }

    #[tokio::test]
    async fn post_defaults_json_content_type_and_serializes_body() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/things")
                .header("content-type", "application/json")
                .json_body(json!({ "name": "x" }));
            then.status(201).body("");
        });

        let api = client(&server, Arc::new(NoAuth));
        let value = api
            .request(Method::POST, "/things", None, Some(&json!({ "name": "x" })), None)
            .await
            .expect("request");

        mock.assert();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn caller_headers_override_defaults() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/raw")
                .header("content-type", "text/plain")
                .body("hello");
            then.status(200).body("{}");
        });

        let mut extra = HeaderMap::new();
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let api = client(&server, Arc::new(NoAuth));
        api.request(
            Method::POST,
            "/raw",
            None,
            Some(&Value::String("hello".into())),
            Some(&extra),
        )
        .await
        .expect("request");

        mock.assert();
    }

    #[tokio::test]
    async fn non_success_maps_to_http_error_and_logs_warn_status() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/missing");
            then.status(404)
                .header("x-request-id", "req-9")
                .body("not found");
        });

        let logger = Arc::new(RecordingRequestLogger::default());
        let api = client(&server, Arc::new(NoAuth))
            .with_logger(logger.clone())
            .with_request_id_extractor(|headers| {
                headers
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });

        let err = api
            .request(Method::GET, "/missing", None, None, None)
            .await
            .unwrap_err();

        let http = err.http_error().expect("http error");
        assert_eq!(http.status, 404);
        assert_eq!(http.body, "not found");
        assert_eq!(http.method, "GET");
        assert_eq!(http.path, "/missing");
        assert_eq!(http.request_id.as_deref(), Some("req-9"));

        let entries = logger.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Some(404));
        assert_eq!(entries[0].request_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn invalid_json_body_is_invalid_response() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/broken");
            then.status(200).body("{not json");
        });

        let api = client(&server, Arc::new(NoAuth));
        let err = api
            .request(Method::GET, "/broken", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error_and_logged_without_status() {
        // Nothing listens on port 9 on test hosts; the connect is refused.
        let logger = Arc::new(RecordingRequestLogger::default());
        let api = HttpJsonClient::new(
            "test",
            "http://127.0.0.1:9",
            HttpTimeouts {
                open: Duration::from_millis(500),
                read: Duration::from_secs(1),
            },
            Arc::new(NoAuth),
        )
        .expect("client")
        .with_logger(logger.clone());

        let err = api
            .request(Method::GET, "/anything", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(logger.entries.lock().unwrap()[0].status, None);
    }
}
