//! One HTTP attempt, without retries. [`crate::RequestClient`] layers the
//! retry and session policy on top of a [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use prok_core::{ApiError, NetworkFailure, RequestKind};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ClientConfig, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Rebuilt into a fresh multipart form on every attempt.
    Multipart(Vec<FormPart>),
}

/// A logical API request. Kept immutable across retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL, e.g. `/api/posts/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Selects the retry budget.
    pub kind: RequestKind,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            kind,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, RequestKind::Read)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path, RequestKind::Write)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path, RequestKind::Write)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, RequestKind::Write)
    }

    pub fn with_query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Multipart body; also switches the request to the upload budget.
    pub fn with_multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Some(RequestBody::Multipart(parts));
        self.kind = RequestKind::Upload;
        self
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Status and raw body of a completed attempt. Any status counts as
/// completed; classification happens in the request client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("attempt timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request could not be built locally. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Retryable network failure, or the terminal error for a request that
    /// can never succeed.
    pub fn into_failure(self) -> Result<NetworkFailure, ApiError> {
        match self {
            TransportError::Timeout => Ok(NetworkFailure::Timeout),
            TransportError::Connection(msg) => Ok(NetworkFailure::ConnectionError(msg)),
            TransportError::InvalidRequest(msg) => Err(ApiError::Validation(msg)),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single attempt. `timeout` bounds the whole exchange,
    /// including reading the body.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| ConfigError::InvalidUrl(config.base_url.clone()))?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("prok-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        Url::parse_with_params(&url, &request.query)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid url {url}: {e}")))
    }
}

fn multipart_form(parts: &[FormPart]) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let file = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| TransportError::InvalidRequest(format!("bad mime type {mime}: {e}")))?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request)?;
        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            None => builder,
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Multipart(parts)) => builder.multipart(multipart_form(parts)?),
        };

        let attempt = async {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse::new(status, body.to_vec()))
        };
        match tokio::time::timeout(timeout, attempt).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(result) => result.map_err(classify),
        }
    }
}
