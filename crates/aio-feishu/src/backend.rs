use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use aio_core::{join_url, BridgeError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// File part of a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: MultipartFile,
    },
}

/// A request against the open API, with `path` relative to the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// A `200 OK` response with the given JSON body.
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Transport used by every Feishu component.
#[async_trait]
pub trait LarkBackend: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, BridgeError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// Production backend using reqwest, with explicit request and connect timeouts.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| BridgeError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> BridgeError {
    if err.is_timeout() {
        BridgeError::Transport(format!("{path}: request timed out"))
    } else {
        BridgeError::Transport(format!("{path}: {err}"))
    }
}

#[async_trait]
impl LarkBackend for HttpBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, BridgeError> {
        let url = join_url(&self.base_url, &request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart { fields, file } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                let part =
                    reqwest::multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
                builder.multipart(form.part(file.field, part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&request.path, e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&request.path, e))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(ApiResponse { status, body }),
            Err(_) if status >= 500 => Err(BridgeError::Transport(format!(
                "{}: HTTP {status}",
                request.path
            ))),
            Err(e) => Err(BridgeError::Parsing(format!(
                "{}: HTTP {status}, invalid JSON body: {e}",
                request.path
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Test backend with queued responses that records every request it sees.
pub struct FakeBackend {
    responses: Arc<Mutex<VecDeque<Result<ApiResponse, BridgeError>>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
    latency: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Delay every response, to widen race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_response(&self, response: ApiResponse) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Ok(response));
        self
    }

    /// Queue a `200 OK` JSON body.
    pub fn push_json(&self, body: Value) -> &Self {
        self.push_response(ApiResponse::ok(body))
    }

    pub fn push_error(&self, error: BridgeError) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Err(error));
        self
    }

    /// Requests received so far, in order.
    pub async fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of requests whose path equals `path`.
    pub async fn count_path(&self, path: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LarkBackend for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, BridgeError> {
        self.requests.lock().await.push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::Transport("FakeBackend exhausted".to_string())))
    }
}
