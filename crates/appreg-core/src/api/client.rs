//! HTTP plumbing shared by the API operations.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Failure of a platform API call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("Invalid API path '{path}'")]
    Url {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to encode request body")]
    Encode(#[source] serde_json::Error),

    #[error("{method} {url} failed")]
    Request {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}{}", describe(.message))]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Failed to decode response of {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {}", m))
        .unwrap_or_default()
}

impl ApiError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(StatusCode::BAD_REQUEST)
    }
}

/// Error envelope returned by the platform. Different endpoints fill
/// different fields.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
    error_msg: Option<String>,
    message: Option<String>,
}

impl ErrorEnvelope {
    fn into_message(self) -> Option<String> {
        [self.error, self.error_msg, self.message]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
    }
}

/// Retries applied to transport failures. HTTP error statuses are never retried,
/// and a request that may have reached the server is only repeated when its
/// method is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            wait: Duration::ZERO,
        }
    }
}

/// Client for the platform REST API.
///
/// The base URL is injected, so tests can point it at a mock server.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    token: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(base_url: Url, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("appreg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            base_url,
            token: token.into(),
            http,
            retry: RetryPolicy::default(),
            timeout: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Abort any single request attempt that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|source| ApiError::Url {
            path: path.to_string(),
            source,
        })
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let response = self.send(Method::GET, url.clone(), None).await?;
        decode(url, response).await
    }

    /// POST and decode the JSON response.
    pub(crate) async fn post_for<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let body = encode(body)?;
        let response = self.send(Method::POST, url.clone(), body).await?;
        decode(url, response).await
    }

    /// POST and ignore the response body.
    pub(crate) async fn post<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(path)?;
        let body = encode(body)?;
        self.send(Method::POST, url, body).await?;
        Ok(())
    }

    /// PUT raw bytes to an absolute (pre-signed) URL, without the API token.
    pub(crate) async fn put_bytes(&self, url: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        let method = Method::PUT;
        let mut request = self.http.request(method.clone(), url).body(bytes);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Request {
                method: method.clone(),
                url: url.to_string(),
                source,
            })?;
        check_status(method, url.to_string(), response).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(%method, %url, attempt, "API request");
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, &self.token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    debug!(%method, %url, status = %response.status(), "API response");
                    return check_status(method, url.to_string(), response).await;
                }
                Err(err) if attempt < attempts && is_transient(&method, &err) => {
                    warn!(%method, %url, error = %err, "Request failed, will retry");
                    tokio::time::sleep(self.retry.wait).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(ApiError::Request {
                        method,
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

/// A connect failure never reached the server. Anything later may have, so
/// it is only retried when repeating the request is harmless.
fn is_transient(method: &Method, err: &reqwest::Error) -> bool {
    err.is_connect() || (is_idempotent(method) && (err.is_timeout() || err.is_request()))
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

fn encode<B: Serialize>(body: Option<&B>) -> Result<Option<serde_json::Value>, ApiError> {
    body.map(serde_json::to_value)
        .transpose()
        .map_err(ApiError::Encode)
}

async fn check_status(
    method: Method,
    url: String,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(ErrorEnvelope::into_message)
        .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()));

    Err(ApiError::Status {
        method,
        url,
        status,
        message,
    })
}

async fn decode<T: DeserializeOwned>(url: Url, response: reqwest::Response) -> Result<T, ApiError> {
    response.json().await.map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}
