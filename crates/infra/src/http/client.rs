use std::time::Duration;

use pelagic_domain::{PelagicError, ServerConfig};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::InfraError;

/// HTTP client with timeout support and bounded retries for GET requests.
///
/// Anything other than a GET is sent exactly once: a lost response to a
/// POST must surface to the requester, which keeps the persisted record
/// for a later resume instead of risking a duplicate side effect.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, PelagicError> {
        Self::builder().build()
    }

    /// Client configured from the `[server]` section.
    pub fn from_config(config: &ServerConfig) -> Result<Self, PelagicError> {
        Self::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .max_attempts(usize::try_from(config.max_attempts).unwrap_or(usize::MAX))
            .user_agent(config.user_agent.clone())
            .build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder, retrying GETs on connection
    /// failures and 5xx responses.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, PelagicError> {
        let request = builder.build().map_err(|err| PelagicError::from(InfraError::from(err)))?;
        let attempts = if *request.method() == Method::GET { self.max_attempts.max(1) } else { 1 };

        for attempt in 0..attempts {
            let request = if attempt + 1 < attempts {
                request.try_clone().ok_or_else(|| {
                    PelagicError::Internal(
                        "request body cannot be cloned; buffer the body to enable retries".into(),
                    )
                })?
            } else {
                // Last attempt consumes the original.
                return self.execute_once(request, attempt).await;
            };

            match self.execute(request, attempt).await {
                Ok(response) if response.status().is_server_error() => {
                    self.sleep_with_backoff(attempt + 1).await;
                }
                Ok(response) => return Ok(response),
                Err(err) if should_retry_error(&err) => {
                    self.sleep_with_backoff(attempt + 1).await;
                }
                Err(err) => return Err(PelagicError::from(InfraError::from(err))),
            }
        }

        Err(PelagicError::Internal("http client exhausted retries without producing a result".into()))
    }

    async fn execute_once(
        &self,
        request: reqwest::Request,
        attempt: usize,
    ) -> Result<Response, PelagicError> {
        self.execute(request, attempt).await.map_err(|err| PelagicError::from(InfraError::from(err)))
    }

    async fn execute(
        &self,
        request: reqwest::Request,
        attempt: usize,
    ) -> Result<Response, reqwest::Error> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(attempt = attempt + 1, %method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                debug!(attempt = attempt + 1, %method, %url, %status, "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(attempt = attempt + 1, %method, %url, error = %err, "HTTP request failed");
                Err(err)
            }
        }
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = u32::try_from(retry_number.saturating_sub(1).min(8)).unwrap_or(8);
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 1,
            base_backoff: Duration::from_millis(200),
            user_agent: None,
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    /// Whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts for GETs (initial try + retries).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on each further one.
    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// `User-Agent` sent with every request.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Headers added to every request.
    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Fails if reqwest cannot build its client (TLS backend setup).
    pub fn build(self) -> Result<HttpClient, PelagicError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| PelagicError::from(InfraError::from(err)))?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
