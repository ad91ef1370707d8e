//! reqwest-backed implementation of the core `Transport` port.

use async_trait::async_trait;
use pelagic_core::{RequestBody, Transport, TransportRequest};
use pelagic_domain::{Method, PelagicError, Response, Result, ServerConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{instrument, warn};
use url::Url;

use super::client::HttpClient;
use crate::errors::InfraError;

/// Sends requests to the configured server.
///
/// Relative routes are resolved against the base URL; absolute routes
/// (pagination cursors taken from `Link` headers) are used as they are.
pub struct HttpTransport {
    client: HttpClient,
    base_url: Url,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `PelagicError::Config` if `base_url` is not an absolute URL.
    pub fn new(client: HttpClient, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PelagicError::Config(format!("invalid server base URL {base_url}: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// Transport for the `[server]` section.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(HttpClient::from_config(config)?, &config.base_url)
    }

    /// URL relative routes are joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `route`.
    pub fn resolve(&self, route: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(route) {
            return Ok(absolute);
        }
        self.base_url
            .join(route)
            .map_err(|e| PelagicError::InvalidInput(format!("invalid route {route}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, route = %request.route))]
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        let url = self.resolve(&request.route)?;
        let headers = header_map(&request.headers)?;

        let mut builder = self.client.request(to_reqwest_method(request.method), url).headers(headers);
        match &request.body {
            RequestBody::Stream(_) => {
                return Err(PelagicError::InvalidInput(
                    "streaming bodies must be encoded before sending".into(),
                ));
            }
            body => {
                if let Some(bytes) = body.to_wire() {
                    builder = builder.body(bytes);
                }
            }
        }

        let response = self.client.send(builder).await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(value) => Some((name.as_str().to_string(), value.to_string())),
                Err(_) => {
                    warn!(header = %name, "dropping non-ASCII response header");
                    None
                }
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| PelagicError::from(InfraError::from(err)))?
            .to_vec();

        Ok(Response { status, headers, body })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PelagicError::InvalidInput(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PelagicError::InvalidInput(format!("invalid value for header {name}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}
