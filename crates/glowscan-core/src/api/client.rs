//! Shared HTTP client for the glowscan services.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, RequestAuthenticator};
use crate::auth::CredentialStore;
use crate::config::{Endpoints, REQUEST_TIMEOUT};

/// Maximum number of retries for rate-limited (429) GET requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the glowscan services.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoints: Arc<Endpoints>,
    authenticator: RequestAuthenticator,
}

impl ApiClient {
    pub fn new(endpoints: Endpoints, store: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
            authenticator: RequestAuthenticator::new(store),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Authorize and send a request.
    ///
    /// Rate-limited GETs are retried with exponential backoff; everything
    /// else is sent once. Non-2xx statuses are returned as-is so callers can
    /// map them.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let retry_copy = builder.try_clone();
            let mut request = match retry_copy {
                Some(copy) => copy.build()?,
                None => return self.send_once(builder).await,
            };
            self.authenticator.authorize(&mut request);

            let method = request.method().clone();
            let url = request.url().to_string();
            debug!(%method, url = %url, "Sending request");
            let response = self.client.execute(request).await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS || method != Method::GET {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Ok(response);
            }
            warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    async fn send_once(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        self.authenticator.authorize(&mut request);
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        Ok(self.client.execute(request).await?)
    }

    /// Send a request and decode a 2xx JSON body.
    pub async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(builder).await?;
        let response = Self::check_response(response).await?;
        Self::decode(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode a body, treating an empty or unparseable payload as `EmptyBody`.
    pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().to_string();
        let text = response.text().await?;
        if text.trim().is_empty() {
            debug!(url = %url, "Empty response body");
            return Err(ApiError::EmptyBody);
        }
        serde_json::from_str(&text).map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse response body");
            ApiError::EmptyBody
        })
    }
}
