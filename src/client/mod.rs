//! JSON-over-HTTPS client for the WCS/IWMS services.
//!
//! Attaches the bearer token and a request id to every call, enforces the
//! fixed request timeout, and on a 401 runs one single-flight token refresh
//! before replaying the request once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::auth::{save_session, RefreshOutcome, RefreshRequest, TokenManager, TokenPair};
use crate::config::AppConfig;
use crate::errors::ServiceError;

pub mod wms;

pub use wms::{HttpWmsApi, WmsApi};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub refresh_path: String,
    /// Where refreshed tokens are written back, if anywhere.
    pub session_file: Option<PathBuf>,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            refresh_path: "auth/refresh".to_string(),
            session_file: None,
        }
    }
}

impl From<&AppConfig> for ApiClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            timeout: config.request_timeout(),
            refresh_path: config.refresh_path.clone(),
            session_file: config.session_file.as_ref().map(PathBuf::from),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    refresh_path: String,
    session_file: Option<PathBuf>,
    tokens: Arc<TokenManager>,
}

impl ApiClient {
    /// Build a client using a default reqwest client with the configured timeout.
    pub fn new(config: ApiClientConfig, tokens: Option<TokenPair>) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ServiceError::Transport)?;

        Ok(Self::with_client(config, http, tokens))
    }

    /// Build a client from an existing reqwest client (useful for testing).
    pub fn with_client(config: ApiClientConfig, http: Client, tokens: Option<TokenPair>) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            refresh_path: config.refresh_path,
            session_file: config.session_file,
            tokens: Arc::new(TokenManager::new(tokens)),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let body = self.execute(Method::GET, path, None).await?;
        Self::decode(&body)
    }

    pub async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload)?;
        let body = self.execute(Method::POST, path, Some(payload)).await?;
        Self::decode(&body)
    }

    /// PATCH whose response body is ignored.
    pub async fn patch<B>(&self, path: &str, payload: &B) -> Result<(), ServiceError>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        self.execute(Method::PATCH, path, Some(payload)).await?;
        Ok(())
    }

    #[instrument(skip(self, payload))]
    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<Value>,
    ) -> Result<String, ServiceError> {
        let url = self.url(path);
        let snapshot = self.tokens.snapshot().await;

        let response = self
            .dispatch(&method, &url, payload.as_ref(), snapshot.access_token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::read_body(response).await;
        }

        debug!(%method, %url, "received 401, refreshing access token");
        let outcome = self
            .tokens
            .refresh_after(snapshot.generation, |refresh_token| {
                self.request_refresh(refresh_token)
            })
            .await?;
        if let RefreshOutcome::Refreshed(pair) = &outcome {
            self.persist(pair);
        }

        let replay = self.tokens.snapshot().await;
        let response = self
            .dispatch(&method, &url, payload.as_ref(), replay.access_token.as_deref())
            .await?;
        Self::read_body(response).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        payload: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ServiceError> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(REQUEST_ID_HEADER, request_id.as_str());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(%method, url, request_id = %request_id, error = %e, "request failed");
            ServiceError::Transport(e)
        })?;

        debug!(
            %method,
            url,
            request_id = %request_id,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(response)
    }

    async fn request_refresh(&self, refresh_token: String) -> Result<TokenPair, ServiceError> {
        let url = self.url(&self.refresh_path);
        let response = self
            .http
            .post(&url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Self::decode(&body)
    }

    fn persist(&self, tokens: &TokenPair) {
        if let Some(path) = &self.session_file {
            if let Err(err) = save_session(path, tokens) {
                warn!(path = %path.display(), error = %err, "failed to persist refreshed session");
            }
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<String, ServiceError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(ServiceError::from_response(status, &body))
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ServiceError> {
        serde_json::from_str(body).map_err(|e| {
            ServiceError::SerializationError(format!("unexpected response body: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_doubled_slashes() {
        let client = ApiClient::with_client(
            ApiClientConfig::new("https://wcs.local/api/"),
            Client::new(),
            None,
        );
        assert_eq!(
            client.url("/mission/kit-merge/3"),
            "https://wcs.local/api/mission/kit-merge/3"
        );
        assert_eq!(client.url("ptl/1"), "https://wcs.local/api/ptl/1");
    }
}
