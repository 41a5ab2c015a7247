//! HTTP client for the chain storage API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::ApiError;

use super::model::{ChainDetail, ChainKey, ChainLookup, ChainSummary};

/// Read-only access to stored chains.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Chains created by a given Telegram user.
    async fn fetch_by_author(&self, author_id: &str) -> Result<Vec<ChainSummary>, ApiError>;

    /// One chain by id or slug.
    async fn fetch_by_id_or_slug(&self, key: &ChainKey) -> Result<ChainLookup, ApiError>;
}

/// `ChainApi` over the REST service at `API_BASE_URI`.
pub struct HttpChainApi {
    base_uri: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpChainApi {
    pub fn new(base_uri: impl Into<String>, timeout: Duration) -> Self {
        let base_uri = base_uri.into().trim_end_matches('/').to_string();
        Self {
            base_uri,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_uri, path.trim_start_matches('/'))
    }

    /// GET `url`, returning the status and raw body.
    async fn get(&self, url: &str) -> Result<(StatusCode, String), ApiError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.request_error(url, e))?;
        Ok((status, body))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            ApiError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ChainApi for HttpChainApi {
    async fn fetch_by_author(&self, author_id: &str) -> Result<Vec<ChainSummary>, ApiError> {
        let url = self.url(&format!("cadenas/autor/{author_id}"));
        let (status, body) = self.get(&url).await?;

        // Status first: error pages are often not JSON at all.
        if status != StatusCode::OK {
            tracing::warn!(%url, status = status.as_u16(), "Chain list request failed");
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    }

    async fn fetch_by_id_or_slug(&self, key: &ChainKey) -> Result<ChainLookup, ApiError> {
        let url = self.url(&format!("cadenas/{}", key.as_path_segment()));
        let (status, body) = self.get(&url).await?;

        // Lookups report unknown keys in a JSON body, whatever the status code.
        let json: serde_json::Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            Err(e) => {
                return Err(ApiError::InvalidResponse {
                    url,
                    reason: format!("body is not JSON: {e}"),
                });
            }
        };

        if let Some(error) = json.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            tracing::debug!(%key, %message, "Chain lookup returned an error body");
            return Ok(ChainLookup::Missing(message));
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let detail: ChainDetail =
            serde_json::from_value(json).map_err(|e| ApiError::InvalidResponse {
                url,
                reason: e.to_string(),
            })?;
        Ok(ChainLookup::Found(Box::new(detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let api = HttpChainApi::new("http://localhost:5000/api/", Duration::from_secs(1));
        assert_eq!(
            api.url("/cadenas/autor/42"),
            "http://localhost:5000/api/cadenas/autor/42"
        );
        assert_eq!(api.url("cadenas/x"), "http://localhost:5000/api/cadenas/x");
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let api = HttpChainApi::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = api.fetch_by_author("1").await.unwrap_err();
        assert!(
            matches!(err, ApiError::RequestFailed { .. } | ApiError::Timeout { .. }),
            "got {err:?}"
        );
    }
}
