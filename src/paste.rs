//! Uploads extracted code blocks to a hastebin-compatible paste service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PasteConfig;

/// Paste backend seam. The session depends on this contract, never on the
/// concrete HTTP client.
#[async_trait]
pub trait PasteService: Send + Sync {
    /// Upload a payload and return its URL, or `None` on any failure.
    async fn upload(&self, payload: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct PasteResponse {
    key: String,
}

/// Thin client over a hastebin-style `POST /documents` endpoint.
#[derive(Debug)]
pub struct PasteClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PasteClient {
    pub fn new(config: &PasteConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PasteService for PasteClient {
    /// Any failure (network, timeout, missing key) comes back as `None`;
    /// upload failures are transient per-message errors and must not stop
    /// the relay.
    async fn upload(&self, payload: &str) -> Option<String> {
        let url = format!("{}/documents", self.endpoint);
        let response = match self
            .client
            .post(&url)
            .body(payload.to_string())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Paste upload failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Paste service rejected upload");
            return None;
        }

        match response.json::<PasteResponse>().await {
            Ok(parsed) if !parsed.key.is_empty() => {
                Some(format!("{}/{}", self.endpoint, parsed.key))
            }
            Ok(_) => {
                tracing::warn!("Paste service returned an empty key");
                None
            }
            Err(e) => {
                tracing::warn!("Paste response parse failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let client = PasteClient::new(&PasteConfig {
            endpoint: "https://paste.example/".to_string(),
            timeout_secs: 5,
        });
        assert_eq!(client.endpoint, "https://paste.example");
    }
}
