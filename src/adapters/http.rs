use crate::utils::error::{GieError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// 帶逾時與重試的 GET 包裝
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpSource {
    pub fn new(timeout: Duration, retry_attempts: u32, retry_delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gie-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            retry_attempts,
            retry_delay,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let bytes = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "🔁 Request to {} failed ({}), retry {}/{}",
                        url,
                        e,
                        attempt,
                        self.retry_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Making GET request to: {}", url);
        let response = self.client.get(url).send().await?;
        let response = ensure_success(url, response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// 把非 2xx 回應轉成錯誤；404 獨立處理，方便呼叫端略過
pub async fn ensure_success(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    tracing::debug!("Response status from {}: {}", url, status);

    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GieError::NotFound {
            url: url.to_string(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(GieError::ApiStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(max_chars).collect();
        short.push('…');
        short
    }
}
