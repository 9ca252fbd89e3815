use crate::stream::{PutBatchResponse, Record, StreamTransport, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// HTTP client for the stream service's write API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct PutBatchRequest<'a> {
    records: &'a [Record],
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn put_batch(
        &self,
        stream: &str,
        records: &[Record],
    ) -> Result<PutBatchResponse, TransportError> {
        let url = format!("{}/streams/{}/records", self.base_url, stream);

        let response = self
            .client
            .post(&url)
            .json(&PutBatchRequest { records })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => TransportError::StreamNotFound(stream.to_string()),
            429 => TransportError::Throttled(message),
            403 => TransportError::AccessDenied(message),
            s => TransportError::Service { status: s, message },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport =
            HttpTransport::new("http://localhost:7600/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(transport.base_url, "http://localhost:7600");
    }
}
