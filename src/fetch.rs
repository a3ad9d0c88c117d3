use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image request failed: {0}")]
    Request(String),
    #[error("image request returned HTTP status {0}")]
    Status(u16),
    #[error("unsupported image source scheme: {0}")]
    UnsupportedScheme(String),
    #[error("malformed data url: {0}")]
    InvalidDataUrl(String),
}

/// Retrieves an image's raw bytes from its source locator.
///
/// Bytes are fetched as an opaque blob rather than read out of a rendered
/// surface, which is what lets cross-origin images through.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, src: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by `reqwest` for http(s) sources, with inline `data:` URLs
/// decoded locally.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, src: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(rest) = src.strip_prefix("data:") {
            return decode_data_url(rest);
        }
        if !src.starts_with("http://") && !src.starts_with("https://") {
            return Err(FetchError::UnsupportedScheme(src.to_string()));
        }

        let response = self
            .client
            .get(src)
            .send()
            .await
            .map_err(|err| FetchError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::Request(err.to_string()))?;
        debug!("fetched {} bytes from {src}", bytes.len());
        Ok(bytes.to_vec())
    }
}

fn decode_data_url(rest: &str) -> Result<Vec<u8>, FetchError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidDataUrl(rest.to_string()))?;

    if header.ends_with(";base64") {
        BASE64
            .decode(payload)
            .map_err(|err| FetchError::InvalidDataUrl(err.to_string()))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_base64_data_url() {
        let fetcher = HttpFetcher::new();
        let bytes = fetcher
            .fetch("data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn decodes_plain_data_url() {
        let fetcher = HttpFetcher::new();
        let bytes = fetcher.fetch("data:text/plain,hello").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn rejects_unknown_scheme() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch("ftp://example.com/a.png").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn rejects_data_url_without_payload() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch("data:image/png;base64").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidDataUrl(_)));
    }
}
