use crate::config::{PipelineConfig, SourceLanguage};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Hard cancellation deadline for one translation call.
pub const TRANSLATION_TIMEOUT: Duration = Duration::from_secs(600);

// Generation policy, not user-tunable.
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.7;
const STOP_SEQUENCES: &[&str] = &["\n"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub results: Vec<GenerateResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResult {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request timed out after {}s", TRANSLATION_TIMEOUT.as_secs())]
    Timeout,
    #[error("translation endpoint returned HTTP status {status}")]
    Http { status: u16 },
    #[error("malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("translation request failed: {0}")]
    Request(String),
}

/// One text-generation round trip to the backend. Trait seam so tests run
/// against stubs instead of a live endpoint.
#[async_trait]
pub trait GenerateTransport: Send + Sync {
    async fn generate(
        &self,
        endpoint: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TranslationError>;
}

/// Production transport: POST `{endpoint}/api/v1/generate` with a JSON body.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerateTransport for HttpTransport {
    async fn generate(
        &self,
        endpoint: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TranslationError> {
        let url = format!("{}/api/v1/generate", endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| TranslationError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslationError::Http {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|err| TranslationError::MalformedResponse(err.to_string()))
    }
}

/// Builds prompts and drives exactly one transport call per invocation,
/// bounded by [`TRANSLATION_TIMEOUT`]. No hidden retries.
pub struct TranslationClient {
    transport: Arc<dyn GenerateTransport>,
}

impl TranslationClient {
    pub fn new(transport: Arc<dyn GenerateTransport>) -> Self {
        TranslationClient { transport }
    }

    pub fn build_prompt(text: &str, lang: SourceLanguage) -> String {
        format!(
            "Translate the following {} manga text to natural English, \
             preserving style and tone: {text}",
            lang.display_name()
        )
    }

    pub async fn translate(
        &self,
        text: &str,
        config: &PipelineConfig,
    ) -> Result<String, TranslationError> {
        let request = GenerateRequest {
            prompt: Self::build_prompt(text, config.source_lang),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stop: STOP_SEQUENCES.iter().map(ToString::to_string).collect(),
        };
        debug!("sending translation request to {}", config.api_url);

        let response =
            tokio::time::timeout(TRANSLATION_TIMEOUT, self.transport.generate(&config.api_url, &request))
                .await
                .map_err(|_| TranslationError::Timeout)??;

        let result = response
            .results
            .first()
            .ok_or_else(|| TranslationError::MalformedResponse("empty results list".to_string()))?;
        Ok(result.text.trim().to_string())
    }
}
