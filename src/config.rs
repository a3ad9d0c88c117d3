use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{EnumIter, EnumString};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:5001";

/// Source language of the text expected inside images.
///
/// Tags follow the OCR engine's training-data naming (`jpn`, `kor`, `chi_sim`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, Serialize, Deserialize, Default,
)]
pub enum SourceLanguage {
    #[strum(serialize = "jpn", ascii_case_insensitive)]
    #[default]
    Japanese,
    #[strum(serialize = "kor", ascii_case_insensitive)]
    Korean,
    #[strum(serialize = "chi_sim", ascii_case_insensitive)]
    ChineseSimplified,
}

impl SourceLanguage {
    /// Human-readable name embedded in translation prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceLanguage::Japanese => "Japanese",
            SourceLanguage::Korean => "Korean",
            SourceLanguage::ChineseSimplified => "Chinese",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            SourceLanguage::Japanese => "jpn",
            SourceLanguage::Korean => "kor",
            SourceLanguage::ChineseSimplified => "chi_sim",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid api url '{0}': must start with http:// or https://")]
    InvalidApiUrl(String),
    #[error("unknown source language tag '{0}'")]
    UnknownLanguageTag(String),
}

/// Backend endpoint and source language for one session.
///
/// Validated at construction; an unrecognized language tag is a hard error
/// rather than a silent default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub api_url: String,
    pub source_lang: SourceLanguage,
}

impl PipelineConfig {
    pub fn new(api_url: impl Into<String>, lang_tag: &str) -> Result<Self, ConfigError> {
        let api_url = api_url.into();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }
        let source_lang = SourceLanguage::from_str(lang_tag)
            .map_err(|_| ConfigError::UnknownLanguageTag(lang_tag.to_string()))?;

        Ok(PipelineConfig {
            api_url,
            source_lang,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            api_url: DEFAULT_API_URL.to_string(),
            source_lang: SourceLanguage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_known_tags() {
        let config = PipelineConfig::new("http://localhost:5001", "chi_sim").unwrap();
        assert_eq!(config.source_lang, SourceLanguage::ChineseSimplified);
        assert_eq!(config.source_lang.display_name(), "Chinese");

        let config = PipelineConfig::new("https://kobold.example", "KOR").unwrap();
        assert_eq!(config.source_lang, SourceLanguage::Korean);
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = PipelineConfig::new("http://localhost:5001", "deu").unwrap_err();
        assert_eq!(err, ConfigError::UnknownLanguageTag("deu".to_string()));
    }

    #[test]
    fn rejects_bad_url() {
        let err = PipelineConfig::new("localhost:5001", "jpn").unwrap_err();
        assert_eq!(err, ConfigError::InvalidApiUrl("localhost:5001".to_string()));
    }

    #[test]
    fn tags_round_trip() {
        for lang in SourceLanguage::iter() {
            assert_eq!(SourceLanguage::from_str(lang.tag()).unwrap(), lang);
        }
    }

    #[test]
    fn defaults_match_original_settings() {
        let config = PipelineConfig::default();
        assert_eq!(config.api_url, "http://localhost:5001");
        assert_eq!(config.source_lang, SourceLanguage::Japanese);
    }
}
