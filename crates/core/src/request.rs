//! The request that starts a generation job.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Target length of the generated post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostLength {
    /// Roughly 600-1000 words.
    Short,
    /// Roughly 1000-1500 words.
    #[default]
    Medium,
    /// Roughly 1500-2500 words.
    Long,
}

impl std::str::FromStr for PostLength {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(PostLength::Short),
            "medium" => Ok(PostLength::Medium),
            "long" => Ok(PostLength::Long),
            other => Err(CoreError::Validation(format!(
                "length must be one of short, medium, long (got {other:?})"
            ))),
        }
    }
}

/// Body of the job-creation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(length(min = 3, max = 500))]
    pub topic: String,
    #[serde(default)]
    pub length: PostLength,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_style() -> String {
    "informative".to_string()
}

fn default_tone() -> String {
    "professional".to_string()
}

impl GenerateRequest {
    /// A request with the backend's default length, style and tone.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            length: PostLength::default(),
            style: default_style(),
            tone: default_tone(),
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_length(mut self, length: PostLength) -> Self {
        self.length = length;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Check the request before it is sent to the backend.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_match_backend() {
        let req = GenerateRequest::new("Ownership in Rust");
        assert_eq!(req.length, PostLength::Medium);
        assert_eq!(req.style, "informative");
        assert_eq!(req.tone, "professional");
        assert!(req.check().is_ok());
    }

    #[test]
    fn short_topic_is_rejected() {
        let req = GenerateRequest::new("Rs");
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn long_topic_is_rejected() {
        let req = GenerateRequest::new("x".repeat(501));
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn topic_length_counts_characters() {
        let req = GenerateRequest::new("日本語");
        assert!(req.check().is_ok());
    }

    #[test]
    fn length_parses_and_serializes() {
        assert_eq!("long".parse::<PostLength>().unwrap(), PostLength::Long);
        assert!("huge".parse::<PostLength>().is_err());

        let json = serde_json::to_value(GenerateRequest::new("Async Rust").with_length(PostLength::Short))
            .unwrap();
        assert_eq!(json["length"], "short");
        assert_eq!(json["categories"], serde_json::json!([]));
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let req: GenerateRequest = serde_json::from_str(r#"{"topic":"Tokio internals"}"#).unwrap();
        assert_eq!(req, GenerateRequest::new("Tokio internals"));
    }
}
