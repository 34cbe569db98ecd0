pub mod gigachat;

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gigachat::GigaChatClient;

/// Result of one improvement attempt. `improved` equals the input when
/// `succeeded` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImproveOutcome {
    pub improved: String,
    pub succeeded: bool,
}

impl ImproveOutcome {
    pub fn success(improved: impl Into<String>) -> Self {
        Self {
            improved: improved.into(),
            succeeded: true,
        }
    }

    pub fn failure(original: impl Into<String>) -> Self {
        Self {
            improved: original.into(),
            succeeded: false,
        }
    }
}

/// Rewrites a user prompt into a richer English image description.
///
/// Implementations must not fail: transport, credential and API problems are
/// reported through [`ImproveOutcome::succeeded`].
#[async_trait]
pub trait PromptImprover: Send + Sync {
    async fn improve(&self, text: &str) -> ImproveOutcome;
}

/// What a job uses as its improved prompt when improvement fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Keep the original prompt untouched.
    #[default]
    Passthrough,
    /// Lowercase the prompt and translate a few common Russian nouns.
    Glossary,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Ok(Self::Passthrough),
            "glossary" | "translate" => Ok(Self::Glossary),
            other => Err(format!("expected passthrough or glossary, got {other}")),
        }
    }
}

const GLOSSARY: &[(&str, &str)] = &[
    ("лес", "forest"),
    ("город", "city"),
    ("море", "sea"),
    ("гора", "mountain"),
    ("река", "river"),
    ("дом", "house"),
    ("кошка", "cat"),
    ("собака", "dog"),
    ("солнце", "sun"),
    ("луна", "moon"),
    ("звёзды", "stars"),
    ("ночь", "night"),
    ("день", "day"),
];

impl FallbackPolicy {
    pub fn apply(self, original: &str) -> String {
        match self {
            Self::Passthrough => original.to_string(),
            Self::Glossary => GLOSSARY
                .iter()
                .fold(original.to_lowercase(), |text, (ru, en)| text.replace(ru, en)),
        }
    }
}
