use serde::Serialize;
use std::fmt;

/// Why the fallback generator supplied the SQL instead of the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Unconfigured,
    LlmFailed(String),
    PromptTooLarge(String),
    ExtractionEmpty,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Unconfigured => write!(f, "LLM API key not configured"),
            FallbackReason::LlmFailed(msg) => write!(f, "LLM unavailable: {}", msg),
            FallbackReason::PromptTooLarge(msg) => write!(f, "prompt too large: {}", msg),
            FallbackReason::ExtractionEmpty => write!(f, "model returned no usable SQL"),
        }
    }
}

/// Outcome of turning a question into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Translated { sql: String },
    FallbackUsed { sql: String, reason: FallbackReason },
    TranslationFailed { reason: String },
}

impl TranslationResult {
    /// The SQL to execute; empty when translation failed outright.
    pub fn sql(&self) -> &str {
        match self {
            TranslationResult::Translated { sql } | TranslationResult::FallbackUsed { sql, .. } => sql,
            TranslationResult::TranslationFailed { .. } => "",
        }
    }

    pub fn source(&self) -> SqlSource {
        match self {
            TranslationResult::Translated { .. } => SqlSource::Llm,
            TranslationResult::FallbackUsed { .. } => SqlSource::Fallback,
            TranslationResult::TranslationFailed { .. } => SqlSource::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlSource {
    Llm,
    Fallback,
    None,
}
