//! Receipt analysis via a generative model (Gemini).
//!
//! The model answers in free text; [`extract_receipt`] locates the embedded JSON object.
//! No JSON at all is not an error (a placeholder record is returned); a JSON block that does not
//! parse is.

mod gemini;

pub use gemini::{GeminiClient, EXTRACTION_PROMPT};

use crate::receipt::ExtractedReceipt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
    #[error("gemini response contained no text")]
    EmptyResponse,
    #[error("JSON parse error: {error}, Text: {text}")]
    MalformedBlock {
        error: serde_json::Error,
        text: String,
    },
    #[error("gemini api key not configured")]
    NotConfigured,
}

/// Turns a base64-encoded receipt image into a structured record.
#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    async fn analyze(&self, image_base64: &str) -> Result<ExtractedReceipt, AnalysisError>;
}

/// Substring from the first `{` to the last `}`, if any.
pub fn find_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse the model's answer. No block => placeholder dated `now`; unparseable block => error.
pub fn extract_receipt(
    text: &str,
    now: DateTime<Utc>,
) -> Result<ExtractedReceipt, AnalysisError> {
    let Some(block) = find_json_block(text) else {
        log::warn!(
            "[ERROR in analyzeReceiptWithGemini] Failed to extract JSON: {}",
            text
        );
        return Ok(ExtractedReceipt::placeholder(now));
    };
    let value: serde_json::Value =
        serde_json::from_str(block).map_err(|error| AnalysisError::MalformedBlock {
            error,
            text: text.to_string(),
        })?;
    Ok(ExtractedReceipt::from_value(&value))
}
