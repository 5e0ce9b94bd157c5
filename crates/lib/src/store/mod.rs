//! Receipt persistence (Notion database).

mod notion;

pub use notion::{build_page_request, format_database_id, notion_date, NotionClient, REVIEW_STATUS};

use crate::receipt::{ExtractedReceipt, PersistenceResult};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("notion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notion api error: {0}")]
    Api(String),
    #[error("notion {0} not configured")]
    NotConfigured(&'static str),
}

/// Creates a record for an extracted receipt. Never fails past its boundary: every error is
/// reported as [`PersistenceResult::Failed`].
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn persist(&self, receipt: &ExtractedReceipt) -> PersistenceResult;
}
