//! Notion pages API client: maps a receipt onto the database's property schema.

use crate::config::{NotionConfig, Secrets};
use crate::receipt::{ExtractedReceipt, PersistenceResult};
use crate::store::{ReceiptStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

/// Review status every new page starts with.
pub const REVIEW_STATUS: &str = "未確認";

const PROP_STORE: &str = "店名";
const PROP_AMOUNT: &str = "金額";
const PROP_DATE: &str = "日付";
const PROP_CATEGORY: &str = "ジャンル";
const PROP_PAYMENT: &str = "決済方法";
const PROP_STATUS: &str = "確認ステータス";

/// Receipt times are local to Japan.
const RECEIPT_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Hyphenate a bare 32-character database id (8-4-4-4-12). Ids that already contain `-`, or have
/// any other length, are returned unchanged.
pub fn format_database_id(id: &str) -> String {
    if id.contains('-') || id.len() != 32 || !id.is_ascii() {
        return id.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &id[0..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..32]
    )
}

fn parse_receipt_date(date: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date.trim();
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d-%H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    FixedOffset::east_opt(RECEIPT_UTC_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
}

/// `YYYY-MM-DD-HH:MM` (or `YYYY-MM-DD`) as `YYYY-MM-DDTHH:MM:00.000+09:00`.
/// Anything else is replaced by `now` (UTC, millisecond precision).
pub fn notion_date(date: &str, now: DateTime<Utc>) -> String {
    match parse_receipt_date(date) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string(),
        None => {
            log::warn!("notion: unparseable receipt date {:?}, using current time", date);
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        }
    }
}

/// Body for POST /v1/pages.
pub fn build_page_request(
    receipt: &ExtractedReceipt,
    database_id: &str,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let amount = if receipt.amount.is_finite() {
        receipt.amount
    } else {
        0.0
    };
    json!({
        "parent": { "database_id": format_database_id(database_id) },
        "properties": {
            PROP_STORE: { "title": [{ "text": { "content": receipt.store_name } }] },
            PROP_AMOUNT: { "number": amount },
            PROP_DATE: { "date": { "start": notion_date(&receipt.date, now) } },
            PROP_CATEGORY: { "select": { "name": receipt.category } },
            PROP_PAYMENT: { "select": { "name": receipt.payment_method } },
            PROP_STATUS: { "select": { "name": REVIEW_STATUS } }
        }
    })
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Client for the Notion pages API.
#[derive(Clone)]
pub struct NotionClient {
    base_url: String,
    version: String,
    api_key: Option<String>,
    database_id: Option<String>,
    client: reqwest::Client,
}

impl NotionClient {
    pub fn new(config: &NotionConfig, secrets: &Secrets) -> Self {
        Self::with_client(config, secrets, reqwest::Client::new())
    }

    pub fn with_client(config: &NotionConfig, secrets: &Secrets, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
            api_key: secrets.notion_api_key.clone(),
            database_id: secrets.notion_database_id.clone(),
            client,
        }
    }

    /// POST /v1/pages; returns the created page id.
    pub async fn create_page(
        &self,
        receipt: &ExtractedReceipt,
    ) -> Result<Option<String>, StoreError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(StoreError::NotConfigured("api key"))?;
        let database_id = self
            .database_id
            .as_deref()
            .ok_or(StoreError::NotConfigured("database id"))?;
        let url = format!("{}/v1/pages", self.base_url);
        let body = build_page_request(receipt, database_id, Utc::now());
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Notion-Version", &self.version)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("{} {}", status, body)));
        }
        let page: PageResponse = res.json().await?;
        Ok(page.id)
    }
}

#[async_trait]
impl ReceiptStore for NotionClient {
    async fn persist(&self, receipt: &ExtractedReceipt) -> PersistenceResult {
        match self.create_page(receipt).await {
            Ok(page_id) => PersistenceResult::Saved { page_id },
            Err(e) => {
                log::error!("[ERROR in saveToNotion] {}", e);
                PersistenceResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
