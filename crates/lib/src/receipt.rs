//! Receipt record extracted from an image, and the outcome of persisting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for fields the model could not read.
pub const UNKNOWN: &str = "不明";

/// Category used when none was extracted.
pub const DEFAULT_CATEGORY: &str = "その他";

/// Categories the extraction prompt offers. Not enforced on parsed values.
pub const CATEGORIES: [&str; 14] = [
    "カフェ",
    "ファストフード",
    "レストラン",
    "コンビニ",
    "スーパー",
    "美容",
    "ファッション",
    "交通費",
    "病院",
    "娯楽",
    "書店",
    "家電",
    "フィットネス",
    "その他",
];

/// Payment methods the extraction prompt offers. Not enforced on parsed values.
pub const PAYMENT_METHODS: [&str; 5] = ["現金", "クレジット", "QRコード", "電子マネー", "不明"];

/// Structured receipt. Every field is always present; unreadable values hold a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReceipt {
    pub store_name: String,
    /// Total paid, in yen. Never negative.
    pub amount: f64,
    /// Purchase time as `YYYY-MM-DD-HH:MM`, or a sentinel.
    pub date: String,
    pub category: String,
    pub payment_method: String,
}

impl ExtractedReceipt {
    /// Record used when the model answered without any JSON block: all unknown, dated today (UTC) at 00:00.
    pub fn placeholder(now: DateTime<Utc>) -> Self {
        Self {
            store_name: UNKNOWN.to_string(),
            amount: 0.0,
            date: format!("{}-00:00", now.format("%Y-%m-%d")),
            category: DEFAULT_CATEGORY.to_string(),
            payment_method: UNKNOWN.to_string(),
        }
    }

    /// Build from a loosely-typed JSON object, filling sentinels for anything missing or unusable.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            store_name: text_field(value, "storeName").unwrap_or_else(|| UNKNOWN.to_string()),
            amount: amount_field(value.get("amount")),
            date: text_field(value, "date").unwrap_or_else(|| UNKNOWN.to_string()),
            category: text_field(value, "category")
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            payment_method: text_field(value, "paymentMethod")
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    /// Names of the fields whose value is not one of the choices the extraction prompt offers.
    pub fn unlisted_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !CATEGORIES.contains(&self.category.as_str()) {
            fields.push("category");
        }
        if !PAYMENT_METHODS.contains(&self.payment_method.as_str()) {
            fields.push("paymentMethod");
        }
        fields
    }

    /// Date with every `-` shown as `/` (e.g. `2025/03/15/13:45`).
    pub fn display_date(&self) -> String {
        self.date.replace('-', "/")
    }
}

fn text_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers and numeric strings (commas allowed) are accepted; anything else, or a negative value, is 0.
fn amount_field(value: Option<&serde_json::Value>) -> f64 {
    let n = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

/// Outcome of creating the database record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceResult {
    Saved { page_id: Option<String> },
    Failed { error: String },
}

impl PersistenceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PersistenceResult::Saved { .. })
    }

    pub fn page_id(&self) -> Option<&str> {
        match self {
            PersistenceResult::Saved { page_id } => page_id.as_deref(),
            PersistenceResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PersistenceResult::Saved { .. } => None,
            PersistenceResult::Failed { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn placeholder_is_all_unknown_with_todays_date() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 23, 10, 0).unwrap();
        let r = ExtractedReceipt::placeholder(now);
        assert_eq!(r.store_name, "不明");
        assert_eq!(r.amount, 0.0);
        assert_eq!(r.date, "2025-03-15-00:00");
        assert_eq!(r.category, "その他");
        assert_eq!(r.payment_method, "不明");
    }

    #[test]
    fn from_value_fills_sentinels() {
        let r = ExtractedReceipt::from_value(&json!({ "storeName": "Cafe X" }));
        assert_eq!(r.store_name, "Cafe X");
        assert_eq!(r.amount, 0.0);
        assert_eq!(r.date, UNKNOWN);
        assert_eq!(r.category, DEFAULT_CATEGORY);
        assert_eq!(r.payment_method, UNKNOWN);
    }

    #[test]
    fn amount_accepts_numeric_strings_and_rejects_garbage() {
        assert_eq!(amount_field(Some(&json!("1,280"))), 1280.0);
        assert_eq!(amount_field(Some(&json!(550))), 550.0);
        assert_eq!(amount_field(Some(&json!("不明"))), 0.0);
        assert_eq!(amount_field(Some(&json!(-3))), 0.0);
        assert_eq!(amount_field(None), 0.0);
    }

    #[test]
    fn vocabulary_values_pass_through_unvalidated() {
        let r = ExtractedReceipt::from_value(&json!({
            "category": "文房具",
            "paymentMethod": "ポイント"
        }));
        assert_eq!(r.category, "文房具");
        assert!(!CATEGORIES.contains(&r.category.as_str()));
        assert_eq!(r.payment_method, "ポイント");
        assert!(!PAYMENT_METHODS.contains(&r.payment_method.as_str()));
        assert_eq!(r.unlisted_fields(), vec!["category", "paymentMethod"]);
    }

    #[test]
    fn listed_and_sentinel_values_are_not_reported() {
        let r = ExtractedReceipt::from_value(&json!({
            "category": "カフェ",
            "paymentMethod": "電子マネー"
        }));
        assert!(r.unlisted_fields().is_empty());
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        assert!(ExtractedReceipt::placeholder(now).unlisted_fields().is_empty());
    }

    #[test]
    fn display_date_replaces_every_hyphen() {
        let r = ExtractedReceipt::from_value(&json!({ "date": "2025-03-15-13:45" }));
        assert_eq!(r.display_date(), "2025/03/15/13:45");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let r = ExtractedReceipt::from_value(&json!({ "storeName": "A", "amount": 1 }));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["storeName"], "A");
        assert_eq!(v["paymentMethod"], "不明");
    }

    #[test]
    fn persistence_result_accessors() {
        let ok = PersistenceResult::Saved {
            page_id: Some("p1".to_string()),
        };
        assert!(ok.is_success());
        assert_eq!(ok.page_id(), Some("p1"));
        let failed = PersistenceResult::Failed {
            error: "boom".to_string(),
        };
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some("boom"));
    }
}
