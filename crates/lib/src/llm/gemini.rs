//! Gemini generateContent client for receipt extraction.

use crate::config::{GeminiConfig, Secrets};
use crate::llm::{extract_receipt, AnalysisError, ReceiptAnalyzer};
use crate::receipt::ExtractedReceipt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Instruction sent with every image.
pub const EXTRACTION_PROMPT: &str = r#"あなたはレシート解析AIです。この画像はレシートです。
画像からレシート情報を抽出し、次の情報を含むJSONオブジェクトを返してください：

1. 店名(storeName): レシートに記載された店舗名
2. 金額(amount): 支払い総額（円）。数値のみ。
3. 日付(date): 購入日時。YYYY-MM-DD-HH:MM形式で。時間が不明の場合は00:00としてください。
4. ジャンル(category): 以下のカテゴリから最も適切なものを1つ選択：
   カフェ、ファストフード、レストラン、コンビニ、スーパー、美容、ファッション、交通費、病院、娯楽、書店、家電、フィットネス、その他
5. 決済方法(paymentMethod): 以下から選択：
   現金、クレジット、QRコード、電子マネー、不明

回答は必ずJSONフォーマットのみで、追加のテキストは含めないでください。
例: {"storeName": "スターバックス", "amount": 550, "date": "2025-03-15-13:45", "category": "カフェ", "paymentMethod": "電子マネー"}

読み取れない場合やあいまいな場合は、該当フィールドに "不明" と入力するか、最も可能性の高い値を入力してください。"#;

const IMAGE_MIME_TYPE: &str = "image/jpeg";
const TEMPERATURE: f64 = 0.1;
const TOP_P: f64 = 0.95;
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

fn build_request(image_base64: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: EXTRACTION_PROMPT,
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: IMAGE_MIME_TYPE,
                        data: image_base64,
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// Client for the Gemini generateContent API.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, secrets: &Secrets) -> Self {
        Self::with_client(config, secrets, reqwest::Client::new())
    }

    pub fn with_client(config: &GeminiConfig, secrets: &Secrets, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.trim().to_string(),
            api_key: secrets.gemini_api_key.clone(),
            client,
        }
    }

    /// POST /v1beta/models/{model}:generateContent; returns the model's answer text.
    pub async fn generate(&self, image_base64: &str) -> Result<String, AnalysisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AnalysisError::NotConfigured)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let res = self
            .client
            .post(&url)
            .json(&build_request(image_base64))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(format!("{} {}", status, body)));
        }
        let data: GenerateResponse = res.json().await?;
        data.first_text()
            .map(str::to_string)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[async_trait]
impl ReceiptAnalyzer for GeminiClient {
    async fn analyze(&self, image_base64: &str) -> Result<ExtractedReceipt, AnalysisError> {
        let text = self.generate(image_base64).await?;
        extract_receipt(&text, chrono::Utc::now())
    }
}
