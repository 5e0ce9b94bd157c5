//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.receipt-bot/config.json`) and environment.
//! Secrets are resolved once at startup into [`Secrets`] and handed to each client constructor;
//! nothing reads the environment after that.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Named secrets (channel secret, access token, API keys, database id).
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// LINE Messaging API endpoints.
    #[serde(default)]
    pub line: LineConfig,

    /// Gemini generateContent endpoint and model.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Notion API endpoint and version.
    #[serde(default)]
    pub notion: NotionConfig,
}

/// Gateway bind, port, and webhook path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8787).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path the messaging platform POSTs webhook events to (default "/webhook").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// Secret values as written in the config file. Each one is overridden by its env var when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsConfig {
    /// Channel secret used to sign webhook bodies. Env: LINE_CHANNEL_SECRET.
    pub line_channel_secret: Option<String>,
    /// Channel access token for reply/push/content. Env: LINE_ACCESS_TOKEN.
    pub line_access_token: Option<String>,
    /// Gemini API key. Env: GEMINI_API_KEY.
    pub gemini_api_key: Option<String>,
    /// Notion integration token. Env: NOTION_API_KEY.
    pub notion_api_key: Option<String>,
    /// Target Notion database id (with or without hyphens). Env: NOTION_DATABASE_ID.
    pub notion_database_id: Option<String>,
}

/// LINE Messaging API base URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Base URL for reply/push (default "https://api.line.me").
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
    /// Base URL for message content downloads (default "https://api-data.line.me").
    #[serde(default = "default_line_data_api_base")]
    pub data_api_base: String,
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_line_data_api_base() -> String {
    "https://api-data.line.me".to_string()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base: default_line_api_base(),
            data_api_base: default_line_data_api_base(),
        }
    }
}

/// Gemini endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// Base URL (default "https://generativelanguage.googleapis.com").
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Model id passed in the generateContent path (default "gemini-2.0-flash").
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

/// Notion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    /// Base URL (default "https://api.notion.com").
    #[serde(default = "default_notion_base_url")]
    pub base_url: String,
    /// Value of the Notion-Version header (default "2022-06-28").
    #[serde(default = "default_notion_version")]
    pub version: String,
}

fn default_notion_base_url() -> String {
    "https://api.notion.com".to_string()
}

fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: default_notion_base_url(),
            version: default_notion_version(),
        }
    }
}

/// Read-only view of the five secrets, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub line_channel_secret: Option<String>,
    pub line_access_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
}

pub const ENV_LINE_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_LINE_ACCESS_TOKEN: &str = "LINE_ACCESS_TOKEN";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_NOTION_API_KEY: &str = "NOTION_API_KEY";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Env var (when set and non-empty) overrides the config value.
fn env_or(name: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| configured.and_then(|s| non_empty(s)))
}

/// Resolve all secrets: env LINE_CHANNEL_SECRET etc. override the config file.
pub fn resolve_secrets(config: &Config) -> Secrets {
    let s = &config.secrets;
    Secrets {
        line_channel_secret: env_or(ENV_LINE_CHANNEL_SECRET, s.line_channel_secret.as_ref()),
        line_access_token: env_or(ENV_LINE_ACCESS_TOKEN, s.line_access_token.as_ref()),
        gemini_api_key: env_or(ENV_GEMINI_API_KEY, s.gemini_api_key.as_ref()),
        notion_api_key: env_or(ENV_NOTION_API_KEY, s.notion_api_key.as_ref()),
        notion_database_id: env_or(ENV_NOTION_DATABASE_ID, s.notion_database_id.as_ref()),
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RECEIPT_BOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".receipt-bot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or RECEIPT_BOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
