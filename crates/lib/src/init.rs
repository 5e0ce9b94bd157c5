//! Initialize the configuration directory: create `~/.receipt-bot` and a config file whose
//! secret keys carry placeholder values. Safe to run repeatedly; keys that already have a value
//! are never touched.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Secret keys (camelCase, as stored under `secrets`) and the placeholder written for each.
pub const PLACEHOLDER_SECRETS: [(&str, &str); 5] = [
    ("lineChannelSecret", "YOUR_LINE_CHANNEL_SECRET"),
    ("lineAccessToken", "YOUR_LINE_ACCESS_TOKEN"),
    ("geminiApiKey", "YOUR_GEMINI_API_KEY"),
    ("notionApiKey", "YOUR_NOTION_API_KEY"),
    ("notionDatabaseId", "YOUR_NOTION_DATABASE_ID"),
];

/// Ensure the configuration has been initialized (config file exists).
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `receipt-bot init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and config file if missing, then fill any missing or empty
/// secret with its placeholder. Returns the number of keys that were filled.
pub fn init_config_dir(config_path: &Path) -> Result<(PathBuf, usize)> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let mut root: Value = if config_path.exists() {
        let s = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading config from {}", config_path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", config_path.display()))?
    } else {
        Value::Object(Map::new())
    };

    let filled = fill_placeholders(&mut root)
        .with_context(|| format!("config at {} is not a JSON object", config_path.display()))?;

    if filled > 0 || !config_path.exists() {
        let text = serde_json::to_string_pretty(&root).context("serializing config")?;
        std::fs::write(config_path, text)
            .with_context(|| format!("writing config to {}", config_path.display()))?;
        log::info!(
            "wrote config at {} ({} placeholder secret(s) added)",
            config_path.display(),
            filled
        );
    } else {
        log::debug!("all secrets already set in {}, skipping", config_path.display());
    }

    Ok((config_dir.to_path_buf(), filled))
}

/// Insert placeholders under `secrets` for keys that are absent, null, or blank.
fn fill_placeholders(root: &mut Value) -> Result<usize> {
    let obj = root
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("expected a JSON object at the top level"))?;
    let secrets = obj
        .entry("secrets")
        .or_insert_with(|| Value::Object(Map::new()));
    let secrets = secrets
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("expected `secrets` to be a JSON object"))?;

    let mut filled = 0;
    for (key, placeholder) in PLACEHOLDER_SECRETS {
        let missing = match secrets.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            secrets.insert(key.to_string(), Value::String(placeholder.to_string()));
            filled += 1;
        }
    }
    Ok(filled)
}
