//! Gateway HTTP server (single port).

use crate::channels::{self, LineChannel, Messenger};
use crate::config::{self, Config, Secrets};
use crate::init;
use crate::llm::{GeminiClient, ReceiptAnalyzer};
use crate::pipeline::Pipeline;
use crate::signature::{self, SignatureCheck};
use crate::store::{NotionClient, ReceiptStore};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="utf-8"><title>レシート解析＆Notion連携システム</title></head>
<body>
<h1>レシート解析＆Notion連携システム</h1>
<p>このWebアプリケーションはLINE Bot用のバックエンドサービスです。</p>
<p>LINEアプリからボットに接続して、レシートの写真を送信してください。</p>
<p>システムステータス: アクティブ</p>
</body>
</html>
"#;

/// JSON body of every webhook response. The HTTP status is always 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    pub fn success() -> Self {
        Self {
            status: "success",
            message: None,
        }
    }

    pub fn success_unvalidated() -> Self {
        Self {
            status: "success",
            message: Some("Processed without signature validation".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

/// Shared state for the gateway: config, secrets, and the clients the pipeline drives.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub messenger: Arc<dyn Messenger>,
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
    pub store: Arc<dyn ReceiptStore>,
}

impl GatewayState {
    /// Build the HTTP clients from config; they share one connection pool.
    pub fn from_config(config: Config) -> Self {
        let secrets = config::resolve_secrets(&config);
        let client = reqwest::Client::new();
        let messenger = LineChannel::with_client(&config.line, &secrets, client.clone());
        let analyzer = GeminiClient::with_client(&config.gemini, &secrets, client.clone());
        let store = NotionClient::with_client(&config.notion, &secrets, client);
        Self {
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            messenger: Arc::new(messenger),
            analyzer: Arc::new(analyzer),
            store: Arc::new(store),
        }
    }
}

/// Routes: webhook (POST, path from config), status page (GET /), health (GET /health).
pub fn build_router(state: GatewayState) -> Router {
    let webhook_path = state.config.gateway.webhook_path.clone();
    Router::new()
        .route("/", get(status_page))
        .route("/health", get(health_http))
        .route(&webhook_path, post(webhook))
        .with_state(state)
}

pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    let bind = config.gateway.bind.trim().to_string();
    let port = config.gateway.port;

    let state = GatewayState::from_config(config);
    if state.secrets.line_channel_secret.is_none() {
        log::warn!("line channel secret not set: signed webhook requests will be rejected");
    }
    if !config::is_loopback_bind(&bind) {
        log::info!(
            "gateway bound to non-loopback address {}; webhook authenticity relies on the channel secret",
            bind
        );
    }
    let webhook_path = state.config.gateway.webhook_path.clone();
    let app = build_router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook at {})", bind_addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST webhook: check signature, then process every event in order before answering.
async fn webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookResponse> {
    let request_id = uuid::Uuid::new_v4();
    let provided = signature::find_signature_header(&headers);
    let check = signature::check(
        &body,
        provided,
        state.secrets.line_channel_secret.as_deref(),
    );
    match check {
        SignatureCheck::Invalid => {
            log::warn!("[STATUS] INVALID_SIGNATURE: user=system request={}", request_id);
            return Json(WebhookResponse::error("Invalid signature"));
        }
        SignatureCheck::Absent => {
            log::warn!(
                "webhook {}: no signature header, processing without validation",
                request_id
            );
        }
        SignatureCheck::Valid => {}
    }

    if let Some(message) = process_payload(&state, &body, request_id).await {
        return Json(WebhookResponse::error(message));
    }

    match check {
        SignatureCheck::Absent => Json(WebhookResponse::success_unvalidated()),
        _ => Json(WebhookResponse::success()),
    }
}

/// Route and handle each event sequentially. A malformed payload dispatches nothing.
/// A panic inside one event is contained to that event: its user gets the generic failure push
/// and the batch continues. Returns the first panic message, if any.
async fn process_payload(
    state: &GatewayState,
    body: &[u8],
    request_id: uuid::Uuid,
) -> Option<String> {
    let events = match channels::route(body) {
        Ok(events) => events,
        Err(e) => {
            log::error!("[ERROR in doPost-parse] webhook {}: {}", request_id, e);
            return None;
        }
    };
    log::debug!("webhook {}: {} event(s)", request_id, events.remaining());
    let pipeline = Pipeline::new(
        state.messenger.as_ref(),
        state.analyzer.as_ref(),
        state.store.as_ref(),
    );
    let mut first_panic = None;
    for event in events {
        let user_id = event.source_user_id.clone();
        match AssertUnwindSafe(pipeline.handle(event)).catch_unwind().await {
            Ok(outcome) => {
                log::debug!("webhook {}: event finished as {:?}", request_id, outcome);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("[ERROR in handleEvent] webhook {}: {}", request_id, message);
                pipeline.notify_failure(&user_id).await;
                first_panic.get_or_insert(message);
            }
        }
    }
    first_panic
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}

/// GET / serves the static status page and records a startup/health status line.
async fn status_page() -> Html<&'static str> {
    log::info!(
        "[STATUS] SYSTEM_STARTUP: user=system version={}",
        env!("CARGO_PKG_VERSION")
    );
    Html(STATUS_PAGE)
}

/// GET /health returns a simple JSON probe.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.gateway.port,
    }))
}
