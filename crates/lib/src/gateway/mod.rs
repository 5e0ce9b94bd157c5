//! Gateway: HTTP server for the messaging webhook.
//!
//! `POST {webhookPath}` verifies the signature and runs every event through the pipeline before
//! answering; `GET /` serves a static status page and `GET /health` a JSON probe.

mod server;

pub use server::{build_router, run_gateway, GatewayState, WebhookResponse};
