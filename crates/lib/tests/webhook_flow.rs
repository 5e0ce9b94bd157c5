//! Integration test: the gateway against an in-process stand-in for the LINE, Gemini, and Notion
//! APIs. Each test gets its own mock and gateway on free ports.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use receipts::config::Config;
use receipts::gateway;
use receipts::signature::compute_signature;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHANNEL_SECRET: &str = "test-channel-secret";
const RECEIPT_JSON: &str = r#"{"storeName":"Cafe X","amount":550,"date":"2025-03-15-13:45","category":"カフェ","paymentMethod":"電子マネー"}"#;
const UNSAVABLE_RECEIPT_JSON: &str = r#"{"storeName":"Closed Shop","amount":1200,"date":"2025-03-16","category":"スーパー","paymentMethod":"現金"}"#;

/// Image ids the mock answers with bytes that make a later upstream call fail.
const UNSAVABLE_IMAGE_ID: &str = "img-unsavable";
const UNREADABLE_IMAGE_ID: &str = "img-unreadable";
/// Base64 of the bytes served for those ids, as they reach the analysis request.
const UNSAVABLE_IMAGE_B64: &str = "AQID";
const UNREADABLE_IMAGE_B64: &str = "BAUG";
/// Store name the mock database refuses.
const REFUSED_STORE: &str = "Closed Shop";

/// Outbound calls seen by the mock, in order: (endpoint, body).
#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(&'static str, Value)>>>);

impl Recorded {
    fn push(&self, endpoint: &'static str, body: Value) {
        self.0.lock().unwrap().push((endpoint, body));
    }

    fn all(&self) -> Vec<(&'static str, Value)> {
        self.0.lock().unwrap().clone()
    }

    fn of(&self, endpoint: &str) -> Vec<Value> {
        self.all()
            .into_iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, v)| v)
            .collect()
    }
}

async fn reply(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.push("reply", body);
    Json(json!({}))
}

async fn push(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.push("push", body);
    Json(json!({}))
}

async fn content(
    State(rec): State<Recorded>,
    Path(id): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    rec.push("content", json!({ "id": id }));
    match id.as_str() {
        "missing" => Err(StatusCode::NOT_FOUND),
        UNSAVABLE_IMAGE_ID => Ok(vec![1, 2, 3]),
        UNREADABLE_IMAGE_ID => Ok(vec![4, 5, 6]),
        _ => Ok(vec![0xff, 0xd8, 0xff, 0xe0]),
    }
}

async fn generate(
    State(rec): State<Recorded>,
    Path(call): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let image = body["contents"][0]["parts"][1]["inline_data"]["data"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    rec.push("gemini", json!({ "call": call, "body": body }));
    let answer = match image.as_str() {
        UNREADABLE_IMAGE_B64 => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "code": 500, "status": "INTERNAL" } })),
            ))
        }
        UNSAVABLE_IMAGE_B64 => UNSAVABLE_RECEIPT_JSON,
        _ => RECEIPT_JSON,
    };
    Ok(Json(json!({
        "candidates": [{
            "content": { "parts": [{ "text": format!("```json\n{}\n```", answer) }] }
        }]
    })))
}

async fn create_page(
    State(rec): State<Recorded>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let refused = body["properties"]["店名"]["title"][0]["text"]["content"] == REFUSED_STORE;
    rec.push("notion", body);
    if refused {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "object": "error", "status": 400, "code": "validation_error" })),
        ));
    }
    Ok(Json(json!({ "object": "page", "id": "page-1" })))
}

async fn start_mock() -> (u16, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/v2/bot/message/reply", post(reply))
        .route("/v2/bot/message/push", post(push))
        .route("/v2/bot/message/:id/content", get(content))
        .route("/v1beta/models/:call", post(generate))
        .route("/v1/pages", post(create_page))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (port, rec)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Gateway wired to the mock. Returns the gateway base URL and the mock's record.
async fn start() -> (String, Recorded) {
    let (mock_port, rec) = start_mock().await;
    let mock = format!("http://127.0.0.1:{}", mock_port);

    let dir = std::env::temp_dir().join(format!("receipt-bot-flow-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create config dir");
    let config_path = dir.join("config.json");
    std::fs::File::create(&config_path)
        .and_then(|mut f| f.write_all(b"{}"))
        .expect("write config.json");

    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.line.api_base = mock.clone();
    config.line.data_api_base = mock.clone();
    config.gemini.base_url = mock.clone();
    config.notion.base_url = mock;
    config.secrets.line_channel_secret = Some(CHANNEL_SECRET.to_string());
    config.secrets.line_access_token = Some("line-token".to_string());
    config.secrets.gemini_api_key = Some("gemini-key".to_string());
    config.secrets.notion_api_key = Some("notion-key".to_string());
    config.secrets.notion_database_id = Some("0123456789abcdef0123456789abcdef".to_string());

    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/health", base)).send().await {
            if resp.status().is_success() {
                return (base, rec);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not become healthy within 5s", base);
}

async fn post_webhook(base: &str, body: &str, signature: Option<&str>) -> Value {
    let mut req = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .header("content-type", "application/json")
        .body(body.to_string());
    if let Some(sig) = signature {
        req = req.header("x-line-signature", sig);
    }
    let resp = req.send().await.expect("post webhook");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    resp.json().await.expect("parse webhook response")
}

async fn post_signed(base: &str, body: &str) -> Value {
    let sig = compute_signature(body.as_bytes(), Some(CHANNEL_SECRET)).expect("sign body");
    post_webhook(base, body, Some(&sig)).await
}

fn image_event(message_id: &str) -> String {
    json!({
        "events": [{
            "type": "message",
            "replyToken": "reply-1",
            "source": { "type": "user", "userId": "U123" },
            "message": { "type": "image", "id": message_id }
        }]
    })
    .to_string()
}

#[tokio::test]
async fn empty_event_list_makes_no_outbound_calls() {
    let (base, rec) = start().await;
    let res = post_signed(&base, r#"{"destination":"Uabc","events":[]}"#).await;
    assert_eq!(res, json!({ "status": "success" }));
    assert!(rec.all().is_empty());
}

#[tokio::test]
async fn wrong_signature_is_rejected_without_processing() {
    let (base, rec) = start().await;
    let body = image_event("m1");
    let res = post_webhook(&base, &body, Some("bm90LWEtc2lnbmF0dXJl")).await;
    assert_eq!(res, json!({ "status": "error", "message": "Invalid signature" }));
    assert!(rec.all().is_empty());
}

#[tokio::test]
async fn unsigned_text_message_is_processed_and_acknowledged() {
    let (base, rec) = start().await;
    let body = json!({
        "events": [{
            "type": "message",
            "replyToken": "reply-t",
            "source": { "userId": "U123" },
            "message": { "type": "text", "id": "t1", "text": "hello" }
        }]
    })
    .to_string();
    let res = post_webhook(&base, &body, None).await;
    assert_eq!(
        res,
        json!({ "status": "success", "message": "Processed without signature validation" })
    );
    let replies = rec.of("reply");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["replyToken"], "reply-t");
    assert_eq!(replies[0]["messages"][0]["text"], "テストOK");
}

#[tokio::test]
async fn non_message_events_are_ignored() {
    let (base, rec) = start().await;
    let body = json!({
        "events": [
            { "type": "follow", "replyToken": "r", "source": { "userId": "U1" } },
            { "type": "unfollow", "source": { "userId": "U1" } }
        ]
    })
    .to_string();
    let res = post_signed(&base, &body).await;
    assert_eq!(res["status"], "success");
    assert!(rec.all().is_empty());
}

#[tokio::test]
async fn image_fetch_failure_pushes_one_notice_and_stops() {
    let (base, rec) = start().await;
    let res = post_signed(&base, &image_event("missing")).await;
    assert_eq!(res["status"], "success");

    let pushes = rec.of("push");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["to"], "U123");
    assert_eq!(
        pushes[0]["messages"][0]["text"],
        "画像の取得に失敗しました。もう一度試してください。"
    );
    assert!(rec.of("gemini").is_empty());
    assert!(rec.of("notion").is_empty());
}

#[tokio::test]
async fn receipt_image_is_analyzed_saved_and_summarized() {
    let (base, rec) = start().await;
    let res = post_signed(&base, &image_event("img-1")).await;
    assert_eq!(res, json!({ "status": "success" }));

    let order: Vec<&str> = rec.all().into_iter().map(|(e, _)| e).collect();
    assert_eq!(order, vec!["reply", "content", "gemini", "notion", "push"]);

    let reply = &rec.of("reply")[0];
    assert_eq!(reply["replyToken"], "reply-1");
    assert_eq!(reply["messages"][0]["text"], "レシートを解析しています...");

    let gemini = &rec.of("gemini")[0];
    assert_eq!(gemini["call"], "gemini-2.0-flash:generateContent");
    assert_eq!(
        gemini["body"]["contents"][0]["parts"][1]["inline_data"]["data"],
        "/9j/4A=="
    );

    let page = &rec.of("notion")[0];
    assert_eq!(
        page["parent"]["database_id"],
        "01234567-89ab-cdef-0123-456789abcdef"
    );
    let props = &page["properties"];
    assert_eq!(props["店名"]["title"][0]["text"]["content"], "Cafe X");
    assert_eq!(props["金額"]["number"].as_f64(), Some(550.0));
    assert_eq!(props["日付"]["date"]["start"], "2025-03-15T13:45:00.000+09:00");
    assert_eq!(props["確認ステータス"]["select"]["name"], "未確認");

    let push = &rec.of("push")[0];
    assert_eq!(push["to"], "U123");
    let text = push["messages"][0]["text"].as_str().unwrap_or_default();
    assert!(text.starts_with("レシートの解析が完了しました！"), "{}", text);
    assert!(text.contains("Cafe X"), "{}", text);
    assert!(text.contains("2025/03/15/13:45"), "{}", text);
}

#[tokio::test]
async fn failed_event_does_not_affect_the_next_one() {
    let (base, rec) = start().await;
    let body = json!({
        "events": [
            {
                "type": "message",
                "replyToken": "reply-1",
                "source": { "userId": "U123" },
                "message": { "type": "image", "id": "missing" }
            },
            {
                "type": "message",
                "replyToken": "reply-2",
                "source": { "userId": "U456" },
                "message": { "type": "text", "id": "t2", "text": "hello" }
            }
        ]
    })
    .to_string();
    let res = post_signed(&base, &body).await;
    assert_eq!(res, json!({ "status": "success" }));

    let order: Vec<&str> = rec.all().into_iter().map(|(e, _)| e).collect();
    assert_eq!(order, vec!["reply", "content", "push", "reply"]);

    let pushes = rec.of("push");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["to"], "U123");
    assert_eq!(
        pushes[0]["messages"][0]["text"],
        "画像の取得に失敗しました。もう一度試してください。"
    );

    let replies = rec.of("reply");
    assert_eq!(replies[1]["replyToken"], "reply-2");
    assert_eq!(replies[1]["messages"][0]["text"], "テストOK");
}

#[tokio::test]
async fn refused_page_still_reports_the_analysis() {
    let (base, rec) = start().await;
    let res = post_signed(&base, &image_event(UNSAVABLE_IMAGE_ID)).await;
    assert_eq!(res, json!({ "status": "success" }));

    let order: Vec<&str> = rec.all().into_iter().map(|(e, _)| e).collect();
    assert_eq!(order, vec!["reply", "content", "gemini", "notion", "push"]);

    let pushes = rec.of("push");
    assert_eq!(pushes.len(), 1);
    let text = pushes[0]["messages"][0]["text"].as_str().unwrap_or_default();
    assert!(
        text.starts_with("レシートの解析は完了しましたが、Notionへの保存に失敗しました。"),
        "{}",
        text
    );
    assert!(text.contains("Closed Shop"), "{}", text);
    assert!(text.contains("2025/03/16"), "{}", text);
}

#[tokio::test]
async fn analysis_api_error_pushes_failure_and_skips_storage() {
    let (base, rec) = start().await;
    let res = post_signed(&base, &image_event(UNREADABLE_IMAGE_ID)).await;
    assert_eq!(res, json!({ "status": "success" }));

    let order: Vec<&str> = rec.all().into_iter().map(|(e, _)| e).collect();
    assert_eq!(order, vec!["reply", "content", "gemini", "push"]);
    assert!(rec.of("notion").is_empty());

    let pushes = rec.of("push");
    assert_eq!(pushes[0]["to"], "U123");
    assert_eq!(
        pushes[0]["messages"][0]["text"],
        "レシートの解析に失敗しました。鮮明な写真で再度お試しください。"
    );
}
