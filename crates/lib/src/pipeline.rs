//! Per-event pipeline: filter the event, acknowledge it, then fetch image → analyze → persist →
//! notify.
//!
//! The flow is an explicit state machine. [`transition`] is pure: given the current [`State`] and
//! the outcome of the last external call ([`Input`]), it returns the next state, at most one
//! user-facing [`Notice`], and at most one external [`Call`] whose outcome feeds the next
//! transition. [`Pipeline`] performs notices and calls through the injected clients.

use crate::channels::{
    ChannelError, EventKind, InboundEvent, MessageType, Messenger, ReplyToken,
};
use crate::llm::{AnalysisError, ReceiptAnalyzer};
use crate::receipt::{ExtractedReceipt, PersistenceResult};
use crate::store::ReceiptStore;
use base64::Engine;

pub const TEXT_ACK: &str = "テストOK";
pub const PHOTO_PROMPT: &str = "レシートの写真を送信してください。";
pub const ANALYZING: &str = "レシートを解析しています...";
pub const IMAGE_FETCH_FAILED: &str = "画像の取得に失敗しました。もう一度試してください。";
pub const ANALYSIS_FAILED: &str = "レシートの解析に失敗しました。鮮明な写真で再度お試しください。";
pub const GENERIC_FAILURE: &str = "エラーが発生しました。しばらく経ってから再度お試しください。";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("message event without a message object")]
    MissingMessage,
    #[error("image message without a message id")]
    MissingMessageId,
    #[error("{0} message without a reply token")]
    MissingReplyToken(&'static str),
    #[error("unexpected input {input} in state {state}")]
    UnexpectedInput {
        state: &'static str,
        input: &'static str,
    },
}

/// Where an event is in its lifecycle.
#[derive(Debug)]
pub enum State {
    Received(InboundEvent),
    AwaitingImage { user_id: String, message_id: String },
    ImageFetched { user_id: String },
    Analyzed { user_id: String, receipt: ExtractedReceipt },
    Persisted,
    Done(Outcome),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Received(_) => "Received",
            State::AwaitingImage { .. } => "AwaitingImage",
            State::ImageFetched { .. } => "ImageFetched",
            State::Analyzed { .. } => "Analyzed",
            State::Persisted => "Persisted",
            State::Done(_) => "Done",
        }
    }
}

/// Terminal state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a message, or not something we can analyze.
    Filtered,
    TextReplied,
    Notified,
    Errored,
}

/// Outcome of the previous external call, fed into [`transition`].
#[derive(Debug)]
pub enum Input {
    Start,
    Fetched(Result<Vec<u8>, ChannelError>),
    Analysis(Result<ExtractedReceipt, AnalysisError>),
    Saved(PersistenceResult),
}

impl Input {
    fn name(&self) -> &'static str {
        match self {
            Input::Start => "Start",
            Input::Fetched(_) => "Fetched",
            Input::Analysis(_) => "Analysis",
            Input::Saved(_) => "Saved",
        }
    }
}

/// Text sent to the user. Fire-and-forget.
#[derive(Debug)]
pub enum Notice {
    Reply { token: ReplyToken, text: String },
    Push { user_id: String, text: String },
}

/// External call whose result drives the next transition.
#[derive(Debug, PartialEq)]
pub enum Call {
    FetchImage { message_id: String },
    Analyze { image_base64: String },
    Persist { receipt: ExtractedReceipt },
}

#[derive(Debug)]
pub struct Step {
    pub next: State,
    pub notice: Option<Notice>,
    pub call: Option<Call>,
}

impl Step {
    fn done(outcome: Outcome) -> Self {
        Self {
            next: State::Done(outcome),
            notice: None,
            call: None,
        }
    }

    fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }
}

fn push(user_id: &str, text: impl Into<String>) -> Notice {
    Notice::Push {
        user_id: user_id.to_string(),
        text: text.into(),
    }
}

/// Emit a status line for a pipeline stage.
fn status(stage: &str, user_id: &str, details: std::fmt::Arguments<'_>) {
    log::info!("[STATUS] {}: user={} {}", stage, user_id, details);
}

fn take_reply_token(
    event: &mut InboundEvent,
    kind: &'static str,
) -> Result<ReplyToken, PipelineError> {
    event
        .reply_token
        .take()
        .ok_or(PipelineError::MissingReplyToken(kind))
}

/// Classify a freshly received event.
fn on_received(mut event: InboundEvent) -> Result<Step, PipelineError> {
    let user_id = event.source_user_id.clone();
    status(
        "PROCESSING_STARTED",
        &user_id,
        format_args!(
            "eventType={} messageType={}",
            event.kind.as_str(),
            event.message_type.as_ref().map_or("none", |m| m.as_str())
        ),
    );

    if event.kind != EventKind::Message {
        status(
            "INVALID_EVENT_TYPE",
            &user_id,
            format_args!("eventType={}", event.kind.as_str()),
        );
        return Ok(Step::done(Outcome::Filtered));
    }

    match event.message_type.clone() {
        None => Err(PipelineError::MissingMessage),
        Some(MessageType::Text) => {
            let token = take_reply_token(&mut event, "text")?;
            status(
                "TEXT_MESSAGE_PROCESSED",
                &user_id,
                format_args!("text={:?}", event.text.as_deref().unwrap_or("")),
            );
            Ok(Step::done(Outcome::TextReplied).with_notice(Notice::Reply {
                token,
                text: TEXT_ACK.to_string(),
            }))
        }
        Some(MessageType::Image) => {
            let message_id = event
                .message_id
                .clone()
                .ok_or(PipelineError::MissingMessageId)?;
            let token = take_reply_token(&mut event, "image")?;
            status(
                "RECEIPT_ANALYSIS_STARTED",
                &user_id,
                format_args!("messageId={}", message_id),
            );
            Ok(Step {
                next: State::AwaitingImage {
                    user_id,
                    message_id: message_id.clone(),
                },
                notice: Some(Notice::Reply {
                    token,
                    text: ANALYZING.to_string(),
                }),
                call: Some(Call::FetchImage { message_id }),
            })
        }
        Some(other) => {
            let token = take_reply_token(&mut event, "non-image")?;
            status(
                "NON_IMAGE_MESSAGE",
                &user_id,
                format_args!("messageType={}", other.as_str()),
            );
            Ok(Step::done(Outcome::Filtered).with_notice(Notice::Reply {
                token,
                text: PHOTO_PROMPT.to_string(),
            }))
        }
    }
}

/// Advance one event by one step. Pure apart from status logging.
pub fn transition(state: State, input: Input) -> Result<Step, PipelineError> {
    match (state, input) {
        (State::Received(event), Input::Start) => on_received(event),

        (State::AwaitingImage { user_id, message_id }, Input::Fetched(result)) => match result {
            Ok(image) => {
                status(
                    "IMAGE_FETCH_SUCCESS",
                    &user_id,
                    format_args!("messageId={} size={}", message_id, image.len()),
                );
                let image_base64 = base64::engine::general_purpose::STANDARD.encode(&image);
                status(
                    "GEMINI_ANALYSIS_STARTED",
                    &user_id,
                    format_args!("messageId={}", message_id),
                );
                Ok(Step {
                    next: State::ImageFetched { user_id },
                    notice: None,
                    call: Some(Call::Analyze { image_base64 }),
                })
            }
            Err(e) => {
                log::error!("[ERROR in getImageFromLine] {}", e);
                status(
                    "IMAGE_FETCH_FAILED",
                    &user_id,
                    format_args!("messageId={}", message_id),
                );
                Ok(Step::done(Outcome::Errored).with_notice(push(&user_id, IMAGE_FETCH_FAILED)))
            }
        },

        (State::ImageFetched { user_id }, Input::Analysis(result)) => match result {
            Ok(receipt) => {
                status(
                    "GEMINI_ANALYSIS_SUCCESS",
                    &user_id,
                    format_args!("storeName={} amount={}", receipt.store_name, receipt.amount),
                );
                let unlisted = receipt.unlisted_fields();
                if !unlisted.is_empty() {
                    log::debug!("receipt values outside the offered choices: {:?}", unlisted);
                }
                status("NOTION_SAVE_STARTED", &user_id, format_args!(""));
                Ok(Step {
                    next: State::Analyzed {
                        user_id,
                        receipt: receipt.clone(),
                    },
                    notice: None,
                    call: Some(Call::Persist { receipt }),
                })
            }
            Err(e) => {
                log::error!("[ERROR in analyzeReceiptWithGemini] {}", e);
                status("GEMINI_ANALYSIS_FAILED", &user_id, format_args!(""));
                Ok(Step::done(Outcome::Errored).with_notice(push(&user_id, ANALYSIS_FAILED)))
            }
        },

        (State::Analyzed { user_id, receipt }, Input::Saved(result)) => {
            match result.error() {
                None => status(
                    "NOTION_SAVE_SUCCESS",
                    &user_id,
                    format_args!("pageId={}", result.page_id().unwrap_or("")),
                ),
                Some(error) => status(
                    "NOTION_SAVE_FAILED",
                    &user_id,
                    format_args!("error={}", error),
                ),
            }
            let message = result_message(&receipt, &result);
            status(
                "PROCESS_COMPLETE",
                &user_id,
                format_args!(
                    "storeName={} amount={} notionSaved={}",
                    receipt.store_name,
                    receipt.amount,
                    result.is_success()
                ),
            );
            Ok(Step {
                next: State::Persisted,
                notice: Some(push(&user_id, message)),
                call: None,
            })
        }

        (State::Persisted, Input::Start) => Ok(Step::done(Outcome::Notified)),

        (state, input) => Err(PipelineError::UnexpectedInput {
            state: state.name(),
            input: input.name(),
        }),
    }
}

fn summary(receipt: &ExtractedReceipt) -> String {
    format!(
        "【解析結果】\n店名: {}\n金額: {}円\n日付: {}\nジャンル: {}\n決済方法: {}",
        receipt.store_name,
        receipt.amount,
        receipt.display_date(),
        receipt.category,
        receipt.payment_method
    )
}

/// Final message for an analyzed receipt, depending on whether it was saved.
pub fn result_message(receipt: &ExtractedReceipt, result: &PersistenceResult) -> String {
    if result.is_success() {
        format!(
            "レシートの解析が完了しました！\n\n{}\n\n内容に誤りがある場合は、Notionで直接編集してください。",
            summary(receipt)
        )
    } else {
        format!(
            "レシートの解析は完了しましたが、Notionへの保存に失敗しました。\n\n{}",
            summary(receipt)
        )
    }
}

/// Runs events through the state machine using the injected clients.
pub struct Pipeline<'a> {
    messenger: &'a dyn Messenger,
    analyzer: &'a dyn ReceiptAnalyzer,
    store: &'a dyn ReceiptStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        messenger: &'a dyn Messenger,
        analyzer: &'a dyn ReceiptAnalyzer,
        store: &'a dyn ReceiptStore,
    ) -> Self {
        Self {
            messenger,
            analyzer,
            store,
        }
    }

    /// Process one event to a terminal outcome. Never fails: errors end in [`Outcome::Errored`]
    /// after a best-effort apology push.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let user_id = event.source_user_id.clone();
        match self.run(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[ERROR in handleEvent] {}", e);
                status("PROCESS_ERROR", &user_id, format_args!("error={}", e));
                self.notify_failure(&user_id).await;
                Outcome::Errored
            }
        }
    }

    /// Best-effort generic retry message to `user_id`. A push failure is only logged.
    pub async fn notify_failure(&self, user_id: &str) {
        if let Err(e) = self.messenger.push(user_id, GENERIC_FAILURE).await {
            log::error!("[ERROR in notifyError] {}", e);
        }
    }

    async fn run(&self, event: InboundEvent) -> Result<Outcome, PipelineError> {
        let mut state = State::Received(event);
        let mut input = Input::Start;
        loop {
            let step = transition(state, input)?;
            if let Some(notice) = step.notice {
                self.notify(notice).await;
            }
            state = step.next;
            input = match step.call {
                Some(call) => self.perform(call).await,
                None => match state {
                    State::Done(outcome) => return Ok(outcome),
                    _ => Input::Start,
                },
            };
        }
    }

    async fn notify(&self, notice: Notice) {
        match notice {
            Notice::Reply { token, text } => {
                if let Err(e) = self.messenger.reply(token, &text).await {
                    log::error!("[ERROR in replyToUser] {}", e);
                }
            }
            Notice::Push { user_id, text } => {
                if let Err(e) = self.messenger.push(&user_id, &text).await {
                    log::error!("[ERROR in notifyUser] {}", e);
                }
            }
        }
    }

    async fn perform(&self, call: Call) -> Input {
        match call {
            Call::FetchImage { message_id } => {
                Input::Fetched(self.messenger.fetch_content(&message_id).await)
            }
            Call::Analyze { image_base64 } => {
                Input::Analysis(self.analyzer.analyze(&image_base64).await)
            }
            Call::Persist { receipt } => Input::Saved(self.store.persist(&receipt).await),
        }
    }
}
