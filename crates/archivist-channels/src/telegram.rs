use crate::channel::{
    parse_command, Channel, ChannelEvent, ChannelMessage, IncomingFile, MessageContent,
};
use archivist_core::{
    ArchivistError, ArchivistResult, ArtifactSink, Delivery, FileSource, MenuButton, Notifier,
    OwnerId,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram Bot API channel adapter.
///
/// Uses the Bot HTTP API for sending messages and documents and long-polling
/// (`getUpdates`) for receiving them. Incoming messages, uploads and button
/// presses are forwarded through a `tokio::sync::mpsc` channel as
/// [`ChannelEvent`]s. Uploads are not downloaded here; each carries a
/// [`TelegramFileSource`] the pipeline pulls from once the upload is
/// accepted.
pub struct TelegramChannel {
    api: BotApi,
    poll_timeout_secs: u64,
    retry_delay: Duration,
    event_tx: mpsc::Sender<ChannelEvent>,
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,
}

// ── Telegram API types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessagePayload>,
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessagePayload {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
    document: Option<TelegramDocument>,
    video: Option<TelegramDocument>,
    photo: Option<Vec<TelegramPhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TelegramDocument {
    file_id: String,
    file_name: Option<String>,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TelegramPhotoSize {
    file_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    from: TelegramUser,
    message: Option<TelegramCallbackMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackMessage {
    chat: TelegramChat,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct GetFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

// ── HTTP plumbing ───────────────────────────────────────────────────────────

#[derive(Clone)]
struct BotApi {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl BotApi {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> ArchivistResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ArchivistError::Channel(format!("Telegram {method} error: {e}")))?;
        read_response(method, response).await
    }
}

async fn read_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> ArchivistResult<T> {
    let body: TelegramResponse<T> = response
        .json()
        .await
        .map_err(|e| ArchivistError::Channel(format!("Telegram parse error: {e}")))?;

    if !body.ok {
        return Err(ArchivistError::Channel(format!(
            "Telegram {method} failed: {}",
            body.description.unwrap_or_default()
        )));
    }
    body.result
        .ok_or_else(|| ArchivistError::Channel(format!("Telegram {method} returned no result")))
}

/// Statuses that mean the token is wrong or revoked; polling cannot recover.
fn is_credential_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    )
}

// ── Implementation ──────────────────────────────────────────────────────────

impl TelegramChannel {
    /// Create a new `TelegramChannel`.
    ///
    /// * `bot_token` – The bot token obtained from @BotFather.
    /// * `event_buffer` – Capacity of the internal mpsc event buffer.
    pub fn new(bot_token: impl Into<String>, event_buffer: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        Self {
            api: BotApi {
                client: reqwest::Client::new(),
                api_base: DEFAULT_API_BASE.to_string(),
                bot_token: bot_token.into(),
            },
            poll_timeout_secs: 30,
            retry_delay: RETRY_DELAY,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Point the adapter at another Bot API server, e.g. a self-hosted one
    /// that lifts the 20 MB download limit.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Wait this long before polling again after a failed `getUpdates`.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Take the receiving half of the event channel.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    /// Start long-polling the Telegram `getUpdates` endpoint.
    ///
    /// Runs until the event receiver is dropped. Network failures, server
    /// errors and unreadable responses are retried after a delay; only a
    /// rejected token (401, 403 or 404) ends the loop with an error. It should be spawned onto a Tokio task.
    pub async fn poll_updates(&self) -> ArchivistResult<()> {
        let mut offset: Option<i64> = None;
        info!("Telegram channel polling for updates");

        loop {
            let request = GetUpdatesRequest {
                offset,
                timeout: self.poll_timeout_secs,
                allowed_updates: &["message", "callback_query"],
            };
            let response = match self
                .api
                .client
                .post(self.api.method_url("getUpdates"))
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Telegram poll error");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            let status = response.status();
            let updates: Vec<TelegramUpdate> = match read_response("getUpdates", response).await {
                Ok(updates) => updates,
                Err(e) if is_credential_rejection(status) => {
                    let _ = self
                        .event_tx
                        .send(ChannelEvent::Disconnected(e.to_string()))
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(status = %status, error = %e, "Telegram poll failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            for update in updates {
                // Advance the offset so we do not receive this update again.
                offset = Some(update.update_id + 1);

                if let Some(message) = self.parse_update(update) {
                    if self
                        .event_tx
                        .send(ChannelEvent::MessageReceived(message))
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn parse_update(&self, update: TelegramUpdate) -> Option<ChannelMessage> {
        if let Some(query) = update.callback_query {
            let (chat_id, private) = query
                .message
                .map_or((query.from.id, true), |m| (m.chat.id, m.chat.kind == "private"));
            return Some(ChannelMessage {
                sender: OwnerId(query.from.id),
                chat_id,
                private,
                content: MessageContent::Callback {
                    id: query.id,
                    data: query.data.unwrap_or_default(),
                },
            });
        }

        let mut msg = update.message?;
        let sender = OwnerId(msg.from.as_ref()?.id);
        let private = msg.chat.kind == "private";
        let chat_id = msg.chat.id;

        let content = if let Some(text) = msg.text.take() {
            match parse_command(&text) {
                Some((name, args)) => MessageContent::Command { name, args },
                None => MessageContent::Text(text),
            }
        } else {
            MessageContent::File(self.incoming_file(msg)?)
        };

        Some(ChannelMessage {
            sender,
            chat_id,
            private,
            content,
        })
    }

    /// Documents and videos keep their own name; photos have none and are
    /// named after the message.
    fn incoming_file(&self, msg: TelegramMessagePayload) -> Option<IncomingFile> {
        let id = msg.message_id;
        let (file_id, display_name, size) = if let Some(doc) = msg.document {
            let name = doc.file_name.unwrap_or_else(|| format!("document_{id}"));
            (doc.file_id, name, doc.file_size)
        } else if let Some(video) = msg.video {
            let name = video.file_name.unwrap_or_else(|| format!("video_{id}.mp4"));
            (video.file_id, name, video.file_size)
        } else {
            // Telegram lists photo sizes smallest first.
            let photo = msg.photo?.pop()?;
            (photo.file_id, format!("photo_{id}.jpg"), photo.file_size)
        };

        Some(IncomingFile {
            display_name,
            size: size.unwrap_or(0),
            source: Arc::new(TelegramFileSource {
                api: self.api.clone(),
                file_id,
            }),
        })
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> ArchivistResult<()> {
        let payload = SendMessageRequest {
            chat_id,
            text,
            reply_markup,
        };
        let _: serde_json::Value = self.api.call("sendMessage", &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramChannel {
    async fn notify(&self, owner: OwnerId, text: &str) -> ArchivistResult<()> {
        self.send_text(owner.0, text, None).await
    }

    async fn notify_with_menu(
        &self,
        owner: OwnerId,
        text: &str,
        menu: &[Vec<MenuButton>],
    ) -> ArchivistResult<()> {
        let inline_keyboard = menu
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| InlineKeyboardButton {
                        text: button.label.clone(),
                        callback_data: button.action.clone(),
                    })
                    .collect()
            })
            .collect();
        self.send_text(owner.0, text, Some(InlineKeyboardMarkup { inline_keyboard }))
            .await
    }
}

#[async_trait]
impl ArtifactSink for TelegramChannel {
    async fn deliver(&self, owner: OwnerId, delivery: &Delivery) -> ArchivistResult<()> {
        let file = tokio::fs::File::open(&delivery.path).await?;
        let length = file.metadata().await?.len();
        let file_name = delivery
            .path
            .file_name()
            .map_or_else(|| "archive".to_string(), |n| n.to_string_lossy().into_owned());

        let document = Part::stream_with_length(reqwest::Body::from(file), length)
            .file_name(file_name.clone());
        let form = Form::new()
            .text("chat_id", owner.to_string())
            .text("caption", delivery.caption.clone())
            .part("document", document);

        let response = self
            .api
            .client
            .post(self.api.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ArchivistError::Delivery(format!("Telegram sendDocument error: {e}")))?;
        let _: serde_json::Value = read_response("sendDocument", response)
            .await
            .map_err(|e| ArchivistError::Delivery(e.to_string()))?;

        info!(owner = %owner, file = %file_name, bytes = length, "Telegram document sent");
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ArchivistResult<()> {
        let payload = AnswerCallbackRequest {
            callback_query_id: callback_id,
            text,
        };
        let _: serde_json::Value = self.api.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }
}

/// Lazily downloads one Telegram upload via `getFile`.
#[derive(Clone)]
pub struct TelegramFileSource {
    api: BotApi,
    file_id: String,
}

#[async_trait]
impl FileSource for TelegramFileSource {
    async fn save_to(&self, dest: &Path) -> ArchivistResult<u64> {
        let file: TelegramFile = self
            .api
            .call(
                "getFile",
                &GetFileRequest {
                    file_id: &self.file_id,
                },
            )
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| ArchivistError::Channel("Missing file_path in getFile response".into()))?;

        let response = self
            .api
            .client
            .get(self.api.file_url(&file_path))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ArchivistError::Channel(format!("Telegram download error: {e}")))?;

        let mut out = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ArchivistError::Channel(format!("Telegram download error: {e}")))?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn channel() -> TelegramChannel {
        TelegramChannel::new("TOKEN", 8)
    }

    fn update(json: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_urls() {
        let ch = channel().with_api_base("http://localhost:8081/");
        assert_eq!(
            ch.api.method_url("getMe"),
            "http://localhost:8081/botTOKEN/getMe"
        );
        assert_eq!(
            ch.api.file_url("documents/a.txt"),
            "http://localhost:8081/file/botTOKEN/documents/a.txt"
        );
    }

    #[test]
    fn test_parse_command_message() {
        let msg = channel()
            .parse_update(update(serde_json::json!({
                "update_id": 1,
                "message": {
                    "message_id": 10,
                    "from": {"id": 42, "first_name": "A"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "/authorise 77"
                }
            })))
            .unwrap();
        assert_eq!(msg.sender, OwnerId(42));
        assert!(msg.private);
        match msg.content {
            MessageContent::Command { name, args } => {
                assert_eq!(name, "authorise");
                assert_eq!(args, vec!["77"]);
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_document_upload() {
        let msg = channel()
            .parse_update(update(serde_json::json!({
                "update_id": 2,
                "message": {
                    "message_id": 11,
                    "from": {"id": 42},
                    "chat": {"id": 42, "type": "private"},
                    "document": {"file_id": "F1", "file_name": "a.txt", "file_size": 5}
                }
            })))
            .unwrap();
        match msg.content {
            MessageContent::File(file) => {
                assert_eq!(file.display_name, "a.txt");
                assert_eq!(file.size, 5);
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_photo_picks_largest() {
        let msg = channel()
            .parse_update(update(serde_json::json!({
                "update_id": 3,
                "message": {
                    "message_id": 12,
                    "from": {"id": 42},
                    "chat": {"id": -100, "type": "group"},
                    "photo": [
                        {"file_id": "small", "file_size": 10, "width": 90, "height": 90},
                        {"file_id": "large", "file_size": 900, "width": 800, "height": 800}
                    ]
                }
            })))
            .unwrap();
        assert!(!msg.private);
        match msg.content {
            MessageContent::File(file) => {
                assert_eq!(file.display_name, "photo_12.jpg");
                assert_eq!(file.size, 900);
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_callback() {
        let msg = channel()
            .parse_update(update(serde_json::json!({
                "update_id": 4,
                "callback_query": {
                    "id": "cb-1",
                    "from": {"id": 42},
                    "message": {"message_id": 5, "chat": {"id": 42, "type": "private"}},
                    "data": "create_zip"
                }
            })))
            .unwrap();
        match msg.content {
            MessageContent::Callback { id, data } => {
                assert_eq!(id, "cb-1");
                assert_eq!(data, "create_zip");
            }
            other => panic!("expected callback, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_message_ignored() {
        let parsed = channel().parse_update(update(serde_json::json!({
            "update_id": 5,
            "message": {
                "message_id": 13,
                "from": {"id": 42},
                "chat": {"id": 42, "type": "private"},
                "sticker": {"file_id": "S"}
            }
        })));
        assert!(parsed.is_none());
    }
}
