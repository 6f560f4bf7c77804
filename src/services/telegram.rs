// Telegram Bot API client: outbound messages and long-polling for updates

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::services::notifier::{ChatTransport, InlineKeyboard, MessageRef, TransportError};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP call gives up.
const POLL_MARGIN_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub caption: Option<String>,
}

impl Message {
    /// File id of the largest size of an attached photo.
    pub fn largest_photo(&self) -> Option<&str> {
        self.photo
            .as_ref()?
            .iter()
            .max_by_key(|p| p.width * p.height)
            .map(|p| p.file_id.as_str())
    }

    pub fn reference(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat.id,
            message_id: self.message_id,
            has_media: self.photo.is_some(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

fn reply_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

pub struct TelegramClient {
    http: reqwest::Client,
    poll_http: reqwest::Client,
    base_url: Url,
    token: Secret<String>,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(
        base_url: &str,
        token: Secret<String>,
        timeout: Duration,
        poll_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            poll_http: reqwest::Client::builder()
                .timeout(Duration::from_secs(poll_timeout_secs + POLL_MARGIN_SECS))
                .build()?,
            base_url: Url::parse(base_url)?,
            token,
            poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token.expose_secret()))
            .push(method);
        Ok(url)
    }

    async fn call_with<T: DeserializeOwned>(
        &self,
        http: &reqwest::Client,
        method: &str,
        body: Value,
    ) -> Result<T, TransportError> {
        let response = http.post(self.method_url(method)?).json(&body).send().await?;
        let status = response.status().as_u16();
        let parsed: ApiResponse<T> = response.json().await?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => {
                let description = other
                    .description
                    .unwrap_or_else(|| "no description".to_string());
                tracing::debug!(method, status, description = %description, "Bot API call failed");
                Err(TransportError::Api {
                    code: other.error_code.unwrap_or(status),
                    description,
                })
            }
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, TransportError> {
        self.call_with(&self.http, method, body).await
    }

    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", json!({})).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        self.call_with(
            &self.poll_http,
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TransportError> {
        let _: bool = self
            .call("setMyCommands", json!({ "commands": commands }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    #[tracing::instrument(skip(self, text, keyboard))]
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let message: Message = self.call("sendMessage", body).await?;
        Ok(message.reference())
    }

    #[tracing::instrument(skip(self, caption, keyboard))]
    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        let mut body = json!({
            "chat_id": chat_id,
            "photo": photo,
            "caption": caption,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let message: Message = self.call("sendPhoto", body).await?;
        Ok(MessageRef {
            has_media: true,
            ..message.reference()
        })
    }

    #[tracing::instrument(skip(self, text))]
    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), TransportError> {
        let (method, field) = if message.has_media {
            ("editMessageCaption", "caption")
        } else {
            ("editMessageText", "text")
        };
        let mut body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "parse_mode": "HTML",
        });
        body[field] = Value::from(text);

        // Returns the edited message, or `true` for inline messages.
        let _: Value = self.call(method, body).await?;
        Ok(())
    }

    async fn acknowledge(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = Value::from(text);
        }
        let _: bool = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<String, TransportError> {
        let me = self.get_me().await?;
        Ok(me.username.unwrap_or(me.first_name))
    }
}
