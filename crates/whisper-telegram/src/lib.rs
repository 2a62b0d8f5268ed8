pub mod types;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use types::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, Message,
    ReplyKeyboardMarkup, ReplyMarkup, Update, User,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The recipient has blocked the bot. Expected during notification and
    /// broadcast fan-out, counted but never propagated as fatal.
    #[error("recipient blocked the bot")]
    Blocked,
    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ApiError::Blocked)
    }
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ApiError> {
        if self.ok {
            return self.result.ok_or(ApiError::Api {
                code: 0,
                description: "ok response without result".into(),
            });
        }
        let code = self.error_code.unwrap_or(0);
        let description = self.description.unwrap_or_default();
        // 403 is the platform's "bot was blocked by the user"
        if code == 403 {
            Err(ApiError::Blocked)
        } else {
            Err(ApiError::Api { code, description })
        }
    }
}

/// Outbound Bot API client. One shared reqwest client, JSON method calls.
#[derive(Clone)]
pub struct Bot {
    http: reqwest::Client,
    base: String,
}

impl Bot {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{}", token),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<Message, ApiError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup).map_err(|e| ApiError::Api {
                code: 0,
                description: e.to_string(),
            })?;
        }
        self.call("sendMessage", &payload).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), ApiError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup).map_err(|e| ApiError::Api {
                code: 0,
                description: e.to_string(),
            })?;
        }
        // The edited Message payload is not interesting to callers
        let _: serde_json::Value = self.call("editMessageText", &payload).await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut payload = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            payload["text"] = serde_json::Value::String(text.to_string());
        }
        let _: serde_json::Value = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, ApiError> {
        debug!("calling {}", method);
        let response = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(payload)
            .send()
            .await?;
        let envelope: ApiResponse<T> = response.json().await?;
        envelope.into_result()
    }
}
