use serde::{Deserialize, Serialize};

// -- Inbound --

/// One inbound event from the platform, carrying its platform-assigned id.
/// Exactly one of the payload fields is normally present.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    /// Absent for media-only messages.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message the tapped control was attached to.
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

// -- Outbound --

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Inline(InlineKeyboardMarkup),
    Keyboard(ReplyKeyboardMarkup),
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
}

impl ReplyKeyboardMarkup {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            keyboard: rows
                .into_iter()
                .map(|row| row.into_iter().map(|text| KeyboardButton { text }).collect())
                .collect(),
            resize_keyboard: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_text_message_update() {
        let json = r#"{
            "update_id": 900100,
            "message": {
                "message_id": 5,
                "from": {"id": 77, "first_name": "Lena", "username": "lena_w"},
                "chat": {"id": 77},
                "text": "hello"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 900100);
        let msg = update.message.unwrap();
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert_eq!(msg.from.unwrap().id, 77);
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn parses_a_callback_update_and_tolerates_extra_fields() {
        let json = r#"{
            "update_id": 900101,
            "callback_query": {
                "id": "abc123",
                "from": {"id": 88, "first_name": "Omar", "language_code": "en"},
                "message": {"message_id": 9, "chat": {"id": 88}, "date": 1730000000},
                "data": "vote_up_3",
                "chat_instance": "-55"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let cb = update.callback_query.unwrap();
        assert_eq!(cb.data.as_deref(), Some("vote_up_3"));
        assert_eq!(cb.message.unwrap().message_id, 9);
    }

    #[test]
    fn media_only_message_has_no_text() {
        let json = r#"{
            "update_id": 900102,
            "message": {
                "message_id": 6,
                "from": {"id": 77, "first_name": "Lena"},
                "chat": {"id": 77},
                "photo": [{"file_id": "xyz", "width": 90, "height": 90}]
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert!(update.message.unwrap().text.is_none());
    }

    #[test]
    fn inline_buttons_serialize_one_field_only() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton::callback("👍 2", "vote_up_3"),
                InlineKeyboardButton::link("site", "https://example.org"),
            ]],
        };
        let json = serde_json::to_value(&markup).unwrap();
        let row = &json["inline_keyboard"][0];
        assert_eq!(row[0]["callback_data"], "vote_up_3");
        assert!(row[0].get("url").is_none());
        assert_eq!(row[1]["url"], "https://example.org");
        assert!(row[1].get("callback_data").is_none());
    }
}
