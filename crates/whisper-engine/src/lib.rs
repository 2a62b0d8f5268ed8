pub mod board;
pub mod delivery;
pub mod dispatch;
pub mod flows;
pub mod streak;

use std::collections::HashSet;
use std::sync::Arc;

use whisper_db::Database;
use whisper_telegram::{InlineKeyboardMarkup, ReplyMarkup};
use whisper_types::Role;

use crate::delivery::DeliveryQueue;

/// Aura awarded to the author when a confession is approved.
pub const AURA_APPROVAL: i64 = 10;
/// Aura awarded for commenting. Replying awards nothing.
pub const AURA_COMMENT: i64 = 2;

/// Approved confessions per browse page.
pub const PAGE_SIZE: u32 = 10;

/// Config keys with their fallback values. Admins can override any of these
/// through the config store; dispatch matches menu taps against the
/// effective value.
pub const CONFIG_DEFAULTS: &[(&str, &str)] = &[
    ("welcome_text", "Welcome to Whisper. Say what you cannot say out loud."),
    ("menu_confess", "🙊 Confess"),
    ("menu_browse", "📖 Browse"),
    ("menu_profile", "👤 Profile"),
    ("menu_streak", "🔥 Streak"),
    ("menu_leaderboard", "🏆 Leaderboard"),
];

/// The interaction engine: everything between an already-deduplicated
/// webhook payload and the outbound sends it decides on.
pub struct Engine {
    pub(crate) db: Arc<Database>,
    pub(crate) delivery: DeliveryQueue,
    admin_ids: HashSet<i64>,
}

impl Engine {
    pub fn new(db: Arc<Database>, delivery: DeliveryQueue, admin_ids: HashSet<i64>) -> Self {
        Self {
            db,
            delivery,
            admin_ids,
        }
    }

    /// Capability check, performed once per update; handlers receive the
    /// resulting `Role` instead of re-querying.
    pub(crate) fn role_of(&self, actor_id: i64) -> Role {
        if self.admin_ids.contains(&actor_id) {
            Role::Admin
        } else {
            Role::Member
        }
    }

    /// Effective config value: stored override, or the built-in default.
    pub(crate) fn label(&self, key: &str) -> String {
        if let Ok(Some(value)) = self.db.config_value(key) {
            return value;
        }
        CONFIG_DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
            .unwrap_or_default()
    }
}

/// One outbound effect decided by the engine. The webhook binary performs
/// the sends; tests assert on these directly.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Message {
        chat_id: i64,
        text: String,
        markup: Option<ReplyMarkup>,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
        markup: Option<InlineKeyboardMarkup>,
    },
    CallbackAck {
        callback_id: String,
        text: Option<String>,
    },
}

impl Outgoing {
    pub fn msg(chat_id: i64, text: impl Into<String>) -> Self {
        Outgoing::Message {
            chat_id,
            text: text.into(),
            markup: None,
        }
    }

    pub fn msg_with(chat_id: i64, text: impl Into<String>, markup: ReplyMarkup) -> Self {
        Outgoing::Message {
            chat_id,
            text: text.into(),
            markup: Some(markup),
        }
    }

    pub fn ack(callback_id: impl Into<String>) -> Self {
        Outgoing::CallbackAck {
            callback_id: callback_id.into(),
            text: None,
        }
    }

    pub fn ack_text(callback_id: impl Into<String>, text: impl Into<String>) -> Self {
        Outgoing::CallbackAck {
            callback_id: callback_id.into(),
            text: Some(text.into()),
        }
    }
}
