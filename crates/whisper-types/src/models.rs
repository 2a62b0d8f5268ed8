use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::FlowStep;

/// Capability of the invoking actor, resolved once per update and passed
/// into every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// One end user of the chat surface, keyed by the platform's stable user id.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: i64,
    pub display_name: String,
    pub nickname: String,
    pub bio: String,
    pub emoji: String,
    /// Reputation score awarded for moderated contributions.
    pub aura: i64,
    pub streak_start: DateTime<Utc>,
    pub best_streak: i64,
    pub last_active: DateTime<Utc>,
    pub banned: bool,
    /// Last rendered interactive message, for replace-in-place UI.
    pub menu_message_id: Option<i64>,
    /// Active conversation step, if any. At most one per actor.
    pub flow: Option<FlowStep>,
}

impl Actor {
    /// Name shown next to the actor's contributions: the chosen nickname,
    /// or the platform display name until one is set.
    pub fn public_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.display_name
        } else {
            &self.nickname
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfessionStatus {
    Pending,
    Approved,
}

impl ConfessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfessionStatus::Pending => "pending",
            ConfessionStatus::Approved => "approved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConfessionStatus::Pending),
            "approved" => Some(ConfessionStatus::Approved),
            _ => None,
        }
    }
}

/// A moderated text submission. The public id is assigned only at approval
/// and never changes afterwards; rejected rows are deleted instead.
#[derive(Debug, Clone)]
pub struct Confession {
    pub id: i64,
    pub author_id: i64,
    /// Author display name captured at submission time.
    pub author_name: String,
    pub body: String,
    pub status: ConfessionStatus,
    pub public_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub confession_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Lightweight one-level reply under a comment. Replies never nest further.
#[derive(Debug, Clone)]
pub struct Reply {
    pub author_name: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub up: i64,
    pub down: i64,
}

/// Admin-authored menu button: a label, a content block, and optional
/// trailing hyperlinks rendered under the content.
#[derive(Debug, Clone)]
pub struct CustomButton {
    pub id: i64,
    pub label: String,
    pub content: String,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub link: String,
}
