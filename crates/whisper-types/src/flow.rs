use serde::{Deserialize, Serialize};

/// Active conversation step for one actor, one variant per step.
///
/// Each variant carries exactly the fields accumulated so far in its flow;
/// completing or cancelling the flow drops the whole value. Serialized to
/// JSON at the persistence boundary only; in memory it is always typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FlowStep {
    // Admin custom-button authoring: name -> content -> links
    ButtonName,
    ButtonContent { label: String },
    ButtonLinks { label: String, content: String },

    // Admin channel registration: name -> link
    ChannelName,
    ChannelLink { name: String },

    // Admin broadcast staging: text -> audience confirmation
    BroadcastText,
    BroadcastConfirm { text: String },

    // Profile editing, one terminal step each
    EditNickname,
    EditBio,
    EditEmoji,

    // Board flows
    AwaitConfession,
    AwaitComment { confession_id: i64 },
    AwaitReply { comment_id: i64 },
}

impl FlowStep {
    /// Step name for log context.
    pub fn name(&self) -> &'static str {
        match self {
            FlowStep::ButtonName => "button_name",
            FlowStep::ButtonContent { .. } => "button_content",
            FlowStep::ButtonLinks { .. } => "button_links",
            FlowStep::ChannelName => "channel_name",
            FlowStep::ChannelLink { .. } => "channel_link",
            FlowStep::BroadcastText => "broadcast_text",
            FlowStep::BroadcastConfirm { .. } => "broadcast_confirm",
            FlowStep::EditNickname => "edit_nickname",
            FlowStep::EditBio => "edit_bio",
            FlowStep::EditEmoji => "edit_emoji",
            FlowStep::AwaitConfession => "await_confession",
            FlowStep::AwaitComment { .. } => "await_comment",
            FlowStep::AwaitReply { .. } => "await_reply",
        }
    }
}
