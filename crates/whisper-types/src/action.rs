use crate::models::VoteDirection;

/// Semantics of an interactive control, encoded into the control's callback
/// token as a short verb prefix plus `_`-joined parameters.
///
/// Tokens that embed an owner id must be checked against the invoking actor
/// before any mutation; see [`Action::owner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Moderation
    Approve(i64),
    Reject(i64),

    // Board browsing and voting
    Browse(u32),
    ViewConfession(i64),
    Vote(i64, VoteDirection),
    CommentOn(i64),
    ViewComment(i64, u32),
    CommentVote(i64, VoteDirection),
    Reply(i64),

    // Profile editing
    EditNickname,
    EditBio,
    EditEmoji,

    // Streak controls, owner-scoped
    Relapse { owner: i64 },
    Reason { code: String, owner: i64 },

    // Admin menu
    AdminReview,
    AdminAddButton,
    AdminAddChannel,
    AdminBroadcast,
    AdminListButtons,
    AdminListChannels,
    DeleteButton(i64),
    DeleteChannel(i64),
}

impl Action {
    pub fn parse(token: &str) -> Option<Action> {
        if let Some(rest) = token.strip_prefix("approve_") {
            return rest.parse().ok().map(Action::Approve);
        }
        if let Some(rest) = token.strip_prefix("reject_") {
            return rest.parse().ok().map(Action::Reject);
        }
        if let Some(rest) = token.strip_prefix("browse_") {
            return rest.parse().ok().map(Action::Browse);
        }
        if let Some(rest) = token.strip_prefix("view_conf_") {
            return rest.parse().ok().map(Action::ViewConfession);
        }
        if let Some(rest) = token.strip_prefix("view_com_") {
            let (conf, idx) = rest.split_once('_')?;
            return Some(Action::ViewComment(conf.parse().ok()?, idx.parse().ok()?));
        }
        if let Some(rest) = token.strip_prefix("vote_up_") {
            return rest.parse().ok().map(|id| Action::Vote(id, VoteDirection::Up));
        }
        if let Some(rest) = token.strip_prefix("vote_down_") {
            return rest.parse().ok().map(|id| Action::Vote(id, VoteDirection::Down));
        }
        if let Some(rest) = token.strip_prefix("cvote_up_") {
            return rest.parse().ok().map(|id| Action::CommentVote(id, VoteDirection::Up));
        }
        if let Some(rest) = token.strip_prefix("cvote_down_") {
            return rest.parse().ok().map(|id| Action::CommentVote(id, VoteDirection::Down));
        }
        if let Some(rest) = token.strip_prefix("comment_") {
            return rest.parse().ok().map(Action::CommentOn);
        }
        if let Some(rest) = token.strip_prefix("reply_") {
            return rest.parse().ok().map(Action::Reply);
        }
        if let Some(rest) = token.strip_prefix("relapse_") {
            return rest.parse().ok().map(|owner| Action::Relapse { owner });
        }
        if let Some(rest) = token.strip_prefix("reason_") {
            // reason_<code>_<ownerId>: the owner id is always the last segment
            let (code, owner) = rest.rsplit_once('_')?;
            if code.is_empty() {
                return None;
            }
            return Some(Action::Reason { code: code.to_string(), owner: owner.parse().ok()? });
        }
        if let Some(rest) = token.strip_prefix("del_btn_") {
            return rest.parse().ok().map(Action::DeleteButton);
        }
        if let Some(rest) = token.strip_prefix("del_chan_") {
            return rest.parse().ok().map(Action::DeleteChannel);
        }
        match token {
            "edit_nick" => Some(Action::EditNickname),
            "edit_bio" => Some(Action::EditBio),
            "edit_emoji" => Some(Action::EditEmoji),
            "admin_review" => Some(Action::AdminReview),
            "admin_addbtn" => Some(Action::AdminAddButton),
            "admin_addchan" => Some(Action::AdminAddChannel),
            "admin_broadcast" => Some(Action::AdminBroadcast),
            "admin_buttons" => Some(Action::AdminListButtons),
            "admin_channels" => Some(Action::AdminListChannels),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Action::Approve(id) => format!("approve_{id}"),
            Action::Reject(id) => format!("reject_{id}"),
            Action::Browse(page) => format!("browse_{page}"),
            Action::ViewConfession(id) => format!("view_conf_{id}"),
            Action::ViewComment(conf, idx) => format!("view_com_{conf}_{idx}"),
            Action::Vote(id, dir) => format!("vote_{}_{id}", dir.as_str()),
            Action::CommentVote(id, dir) => format!("cvote_{}_{id}", dir.as_str()),
            Action::CommentOn(id) => format!("comment_{id}"),
            Action::Reply(id) => format!("reply_{id}"),
            Action::EditNickname => "edit_nick".into(),
            Action::EditBio => "edit_bio".into(),
            Action::EditEmoji => "edit_emoji".into(),
            Action::Relapse { owner } => format!("relapse_{owner}"),
            Action::Reason { code, owner } => format!("reason_{code}_{owner}"),
            Action::AdminReview => "admin_review".into(),
            Action::AdminAddButton => "admin_addbtn".into(),
            Action::AdminAddChannel => "admin_addchan".into(),
            Action::AdminBroadcast => "admin_broadcast".into(),
            Action::AdminListButtons => "admin_buttons".into(),
            Action::AdminListChannels => "admin_channels".into(),
            Action::DeleteButton(id) => format!("del_btn_{id}"),
            Action::DeleteChannel(id) => format!("del_chan_{id}"),
        }
    }

    /// The actor id this control is scoped to, if any. A tap by anyone else
    /// must be rejected without touching state.
    pub fn owner(&self) -> Option<i64> {
        match self {
            Action::Relapse { owner } | Action::Reason { owner, .. } => Some(*owner),
            _ => None,
        }
    }

    /// Whether this control is reserved for privileged actors.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Action::Approve(_)
                | Action::Reject(_)
                | Action::AdminReview
                | Action::AdminAddButton
                | Action::AdminAddChannel
                | Action::AdminBroadcast
                | Action::AdminListButtons
                | Action::AdminListChannels
                | Action::DeleteButton(_)
                | Action::DeleteChannel(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let actions = [
            Action::Approve(3),
            Action::Reject(9),
            Action::Browse(0),
            Action::ViewConfession(1204),
            Action::ViewComment(1204, 2),
            Action::Vote(5, VoteDirection::Up),
            Action::Vote(5, VoteDirection::Down),
            Action::CommentVote(17, VoteDirection::Up),
            Action::CommentOn(12),
            Action::Reply(8),
            Action::Relapse { owner: 99001 },
            Action::Reason { code: "stress".into(), owner: 99001 },
            Action::AdminReview,
            Action::DeleteButton(4),
            Action::DeleteChannel(2),
        ];
        for action in actions {
            let token = action.encode();
            assert_eq!(Action::parse(&token), Some(action), "token {token}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Action::parse(""), None);
        assert_eq!(Action::parse("vote_sideways_3"), None);
        assert_eq!(Action::parse("approve_abc"), None);
        assert_eq!(Action::parse("reason_12"), None);
        assert_eq!(Action::parse("frobnicate_1"), None);
    }

    #[test]
    fn owner_is_exposed_only_for_owner_scoped_tokens() {
        assert_eq!(Action::parse("relapse_42").unwrap().owner(), Some(42));
        assert_eq!(
            Action::parse("reason_boredom_42").unwrap().owner(),
            Some(42)
        );
        assert_eq!(Action::parse("vote_up_42").unwrap().owner(), None);
    }

    #[test]
    fn moderation_tokens_are_admin_only() {
        assert!(Action::parse("approve_1").unwrap().admin_only());
        assert!(Action::parse("admin_broadcast").unwrap().admin_only());
        assert!(!Action::parse("browse_1").unwrap().admin_only());
    }
}
