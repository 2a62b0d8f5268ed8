use anyhow::Result;

use whisper_telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use whisper_types::{Action, ConfessionStatus, VoteDirection};

use crate::{Engine, PAGE_SIZE};

impl Engine {
    /// Approval queue: one pending confession with its controls.
    pub(crate) fn render_review(&self) -> Result<(String, Option<InlineKeyboardMarkup>)> {
        let Some(conf) = self.db.first_pending()? else {
            return Ok(("The moderation queue is empty.".into(), None));
        };

        let text = format!("Pending from {}:\n\n{}", conf.author_name, conf.body);
        let kb = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton::callback("✅ Approve", Action::Approve(conf.id).encode()),
                InlineKeyboardButton::callback("❌ Reject", Action::Reject(conf.id).encode()),
            ]],
        };
        Ok((text, Some(kb)))
    }

    /// One browse page, newest first. Previous/next controls appear only
    /// when that page actually exists.
    pub(crate) fn render_page(&self, page: u32) -> Result<(String, InlineKeyboardMarkup)> {
        let (confessions, total) = self.db.approved_page(page, PAGE_SIZE)?;
        if confessions.is_empty() {
            return Ok((
                "Nothing on the board yet.".into(),
                InlineKeyboardMarkup { inline_keyboard: Vec::new() },
            ));
        }

        let mut text = format!("Confessions — page {}\n\n", page + 1);
        let mut item_buttons = Vec::new();
        for conf in &confessions {
            let public = conf.public_id.unwrap_or_default();
            text.push_str(&format!("#{} {}\n", public, preview(&conf.body)));
            item_buttons.push(InlineKeyboardButton::callback(
                format!("#{}", public),
                Action::ViewConfession(conf.id).encode(),
            ));
        }

        let mut rows: Vec<Vec<InlineKeyboardButton>> =
            item_buttons.chunks(5).map(|chunk| chunk.to_vec()).collect();

        let mut nav = Vec::new();
        if page > 0 {
            nav.push(InlineKeyboardButton::callback("⬅️", Action::Browse(page - 1).encode()));
        }
        if (page as i64 + 1) * (PAGE_SIZE as i64) < total {
            nav.push(InlineKeyboardButton::callback("➡️", Action::Browse(page + 1).encode()));
        }
        if !nav.is_empty() {
            rows.push(nav);
        }

        Ok((text, InlineKeyboardMarkup { inline_keyboard: rows }))
    }

    /// Detail view of one approved confession with live tallies and the
    /// comment count.
    pub(crate) fn render_confession(&self, id: i64) -> Result<Option<(String, InlineKeyboardMarkup)>> {
        let Some(conf) = self.db.get_confession(id)? else {
            return Ok(None);
        };
        if conf.status != ConfessionStatus::Approved {
            return Ok(None);
        }

        let tally = self.db.vote_tally(conf.id)?;
        let comments = self.db.comment_count(conf.id)?;
        let public = conf.public_id.unwrap_or_default();

        let text = format!(
            "#{} by {}\n\n{}\n\n👍 {}  👎 {}  💬 {}",
            public, conf.author_name, conf.body, tally.up, tally.down, comments
        );

        let mut rows = vec![vec![
            InlineKeyboardButton::callback(
                format!("👍 {}", tally.up),
                Action::Vote(conf.id, VoteDirection::Up).encode(),
            ),
            InlineKeyboardButton::callback(
                format!("👎 {}", tally.down),
                Action::Vote(conf.id, VoteDirection::Down).encode(),
            ),
        ]];

        let mut second = vec![InlineKeyboardButton::callback(
            "✍️ Comment",
            Action::CommentOn(conf.id).encode(),
        )];
        if comments > 0 {
            second.insert(
                0,
                InlineKeyboardButton::callback(
                    format!("💬 {}", comments),
                    Action::ViewComment(conf.id, 0).encode(),
                ),
            );
        }
        rows.push(second);
        rows.push(vec![InlineKeyboardButton::callback("↩️ Back", Action::Browse(0).encode())]);

        Ok(Some((text, InlineKeyboardMarkup { inline_keyboard: rows })))
    }

    /// Swipe-style comment detail: one comment per page, its tallies, and
    /// all of its replies rendered inline.
    pub(crate) fn render_comment(
        &self,
        confession_id: i64,
        idx: u32,
    ) -> Result<Option<(String, InlineKeyboardMarkup)>> {
        let Some(comment) = self.db.comment_at(confession_id, idx)? else {
            return Ok(None);
        };
        let total = self.db.comment_count(confession_id)?;
        let tally = self.db.comment_tally(comment.id)?;
        let replies = self.db.replies_for(comment.id)?;

        let mut text = format!(
            "Comment {}/{} by {}\n\n{}",
            idx + 1,
            total,
            comment.author_name,
            comment.body
        );
        if !replies.is_empty() {
            text.push_str("\n\nReplies:");
            for reply in &replies {
                text.push_str(&format!("\n• {}: {}", reply.author_name, reply.body));
            }
        }

        let mut rows = vec![
            vec![
                InlineKeyboardButton::callback(
                    format!("👍 {}", tally.up),
                    Action::CommentVote(comment.id, VoteDirection::Up).encode(),
                ),
                InlineKeyboardButton::callback(
                    format!("👎 {}", tally.down),
                    Action::CommentVote(comment.id, VoteDirection::Down).encode(),
                ),
            ],
            vec![InlineKeyboardButton::callback("↪️ Reply", Action::Reply(comment.id).encode())],
        ];

        let mut nav = Vec::new();
        if idx > 0 {
            nav.push(InlineKeyboardButton::callback(
                "⬅️",
                Action::ViewComment(confession_id, idx - 1).encode(),
            ));
        }
        if (idx as i64 + 1) < total {
            nav.push(InlineKeyboardButton::callback(
                "➡️",
                Action::ViewComment(confession_id, idx + 1).encode(),
            ));
        }
        nav.push(InlineKeyboardButton::callback(
            "↩️ Back",
            Action::ViewConfession(confession_id).encode(),
        ));
        rows.push(nav);

        Ok(Some((text, InlineKeyboardMarkup { inline_keyboard: rows })))
    }
}

/// Single-line body preview for the page listing.
fn preview(body: &str) -> String {
    let one_line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: String = one_line.chars().take(40).collect();
    if one_line.chars().count() > 40 {
        out.push('…');
    }
    out
}
