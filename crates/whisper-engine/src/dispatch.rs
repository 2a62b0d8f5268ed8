use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use whisper_db::InsertOutcome;
use whisper_telegram::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, ReplyKeyboardMarkup,
    ReplyMarkup, Update,
};
use whisper_types::{Action, Actor, FlowStep};

use crate::{Engine, Outgoing};

impl Engine {
    /// Entry point for one inbound update: dedup gate first, then routing.
    /// Never fails; internal errors are logged and absorbed so the caller
    /// can always acknowledge.
    pub async fn handle_update(&self, update: Update) -> Vec<Outgoing> {
        match self.db.record_update(update.update_id) {
            Ok(InsertOutcome::Fresh) => {}
            Ok(InsertOutcome::Duplicate) => {
                debug!("update {} already processed, skipping", update.update_id);
                return Vec::new();
            }
            Err(e) => {
                // Storage trouble: acknowledge anyway so the platform does
                // not retry into a broken path.
                error!("dedup marker write failed for update {}: {:#}", update.update_id, e);
                return Vec::new();
            }
        }

        let update_id = update.update_id;
        let result = if let Some(msg) = update.message {
            self.handle_message(msg).await
        } else if let Some(cb) = update.callback_query {
            self.handle_callback(cb).await
        } else {
            Ok(Vec::new())
        };

        match result {
            Ok(out) => out,
            Err(e) => {
                error!("update {} failed: {:#}", update_id, e);
                Vec::new()
            }
        }
    }

    async fn handle_message(&self, msg: Message) -> Result<Vec<Outgoing>> {
        let Some(from) = msg.from else {
            return Ok(Vec::new());
        };
        let actor = self.db.ensure_actor(from.id, &from.first_name)?;
        if actor.banned {
            return Ok(Vec::new());
        }
        let role = self.role_of(actor.id);
        let chat_id = msg.chat.id;
        let text = msg.text.as_deref().map(str::trim);

        // An active flow owns the actor's input until it completes or is
        // cancelled; menu matching is not attempted.
        if let Some(step) = actor.flow.clone() {
            if let Some(t) = text {
                if t.eq_ignore_ascii_case("cancel") || t == "/cancel" {
                    self.db.set_flow(actor.id, None)?;
                    return Ok(vec![Outgoing::msg(chat_id, "Cancelled.")]);
                }
            }
            return self
                .handle_step(&actor, &step, chat_id, text, role)
                .await
                .with_context(|| format!("actor {} at step {}", actor.id, step.name()));
        }

        let Some(text) = text else {
            return Ok(Vec::new());
        };

        if text == "/start" {
            return self.start(&actor, chat_id);
        }
        if text == "/admin" {
            if !role.is_admin() {
                return Ok(vec![Outgoing::msg(chat_id, "Not allowed.")]);
            }
            return Ok(vec![Outgoing::Message {
                chat_id,
                text: "Admin menu".into(),
                markup: Some(ReplyMarkup::Inline(admin_menu())),
            }]);
        }

        if text == self.label("menu_confess") {
            self.db.set_flow(actor.id, Some(&FlowStep::AwaitConfession))?;
            return Ok(vec![Outgoing::msg(
                chat_id,
                "Write your confession. It stays anonymous and goes to moderation first.",
            )]);
        }
        if text == self.label("menu_browse") {
            let (text, kb) = self.render_page(0)?;
            return Ok(vec![Outgoing::msg_with(chat_id, text, ReplyMarkup::Inline(kb))]);
        }
        if text == self.label("menu_profile") {
            return Ok(vec![profile_view(&actor, chat_id)]);
        }
        if text == self.label("menu_streak") {
            let (text, kb) = self.render_streak(&actor)?;
            return Ok(vec![Outgoing::msg_with(chat_id, text, ReplyMarkup::Inline(kb))]);
        }
        if text == self.label("menu_leaderboard") {
            return Ok(vec![Outgoing::msg(chat_id, self.render_leaderboard()?)]);
        }

        if let Some(button) = self.db.button_by_label(text)? {
            let links: Vec<Vec<InlineKeyboardButton>> = button
                .links
                .iter()
                .map(|l| vec![InlineKeyboardButton::link(l.label.clone(), l.url.clone())])
                .collect();
            let markup = if links.is_empty() {
                None
            } else {
                Some(ReplyMarkup::Inline(InlineKeyboardMarkup { inline_keyboard: links }))
            };
            return Ok(vec![Outgoing::Message {
                chat_id,
                text: button.content,
                markup,
            }]);
        }

        // Unrecognized input outside any flow is a silent no-op.
        Ok(Vec::new())
    }

    async fn handle_callback(&self, cb: CallbackQuery) -> Result<Vec<Outgoing>> {
        let actor = self.db.ensure_actor(cb.from.id, &cb.from.first_name)?;
        if actor.banned {
            return Ok(vec![Outgoing::ack(cb.id)]);
        }
        let role = self.role_of(actor.id);

        let Some(data) = cb.data.as_deref() else {
            return Ok(vec![Outgoing::ack(cb.id)]);
        };
        let Some(action) = Action::parse(data) else {
            warn!("actor {} sent unparseable action token '{}'", actor.id, data);
            return Ok(vec![Outgoing::ack(cb.id)]);
        };

        // Owner-scoped controls reject everyone but the owner, before any
        // state is touched.
        if let Some(owner) = action.owner() {
            if owner != actor.id {
                return Ok(vec![Outgoing::ack_text(cb.id, "This button is not yours.")]);
            }
        }
        if action.admin_only() && !role.is_admin() {
            return Ok(vec![Outgoing::ack_text(cb.id, "Not allowed.")]);
        }

        let surface = cb.message.as_ref().map(|m| (m.chat.id, m.message_id));
        if let Some((_, message_id)) = surface {
            self.db.set_menu_message(actor.id, Some(message_id))?;
        }

        self.run_action(&actor, action, &cb.id, surface)
            .await
            .with_context(|| format!("actor {} action '{}'", actor.id, data))
    }

    async fn run_action(
        &self,
        actor: &Actor,
        action: Action,
        cb_id: &str,
        surface: Option<(i64, i64)>,
    ) -> Result<Vec<Outgoing>> {
        let chat_id = surface.map(|(chat, _)| chat).unwrap_or(actor.id);

        match action {
            // -- Moderation --
            Action::AdminReview => {
                let (text, kb) = self.render_review()?;
                Ok(respond(surface, chat_id, cb_id, text, kb))
            }
            Action::Approve(id) => match self.db.approve_confession(id)? {
                Some((public_id, author_id)) => {
                    self.db.add_aura(author_id, crate::AURA_APPROVAL)?;
                    self.delivery.notify(
                        author_id,
                        format!(
                            "Your confession went live as #{} (+{} aura).",
                            public_id,
                            crate::AURA_APPROVAL
                        ),
                    );
                    info!("confession {} approved as #{}", id, public_id);
                    Ok(respond(surface, chat_id, cb_id, format!("Approved as #{}.", public_id), None))
                }
                None => Ok(vec![Outgoing::ack_text(cb_id, "Already handled.")]),
            },
            Action::Reject(id) => {
                if self.db.reject_confession(id)? {
                    info!("confession {} rejected", id);
                    Ok(respond(surface, chat_id, cb_id, "Rejected and removed.".into(), None))
                } else {
                    Ok(vec![Outgoing::ack_text(cb_id, "Already handled.")])
                }
            }

            // -- Board --
            Action::Browse(page) => {
                let (text, kb) = self.render_page(page)?;
                Ok(respond(surface, chat_id, cb_id, text, Some(kb)))
            }
            Action::ViewConfession(id) => match self.render_confession(id)? {
                Some((text, kb)) => Ok(respond(surface, chat_id, cb_id, text, Some(kb))),
                None => Ok(vec![Outgoing::ack_text(cb_id, "This confession is gone.")]),
            },
            Action::Vote(id, dir) => {
                if self.db.get_confession(id)?.is_none() {
                    return Ok(vec![Outgoing::ack_text(cb_id, "This confession is gone.")]);
                }
                self.db.cast_vote(id, actor.id, dir)?;
                match self.render_confession(id)? {
                    Some((text, kb)) => Ok(respond(surface, chat_id, cb_id, text, Some(kb))),
                    None => Ok(vec![Outgoing::ack(cb_id)]),
                }
            }
            Action::CommentOn(id) => {
                if self.db.get_confession(id)?.is_none() {
                    return Ok(vec![Outgoing::ack_text(cb_id, "This confession is gone.")]);
                }
                self.db
                    .set_flow(actor.id, Some(&FlowStep::AwaitComment { confession_id: id }))?;
                Ok(vec![
                    Outgoing::msg(chat_id, "Send your comment."),
                    Outgoing::ack(cb_id),
                ])
            }
            Action::ViewComment(confession_id, idx) => {
                match self.render_comment(confession_id, idx)? {
                    Some((text, kb)) => Ok(respond(surface, chat_id, cb_id, text, Some(kb))),
                    None => Ok(vec![Outgoing::ack_text(cb_id, "No comments here yet.")]),
                }
            }
            Action::CommentVote(comment_id, dir) => {
                let Some(comment) = self.db.get_comment(comment_id)? else {
                    return Ok(vec![Outgoing::ack_text(cb_id, "This comment is gone.")]);
                };
                self.db.cast_comment_vote(comment_id, actor.id, dir)?;
                let idx = self.db.comment_index(&comment)?;
                match self.render_comment(comment.confession_id, idx)? {
                    Some((text, kb)) => Ok(respond(surface, chat_id, cb_id, text, Some(kb))),
                    None => Ok(vec![Outgoing::ack(cb_id)]),
                }
            }
            Action::Reply(comment_id) => {
                if self.db.get_comment(comment_id)?.is_none() {
                    return Ok(vec![Outgoing::ack_text(cb_id, "This comment is gone.")]);
                }
                self.db
                    .set_flow(actor.id, Some(&FlowStep::AwaitReply { comment_id }))?;
                Ok(vec![
                    Outgoing::msg(chat_id, "Send your reply."),
                    Outgoing::ack(cb_id),
                ])
            }

            // -- Profile editing --
            Action::EditNickname => {
                self.db.set_flow(actor.id, Some(&FlowStep::EditNickname))?;
                Ok(vec![Outgoing::msg(chat_id, "Send your new nickname."), Outgoing::ack(cb_id)])
            }
            Action::EditBio => {
                self.db.set_flow(actor.id, Some(&FlowStep::EditBio))?;
                Ok(vec![Outgoing::msg(chat_id, "Send your new bio."), Outgoing::ack(cb_id)])
            }
            Action::EditEmoji => {
                self.db.set_flow(actor.id, Some(&FlowStep::EditEmoji))?;
                Ok(vec![Outgoing::msg(chat_id, "Send an emoji for your profile."), Outgoing::ack(cb_id)])
            }

            // -- Streak --
            Action::Relapse { .. } => {
                let (text, kb) = self.relapse(actor)?;
                Ok(respond(surface, chat_id, cb_id, text, Some(kb)))
            }
            Action::Reason { code, .. } => {
                let text = self.relapse_reason(actor, &code);
                Ok(respond(surface, chat_id, cb_id, text, None))
            }

            // -- Admin menu --
            Action::AdminAddButton => {
                self.db.set_flow(actor.id, Some(&FlowStep::ButtonName))?;
                Ok(vec![
                    Outgoing::msg(chat_id, "Send a label for the new button."),
                    Outgoing::ack(cb_id),
                ])
            }
            Action::AdminAddChannel => {
                self.db.set_flow(actor.id, Some(&FlowStep::ChannelName))?;
                Ok(vec![
                    Outgoing::msg(chat_id, "Send a name for the channel."),
                    Outgoing::ack(cb_id),
                ])
            }
            Action::AdminBroadcast => {
                self.db.set_flow(actor.id, Some(&FlowStep::BroadcastText))?;
                Ok(vec![
                    Outgoing::msg(chat_id, "Send the broadcast text."),
                    Outgoing::ack(cb_id),
                ])
            }
            Action::AdminListButtons => {
                let (text, kb) = self.render_button_list()?;
                Ok(respond(surface, chat_id, cb_id, text, kb))
            }
            Action::AdminListChannels => {
                let (text, kb) = self.render_channel_list()?;
                Ok(respond(surface, chat_id, cb_id, text, kb))
            }
            Action::DeleteButton(id) => {
                self.db.delete_button(id)?;
                let (text, kb) = self.render_button_list()?;
                Ok(respond(surface, chat_id, cb_id, text, kb))
            }
            Action::DeleteChannel(id) => {
                self.db.delete_channel(id)?;
                let (text, kb) = self.render_channel_list()?;
                Ok(respond(surface, chat_id, cb_id, text, kb))
            }
        }
    }

    fn start(&self, actor: &Actor, chat_id: i64) -> Result<Vec<Outgoing>> {
        let mut rows = vec![
            vec![self.label("menu_confess")],
            vec![self.label("menu_browse"), self.label("menu_profile")],
            vec![self.label("menu_streak"), self.label("menu_leaderboard")],
        ];
        for chunk in self.db.list_buttons()?.chunks(2) {
            rows.push(chunk.iter().map(|b| b.label.clone()).collect());
        }

        info!("actor {} started", actor.id);
        Ok(vec![Outgoing::msg_with(
            chat_id,
            self.label("welcome_text"),
            ReplyMarkup::Keyboard(ReplyKeyboardMarkup::from_rows(rows)),
        )])
    }

    fn render_button_list(&self) -> Result<(String, Option<InlineKeyboardMarkup>)> {
        let buttons = self.db.list_buttons()?;
        if buttons.is_empty() {
            return Ok(("No custom buttons yet.".into(), None));
        }
        let rows = buttons
            .iter()
            .map(|b| {
                vec![InlineKeyboardButton::callback(
                    format!("🗑 {}", b.label),
                    Action::DeleteButton(b.id).encode(),
                )]
            })
            .collect();
        Ok((
            format!("{} custom buttons. Tap one to delete it.", buttons.len()),
            Some(InlineKeyboardMarkup { inline_keyboard: rows }),
        ))
    }

    fn render_channel_list(&self) -> Result<(String, Option<InlineKeyboardMarkup>)> {
        let channels = self.db.list_channels()?;
        if channels.is_empty() {
            return Ok(("No channels registered.".into(), None));
        }
        let mut text = String::from("Registered channels:\n");
        let rows = channels
            .iter()
            .map(|c| {
                text.push_str(&format!("• {} — {}\n", c.name, c.link));
                vec![InlineKeyboardButton::callback(
                    format!("🗑 {}", c.name),
                    Action::DeleteChannel(c.id).encode(),
                )]
            })
            .collect();
        Ok((text, Some(InlineKeyboardMarkup { inline_keyboard: rows })))
    }
}

/// Replace-in-place when the tap came from an interactive message,
/// otherwise send fresh; always answer the callback.
fn respond(
    surface: Option<(i64, i64)>,
    fallback_chat: i64,
    cb_id: &str,
    text: String,
    markup: Option<InlineKeyboardMarkup>,
) -> Vec<Outgoing> {
    match surface {
        Some((chat_id, message_id)) => vec![
            Outgoing::Edit {
                chat_id,
                message_id,
                text,
                markup,
            },
            Outgoing::ack(cb_id),
        ],
        None => vec![
            Outgoing::Message {
                chat_id: fallback_chat,
                text,
                markup: markup.map(ReplyMarkup::Inline),
            },
            Outgoing::ack(cb_id),
        ],
    }
}

fn admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback("📥 Review queue", Action::AdminReview.encode())],
            vec![
                InlineKeyboardButton::callback("➕ Button", Action::AdminAddButton.encode()),
                InlineKeyboardButton::callback("➕ Channel", Action::AdminAddChannel.encode()),
            ],
            vec![
                InlineKeyboardButton::callback("🗂 Buttons", Action::AdminListButtons.encode()),
                InlineKeyboardButton::callback("🗂 Channels", Action::AdminListChannels.encode()),
            ],
            vec![InlineKeyboardButton::callback("📣 Broadcast", Action::AdminBroadcast.encode())],
        ],
    }
}

fn profile_view(actor: &Actor, chat_id: i64) -> Outgoing {
    let emoji = if actor.emoji.is_empty() { "—" } else { &actor.emoji };
    let bio = if actor.bio.is_empty() { "—" } else { &actor.bio };
    let text = format!(
        "{} {}\nBio: {}\nAura: {}",
        emoji,
        actor.public_name(),
        bio,
        actor.aura
    );
    let kb = InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::callback("✏️ Name", Action::EditNickname.encode()),
            InlineKeyboardButton::callback("✏️ Bio", Action::EditBio.encode()),
            InlineKeyboardButton::callback("✏️ Emoji", Action::EditEmoji.encode()),
        ]],
    };
    Outgoing::msg_with(chat_id, text, ReplyMarkup::Inline(kb))
}
