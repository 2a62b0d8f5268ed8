use anyhow::Result;
use tracing::info;

use whisper_db::InsertOutcome;
use whisper_types::{Actor, FlowStep, Link, Role};

use crate::{AURA_COMMENT, Engine, Outgoing};

const DEFAULT_LINK_LABEL: &str = "Open link";

impl Engine {
    /// Route input to the handler of the actor's active step. The caller has
    /// already peeled off the cancel command.
    pub(crate) async fn handle_step(
        &self,
        actor: &Actor,
        step: &FlowStep,
        chat_id: i64,
        text: Option<&str>,
        role: Role,
    ) -> Result<Vec<Outgoing>> {
        // A stale admin flow on a non-admin actor is cleared, not executed.
        if step_is_admin(step) && !role.is_admin() {
            self.db.set_flow(actor.id, None)?;
            return Ok(vec![Outgoing::msg(chat_id, "Not allowed.")]);
        }

        // Media or empty input: re-prompt, state untouched, actor retries.
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return Ok(vec![Outgoing::msg(chat_id, "Text only here, please.")]);
        };

        match step {
            FlowStep::ButtonName => {
                self.db.set_flow(
                    actor.id,
                    Some(&FlowStep::ButtonContent { label: text.to_string() }),
                )?;
                Ok(vec![Outgoing::msg(
                    chat_id,
                    "Now send the content shown when the button is tapped.",
                )])
            }
            FlowStep::ButtonContent { label } => {
                self.db.set_flow(
                    actor.id,
                    Some(&FlowStep::ButtonLinks {
                        label: label.clone(),
                        content: text.to_string(),
                    }),
                )?;
                Ok(vec![Outgoing::msg(
                    chat_id,
                    "Optional links now, one `label - url` per line. Or `skip`.",
                )])
            }
            FlowStep::ButtonLinks { label, content } => {
                let links = if text.eq_ignore_ascii_case("skip") {
                    Vec::new()
                } else {
                    match parse_links(text) {
                        Ok(links) => links,
                        Err(reason) => return Ok(vec![Outgoing::msg(chat_id, reason)]),
                    }
                };

                let outcome = self.db.insert_button(label, content, &links)?;
                self.db.set_flow(actor.id, None)?;
                match outcome {
                    InsertOutcome::Fresh => {
                        info!("admin {} added button '{}'", actor.id, label);
                        Ok(vec![Outgoing::msg(chat_id, format!("Button '{}' added.", label))])
                    }
                    InsertOutcome::Duplicate => Ok(vec![Outgoing::msg(
                        chat_id,
                        format!("A button named '{}' already exists.", label),
                    )]),
                }
            }

            FlowStep::ChannelName => {
                self.db
                    .set_flow(actor.id, Some(&FlowStep::ChannelLink { name: text.to_string() }))?;
                Ok(vec![Outgoing::msg(chat_id, "Send the channel link (https://…).")])
            }
            FlowStep::ChannelLink { name } => {
                if !is_link(text) {
                    return Ok(vec![Outgoing::msg(
                        chat_id,
                        "That does not look like a link. It must start with http:// or https://.",
                    )]);
                }
                let outcome = self.db.insert_channel(name, text)?;
                self.db.set_flow(actor.id, None)?;
                match outcome {
                    InsertOutcome::Fresh => {
                        info!("admin {} registered channel '{}'", actor.id, name);
                        Ok(vec![Outgoing::msg(chat_id, format!("Channel '{}' registered.", name))])
                    }
                    InsertOutcome::Duplicate => Ok(vec![Outgoing::msg(
                        chat_id,
                        format!("A channel named '{}' already exists.", name),
                    )]),
                }
            }

            FlowStep::BroadcastText => {
                let audience = self.db.all_actor_ids()?.len();
                self.db.set_flow(
                    actor.id,
                    Some(&FlowStep::BroadcastConfirm { text: text.to_string() }),
                )?;
                Ok(vec![Outgoing::msg(
                    chat_id,
                    format!(
                        "This will go to {} actors. Send `confirm` to proceed or `cancel` to abort.",
                        audience
                    ),
                )])
            }
            FlowStep::BroadcastConfirm { text: staged } => {
                if !text.eq_ignore_ascii_case("confirm") {
                    return Ok(vec![Outgoing::msg(chat_id, "Waiting for `confirm` (or `cancel`).")]);
                }
                let recipients = self.db.all_actor_ids()?;
                let audience = recipients.len();
                self.delivery.broadcast(staged.clone(), recipients);
                self.db.set_flow(actor.id, None)?;
                info!("admin {} queued broadcast to {} actors", actor.id, audience);
                Ok(vec![Outgoing::msg(
                    chat_id,
                    format!("Broadcast queued for {} actors.", audience),
                )])
            }

            FlowStep::EditNickname => {
                if text.chars().count() > 32 {
                    return Ok(vec![Outgoing::msg(chat_id, "Keep it under 32 characters, please.")]);
                }
                self.db.set_nickname(actor.id, text)?;
                self.db.set_flow(actor.id, None)?;
                Ok(vec![Outgoing::msg(chat_id, "Nickname updated.")])
            }
            FlowStep::EditBio => {
                self.db.set_bio(actor.id, text)?;
                self.db.set_flow(actor.id, None)?;
                Ok(vec![Outgoing::msg(chat_id, "Bio updated.")])
            }
            FlowStep::EditEmoji => {
                if text.chars().count() > 8 {
                    return Ok(vec![Outgoing::msg(chat_id, "Just the emoji, please.")]);
                }
                self.db.set_emoji(actor.id, text)?;
                self.db.set_flow(actor.id, None)?;
                Ok(vec![Outgoing::msg(chat_id, "Emoji updated.")])
            }

            FlowStep::AwaitConfession => {
                let id = self.db.insert_confession(actor.id, actor.public_name(), text)?;
                self.db.set_flow(actor.id, None)?;
                info!("actor {} submitted confession {}", actor.id, id);
                Ok(vec![Outgoing::msg(
                    chat_id,
                    "Thank you. Your confession awaits moderation.",
                )])
            }
            FlowStep::AwaitComment { confession_id } => {
                let Some(conf) = self.db.get_confession(*confession_id)? else {
                    self.db.set_flow(actor.id, None)?;
                    return Ok(vec![Outgoing::msg(chat_id, "That confession is gone.")]);
                };
                self.db
                    .insert_comment(*confession_id, actor.id, actor.public_name(), text)?;
                self.db.add_aura(actor.id, AURA_COMMENT)?;
                self.db.set_flow(actor.id, None)?;

                if conf.author_id != actor.id {
                    let tag = conf
                        .public_id
                        .map(|n| format!("#{}", n))
                        .unwrap_or_else(|| "(pending)".into());
                    self.delivery.notify(
                        conf.author_id,
                        format!("Someone commented on your confession {}.", tag),
                    );
                }
                Ok(vec![Outgoing::msg(
                    chat_id,
                    format!("Comment posted (+{} aura).", AURA_COMMENT),
                )])
            }
            FlowStep::AwaitReply { comment_id } => {
                if self.db.get_comment(*comment_id)?.is_none() {
                    self.db.set_flow(actor.id, None)?;
                    return Ok(vec![Outgoing::msg(chat_id, "That comment is gone.")]);
                }
                self.db.insert_reply(*comment_id, actor.public_name(), text)?;
                self.db.set_flow(actor.id, None)?;
                Ok(vec![Outgoing::msg(chat_id, "Reply posted.")])
            }
        }
    }
}

fn step_is_admin(step: &FlowStep) -> bool {
    matches!(
        step,
        FlowStep::ButtonName
            | FlowStep::ButtonContent { .. }
            | FlowStep::ButtonLinks { .. }
            | FlowStep::ChannelName
            | FlowStep::ChannelLink { .. }
            | FlowStep::BroadcastText
            | FlowStep::BroadcastConfirm { .. }
    )
}

fn is_link(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

/// Parse a trailing hyperlink block: one `label - url` per line. A line
/// that is only a url gets a generic label.
fn parse_links(input: &str) -> Result<Vec<Link>, String> {
    let mut links = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (label, url) = match line.rsplit_once(" - ") {
            Some((label, url)) => (label.trim(), url.trim()),
            None => ("", line),
        };
        if !is_link(url) {
            return Err(format!("'{}' is not a link I can use. Try again, or `skip`.", url));
        }
        let label = if label.is_empty() { DEFAULT_LINK_LABEL } else { label };
        links.push(Link {
            label: label.to_string(),
            url: url.to_string(),
        });
    }
    if links.is_empty() {
        return Err("Send at least one `label - url` line, or `skip`.".to_string());
    }
    Ok(links)
}
