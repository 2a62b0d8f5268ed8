use anyhow::Result;
use tracing::info;

use whisper_telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use whisper_types::{Action, Actor};

use crate::Engine;

const REASONS: &[(&str, &str)] = &[
    ("stress", "😣 Stress"),
    ("boredom", "🥱 Boredom"),
    ("loneliness", "🌧 Loneliness"),
    ("other", "🤷 Something else"),
];

impl Engine {
    pub(crate) fn render_streak(&self, actor: &Actor) -> Result<(String, InlineKeyboardMarkup)> {
        let current = self.db.current_streak(actor.id)?;
        let text = format!(
            "🔥 Day {} of your streak.\nBest so far: {} days.",
            current,
            actor.best_streak.max(current)
        );
        let kb = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::callback(
                "💔 I relapsed",
                Action::Relapse { owner: actor.id }.encode(),
            )]],
        };
        Ok((text, kb))
    }

    /// Owner already verified by the caller. Folds the run into the best
    /// streak and restarts the counter, then asks for the trigger.
    pub(crate) fn relapse(&self, actor: &Actor) -> Result<(String, InlineKeyboardMarkup)> {
        self.db.reset_streak(actor.id)?;
        info!("actor {} reset their streak", actor.id);

        let rows = REASONS
            .chunks(2)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|(code, label)| {
                        InlineKeyboardButton::callback(
                            *label,
                            Action::Reason { code: (*code).to_string(), owner: actor.id }.encode(),
                        )
                    })
                    .collect()
            })
            .collect();

        Ok((
            "Streak reset. What set it off?".into(),
            InlineKeyboardMarkup { inline_keyboard: rows },
        ))
    }

    pub(crate) fn relapse_reason(&self, actor: &Actor, code: &str) -> String {
        info!("actor {} logged relapse reason '{}'", actor.id, code);
        let label = REASONS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, l)| *l)
            .unwrap_or("that");
        format!("Noted: {}. Day zero starts now, tomorrow is day one.", label)
    }

    pub(crate) fn render_leaderboard(&self) -> Result<String> {
        let rows = self.db.streak_leaderboard(10)?;
        if rows.is_empty() {
            return Ok("No streaks yet.".into());
        }
        let mut text = String::from("🏆 Best streaks\n");
        for (i, (name, best)) in rows.iter().enumerate() {
            text.push_str(&format!("{}. {} — {} days\n", i + 1, name, best));
        }
        Ok(text)
    }
}
