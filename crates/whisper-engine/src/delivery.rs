use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use whisper_telegram::Bot;

/// A unit of outbound delivery decoupled from the request/response cycle.
/// Handlers enqueue and move on; the worker owns the sends, so a slow or
/// failing delivery never eats into the webhook deadline.
#[derive(Debug)]
pub enum Delivery {
    /// Best-effort single notification (comment/approval notices).
    Notify { chat_id: i64, text: String },
    /// Staged broadcast to a captured recipient list, rate-limited and
    /// counted per item.
    Broadcast { text: String, recipients: Vec<i64> },
}

#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl DeliveryQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, chat_id: i64, text: impl Into<String>) {
        let _ = self.tx.send(Delivery::Notify {
            chat_id,
            text: text.into(),
        });
    }

    pub fn broadcast(&self, text: impl Into<String>, recipients: Vec<i64>) {
        let _ = self.tx.send(Delivery::Broadcast {
            text: text.into(),
            recipients,
        });
    }
}

/// Background worker draining the queue through the outbound client.
///
/// A blocked recipient is an expected outcome: counted, never escalated.
pub async fn run_delivery_worker(mut rx: mpsc::UnboundedReceiver<Delivery>, bot: Bot, pace: Duration) {
    while let Some(job) = rx.recv().await {
        match job {
            Delivery::Notify { chat_id, text } => match bot.send_message(chat_id, &text, None).await {
                Ok(_) => {}
                Err(e) if e.is_blocked() => {
                    debug!("notify to {} skipped: recipient blocked the bot", chat_id);
                }
                Err(e) => warn!("notify to {} failed: {}", chat_id, e),
            },
            Delivery::Broadcast { text, recipients } => {
                let total = recipients.len();
                let mut delivered = 0usize;
                let mut blocked = 0usize;
                let mut failed = 0usize;

                for chat_id in recipients {
                    match bot.send_message(chat_id, &text, None).await {
                        Ok(_) => delivered += 1,
                        Err(e) if e.is_blocked() => blocked += 1,
                        Err(e) => {
                            failed += 1;
                            warn!("broadcast to {} failed: {}", chat_id, e);
                        }
                    }
                    tokio::time::sleep(pace).await;
                }

                info!(
                    "Broadcast finished: {}/{} delivered, {} blocked, {} failed",
                    delivered, total, blocked, failed
                );
            }
        }
    }
}
