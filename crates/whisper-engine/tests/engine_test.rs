use std::collections::HashSet;
use std::sync::Arc;

use whisper_db::Database;
use whisper_engine::delivery::{Delivery, DeliveryQueue};
use whisper_engine::{AURA_APPROVAL, AURA_COMMENT, Engine, Outgoing};
use whisper_telegram::types::{CallbackQuery, Chat, Message, Update, User};
use whisper_telegram::ReplyMarkup;
use whisper_types::{ConfessionStatus, FlowStep};

const ADMIN: i64 = 1001;
const MEMBER: i64 = 2002;
const OTHER: i64 = 3003;

struct Harness {
    db: Arc<Database>,
    engine: Engine,
    rx: tokio::sync::mpsc::UnboundedReceiver<Delivery>,
    next_update: i64,
}

impl Harness {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (queue, rx) = DeliveryQueue::new();
        let engine = Engine::new(db.clone(), queue, HashSet::from([ADMIN]));
        Self {
            db,
            engine,
            rx,
            next_update: 1,
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_update += 1;
        self.next_update
    }

    async fn send_text(&mut self, from: i64, text: &str) -> Vec<Outgoing> {
        let id = self.next_id();
        self.send_text_with_id(id, from, Some(text)).await
    }

    async fn send_media(&mut self, from: i64) -> Vec<Outgoing> {
        let id = self.next_id();
        self.send_text_with_id(id, from, None).await
    }

    async fn send_text_with_id(&mut self, update_id: i64, from: i64, text: Option<&str>) -> Vec<Outgoing> {
        self.engine
            .handle_update(Update {
                update_id,
                message: Some(Message {
                    message_id: update_id,
                    from: Some(User {
                        id: from,
                        first_name: format!("user{}", from),
                        username: None,
                    }),
                    chat: Chat { id: from },
                    text: text.map(str::to_string),
                }),
                callback_query: None,
            })
            .await
    }

    async fn tap(&mut self, from: i64, data: &str) -> Vec<Outgoing> {
        let id = self.next_id();
        self.engine
            .handle_update(Update {
                update_id: id,
                message: None,
                callback_query: Some(CallbackQuery {
                    id: format!("cb{}", id),
                    from: User {
                        id: from,
                        first_name: format!("user{}", from),
                        username: None,
                    },
                    message: Some(Message {
                        message_id: 900,
                        from: None,
                        chat: Chat { id: from },
                        text: None,
                    }),
                    data: Some(data.to_string()),
                }),
            })
            .await
    }
}

fn message_text(out: &[Outgoing]) -> &str {
    out.iter()
        .find_map(|o| match o {
            Outgoing::Message { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .expect("expected an outbound message")
}

fn edit_text(out: &[Outgoing]) -> &str {
    out.iter()
        .find_map(|o| match o {
            Outgoing::Edit { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .expect("expected an edited message")
}

fn ack_text(out: &[Outgoing]) -> Option<&str> {
    out.iter().find_map(|o| match o {
        Outgoing::CallbackAck { text, .. } => text.as_deref(),
        _ => None,
    })
}

#[tokio::test]
async fn duplicate_update_produces_no_second_side_effect() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;

    // The same update delivered twice: one confession, second is a no-op
    let first = h.send_text_with_id(7777, MEMBER, Some("my secret")).await;
    assert!(!first.is_empty());
    let again = h.send_text_with_id(7777, MEMBER, Some("my secret")).await;
    assert!(again.is_empty());

    let (_, total) = h.db.approved_page(0, 10).unwrap();
    assert_eq!(total, 0);
    assert!(h.db.first_pending().unwrap().is_some());
    let pending = h.db.first_pending().unwrap().unwrap();
    assert_eq!(pending.body, "my secret");
    // exactly one pending row
    h.db.reject_confession(pending.id).unwrap();
    assert!(h.db.first_pending().unwrap().is_none());
}

#[tokio::test]
async fn start_upserts_actor_and_shows_menu_keyboard() {
    let mut h = Harness::new();

    let out = h.send_text(MEMBER, "/start").await;
    assert!(matches!(
        out.as_slice(),
        [Outgoing::Message { markup: Some(ReplyMarkup::Keyboard(_)), .. }]
    ));

    let actor = h.db.get_actor(MEMBER).unwrap().unwrap();
    assert_eq!(actor.aura, 0);
    assert!(actor.flow.is_none());
}

#[tokio::test]
async fn active_step_owns_input_even_when_it_matches_a_menu_label() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    assert_eq!(
        h.db.get_actor(MEMBER).unwrap().unwrap().flow,
        Some(FlowStep::AwaitConfession)
    );

    // This text is also the browse menu label; the step must win
    let out = h.send_text(MEMBER, "📖 Browse").await;
    assert!(message_text(&out).contains("moderation"));

    let pending = h.db.first_pending().unwrap().unwrap();
    assert_eq!(pending.body, "📖 Browse");
    assert!(h.db.get_actor(MEMBER).unwrap().unwrap().flow.is_none());
}

#[tokio::test]
async fn cancel_clears_any_step() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    let out = h.send_text(MEMBER, "cancel").await;
    assert_eq!(message_text(&out), "Cancelled.");
    assert!(h.db.get_actor(MEMBER).unwrap().unwrap().flow.is_none());

    // Also out of a mid-chain admin step
    h.tap(ADMIN, "admin_addbtn").await;
    h.send_text(ADMIN, "Rules").await;
    let out = h.send_text(ADMIN, "/cancel").await;
    assert_eq!(message_text(&out), "Cancelled.");
    assert!(h.db.get_actor(ADMIN).unwrap().unwrap().flow.is_none());
}

#[tokio::test]
async fn media_in_a_text_step_reprompts_without_advancing() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    let out = h.send_media(MEMBER).await;
    assert!(message_text(&out).contains("Text only"));
    assert_eq!(
        h.db.get_actor(MEMBER).unwrap().unwrap().flow,
        Some(FlowStep::AwaitConfession)
    );
}

#[tokio::test]
async fn submit_approve_scenario_awards_aura_and_sequential_id() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "/start").await;
    h.send_text(MEMBER, "🙊 Confess").await;
    h.send_text(MEMBER, "hello").await;

    let pending = h.db.first_pending().unwrap().unwrap();
    assert_eq!(pending.status, ConfessionStatus::Pending);
    assert_eq!(pending.public_id, None);

    // Admin reviews and approves
    let out = h.tap(ADMIN, "admin_review").await;
    assert!(edit_text(&out).contains("hello"));

    let out = h.tap(ADMIN, &format!("approve_{}", pending.id)).await;
    assert!(edit_text(&out).contains("#1000"));

    let conf = h.db.get_confession(pending.id).unwrap().unwrap();
    assert_eq!(conf.status, ConfessionStatus::Approved);
    assert_eq!(conf.public_id, Some(1000));
    assert_eq!(h.db.get_actor(MEMBER).unwrap().unwrap().aura, AURA_APPROVAL);

    // The author was notified through the delivery queue
    match h.rx.try_recv().unwrap() {
        Delivery::Notify { chat_id, text } => {
            assert_eq!(chat_id, MEMBER);
            assert!(text.contains("#1000"));
        }
        other => panic!("unexpected delivery {:?}", other),
    }
}

#[tokio::test]
async fn non_admin_cannot_moderate_or_open_admin_menu() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    h.send_text(MEMBER, "secret").await;
    let pending = h.db.first_pending().unwrap().unwrap();

    let out = h.send_text(MEMBER, "/admin").await;
    assert_eq!(message_text(&out), "Not allowed.");

    let out = h.tap(MEMBER, &format!("approve_{}", pending.id)).await;
    assert_eq!(ack_text(&out), Some("Not allowed."));
    assert_eq!(
        h.db.get_confession(pending.id).unwrap().unwrap().status,
        ConfessionStatus::Pending
    );
}

#[tokio::test]
async fn vote_callbacks_toggle_exclusively() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    h.send_text(MEMBER, "vote on me").await;
    let conf = h.db.first_pending().unwrap().unwrap();
    h.db.approve_confession(conf.id).unwrap();

    h.tap(OTHER, &format!("vote_up_{}", conf.id)).await;
    let tally = h.db.vote_tally(conf.id).unwrap();
    assert_eq!((tally.up, tally.down), (1, 0));

    h.tap(OTHER, &format!("vote_down_{}", conf.id)).await;
    let tally = h.db.vote_tally(conf.id).unwrap();
    assert_eq!((tally.up, tally.down), (0, 1));

    // Voting the same way again cannot double-count
    let out = h.tap(OTHER, &format!("vote_down_{}", conf.id)).await;
    let tally = h.db.vote_tally(conf.id).unwrap();
    assert_eq!((tally.up, tally.down), (0, 1));
    assert!(edit_text(&out).contains("👎 1"));
}

#[tokio::test]
async fn commenting_awards_aura_and_notifies_the_author() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "🙊 Confess").await;
    h.send_text(MEMBER, "lonely").await;
    let conf = h.db.first_pending().unwrap().unwrap();
    h.db.approve_confession(conf.id).unwrap();

    h.tap(OTHER, &format!("comment_{}", conf.id)).await;
    assert_eq!(
        h.db.get_actor(OTHER).unwrap().unwrap().flow,
        Some(FlowStep::AwaitComment { confession_id: conf.id })
    );

    let out = h.send_text(OTHER, "me too").await;
    assert!(message_text(&out).contains("Comment posted"));
    assert_eq!(h.db.comment_count(conf.id).unwrap(), 1);
    assert_eq!(h.db.get_actor(OTHER).unwrap().unwrap().aura, AURA_COMMENT);

    match h.rx.try_recv().unwrap() {
        Delivery::Notify { chat_id, .. } => assert_eq!(chat_id, MEMBER),
        other => panic!("unexpected delivery {:?}", other),
    }

    // Replying awards nothing and does not notify
    let comment = h.db.comment_at(conf.id, 0).unwrap().unwrap();
    h.tap(MEMBER, &format!("reply_{}", comment.id)).await;
    h.send_text(MEMBER, "thanks").await;
    assert_eq!(h.db.replies_for(comment.id).unwrap().len(), 1);
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_requires_the_literal_confirm() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "/start").await;
    h.tap(ADMIN, "admin_broadcast").await;
    h.send_text(ADMIN, "maintenance tonight").await;

    // Anything but `confirm` re-prompts and stays on the confirmation step
    let out = h.send_text(ADMIN, "yes please").await;
    assert!(message_text(&out).contains("confirm"));
    assert!(matches!(
        h.db.get_actor(ADMIN).unwrap().unwrap().flow,
        Some(FlowStep::BroadcastConfirm { .. })
    ));
    assert!(h.rx.try_recv().is_err());

    let out = h.send_text(ADMIN, "confirm").await;
    assert!(message_text(&out).contains("queued"));
    assert!(h.db.get_actor(ADMIN).unwrap().unwrap().flow.is_none());

    match h.rx.try_recv().unwrap() {
        Delivery::Broadcast { text, recipients } => {
            assert_eq!(text, "maintenance tonight");
            assert!(recipients.contains(&MEMBER));
            assert!(recipients.contains(&ADMIN));
        }
        other => panic!("unexpected delivery {:?}", other),
    }
}

#[tokio::test]
async fn button_authoring_chain_reports_conflicts_and_clears() {
    let mut h = Harness::new();

    h.tap(ADMIN, "admin_addbtn").await;
    h.send_text(ADMIN, "Rules").await;
    h.send_text(ADMIN, "Be kind.").await;
    let out = h.send_text(ADMIN, "Site - https://example.org").await;
    assert!(message_text(&out).contains("added"));

    // Members see the button content with its link
    let out = h.send_text(MEMBER, "Rules").await;
    assert_eq!(message_text(&out), "Be kind.");

    // A bad link re-prompts without losing the flow
    h.tap(ADMIN, "admin_addbtn").await;
    h.send_text(ADMIN, "Rules").await;
    h.send_text(ADMIN, "Second try").await;
    let out = h.send_text(ADMIN, "not a url").await;
    assert!(message_text(&out).contains("not a link"));

    // A duplicate label is a named conflict and clears the flow
    let out = h.send_text(ADMIN, "skip").await;
    assert!(message_text(&out).contains("already exists"));
    assert!(h.db.get_actor(ADMIN).unwrap().unwrap().flow.is_none());
}

#[tokio::test]
async fn owner_scoped_controls_reject_everyone_else() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "/start").await;
    let before = h.db.get_actor(MEMBER).unwrap().unwrap().streak_start;

    let out = h.tap(OTHER, &format!("relapse_{}", MEMBER)).await;
    assert_eq!(ack_text(&out), Some("This button is not yours."));
    assert_eq!(h.db.get_actor(MEMBER).unwrap().unwrap().streak_start, before);

    // The owner can
    let out = h.tap(MEMBER, &format!("relapse_{}", MEMBER)).await;
    assert!(edit_text(&out).contains("Streak reset"));
}

#[tokio::test]
async fn unmatched_text_outside_a_flow_is_a_silent_noop() {
    let mut h = Harness::new();

    let out = h.send_text(MEMBER, "what is this bot").await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn banned_actors_are_ignored() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "/start").await;
    h.db.with_conn_mut(|conn| {
        conn.execute("UPDATE actors SET banned = 1 WHERE id = ?1", [MEMBER])?;
        Ok(())
    })
    .unwrap();

    let out = h.send_text(MEMBER, "/start").await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn browse_pagination_synthesizes_controls_only_where_pages_exist() {
    let mut h = Harness::new();

    h.send_text(MEMBER, "/start").await;
    for i in 0..13 {
        h.send_text(MEMBER, "🙊 Confess").await;
        h.send_text(MEMBER, &format!("confession number {}", i)).await;
        let pending = h.db.first_pending().unwrap().unwrap();
        h.db.approve_confession(pending.id).unwrap();
    }

    // Page 0 of 13: next only
    let out = h.tap(MEMBER, "browse_0").await;
    let kb = out
        .iter()
        .find_map(|o| match o {
            Outgoing::Edit { markup: Some(kb), .. } => Some(kb),
            _ => None,
        })
        .expect("expected a keyboard");
    let nav: Vec<&str> = kb
        .inline_keyboard
        .last()
        .unwrap()
        .iter()
        .filter_map(|b| b.callback_data.as_deref())
        .collect();
    assert!(nav.contains(&"browse_1"));
    assert!(!nav.iter().any(|d| *d == "browse_-1"));

    // Last page: previous only
    let out = h.tap(MEMBER, "browse_1").await;
    let kb = out
        .iter()
        .find_map(|o| match o {
            Outgoing::Edit { markup: Some(kb), .. } => Some(kb),
            _ => None,
        })
        .unwrap();
    let nav: Vec<&str> = kb
        .inline_keyboard
        .last()
        .unwrap()
        .iter()
        .filter_map(|b| b.callback_data.as_deref())
        .collect();
    assert_eq!(nav, vec!["browse_0"]);
}
