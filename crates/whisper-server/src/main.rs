use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use whisper_engine::delivery::{DeliveryQueue, run_delivery_worker};
use whisper_engine::{Engine, Outgoing};
use whisper_telegram::{Bot, Update};

/// Wall-clock budget for one webhook invocation, measured from receipt.
const DEADLINE: Duration = Duration::from_secs(8);
/// Pause between consecutive broadcast sends.
const BROADCAST_PACE: Duration = Duration::from_millis(150);
/// How often expired records are pruned.
const CLEANUP_INTERVAL_SECS: u64 = 600;

#[derive(Clone)]
struct ServerState {
    engine: Arc<Engine>,
    bot: Bot,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=debug,tower_http=debug".into()),
        )
        .init();

    // Required configuration: refuse to start without it
    let token = std::env::var("WHISPER_BOT_TOKEN").context("WHISPER_BOT_TOKEN must be set")?;
    let db_path = std::env::var("WHISPER_DB_PATH").context("WHISPER_DB_PATH must be set")?;
    let admin_ids = parse_admin_ids(&std::env::var("WHISPER_ADMIN_IDS").unwrap_or_default());
    let host = std::env::var("WHISPER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WHISPER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Arc::new(whisper_db::Database::open(&PathBuf::from(&db_path))?);
    let bot = Bot::new(&token);

    // Background work: outbound delivery and retention cleanup, both
    // independent of any single webhook invocation
    let (queue, rx) = DeliveryQueue::new();
    tokio::spawn(run_delivery_worker(rx, bot.clone(), BROADCAST_PACE));
    tokio::spawn(whisper_db::cleanup::run_cleanup_loop(db.clone(), CLEANUP_INTERVAL_SECS));

    let engine = Arc::new(Engine::new(db, queue, admin_ids));
    let state = ServerState { engine, bot };

    let app = Router::new()
        .route("/", get(liveness))
        .route("/webhook", post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Whisper listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Privileged actor ids, comma-separated, entries trimmed.
fn parse_admin_ids(raw: &str) -> HashSet<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// GET with no payload: liveness probe, no side effects.
async fn liveness() -> &'static str {
    "whisper is running"
}

/// POST: one platform update. The response is always 200 "OK" so the
/// platform never reinterprets a slow or failed invocation as undelivered
/// and retries it.
async fn webhook(State(state): State<ServerState>, body: Bytes) -> &'static str {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("undecodable update payload: {}", e);
            return "OK";
        }
    };

    let update_id = update.update_id;
    acknowledge(update_id, process(state, update)).await
}

/// Race the work against the deadline. If the budget elapses first we stop
/// waiting and acknowledge; the spawned work keeps running and may still
/// finish its side effects after the response.
async fn acknowledge(update_id: i64, work: impl Future<Output = ()> + Send + 'static) -> &'static str {
    let handle = tokio::spawn(work);
    match tokio::time::timeout(DEADLINE, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("update {} processing panicked: {}", update_id, e),
        Err(_) => warn!(
            "update {} exceeded the {}s budget, acknowledged early",
            update_id,
            DEADLINE.as_secs()
        ),
    }
    "OK"
}

async fn process(state: ServerState, update: Update) {
    for out in state.engine.handle_update(update).await {
        deliver(&state.bot, out).await;
    }
}

async fn deliver(bot: &Bot, out: Outgoing) {
    let result = match out {
        Outgoing::Message { chat_id, text, markup } => {
            bot.send_message(chat_id, &text, markup).await.map(|_| ())
        }
        Outgoing::Edit { chat_id, message_id, text, markup } => {
            bot.edit_message_text(chat_id, message_id, &text, markup).await
        }
        Outgoing::CallbackAck { callback_id, text } => {
            bot.answer_callback_query(&callback_id, text.as_deref()).await
        }
    };

    if let Err(e) = result {
        if e.is_blocked() {
            info!("recipient has blocked the bot, skipping send");
        } else {
            warn!("outbound send failed: {}", e);
        }
    }
}
