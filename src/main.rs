use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use jobconnect_messaging::{
    ClientConfig, ConversationListView, HttpMessageStore, Messenger, ThreadView,
};

/// Terminal front-end for the messaging client.
///
/// `jobconnect-chat [USER_ID] [COUNTERPART_ID]`: without a counterpart the
/// conversation list is shown and refreshed; with one, that thread is opened
/// and every line typed on stdin is sent to it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobconnect_messaging=info,jobconnect_chat=info".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = ClientConfig::from_env().context("invalid configuration")?;
    let mut args = std::env::args().skip(1);
    let user_id = args
        .next()
        .or_else(|| std::env::var("JOBCONNECT_USER_ID").ok())
        .context("pass a user id or set JOBCONNECT_USER_ID")?;
    let counterpart_id = args.next();

    info!(api = %config.api_base_url, %user_id, "starting messaging client");

    // ── Wiring ────────────────────────────────────────────────────────────────
    let store = HttpMessageStore::new(&config)?;
    let messenger = Messenger::new(store, config);
    messenger.login(user_id);

    match counterpart_id {
        None => run_conversation_list(&messenger).await,
        Some(counterpart_id) => run_thread(&messenger, counterpart_id).await,
    }
}

async fn run_conversation_list(messenger: &Messenger<HttpMessageStore>) -> anyhow::Result<()> {
    let mut views = messenger.subscribe_conversations();
    messenger.start_conversation_polling();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                print_conversations(&views.borrow_and_update());
            }
        }
    }

    messenger.stop_conversation_polling();
    Ok(())
}

async fn run_thread(
    messenger: &Messenger<HttpMessageStore>,
    counterpart_id: String,
) -> anyhow::Result<()> {
    let mut views = messenger.subscribe_thread();
    messenger.open_conversation(counterpart_id, None)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sender = messenger.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send_message(&line).await {
                        warn!("{e}");
                    }
                });
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                printed = print_thread(&views.borrow_and_update(), printed);
                messenger.mark_seen();
            }
        }
    }

    messenger.close_conversation();
    Ok(())
}

fn print_conversations(view: &ConversationListView) {
    if view.identity_missing {
        println!("Please login to view messages.");
        return;
    }
    if let Some(error) = &view.error {
        println!("! {error}");
        return;
    }
    if view.loading {
        return;
    }
    println!("── Messages ──");
    if view.conversations.is_empty() {
        println!("No messages yet");
    }
    for conversation in &view.conversations {
        println!(
            "{:<24} {}  [{}]",
            conversation.display_name(),
            conversation.last_message_text,
            conversation.last_message_at.format("%H:%M"),
        );
    }
}

/// Prints confirmed entries not printed yet and returns the new count.
fn print_thread(view: &ThreadView, already_printed: usize) -> usize {
    if let Some(error) = &view.error {
        println!("! {error}");
    }
    let confirmed: Vec<_> = view.messages.iter().filter(|m| !m.pending).collect();
    // Entries may have been inserted before the tail; reprint on shrink.
    let start = if confirmed.len() < already_printed { 0 } else { already_printed };
    for message in &confirmed[start..] {
        let who = if view.is_mine(message) { "me" } else { message.sender_id() };
        println!(
            "[{}] {who}: {}",
            message.created_at.format("%H:%M"),
            message.text
        );
    }
    confirmed.len()
}
