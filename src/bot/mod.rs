// Bot module - inbound update routing

pub mod callbacks;
pub mod commands;
pub mod dialogue;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::context::AppContext;
use crate::services::notifier::{InlineKeyboard, MessageRef};
use crate::services::telegram::{BotCommand, TelegramClient, Update};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Commands advertised in the client's menu.
pub const MEMBER_COMMANDS: [(&str, &str); 9] = [
    ("start", "Start or register"),
    ("payment", "Report a payment"),
    ("profile", "My profile"),
    ("sick", "Report a sick day"),
    ("schedule", "Gym schedule"),
    ("rules", "Gym rules"),
    ("quit", "Leave the program"),
    ("cancel", "Cancel the current step"),
    ("help", "Help"),
];

pub fn bot_commands() -> Vec<BotCommand> {
    MEMBER_COMMANDS
        .iter()
        .map(|(command, description)| BotCommand {
            command: command.to_string(),
            description: description.to_string(),
        })
        .collect()
}

pub(crate) async fn reply(ctx: &AppContext, chat_id: i64, text: &str) -> Option<MessageRef> {
    ctx.notifier.send(chat_id, text, None).await
}

pub(crate) async fn reply_with(
    ctx: &AppContext,
    chat_id: i64,
    text: &str,
    keyboard: &InlineKeyboard,
) -> Option<MessageRef> {
    ctx.notifier.send(chat_id, text, Some(keyboard)).await
}

/// Routes one inbound update. Updates are handled one at a time, in arrival
/// order.
pub async fn handle_update(ctx: &AppContext, update: Update) {
    if let Some(callback) = update.callback_query {
        callbacks::handle_callback(ctx, callback).await;
    } else if let Some(message) = update.message {
        commands::handle_message(ctx, message).await;
    } else {
        tracing::debug!(update_id = update.update_id, "Ignoring unsupported update");
    }
}

/// Long-polls the Bot API until `shutdown` flips to true.
pub async fn run_polling(
    ctx: Arc<AppContext>,
    client: Arc<TelegramClient>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0;
    tracing::info!("Polling for updates");

    loop {
        let updates = tokio::select! {
            _ = shutdown.changed() => break,
            result = client.get_updates(offset) => result,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    handle_update(&ctx, update).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch updates");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    tracing::info!("Update polling stopped");
}
