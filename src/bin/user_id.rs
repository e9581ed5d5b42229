//! Answer every message with the sender's Telegram ID.
//!
//! Usage: cargo run --bin user_id
//!
//! Run this with the same `telebot` token before filling in `users_id`, then
//! message the bot to learn the IDs to allow-list.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let token = match std::env::var("telebot") {
        Ok(token) if !token.trim().is_empty() => token,
        _ => {
            eprintln!("Export the Telegram bot token as 'telebot' first");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(token.trim());
    info!("Bot running - checking user IDs");

    teloxide::repl(bot, |bot: Bot, msg: Message| async move {
        if let Some(ref user) = msg.from {
            info!("ID request from {} ({})", user.first_name, user.id);
            let text = format!("Your Telegram ID is <b>{}</b>", user.id);
            if let Err(e) = bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html).await {
                warn!("Failed to send ID to {}: {e}", user.id);
            }
        }
        respond(())
    })
    .await;
}
