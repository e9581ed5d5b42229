//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters,
};
use tracing::{info, warn};

use crate::markup::{split_chunks, to_html, MAX_CHUNK_CHARS};
use crate::switchboard::{Choice, Reply};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send a switchboard reply, split into as many messages as it needs.
    ///
    /// The first chunk quotes `reply_to`; choices ride on the last chunk.
    pub async fn send_reply(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        reply: &Reply,
    ) -> Result<(), String> {
        let chunks = split_chunks(&reply.text, MAX_CHUNK_CHARS);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard =
                (i == last && !reply.choices.is_empty()).then(|| inline_keyboard(&reply.choices));
            let reply_to = (i == 0).then_some(reply_to);

            if reply.markup {
                let html = to_html(chunk);
                let sent = self
                    .send(chat_id, &html, Some(ParseMode::Html), reply_to, keyboard.clone())
                    .await;
                match sent {
                    Ok(()) => continue,
                    Err(e) => warn!("HTML reply rejected, resending as plain text: {e}"),
                }
            }
            self.send(chat_id, chunk, None, reply_to, keyboard).await?;
        }
        Ok(())
    }

    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), String> {
        let mut request = self.bot.send_message(chat_id, text);

        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(msg_id));
        }
        if let Some(markup) = keyboard {
            request = request.reply_markup(markup);
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Answer a keyboard click and replace the keyboard message with the outcome.
    pub async fn answer_choice(&self, query: &CallbackQuery, reply: &Reply) -> Result<(), String> {
        self.bot
            .answer_callback_query(query.id.clone())
            .await
            .map_err(|e| format!("Failed to answer callback: {e}"))?;

        let Some(ref message) = query.message else {
            info!("Callback without message, sending outcome to {}", query.from.id);
            return self
                .send(ChatId::from(query.from.id), &reply.text, None, None, None)
                .await;
        };

        let (text, parse_mode) = if reply.markup {
            (to_html(&reply.text), Some(ParseMode::Html))
        } else {
            (reply.text.clone(), None)
        };

        let mut request = self.bot.edit_message_text(message.chat().id, message.id(), text);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to edit choice message: {e}");
            warn!("{}", msg);
            msg
        })
    }
}

fn inline_keyboard(choices: &[Choice]) -> InlineKeyboardMarkup {
    let row = choices
        .iter()
        .map(|c| InlineKeyboardButton::callback(c.label.clone(), c.payload.clone()))
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(vec![row])
}
