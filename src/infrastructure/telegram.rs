//! Telegram delivery adapter.

use crate::infrastructure::entities::UserId;
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{Keyboard, Notifier};
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::warn;
use reqwest::Url;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ReplyMarkup,
};

/// Telegram rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramNotifier {
    bot: Option<Bot>,
}

#[injectable(Notifier)]
impl TelegramNotifier {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> TelegramNotifier {
        TelegramNotifier {
            bot: settings.telegram_token.as_deref().map(Bot::new),
        }
    }
}

pub fn reply_markup(keyboard: Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Menu(rows) => KeyboardMarkup::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
        )
        .resize_keyboard()
        .into(),
        Keyboard::Links(links) => InlineKeyboardMarkup::new(
            links
                .into_iter()
                .filter_map(|(caption, url)| match Url::parse(&url) {
                    Ok(url) => Some(vec![InlineKeyboardButton::url(caption, url)]),
                    Err(e) => {
                        warn!("dropping button \"{caption}\" with bad url: {e}");
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
        .into(),
        Keyboard::Actions(actions) => InlineKeyboardMarkup::new(
            actions
                .into_iter()
                .map(|(caption, data)| vec![InlineKeyboardButton::callback(caption, data)])
                .collect::<Vec<_>>(),
        )
        .into(),
    }
}

fn clip(text: &str) -> String {
    text.chars().take(MAX_MESSAGE_CHARS).collect()
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: UserId, text: &str, keyboard: Option<Keyboard>) {
        let Some(bot) = &self.bot else {
            warn!("telegram delivery disabled, dropping message for {user_id}");
            return;
        };

        let mut request = bot.send_message(ChatId(user_id.0), clip(text));
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(reply_markup(keyboard));
        }

        if let Err(e) = request.await {
            warn!("failed to deliver message to {user_id}: {e}");
        }
    }
}
