//! Runtime configuration read from the environment (and `.env`).

use crate::infrastructure::entities::UserId;
use chrono::Duration;
use di::{inject, injectable};
use log::error;
use sqlx::sqlite::SqliteConnectOptions;
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_TRIAL_TOKEN_LIMIT: i64 = 10_000;
pub const DEFAULT_TRIAL_DURATION_SECONDS: i64 = 86_400;
pub const DEFAULT_MAX_HISTORY: usize = 20;
pub const DEFAULT_TRIAL_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("DATABASE_URL is invalid: {0}")]
    InvalidDatabaseUrl(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: SqliteConnectOptions,
    pub telegram_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    pub payment_return_url: String,
    pub admin_id: Option<UserId>,
    /// Bearer token for the HTTP admin API. The API refuses every call without it.
    pub admin_token: Option<String>,
    pub bind_addr: String,
    pub bot_name: String,
    pub trial_model: String,
    pub trial_token_limit: i64,
    pub trial_duration: Duration,
    pub warning_window: Duration,
    pub completion_timeout: std::time::Duration,
    pub max_history: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: SqliteConnectOptions::new()
                .filename("gate.db")
                .create_if_missing(true),
            telegram_token: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            payment_return_url: "https://t.me/NeiroMaxBot".to_owned(),
            admin_id: None,
            admin_token: None,
            bind_addr: "0.0.0.0:3000".to_owned(),
            bot_name: "Neiro Max".to_owned(),
            trial_model: DEFAULT_TRIAL_MODEL.to_owned(),
            trial_token_limit: DEFAULT_TRIAL_TOKEN_LIMIT,
            trial_duration: Duration::seconds(DEFAULT_TRIAL_DURATION_SECONDS),
            warning_window: Duration::hours(24),
            completion_timeout: std::time::Duration::from_secs(60),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[injectable]
impl Settings {
    /// DI constructor. `main` validates the environment with [`Settings::from_env`]
    /// before the container is built, so the fallback only covers late edits.
    #[inject]
    pub fn create() -> Settings {
        Settings::from_env().unwrap_or_else(|e| {
            error!("invalid configuration, using defaults: {e}");
            Settings::default()
        })
    }
}

impl Settings {
    pub fn from_env() -> Result<Settings, SettingsError> {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        let database = match env::var("DATABASE_URL") {
            Ok(url) => SqliteConnectOptions::from_str(&url)?.create_if_missing(true),
            Err(_) => defaults.database,
        };

        Ok(Settings {
            database,
            telegram_token: non_empty("TELEGRAM_TOKEN"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            yookassa_shop_id: non_empty("YOOKASSA_SHOP_ID"),
            yookassa_secret_key: non_empty("YOOKASSA_SECRET_KEY"),
            payment_return_url: non_empty("PAYMENT_RETURN_URL")
                .unwrap_or(defaults.payment_return_url),
            admin_id: parsed::<i64>("ADMIN_ID")?.map(UserId),
            admin_token: non_empty("ADMIN_TOKEN"),
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            bot_name: non_empty("BOT_NAME").unwrap_or(defaults.bot_name),
            trial_model: non_empty("TRIAL_MODEL").unwrap_or(defaults.trial_model),
            trial_token_limit: parsed("TRIAL_TOKEN_LIMIT")?.unwrap_or(defaults.trial_token_limit),
            trial_duration: parsed("TRIAL_DURATION_SECONDS")?
                .map(Duration::seconds)
                .unwrap_or(defaults.trial_duration),
            warning_window: defaults.warning_window,
            completion_timeout: parsed("COMPLETION_TIMEOUT_SECONDS")?
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.completion_timeout),
            max_history: parsed("MAX_HISTORY")?.unwrap_or(defaults.max_history),
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == Some(user_id)
    }

    /// Compares without short-circuiting on the first differing byte.
    pub fn admin_token_matches(&self, presented: &str) -> bool {
        let Some(expected) = self.admin_token.as_deref() else {
            return false;
        };
        expected.len() == presented.len()
            && expected
                .bytes()
                .zip(presented.bytes())
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &'static str) -> Result<Option<T>, SettingsError> {
    match non_empty(name) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| SettingsError::InvalidNumber { name, value }),
    }
}
