//! Infrastructure traits, used for DI on higher levels

use crate::core::assistant::ChatMessage;
use crate::infrastructure::entities::{
    Activation, ActivationOutcome, HistoryEntry, MessageKind, Subscription, TrialState, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service is not configured")]
    NotConfigured,
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("completion provider returned no content")]
    EmptyResponse,
    #[error("completion timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider is not configured")]
    NotConfigured,
    #[error("payment request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("payment response carried no confirmation url")]
    MissingConfirmation,
    #[error("malformed payment id `{0}`")]
    InvalidPaymentId(String),
}

/// Durable per-user records. Every method addresses a single user's rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn trial(&self, user_id: UserId) -> Result<Option<TrialState>, StoreError>;

    /// Creates the trial row if absent. Returns `true` when this call created it.
    async fn start_trial(&self, user_id: UserId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Adds `amount` to the consumption counter and returns the new total.
    ///
    /// Creates the trial row (started `now`) when the user has none yet.
    async fn add_consumption(
        &self,
        user_id: UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Deletes the trial row. Returns `true` when a row existed.
    async fn reset_trial(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError>;

    /// Flips `warned` from false to true. Returns `true` only for the call that flipped it.
    async fn mark_warned(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Records the payment id and writes the renewed subscription in one transaction.
    async fn apply_activation(
        &self,
        activation: &Activation,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome, StoreError>;

    async fn history(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Appends messages in order, then keeps only the newest `keep` rows.
    async fn append_history(
        &self,
        user_id: UserId,
        messages: &[(MessageKind, String)],
        keep: usize,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn clear_history(&self, user_id: UserId) -> Result<(), StoreError>;

    async fn style(&self, user_id: UserId) -> Result<Option<String>, StoreError>;

    async fn set_style(&self, user_id: UserId, mode: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    /// Whole currency units, e.g. roubles.
    pub value: u32,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a checkout and returns the redirect url for the user.
    async fn create_payment(
        &self,
        amount: &Amount,
        description: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, PaymentError>;

    /// The provider's current status of a payment, e.g. `succeeded`.
    async fn payment_status(&self, payment_id: &str) -> Result<String, PaymentError>;
}

/// Presentation-neutral keyboards attached to outgoing messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    /// Persistent reply keyboard, one inner vec per row of captions.
    Menu(Vec<Vec<String>>),
    /// Inline buttons opening external links: `(caption, url)`.
    Links(Vec<(String, String)>),
    /// Inline buttons sending callback data back: `(caption, data)`.
    Actions(Vec<(String, String)>),
}

/// Delivery of messages to a user. Fire-and-forget: implementations log failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, text: &str, keyboard: Option<Keyboard>);
}
