//! Database entities

use crate::core::errors::TrialLimit;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

/// Telegram chat id, the key of every per-user record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TrialState {
    pub user_id: UserId,
    pub trial_started_at: DateTime<Utc>,
    pub tokens_consumed: i64,
}

impl TrialState {
    /// The budget that ended the trial, if either did. Time is checked first.
    pub fn expired_by(
        &self,
        now: DateTime<Utc>,
        duration: Duration,
        token_limit: i64,
    ) -> Option<TrialLimit> {
        if now - self.trial_started_at > duration {
            Some(TrialLimit::Duration)
        } else if self.tokens_consumed >= token_limit {
            Some(TrialLimit::Tokens)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// The default tier. A subscription row carrying it is treated as a trial.
    Trial,
    Gpt35Lite,
    Gpt35Pro,
    Gpt35Max,
    Gpt4oLite,
    Gpt4oPro,
    Gpt4oMax,
    BusinessPro,
    /// Granted when a paid description matched no known plan.
    Fallback,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Trial => "trial",
            PlanTier::Gpt35Lite => "gpt35_lite",
            PlanTier::Gpt35Pro => "gpt35_pro",
            PlanTier::Gpt35Max => "gpt35_max",
            PlanTier::Gpt4oLite => "gpt4o_lite",
            PlanTier::Gpt4oPro => "gpt4o_pro",
            PlanTier::Gpt4oMax => "gpt4o_max",
            PlanTier::BusinessPro => "business_pro",
            PlanTier::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Subscription {
    pub user_id: UserId,
    pub tier: PlanTier,
    pub model: String,
    pub token_limit: i64,
    pub expires_at: DateTime<Utc>,
    pub warned: bool,
}

impl Subscription {
    /// Builds the record that replaces `previous` after a successful payment.
    ///
    /// A still-running period is extended rather than overwritten, and the
    /// expiry warning is re-armed for the new period. `None` when the new
    /// expiry falls outside the representable date range.
    pub fn renewed(
        previous: Option<&Subscription>,
        activation: &Activation,
        now: DateTime<Utc>,
    ) -> Option<Subscription> {
        let base = previous
            .map(|p| p.expires_at.max(now))
            .unwrap_or(now);

        Some(Subscription {
            user_id: activation.user_id,
            tier: activation.tier,
            model: activation.model.clone(),
            token_limit: activation.token_limit,
            expires_at: base.checked_add_signed(activation.duration)?,
            warned: false,
        })
    }
}

/// A paid grant ready to be written, keyed by the provider's payment id.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub payment_id: String,
    pub user_id: UserId,
    pub tier: PlanTier,
    pub model: String,
    pub token_limit: i64,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationOutcome {
    Applied(Subscription),
    /// The payment id was already processed, nothing was written.
    Replayed,
    /// The renewed expiry overflowed the date range, nothing was written.
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum MessageKind {
    System = 1,
    Bot = 2,
    User = 3,
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryEntry {
    pub seq: i64,
    pub user_id: UserId,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub text: String,
}
