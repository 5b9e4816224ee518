//! Error taxonomy of the entitlement core.

use crate::infrastructure::entities::UserId;
use crate::infrastructure::traits::{PaymentError, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Stable codes used in logs and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TrialExpired,
    TokenLimitExceeded,
    SubscriptionExpired,
    UnknownStyle,
    StyleViolation,
    CompletionError,
    PaymentUnresolved,
    PaymentUnknownPlan,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::TrialExpired => "TRIAL_EXPIRED",
            ErrorCode::TokenLimitExceeded => "TOKEN_LIMIT_EXCEEDED",
            ErrorCode::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            ErrorCode::UnknownStyle => "UNKNOWN_STYLE",
            ErrorCode::StyleViolation => "STYLE_VIOLATION",
            ErrorCode::CompletionError => "COMPLETION_ERROR",
            ErrorCode::PaymentUnresolved => "PAYMENT_UNRESOLVED",
            ErrorCode::PaymentUnknownPlan => "PAYMENT_UNKNOWN_PLAN",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which trial budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialLimit {
    Duration,
    Tokens,
}

/// Why a request was refused. Always terminal for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    TrialExpired(TrialLimit),
    TokenLimitExceeded,
    SubscriptionExpired,
}

impl DenyReason {
    pub fn code(self) -> ErrorCode {
        match self {
            DenyReason::TrialExpired(_) => ErrorCode::TrialExpired,
            DenyReason::TokenLimitExceeded => ErrorCode::TokenLimitExceeded,
            DenyReason::SubscriptionExpired => ErrorCode::SubscriptionExpired,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown style `{0}`")]
    UnknownStyle(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("user {0} is not an administrator")]
    NotAdmin(UserId),
}

impl CoreError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CoreError::UnknownStyle(_) => Some(ErrorCode::UnknownStyle),
            _ => None,
        }
    }
}
