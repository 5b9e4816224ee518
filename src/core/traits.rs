//! DI "Interfaces"

use crate::core::entitlement::{Decision, EntitlementSnapshot};
use crate::core::errors::CoreError;
use crate::core::payments::{ActivationReport, PaymentEvent};
use crate::core::services::{InfoTopic, PromptOutcome};
use crate::core::styles::StyleMode;
use crate::infrastructure::entities::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait EntitlementService: Send + Sync {
    /// Decides whether `user_id` may send a request right now and under which model.
    ///
    /// Never fails: store read errors are treated as missing records, which
    /// lands the user on the trial path.
    async fn evaluate(&self, user_id: UserId, now: DateTime<Utc>) -> Decision;

    /// Charges a completed request against the user's budget.
    ///
    /// The charge is the prompt's character count. Returns the new total.
    async fn record_consumption(
        &self,
        user_id: UserId,
        prompt_payload: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, CoreError>;

    /// Validates and persists a style. Fails with `UNKNOWN_STYLE` for anything
    /// outside the fixed set.
    async fn select_style(&self, user_id: UserId, requested_mode: &str)
    -> Result<StyleMode, CoreError>;

    /// The persisted style, or the default one for new users.
    async fn current_style(&self, user_id: UserId) -> StyleMode;

    /// Removes the user's trial record so the next request starts a fresh trial.
    ///
    /// Returns `false` if the user had no trial.
    async fn reset_trial(&self, user_id: UserId) -> Result<bool, CoreError>;

    async fn snapshot(&self, user_id: UserId) -> Result<EntitlementSnapshot, CoreError>;
}

#[async_trait]
pub trait PaymentActivationService: Send + Sync {
    /// Applies a provider notification to the referenced user's subscription.
    ///
    /// Only storage failures are errors; everything else is reported through
    /// [`ActivationReport`] so the webhook can always acknowledge.
    async fn activate(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<ActivationReport, CoreError>;
}

/// Per-message coordination between the chat transport and the core.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Greets the user and shows the launch button.
    async fn start(&self, user_id: UserId);

    /// Shows the main menu. Also creates the trial record on first launch.
    async fn launch(&self, user_id: UserId);

    async fn info(&self, user_id: UserId, topic: InfoTopic);

    async fn handle_prompt(&self, user_id: UserId, text: &str) -> PromptOutcome;

    /// Sends one checkout link per paid plan.
    async fn offer_plans(&self, user_id: UserId);

    /// Shows the style picker.
    async fn choose_style(&self, user_id: UserId);

    async fn change_style(&self, user_id: UserId, requested_mode: &str)
    -> Result<StyleMode, CoreError>;

    async fn reset_history(&self, user_id: UserId) -> Result<(), CoreError>;

    /// Admin operation. Fails with [`CoreError::NotAdmin`] for everyone else.
    async fn reset_trial(&self, requested_by: UserId, target: UserId) -> Result<bool, CoreError>;
}
