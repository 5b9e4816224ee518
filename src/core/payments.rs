//! Turns successful payments into subscriptions.

use crate::core::errors::{CoreError, ErrorCode};
use crate::core::notices::{Notice, Notices};
use crate::core::plans::{self, FALLBACK, Plan};
use crate::core::traits::PaymentActivationService;
use crate::infrastructure::entities::{Activation, ActivationOutcome, Subscription, UserId};
use crate::infrastructure::traits::{Notifier, PaymentError, PaymentGateway, RecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use di::{Ref, injectable};
use log::{debug, info, warn};
use minijinja::context;

/// Provider notification reduced to what activation needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentEvent {
    pub event_type: String,
    pub payment_id: Option<String>,
    /// Free text naming the purchased plan.
    pub description: String,
    pub user_id: Option<UserId>,
    /// Plan code carried in metadata. Takes precedence over the description.
    pub plan_code: Option<String>,
    /// Overrides the plan's duration in days.
    pub days_override: Option<i64>,
}

impl PaymentEvent {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.event_type.as_str(), "payment.succeeded" | "succeeded")
    }

    fn plan(&self) -> Option<&'static Plan> {
        self.plan_code
            .as_deref()
            .and_then(plans::lookup)
            .or_else(|| plans::lookup(&self.description))
    }
}

/// Longest period a `days` override may grant.
pub const MAX_OVERRIDE_DAYS: i64 = 366;

const SUCCEEDED: &str = "succeeded";

/// `None` for overrides outside `1..=MAX_OVERRIDE_DAYS`.
fn override_duration(days: i64) -> Option<Duration> {
    if (1..=MAX_OVERRIDE_DAYS).contains(&days) {
        Duration::try_days(days)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationReport {
    /// Not a terminal success event.
    Ignored,
    /// No user to credit.
    Unresolved,
    /// No payment id to deduplicate on.
    Untracked,
    /// The provider does not report the payment as succeeded.
    Unconfirmed,
    /// Already applied earlier.
    Replayed,
    /// The renewed expiry would overflow the date range.
    OutOfRange,
    Activated {
        subscription: Subscription,
        /// The description matched no plan and the fallback plan was granted.
        fallback: bool,
    },
}

#[injectable(PaymentActivationService)]
pub struct PaymentActivationHandler {
    store: Ref<dyn RecordStore>,
    gateway: Ref<dyn PaymentGateway>,
    notifier: Ref<dyn Notifier>,
    notices: Ref<Notices>,
}

impl PaymentActivationHandler {
    pub fn new(
        store: Ref<dyn RecordStore>,
        gateway: Ref<dyn PaymentGateway>,
        notifier: Ref<dyn Notifier>,
        notices: Ref<Notices>,
    ) -> PaymentActivationHandler {
        PaymentActivationHandler {
            store,
            gateway,
            notifier,
            notices,
        }
    }
}

#[async_trait]
impl PaymentActivationService for PaymentActivationHandler {
    async fn activate(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<ActivationReport, CoreError> {
        if !event.is_succeeded() {
            debug!("ignoring payment event `{}`", event.event_type);
            return Ok(ActivationReport::Ignored);
        }

        let Some(user_id) = event.user_id else {
            warn!(
                "{}: payment {:?} ({}) names no user",
                ErrorCode::PaymentUnresolved,
                event.payment_id,
                event.description
            );
            return Ok(ActivationReport::Unresolved);
        };

        let Some(payment_id) = event.payment_id.as_deref().filter(|id| !id.is_empty()) else {
            warn!("payment for {user_id} carries no payment id, skipping");
            return Ok(ActivationReport::Untracked);
        };

        match self.gateway.payment_status(payment_id).await {
            Ok(status) if status == SUCCEEDED => {}
            Ok(status) => {
                warn!("payment {payment_id} for {user_id} is `{status}` at the provider, not activating");
                return Ok(ActivationReport::Unconfirmed);
            }
            Err(PaymentError::InvalidPaymentId(_)) => {
                warn!("payment id `{payment_id}` for {user_id} is malformed, not activating");
                return Ok(ActivationReport::Unconfirmed);
            }
            Err(PaymentError::NotConfigured) => {
                debug!("payment provider not configured, taking payment {payment_id} as reported");
            }
            Err(e) => return Err(e.into()),
        }

        let (plan, fallback) = match event.plan() {
            Some(plan) => (plan, false),
            None => {
                warn!(
                    "{}: payment {payment_id} for {user_id} has unknown plan `{}`, granting {}",
                    ErrorCode::PaymentUnknownPlan,
                    event.description,
                    FALLBACK.description
                );
                (&FALLBACK, true)
            }
        };

        let duration = match event.days_override {
            None => plan.duration(),
            Some(days) => match override_duration(days) {
                Some(duration) => duration,
                None => {
                    warn!(
                        "payment {payment_id} for {user_id} asks for {days} days, keeping the plan's {}",
                        plan.days
                    );
                    plan.duration()
                }
            },
        };

        let activation = Activation {
            payment_id: payment_id.to_owned(),
            user_id,
            tier: plan.tier,
            model: plan.model.to_owned(),
            token_limit: plan.token_limit,
            duration,
        };

        let subscription = match self.store.apply_activation(&activation, now).await? {
            ActivationOutcome::Replayed => {
                info!("payment {payment_id} for {user_id} was already applied");
                return Ok(ActivationReport::Replayed);
            }
            ActivationOutcome::OutOfRange => {
                warn!("payment {payment_id} would push the plan of {user_id} past the date range");
                return Ok(ActivationReport::OutOfRange);
            }
            ActivationOutcome::Applied(subscription) => subscription,
        };

        info!(
            "activated {} for {user_id} until {} (payment {payment_id})",
            plan.code(),
            subscription.expires_at
        );

        let text = self.notices.text(
            Notice::Activated,
            context! {
                plan => plan.description,
                expires_at => subscription.expires_at.format("%d.%m.%Y %H:%M").to_string(),
            },
        );
        self.notifier.notify(user_id, &text, None).await;

        Ok(ActivationReport::Activated {
            subscription,
            fallback,
        })
    }
}
