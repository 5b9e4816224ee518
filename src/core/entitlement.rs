//! Access decisions for trial and paid users.

use crate::core::errors::{CoreError, DenyReason};
use crate::core::menus;
use crate::core::notices::{Notice, Notices};
use crate::core::styles::StyleMode;
use crate::core::traits::EntitlementService;
use crate::infrastructure::entities::{PlanTier, Subscription, TrialState, UserId};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{Notifier, RecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::{debug, info, warn};
use minijinja::context;
use serde::Serialize;

/// The tier a request runs under and the completion model it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierModel {
    pub tier: PlanTier,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allow: bool,
    pub model: TierModel,
    pub reason: Option<DenyReason>,
    /// This evaluation created the user's trial record.
    pub trial_started: bool,
    /// This evaluation sent the one-time "expiring soon" notice.
    pub expiry_warning: bool,
}

impl Decision {
    fn allow(model: TierModel) -> Decision {
        Decision {
            allow: true,
            model,
            reason: None,
            trial_started: false,
            expiry_warning: false,
        }
    }

    fn deny(model: TierModel, reason: DenyReason) -> Decision {
        Decision {
            allow: false,
            model,
            reason: Some(reason),
            trial_started: false,
            expiry_warning: false,
        }
    }
}

/// Everything the engine knows about one user, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSnapshot {
    pub user_id: UserId,
    pub trial: Option<TrialState>,
    pub subscription: Option<Subscription>,
    pub style: &'static str,
}

#[injectable(EntitlementService)]
pub struct EntitlementEngine {
    store: Ref<dyn RecordStore>,
    notifier: Ref<dyn Notifier>,
    notices: Ref<Notices>,
    settings: Ref<Settings>,
}

impl EntitlementEngine {
    pub fn new(
        store: Ref<dyn RecordStore>,
        notifier: Ref<dyn Notifier>,
        notices: Ref<Notices>,
        settings: Ref<Settings>,
    ) -> EntitlementEngine {
        EntitlementEngine {
            store,
            notifier,
            notices,
            settings,
        }
    }

    fn trial_model(&self) -> TierModel {
        TierModel {
            tier: PlanTier::Trial,
            model: self.settings.trial_model.clone(),
        }
    }

    async fn read_trial(&self, user_id: UserId) -> Option<TrialState> {
        self.store.trial(user_id).await.unwrap_or_else(|e| {
            warn!("reading trial of {user_id} failed, treating it as absent: {e}");
            None
        })
    }

    async fn read_subscription(&self, user_id: UserId) -> Option<Subscription> {
        self.store.subscription(user_id).await.unwrap_or_else(|e| {
            warn!("reading subscription of {user_id} failed, treating it as absent: {e}");
            None
        })
    }

    async fn evaluate_trial(&self, user_id: UserId, now: DateTime<Utc>) -> Decision {
        let model = self.trial_model();

        let Some(trial) = self.read_trial(user_id).await else {
            let started = self.store.start_trial(user_id, now).await.unwrap_or_else(|e| {
                warn!("starting trial of {user_id} failed: {e}");
                false
            });
            if started {
                info!("trial started for {user_id}");
            }
            return Decision {
                trial_started: started,
                ..Decision::allow(model)
            };
        };

        match trial.expired_by(
            now,
            self.settings.trial_duration,
            self.settings.trial_token_limit,
        ) {
            Some(limit) => {
                debug!(
                    "trial of {user_id} ended by {limit:?} ({} consumed)",
                    trial.tokens_consumed
                );
                Decision::deny(model, DenyReason::TrialExpired(limit))
            }
            None => Decision::allow(model),
        }
    }

    async fn evaluate_subscription(
        &self,
        user_id: UserId,
        subscription: Subscription,
        now: DateTime<Utc>,
    ) -> Decision {
        let consumed = self
            .read_trial(user_id)
            .await
            .map(|trial| trial.tokens_consumed)
            .unwrap_or(0);
        let model = TierModel {
            tier: subscription.tier,
            model: subscription.model.clone(),
        };

        if consumed >= subscription.token_limit {
            return Decision::deny(model, DenyReason::TokenLimitExceeded);
        }
        if now > subscription.expires_at {
            return Decision::deny(model, DenyReason::SubscriptionExpired);
        }

        let remaining = subscription.expires_at - now;
        if subscription.warned || remaining > self.settings.warning_window {
            return Decision::allow(model);
        }

        // Only the call that flips the flag notifies.
        let flipped = self.store.mark_warned(user_id).await.unwrap_or_else(|e| {
            warn!("marking {user_id} as warned failed: {e}");
            false
        });
        if flipped {
            let text = self.notices.text(
                Notice::ExpiringSoon,
                context! {
                    hours => self.settings.warning_window.num_hours(),
                    expires_at => subscription.expires_at.format("%d.%m.%Y %H:%M").to_string(),
                },
            );
            self.notifier
                .notify(user_id, &text, Some(menus::renew()))
                .await;
        }

        Decision {
            expiry_warning: flipped,
            ..Decision::allow(model)
        }
    }
}

#[async_trait]
impl EntitlementService for EntitlementEngine {
    async fn evaluate(&self, user_id: UserId, now: DateTime<Utc>) -> Decision {
        match self.read_subscription(user_id).await {
            Some(subscription) if subscription.tier != PlanTier::Trial => {
                self.evaluate_subscription(user_id, subscription, now).await
            }
            _ => self.evaluate_trial(user_id, now).await,
        }
    }

    async fn record_consumption(
        &self,
        user_id: UserId,
        prompt_payload: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, CoreError> {
        let amount = prompt_payload.chars().count() as i64;
        let total = self.store.add_consumption(user_id, amount, now).await?;
        debug!("{user_id} consumed {amount}, total {total}");
        Ok(total)
    }

    async fn select_style(
        &self,
        user_id: UserId,
        requested_mode: &str,
    ) -> Result<StyleMode, CoreError> {
        let mode = StyleMode::parse(requested_mode)
            .ok_or_else(|| CoreError::UnknownStyle(requested_mode.trim().to_owned()))?;
        self.store.set_style(user_id, mode.label()).await?;
        Ok(mode)
    }

    async fn current_style(&self, user_id: UserId) -> StyleMode {
        match self.store.style(user_id).await {
            Ok(Some(label)) => StyleMode::parse(&label).unwrap_or_else(|| {
                warn!("stored style `{label}` of {user_id} is unknown, using the default");
                StyleMode::default()
            }),
            Ok(None) => StyleMode::default(),
            Err(e) => {
                warn!("reading style of {user_id} failed, using the default: {e}");
                StyleMode::default()
            }
        }
    }

    async fn reset_trial(&self, user_id: UserId) -> Result<bool, CoreError> {
        let existed = self.store.reset_trial(user_id).await?;
        info!("trial of {user_id} reset (existed: {existed})");
        Ok(existed)
    }

    async fn snapshot(&self, user_id: UserId) -> Result<EntitlementSnapshot, CoreError> {
        Ok(EntitlementSnapshot {
            user_id,
            trial: self.store.trial(user_id).await?,
            subscription: self.store.subscription(user_id).await?,
            style: self.current_style(user_id).await.label(),
        })
    }
}
