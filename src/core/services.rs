//! Implementations for the service the app needs.
//!

use crate::core::assistant::ChatMessage;
use crate::core::errors::{CoreError, DenyReason, ErrorCode, TrialLimit};
use crate::core::locks::UserLocks;
use crate::core::menus;
use crate::core::notices::{Notice, Notices};
use crate::core::plans::{CATALOG, CURRENCY};
use crate::core::styles::{StyleMode, filter_by_style};
use crate::core::traits::{ConversationService, EntitlementService};
use crate::infrastructure::entities::{MessageKind, UserId};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{
    Amount, CompletionError, CompletionService, Keyboard, Notifier, PaymentGateway, RecordStore,
};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use futures_util::future::join_all;
use log::{error, info, warn};
use minijinja::context;
use std::collections::BTreeMap;

/// Static texts reachable from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTopic {
    Rules,
    Support,
    BotName,
    MainMenu,
    ResetTrialUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The reply was delivered and the prompt charged.
    Replied { model: String },
    Denied(DenyReason),
    /// The prompt hit the current style's blocklist.
    StyleRejected(StyleMode),
    /// The completion failed or timed out. Nothing was charged.
    CompletionFailed,
    /// Blank prompt.
    Ignored,
}

#[injectable(ConversationService)]
pub struct ConversationOrchestrator {
    entitlements: Ref<dyn EntitlementService>,
    completion: Ref<dyn CompletionService>,
    payments: Ref<dyn PaymentGateway>,
    store: Ref<dyn RecordStore>,
    notifier: Ref<dyn Notifier>,
    notices: Ref<Notices>,
    locks: Ref<UserLocks>,
    settings: Ref<Settings>,
}

impl ConversationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entitlements: Ref<dyn EntitlementService>,
        completion: Ref<dyn CompletionService>,
        payments: Ref<dyn PaymentGateway>,
        store: Ref<dyn RecordStore>,
        notifier: Ref<dyn Notifier>,
        notices: Ref<Notices>,
        locks: Ref<UserLocks>,
        settings: Ref<Settings>,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator {
            entitlements,
            completion,
            payments,
            store,
            notifier,
            notices,
            locks,
            settings,
        }
    }

    async fn deny(&self, user_id: UserId, reason: DenyReason) {
        info!("{}: request of {user_id} denied", reason.code());

        let text = match reason {
            DenyReason::TrialExpired(limit) => self.notices.text(
                Notice::TrialExpired,
                context! {
                    limit => match limit {
                        TrialLimit::Duration => "duration",
                        TrialLimit::Tokens => "tokens",
                    },
                    token_limit => self.settings.trial_token_limit,
                },
            ),
            DenyReason::TokenLimitExceeded => {
                self.notices.text(Notice::TokenLimitExceeded, context! {})
            }
            DenyReason::SubscriptionExpired => {
                self.notices.text(Notice::SubscriptionExpired, context! {})
            }
        };
        self.notifier.notify(user_id, &text, None).await;

        self.offer_plans(user_id).await;
    }

    async fn history(&self, user_id: UserId) -> Vec<ChatMessage> {
        match self.store.history(user_id).await {
            Ok(entries) => entries.into_iter().map(ChatMessage::from).collect(),
            Err(e) => {
                warn!("reading history of {user_id} failed, continuing without it: {e}");
                Vec::new()
            }
        }
    }

    async fn complete(
        &self,
        style: StyleMode,
        history: &[ChatMessage],
        prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError> {
        let request = self
            .completion
            .complete(style.system_prompt(), history, prompt, model);

        tokio::time::timeout(self.settings.completion_timeout, request)
            .await
            .unwrap_or(Err(CompletionError::Timeout))
    }
}

#[async_trait]
impl ConversationService for ConversationOrchestrator {
    async fn start(&self, user_id: UserId) {
        let text = self.notices.text(
            Notice::Greeting,
            context! { bot_name => &self.settings.bot_name },
        );
        self.notifier
            .notify(user_id, &text, Some(menus::launch()))
            .await;
    }

    async fn launch(&self, user_id: UserId) {
        {
            let _guard = self.locks.lock(user_id).await;
            let decision = self.entitlements.evaluate(user_id, Utc::now()).await;
            if let Some(reason) = decision.reason {
                info!("{user_id} launched with {}", reason.code());
            }
        }

        let text = self.notices.text(Notice::Launch, context! {});
        self.notifier
            .notify(user_id, &text, Some(menus::main_menu()))
            .await;
    }

    async fn info(&self, user_id: UserId, topic: InfoTopic) {
        let settings = &self.settings;
        let (text, keyboard) = match topic {
            InfoTopic::Rules => (
                self.notices.text(
                    Notice::Rules,
                    context! {
                        bot_name => &settings.bot_name,
                        trial_hours => settings.trial_duration.num_hours(),
                        token_limit => settings.trial_token_limit,
                    },
                ),
                None,
            ),
            InfoTopic::Support => (self.notices.text(Notice::Support, context! {}), None),
            InfoTopic::BotName => (
                self.notices.text(
                    Notice::BotName,
                    context! { bot_name => &settings.bot_name },
                ),
                None,
            ),
            InfoTopic::MainMenu => (
                self.notices.text(Notice::MainMenu, context! {}),
                Some(menus::main_menu()),
            ),
            InfoTopic::ResetTrialUsage => {
                (self.notices.text(Notice::ResetTrialUsage, context! {}), None)
            }
        };

        self.notifier.notify(user_id, &text, keyboard).await;
    }

    async fn handle_prompt(&self, user_id: UserId, text: &str) -> PromptOutcome {
        let prompt = text.trim();
        if prompt.is_empty() {
            return PromptOutcome::Ignored;
        }

        // One request per user at a time, from the check to the charge.
        let _guard = self.locks.lock(user_id).await;

        let decision = self.entitlements.evaluate(user_id, Utc::now()).await;
        if let Some(reason) = decision.reason {
            self.deny(user_id, reason).await;
            return PromptOutcome::Denied(reason);
        }

        let style = self.entitlements.current_style(user_id).await;
        if !filter_by_style(style, prompt) {
            info!("{}: {user_id} in style {style}", ErrorCode::StyleViolation);
            let text = self.notices.text(
                Notice::StyleViolation,
                context! { style => style.label() },
            );
            self.notifier
                .notify(user_id, &text, Some(menus::style_picker()))
                .await;
            return PromptOutcome::StyleRejected(style);
        }

        let history = self.history(user_id).await;
        let reply = match self
            .complete(style, &history, prompt, &decision.model.model)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{}: completion for {user_id} failed: {e}", ErrorCode::CompletionError);
                let text = self.notices.text(Notice::CompletionError, context! {});
                self.notifier.notify(user_id, &text, None).await;
                return PromptOutcome::CompletionFailed;
            }
        };

        let now = Utc::now();
        if let Err(e) = self
            .entitlements
            .record_consumption(user_id, prompt, now)
            .await
        {
            error!("charging {user_id} failed: {e}");
        }

        let turn = [
            (MessageKind::User, prompt.to_owned()),
            (MessageKind::Bot, reply.clone()),
        ];
        if let Err(e) = self
            .store
            .append_history(user_id, &turn, self.settings.max_history, now)
            .await
        {
            error!("saving history of {user_id} failed: {e}");
        }

        self.notifier.notify(user_id, &reply, None).await;

        PromptOutcome::Replied {
            model: decision.model.model,
        }
    }

    async fn offer_plans(&self, user_id: UserId) {
        let checkouts = CATALOG.iter().map(|plan| async move {
            let amount = Amount {
                value: plan.price,
                currency: CURRENCY.to_owned(),
            };
            let metadata = BTreeMap::from([
                ("user_id".to_owned(), user_id.to_string()),
                ("tariff".to_owned(), plan.code().to_owned()),
            ]);

            match self
                .payments
                .create_payment(&amount, plan.description, &metadata)
                .await
            {
                Ok(url) => Some((plan.caption(), url)),
                Err(e) => {
                    warn!("checkout for {} of {user_id} failed: {e}", plan.code());
                    None
                }
            }
        });

        let links: Vec<(String, String)> = join_all(checkouts).await.into_iter().flatten().collect();

        if links.is_empty() {
            let text = self.notices.text(Notice::PlansUnavailable, context! {});
            self.notifier.notify(user_id, &text, None).await;
        } else {
            let text = self.notices.text(Notice::Plans, context! {});
            self.notifier
                .notify(user_id, &text, Some(Keyboard::Links(links)))
                .await;
        }
    }

    async fn choose_style(&self, user_id: UserId) {
        let text = self.notices.text(Notice::ChooseStyle, context! {});
        self.notifier
            .notify(user_id, &text, Some(menus::style_picker()))
            .await;
    }

    async fn change_style(
        &self,
        user_id: UserId,
        requested_mode: &str,
    ) -> Result<StyleMode, CoreError> {
        match self.entitlements.select_style(user_id, requested_mode).await {
            Ok(mode) => {
                let text = self.notices.text(
                    Notice::StyleChanged,
                    context! { style => mode.label() },
                );
                self.notifier
                    .notify(user_id, &text, Some(menus::main_menu()))
                    .await;
                Ok(mode)
            }
            Err(CoreError::UnknownStyle(requested)) => {
                info!("{}: {user_id} asked for `{requested}`", ErrorCode::UnknownStyle);
                let available: Vec<&str> = StyleMode::ALL.iter().map(|m| m.label()).collect();
                let text = self.notices.text(
                    Notice::UnknownStyle,
                    context! { requested => &requested, available => available },
                );
                self.notifier
                    .notify(user_id, &text, Some(menus::style_picker()))
                    .await;
                Err(CoreError::UnknownStyle(requested))
            }
            Err(e) => Err(e),
        }
    }

    async fn reset_history(&self, user_id: UserId) -> Result<(), CoreError> {
        self.store.clear_history(user_id).await?;
        let text = self.notices.text(Notice::HistoryCleared, context! {});
        self.notifier.notify(user_id, &text, None).await;
        Ok(())
    }

    async fn reset_trial(&self, requested_by: UserId, target: UserId) -> Result<bool, CoreError> {
        if !self.settings.is_admin(requested_by) {
            warn!("{requested_by} tried to reset the trial of {target}");
            let text = self.notices.text(Notice::AdminOnly, context! {});
            self.notifier.notify(requested_by, &text, None).await;
            return Err(CoreError::NotAdmin(requested_by));
        }

        let existed = {
            let _guard = self.locks.lock(target).await;
            self.entitlements.reset_trial(target).await?
        };

        let notice = if existed {
            Notice::TrialReset
        } else {
            Notice::TrialResetMissing
        };
        let text = self.notices.text(notice, context! { target => target.0 });
        self.notifier.notify(requested_by, &text, None).await;

        Ok(existed)
    }
}
