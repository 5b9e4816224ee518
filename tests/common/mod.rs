//! Shared fixtures: an in-memory database and in-test collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::Ref;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_llm_telegram_gate::core::assistant::ChatMessage;
use tokio_llm_telegram_gate::core::entitlement::EntitlementEngine;
use tokio_llm_telegram_gate::core::locks::UserLocks;
use tokio_llm_telegram_gate::core::notices::Notices;
use tokio_llm_telegram_gate::core::payments::PaymentActivationHandler;
use tokio_llm_telegram_gate::core::services::ConversationOrchestrator;
use tokio_llm_telegram_gate::infrastructure::database::DatabaseConnection;
use tokio_llm_telegram_gate::infrastructure::entities::{
    Activation, ActivationOutcome, HistoryEntry, MessageKind, Subscription, TrialState, UserId,
};
use tokio_llm_telegram_gate::infrastructure::repositories::DbRecordStore;
use tokio_llm_telegram_gate::infrastructure::settings::Settings;
use tokio_llm_telegram_gate::infrastructure::traits::{
    Amount, CompletionError, CompletionService, Keyboard, Notifier, PaymentError, PaymentGateway,
    RecordStore, StoreError,
};

/// Single-connection in-memory database with migrations applied.
///
/// One connection keeps the database alive for the whole test.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub user_id: UserId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.user_id == user_id)
            .collect()
    }

    pub fn count_containing(&self, fragment: &str) -> usize {
        self.sent()
            .iter()
            .filter(|sent| sent.text.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, text: &str, keyboard: Option<Keyboard>) {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            text: text.to_owned(),
            keyboard,
        });
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    /// Answers with a fixed reply.
    Reply(String),
    Fail,
    /// Answers only after the delay.
    Slow(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_prompt: String,
    pub model: String,
}

pub struct ScriptedCompletion {
    script: Mutex<Script>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedCompletion {
    pub fn new(script: Script) -> ScriptedCompletion {
        ScriptedCompletion {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(CompletionCall {
            system_prompt: system_prompt.to_owned(),
            history: history.to_vec(),
            user_prompt: user_prompt.to_owned(),
            model: model.to_owned(),
        });

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Reply(reply) => Ok(reply),
            Script::Fail => Err(CompletionError::Provider {
                status: 500,
                body: "upstream exploded".to_owned(),
            }),
            Script::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok("too late".to_owned())
            }
        }
    }
}

#[derive(Default)]
pub struct FakeGateway {
    failing: Mutex<bool>,
    unreachable: Mutex<bool>,
    created: Mutex<Vec<(Amount, String, BTreeMap<String, String>)>>,
    /// Provider-side status per payment id. Unlisted payments succeeded.
    statuses: Mutex<BTreeMap<String, String>>,
}

impl FakeGateway {
    pub fn failing() -> FakeGateway {
        FakeGateway {
            failing: Mutex::new(true),
            ..FakeGateway::default()
        }
    }

    pub fn created(&self) -> Vec<(Amount, String, BTreeMap<String, String>)> {
        self.created.lock().unwrap().clone()
    }

    pub fn set_status(&self, payment_id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(payment_id.to_owned(), status.to_owned());
    }

    /// Status lookups fail as if the provider were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(
        &self,
        amount: &Amount,
        description: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, PaymentError> {
        if *self.failing.lock().unwrap() {
            return Err(PaymentError::NotConfigured);
        }

        let mut created = self.created.lock().unwrap();
        created.push((amount.clone(), description.to_owned(), metadata.clone()));
        Ok(format!("https://yoomoney.ru/checkout/payments/{}", created.len()))
    }

    async fn payment_status(&self, payment_id: &str) -> Result<String, PaymentError> {
        if *self.unreachable.lock().unwrap() {
            return Err(PaymentError::Provider {
                status: 503,
                body: "service unavailable".to_owned(),
            });
        }

        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .unwrap_or_else(|| "succeeded".to_owned()))
    }
}

/// Delegates to a real store but fails every entitlement read.
pub struct UnreadableStore {
    inner: Ref<dyn RecordStore>,
}

impl UnreadableStore {
    pub fn new(inner: Ref<dyn RecordStore>) -> UnreadableStore {
        UnreadableStore { inner }
    }
}

#[async_trait]
impl RecordStore for UnreadableStore {
    async fn trial(&self, _user_id: UserId) -> Result<Option<TrialState>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn start_trial(&self, user_id: UserId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.start_trial(user_id, now).await
    }

    async fn add_consumption(
        &self,
        user_id: UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.inner.add_consumption(user_id, amount, now).await
    }

    async fn reset_trial(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.inner.reset_trial(user_id).await
    }

    async fn subscription(&self, _user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn mark_warned(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.inner.mark_warned(user_id).await
    }

    async fn apply_activation(
        &self,
        activation: &Activation,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome, StoreError> {
        self.inner.apply_activation(activation, now).await
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StoreError> {
        self.inner.history(user_id).await
    }

    async fn append_history(
        &self,
        user_id: UserId,
        messages: &[(MessageKind, String)],
        keep: usize,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.append_history(user_id, messages, keep, now).await
    }

    async fn clear_history(&self, user_id: UserId) -> Result<(), StoreError> {
        self.inner.clear_history(user_id).await
    }

    async fn style(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        self.inner.style(user_id).await
    }

    async fn set_style(&self, user_id: UserId, mode: &str) -> Result<(), StoreError> {
        self.inner.set_style(user_id, mode).await
    }
}

/// Settings for fast tests: tiny trial budget and a short completion timeout.
pub fn test_settings() -> Settings {
    Settings {
        trial_token_limit: 100,
        completion_timeout: Duration::from_millis(200),
        admin_id: Some(UserId(1)),
        ..Settings::default()
    }
}

/// The full core wired against an in-memory database and in-test collaborators.
pub struct Harness {
    pub pool: SqlitePool,
    pub store: Ref<dyn RecordStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub completion: Arc<ScriptedCompletion>,
    pub gateway: Arc<FakeGateway>,
    pub settings: Ref<Settings>,
    pub entitlements: Arc<EntitlementEngine>,
    pub payments: PaymentActivationHandler,
    pub conversations: ConversationOrchestrator,
}

impl Harness {
    pub async fn new(settings: Settings) -> Harness {
        Harness::with_gateway(settings, FakeGateway::default()).await
    }

    pub async fn with_gateway(settings: Settings, gateway: FakeGateway) -> Harness {
        let pool = memory_pool().await;
        let store: Ref<dyn RecordStore> = Arc::new(DbRecordStore::new(Arc::new(
            DatabaseConnection::from_pool(pool.clone()),
        )));
        Harness::assemble(pool, store, settings, gateway)
    }

    pub fn assemble(
        pool: SqlitePool,
        store: Ref<dyn RecordStore>,
        settings: Settings,
        gateway: FakeGateway,
    ) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let completion = Arc::new(ScriptedCompletion::new(Script::Reply(
            "Sure, here you go.".to_owned(),
        )));
        let gateway = Arc::new(gateway);
        let settings = Arc::new(settings);
        let notices = Arc::new(Notices::new());

        let entitlements = Arc::new(EntitlementEngine::new(
            store.clone(),
            notifier.clone(),
            notices.clone(),
            settings.clone(),
        ));
        let payments = PaymentActivationHandler::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            notices.clone(),
        );
        let conversations = ConversationOrchestrator::new(
            entitlements.clone(),
            completion.clone(),
            gateway.clone(),
            store.clone(),
            notifier.clone(),
            notices,
            Arc::new(UserLocks::new()),
            settings.clone(),
        );

        Harness {
            pool,
            store,
            notifier,
            completion,
            gateway,
            settings,
            entitlements,
            payments,
            conversations,
        }
    }

    pub async fn tokens_consumed(&self, user_id: UserId) -> Option<i64> {
        self.store
            .trial(user_id)
            .await
            .unwrap()
            .map(|trial| trial.tokens_consumed)
    }
}
