//! Payment activation tests
//!
//! Webhook events applied to subscriptions: renewal, replay and fallbacks.

mod common;

use chrono::{Duration, Utc};
use common::Harness;
use tokio_llm_telegram_gate::core::errors::CoreError;
use tokio_llm_telegram_gate::core::payments::{ActivationReport, PaymentEvent};
use tokio_llm_telegram_gate::core::traits::{EntitlementService, PaymentActivationService};
use tokio_llm_telegram_gate::infrastructure::entities::{PlanTier, UserId};
use tokio_llm_telegram_gate::infrastructure::settings::Settings;
use tokio_llm_telegram_gate::infrastructure::traits::RecordStore;

const USER: UserId = UserId(1034982624);

fn succeeded(payment_id: &str, description: &str) -> PaymentEvent {
    PaymentEvent {
        event_type: "payment.succeeded".to_owned(),
        payment_id: Some(payment_id.to_owned()),
        description: description.to_owned(),
        user_id: Some(USER),
        ..PaymentEvent::default()
    }
}

async fn count(h: &Harness, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&h.pool)
        .await
        .unwrap();
    count
}

#[tokio::test]
async fn test_activation_writes_plan_and_notifies() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();

    let report = h
        .payments
        .activate(&succeeded("pay-1", "GPT-4o Pro"), now)
        .await
        .unwrap();

    let ActivationReport::Activated {
        subscription,
        fallback,
    } = report
    else {
        panic!("expected an activation, got {report:?}");
    };
    assert!(!fallback);
    assert_eq!(subscription.tier, PlanTier::Gpt4oPro);
    assert_eq!(subscription.model, "gpt-4o");
    assert_eq!(subscription.token_limit, 60_000);
    assert_eq!(subscription.expires_at, now + Duration::days(30));
    assert!(!subscription.warned);

    assert_eq!(h.store.subscription(USER).await.unwrap(), Some(subscription));
    assert_eq!(h.notifier.sent_to(USER).len(), 1);
    assert!(h.notifier.sent_to(USER)[0].text.contains("GPT-4o Pro"));
}

#[tokio::test]
async fn test_renewal_extends_running_period() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let ten_days = PaymentEvent {
        days_override: Some(10),
        ..succeeded("pay-1", "GPT-3.5 Lite")
    };
    h.payments.activate(&ten_days, now).await.unwrap();

    h.payments
        .activate(&succeeded("pay-2", "GPT-4o Max"), now)
        .await
        .unwrap();

    let subscription = h.store.subscription(USER).await.unwrap().unwrap();
    assert_eq!(subscription.expires_at, now + Duration::days(40));
    assert_eq!(subscription.tier, PlanTier::Gpt4oMax);
}

#[tokio::test]
async fn test_renewal_after_lapse_starts_now() {
    let h = Harness::new(Settings::default()).await;
    let start = Utc::now();
    h.payments
        .activate(&succeeded("pay-1", "GPT-3.5 Lite"), start)
        .await
        .unwrap();

    let later = start + Duration::days(45);
    h.payments
        .activate(&succeeded("pay-2", "GPT-3.5 Lite"), later)
        .await
        .unwrap();

    let subscription = h.store.subscription(USER).await.unwrap().unwrap();
    assert_eq!(subscription.expires_at, later + Duration::days(30));
}

#[tokio::test]
async fn test_duplicate_delivery_extends_once() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let event = succeeded("pay-1", "GPT-4o Lite");

    let first = h.payments.activate(&event, now).await.unwrap();
    let second = h
        .payments
        .activate(&event, now + Duration::minutes(1))
        .await
        .unwrap();

    assert!(matches!(first, ActivationReport::Activated { .. }));
    assert_eq!(second, ActivationReport::Replayed);
    assert_eq!(
        h.store.subscription(USER).await.unwrap().unwrap().expires_at,
        now + Duration::days(30)
    );
    assert_eq!(h.notifier.sent_to(USER).len(), 1);
    assert_eq!(count(&h, "processed_payments").await, 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_extend_once() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let event = succeeded("pay-1", "GPT-4o Lite");

    let (a, b) = tokio::join!(
        h.payments.activate(&event, now),
        h.payments.activate(&event, now)
    );

    let reports = [a.unwrap(), b.unwrap()];
    let applied = reports
        .iter()
        .filter(|r| matches!(r, ActivationReport::Activated { .. }))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(
        h.store.subscription(USER).await.unwrap().unwrap().expires_at,
        now + Duration::days(30)
    );
}

#[tokio::test]
async fn test_unknown_plan_falls_back() {
    let h = Harness::new(Settings::default()).await;

    let report = h
        .payments
        .activate(&succeeded("pay-1", "Mystery Plan"), Utc::now())
        .await
        .unwrap();

    let ActivationReport::Activated {
        subscription,
        fallback,
    } = report
    else {
        panic!("expected an activation, got {report:?}");
    };
    assert!(fallback);
    assert_eq!(subscription.tier, PlanTier::Fallback);
    assert_eq!(subscription.token_limit, 30_000);
    assert_eq!(subscription.model, "gpt-3.5-turbo");
}

#[tokio::test]
async fn test_plan_code_from_metadata() {
    let h = Harness::new(Settings::default()).await;
    let event = PaymentEvent {
        plan_code: Some("business_pro".to_owned()),
        days_override: Some(90),
        ..succeeded("pay-1", "Business subscription")
    };
    let now = Utc::now();

    h.payments.activate(&event, now).await.unwrap();

    let subscription = h.store.subscription(USER).await.unwrap().unwrap();
    assert_eq!(subscription.tier, PlanTier::BusinessPro);
    assert_eq!(subscription.token_limit, 2_000_000);
    assert_eq!(subscription.expires_at, now + Duration::days(90));
}

#[tokio::test]
async fn test_missing_user_is_a_no_op() {
    let h = Harness::new(Settings::default()).await;
    let event = PaymentEvent {
        user_id: None,
        ..succeeded("pay-1", "GPT-4o Pro")
    };

    let report = h.payments.activate(&event, Utc::now()).await.unwrap();

    assert_eq!(report, ActivationReport::Unresolved);
    assert_eq!(count(&h, "subscriptions").await, 0);
    assert_eq!(count(&h, "processed_payments").await, 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_missing_payment_id_is_a_no_op() {
    let h = Harness::new(Settings::default()).await;
    let event = PaymentEvent {
        payment_id: None,
        ..succeeded("", "GPT-4o Pro")
    };

    let report = h.payments.activate(&event, Utc::now()).await.unwrap();

    assert_eq!(report, ActivationReport::Untracked);
    assert_eq!(count(&h, "subscriptions").await, 0);
}

#[tokio::test]
async fn test_pending_events_are_ignored() {
    let h = Harness::new(Settings::default()).await;
    let event = PaymentEvent {
        event_type: "payment.waiting_for_capture".to_owned(),
        ..succeeded("pay-1", "GPT-4o Pro")
    };

    let report = h.payments.activate(&event, Utc::now()).await.unwrap();

    assert_eq!(report, ActivationReport::Ignored);
    assert_eq!(count(&h, "subscriptions").await, 0);
    assert!(h.notifier.sent().is_empty());

    // The same payment id still activates once it succeeds.
    let report = h
        .payments
        .activate(&succeeded("pay-1", "GPT-4o Pro"), Utc::now())
        .await
        .unwrap();
    assert!(matches!(report, ActivationReport::Activated { .. }));
}

#[tokio::test]
async fn test_renewal_rearms_expiry_warning() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let one_day = PaymentEvent {
        days_override: Some(1),
        ..succeeded("pay-1", "GPT-4o Lite")
    };
    h.payments.activate(&one_day, now).await.unwrap();
    assert!(h.entitlements.evaluate(USER, now).await.expiry_warning);
    assert!(h.store.subscription(USER).await.unwrap().unwrap().warned);

    h.payments
        .activate(&succeeded("pay-2", "GPT-4o Lite"), now)
        .await
        .unwrap();

    assert!(!h.store.subscription(USER).await.unwrap().unwrap().warned);
}

#[tokio::test]
async fn test_paid_user_leaves_expired_trial() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    h.store
        .start_trial(USER, now - Duration::days(3))
        .await
        .unwrap();
    assert!(!h.entitlements.evaluate(USER, now).await.allow);

    h.payments
        .activate(&succeeded("pay-1", "GPT-4o Pro"), now)
        .await
        .unwrap();

    let decision = h.entitlements.evaluate(USER, now).await;
    assert!(decision.allow);
    assert_eq!(decision.model.model, "gpt-4o");
}

#[tokio::test]
async fn test_oversized_days_override_keeps_plan_duration() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let event = PaymentEvent {
        days_override: Some(1_000_000_000),
        ..succeeded("pay-1", "GPT-4o Pro")
    };

    let report = h.payments.activate(&event, now).await.unwrap();

    assert!(matches!(report, ActivationReport::Activated { .. }));
    assert_eq!(
        h.store.subscription(USER).await.unwrap().unwrap().expires_at,
        now + Duration::days(30)
    );
}

#[tokio::test]
async fn test_negative_days_override_keeps_plan_duration() {
    let h = Harness::new(Settings::default()).await;
    let now = Utc::now();
    let event = PaymentEvent {
        days_override: Some(i64::MIN),
        ..succeeded("pay-1", "GPT-4o Pro")
    };

    h.payments.activate(&event, now).await.unwrap();

    assert_eq!(
        h.store.subscription(USER).await.unwrap().unwrap().expires_at,
        now + Duration::days(30)
    );
}

#[tokio::test]
async fn test_payment_not_succeeded_at_provider_is_not_activated() {
    let h = Harness::new(Settings::default()).await;
    h.gateway.set_status("pay-1", "canceled");

    let report = h
        .payments
        .activate(&succeeded("pay-1", "GPT-4o Max"), Utc::now())
        .await
        .unwrap();

    assert_eq!(report, ActivationReport::Unconfirmed);
    assert_eq!(count(&h, "subscriptions").await, 0);
    assert_eq!(count(&h, "processed_payments").await, 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unreachable_provider_asks_for_redelivery() {
    let h = Harness::new(Settings::default()).await;
    h.gateway.set_unreachable(true);
    let event = succeeded("pay-1", "GPT-4o Max");

    let result = h.payments.activate(&event, Utc::now()).await;

    assert!(matches!(result, Err(CoreError::Payment(_))));
    assert_eq!(count(&h, "subscriptions").await, 0);

    h.gateway.set_unreachable(false);
    let report = h.payments.activate(&event, Utc::now()).await.unwrap();
    assert!(matches!(report, ActivationReport::Activated { .. }));
}
