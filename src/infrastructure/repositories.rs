//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{
    Activation, ActivationOutcome, HistoryEntry, MessageKind, Subscription, TrialState, UserId,
};
use crate::infrastructure::traits::{RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::{debug, error};

#[injectable(RecordStore)]
pub struct DbRecordStore {
    connection: Ref<DatabaseConnection>,
}

impl DbRecordStore {
    pub fn new(connection: Ref<DatabaseConnection>) -> DbRecordStore {
        DbRecordStore { connection }
    }
}

fn logged(e: sqlx::Error) -> StoreError {
    error!("{e}");
    StoreError::Database(e)
}

#[async_trait]
impl RecordStore for DbRecordStore {
    async fn trial(&self, user_id: UserId) -> Result<Option<TrialState>, StoreError> {
        sqlx::query_as("SELECT user_id, trial_started_at, tokens_consumed FROM trials WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&**self.connection)
            .await
            .map_err(logged)
    }

    async fn start_trial(&self, user_id: UserId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO trials (user_id, trial_started_at, tokens_consumed) VALUES (?, ?, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .execute(&**self.connection)
        .await
        .map_err(logged)?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_consumption(
        &self,
        user_id: UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let amount = amount.max(0);
        let (total,): (i64,) = sqlx::query_as(
            "INSERT INTO trials (user_id, trial_started_at, tokens_consumed) VALUES (?, ?, ?) ON CONFLICT (user_id) DO UPDATE SET tokens_consumed = tokens_consumed + excluded.tokens_consumed RETURNING tokens_consumed",
        )
        .bind(user_id)
        .bind(now)
        .bind(amount)
        .fetch_one(&**self.connection)
        .await
        .map_err(logged)?;

        Ok(total)
    }

    async fn reset_trial(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM trials WHERE user_id = ?")
            .bind(user_id)
            .execute(&**self.connection)
            .await
            .map_err(logged)?;

        Ok(result.rows_affected() > 0)
    }

    async fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        sqlx::query_as(
            "SELECT user_id, tier, model, token_limit, expires_at, warned FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&**self.connection)
        .await
        .map_err(logged)
    }

    async fn mark_warned(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE subscriptions SET warned = 1 WHERE user_id = ? AND warned = 0")
                .bind(user_id)
                .execute(&**self.connection)
                .await
                .map_err(logged)?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_activation(
        &self,
        activation: &Activation,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome, StoreError> {
        let mut tx = self.connection.begin().await.map_err(logged)?;

        let claimed = sqlx::query(
            "INSERT INTO processed_payments (payment_id, user_id, processed_at) VALUES (?, ?, ?) ON CONFLICT (payment_id) DO NOTHING",
        )
        .bind(&activation.payment_id)
        .bind(activation.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(logged)?;

        if claimed.rows_affected() == 0 {
            debug!("payment {} already processed", activation.payment_id);
            tx.rollback().await.map_err(logged)?;
            return Ok(ActivationOutcome::Replayed);
        }

        let previous: Option<Subscription> = sqlx::query_as(
            "SELECT user_id, tier, model, token_limit, expires_at, warned FROM subscriptions WHERE user_id = ?",
        )
        .bind(activation.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(logged)?;

        let Some(renewed) = Subscription::renewed(previous.as_ref(), activation, now) else {
            tx.rollback().await.map_err(logged)?;
            return Ok(ActivationOutcome::OutOfRange);
        };

        sqlx::query(
            "INSERT INTO subscriptions (user_id, tier, model, token_limit, expires_at, warned) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET tier = excluded.tier, model = excluded.model, token_limit = excluded.token_limit, expires_at = excluded.expires_at, warned = excluded.warned",
        )
        .bind(renewed.user_id)
        .bind(renewed.tier)
        .bind(&renewed.model)
        .bind(renewed.token_limit)
        .bind(renewed.expires_at)
        .bind(renewed.warned)
        .execute(&mut *tx)
        .await
        .map_err(logged)?;

        tx.commit().await.map_err(logged)?;

        Ok(ActivationOutcome::Applied(renewed))
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StoreError> {
        sqlx::query_as(
            "SELECT seq, user_id, kind, created_at, text FROM history WHERE user_id = ? ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&**self.connection)
        .await
        .map_err(logged)
    }

    async fn append_history(
        &self,
        user_id: UserId,
        messages: &[(MessageKind, String)],
        keep: usize,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.connection.begin().await.map_err(logged)?;

        for (kind, text) in messages {
            sqlx::query("INSERT INTO history (user_id, kind, created_at, text) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(*kind)
                .bind(now)
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(logged)?;
        }

        sqlx::query(
            "DELETE FROM history WHERE user_id = ? AND seq NOT IN (SELECT seq FROM history WHERE user_id = ? ORDER BY seq DESC LIMIT ?)",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(keep as i64)
        .execute(&mut *tx)
        .await
        .map_err(logged)?;

        tx.commit().await.map_err(logged)
    }

    async fn clear_history(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM history WHERE user_id = ?")
            .bind(user_id)
            .execute(&**self.connection)
            .await
            .map(|_| ())
            .map_err(logged)
    }

    async fn style(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT mode FROM styles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&**self.connection)
            .await
            .map_err(logged)
    }

    async fn set_style(&self, user_id: UserId, mode: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO styles (user_id, mode) VALUES (?, ?) ON CONFLICT (user_id) DO UPDATE SET mode = excluded.mode",
        )
        .bind(user_id)
        .bind(mode)
        .execute(&**self.connection)
        .await
        .map(|_| ())
        .map_err(logged)
    }
}
