//! Operator endpoints, restricted to the configured admin.
//!
//! Every call needs `Authorization: Bearer <ADMIN_TOKEN>` and an `X-User-ID`
//! naming `ADMIN_ID`. Without a configured token the endpoints always refuse.

use crate::api::ExtractUser;
use crate::api::admin::schemas::{ErrorBody, TrialReset};
use crate::core::entitlement::EntitlementSnapshot;
use crate::core::errors::CoreError;
use crate::core::traits::{ConversationService, EntitlementService};
use crate::infrastructure::entities::UserId;
use crate::infrastructure::settings::Settings;
use axum::extract::Path;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use log::{error, warn};

pub fn router() -> Router {
    Router::new()
        .route("/users/:id/entitlement", get(entitlement))
        .route("/trials/:id/reset", post(reset_trial))
}

type ApiError = (StatusCode, Json<ErrorBody>);

async fn entitlement(
    Inject(entitlements): Inject<dyn EntitlementService>,
    Inject(settings): Inject<Settings>,
    ExtractUser(caller): ExtractUser,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<Json<EntitlementSnapshot>, ApiError> {
    authorize(&settings, &headers, caller)?;

    entitlements
        .snapshot(UserId(user_id))
        .await
        .map(Json)
        .map_err(internal)
}

async fn reset_trial(
    Inject(conversations): Inject<dyn ConversationService>,
    Inject(settings): Inject<Settings>,
    ExtractUser(caller): ExtractUser,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<Json<TrialReset>, ApiError> {
    authorize(&settings, &headers, caller)?;

    match conversations.reset_trial(caller, UserId(user_id)).await {
        Ok(existed) => Ok(Json(TrialReset {
            user_id: UserId(user_id),
            existed,
        })),
        Err(CoreError::NotAdmin(_)) => Err(forbidden()),
        Err(e) => Err(internal(e)),
    }
}

fn authorize(settings: &Settings, headers: &HeaderMap, caller: UserId) -> Result<(), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if settings.admin_token_matches(token) && settings.is_admin(caller) => Ok(()),
        _ => {
            warn!("refused admin call from {caller}");
            Err(forbidden())
        }
    }
}

fn forbidden() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            error: "admin only".to_owned(),
        }),
    )
}

fn internal(e: CoreError) -> ApiError {
    error!("admin request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.code().map(|c| c.to_string()).unwrap_or_else(|| e.to_string()),
        }),
    )
}

pub mod schemas {
    use crate::infrastructure::entities::UserId;
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct ErrorBody {
        pub error: String,
    }

    #[derive(Serialize, Debug)]
    pub struct TrialReset {
        pub user_id: UserId,
        pub existed: bool,
    }
}
