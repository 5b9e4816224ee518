use crate::infrastructure::entities::UserId;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::str::FromStr;

pub mod admin;
pub mod webhooks;

const X_USER_ID: &str = "X-User-ID";

/// Telegram id of the caller, taken from the `X-User-ID` header.
#[derive(Debug)]
pub struct ExtractUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(user_id) = parts.headers.get(X_USER_ID) {
            let user_id = user_id
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            let user_id = UserId::from_str(user_id)
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            Ok(ExtractUser(user_id))
        } else {
            Err((StatusCode::BAD_REQUEST, "`X-User-ID` header is missing"))
        }
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/yookassa", webhooks::router())
        .nest("/admin", admin::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
