//! YooKassa checkout creation.

use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{Amount, PaymentError, PaymentGateway};
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

const PAYMENTS_URL: &str = "https://api.yookassa.ru/v3/payments";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Serialize)]
struct CreatePayment<'a> {
    amount: WireAmount,
    confirmation: Confirmation<'a>,
    capture: bool,
    description: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct WireAmount {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct Confirmation<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    status: String,
    confirmation: Option<ConfirmationResponse>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationResponse {
    confirmation_url: Option<String>,
}

pub struct YooKassaGateway {
    client: Client,
    credentials: Option<(String, String)>,
    return_url: String,
}

#[injectable(PaymentGateway)]
impl YooKassaGateway {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> YooKassaGateway {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("falling back to default http client: {e}");
                Client::new()
            });

        let credentials = settings
            .yookassa_shop_id
            .clone()
            .zip(settings.yookassa_secret_key.clone());

        YooKassaGateway {
            client,
            credentials,
            return_url: settings.payment_return_url.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for YooKassaGateway {
    async fn create_payment(
        &self,
        amount: &Amount,
        description: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, PaymentError> {
        let (shop_id, secret_key) = self
            .credentials
            .as_ref()
            .ok_or(PaymentError::NotConfigured)?;

        let body = CreatePayment {
            amount: WireAmount {
                value: format!("{}.00", amount.value),
                currency: amount.currency.clone(),
            },
            confirmation: Confirmation {
                kind: "redirect",
                return_url: &self.return_url,
            },
            capture: true,
            description,
            metadata,
        };

        let response = self
            .client
            .post(PAYMENTS_URL)
            .basic_auth(shop_id, Some(secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let payment: PaymentResponse = response.json().await?;
        let url = payment
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or(PaymentError::MissingConfirmation)?;

        info!("created payment {} for \"{description}\"", payment.id);
        Ok(url)
    }

    async fn payment_status(&self, payment_id: &str) -> Result<String, PaymentError> {
        let (shop_id, secret_key) = self
            .credentials
            .as_ref()
            .ok_or(PaymentError::NotConfigured)?;

        // Ids are UUID-like; anything else must not reach the url path.
        if payment_id.is_empty()
            || !payment_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PaymentError::InvalidPaymentId(payment_id.to_owned()));
        }

        let response = self
            .client
            .get(format!("{PAYMENTS_URL}/{payment_id}"))
            .basic_auth(shop_id, Some(secret_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let payment: PaymentResponse = response.json().await?;
        debug!("payment {} is {}", payment.id, payment.status);
        Ok(payment.status)
    }
}
