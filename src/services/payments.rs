use crate::errors::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc, time::Duration};
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// A processor-side payment intent. `amount` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentGatewayError {
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
    #[error("Payment intent {0} not found")]
    NotFound(String),
    #[error("Payment provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected payment provider response: {0}")]
    UnexpectedResponse(String),
}

impl From<PaymentGatewayError> for ServiceError {
    fn from(err: PaymentGatewayError) -> Self {
        match err {
            PaymentGatewayError::InvalidRequest(msg) => ServiceError::InvalidRequest(msg),
            other => ServiceError::PaymentGateway(other.to_string()),
        }
    }
}

/// Converts a decimal amount to minor units (cents), half away from zero.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Payment processor seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an intent for `amount` (major units) on behalf of `user_id`.
    async fn create_intent(
        &self,
        amount: Decimal,
        user_id: Uuid,
    ) -> Result<PaymentIntent, PaymentGatewayError>;

    async fn retrieve_intent(&self, reference: &str)
        -> Result<PaymentIntent, PaymentGatewayError>;

    fn name(&self) -> &'static str;
}

fn positive_minor_units(amount: Decimal) -> Result<i64, PaymentGatewayError> {
    match to_minor_units(amount) {
        Some(minor) if minor > 0 => Ok(minor),
        _ => Err(PaymentGatewayError::InvalidRequest(
            "Payment amount must be positive".to_string(),
        )),
    }
}

/// Checks that `reference` is a succeeded charge for exactly `expected_total`.
#[instrument(skip(gateway))]
pub async fn verify_payment(
    gateway: &dyn PaymentGateway,
    reference: &str,
    expected_total: Decimal,
) -> Result<PaymentIntent, ServiceError> {
    let intent = match gateway.retrieve_intent(reference).await {
        Ok(intent) => intent,
        Err(PaymentGatewayError::NotFound(_)) => {
            return Err(ServiceError::PaymentNotConfirmed(
                "Unknown payment reference".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    if intent.status != PaymentIntentStatus::Succeeded {
        warn!(reference, status = %intent.status, "Payment not settled");
        return Err(ServiceError::PaymentNotConfirmed(format!(
            "Payment status is {}",
            intent.status
        )));
    }
    if to_minor_units(expected_total) != Some(intent.amount) {
        warn!(reference, charged = intent.amount, %expected_total, "Payment amount mismatch");
        return Err(ServiceError::PaymentNotConfirmed(
            "Payment amount does not match order total".to_string(),
        ));
    }
    Ok(intent)
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl TryFrom<StripeIntent> for PaymentIntent {
    type Error = PaymentGatewayError;

    fn try_from(raw: StripeIntent) -> Result<Self, Self::Error> {
        let status = PaymentIntentStatus::from_str(&raw.status).map_err(|_| {
            PaymentGatewayError::UnexpectedResponse(format!("unknown status {}", raw.status))
        })?;
        Ok(Self {
            id: raw.id,
            client_secret: raw.client_secret.unwrap_or_default(),
            amount: raw.amount,
            currency: raw.currency,
            status,
        })
    }
}

/// Stripe PaymentIntents over the REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        currency: impl Into<String>,
    ) -> Result<Self, PaymentGatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            secret_key: secret_key.into(),
            currency: currency.into(),
        })
    }

    async fn parse(response: reqwest::Response) -> Result<PaymentIntent, PaymentGatewayError> {
        let status = response.status();
        if status.is_success() {
            let raw: StripeIntent = response.json().await?;
            return raw.try_into();
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| "request failed".to_string());
        Err(PaymentGatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount: Decimal,
        user_id: Uuid,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let minor = positive_minor_units(amount)?;
        let params = [
            ("amount", minor.to_string()),
            ("currency", self.currency.clone()),
            ("metadata[user_id]", user_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await?;
        let intent = Self::parse(response).await?;
        info!(intent_id = %intent.id, amount = minor, "Created Stripe payment intent");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(
        &self,
        reference: &str,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", STRIPE_API_BASE, reference))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentGatewayError::NotFound(reference.to_string()));
        }
        Self::parse(response).await
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

/// In-process gateway for development and tests. Intents live in memory; with
/// `auto_confirm` they are created already succeeded.
#[derive(Clone, Default)]
pub struct SimulatedGateway {
    intents: Arc<DashMap<String, PaymentIntent>>,
    currency: String,
    auto_confirm: bool,
}

impl SimulatedGateway {
    pub fn new(currency: impl Into<String>, auto_confirm: bool) -> Self {
        Self {
            intents: Arc::new(DashMap::new()),
            currency: currency.into(),
            auto_confirm,
        }
    }

    /// Marks an intent as paid, as the card flow would.
    pub fn confirm(&self, reference: &str) -> Result<PaymentIntent, PaymentGatewayError> {
        let mut intent = self
            .intents
            .get_mut(reference)
            .ok_or_else(|| PaymentGatewayError::NotFound(reference.to_string()))?;
        intent.status = PaymentIntentStatus::Succeeded;
        Ok(intent.clone())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        amount: Decimal,
        user_id: Uuid,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let minor = positive_minor_units(amount)?;
        let id = format!("pi_sim_{}", Uuid::new_v4().simple());
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        let status = if self.auto_confirm {
            PaymentIntentStatus::Succeeded
        } else {
            PaymentIntentStatus::RequiresPaymentMethod
        };

        let intent = PaymentIntent {
            client_secret: format!("{}_secret_{}", id, secret),
            id: id.clone(),
            amount: minor,
            currency: self.currency.clone(),
            status,
        };
        self.intents.insert(id, intent.clone());
        info!(intent_id = %intent.id, %user_id, amount = minor, "Created simulated payment intent");
        Ok(intent)
    }

    async fn retrieve_intent(
        &self,
        reference: &str,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        self.intents
            .get(reference)
            .map(|intent| intent.clone())
            .ok_or_else(|| PaymentGatewayError::NotFound(reference.to_string()))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
