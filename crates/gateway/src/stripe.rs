//! Stripe hosted-checkout gateway: session creation over the form-encoded
//! REST API and webhook signature verification.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use imeicheck_domain::config::StripeConfig;
use imeicheck_domain::model::{Imei, OrderParty};

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Accepted clock skew between the signature timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe request failed: {0}")]
    Transport(String),
    #[error("stripe returned status {status}: {body}")]
    BadStatus { status: u16, body: String },
    #[error("stripe response was not valid json: {0}")]
    Decode(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
}

/// A created hosted-checkout session: the provider id (later the
/// idempotency key) and the URL the client is redirected to.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_topup_session(
        &self,
        user_id: i64,
        amount_cents: i64,
        currency: &str,
    ) -> Result<CheckoutSession, StripeError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_imei_session(
        &self,
        imei: &Imei,
        service_id: i64,
        service_name: &str,
        amount_cents: i64,
        currency: &str,
        actor: &OrderParty,
    ) -> Result<CheckoutSession, StripeError>;
}

pub struct StripeClient {
    config: StripeConfig,
    frontend_url: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig, frontend_url: String) -> Self {
        Self {
            config,
            frontend_url,
            client: reqwest::Client::new(),
        }
    }

    /// Checks the `Stripe-Signature` header against the raw request body.
    pub fn verify_signature(&self, raw_body: &[u8], header: &str) -> Result<(), SignatureError> {
        verify_signature_at(
            self.config.webhook_secret().as_bytes(),
            raw_body,
            header,
            Utc::now().timestamp(),
        )
    }

    async fn create_session(
        &self,
        form: Vec<(String, String)>,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(self.config.secret_key())
            .form(&form)
            .send()
            .await
            .map_err(|err| StripeError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|err| StripeError::Decode(err.to_string()))
    }

    fn base_form(
        &self,
        product_name: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Vec<(String, String)> {
        vec![
            ("mode".into(), "payment".into()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "line_items[0][price_data][currency]".into(),
                currency.to_owned(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                product_name.to_owned(),
            ),
            (
                "success_url".into(),
                format!(
                    "{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.frontend_url
                ),
            ),
            (
                "cancel_url".into(),
                format!("{}/payment-cancelled", self.frontend_url),
            ),
        ]
    }
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    async fn create_topup_session(
        &self,
        user_id: i64,
        amount_cents: i64,
        currency: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form = self.base_form("Balance top-up", amount_cents, currency);
        form.push(("metadata[user_id]".into(), user_id.to_string()));
        form.push((
            "metadata[recharge_amount]".into(),
            amount_cents.to_string(),
        ));
        self.create_session(form).await
    }

    async fn create_imei_session(
        &self,
        imei: &Imei,
        service_id: i64,
        service_name: &str,
        amount_cents: i64,
        currency: &str,
        actor: &OrderParty,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form = self.base_form(service_name, amount_cents, currency);
        form.push(("metadata[imei]".into(), imei.as_str().to_owned()));
        form.push(("metadata[service_id]".into(), service_id.to_string()));
        match actor {
            OrderParty::User(id) => form.push(("metadata[order_user_id]".into(), id.to_string())),
            OrderParty::Guest { email } => {
                form.push(("metadata[guest_email]".into(), email.clone()))
            }
        }
        self.create_session(form).await
    }
}

/// Signature check against an explicit clock, so tests control time.
/// Header format: `t=<unix>,v1=<hex hmac>[,v1=...]`; the signed payload is
/// `{t}.{raw_body}`.
pub fn verify_signature_at(
    secret: &[u8],
    raw_body: &[u8],
    header: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::Malformed);
        };
        match key {
            "t" => timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Stale);
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}
