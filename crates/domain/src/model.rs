//! Data structures and validation shared across the API and gateway binaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Required length (in ASCII digits) for externally supplied IMEI values.
pub const IMEI_LENGTH: usize = 15;

/// Upper bound on IMEIs accepted in a single order.
pub const MAX_IMEIS_PER_ORDER: usize = 50;

/// Errors emitted when user-supplied IMEIs fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImeiFormatError {
    #[error("imei must be exactly {IMEI_LENGTH} digits")]
    WrongLength,
    #[error("imei contains non-digit characters")]
    NonDigit,
}

/// Validates that the supplied IMEI matches the strict 15-digit contract.
pub fn validate_imei(imei: &str) -> Result<(), ImeiFormatError> {
    if imei.len() != IMEI_LENGTH {
        return Err(ImeiFormatError::WrongLength);
    }

    if !imei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ImeiFormatError::NonDigit);
    }

    Ok(())
}

/// A validated 15-digit IMEI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Imei(String);

impl Imei {
    pub fn parse(raw: &str) -> Result<Self, ImeiFormatError> {
        let trimmed = raw.trim();
        validate_imei(trimmed)?;
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Errors emitted when an order submission fails validation, before any
/// state is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("an order must contain between 1 and {MAX_IMEIS_PER_ORDER} imeis")]
    BadImeiCount,
    #[error("invalid imei `{imei}`: {source}")]
    BadImei {
        imei: String,
        source: ImeiFormatError,
    },
    #[error("guest orders require a contact email")]
    MissingGuestEmail,
}

/// Validates a raw IMEI batch: 1..=50 entries, each exactly 15 digits.
/// Blank entries are dropped before counting, matching the submission form.
pub fn parse_imei_batch(raw: &[String]) -> Result<Vec<Imei>, OrderValidationError> {
    let candidates: Vec<&str> = raw
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if candidates.is_empty() || candidates.len() > MAX_IMEIS_PER_ORDER {
        return Err(OrderValidationError::BadImeiCount);
    }

    candidates
        .into_iter()
        .map(|value| {
            Imei::parse(value).map_err(|source| OrderValidationError::BadImei {
                imei: value.to_owned(),
                source,
            })
        })
        .collect()
}

/// Canonical form for stored/compared email addresses.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// User classification determining which catalog price applies and which
/// endpoints are reachable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserTier {
    Guest,
    Registered,
    Pro,
    Premium,
    Admin,
    Superadmin,
    Pending,
}

impl UserTier {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }
}

/// Lifecycle of an IMEI order. `Pending` until the verification side-effect
/// resolves; the other three are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Partial,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Maps a batch outcome onto the order lifecycle: all succeeded →
/// completed, none → failed, mixed → partial.
pub fn aggregate_order_status(succeeded: usize, total: usize) -> OrderStatus {
    if total == 0 || succeeded == 0 {
        OrderStatus::Failed
    } else if succeeded == total {
        OrderStatus::Completed
    } else {
        OrderStatus::Partial
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

/// Who placed an order. Exactly one of a real user id or a guest contact
/// email, enforced at construction instead of by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderParty {
    User(i64),
    Guest { email: String },
}

impl OrderParty {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::User(id) => Some(*id),
            Self::Guest { .. } => None,
        }
    }

    pub fn guest_email(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Guest { email } => Some(email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub tier: UserTier,
    pub full_name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub email_verification_code: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,
    pub reset_code: Option<String>,
    pub reset_code_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub tier: UserTier,
    pub full_name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email_verification_code: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,
}

/// Profile fields an admin (or the user) may rewrite. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub service_id: i64,
    pub service_name: String,
    pub price_guest: i64,
    pub price_registered: i64,
    pub price_premium: i64,
    pub price_pro: i64,
    pub description: Option<String>,
    pub active: bool,
}

impl ServiceRecord {
    /// Price point (in cents) applying to the given tier. Tiers without a
    /// dedicated column pay the registered price.
    pub fn price_for(&self, tier: UserTier) -> i64 {
        match tier {
            UserTier::Guest => self.price_guest,
            UserTier::Pro => self.price_pro,
            UserTier::Premium => self.price_premium,
            UserTier::Registered
            | UserTier::Admin
            | UserTier::Superadmin
            | UserTier::Pending => self.price_registered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewService {
    pub service_name: String,
    pub price_guest: i64,
    pub price_registered: i64,
    pub price_premium: i64,
    pub price_pro: i64,
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceChanges {
    pub service_name: Option<String>,
    pub price_guest: Option<i64>,
    pub price_registered: Option<i64>,
    pub price_premium: Option<i64>,
    pub price_pro: Option<i64>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: i64,
    pub user_id: Option<i64>,
    pub guest_email: Option<String>,
    pub imeis: Vec<String>,
    pub service_id: i64,
    pub status: OrderStatus,
    pub result: Option<String>,
    pub price_used: i64,
    pub currency: String,
    pub tier_at_order: UserTier,
    pub service_name_at_order: String,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub placed_by: OrderParty,
    pub imeis: Vec<Imei>,
    pub service_id: i64,
    pub price_used: i64,
    pub currency: String,
    pub tier_at_order: UserTier,
    pub service_name_at_order: String,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_id: i64,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: i64,
    pub credited_amount: Option<i64>,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub reference: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: i64,
    pub credited_amount: Option<i64>,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub reference: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_IMEI: &str = "356938035643809";

    #[test]
    fn imei_validation_rejects_invalid_inputs() {
        assert_eq!(validate_imei("12345"), Err(ImeiFormatError::WrongLength));
        assert_eq!(
            validate_imei("35693803564380a"),
            Err(ImeiFormatError::NonDigit)
        );
        assert!(validate_imei(VALID_IMEI).is_ok());
    }

    #[test]
    fn imei_parse_trims_whitespace() {
        let imei = Imei::parse(" 356938035643809 ").unwrap();
        assert_eq!(imei.as_str(), VALID_IMEI);
    }

    #[test]
    fn batch_rejects_empty_and_oversized_submissions() {
        assert_eq!(
            parse_imei_batch(&[]),
            Err(OrderValidationError::BadImeiCount)
        );
        assert_eq!(
            parse_imei_batch(&["  ".to_string()]),
            Err(OrderValidationError::BadImeiCount)
        );
        let oversized = vec![VALID_IMEI.to_string(); MAX_IMEIS_PER_ORDER + 1];
        assert_eq!(
            parse_imei_batch(&oversized),
            Err(OrderValidationError::BadImeiCount)
        );
    }

    #[test]
    fn batch_rejects_on_first_bad_imei() {
        let batch = vec![VALID_IMEI.to_string(), "not-an-imei".to_string()];
        assert!(matches!(
            parse_imei_batch(&batch),
            Err(OrderValidationError::BadImei { .. })
        ));
    }

    #[test]
    fn batch_accepts_bounds() {
        let maxed = vec![VALID_IMEI.to_string(); MAX_IMEIS_PER_ORDER];
        assert_eq!(parse_imei_batch(&maxed).unwrap().len(), MAX_IMEIS_PER_ORDER);
    }

    #[test]
    fn status_aggregation_follows_all_none_mixed_rule() {
        assert_eq!(aggregate_order_status(3, 3), OrderStatus::Completed);
        assert_eq!(aggregate_order_status(0, 3), OrderStatus::Failed);
        assert_eq!(aggregate_order_status(1, 3), OrderStatus::Partial);
        assert_eq!(aggregate_order_status(0, 0), OrderStatus::Failed);
    }

    #[test]
    fn price_for_tier_matrix() {
        let service = ServiceRecord {
            service_id: 7,
            service_name: "blacklist".into(),
            price_guest: 400,
            price_registered: 250,
            price_premium: 150,
            price_pro: 100,
            description: None,
            active: true,
        };
        assert_eq!(service.price_for(UserTier::Guest), 400);
        assert_eq!(service.price_for(UserTier::Registered), 250);
        assert_eq!(service.price_for(UserTier::Premium), 150);
        assert_eq!(service.price_for(UserTier::Pro), 100);
        assert_eq!(service.price_for(UserTier::Admin), 250);
        assert_eq!(service.price_for(UserTier::Pending), 250);
    }

    #[test]
    fn tier_round_trips_through_strings() {
        use std::str::FromStr;
        assert_eq!(UserTier::from_str("superadmin").unwrap(), UserTier::Superadmin);
        assert_eq!(UserTier::Pro.to_string(), "pro");
        assert!(UserTier::Admin.is_admin());
        assert!(!UserTier::Premium.is_admin());
    }

    #[test]
    fn email_normalization_lowercases_and_trims() {
        assert_eq!(normalize_email("  Foo@Example.COM "), "foo@example.com");
    }

    #[test]
    fn order_party_exposes_exactly_one_side() {
        let user = OrderParty::User(3);
        assert_eq!(user.user_id(), Some(3));
        assert_eq!(user.guest_email(), None);

        let guest = OrderParty::Guest {
            email: "g@example.com".into(),
        };
        assert_eq!(guest.user_id(), None);
        assert_eq!(guest.guest_email(), Some("g@example.com"));
    }
}
