//! External collaborators and the payment reconciliation pipeline: the
//! Stripe checkout gateway, the IMEI verification client, the SMTP mailer,
//! and the webhook-driven order/ledger reconciler.

pub mod event;
pub mod fulfill;
pub mod mailer;
pub mod reconcile;
pub mod stripe;
pub mod verifier;


pub use event::{CheckoutEvent, PaymentNotification};
pub use fulfill::fulfill_order;
pub use mailer::{Mail, MailError, Notifier, NoopNotifier, SmtpNotifier};
pub use reconcile::process_notification;
pub use stripe::{CheckoutGateway, SignatureError, StripeClient};
pub use verifier::{HttpVerificationClient, VerificationClient, VerifyError, VerifyOutcome};
