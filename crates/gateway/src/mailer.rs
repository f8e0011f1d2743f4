//! Outbound notifications over SMTP, behind a trait so the pipeline and the
//! handlers can run against a recording double in tests.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use imeicheck_domain::config::MailerConfig;
use imeicheck_domain::model::OrderStatus;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    BadAddress(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// One outbound message, already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    pub fn verification_code(to: &str, code: &str) -> Self {
        Self {
            to: to.to_owned(),
            subject: "Verify your email address".to_owned(),
            body: format!(
                "Your verification code is {code}. It expires in 24 hours.\n"
            ),
        }
    }

    pub fn password_reset(to: &str, code: &str) -> Self {
        Self {
            to: to.to_owned(),
            subject: "Password reset code".to_owned(),
            body: format!("Your password reset code is {code}. It expires in 1 hour.\n"),
        }
    }

    pub fn topup_confirmation(to: &str, credited_cents: i64, currency: &str) -> Self {
        Self {
            to: to.to_owned(),
            subject: "Balance top-up confirmed".to_owned(),
            body: format!(
                "Your account was credited {} {}.\n",
                format_amount(credited_cents),
                currency.to_ascii_uppercase()
            ),
        }
    }

    pub fn order_result(to: &str, service_name: &str, status: OrderStatus, result: &str) -> Self {
        Self {
            to: to.to_owned(),
            subject: format!("IMEI check result: {service_name}"),
            body: format!("Order status: {status}\n\n{result}\n"),
        }
    }
}

fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// SMTP-backed notifier used when `SMTP_HOST` is configured.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &MailerConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|_| MailError::BadAddress(config.from_address.clone()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| MailError::Transport(err.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| MailError::BadAddress(mail.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .body(mail.body)
            .map_err(|err| MailError::Transport(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// Swallows every message. Used when SMTP is not configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        tracing::debug!(to = %mail.to, subject = %mail.subject, "email suppressed, smtp not configured");
        Ok(())
    }
}
