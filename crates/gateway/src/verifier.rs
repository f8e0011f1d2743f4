//! HTTP client for the upstream IMEI verification provider.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use imeicheck_domain::config::VerifierConfig;
use imeicheck_domain::model::Imei;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    Transport(String),
    #[error("verification provider returned status {0}")]
    BadStatus(u16),
    #[error("verification response was not valid json: {0}")]
    Decode(String),
}

/// Outcome of one verification call. `result` is the cleaned, persistable
/// text for the order record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub success: bool,
    pub result: String,
}

#[async_trait]
pub trait VerificationClient: Send + Sync {
    /// Runs one lookup. The provider routes by the numeric service id.
    async fn verify(&self, imei: &Imei, service_id: i64) -> Result<VerifyOutcome, VerifyError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    key: &'a str,
    imei: &'a str,
    service: i64,
}

pub struct HttpVerificationClient {
    config: VerifierConfig,
    client: reqwest::Client,
}

impl HttpVerificationClient {
    pub fn new(config: VerifierConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| VerifyError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn verify(&self, imei: &Imei, service_id: i64) -> Result<VerifyOutcome, VerifyError> {
        let response = self
            .client
            .post(self.config.api_url())
            .json(&VerifyRequest {
                key: self.config.api_key(),
                imei: imei.as_str(),
                service: service_id,
            })
            .send()
            .await
            .map_err(|err| VerifyError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::BadStatus(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| VerifyError::Decode(err.to_string()))?;

        Ok(outcome_from_body(&body))
    }
}

/// The provider signals success either as `success: true` or
/// `status: "success"` depending on the endpoint generation.
pub(crate) fn outcome_from_body(body: &Value) -> VerifyOutcome {
    let success = body["success"].as_bool().unwrap_or(false)
        || body["status"].as_str() == Some("success");

    let result = match &body["result"] {
        Value::String(text) => clean_result(text),
        Value::Null => body.to_string(),
        other => other.to_string(),
    };

    VerifyOutcome { success, result }
}

/// Strips the provider's HTML markup down to readable text: `<br>` variants
/// become newlines, every other tag is dropped.
pub fn clean_result(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '<' {
            text.push(ch);
            continue;
        }

        let rest = &raw[idx..];
        let Some(end) = rest.find('>') else {
            text.push_str(rest);
            break;
        };
        let tag = rest[1..end].trim().to_ascii_lowercase();
        if tag == "br" || tag == "br/" || tag == "br /" {
            text.push('\n');
        }
        // Skip past the closing '>'.
        while let Some(&(next_idx, _)) = chars.peek() {
            if next_idx > idx + end {
                break;
            }
            chars.next();
        }
    }

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}
