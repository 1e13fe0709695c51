use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid session id")]
    InvalidSessionId,
    #[error("session not found")]
    NotFound,
    #[error("payment request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("payment provider returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub payment_status: String,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Booking id carried in `client_reference_id`.
    pub fn booking_id(&self) -> Option<i64> {
        self.client_reference_id
            .as_deref()
            .and_then(|id| id.trim().parse().ok())
            .filter(|id| *id > 0)
    }
}

#[derive(Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl PaymentClient {
    pub fn new(http: reqwest::Client, api_base: &str, secret_key: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        if !is_valid_session_id(session_id) {
            return Err(PaymentError::InvalidSessionId);
        }

        let url = format!("{}/v1/checkout/sessions/{}", self.api_base, session_id);
        let response = self.http.get(&url).bearer_auth(&self.secret_key).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            tracing::warn!(status = status.as_u16(), "payment provider rejected session lookup");
            return Err(PaymentError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 255 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
