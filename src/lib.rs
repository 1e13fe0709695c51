use std::sync::Arc;

use sqlx::PgPool;

use admission::AdmissionController;
use clients::{Mailer, PaymentClient};
use config::Config;
use token::{ActionTokenService, TokenError};

pub mod admission;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod token;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub admission: Arc<AdmissionController>,
    pub tokens: Arc<ActionTokenService>,
    pub payments: PaymentClient,
    pub mailer: Mailer,
}

impl AppState {
    /// Fails when the action token secret is blank.
    pub fn new(
        pool: PgPool,
        config: Config,
        admission: Arc<AdmissionController>,
    ) -> Result<Self, TokenError> {
        let tokens = Arc::new(ActionTokenService::new(&config.action_token_secret)?);
        let http = reqwest::Client::new();
        let payments = PaymentClient::new(
            http.clone(),
            &config.payment_api_base,
            &config.payment_secret_key,
        );
        let mailer = Mailer::new(
            http,
            &config.email_api_url,
            &config.email_api_key,
            &config.email_from,
            &config.admin_email,
        );

        Ok(Self {
            pool,
            config,
            admission,
            tokens,
            payments,
            mailer,
        })
    }

    pub fn manage_url(&self, token: &str) -> String {
        format!("{}/manage?token={}", self.config.public_base_url, token)
    }
}
