use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;
use crate::routes::booking::model::BookingStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn validate(&self) -> Result<(), AppError> {
        let key_ok = !self.key.is_empty()
            && self.key.len() <= 64
            && self
                .key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !key_ok {
            return Err(AppError::Validation(
                "Setting keys use lowercase letters, digits and underscores".into(),
            ));
        }
        if self.value.len() > 10_000 {
            return Err(AppError::Validation("Setting value is too long".into()));
        }
        Ok(())
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Setting>("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(pool)
            .await
    }

    pub async fn upsert(pool: &PgPool, setting: &Setting) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Setting>(
            "INSERT INTO settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value RETURNING key, value",
        )
        .bind(&setting.key)
        .bind(&setting.value)
        .fetch_one(pool)
        .await
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminMeResponse {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}
