use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ServiceRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() || self.name.len() > 120 {
            return Err(AppError::Validation(
                "Service name must be 1 to 120 characters".into(),
            ));
        }
        if !(5..=8 * 60).contains(&self.duration_minutes) {
            return Err(AppError::Validation(
                "Duration must be between 5 and 480 minutes".into(),
            ));
        }
        if self.price_cents < 0 {
            return Err(AppError::Validation("Price cannot be negative".into()));
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, name, description, duration_minutes, price_cents, active";

impl Service {
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Service>(&format!(
            "SELECT {COLUMNS} FROM services WHERE active ORDER BY name"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Service>(&format!("SELECT {COLUMNS} FROM services ORDER BY id"))
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Service>(&format!("SELECT {COLUMNS} FROM services WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, req: &ServiceRequest) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (name, description, duration_minutes, price_cents, active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.duration_minutes)
        .bind(req.price_cents)
        .bind(req.active)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: i64,
        req: &ServiceRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Service>(&format!(
            "UPDATE services SET name = $2, description = $3, duration_minutes = $4, \
             price_cents = $5, active = $6 WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.duration_minutes)
        .bind(req.price_cents)
        .bind(req.active)
        .fetch_optional(pool)
        .await
    }
}
