use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;

/// Longest range a single availability query may cover.
pub const MAX_RANGE_DAYS: i64 = 93;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockedDate {
    pub id: i64,
    pub blocked_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TakenSlot {
    pub booking_date: NaiveDate,
    pub booking_time: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl AvailabilityQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.from > self.to {
            return Err(AppError::Validation("`from` must not be after `to`".into()));
        }
        if (self.to - self.from).num_days() > MAX_RANGE_DAYS {
            return Err(AppError::Validation(format!(
                "Date range may span at most {MAX_RANGE_DAYS} days"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub blocked_dates: Vec<NaiveDate>,
    pub taken_slots: Vec<TakenSlot>,
}

#[derive(Debug, Deserialize)]
pub struct BlockDateRequest {
    pub blocked_date: NaiveDate,
    pub reason: Option<String>,
}

impl BlockedDate {
    pub async fn is_blocked(pool: &PgPool, date: NaiveDate) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM blocked_dates WHERE blocked_date = $1)",
        )
        .bind(date)
        .fetch_one(pool)
        .await
    }

    pub async fn in_range(
        pool: &PgPool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedDate>(
            "SELECT id, blocked_date, reason FROM blocked_dates \
             WHERE blocked_date BETWEEN $1 AND $2 ORDER BY blocked_date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedDate>(
            "SELECT id, blocked_date, reason FROM blocked_dates ORDER BY blocked_date",
        )
        .fetch_all(pool)
        .await
    }

    /// Returns `None` when the date is already blocked.
    pub async fn create(
        pool: &PgPool,
        req: &BlockDateRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BlockedDate>(
            "INSERT INTO blocked_dates (blocked_date, reason) VALUES ($1, $2) \
             ON CONFLICT (blocked_date) DO NOTHING RETURNING id, blocked_date, reason",
        )
        .bind(req.blocked_date)
        .bind(&req.reason)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blocked_dates WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl TakenSlot {
    /// Slots held by bookings that are not cancelled.
    pub async fn in_range(
        pool: &PgPool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TakenSlot>(
            "SELECT booking_date, booking_time FROM bookings \
             WHERE booking_date BETWEEN $1 AND $2 AND status <> 'cancelled' \
             ORDER BY booking_date, booking_time",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(from: &str, to: &str) -> AvailabilityQuery {
        AvailabilityQuery {
            from: from.parse().unwrap(),
            to: to.parse().unwrap(),
        }
    }

    #[test]
    fn range_must_be_ordered_and_bounded() {
        assert!(query("2026-11-01", "2026-11-30").validate().is_ok());
        assert!(query("2026-11-01", "2026-11-01").validate().is_ok());
        assert!(query("2026-11-02", "2026-11-01").validate().is_err());
        assert!(query("2026-01-01", "2026-12-31").validate().is_err());
    }
}
