use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;
use crate::routes::availability::model::BlockedDate;
use crate::routes::service::model::Service;
use crate::utils::is_plausible_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Whether a customer may still cancel or move the booking.
    pub fn is_changeable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(AppError::Validation(format!("Unknown booking status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub service_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub booking_date: NaiveDate,
    pub booking_time: String,
    pub notes: Option<String>,
    pub status: String,
    #[serde(skip_serializing)]
    pub payment_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn status(&self) -> Result<BookingStatus, AppError> {
        self.status.parse()
    }

    /// Case-insensitive match against the email the booking was made with.
    pub fn belongs_to(&self, email: &str) -> bool {
        self.customer_email.trim().eq_ignore_ascii_case(email.trim())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub booking_date: NaiveDate,
    pub booking_time: String,
    pub notes: Option<String>,
}

impl CreateBookingRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let name = self.customer_name.trim();
        if name.is_empty() || name.len() > 120 {
            return Err(AppError::Validation("Name must be 1 to 120 characters".into()));
        }
        if !is_plausible_email(&self.customer_email) {
            return Err(AppError::Validation("A valid email address is required".into()));
        }
        if let Some(phone) = &self.customer_phone {
            if phone.len() > 32 {
                return Err(AppError::Validation("Phone number is too long".into()));
            }
        }
        if self.notes.as_deref().is_some_and(|n| n.len() > 2000) {
            return Err(AppError::Validation("Notes are limited to 2000 characters".into()));
        }
        parse_slot_time(&self.booking_time)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: i64,
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmBookingResponse {
    pub booking: Booking,
    pub already_confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ManageQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBookingRequest {
    pub token: String,
    pub booking_date: NaiveDate,
    pub booking_time: String,
}

#[derive(Debug, Serialize)]
pub struct ManagedBookingResponse {
    pub booking: Booking,
    /// Replacement link token, present when the supplied one is close to expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_token: Option<String>,
}

/// Parses a `HH:MM` slot start and returns it in canonical form.
pub fn parse_slot_time(raw: &str) -> Result<String, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| AppError::Validation("Time must be in HH:MM format".into()))
}

/// Rejects slots in the past, on blocked dates, or already held by another booking.
pub async fn ensure_slot_available(
    pool: &PgPool,
    date: NaiveDate,
    time: &str,
    exclude_booking: Option<i64>,
    today: NaiveDate,
) -> Result<(), AppError> {
    if date < today {
        return Err(AppError::Validation("Date is in the past".into()));
    }
    if BlockedDate::is_blocked(pool, date).await? {
        return Err(AppError::Conflict("That date is not available".into()));
    }
    if Booking::slot_taken(pool, date, time, exclude_booking).await? {
        return Err(slot_taken());
    }
    Ok(())
}

fn slot_taken() -> AppError {
    AppError::Conflict("That time slot is already taken".into())
}

/// A write that lost the race for a slot hits `bookings_live_slot_uidx`.
fn slot_write_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => slot_taken(),
        other => other.into(),
    }
}

const COLUMNS: &str = "id, service_id, customer_name, customer_email, customer_phone, \
     booking_date, booking_time, notes, status, payment_session_id, created_at, updated_at";

impl Booking {
    pub async fn create(
        pool: &PgPool,
        req: &CreateBookingRequest,
        booking_time: &str,
    ) -> Result<Self, AppError> {
        match Service::find_by_id(pool, req.service_id).await? {
            Some(service) if service.active => {}
            _ => return Err(AppError::Validation("Unknown service".into())),
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings (service_id, customer_name, customer_email, customer_phone, \
             booking_date, booking_time, notes, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') RETURNING {COLUMNS}"
        ))
        .bind(req.service_id)
        .bind(req.customer_name.trim())
        .bind(req.customer_email.trim())
        .bind(&req.customer_phone)
        .bind(req.booking_date)
        .bind(booking_time)
        .bind(&req.notes)
        .fetch_one(pool)
        .await
        .map_err(slot_write_error)?;

        Ok(booking)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!("SELECT {COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {COLUMNS} FROM bookings WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY booking_date DESC, booking_time DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await
    }

    pub async fn slot_taken(
        pool: &PgPool,
        date: NaiveDate,
        time: &str,
        exclude_booking: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE booking_date = $1 AND booking_time = $2 \
             AND status <> 'cancelled' AND ($3::bigint IS NULL OR id <> $3))",
        )
        .bind(date)
        .bind(time)
        .bind(exclude_booking)
        .fetch_one(pool)
        .await
    }

    /// Moves a pending booking to confirmed. `None` if it was not pending.
    pub async fn confirm(
        pool: &PgPool,
        id: i64,
        session_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET status = 'confirmed', payment_session_id = $2, updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(session_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_status(
        pool: &PgPool,
        id: i64,
        status: BookingStatus,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET status = $2, updated_at = now() WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(pool)
        .await
        .map_err(slot_write_error)
    }

    /// Cancels only while the booking is still changeable.
    pub async fn cancel(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET status = 'cancelled', updated_at = now() \
             WHERE id = $1 AND status IN ('pending', 'confirmed') RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn reschedule(
        pool: &PgPool,
        id: i64,
        date: NaiveDate,
        time: &str,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET booking_date = $2, booking_time = $3, updated_at = now() \
             WHERE id = $1 AND status IN ('pending', 'confirmed') RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(date)
        .bind(time)
        .fetch_optional(pool)
        .await
        .map_err(slot_write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateBookingRequest {
        serde_json::from_value(serde_json::json!({
            "service_id": 1,
            "customer_name": "Ada Lovelace",
            "customer_email": "ada@example.com",
            "booking_date": "2026-11-03",
            "booking_time": "10:30"
        }))
        .unwrap()
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let mut req = request();
        req.customer_email = "not-an-email".into();
        assert!(req.validate().is_err());

        let mut req = request();
        req.customer_name = "   ".into();
        assert!(req.validate().is_err());

        let mut req = request();
        req.booking_time = "25:00".into();
        assert!(req.validate().is_err());

        let mut req = request();
        req.notes = Some("x".repeat(2001));
        assert!(req.validate().is_err());
    }

    #[test]
    fn slot_time_is_canonicalised() {
        assert_eq!(parse_slot_time("9:05").unwrap(), "09:05");
        assert_eq!(parse_slot_time(" 14:00 ").unwrap(), "14:00");
        assert!(parse_slot_time("14:00:00").is_err());
        assert!(parse_slot_time("noon").is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("archived".parse::<BookingStatus>().is_err());
        assert!(BookingStatus::Confirmed.is_changeable());
        assert!(!BookingStatus::Cancelled.is_changeable());
    }

    #[test]
    fn ownership_check_ignores_case_and_whitespace() {
        let booking = Booking {
            id: 1,
            service_id: 1,
            customer_name: "Ada".into(),
            customer_email: "Ada@Example.com".into(),
            customer_phone: None,
            booking_date: "2026-11-03".parse().unwrap(),
            booking_time: "10:30".into(),
            notes: None,
            status: "confirmed".into(),
            payment_session_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(booking.belongs_to(" ada@example.com"));
        assert!(!booking.belongs_to("eve@example.com"));
    }
}
