use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

use crate::{
    AppState,
    clients::{NotificationKind, payment::PaymentError},
    error::AppError,
    result::ApiResponse,
    token::ActionClaims,
    utils::success_to_api_response,
};

use super::model::{
    Booking, BookingStatus, CancelBookingRequest, ConfirmBookingRequest, ConfirmBookingResponse,
    CreateBookingRequest, CreateBookingResponse, ManageQuery, ManagedBookingResponse,
    RescheduleBookingRequest, ensure_slot_available, parse_slot_time,
};

pub async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<CreateBookingResponse>>, AppError> {
    req.validate()?;
    let booking_time = parse_slot_time(&req.booking_time)?;
    ensure_slot_available(
        &state.pool,
        req.booking_date,
        &booking_time,
        None,
        Utc::now().date_naive(),
    )
    .await?;

    let booking = Booking::create(&state.pool, &req, &booking_time).await?;
    tracing::info!(booking_id = booking.id, date = %booking.booking_date, "booking created");

    Ok(success_to_api_response(CreateBookingResponse {
        booking_id: booking.id,
        status: BookingStatus::Pending,
    }))
}

/// Called after checkout: marks the booking paid and mails the customer a manage link.
pub async fn confirm_booking(
    State(state): State<AppState>,
    Json(req): Json<ConfirmBookingRequest>,
) -> Result<Json<ApiResponse<ConfirmBookingResponse>>, AppError> {
    let session = match state.payments.retrieve_session(req.session_id.trim()).await {
        Ok(session) => session,
        Err(PaymentError::InvalidSessionId | PaymentError::NotFound) => {
            return Err(AppError::Validation("Unknown payment session".into()));
        }
        Err(e) => return Err(e.into()),
    };
    if !session.is_paid() {
        return Err(AppError::Validation("Payment has not completed".into()));
    }
    let booking_id = session
        .booking_id()
        .ok_or_else(|| AppError::Validation("Payment session is not linked to a booking".into()))?;

    let booking = Booking::find_by_id(&state.pool, booking_id)
        .await?
        .ok_or(AppError::NotFound)?;

    match booking.status()? {
        BookingStatus::Confirmed
            if booking.payment_session_id.as_deref() == Some(session.id.as_str()) =>
        {
            return Ok(success_to_api_response(ConfirmBookingResponse {
                booking,
                already_confirmed: true,
            }));
        }
        BookingStatus::Pending => {}
        _ => return Err(AppError::Conflict("Booking cannot be confirmed".into())),
    }

    let booking = Booking::confirm(&state.pool, booking_id, &session.id)
        .await?
        .ok_or_else(|| AppError::Conflict("Booking cannot be confirmed".into()))?;
    tracing::info!(booking_id, "booking confirmed");

    let token = state
        .tokens
        .issue(booking.id, &booking.customer_email)
        .map_err(|e| AppError::Internal(format!("failed to issue action token: {e}")))?;
    let manage_url = state.manage_url(&token);
    state
        .mailer
        .notify(NotificationKind::Confirmation, &booking, Some(&manage_url))
        .await;
    state
        .mailer
        .notify(NotificationKind::AdminNotice, &booking, None)
        .await;

    Ok(success_to_api_response(ConfirmBookingResponse {
        booking,
        already_confirmed: false,
    }))
}

pub async fn get_managed_booking(
    State(state): State<AppState>,
    Query(query): Query<ManageQuery>,
) -> Result<Json<ApiResponse<ManagedBookingResponse>>, AppError> {
    let booking = authorize_action(&state, &query.token).await?;
    let refreshed_token = refresh_if_near_expiry(&state, &query.token, &booking);

    Ok(success_to_api_response(ManagedBookingResponse {
        booking,
        refreshed_token,
    }))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<ManagedBookingResponse>>, AppError> {
    let booking = authorize_action(&state, &req.token).await?;
    if !booking.status()?.is_changeable() {
        return Err(AppError::Conflict("Booking can no longer be cancelled".into()));
    }

    let booking = Booking::cancel(&state.pool, booking.id)
        .await?
        .ok_or_else(|| AppError::Conflict("Booking can no longer be cancelled".into()))?;
    tracing::info!(booking_id = booking.id, "booking cancelled by customer");

    state
        .mailer
        .notify(NotificationKind::Cancellation, &booking, None)
        .await;
    state
        .mailer
        .notify(NotificationKind::AdminNotice, &booking, None)
        .await;

    Ok(success_to_api_response(ManagedBookingResponse {
        booking,
        refreshed_token: None,
    }))
}

pub async fn reschedule_booking(
    State(state): State<AppState>,
    Json(req): Json<RescheduleBookingRequest>,
) -> Result<Json<ApiResponse<ManagedBookingResponse>>, AppError> {
    let booking = authorize_action(&state, &req.token).await?;
    if !booking.status()?.is_changeable() {
        return Err(AppError::Conflict("Booking can no longer be moved".into()));
    }

    let booking_time = parse_slot_time(&req.booking_time)?;
    ensure_slot_available(
        &state.pool,
        req.booking_date,
        &booking_time,
        Some(booking.id),
        Utc::now().date_naive(),
    )
    .await?;

    let booking = Booking::reschedule(&state.pool, booking.id, req.booking_date, &booking_time)
        .await?
        .ok_or_else(|| AppError::Conflict("Booking can no longer be moved".into()))?;
    tracing::info!(booking_id = booking.id, date = %booking.booking_date, "booking rescheduled by customer");

    let refreshed_token = refresh_if_near_expiry(&state, &req.token, &booking);
    let link_token = refreshed_token.as_deref().unwrap_or(&req.token);
    let manage_url = state.manage_url(link_token);
    state
        .mailer
        .notify(NotificationKind::Reschedule, &booking, Some(&manage_url))
        .await;
    state
        .mailer
        .notify(NotificationKind::AdminNotice, &booking, None)
        .await;

    Ok(success_to_api_response(ManagedBookingResponse {
        booking,
        refreshed_token,
    }))
}

/// Resolves an action token to the booking it grants access to.
///
/// Every failure returns the same error so callers cannot tell a forged link
/// from an expired one or a deleted booking.
async fn authorize_action(state: &AppState, token: &str) -> Result<Booking, AppError> {
    let claims = state.tokens.verify(token.trim())?;
    let found = Booking::find_by_id(&state.pool, claims.subject_id).await?;
    owned_booking(found, &claims)
}

fn owned_booking(found: Option<Booking>, claims: &ActionClaims) -> Result<Booking, AppError> {
    let Some(booking) = found else {
        tracing::debug!(booking_id = claims.subject_id, "action token for missing booking");
        return Err(AppError::InvalidActionToken);
    };

    if !booking.belongs_to(&claims.identity_claim) {
        tracing::warn!(
            target: "security",
            booking_id = booking.id,
            "action token identity does not match booking"
        );
        return Err(AppError::InvalidActionToken);
    }

    Ok(booking)
}

fn refresh_if_near_expiry(state: &AppState, token: &str, booking: &Booking) -> Option<String> {
    if !state.tokens.is_near_expiry(token.trim()) {
        return None;
    }
    match state.tokens.issue(booking.id, &booking.customer_email) {
        Ok(fresh) => {
            tracing::debug!(booking_id = booking.id, "re-issued action token near expiry");
            Some(fresh)
        }
        Err(e) => {
            tracing::warn!(booking_id = booking.id, error = %e, "could not re-issue action token");
            None
        }
    }
}
