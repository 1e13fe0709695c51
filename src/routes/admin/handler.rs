use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::header::SET_COOKIE,
    response::IntoResponse,
};
use subtle::ConstantTimeEq;

use crate::{
    AppState,
    clients::NotificationKind,
    error::AppError,
    middleware::{ADMIN_COOKIE, AdminIdentity},
    result::ApiResponse,
    routes::{
        availability::model::{BlockDateRequest, BlockedDate},
        booking::model::{Booking, BookingStatus},
        service::model::{Service, ServiceRequest},
    },
    utils::{generate_admin_token, success_to_api_response, verify_password},
};

use super::model::{
    AdminMeResponse, BookingListQuery, DeletedResponse, LoginRequest, LoginResponse, Setting,
    UpdateStatusRequest,
};

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username_ok: bool = req
        .username
        .as_bytes()
        .ct_eq(state.config.admin_username.as_bytes())
        .into();

    // bcrypt runs even for a wrong username so both failures take the same time.
    let hash = state.config.admin_password_hash.clone();
    let password = req.password;
    let password_ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("password check panicked: {e}")))?
        .map_err(|e| AppError::Internal(format!("password check failed: {e}")))?;

    if !(username_ok && password_ok) {
        tracing::warn!(target: "security", username = %req.username, "admin login failed");
        return Err(AppError::Unauthorized);
    }

    let (token, expires_at) = generate_admin_token(&req.username, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to sign admin session: {e}")))?;
    let cookie = format!(
        "{ADMIN_COOKIE}={token}; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age={}",
        state.config.admin_session_ttl().as_secs()
    );
    tracing::info!(username = %req.username, "admin logged in");

    Ok((
        [(SET_COOKIE, cookie)],
        success_to_api_response(LoginResponse {
            username: req.username,
            expires_at,
        }),
    ))
}

pub async fn logout() -> impl IntoResponse {
    let cookie =
        format!("{ADMIN_COOKIE}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=0");
    ([(SET_COOKIE, cookie)], success_to_api_response(()))
}

pub async fn me(Extension(admin): Extension<AdminIdentity>) -> Json<ApiResponse<AdminMeResponse>> {
    success_to_api_response(AdminMeResponse {
        username: admin.username,
    })
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let bookings = Booking::list(&state.pool, query.status).await?;
    Ok(success_to_api_response(bookings))
}

pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let before = Booking::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let booking = Booking::set_status(&state.pool, id, req.status)
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(
        booking_id = id,
        admin = %admin.username,
        from = %before.status,
        to = %booking.status,
        "booking status changed"
    );

    if req.status == BookingStatus::Cancelled && before.status()? != BookingStatus::Cancelled {
        state
            .mailer
            .notify(NotificationKind::Cancellation, &booking, None)
            .await;
    }

    Ok(success_to_api_response(booking))
}

pub async fn list_blocked_dates(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BlockedDate>>>, AppError> {
    Ok(success_to_api_response(BlockedDate::list(&state.pool).await?))
}

pub async fn create_blocked_date(
    State(state): State<AppState>,
    Json(req): Json<BlockDateRequest>,
) -> Result<Json<ApiResponse<BlockedDate>>, AppError> {
    let blocked = BlockedDate::create(&state.pool, &req)
        .await?
        .ok_or_else(|| AppError::Conflict("Date is already blocked".into()))?;
    tracing::info!(date = %blocked.blocked_date, "date blocked");
    Ok(success_to_api_response(blocked))
}

pub async fn delete_blocked_date(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedResponse>>, AppError> {
    if !BlockedDate::delete(&state.pool, id).await? {
        return Err(AppError::NotFound);
    }
    Ok(success_to_api_response(DeletedResponse { deleted: true }))
}

pub async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Setting>>>, AppError> {
    Ok(success_to_api_response(Setting::list(&state.pool).await?))
}

pub async fn update_setting(
    State(state): State<AppState>,
    Json(setting): Json<Setting>,
) -> Result<Json<ApiResponse<Setting>>, AppError> {
    setting.validate()?;
    Ok(success_to_api_response(
        Setting::upsert(&state.pool, &setting).await?,
    ))
}

pub async fn list_all_services(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    Ok(success_to_api_response(Service::list_all(&state.pool).await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    Json(req): Json<ServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    req.validate()?;
    Ok(success_to_api_response(
        Service::create(&state.pool, &req).await?,
    ))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    req.validate()?;
    let service = Service::update(&state.pool, id, &req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(success_to_api_response(service))
}
