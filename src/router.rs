use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};

use crate::{
    AppState,
    middleware::{RateLimit, admin_auth, log_errors, rate_limit},
    routes::{admin, availability, booking, service},
};

/// Builds the full application. Each route group gets the admission preset
/// matching how sensitive it is.
pub fn create_router(state: AppState) -> Router {
    let presets = state.config.rate_limits;
    let admission = state.admission.clone();

    // Read-only
    let loose = Router::new()
        .route("/services", get(service::list_services))
        .route("/availability", get(availability::get_availability))
        .route_layer(from_fn_with_state(
            RateLimit::new(admission.clone(), presets.loose),
            rate_limit,
        ));

    let standard = Router::new()
        .route("/bookings", post(booking::create_booking))
        .route("/bookings/manage", get(booking::get_managed_booking))
        .route("/admin/logout", post(admin::logout))
        .route_layer(from_fn_with_state(
            RateLimit::new(admission.clone(), presets.standard),
            rate_limit,
        ));

    // Payment confirmation, token-authorised actions and login
    let strict = Router::new()
        .route("/bookings/confirm", post(booking::confirm_booking))
        .route("/bookings/manage/cancel", post(booking::cancel_booking))
        .route("/bookings/manage/reschedule", post(booking::reschedule_booking))
        .route("/admin/login", post(admin::login))
        .route_layer(from_fn_with_state(
            RateLimit::new(admission.clone(), presets.strict),
            rate_limit,
        ));

    let console = Router::new()
        .route("/admin/me", get(admin::me))
        .route("/admin/bookings", get(admin::list_bookings))
        .route("/admin/bookings/{id}/status", put(admin::update_booking_status))
        .route(
            "/admin/blocked-dates",
            get(admin::list_blocked_dates).post(admin::create_blocked_date),
        )
        .route("/admin/blocked-dates/{id}", delete(admin::delete_blocked_date))
        .route(
            "/admin/settings",
            get(admin::list_settings).put(admin::update_setting),
        )
        .route(
            "/admin/services",
            get(admin::list_all_services).post(admin::create_service),
        )
        .route("/admin/services/{id}", put(admin::update_service))
        .route_layer(from_fn_with_state(state.clone(), admin_auth))
        .route_layer(from_fn_with_state(
            RateLimit::new(admission.clone(), presets.standard),
            rate_limit,
        ));

    let api = Router::new()
        .merge(loose)
        .merge(standard)
        .merge(strict)
        .merge(console);

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    let router = router.layer(from_fn(log_errors));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer for development");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
