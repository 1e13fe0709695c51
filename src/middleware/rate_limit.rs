use std::sync::Arc;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{HeaderName, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    admission::{AdmissionController, Decision, RateLimitConfig, client_identity},
    utils::{error_codes, error_to_api_response},
};

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Middleware state: the shared controller plus the preset for this route group.
#[derive(Clone)]
pub struct RateLimit {
    admission: Arc<AdmissionController>,
    config: RateLimitConfig,
}

impl RateLimit {
    pub fn new(admission: Arc<AdmissionController>, config: RateLimitConfig) -> Self {
        Self { admission, config }
    }
}

pub async fn rate_limit(
    State(limit): State<RateLimit>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = client_identity(req.headers());
    // Matched template keeps /bookings/{id} in one bucket per client.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let decision = limit.admission.check(&route, &client, &limit.config);
    match decision {
        Decision::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Decision::Denied {
            limit,
            retry_after_secs,
        } => {
            tracing::debug!(%route, %client, retry_after_secs, "request throttled");
            too_many_requests(limit, retry_after_secs)
        }
    }
}

fn too_many_requests(limit: u32, retry_after_secs: u64) -> Response {
    let body = error_to_api_response::<()>(
        error_codes::RATE_LIMIT,
        format!("Too many requests, please try again in {retry_after_secs} seconds"),
    );
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_response_carries_retry_metadata() {
        let response = too_many_requests(5, 42);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers[RETRY_AFTER], "42");
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
    }
}
