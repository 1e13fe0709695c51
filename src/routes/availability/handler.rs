use axum::{
    Json,
    extract::{Query, State},
};

use crate::{AppState, error::AppError, result::ApiResponse, utils::success_to_api_response};

use super::model::{AvailabilityQuery, AvailabilityResponse, BlockedDate, TakenSlot};

/// Calendar data for the booking widget: blocked days and taken slots.
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, AppError> {
    query.validate()?;

    let blocked = BlockedDate::in_range(&state.pool, query.from, query.to).await?;
    let taken_slots = TakenSlot::in_range(&state.pool, query.from, query.to).await?;

    Ok(success_to_api_response(AvailabilityResponse {
        from: query.from,
        to: query.to,
        blocked_dates: blocked.into_iter().map(|b| b.blocked_date).collect(),
        taken_slots,
    }))
}
