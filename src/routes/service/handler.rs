use axum::{Json, extract::State};

use crate::{AppState, error::AppError, result::ApiResponse, utils::success_to_api_response};

use super::model::Service;

pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let services = Service::list_active(&state.pool).await?;
    Ok(success_to_api_response(services))
}
