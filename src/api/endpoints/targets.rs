use axum::extract::State;
use axum::Json;

use crate::api::types::ApiContext;
use crate::models::TargetSummary;

/// `GET /api/targets`: the selectable characters, in catalog order.
pub async fn list(State(ctx): State<ApiContext>) -> Json<Vec<TargetSummary>> {
    Json(ctx.service.catalog().summaries())
}
