//! Result retrieval endpoints.
//!
//! `GET /api/result/:id`: the recorded assessment, joined with its
//! character's display data, for the shareable result page.
//! `GET /api/result/:id/drawing.png`: the stored drawing itself.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Grade;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub id: Uuid,
    pub character_id: String,
    pub character_name: String,
    pub reference_image_url: Option<String>,
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
    /// Stored drawing as a PNG data URL.
    pub drawing: String,
    pub created_at: DateTime<Utc>,
}

/// Malformed ids are reported exactly like unknown ones.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("No result with id {raw}")))
}

/// `GET /api/result/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let id = parse_id(&id)?;
    let (assessment, target) = ctx.service.get_with_target(id).await?;

    let (character_name, reference_image_url) = match target {
        Some(t) => (t.name, Some(t.reference_image_url)),
        None => (assessment.target_id.clone(), None),
    };
    let drawing = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&assessment.drawing_png)
    );

    Ok(Json(ResultResponse {
        id: assessment.id,
        character_id: assessment.target_id,
        character_name,
        reference_image_url,
        score: assessment.score,
        grade: assessment.grade,
        feedback: assessment.feedback,
        drawing,
        created_at: assessment.created_at,
    }))
}

/// `GET /api/result/:id/drawing.png`
pub async fn drawing(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let assessment = ctx.service.get(id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        assessment.drawing_png,
    ))
}
