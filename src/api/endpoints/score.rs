//! Drawing submission endpoint.
//!
//! `POST /api/score`: accepts the canvas as a data URL plus the chosen
//! character, runs the assessment pipeline, and returns the score with the
//! id of the recorded result.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Grade;
use crate::pipeline::raster::RasterInput;
use crate::pipeline::Submission;

#[derive(Deserialize)]
pub struct ScoreRequest {
    /// `data:image/png;base64,...` export of the canvas.
    pub drawing: String,
    #[serde(rename = "characterId", alias = "target_id")]
    pub character_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
    pub result_id: Uuid,
}

/// `POST /api/score`: assess and record one drawing.
pub async fn submit(
    State(ctx): State<ApiContext>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let Json(payload) = payload?;
    let submission = Submission {
        target_id: payload.character_id,
        drawing: RasterInput::DataUrl(payload.drawing),
    };

    let outcome = ctx.service.submit(submission).await?;

    Ok(Json(ScoreResponse {
        score: outcome.score,
        grade: outcome.grade,
        feedback: outcome.feedback,
        result_id: outcome.id,
    }))
}
