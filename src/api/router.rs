//! HTTP router.
//!
//! Returns a composable `Router`: JSON endpoints nested under `/api/`,
//! reference images under `/characters/`. Layers (outermost first):
//! CORS → request tracing → body limit.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::pipeline::raster::MAX_IMAGE_BYTES;

/// Request body cap: the largest accepted image, base64-inflated, plus slack
/// for the JSON envelope.
const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES / 3 * 4 + 64 * 1024;

/// Build the API router from a constructed `ApiContext`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/targets", get(endpoints::targets::list))
        .route("/score", post(endpoints::score::submit))
        .route("/result/:id", get(endpoints::result::detail))
        .route("/result/:id/drawing.png", get(endpoints::result::drawing))
        .with_state(ctx.clone());

    let mut app = Router::new().nest("/api", api);
    if let Some(dir) = &ctx.characters_dir {
        app = app.nest_service("/characters", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
