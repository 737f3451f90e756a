//! Router assembly: REST endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{delete, get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router:
/// - REST API under `/api/v1/...`
/// - CORS (allow any origin/method/headers) - adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/courses", get(http::http_list_courses))
    .route("/api/v1/courses/generate", post(http::http_generate_course))
    .route("/api/v1/courses/:course_id", get(http::http_get_course))
    .route("/api/v1/courses/:course_id", delete(http::http_delete_course))
    .route("/api/v1/courses/:course_id/confirm", post(http::http_confirm_course))
    .route("/api/v1/courses/:course_id/regenerate", post(http::http_regenerate_course))
    .route("/api/v1/courses/:course_id/progress", get(http::http_progress))
    .route("/api/v1/courses/:course_id/feedback", get(http::http_feedback_history))
    .route("/api/v1/progress", get(http::http_all_progress))
    .route(
      "/api/v1/courses/:course_id/lessons/:lesson_id/complete",
      post(http::http_complete_lesson),
    )
    .route(
      "/api/v1/courses/:course_id/lessons/:lesson_id/regenerate",
      post(http::http_regenerate_lesson),
    )
    .route(
      "/api/v1/courses/:course_id/lessons/:lesson_id/quiz",
      post(http::http_generate_quiz),
    )
    .route(
      "/api/v1/courses/:course_id/lessons/:lesson_id/quiz/retake",
      post(http::http_retake_quiz),
    )
    .route(
      "/api/v1/courses/:course_id/lessons/:lesson_id/submit",
      post(http::http_submit_quiz),
    )
    .with_state(state)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}
