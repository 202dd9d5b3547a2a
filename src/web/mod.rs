use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::inference::loader::ModelLoader;
use crate::inference::GenerationParams;

pub mod handlers;
pub mod page;

#[derive(Clone)]
pub struct AppState {
    pub loader: Arc<ModelLoader>,
    pub params: GenerationParams,
    pub model_label: Arc<str>,
    /// Request body cap for both submit routes; articles routinely exceed axum's 2 MB default.
    pub max_body_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    let api = Router::new()
        .route("/api/summarize", post(handlers::api_summarize))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        );

    Router::new()
        .route("/", get(handlers::index))
        .route("/summarize", post(handlers::submit))
        .route("/healthz", get(handlers::health))
        .merge(api)
        .layer(body_limit)
        .with_state(state)
}
