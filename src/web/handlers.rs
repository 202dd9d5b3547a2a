use axum::{
    extract::{rejection::FormRejection, Form, Json, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use super::page::{render_page, PageView};
use super::AppState;
use crate::summarize::{summarize_text, SummarizeError, SummaryOutcome};

#[derive(Deserialize, Debug)]
pub struct SummarizeForm {
    #[serde(default)]
    pub article: String,
}

#[derive(Deserialize, Debug)]
pub struct ApiSummarizeRequest {
    pub text: String,
}

#[derive(Serialize, Debug)]
pub struct ApiSummarizeResponse {
    pub summary: String,
}

impl IntoResponse for SummarizeError {
    fn into_response(self) -> Response {
        let status = match self {
            SummarizeError::EmptyInput => StatusCode::UNPROCESSABLE_ENTITY,
            SummarizeError::ModelLoad(_) | SummarizeError::Invocation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn page_response(state: &AppState, article: &str, outcome: Option<&SummaryOutcome>) -> Response {
    page_response_with(state, StatusCode::OK, article, outcome)
}

fn page_response_with(
    state: &AppState,
    status: StatusCode,
    article: &str,
    outcome: Option<&SummaryOutcome>,
) -> Response {
    let view = PageView {
        model: &state.model_label,
        article,
        outcome,
    };
    match render_page(&view) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("page render failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "page render failed").into_response()
        }
    }
}

pub async fn index(State(state): State<AppState>) -> Response {
    page_response(&state, "", None)
}

pub async fn submit(
    State(state): State<AppState>,
    form: Result<Form<SummarizeForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(status = %rejection.status(), "form rejected: {}", rejection.body_text());
            let outcome = SummaryOutcome::Error(rejection.body_text());
            return page_response_with(&state, rejection.status(), "", Some(&outcome));
        }
    };

    let outcome: SummaryOutcome = summarize_text(&state.loader, &form.article, &state.params)
        .await
        .into();
    page_response(&state, &form.article, Some(&outcome))
}

pub async fn api_summarize(
    State(state): State<AppState>,
    Json(req): Json<ApiSummarizeRequest>,
) -> Result<Json<ApiSummarizeResponse>, SummarizeError> {
    let summary = summarize_text(&state.loader, &req.text, &state.params).await?;
    Ok(Json(ApiSummarizeResponse { summary }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model": &*state.model_label,
        "model_loaded": state.loader.is_loaded(),
        "load_attempts": state.loader.build_attempts(),
    }))
}
