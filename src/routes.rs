use axum::{Json, extract::State, http::StatusCode, response::{IntoResponse, Response}};
use std::sync::Arc;
use serde_json::json;
use chrono::Utc;

use crate::{models::{ApiKeyUpdateRequest, GenerateRequest, GenerateResponse, Idea, RefinedIdea}, gemini::{GeminiClient, GeminiError}};

#[derive(Clone)]
pub struct AppState {
    pub gemini: Arc<GeminiClient>,
}

/// Failures surfaced to the frontend. The body carries a stable `code`
/// the UI localizes; raw provider error text stays in the server logs.
#[derive(Debug)]
pub enum ApiError {
    EmptyInput,
    Gemini(GeminiError),
}

impl From<GeminiError> for ApiError {
    fn from(e: GeminiError) -> Self { ApiError::Gemini(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::EmptyInput => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "empty_input",
                "input must not be empty or whitespace-only",
            ),
            ApiError::Gemini(GeminiError::MissingApiKey) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "api_key_missing",
                "no Gemini API key is configured",
            ),
            ApiError::Gemini(GeminiError::CredentialRejected(cause)) => {
                tracing::error!("❌ Credential rejected: {}", cause);
                (
                    StatusCode::UNAUTHORIZED,
                    "credential_rejected",
                    "the configured API key was rejected; select a new key",
                )
            }
            ApiError::Gemini(GeminiError::OperationFailed(cause)) => {
                tracing::error!("❌ Operation failed: {}", cause);
                (
                    StatusCode::BAD_GATEWAY,
                    "operation_failed",
                    "idea generation failed, please try again",
                )
            }
        };
        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

pub async fn generate_ideas(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if body.user_input.trim().is_empty() {
        return Err(ApiError::EmptyInput);
    }

    tracing::info!("🚀 Generating ideas for input: {}", preview(&body.user_input));
    let ideas = state.gemini.generate_ideas(&body.user_input).await?;
    tracing::info!("✅ Generated {} ideas", ideas.len());

    Ok(Json(GenerateResponse { ideas, generated_at: Utc::now() }))
}

pub async fn refine_idea(
    State(state): State<AppState>,
    Json(idea): Json<Idea>,
) -> Result<Json<RefinedIdea>, ApiError> {
    tracing::info!("🔬 Refining idea: {}", preview(&idea.concept));
    let refined = state.gemini.refine_idea(&idea).await?;
    tracing::info!("✅ Refined idea with {} key features", refined.key_features.len());

    Ok(Json(refined))
}

/// Credential reselection endpoint, used by the frontend after a
/// `credential_rejected` response.
pub async fn update_api_key(
    State(state): State<AppState>,
    Json(body): Json<ApiKeyUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    if body.api_key.trim().is_empty() {
        return Err(ApiError::EmptyInput);
    }
    state.gemini.set_api_key(body.api_key);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_input_maps_to_422() {
        let response = ApiError::EmptyInput.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn missing_key_maps_to_503() {
        let response = ApiError::Gemini(GeminiError::MissingApiKey).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn credential_rejection_maps_to_401() {
        let err = GeminiError::CredentialRejected("Requested entity was not found.".into());
        let response = ApiError::Gemini(err).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn generic_failure_maps_to_502() {
        let err = GeminiError::OperationFailed("connection reset".into());
        let response = ApiError::Gemini(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
