use crate::dtos::{GenerateParams, GenerateResponse, WelcomeResponse};
use crate::startup::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

/// `GET /`: fixed greeting, doubles as a liveness probe.
pub async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse::default())
}

/// `GET /generate?text=...`
pub async fn generate(
    State(state): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let Query(params) =
        params.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    params.validate()?;

    // `required` has already rejected `None`.
    let text = params.text.unwrap_or_default();

    let output = state.pool.generate(text).await?;

    Ok(Json(GenerateResponse { output }))
}
