//! HTTP endpoint handlers. These are thin wrappers that validate the body and
//! forward to core logic. Failures render through `AppError`'s envelope.

use std::sync::Arc;
use axum::{extract::{rejection::JsonRejection, Path, State}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::domain::NormalizedQuestion;
use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generator: state.generator.is_some() })
}

#[instrument(level = "info", skip_all)]
pub async fn http_generate_question(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<GenerateQuestionIn>, JsonRejection>,
) -> Result<Json<NormalizedQuestion>, AppError> {
  let Json(body) = payload?;
  let req = body.validate()?;
  let question = logic::generate_question(&state, req).await?;
  Ok(Json(question))
}

#[instrument(level = "info", skip_all)]
pub async fn http_check_step(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<CheckStepIn>, JsonRejection>,
) -> Result<Json<CheckStepOut>, AppError> {
  let Json(body) = payload?;
  let req = body.validate()?;
  let step_check = logic::check_step(&state, req).await?;
  Ok(Json(CheckStepOut { step_check }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_explanation(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<ExplanationIn>, JsonRejection>,
) -> Result<Json<ExplanationOut>, AppError> {
  let Json(body) = payload?;
  let req = body.validate()?;
  let explanation = logic::get_explanation(&state, req).await?;
  Ok(Json(ExplanationOut { explanation }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_solution(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<SolutionIn>, JsonRejection>,
) -> Result<Json<SolutionOut>, AppError> {
  let Json(body) = payload?;
  let req = body.validate()?;
  let step_index = req.step_index;
  let solution = logic::get_solution(&state, req).await?;
  info!(step_index, tips = solution.tips.len(), "Solution served");
  Ok(Json(SolutionOut::from(solution)))
}

#[instrument(level = "info", skip_all, fields(%user_id))]
pub async fn http_get_performance(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Result<Json<PerformanceOut>, AppError> {
  let record = logic::performance_snapshot(&state, &user_id).await?;
  Ok(Json(record.into()))
}
