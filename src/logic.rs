//! Request flows behind the HTTP handlers.
//!
//! Each flow builds a prompt, awaits the generator, and hands the raw text to
//! `normalize`. Step checks additionally feed the tracker; explanations and
//! question generation only read from it.

use tracing::{debug, info, instrument};

use crate::domain::{NormalizedExplanation, NormalizedQuestion, NormalizedSolution, NormalizedStepCheck};
use crate::error::AppError;
use crate::normalize::{normalize_explanation, normalize_question, normalize_solution, normalize_step_check};
use crate::protocol::{ExplanationRequest, QuestionRequest, SolutionRequest, StepCheckRequest};
use crate::state::AppState;
use crate::topic::{derive_topic, prompt_topic};
use crate::tracker::PerformanceRecord;
use crate::util::fill_template;

#[instrument(level = "info", skip(state, req), fields(course = %req.course, has_user = req.user_id.is_some()))]
pub async fn generate_question(state: &AppState, req: QuestionRequest<'_>) -> Result<NormalizedQuestion, AppError> {
  let topic = prompt_topic(req.prompt);

  let mut difficulty_context = String::new();
  if let Some(user_id) = req.user_id {
    if let Some(stats) = state.tracker.topic_stats(user_id, &topic).await {
      difficulty_context = format!(
        "The student's current difficulty level for this topic is {:.1} on a scale of 1 to 10; pitch the question at that level.",
        stats.difficulty
      );
    }
  }

  let user = fill_template(
    &state.prompts.question_user_template,
    &[
      ("topic", topic.as_str()),
      ("course", req.course.full_name()),
      ("request", req.prompt),
      ("difficulty_context", difficulty_context.as_str()),
    ],
  );
  let raw = state.generate(&state.prompts.question_system, user).await?;
  let question = normalize_question(&raw, &topic)?;
  info!(%topic, steps = question.details.expected_steps.len(), "Question generated");
  Ok(question)
}

#[instrument(level = "info", skip(state, req), fields(step = req.current_step, has_user = req.user_id.is_some()))]
pub async fn check_step(state: &AppState, req: StepCheckRequest<'_>) -> Result<NormalizedStepCheck, AppError> {
  let step_number = req.current_step.saturating_add(1).to_string();
  let user = fill_template(
    &state.prompts.step_check_user_template,
    &[("question", req.question), ("step_number", step_number.as_str()), ("answer", req.answer)],
  );
  let raw = state.generate(&state.prompts.step_check_system, user).await?;
  let mut check = normalize_step_check(&raw)?;

  if let Some(user_id) = req.user_id {
    let topic = derive_topic(req.question);
    let difficulty = state.tracker.record_outcome(user_id, &topic, check.is_correct).await;
    check.next_question_difficulty = Some(difficulty);
  }
  info!(is_correct = check.is_correct, next_difficulty = ?check.next_question_difficulty, "Step checked");
  Ok(check)
}

#[instrument(level = "info", skip(state, req), fields(has_user = req.user_id.is_some()))]
pub async fn get_explanation(state: &AppState, req: ExplanationRequest<'_>) -> Result<NormalizedExplanation, AppError> {
  let performance_context = match req.user_id {
    Some(user_id) => performance_context(state, user_id, req.question).await,
    None => String::new(),
  };
  let step = req.step.to_string();
  let user = fill_template(
    &state.prompts.explanation_user_template,
    &[
      ("question", req.question),
      ("step", step.as_str()),
      ("performance_context", performance_context.as_str()),
    ],
  );
  let raw = state.generate(&state.prompts.explanation_system, user).await?;
  normalize_explanation(&raw)
}

/// Only upstream failures are errors here; unusable model text becomes a fallback solution.
#[instrument(level = "info", skip(state, req), fields(step_index = req.step_index))]
pub async fn get_solution(state: &AppState, req: SolutionRequest<'_>) -> Result<NormalizedSolution, AppError> {
  let step = req.step.to_string();
  let step_number = req.step_index.saturating_add(1).to_string();
  let user = fill_template(
    &state.prompts.solution_user_template,
    &[("question", req.question), ("step", step.as_str()), ("step_number", step_number.as_str())],
  );
  let raw = state.generate(&state.prompts.solution_system, user).await?;
  Ok(normalize_solution(&raw, req.step_index))
}

pub async fn performance_snapshot(state: &AppState, user_id: &str) -> Result<PerformanceRecord, AppError> {
  state
    .tracker
    .snapshot(user_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("No performance record for user '{user_id}'")))
}

/// Prior stats for the question's topic, as prompt text. Read-only.
async fn performance_context(state: &AppState, user_id: &str, question: &str) -> String {
  let topic = derive_topic(question);
  let Some(stats) = state.tracker.topic_stats(user_id, &topic).await else {
    debug!(%topic, "No prior stats for explanation context");
    return String::new();
  };
  match stats.success_rate() {
    Some(rate) => format!(
      "Student context for {topic}: current difficulty {:.1}/10, success rate {:.1}%. Adjust the depth of the hint accordingly.",
      stats.difficulty, rate
    ),
    None => String::new(),
  }
}
