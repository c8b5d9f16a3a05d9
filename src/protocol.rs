//! Public protocol structs for the HTTP endpoints (serde ready).
//! Request fields are optional at the serde level so missing ones are reported
//! through the uniform error envelope instead of an extractor rejection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    MathCourse, NormalizedExplanation, NormalizedSolution, NormalizedStepCheck, QuestionInput,
    StepRef, UserProfile,
};
use crate::error::AppError;
use crate::tracker::{PerformanceRecord, TopicStats};

fn missing(field: &str) -> AppError {
    AppError::Validation(format!("Missing required field: {field}"))
}

fn required_question(q: &Option<QuestionInput>) -> Result<&QuestionInput, AppError> {
    match q {
        Some(q) if !q.text().trim().is_empty() => Ok(q),
        _ => Err(missing("question")),
    }
}

fn required_step(s: &Option<StepRef>) -> Result<&StepRef, AppError> {
    match s {
        Some(s) if !s.is_blank() => Ok(s),
        _ => Err(missing("step")),
    }
}

//
// POST /generate-question
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionIn {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

/// Validated question-generation request.
#[derive(Debug)]
pub struct QuestionRequest<'a> {
    pub prompt: &'a str,
    pub course: MathCourse,
    pub user_id: Option<&'a str>,
}

impl GenerateQuestionIn {
    pub fn validate(&self) -> Result<QuestionRequest<'_>, AppError> {
        let prompt = crate::util::non_blank(self.prompt.as_deref()).ok_or_else(|| missing("prompt"))?;
        let profile = self.user_profile.as_ref().ok_or_else(|| missing("userProfile"))?;
        let raw = profile
            .course_raw()
            .ok_or_else(|| missing("userProfile.math_course"))?;
        let course = MathCourse::parse(raw).ok_or_else(|| {
            AppError::Validation(format!(
                "Unrecognized math_course '{raw}'; expected one of AA SL, AA HL, AI SL, AI HL"
            ))
        })?;
        Ok(QuestionRequest { prompt, course, user_id: profile.user_id() })
    }
}

//
// POST /check-step
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStepIn {
    #[serde(default)]
    pub question: Option<QuestionInput>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub step_answer: Option<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

#[derive(Debug)]
pub struct StepCheckRequest<'a> {
    pub question: &'a str,
    pub current_step: u32,
    pub answer: &'a str,
    pub user_id: Option<&'a str>,
}

impl CheckStepIn {
    pub fn validate(&self) -> Result<StepCheckRequest<'_>, AppError> {
        let question = required_question(&self.question)?.text();
        let current_step = self.current_step.ok_or_else(|| missing("currentStep"))?;
        let answer = crate::util::non_blank(self.step_answer.as_deref()).ok_or_else(|| missing("stepAnswer"))?;
        Ok(StepCheckRequest {
            question,
            current_step,
            answer,
            user_id: self.user_profile.as_ref().and_then(UserProfile::user_id),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStepOut {
    pub step_check: NormalizedStepCheck,
}

//
// POST /get-explanation
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationIn {
    #[serde(default)]
    pub question: Option<QuestionInput>,
    #[serde(default)]
    pub step: Option<StepRef>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

#[derive(Debug)]
pub struct ExplanationRequest<'a> {
    pub question: &'a str,
    pub step: &'a StepRef,
    pub user_id: Option<&'a str>,
}

impl ExplanationIn {
    pub fn validate(&self) -> Result<ExplanationRequest<'_>, AppError> {
        Ok(ExplanationRequest {
            question: required_question(&self.question)?.text(),
            step: required_step(&self.step)?,
            user_id: self.user_profile.as_ref().and_then(UserProfile::user_id),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ExplanationOut {
    pub explanation: NormalizedExplanation,
}

//
// POST /get-solution
//

/// `userProfile` may be sent but is not read: solutions do not touch the tracker.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionIn {
    #[serde(default)]
    pub question: Option<QuestionInput>,
    #[serde(default)]
    pub step: Option<StepRef>,
    #[serde(default)]
    pub step_index: Option<u32>,
}

#[derive(Debug)]
pub struct SolutionRequest<'a> {
    pub question: &'a str,
    pub step: &'a StepRef,
    pub step_index: u32,
}

impl SolutionIn {
    pub fn validate(&self) -> Result<SolutionRequest<'_>, AppError> {
        Ok(SolutionRequest {
            question: required_question(&self.question)?.text(),
            step: required_step(&self.step)?,
            step_index: self.step_index.ok_or_else(|| missing("stepIndex"))?,
        })
    }
}

/// Double-nested by convention: `{ solution: { solution: {...} } }`.
#[derive(Debug, Serialize)]
pub struct SolutionOut {
    pub solution: SolutionWrap,
}
#[derive(Debug, Serialize)]
pub struct SolutionWrap {
    pub solution: NormalizedSolution,
}

impl From<NormalizedSolution> for SolutionOut {
    fn from(solution: NormalizedSolution) -> Self {
        Self { solution: SolutionWrap { solution } }
    }
}

//
// GET /performance/:user_id, GET /health
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceOut {
    pub user_id: String,
    pub overall_difficulty: f64,
    pub topics: HashMap<String, TopicStats>,
}

impl From<PerformanceRecord> for PerformanceOut {
    fn from(r: PerformanceRecord) -> Self {
        Self { user_id: r.user_id, overall_difficulty: r.overall_difficulty, topics: r.topics }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generator: bool,
}
