//! Loading agent configuration (prompts, generation settings, tracker policy) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::tracker::DifficultyPolicy;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationSettings,
  #[serde(default)]
  pub tracker: DifficultyPolicy,
}

/// Token budget and sampling for every upstream call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
  pub max_tokens: u32,
  pub temperature: f32,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self { max_tokens: 1024, temperature: 0.2 }
  }
}

/// Prompts sent to the model, one system + user template per request kind.
/// Placeholders are `{name}`; see each template for the ones it receives.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Question generation: {topic} {course} {request} {difficulty_context}
  pub question_system: String,
  pub question_user_template: String,
  // Step check: {question} {step_number} {answer}
  pub step_check_system: String,
  pub step_check_user_template: String,
  // Hint/explanation: {question} {step} {performance_context}
  pub explanation_system: String,
  pub explanation_user_template: String,
  // Step solution: {question} {step} {step_number}
  pub solution_system: String,
  pub solution_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are an experienced IB mathematics examiner. Respond ONLY with a single JSON object, no prose and no markdown.".into(),
      question_user_template: "Write one exam-style practice question for {course} on the topic '{topic}'.\nStudent request: {request}\n{difficulty_context}\nStart the question text with the topic name on its own first line.\nReturn JSON: {\"question\": string, \"details\": {\"topic\": string, \"subtopic\": string, \"difficulty\": string, \"examStyle\": string, \"expectedSteps\": [string]}}".into(),
      step_check_system: "You are a careful IB mathematics marker checking one step of a student's working. Respond ONLY with a single JSON object.".into(),
      step_check_user_template: "Question:\n{question}\n\nStep {step_number} answer from the student:\n{answer}\n\nReturn JSON: {\"stepCheck\": {\"isCorrect\": boolean, \"feedback\": string, \"canContinue\": boolean, \"conceptualUnderstanding\": \"Strong\" | \"Moderate\" | \"Weak\"}}. Accept equivalent forms of a correct answer.".into(),
      explanation_system: "You are a patient IB mathematics tutor. Give hints without revealing the full answer. Respond ONLY with a single JSON object.".into(),
      explanation_user_template: "Question:\n{question}\n\nThe student is stuck on: {step}\n{performance_context}\nReturn JSON: {\"explanation\": {\"hint\": string, \"conceptExplanation\": string, \"prerequisites\": [string], \"commonMistakes\": [string], \"nextSteps\": [string]}}".into(),
      solution_system: "You are an IB mathematics tutor writing a fully worked solution for a single step. Respond ONLY with a single JSON object.".into(),
      solution_user_template: "Question:\n{question}\n\nStep {step_number}: {step}\n\nReturn JSON: {\"explanation\": string, \"working\": string, \"tips\": [string]}".into(),
    }
  }
}

impl AgentConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    let mut cfg = toml::from_str::<AgentConfig>(s)?;
    cfg.tracker = cfg.tracker.or_default_if_invalid();
    Ok(cfg)
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match AgentConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "ibprep_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "ibprep_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "ibprep_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_gives_defaults() {
    let cfg = AgentConfig::from_toml_str("").unwrap();
    assert_eq!(cfg.generation, GenerationSettings::default());
    assert_eq!(cfg.tracker, DifficultyPolicy::default());
    assert!(cfg.prompts.solution_user_template.contains("{step_number}"));
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg = AgentConfig::from_toml_str(
      r#"
      [prompts]
      hint = "ignored unknown key"
      solution_system = "custom"

      [generation]
      max_tokens = 2048

      [tracker]
      raise_step = 1.0
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.solution_system, "custom");
    assert_eq!(cfg.prompts.question_system, Prompts::default().question_system);
    assert_eq!(cfg.generation.max_tokens, 2048);
    assert_eq!(cfg.generation.temperature, 0.2);
    assert_eq!(cfg.tracker.raise_step, 1.0);
    assert_eq!(cfg.tracker.lower_step, 1.0);
  }

  #[test]
  fn invalid_tracker_policy_is_replaced() {
    let cfg = AgentConfig::from_toml_str("[tracker]\ninitial_difficulty = 42.0\n").unwrap();
    assert_eq!(cfg.tracker, DifficultyPolicy::default());
  }

  #[test]
  fn malformed_toml_is_an_error() {
    assert!(AgentConfig::from_toml_str("[generation\nmax_tokens = ").is_err());
  }
}
