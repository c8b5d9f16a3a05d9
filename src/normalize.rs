//! Turning free-form model text into the typed results the UI consumes.
//!
//! The model is asked for a single JSON object but may wrap it in prose or
//! markdown fences, or stop mid-object. `extract_structured` takes the span
//! from the first `{` to the last `}` and parses it once; it does not repair
//! anything. Callers rely on it failing predictably on broken input:
//! question/step-check/explanation surface the failure, the solution
//! normalizer substitutes a fallback instead.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{
  ConceptualUnderstanding, NormalizedExplanation, NormalizedQuestion, NormalizedSolution,
  NormalizedStepCheck, QuestionDetails,
};
use crate::error::AppError;
use crate::util::{first_nonempty_line, trunc_for_log};

const LOG_PREVIEW: usize = 160;

/// Single generic step used when the model lists none.
pub const GENERIC_EXPECTED_STEP: &str = "Work through the problem and state your final answer.";

/// Tips used when a parsed solution has nothing usable in it.
pub const SOLUTION_CHECKLIST: [&str; 3] = [
  "Re-read the question and identify exactly what is being asked.",
  "Write down the formula or rule you need before substituting values.",
  "Check each calculation and the form of your final answer.",
];

pub const MISSING_WORKING: &str = "No working was provided for this step.";

fn json_span() -> &'static Regex {
  static SPAN: OnceLock<Regex> = OnceLock::new();
  // Greedy: first `{` through last `}`.
  SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex compiles"))
}

/// Best-effort recovery of the JSON object embedded in `raw`.
/// `None` when there is no `{...}` span or the span does not parse.
pub fn extract_structured(raw: &str) -> Option<Value> {
  let Some(span) = json_span().find(raw) else {
    warn!(target: "normalize", raw = %trunc_for_log(raw, LOG_PREVIEW), "No JSON object in model output");
    return None;
  };
  match serde_json::from_str::<Value>(span.as_str()) {
    Ok(v) => Some(v),
    Err(e) => {
      warn!(target: "normalize", error = %e, raw = %trunc_for_log(raw, LOG_PREVIEW), "Failed to parse JSON span");
      None
    }
  }
}

// -------- field helpers --------

/// Non-blank text from a string or scalar value.
fn as_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
  obj.get(key).and_then(as_text)
}

/// A list of strings; a lone string becomes a one-item list, blanks are dropped.
fn string_list(v: Option<&Value>) -> Vec<String> {
  match v {
    Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
    Some(other) => as_text(other).into_iter().collect(),
    None => Vec::new(),
  }
}

fn unparsable() -> AppError {
  AppError::MalformedResponse("model output did not contain a parsable JSON object".into())
}

// -------- per-request normalizers --------

/// `{ question, details }`. Both are required; no question is ever invented.
pub fn normalize_question(raw: &str, fallback_topic: &str) -> Result<NormalizedQuestion, AppError> {
  let value = extract_structured(raw).ok_or_else(unparsable)?;
  let question = value.get("question").and_then(as_text).ok_or(AppError::MissingField("question"))?;
  let details = value
    .get("details")
    .and_then(Value::as_object)
    .ok_or(AppError::MissingField("details"))?;

  let mut expected_steps = string_list(details.get("expectedSteps"));
  if expected_steps.is_empty() {
    debug!(target: "normalize", "Question has no expectedSteps; inserting generic step");
    expected_steps.push(GENERIC_EXPECTED_STEP.to_string());
  }

  Ok(NormalizedQuestion {
    question,
    details: QuestionDetails {
      topic: text_field(details, "topic").unwrap_or_else(|| fallback_topic.to_string()),
      subtopic: text_field(details, "subtopic").unwrap_or_default(),
      difficulty: text_field(details, "difficulty").unwrap_or_default(),
      exam_style: text_field(details, "examStyle").unwrap_or_default(),
      expected_steps,
    },
  })
}

/// `{ stepCheck: { isCorrect, ... } }`. `nextQuestionDifficulty` is left for
/// the caller to fill from the tracker.
pub fn normalize_step_check(raw: &str) -> Result<NormalizedStepCheck, AppError> {
  let value = extract_structured(raw).ok_or_else(unparsable)?;
  let check = value
    .get("stepCheck")
    .and_then(Value::as_object)
    .ok_or(AppError::MissingField("stepCheck"))?;
  let is_correct = check
    .get("isCorrect")
    .and_then(Value::as_bool)
    .ok_or(AppError::MissingField("stepCheck.isCorrect"))?;

  Ok(NormalizedStepCheck {
    is_correct,
    feedback: text_field(check, "feedback").unwrap_or_default(),
    can_continue: check.get("canContinue").and_then(Value::as_bool).unwrap_or(is_correct),
    conceptual_understanding: check
      .get("conceptualUnderstanding")
      .and_then(Value::as_str)
      .and_then(ConceptualUnderstanding::parse)
      .unwrap_or_default(),
    next_question_difficulty: None,
  })
}

/// `{ explanation: { hint, conceptExplanation, prerequisites, commonMistakes, nextSteps } }`.
pub fn normalize_explanation(raw: &str) -> Result<NormalizedExplanation, AppError> {
  let value = extract_structured(raw).ok_or_else(unparsable)?;
  let exp = value
    .get("explanation")
    .and_then(Value::as_object)
    .ok_or(AppError::MissingField("explanation"))?;

  Ok(NormalizedExplanation {
    hint: text_field(exp, "hint").unwrap_or_default(),
    concept_explanation: text_field(exp, "conceptExplanation").unwrap_or_default(),
    prerequisites: string_list(exp.get("prerequisites")),
    common_mistakes: string_list(exp.get("commonMistakes")),
    next_steps: string_list(exp.get("nextSteps")),
  })
}

/// Always yields a solution.
///
/// - nothing parsable: first line as explanation, raw text as working, one tip naming the step;
/// - parsed but none of `explanation`/`working`/`tips` usable: raw text as working plus the checklist;
/// - otherwise each missing field is filled on its own.
///
/// The model sometimes nests its answer under `solution`; that level is unwrapped first.
pub fn normalize_solution(raw: &str, step_index: u32) -> NormalizedSolution {
  let step_no = step_index.saturating_add(1);
  let raw_trimmed = raw.trim();

  let Some(value) = extract_structured(raw) else {
    warn!(target: "normalize", step_no, "Solution not parsable; using raw-text fallback");
    return NormalizedSolution {
      explanation: first_or(raw_trimmed, step_no),
      working: raw.to_string(),
      tips: vec![format!("Compare your working for step {step_no} with the solution above.")],
    };
  };

  let payload = match value.get("solution") {
    Some(inner @ Value::Object(_)) => inner,
    _ => &value,
  };
  let explanation = payload.get("explanation").and_then(as_text);
  let working = payload.get("working").and_then(as_text);
  let tips = string_list(payload.get("tips"));

  if explanation.is_none() && working.is_none() && tips.is_empty() {
    warn!(target: "normalize", step_no, "Solution payload unusable; using checklist fallback");
    return NormalizedSolution {
      explanation: first_or(raw_trimmed, step_no),
      working: raw.to_string(),
      tips: SOLUTION_CHECKLIST.iter().map(|s| s.to_string()).collect(),
    };
  }

  NormalizedSolution {
    explanation: explanation.unwrap_or_else(|| format!("Solution for step {step_no}")),
    working: working.unwrap_or_else(|| MISSING_WORKING.to_string()),
    tips: if tips.is_empty() {
      vec![format!("Review step {step_no} and check each calculation.")]
    } else {
      tips
    },
  }
}

fn first_or(raw: &str, step_no: u32) -> String {
  match first_nonempty_line(raw) {
    "" => format!("Solution for step {step_no}"),
    line => line.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn extracts_object_surrounded_by_noise() {
    assert_eq!(extract_structured(r#"noise {"a":1} more noise"#), Some(json!({"a": 1})));
  }

  #[test]
  fn extracts_from_markdown_fence() {
    let raw = "Sure! Here it is:\n```json\n{\"question\": \"x\", \"details\": {}}\n```";
    assert_eq!(extract_structured(raw), Some(json!({"question": "x", "details": {}})));
  }

  #[test]
  fn no_braces_or_broken_json_is_none() {
    assert_eq!(extract_structured("no json here"), None);
    assert_eq!(extract_structured("} backwards {"), None);
    assert_eq!(extract_structured(r#"{"a": 1, "b": "#), None);
    assert_eq!(extract_structured(r#"{"a": 1,}"#), None);
  }

  #[test]
  fn greedy_span_fails_on_two_objects() {
    // First `{` to last `}` covers both objects, which is not valid JSON.
    assert_eq!(extract_structured(r#"{"a":1} and {"b":2}"#), None);
  }

  #[test]
  fn question_requires_question_and_details() {
    let err = normalize_question(r#"{"details": {}}"#, "Algebra").unwrap_err();
    assert!(matches!(err, AppError::MissingField("question")));
    let err = normalize_question(r#"{"question": "Solve x"}"#, "Algebra").unwrap_err();
    assert!(matches!(err, AppError::MissingField("details")));
    let err = normalize_question(r#"{"question": "  ", "details": {}}"#, "Algebra").unwrap_err();
    assert!(matches!(err, AppError::MissingField("question")));
    let err = normalize_question("nothing", "Algebra").unwrap_err();
    assert!(matches!(err, AppError::MalformedResponse(_)));
  }

  #[test]
  fn question_details_fill_defaults() {
    let raw = r#"{"question": "Calculus\nDifferentiate x^3", "details": {"difficulty": 6, "expectedSteps": ["Apply power rule", 3, ""]}}"#;
    let q = normalize_question(raw, "Calculus").unwrap();
    assert_eq!(q.details.topic, "Calculus");
    assert_eq!(q.details.difficulty, "6");
    assert_eq!(q.details.subtopic, "");
    assert_eq!(q.details.expected_steps, vec!["Apply power rule".to_string(), "3".to_string()]);

    let q = normalize_question(r#"{"question": "Q", "details": {"topic": "Vectors"}}"#, "x").unwrap();
    assert_eq!(q.details.topic, "Vectors");
    assert_eq!(q.details.expected_steps, vec![GENERIC_EXPECTED_STEP.to_string()]);
  }

  #[test]
  fn step_check_requires_boolean_is_correct() {
    let err = normalize_step_check(r#"{"stepCheck": {"isCorrect": "yes"}}"#).unwrap_err();
    assert!(matches!(err, AppError::MissingField("stepCheck.isCorrect")));
    let err = normalize_step_check(r#"{"feedback": "ok"}"#).unwrap_err();
    assert!(matches!(err, AppError::MissingField("stepCheck")));
  }

  #[test]
  fn step_check_defaults() {
    let sc = normalize_step_check(r#"{"stepCheck": {"isCorrect": false, "conceptualUnderstanding": "WEAK"}}"#).unwrap();
    assert!(!sc.is_correct);
    assert!(!sc.can_continue);
    assert_eq!(sc.feedback, "");
    assert_eq!(sc.conceptual_understanding, ConceptualUnderstanding::Weak);
    assert_eq!(sc.next_question_difficulty, None);

    let sc = normalize_step_check(r#"{"stepCheck": {"isCorrect": true, "conceptualUnderstanding": "great"}}"#).unwrap();
    assert!(sc.can_continue);
    assert_eq!(sc.conceptual_understanding, ConceptualUnderstanding::Moderate);
  }

  #[test]
  fn explanation_lists_accept_single_strings() {
    let raw = r#"{"explanation": {"hint": "Factor first", "prerequisites": "Quadratics", "nextSteps": ["a", "b"]}}"#;
    let e = normalize_explanation(raw).unwrap();
    assert_eq!(e.hint, "Factor first");
    assert_eq!(e.prerequisites, vec!["Quadratics".to_string()]);
    assert!(e.common_mistakes.is_empty());
    assert_eq!(e.next_steps.len(), 2);
    assert!(matches!(normalize_explanation(r#"{"hint": "x"}"#), Err(AppError::MissingField("explanation"))));
  }

  #[test]
  fn solution_without_json_uses_raw_text() {
    let raw = "First, expand the bracket.\nThen collect like terms to get 3x + 2.";
    let s = normalize_solution(raw, 1);
    assert_eq!(s.explanation, "First, expand the bracket.");
    assert_eq!(s.working, raw);
    assert_eq!(s.tips.len(), 1);
    assert!(s.tips[0].contains("step 2"));
  }

  #[test]
  fn solution_nested_with_missing_fields_is_filled() {
    let s = normalize_solution(r#"{"solution": {"explanation": "E"}}"#, 0);
    assert_eq!(s.explanation, "E");
    assert_eq!(s.working, MISSING_WORKING);
    assert_eq!(s.tips, vec!["Review step 1 and check each calculation.".to_string()]);
  }

  #[test]
  fn solution_flat_object_is_used_directly() {
    let s = normalize_solution(r#"{"explanation": "E", "working": "W", "tips": ["t1", "t2"]}"#, 3);
    assert_eq!(s, NormalizedSolution {
      explanation: "E".into(),
      working: "W".into(),
      tips: vec!["t1".into(), "t2".into()],
    });
  }

  #[test]
  fn solution_with_nothing_usable_gets_checklist() {
    let raw = r#"Here you go {"answer": 42}"#;
    let s = normalize_solution(raw, 0);
    assert_eq!(s.tips.len(), 3);
    assert_eq!(s.working, raw);
    assert_eq!(s.explanation, raw);
  }

  #[test]
  fn solution_of_empty_text_still_has_content() {
    let s = normalize_solution("", 4);
    assert_eq!(s.explanation, "Solution for step 5");
    assert_eq!(s.working, "");
    assert!(!s.tips.is_empty());
  }

  #[test]
  fn solution_with_non_object_nested_solution_gets_checklist() {
    // `solution` is a string, so the outer object is the payload and it has no usable field.
    let raw = r#"{"solution": "x = 3"}"#;
    let s = normalize_solution(raw, 0);
    assert_eq!(s.tips, SOLUTION_CHECKLIST.iter().map(|t| t.to_string()).collect::<Vec<_>>());
    assert_eq!(s.working, raw);
  }

  #[test]
  fn solution_for_last_representable_step_index_does_not_overflow() {
    let s = normalize_solution(r#"{"explanation": "E"}"#, u32::MAX);
    assert_eq!(s.tips, vec![format!("Review step {} and check each calculation.", u32::MAX)]);
    let s = normalize_solution("plain text", u32::MAX);
    assert!(s.tips[0].contains(&u32::MAX.to_string()));
  }
}
