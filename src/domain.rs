//! Domain models: courses, the caller's profile, and the normalized results
//! handed back to the UI for each request kind.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The four IB mathematics courses a profile may be enrolled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathCourse {
  #[serde(rename = "AA SL")]
  AaSl,
  #[serde(rename = "AA HL")]
  AaHl,
  #[serde(rename = "AI SL")]
  AiSl,
  #[serde(rename = "AI HL")]
  AiHl,
}

impl MathCourse {
  /// Lenient parse: case-insensitive, ignores separators and an optional
  /// "IB" / "Math" / "Mathematics" prefix ("math_aa_hl", "IB Math AI SL").
  pub fn parse(raw: &str) -> Option<Self> {
    let compact: String = raw
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .collect::<String>()
      .to_ascii_uppercase();
    let rest = compact.strip_prefix("IB").unwrap_or(&compact);
    let rest = rest
      .strip_prefix("MATHEMATICS")
      .or_else(|| rest.strip_prefix("MATH"))
      .unwrap_or(rest);
    match rest {
      "AASL" => Some(MathCourse::AaSl),
      "AAHL" => Some(MathCourse::AaHl),
      "AISL" => Some(MathCourse::AiSl),
      "AIHL" => Some(MathCourse::AiHl),
      _ => None,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      MathCourse::AaSl => "AA SL",
      MathCourse::AaHl => "AA HL",
      MathCourse::AiSl => "AI SL",
      MathCourse::AiHl => "AI HL",
    }
  }

  /// Long name used inside prompts.
  pub fn full_name(self) -> &'static str {
    match self {
      MathCourse::AaSl => "IB Mathematics: Analysis and Approaches SL",
      MathCourse::AaHl => "IB Mathematics: Analysis and Approaches HL",
      MathCourse::AiSl => "IB Mathematics: Applications and Interpretation SL",
      MathCourse::AiHl => "IB Mathematics: Applications and Interpretation HL",
    }
  }
}

impl fmt::Display for MathCourse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Subset of the stored profile the backend reads. Unknown keys are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserProfile {
  #[serde(default, deserialize_with = "string_or_number")] pub id: Option<String>,
  #[serde(default)] pub math_course: Option<String>,
  #[serde(default)] pub course: Option<String>,
}

/// Profile ids arrive as strings from the auth provider but as numbers from
/// some older clients; both become the same tracker key.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Text(String),
    Number(serde_json::Number),
  }
  Ok(Option::<RawId>::deserialize(d)?.map(|raw| match raw {
    RawId::Text(s) => s,
    RawId::Number(n) => n.to_string(),
  }))
}

impl UserProfile {
  /// Tracker key, if the caller is identified. Blank ids count as absent.
  pub fn user_id(&self) -> Option<&str> {
    crate::util::non_blank(self.id.as_deref())
  }

  /// `math_course` wins over the legacy `course` key.
  pub fn course_raw(&self) -> Option<&str> {
    crate::util::non_blank(self.math_course.as_deref())
      .or_else(|| crate::util::non_blank(self.course.as_deref()))
  }
}

/// The `question` body field: either plain text or a question object
/// previously produced by `/generate-question` (only its text is used).
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum QuestionInput {
  Text(String),
  Structured { question: String },
}

impl QuestionInput {
  pub fn text(&self) -> &str {
    match self {
      QuestionInput::Text(t) => t,
      QuestionInput::Structured { question, .. } => question,
    }
  }
}

/// A step is referenced either by its text or by its (zero-based) index.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum StepRef {
  Index(u32),
  Text(String),
}

impl StepRef {
  pub fn is_blank(&self) -> bool {
    matches!(self, StepRef::Text(t) if t.trim().is_empty())
  }
}

impl fmt::Display for StepRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepRef::Index(i) => write!(f, "Step {}", i.saturating_add(1)),
      StepRef::Text(t) => f.write_str(t.trim()),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetails {
  pub topic: String,
  pub subtopic: String,
  pub difficulty: String,
  pub exam_style: String,
  pub expected_steps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuestion {
  pub question: String,
  pub details: QuestionDetails,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptualUnderstanding {
  Strong,
  #[default]
  Moderate,
  Weak,
}

impl ConceptualUnderstanding {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "strong" => Some(Self::Strong),
      "moderate" => Some(Self::Moderate),
      "weak" => Some(Self::Weak),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedStepCheck {
  pub is_correct: bool,
  pub feedback: String,
  pub can_continue: bool,
  pub conceptual_understanding: ConceptualUnderstanding,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_question_difficulty: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedExplanation {
  pub hint: String,
  pub concept_explanation: String,
  pub prerequisites: Vec<String>,
  pub common_mistakes: Vec<String>,
  pub next_steps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedSolution {
  pub explanation: String,
  pub working: String,
  pub tips: Vec<String>,
}
