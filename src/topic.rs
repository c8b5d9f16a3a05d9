//! Topic keys for difficulty tracking.
//!
//! Topics are not sent explicitly by the UI; they are read off the text by
//! convention. Question prompts look like `"Calculus: differentiate ..."` and
//! generated questions start with a one-line topic header. Both conventions
//! live here so the rest of the crate never slices strings for topics.

/// Key used when the text carries no usable topic.
pub const DEFAULT_TOPIC: &str = "General";

/// Topic of a question: its first line, trimmed.
pub fn derive_topic(source: &str) -> String {
  let first = source.split('\n').next().unwrap_or("").trim();
  or_default(first)
}

/// Topic of a question-generation prompt: the text before the first colon.
/// A prompt without a colon is used whole.
pub fn prompt_topic(prompt: &str) -> String {
  let head = prompt.split(':').next().unwrap_or("").trim();
  or_default(head)
}

fn or_default(s: &str) -> String {
  if s.is_empty() { DEFAULT_TOPIC.to_string() } else { s.to_string() }
}
