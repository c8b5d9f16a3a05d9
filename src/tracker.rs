//! Adaptive difficulty tracking.
//!
//! Each user owns one `PerformanceRecord`; each topic they attempt gets a
//! `TopicStats` whose `difficulty` walks inside `[min, max]`. Moves are gated
//! on streaks: once `streak_threshold` same-outcome answers are in a row,
//! every further answer of that outcome moves the difficulty again (raise on
//! correct, lower on incorrect). A single answer never moves it.
//!
//! Concurrency: the user table is only locked to look up or insert a user's
//! handle; every update then runs under that user's own mutex, so two
//! step-checks for one user never interleave their read-modify-write while
//! different users proceed independently.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

/// Numeric policy of the tracker. Loadable from the `[tracker]` TOML section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DifficultyPolicy {
  pub initial_difficulty: f64,
  pub min_difficulty: f64,
  pub max_difficulty: f64,
  pub streak_threshold: u32,
  pub raise_step: f64,
  pub lower_step: f64,
}

impl Default for DifficultyPolicy {
  fn default() -> Self {
    Self {
      initial_difficulty: 5.0,
      min_difficulty: 1.0,
      max_difficulty: 10.0,
      streak_threshold: 2,
      raise_step: 0.5,
      lower_step: 1.0,
    }
  }
}

impl DifficultyPolicy {
  pub fn is_valid(&self) -> bool {
    self.min_difficulty <= self.max_difficulty
      && (self.min_difficulty..=self.max_difficulty).contains(&self.initial_difficulty)
      && self.streak_threshold >= 1
      && self.raise_step > 0.0
      && self.lower_step > 0.0
  }

  /// The policy itself if usable, the defaults otherwise.
  pub fn or_default_if_invalid(self) -> Self {
    if self.is_valid() {
      self
    } else {
      warn!(target: "tracker", policy = ?self, "Invalid difficulty policy; using defaults");
      Self::default()
    }
  }

  fn clamp(&self, d: f64) -> f64 {
    d.clamp(self.min_difficulty, self.max_difficulty)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
  pub difficulty: f64,
  pub consecutive_correct: u32,
  pub consecutive_incorrect: u32,
  pub total_attempts: u32,
  pub correct_attempts: u32,
}

impl TopicStats {
  fn new(initial: f64) -> Self {
    Self {
      difficulty: initial,
      consecutive_correct: 0,
      consecutive_incorrect: 0,
      total_attempts: 0,
      correct_attempts: 0,
    }
  }

  /// Share of correct attempts as a percentage, `None` before the first attempt.
  pub fn success_rate(&self) -> Option<f64> {
    if self.total_attempts == 0 {
      None
    } else {
      Some(self.correct_attempts as f64 * 100.0 / self.total_attempts as f64)
    }
  }

  fn apply(&mut self, is_correct: bool, policy: &DifficultyPolicy) {
    self.total_attempts += 1;
    if is_correct {
      self.correct_attempts += 1;
      self.consecutive_correct += 1;
      self.consecutive_incorrect = 0;
      if self.consecutive_correct >= policy.streak_threshold {
        self.difficulty += policy.raise_step;
      }
    } else {
      self.consecutive_incorrect += 1;
      self.consecutive_correct = 0;
      if self.consecutive_incorrect >= policy.streak_threshold {
        self.difficulty -= policy.lower_step;
      }
    }
    self.difficulty = policy.clamp(self.difficulty);
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
  pub user_id: String,
  pub topics: HashMap<String, TopicStats>,
  pub overall_difficulty: f64,
}

impl PerformanceRecord {
  pub fn new(user_id: impl Into<String>, policy: &DifficultyPolicy) -> Self {
    Self {
      user_id: user_id.into(),
      topics: HashMap::new(),
      overall_difficulty: policy.initial_difficulty,
    }
  }

  /// Apply one outcome to `topic` and return the topic's new difficulty.
  pub fn record(&mut self, topic: &str, is_correct: bool, policy: &DifficultyPolicy) -> f64 {
    let stats = self
      .topics
      .entry(topic.to_string())
      .or_insert_with(|| TopicStats::new(policy.initial_difficulty));
    stats.apply(is_correct, policy);
    let difficulty = stats.difficulty;
    self.recompute_overall(policy);
    difficulty
  }

  fn recompute_overall(&mut self, policy: &DifficultyPolicy) {
    self.overall_difficulty = if self.topics.is_empty() {
      policy.initial_difficulty
    } else {
      self.topics.values().map(|t| t.difficulty).sum::<f64>() / self.topics.len() as f64
    };
  }
}

/// Owner of every user's record for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
  policy: DifficultyPolicy,
  records: RwLock<HashMap<String, Arc<Mutex<PerformanceRecord>>>>,
}

impl PerformanceTracker {
  pub fn new(policy: DifficultyPolicy) -> Self {
    Self { policy, records: RwLock::new(HashMap::new()) }
  }

  /// Record one step outcome and return the topic's post-update difficulty.
  #[instrument(level = "debug", skip_all, fields(%user_id, %topic, is_correct))]
  pub async fn record_outcome(&self, user_id: &str, topic: &str, is_correct: bool) -> f64 {
    let handle = self.handle_for(user_id).await;
    let mut record = handle.lock().await;
    let before = record.topics.get(topic).map(|t| t.difficulty);
    let after = record.record(topic, is_correct, &self.policy);
    debug!(
      target: "tracker",
      %user_id, %topic, is_correct,
      before = ?before, after,
      overall = record.overall_difficulty,
      "Recorded step outcome"
    );
    after
  }

  /// Read-only view of one topic. Never creates records.
  pub async fn topic_stats(&self, user_id: &str, topic: &str) -> Option<TopicStats> {
    let handle = { self.records.read().await.get(user_id).cloned() }?;
    let record = handle.lock().await;
    record.topics.get(topic).cloned()
  }

  /// Copy of a user's full record, if one exists.
  pub async fn snapshot(&self, user_id: &str) -> Option<PerformanceRecord> {
    let handle = { self.records.read().await.get(user_id).cloned() }?;
    let record = handle.lock().await;
    Some(record.clone())
  }

  async fn handle_for(&self, user_id: &str) -> Arc<Mutex<PerformanceRecord>> {
    if let Some(h) = self.records.read().await.get(user_id) {
      return h.clone();
    }
    let mut records = self.records.write().await;
    records
      .entry(user_id.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(PerformanceRecord::new(user_id, &self.policy))))
      .clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tracker() -> PerformanceTracker {
    PerformanceTracker::new(DifficultyPolicy::default())
  }

  #[tokio::test]
  async fn single_correct_does_not_move_difficulty() {
    let t = tracker();
    assert_eq!(t.record_outcome("u", "Calculus", true).await, 5.0);
  }

  #[tokio::test]
  async fn correct_streak_raises_on_every_answer_past_threshold() {
    let t = tracker();
    t.record_outcome("u", "Calculus", true).await;
    assert_eq!(t.record_outcome("u", "Calculus", true).await, 5.5);
    assert_eq!(t.record_outcome("u", "Calculus", true).await, 6.0);
    let s = t.topic_stats("u", "Calculus").await.unwrap();
    assert_eq!(s.consecutive_correct, 3);
    assert_eq!(s.consecutive_incorrect, 0);
    assert_eq!((s.total_attempts, s.correct_attempts), (3, 3));
  }

  #[tokio::test]
  async fn incorrect_streak_lowers_and_clamps_at_one() {
    let t = tracker();
    let mut seen = vec![];
    for _ in 0..8 {
      seen.push(t.record_outcome("u", "Vectors", false).await);
    }
    assert_eq!(seen, vec![5.0, 4.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0]);
    let s = t.topic_stats("u", "Vectors").await.unwrap();
    assert_eq!((s.total_attempts, s.correct_attempts), (8, 0));
  }

  #[tokio::test]
  async fn opposite_outcome_resets_the_streak() {
    let t = tracker();
    t.record_outcome("u", "Algebra", true).await;
    t.record_outcome("u", "Algebra", true).await; // 5.5
    assert_eq!(t.record_outcome("u", "Algebra", false).await, 5.5);
    let s = t.topic_stats("u", "Algebra").await.unwrap();
    assert_eq!((s.consecutive_correct, s.consecutive_incorrect), (0, 1));
    assert_eq!(t.record_outcome("u", "Algebra", true).await, 5.5);
  }

  #[tokio::test]
  async fn difficulty_stays_in_bounds_for_long_mixed_sequences() {
    let t = tracker();
    // Deterministic pseudo-random outcome stream.
    let mut x: u32 = 12345;
    for _ in 0..500 {
      x = x.wrapping_mul(1103515245).wrapping_add(12345);
      let d = t.record_outcome("u", "Stats", (x >> 16) % 3 != 0).await;
      assert!((1.0..=10.0).contains(&d), "difficulty {d} escaped bounds");
    }
    let s = t.topic_stats("u", "Stats").await.unwrap();
    assert_eq!(s.total_attempts, 500);
    assert!(s.consecutive_correct == 0 || s.consecutive_incorrect == 0);
  }

  #[tokio::test]
  async fn raises_clamp_at_ten() {
    let t = tracker();
    let mut last = 0.0;
    for _ in 0..20 {
      last = t.record_outcome("u", "Calculus", true).await;
    }
    assert_eq!(last, 10.0);
  }

  #[tokio::test]
  async fn overall_is_mean_of_topics() {
    let t = tracker();
    for _ in 0..3 {
      t.record_outcome("u", "A", true).await; // ends 6.0
    }
    for _ in 0..2 {
      t.record_outcome("u", "B", false).await; // ends 4.0
    }
    t.record_outcome("u", "C", true).await; // stays 5.0
    let rec = t.snapshot("u").await.unwrap();
    assert_eq!(rec.overall_difficulty, 5.0);
    assert_eq!(rec.topics.len(), 3);
  }

  #[tokio::test]
  async fn identical_sequences_give_identical_stats() {
    let seq = [true, true, false, false, false, true, true, true, false];
    let a = tracker();
    let b = tracker();
    for &o in &seq {
      a.record_outcome("u", "T", o).await;
      b.record_outcome("v", "T", o).await;
    }
    assert_eq!(a.topic_stats("u", "T").await, b.topic_stats("v", "T").await);
  }

  #[tokio::test]
  async fn lookups_do_not_create_records() {
    let t = tracker();
    assert!(t.topic_stats("ghost", "T").await.is_none());
    assert!(t.snapshot("ghost").await.is_none());
    t.record_outcome("u", "T", true).await;
    assert!(t.topic_stats("u", "Other").await.is_none());
    assert_eq!(t.snapshot("u").await.unwrap().topics.len(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_updates_for_one_user_keep_overall_consistent() {
    let t = Arc::new(tracker());
    let topics = ["A", "B", "C", "D"];
    let mut tasks = vec![];
    for i in 0..200u32 {
      let t = t.clone();
      let topic = topics[(i % 4) as usize];
      // A and B only ever see correct answers, C and D only incorrect.
      let correct = matches!(topic, "A" | "B");
      tasks.push(tokio::spawn(async move { t.record_outcome("same-user", topic, correct).await }));
    }
    for task in tasks {
      task.await.unwrap();
    }
    let rec = t.snapshot("same-user").await.unwrap();
    let mean = rec.topics.values().map(|s| s.difficulty).sum::<f64>() / rec.topics.len() as f64;
    assert_eq!(rec.overall_difficulty, mean);
    assert_eq!(rec.topics.values().map(|s| s.total_attempts).sum::<u32>(), 200);
    assert_eq!(rec.topics["A"].difficulty, 10.0);
    assert_eq!(rec.topics["C"].difficulty, 1.0);
  }

  #[test]
  fn invalid_policy_falls_back_to_defaults() {
    let bad = DifficultyPolicy { min_difficulty: 8.0, max_difficulty: 2.0, ..Default::default() };
    assert!(!bad.is_valid());
    assert_eq!(bad.or_default_if_invalid(), DifficultyPolicy::default());
    let zero = DifficultyPolicy { streak_threshold: 0, ..Default::default() };
    assert!(!zero.is_valid());
  }

  #[test]
  fn success_rate_is_a_percentage() {
    let mut s = TopicStats::new(5.0);
    assert_eq!(s.success_rate(), None);
    let p = DifficultyPolicy::default();
    s.apply(true, &p);
    s.apply(false, &p);
    s.apply(true, &p);
    let rate = s.success_rate().unwrap();
    assert!((rate - 66.666).abs() < 0.01);
  }
}
