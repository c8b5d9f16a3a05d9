//! IB practice backend.
//!
//! Forwards question generation, step checks, hints and step solutions to a
//! text-generation model, recovers structured results from its free-form
//! output, and tracks a per-user, per-topic difficulty level from step
//! outcomes.

pub mod config;
pub mod domain;
pub mod error;
pub mod llm;
pub mod logic;
pub mod normalize;
pub mod openai;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod topic;
pub mod tracker;
pub mod util;
