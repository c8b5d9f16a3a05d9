//! The text-generation seam. Request flows only see this trait, so tests can
//! plug in a scripted generator and the provider can be swapped.

use async_trait::async_trait;

use crate::config::GenerationSettings;
use crate::error::UpstreamError;

/// One role-tagged completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
  pub system: String,
  pub user: String,
  pub max_tokens: u32,
  pub temperature: f32,
}

impl GenerationRequest {
  pub fn new(system: impl Into<String>, user: impl Into<String>, settings: &GenerationSettings) -> Self {
    Self {
      system: system.into(),
      user: user.into(),
      max_tokens: settings.max_tokens,
      temperature: settings.temperature,
    }
  }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
  /// Raw model text for `request`. Errors only for transport/provider failures.
  async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;

  /// Name used in logs.
  fn describe(&self) -> String {
    "text-generator".into()
  }
}
