pub mod providers;
pub mod retry;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Role context sent as the system message, if the backend supports one.
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.2,
            max_output_tokens: 2000,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

/// The result of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Total tokens consumed, when the backend reports usage.
    pub tokens: Option<u64>,
    pub model: String,
}

/// Common interface for text-generation backends.
///
/// Implementations hold no per-call state beyond a reusable HTTP client.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Generate text for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError>;
}

#[async_trait::async_trait]
impl<P: LlmProvider + ?Sized> LlmProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        (**self).generate(request).await
    }
}
