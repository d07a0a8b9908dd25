use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which hosted or local backend generates summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl FromStr for ProviderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Invalid(format!(
                "Unknown provider mode: {other}. Use: openai, anthropic, ollama"
            ))),
        }
    }
}

/// Top-level Sift configuration, matching `sift.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiftConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub triage: TriageSection,
    #[serde(default)]
    pub cost: CostSection,
    #[serde(default)]
    pub feed: FeedSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/papers.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Maximum papers selected per unforced or forced run.
    pub batch_size: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

/// Connection settings for a single backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. `None` for keyless backends.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl BackendConfig {
    fn new(model: &str, api_key_env: Option<&str>) -> Self {
        Self {
            model: model.to_string(),
            base_url: None,
            api_key_env: api_key_env.map(str::to_string),
        }
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<Option<String>, ConfigError> {
        self.api_key_with(|k| std::env::var(k).ok())
    }

    pub fn api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>, ConfigError> {
        let Some(var) = &self.api_key_env else {
            return Ok(None);
        };
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => Err(ConfigError::MissingCredential(var.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub mode: ProviderMode,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub openai: BackendConfig,
    pub anthropic: BackendConfig,
    pub ollama: BackendConfig,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            mode: ProviderMode::OpenAi,
            temperature: 0.2,
            max_output_tokens: 2000,
            request_timeout_secs: 120,
            openai: BackendConfig::new("gpt-4o", Some("OPENAI_API_KEY")),
            anthropic: BackendConfig::new("claude-3-5-sonnet-latest", Some("ANTHROPIC_API_KEY")),
            ollama: BackendConfig {
                base_url: Some("http://localhost:11434".to_string()),
                ..BackendConfig::new("llama3.1:8b", None)
            },
        }
    }
}

impl ProviderSection {
    /// Backend settings for the selected mode.
    pub fn active(&self) -> &BackendConfig {
        self.backend(self.mode)
    }

    pub fn backend(&self, mode: ProviderMode) -> &BackendConfig {
        match mode {
            ProviderMode::OpenAi => &self.openai,
            ProviderMode::Anthropic => &self.anthropic,
            ProviderMode::Ollama => &self.ollama,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub multiplier: u32,
    pub max_backoff_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_secs: 5,
            multiplier: 2,
            max_backoff_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageSection {
    /// Count primary-classifier tokens toward cost estimates.
    pub bill_primary_tokens: bool,
    /// Primary classifier (Gemini).
    pub primary: BackendConfig,
    /// Cheap models of the default provider family, used when the primary is unavailable.
    pub fallback_models: FallbackModels,
}

impl Default for TriageSection {
    fn default() -> Self {
        Self {
            primary: BackendConfig::new("gemini-1.5-flash", Some("GOOGLE_API_KEY")),
            bill_primary_tokens: false,
            fallback_models: FallbackModels::default(),
        }
    }
}

/// Fallback classifier model per backend. A model name only means something
/// to its own API, so each backend carries its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackModels {
    pub openai: String,
    pub anthropic: String,
    /// Unset: classify with the configured summarization model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama: Option<String>,
}

impl Default for FallbackModels {
    fn default() -> Self {
        Self {
            openai: "gpt-4o-mini".to_string(),
            anthropic: "claude-3-5-haiku-latest".to_string(),
            ollama: None,
        }
    }
}

impl FallbackModels {
    /// The fallback model for `mode`, or `None` to reuse the backend's own model.
    pub fn for_mode(&self, mode: ProviderMode) -> Option<&str> {
        match mode {
            ProviderMode::OpenAi => Some(self.openai.as_str()),
            ProviderMode::Anthropic => Some(self.anthropic.as_str()),
            ProviderMode::Ollama => self.ollama.as_deref(),
        }
        .filter(|m| !m.trim().is_empty())
    }
}

/// Rough cost model for run summaries. Not billing-accurate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSection {
    pub triage_usd_per_million: f64,
    pub summary_usd_each: f64,
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            triage_usd_per_million: 0.15,
            summary_usd_each: 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSection {
    pub url: String,
    pub max_authors: usize,
    pub timeout_secs: u64,
    pub category: String,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: "https://huggingface.co/api/daily_papers".to_string(),
            max_authors: 5,
            timeout_secs: 10,
            category: "huggingface".to_string(),
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

impl SiftConfig {
    /// Load from a TOML file (defaults if `path` does not exist), apply
    /// environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_with(|k| std::env::var(k).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply the environment overrides the batch scripts have always honored.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("PROJECTS_DB") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(batch) = lookup("SUMMARY_BATCH") {
            self.pipeline.batch_size = batch
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SUMMARY_BATCH={batch}")))?;
        }
        if let Some(mode) = lookup("SUMMARY_PROVIDER") {
            self.provider.mode = mode.parse()?;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.provider.openai.model = model;
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            self.provider.anthropic.model = model;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.provider.ollama.model = model;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.triage.primary.model = model;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.batch_size must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier == 0 {
            return Err(ConfigError::Invalid("retry.multiplier must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "provider.temperature {} outside 0.0..=2.0",
                self.provider.temperature
            )));
        }
        let costs = [self.cost.triage_usd_per_million, self.cost.summary_usd_each];
        if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(ConfigError::Invalid(
                "cost rates must be finite and non-negative".into(),
            ));
        }
        if self.provider.active().model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider.{}.model is empty",
                self.provider.mode.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_batch_script_behavior() {
        let config = SiftConfig::default();
        assert_eq!(config.store.path, PathBuf::from("data/papers.db"));
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.provider.mode, ProviderMode::OpenAi);
        assert_eq!(config.provider.active().model, "gpt-4o");
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(
            config.triage.fallback_models.for_mode(ProviderMode::OpenAi),
            Some("gpt-4o-mini")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let vars = env(&[
            ("SUMMARY_PROVIDER", "Anthropic"),
            ("SUMMARY_BATCH", "25"),
            ("ANTHROPIC_MODEL", "claude-haiku"),
            ("PROJECTS_DB", "/tmp/p.db"),
        ]);
        let mut config = SiftConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.provider.mode, ProviderMode::Anthropic);
        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.provider.active().model, "claude-haiku");
        assert_eq!(config.store.path, PathBuf::from("/tmp/p.db"));
    }

    #[test]
    fn unknown_mode_is_config_error() {
        let vars = env(&[("SUMMARY_PROVIDER", "palm")]);
        let mut config = SiftConfig::default();
        let err = config.apply_env_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("palm")));
    }

    #[test]
    fn toml_round_trip_and_partial_sections() {
        let config = SiftConfig::from_toml(
            "[pipeline]\nbatch_size = 3\n\n[provider]\nmode = \"ollama\"\ntemperature = 0.5\nmax_output_tokens = 512\nrequest_timeout_secs = 30\n\n[provider.openai]\nmodel = \"gpt-4o\"\n\n[provider.anthropic]\nmodel = \"claude\"\n\n[provider.ollama]\nmodel = \"qwen\"\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 3);
        assert_eq!(config.provider.mode, ProviderMode::Ollama);
        assert_eq!(config.provider.active().model, "qwen");
        assert!(config.provider.active().api_key_env.is_none());
        assert_eq!(config.retry.initial_backoff_secs, 5);

        let text = config.to_toml().unwrap();
        let back = SiftConfig::from_toml(&text).unwrap();
        assert_eq!(back.provider.mode, ProviderMode::Ollama);
    }

    #[test]
    fn fallback_models_are_per_backend() {
        let models = FallbackModels::default();
        assert_eq!(
            models.for_mode(ProviderMode::Anthropic),
            Some("claude-3-5-haiku-latest")
        );
        assert_eq!(models.for_mode(ProviderMode::Ollama), None);

        let config = SiftConfig::from_toml(
            "[triage.fallback_models]\nanthropic = \"claude-3-haiku-20240307\"\nollama = \"llama3.2:3b\"\n",
        )
        .unwrap();
        let models = &config.triage.fallback_models;
        assert_eq!(models.for_mode(ProviderMode::OpenAi), Some("gpt-4o-mini"));
        assert_eq!(
            models.for_mode(ProviderMode::Anthropic),
            Some("claude-3-haiku-20240307")
        );
        assert_eq!(models.for_mode(ProviderMode::Ollama), Some("llama3.2:3b"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SiftConfig::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SiftConfig::default();
        config.cost.summary_usd_each = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SiftConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_credential_detected() {
        let backend = SiftConfig::default().provider.openai;
        let err = backend.api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(var) if var == "OPENAI_API_KEY"));

        let err = backend.api_key_with(|_| Some("  ".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));

        let key = backend.api_key_with(|_| Some("sk-test".into())).unwrap();
        assert_eq!(key.as_deref(), Some("sk-test"));

        let ollama = SiftConfig::default().provider.ollama;
        assert_eq!(ollama.api_key_with(|_| None).unwrap(), None);
    }
}
