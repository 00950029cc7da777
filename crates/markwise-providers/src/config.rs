//! Configuration loading and grader factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use markwise_core::assessor::AssessorConfig;
use markwise_core::code::SandboxConfig;
use markwise_core::engine::EngineConfig;
use markwise_core::profile::{Subject, SubjectProfileResolver, SubjectWeights};
use markwise_core::traits::LlmGrader;

use crate::anthropic::{self, AnthropicGrader};
use crate::gemini::{self, GeminiGrader};
use crate::mock::MockGrader;
use crate::openai::{self, OpenAiGrader};

/// Configuration for a single grading backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    /// Offline grader replying with a fixed JSON body.
    Mock {
        #[serde(default = "default_mock_response")]
        response: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Mock { response } => {
                f.debug_struct("Mock").field("response", response).finish()
            }
        }
    }
}

fn default_mock_response() -> String {
    r#"{"percentage": 70, "feedback": "Mock assessment."}"#.to_string()
}

/// The `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Hybrid mode is opt-in.
    pub enabled: bool,
    /// Key into `[providers]`.
    pub provider: String,
    /// Model name; each backend has its own default.
    pub model: Option<String>,
    pub request_timeout_secs: u64,
    pub requests_per_minute: u32,
    pub max_concurrency: usize,
    pub queue_timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "gemini".to_string(),
            model: None,
            request_timeout_secs: 30,
            requests_per_minute: 15,
            max_concurrency: 4,
            queue_timeout_ms: 2000,
        }
    }
}

impl LlmSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn assessor_config(&self) -> AssessorConfig {
        AssessorConfig {
            request_timeout: self.request_timeout(),
            requests_per_minute: self.requests_per_minute,
            max_concurrency: self.max_concurrency.max(1),
            queue_timeout: Duration::from_millis(self.queue_timeout_ms),
            ..AssessorConfig::default()
        }
    }
}

/// Top-level markwise configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkwiseConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub llm: LlmSettings,
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Weight overrides per subject.
    #[serde(default)]
    pub profiles: HashMap<Subject, SubjectWeights>,
}

impl MarkwiseConfig {
    /// Build the profile resolver, validating any overrides.
    pub fn profile_resolver(&self) -> Result<SubjectProfileResolver> {
        SubjectProfileResolver::new(&self.profiles).context("invalid [profiles] section")
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    let url = |u: &Option<String>| u.as_ref().map(|u| resolve_env_vars(u));
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: url(base_url),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: url(base_url),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: url(base_url),
            org_id: url(org_id),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Set the API key of provider `name`, inserting a default entry if needed.
fn override_key(config: &mut MarkwiseConfig, name: &str, key: String) {
    let entry = config
        .providers
        .entry(name.to_string())
        .or_insert_with(|| match name {
            "gemini" => ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
            },
            "anthropic" => ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            },
            _ => ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            },
        });
    match entry {
        ProviderConfig::Gemini { api_key, .. }
        | ProviderConfig::Anthropic { api_key, .. }
        | ProviderConfig::OpenAI { api_key, .. } => *api_key = key,
        ProviderConfig::Mock { .. } => {}
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `markwise.toml` in the current directory
/// 2. `~/.config/markwise/config.toml`
///
/// Environment variable overrides: `MARKWISE_GEMINI_KEY`,
/// `MARKWISE_ANTHROPIC_KEY`, `MARKWISE_OPENAI_KEY`.
pub fn load_config() -> Result<MarkwiseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MarkwiseConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("markwise.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => MarkwiseConfig::default(),
    };

    for (provider, var) in [
        ("gemini", "MARKWISE_GEMINI_KEY"),
        ("anthropic", "MARKWISE_ANTHROPIC_KEY"),
        ("openai", "MARKWISE_OPENAI_KEY"),
    ] {
        if let Ok(key) = std::env::var(var) {
            override_key(&mut config, provider, key);
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

/// Parse and sanity-check a config document.
pub fn parse_config(content: &str) -> Result<MarkwiseConfig> {
    let config: MarkwiseConfig = toml::from_str(content)?;
    SubjectProfileResolver::new(&config.profiles)?;
    let hw = config.engine.hybrid_weight;
    if !(0.0..=1.0).contains(&hw) {
        anyhow::bail!("engine.hybrid_weight must be within [0, 1], got {hw}");
    }
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("markwise"))
}

/// Create a grader from its configuration.
pub fn create_grader(
    config: &ProviderConfig,
    model: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn LlmGrader>> {
    let require_key = |key: &str, name: &str| -> Result<()> {
        if key.trim().is_empty() {
            anyhow::bail!("provider '{name}' has no API key configured");
        }
        Ok(())
    };
    Ok(match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            require_key(api_key, "gemini")?;
            Arc::new(GeminiGrader::new(
                api_key,
                base_url.clone(),
                model.unwrap_or(gemini::DEFAULT_MODEL),
                timeout,
            )?)
        }
        ProviderConfig::Anthropic { api_key, base_url } => {
            require_key(api_key, "anthropic")?;
            Arc::new(AnthropicGrader::new(
                api_key,
                base_url.clone(),
                model.unwrap_or(anthropic::DEFAULT_MODEL),
                timeout,
            )?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            require_key(api_key, "openai")?;
            Arc::new(OpenAiGrader::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
                model.unwrap_or(openai::DEFAULT_MODEL),
                timeout,
            )?)
        }
        ProviderConfig::Mock { response } => Arc::new(MockGrader::with_fixed_response(response)),
    })
}

/// The grader selected by `[llm]`, or `None` when hybrid mode is off.
pub fn configured_grader(config: &MarkwiseConfig) -> Result<Option<Arc<dyn LlmGrader>>> {
    if !config.llm.enabled {
        return Ok(None);
    }
    let name = &config.llm.provider;
    let provider = config
        .providers
        .get(name)
        .with_context(|| format!("llm.provider '{name}' has no [providers.{name}] entry"))?;
    create_grader(
        provider,
        config.llm.model.as_deref(),
        config.llm.request_timeout(),
    )
    .map(Some)
}
