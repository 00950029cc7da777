//! markwise-providers — LLM grading backends and configuration.
//!
//! Implements the `LlmGrader` trait for Gemini, Anthropic and
//! OpenAI-compatible APIs, plus a scripted mock, and loads `markwise.toml`.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use config::{
    configured_grader, create_grader, load_config, load_config_from, LlmSettings, MarkwiseConfig,
    ProviderConfig,
};
pub use error::ProviderError;
