//! markwise-runner — sandboxed execution of student code.
//!
//! Each execution gets its own temporary arena holding the student's program
//! and a small Python harness. Cases run one after another in a fresh
//! interpreter process that is time-boxed, killed on expiry and reaped. The
//! arena is removed when the execution finishes or is cancelled.

pub mod executor;
pub mod sandbox;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use markwise_core::code::SandboxConfig;
use markwise_core::model::Language;
use markwise_core::traits::{CaseVerdict, CodeRunner, ExecutionReport, ExecutionRequest};

use crate::sandbox::Sandbox;

/// Setup failures. Per-case timeouts and crashes are verdicts, not errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no sandbox support for {0}")]
    UnsupportedLanguage(Language),

    #[error("interpreter '{0}' is not available")]
    InterpreterMissing(String),
}

/// Wraps the interpreter in a new user and network namespace.
const UNSHARE: &str = "unshare";
const UNSHARE_ARGS: [&str; 4] = ["--user", "--map-root-user", "--net", "--"];

/// Runs Python answers in local subprocess sandboxes.
pub struct LocalRunner {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
    python_found: OnceLock<bool>,
    netns: OnceLock<bool>,
}

impl LocalRunner {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            config,
            permits,
            python_found: OnceLock::new(),
            netns: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether the configured interpreter can be started. Checked once.
    pub fn interpreter_available(&self) -> bool {
        *self.python_found.get_or_init(|| {
            std::process::Command::new(&self.config.python)
                .arg("--version")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    /// Whether cases run in a private network namespace. Checked once; hosts
    /// without unprivileged user namespaces fall back to the harness guards.
    pub fn network_isolated(&self) -> bool {
        *self.netns.get_or_init(|| {
            if !self.config.network_namespace {
                return false;
            }
            let available = std::process::Command::new(UNSHARE)
                .args(UNSHARE_ARGS)
                .arg("true")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !available {
                warn!("network namespaces unavailable, relying on in-process guards");
            }
            available
        })
    }

    /// Program and leading arguments that start the interpreter.
    fn launcher(&self) -> (&str, Vec<&str>) {
        if self.network_isolated() {
            let mut args = UNSHARE_ARGS.to_vec();
            args.push(self.config.python.as_str());
            (UNSHARE, args)
        } else {
            (self.config.python.as_str(), Vec::new())
        }
    }

    fn case_timeout(&self, request: &ExecutionRequest) -> Duration {
        if request.timeout_ms > 0 {
            Duration::from_millis(request.timeout_ms)
        } else {
            self.config.timeout()
        }
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        if !self.interpreter_available() {
            return Err(RunnerError::InterpreterMissing(self.config.python.clone()).into());
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .context("sandbox pool closed")?;

        let sandbox = Sandbox::new(&self.config, self.case_timeout(request))?;
        let harness = sandbox.write_program(&request.code)?;
        let harness = harness.to_string_lossy().to_string();
        let entry = request.entry_point.clone().unwrap_or_default();
        let (program, mut args) = self.launcher();
        args.extend(["-I", "-B", harness.as_str(), entry.as_str()]);

        let mut report = ExecutionReport::default();
        for case in &request.cases {
            let output = executor::run_process(&sandbox, program, &args, &case.input).await?;
            report.cases.push(executor::judge(case, output));
        }

        let timed_out = report
            .cases
            .iter()
            .filter(|c| c.verdict == CaseVerdict::TimedOut)
            .count();
        info!(
            cases = report.cases.len(),
            passed = report.passed(),
            timed_out,
            "execution finished"
        );
        Ok(report)
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[async_trait]
impl CodeRunner for LocalRunner {
    fn supports(&self, language: Language) -> bool {
        language == Language::Python
    }

    async fn run_cases(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        if !self.supports(request.language) {
            return Err(RunnerError::UnsupportedLanguage(request.language).into());
        }
        let span = info_span!("sandbox", run_id = %Uuid::new_v4(), language = %request.language);
        self.execute(request).instrument(span).await
    }
}
