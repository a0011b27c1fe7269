use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExecError;

/// One file to materialize into the workspace before the code runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path relative to the workspace root.
    pub path: String,
    pub content: String,
}

/// A single execution request, deserialized from the agent's JSON tool
/// payload. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Python source text to execute.
    pub code: String,

    /// Wall-clock limit for the whole child process, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: f64,

    /// Keep the workspace after this call, keyed by `session_id`.
    #[serde(default)]
    pub persist: bool,

    /// When false, the code runs with a restricted builtin allow-list
    /// instead of the full standard builtin surface.
    #[serde(default = "default_true", rename = "globals")]
    pub globals_enabled: bool,

    /// Files written into the workspace before execution, in order.
    #[serde(default)]
    pub files: Vec<FileSpec>,

    /// pip package specifiers installed into the workspace-local deps dir.
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Names a reusable persistent workspace when `persist` is true.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Advisory memory cap for the child. Best-effort; see
    /// [`crate::launcher::memory_limit_support`].
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

impl ExecutionRequest {
    /// A request with defaults: 30s timeout, ephemeral workspace, full
    /// builtins, no files or requirements.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            timeout: default_timeout_secs(),
            persist: false,
            globals_enabled: true,
            files: Vec::new(),
            requirements: Vec::new(),
            session_id: None,
            max_memory_mb: None,
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    pub(crate) fn validate(&self) -> Result<(), ExecError> {
        if self.code.trim().is_empty() {
            return Err(ExecError::EmptyCode);
        }
        Ok(())
    }
}
