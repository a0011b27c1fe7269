//! Orchestrator: runs the full pipeline for one request — resolve workspace,
//! install deps, build the entry script, launch under limits, decode, clean
//! up — and always hands the caller a complete [`ExecutionResult`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

use crate::deps;
use crate::error::ExecError;
use crate::launcher::{self, LaunchSpec};
use crate::protocol::{self, ExecutionResult};
use crate::request::ExecutionRequest;
use crate::script;
use crate::workspace;

/// Executor settings, deserializable from the host application's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Interpreter used for both pip and the entry script.
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    /// Root under which persistent session workspaces live.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_session_root() -> PathBuf {
    std::env::temp_dir().join("pyexec").join("sessions")
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python_bin: default_python_bin(),
            session_root: default_session_root(),
        }
    }
}

/// Sandboxed Python executor. One request maps to one child process; the
/// call suspends until the child exits or the timeout fires.
#[derive(Debug, Clone, Default)]
pub struct PythonExecutor {
    config: ExecutorConfig,
}

impl PythonExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute one request and return its result.
    ///
    /// Returns `Err` only for failures occurring before any process is
    /// spawned: an empty `code`, a `files` path escaping the workspace, or
    /// an I/O failure while preparing the workspace. Timeouts, exceptions
    /// raised by the code, undecodable output and spawn failures all come
    /// back as `Ok` with `exception` populated.
    ///
    /// Concurrent calls sharing a `session_id` get no mutual exclusion:
    /// shared files are last-write-wins, and callers who need more must
    /// serialize such calls themselves.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecError> {
        request.validate()?;
        let started = Instant::now();

        let ws = workspace::resolve(
            request.persist,
            request.session_id.as_deref(),
            &request.files,
            &self.config.session_root,
        )?;

        let mut search_paths = Vec::new();
        if !request.requirements.is_empty() {
            search_paths.push(
                deps::install(&self.config.python_bin, &request.requirements, &ws).await,
            );
        }

        let entry = match script::build(&request.code, &ws, request.globals_enabled) {
            Ok(path) => path,
            Err(err) => {
                workspace::finalize(&ws);
                return Err(err);
            }
        };

        let spec = LaunchSpec {
            program: self.config.python_bin.clone(),
            script: entry,
            workdir: ws.root.clone(),
            search_paths,
            timeout: request.timeout_duration(),
            max_memory_mb: request.max_memory_mb,
        };

        let result = match launcher::run(&spec).await {
            Ok(raw) => protocol::decode(&raw, &ws.files_written),
            Err(err) => protocol::spawn_failure(&err, &ws.files_written, started.elapsed()),
        };

        workspace::finalize(&ws);

        debug!(
            session_id = %ws.session_id,
            succeeded = result.succeeded(),
            execution_time = result.execution_time,
            "execution finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{KIND_PROCESS_ERROR, KIND_TIMEOUT};
    use crate::request::FileSpec;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    fn python3_missing() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
    }

    fn executor_with_session_root(root: &Path) -> PythonExecutor {
        PythonExecutor::new(ExecutorConfig {
            python_bin: "python3".to_string(),
            session_root: root.to_path_buf(),
        })
    }

    macro_rules! require_python {
        () => {
            init_logs();
            if python3_missing() {
                eprintln!("skipping: python3 not found on PATH");
                return;
            }
        };
    }

    #[tokio::test]
    async fn test_main_return_value() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new("def main():\n    return 42\n"))
            .await
            .unwrap();

        assert_eq!(result.value, Some(json!(42)));
        assert!(result.exception.is_none());
        assert!(result.execution_time >= 0.0);
        assert_eq!(result.memory_limit, crate::launcher::memory_limit_support());
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_captured() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new(
                "import sys\nprint('to stdout')\nprint('to stderr', file=sys.stderr)\n",
            ))
            .await
            .unwrap();

        assert_eq!(result.stdout, "to stdout\n");
        assert_eq!(result.stderr, "to stderr\n");
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn test_raised_exception_is_captured() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new("raise ValueError('boom')"))
            .await
            .unwrap();

        let exc = result.exception.expect("exception must be populated");
        assert_eq!(exc.kind, "ValueError");
        assert!(exc.message.contains("boom"));
        assert!(exc.trace.contains("Traceback"));
        assert!(result.value.is_none());
    }

    #[tokio::test]
    async fn test_async_main_is_awaited() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new(
                "import asyncio\nasync def main():\n    await asyncio.sleep(0)\n    return 'done'\n",
            ))
            .await
            .unwrap();

        assert_eq!(result.value, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_locals_snapshot_excludes_dunders() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new("x = 1\nname = 'abc'\n"))
            .await
            .unwrap();

        assert_eq!(result.locals_snapshot.get("x").map(String::as_str), Some("1"));
        assert_eq!(
            result.locals_snapshot.get("name").map(String::as_str),
            Some("abc")
        );
        assert!(result.locals_snapshot.keys().all(|k| !k.starts_with("__")));
    }

    #[tokio::test]
    async fn test_request_files_visible_to_code() {
        require_python!();
        let executor = PythonExecutor::default();
        let mut request = ExecutionRequest::new(
            "def main():\n    with open('a.txt') as f:\n        return f.read()\n",
        );
        request.files = vec![FileSpec {
            path: "a.txt".to_string(),
            content: "hi".to_string(),
        }];

        let result = executor.execute(&request).await.unwrap();
        assert_eq!(result.value, Some(json!("hi")));
        assert_eq!(result.files_written, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_path_escape_rejected_before_spawn() {
        init_logs();
        let executor = PythonExecutor::default();
        let mut request = ExecutionRequest::new("print('never runs')");
        request.files = vec![FileSpec {
            path: "../outside.txt".to_string(),
            content: "x".to_string(),
        }];

        let err = executor.execute(&request).await.unwrap_err();
        assert!(matches!(err, ExecError::PathEscapesWorkspace(_)));
    }

    #[tokio::test]
    async fn test_empty_code_rejected() {
        init_logs();
        let executor = PythonExecutor::default();
        let err = executor
            .execute(&ExecutionRequest::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::EmptyCode));
    }

    #[tokio::test]
    async fn test_ephemeral_workspace_removed_after_call() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new(
                "import os\ndef main():\n    return os.getcwd()\n",
            ))
            .await
            .unwrap();

        let root = result.value.as_ref().and_then(|v| v.as_str()).unwrap().to_string();
        assert!(
            !Path::new(&root).exists(),
            "ephemeral workspace {root} should be deleted"
        );
    }

    #[tokio::test]
    async fn test_persistent_session_shares_state_across_calls() {
        require_python!();
        let session_root = tempfile::tempdir().unwrap();
        let executor = executor_with_session_root(session_root.path());

        let mut first = ExecutionRequest::new(
            "with open('state.txt', 'w') as f:\n    f.write('41 + 1')\n",
        );
        first.persist = true;
        first.session_id = Some("reuse-test".to_string());
        let result = executor.execute(&first).await.unwrap();
        assert!(result.succeeded());

        let mut second = ExecutionRequest::new(
            "def main():\n    with open('state.txt') as f:\n        return f.read()\n",
        );
        second.persist = true;
        second.session_id = Some("reuse-test".to_string());
        let result = executor.execute(&second).await.unwrap();
        assert_eq!(result.value, Some(json!("41 + 1")));

        assert!(session_root.path().join("session_reuse-test").is_dir());
    }

    #[tokio::test]
    async fn test_timeout_kills_child_and_reports_kind() {
        require_python!();
        let executor = PythonExecutor::default();
        let mut request = ExecutionRequest::new("import time\ntime.sleep(60)\n");
        request.timeout = 1.0;

        let started = std::time::Instant::now();
        let result = executor.execute(&request).await.unwrap();

        let exc = result.exception.expect("timeout must populate exception");
        assert_eq!(exc.kind, KIND_TIMEOUT);
        assert!(result.value.is_none());
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "call should return at or shortly after the deadline"
        );
    }

    #[tokio::test]
    async fn test_restricted_globals_block_imports() {
        require_python!();
        let executor = PythonExecutor::default();
        let mut request = ExecutionRequest::new("import os\n");
        request.globals_enabled = false;

        let result = executor.execute(&request).await.unwrap();
        let exc = result.exception.expect("import must fail under restriction");
        assert_eq!(exc.kind, "ImportError");
    }

    #[tokio::test]
    async fn test_restricted_globals_allow_basic_flow() {
        require_python!();
        let executor = PythonExecutor::default();
        let mut request = ExecutionRequest::new(
            "total = 0\nfor i in range(5):\n    total += i\ndef main():\n    return total\n",
        );
        request.globals_enabled = false;

        let result = executor.execute(&request).await.unwrap();
        assert_eq!(result.value, Some(json!(10)));
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn test_unserializable_value_falls_back_to_string() {
        require_python!();
        let executor = PythonExecutor::default();
        let result = executor
            .execute(&ExecutionRequest::new(
                "def main():\n    return {1, 2}\n",
            ))
            .await
            .unwrap();

        let value = result.value.expect("stringified fallback expected");
        assert!(value.as_str().unwrap().contains('1'));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_process_error_result() {
        init_logs();
        let executor = PythonExecutor::new(ExecutorConfig {
            python_bin: "pyexec-no-such-python".to_string(),
            session_root: std::env::temp_dir().join("pyexec").join("sessions"),
        });

        let result = executor
            .execute(&ExecutionRequest::new("print('hi')"))
            .await
            .unwrap();
        let exc = result.exception.unwrap();
        assert_eq!(exc.kind, KIND_PROCESS_ERROR);
    }
}
