//! Result transport: the sentinel-framed JSON line is the de facto IPC
//! protocol between the child and this process. The entry script emits, as
//! the final line of its stdout, the fixed [`SENTINEL`] token immediately
//! followed by a single-line JSON payload. Executed code must not print the
//! sentinel itself.
//!
//! Decoding must never fail outright: malformed output, timeouts and spawn
//! failures all synthesize a result whose `exception.kind` names the failure
//! mode, with the raw stdout/stderr preserved verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::launcher::{MemoryLimitSupport, RawOutput, memory_limit_support};

/// Marker prefixing the structured result line in the child's output.
pub const SENTINEL: &str = "===PYEXEC_JSON===";

/// `exception.kind` when the child was killed by the wall-clock timeout.
pub const KIND_TIMEOUT: &str = "timeout";
/// `exception.kind` when child output held no decodable result record.
pub const KIND_PARSE_FAILURE: &str = "parse-failure";
/// `exception.kind` when the OS failed to start or reap the child.
pub const KIND_PROCESS_ERROR: &str = "process-error";

/// An uncaught error, either raised by the executed code or synthesized for
/// a wrapper-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Python exception class name, or one of the synthetic kinds above.
    pub kind: String,
    pub message: String,
    /// Full traceback for executed-code errors; empty for synthetic records.
    #[serde(default)]
    pub trace: String,
}

/// The single well-defined record returned for every execution.
///
/// Invariant: `exception` and `value` are never both populated, and
/// `stdout`/`stderr` are always present (possibly empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Return value of a defined `main`, JSON-safe or stringified.
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
    /// Best-effort `str()` snapshot of top-level bindings, dunders excluded.
    #[serde(default)]
    pub locals_snapshot: BTreeMap<String, String>,
    /// Paths materialized into the workspace from the request, in order.
    #[serde(default)]
    pub files_written: Vec<String>,
    /// Wall-clock seconds, child-measured when available.
    pub execution_time: f64,
    /// The memory-cap guarantee actually in force for this call, so callers
    /// can assert per-call whether `max_memory_mb` meant anything.
    #[serde(default = "memory_limit_support")]
    pub memory_limit: MemoryLimitSupport,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exception.is_none()
    }
}

/// Wire shape of the payload the entry script serializes.
#[derive(Debug, Deserialize)]
struct ChildPayload {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    exception: Option<ExceptionInfo>,
    #[serde(default)]
    locals: BTreeMap<String, String>,
    #[serde(default)]
    files_written: Vec<String>,
    #[serde(default)]
    execution_time: f64,
}

/// Decode a raw child outcome into an [`ExecutionResult`].
///
/// Looks for the last sentinel occurrence in stdout, falling back to stderr,
/// and parses the trailing text as the payload. Anything else synthesizes a
/// record that keeps the raw streams intact.
pub(crate) fn decode(raw: &RawOutput, files_written: &[String]) -> ExecutionResult {
    if raw.timed_out {
        return synthesized(
            raw,
            files_written,
            KIND_TIMEOUT,
            format!(
                "execution timed out after {:.1}s",
                raw.duration.as_secs_f64()
            ),
        );
    }

    if let Some(payload) = extract_payload(&raw.stdout).or_else(|| extract_payload(&raw.stderr)) {
        // Enforce the result invariant even if the child misbehaved.
        let value = if payload.exception.is_some() {
            None
        } else {
            payload.value.filter(|v| !v.is_null())
        };
        return ExecutionResult {
            stdout: payload.stdout,
            stderr: payload.stderr,
            value,
            exception: payload.exception,
            locals_snapshot: payload.locals,
            files_written: payload.files_written,
            execution_time: payload.execution_time,
            memory_limit: raw.memory_limit,
        };
    }

    warn!(exit_code = ?raw.exit_code, "child output held no decodable result record");
    let message = match raw.exit_code {
        Some(code) => format!("child produced no decodable result (exit status {code})"),
        None => "child was terminated by a signal before producing a result".to_string(),
    };
    synthesized(raw, files_written, KIND_PARSE_FAILURE, message)
}

/// Result for a child the OS refused or failed to start.
pub(crate) fn spawn_failure(
    err: &std::io::Error,
    files_written: &[String],
    elapsed: Duration,
) -> ExecutionResult {
    warn!(error = %err, "failed to launch child process");
    ExecutionResult {
        stdout: String::new(),
        stderr: String::new(),
        value: None,
        exception: Some(ExceptionInfo {
            kind: KIND_PROCESS_ERROR.to_string(),
            message: format!("failed to launch child process: {err}"),
            trace: String::new(),
        }),
        locals_snapshot: BTreeMap::new(),
        files_written: files_written.to_vec(),
        execution_time: elapsed.as_secs_f64(),
        memory_limit: memory_limit_support(),
    }
}

fn extract_payload(text: &str) -> Option<ChildPayload> {
    let idx = text.rfind(SENTINEL)?;
    let tail = text[idx + SENTINEL.len()..].trim();
    serde_json::from_str(tail).ok()
}

fn synthesized(
    raw: &RawOutput,
    files_written: &[String],
    kind: &str,
    message: String,
) -> ExecutionResult {
    ExecutionResult {
        stdout: raw.stdout.clone(),
        stderr: raw.stderr.clone(),
        value: None,
        exception: Some(ExceptionInfo {
            kind: kind.to_string(),
            message,
            trace: String::new(),
        }),
        locals_snapshot: BTreeMap::new(),
        files_written: files_written.to_vec(),
        execution_time: raw.duration.as_secs_f64(),
        memory_limit: raw.memory_limit,
    }
}
