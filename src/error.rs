use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the public entry point.
///
/// All of these occur before any child process is spawned. Every failure
/// downstream of request validation (timeouts, exceptions raised by the
/// executed code, undecodable child output, spawn failures) is folded into
/// [`crate::ExecutionResult::exception`] and returned as `Ok`.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The request carried no code to execute.
    #[error("request contains no code to execute")]
    EmptyCode,

    /// A `files` entry would resolve outside the workspace root.
    #[error("file path {0:?} escapes the workspace root")]
    PathEscapesWorkspace(PathBuf),

    /// A `session_id` that cannot name a single directory under the
    /// session root.
    #[error("session id {0:?} is not a valid directory name")]
    InvalidSessionId(String),

    /// I/O failure while preparing the workspace or entry script.
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[from] std::io::Error),
}
