//! pyexec — sandboxed Python execution core for agent tooling.
//!
//! Runs untrusted, dynamically supplied Python source in an isolated child
//! process with a wall-clock timeout and a best-effort memory cap, and
//! always returns one complete [`ExecutionResult`] — execution-level
//! failures (timeouts, raised exceptions, undecodable output, spawn
//! failures) never propagate to the caller as errors.
//!
//! Pipeline: [`workspace`] resolves the execution directory (ephemeral or
//! session-persistent) and materializes request files; [`deps`] installs
//! declared packages into a workspace-local dir; [`script`] generates the
//! entry program wrapping the user code; [`launcher`] spawns it under
//! limits; [`protocol`] decodes the sentinel-framed result line; the
//! workspace is then finalized.
//!
//! This is not a hardened security boundary: there is no network or
//! filesystem-namespace isolation, and the memory cap is advisory (see
//! [`launcher::memory_limit_support`]). It guards against accidental
//! runaway resource use and guarantees output capture.

pub mod deps;
pub mod error;
pub mod executor;
pub mod launcher;
pub mod protocol;
pub mod request;
pub mod script;
pub mod workspace;

pub use error::ExecError;
pub use executor::{ExecutorConfig, PythonExecutor};
pub use launcher::{LaunchSpec, MemoryLimitSupport, RawOutput, memory_limit_support};
pub use protocol::{ExceptionInfo, ExecutionResult, SENTINEL};
pub use request::{ExecutionRequest, FileSpec};
pub use workspace::Workspace;
