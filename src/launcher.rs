//! Process launcher: spawns the generated entry script as a child process
//! with an explicit per-launch configuration (working directory, module
//! search paths, limits) — ambient process state is never mutated.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Whether this host can enforce the advisory memory cap.
///
/// `max_memory_mb` is advisory, not guaranteed: on Linux it is applied with
/// `setrlimit(RLIMIT_AS)` in a pre-exec hook; on macOS pre-exec hooks are
/// unreliable after `fork()` and the cap is skipped, and non-unix hosts have
/// no equivalent facility. Callers must not rely on it for hard isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryLimitSupport {
    Supported,
    Unsupported,
}

/// Probe whether the memory cap would actually be applied on this host.
pub fn memory_limit_support() -> MemoryLimitSupport {
    if cfg!(target_os = "linux") {
        MemoryLimitSupport::Supported
    } else {
        MemoryLimitSupport::Unsupported
    }
}

/// Everything one launch needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Interpreter binary, e.g. `python3`.
    pub program: String,
    /// The generated entry script.
    pub script: PathBuf,
    /// Child working directory (the workspace root).
    pub workdir: PathBuf,
    /// Directories prepended to the child's module search path.
    pub search_paths: Vec<PathBuf>,
    /// Wall-clock limit for the whole child process.
    pub timeout: Duration,
    /// Advisory memory cap; see [`MemoryLimitSupport`].
    pub max_memory_mb: Option<u64>,
}

/// Raw child outcome before protocol decoding.
#[derive(Debug)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when killed by a signal (including our timeout kill).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Spawn-to-exit (or spawn-to-kill) wall-clock time.
    pub duration: Duration,
    /// The memory-cap guarantee actually in force for this launch.
    pub memory_limit: MemoryLimitSupport,
}

/// Spawn the entry script and wait for it under the timeout.
///
/// The child is placed in its own process group so a timeout kill covers any
/// descendants it spawned. An `Err` here means the OS failed to start or
/// reap the child; the caller folds that into a `process-error` result.
pub async fn run(spec: &LaunchSpec) -> std::io::Result<RawOutput> {
    let mut command = Command::new(&spec.program);
    command
        .arg(&spec.script)
        .current_dir(&spec.workdir)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if !spec.search_paths.is_empty() {
        // Prepend our paths to any inherited PYTHONPATH; the parent's own
        // environment is left untouched.
        let mut paths = spec.search_paths.clone();
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        if let Ok(joined) = std::env::join_paths(&paths) {
            command.env("PYTHONPATH", joined);
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.as_std_mut().process_group(0);

        if let Some(mb) = spec.max_memory_mb {
            if memory_limit_support() == MemoryLimitSupport::Supported {
                let bytes = mb.saturating_mul(1024 * 1024);
                unsafe {
                    command.as_std_mut().pre_exec(move || {
                        use nix::sys::resource::{Resource, setrlimit};
                        // Advisory cap: a failing setrlimit must not abort
                        // the launch.
                        let _ = setrlimit(Resource::RLIMIT_AS, bytes, bytes);
                        Ok(())
                    });
                }
            }
        }
    }

    let start = Instant::now();
    let child = command.spawn()?;
    let pid = child.id();
    debug!(pid, timeout_ms = spec.timeout.as_millis() as u64, "spawned child");

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(outcome) => {
            let output = outcome?;
            Ok(RawOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
                duration: start.elapsed(),
                memory_limit: memory_limit_support(),
            })
        }
        Err(_elapsed) => {
            // The wait future (and with it the child handle) was just
            // dropped, so kill_on_drop reaps the direct child; the group
            // kill covers any descendants.
            kill_process_group(pid);
            warn!(pid, "child exceeded timeout, killed process group");
            Ok(RawOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                timed_out: true,
                duration: start.elapsed(),
                memory_limit: memory_limit_support(),
            })
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;
    if let Some(pid) = pid {
        // The child is its own group leader, so pgid == pid.
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
