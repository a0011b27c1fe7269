//! Dependency installer: materializes declared pip packages into the
//! workspace-local `deps` directory so the global environment stays clean.

use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::Workspace;

/// Install `requirements` into `workspace.deps` with a single
/// `python -m pip install --quiet --target` invocation.
///
/// Best-effort by design: a failed install is logged and ignored, and the
/// code still runs. A missing package then shows up as an `ImportError`
/// through the normal exception channel, which is diagnosable from inside
/// the executed code's own failure rather than hidden behind a separate
/// installer error.
pub async fn install(python_bin: &str, requirements: &[String], workspace: &Workspace) -> PathBuf {
    if requirements.is_empty() {
        return workspace.deps.clone();
    }

    debug!(
        count = requirements.len(),
        target = %workspace.deps.display(),
        "installing requirements into workspace deps"
    );

    let output = Command::new(python_bin)
        .args(["-m", "pip", "install", "--quiet", "--target"])
        .arg(&workspace.deps)
        .args(requirements)
        .current_dir(&workspace.root)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {}
        Ok(out) => warn!(
            status = ?out.status.code(),
            stderr = %String::from_utf8_lossy(&out.stderr),
            "pip install failed; continuing without declared packages"
        ),
        Err(err) => warn!(
            error = %err,
            "could not run pip; continuing without declared packages"
        ),
    }

    workspace.deps.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace;

    #[tokio::test]
    async fn test_empty_requirements_is_a_no_op() {
        let session_root = tempfile::tempdir().unwrap();
        let ws = workspace::resolve(false, None, &[], session_root.path()).unwrap();

        let deps = install("python3", &[], &ws).await;
        assert_eq!(deps, ws.deps);

        workspace::finalize(&ws);
    }

    #[tokio::test]
    async fn test_install_failure_does_not_abort() {
        let session_root = tempfile::tempdir().unwrap();
        let ws = workspace::resolve(false, None, &[], session_root.path()).unwrap();

        // A binary that cannot exist: the installer must swallow the error.
        let deps = install(
            "pyexec-no-such-python-binary",
            &["requests".to_string()],
            &ws,
        )
        .await;
        assert_eq!(deps, ws.deps);

        workspace::finalize(&ws);
    }
}
