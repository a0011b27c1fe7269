//! Workspace store and lifecycle: the on-disk execution directory a child
//! process runs in, either ephemeral (deleted after the call) or persistent
//! (keyed by session id, owned by the caller).

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ExecError;
use crate::request::FileSpec;

/// Name of the workspace-local dependency directory.
pub const DEPS_DIR: &str = "deps";

/// An execution directory plus the request files written into it.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory the child process runs in.
    pub root: PathBuf,
    /// `root/deps` — target of the dependency installer, exposed to the
    /// child via its module search path.
    pub deps: PathBuf,
    /// Relative paths materialized from the request, in request order.
    pub files_written: Vec<String>,
    pub session_id: String,
    /// Persistent workspaces are never deleted by [`finalize`].
    pub persisted: bool,
}

/// Resolve or create the workspace for one request and materialize `files`
/// into it.
///
/// Ephemeral requests get a fresh uniquely-named directory under the system
/// temp dir. When `persist` is true and a `session_id` is given, the
/// directory is keyed deterministically under `session_root` so repeated
/// calls with the same id observe each other's on-disk state.
///
/// Every file path is checked for containment before anything is created;
/// a path that would escape the root is an [`ExecError::PathEscapesWorkspace`].
pub fn resolve(
    persist: bool,
    session_id: Option<&str>,
    files: &[FileSpec],
    session_root: &Path,
) -> Result<Workspace, ExecError> {
    // Validate all paths up front so an invalid request creates nothing.
    let mut relative: Vec<PathBuf> = Vec::with_capacity(files.len());
    for file in files {
        let rel = contained_relative(Path::new(&file.path))
            .ok_or_else(|| ExecError::PathEscapesWorkspace(PathBuf::from(&file.path)))?;
        relative.push(rel);
    }

    let (root, session_id) = match (persist, session_id) {
        (true, Some(id)) => {
            if !valid_session_id(id) {
                return Err(ExecError::InvalidSessionId(id.to_string()));
            }
            (session_root.join(format!("session_{id}")), id.to_string())
        }
        _ => {
            let id = Uuid::new_v4().simple().to_string();
            (std::env::temp_dir().join(format!("pyexec-{id}")), id)
        }
    };
    fs::create_dir_all(&root)?;

    let mut files_written = Vec::with_capacity(files.len());
    for (file, rel) in files.iter().zip(&relative) {
        let target = root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &file.content)?;
        files_written.push(file.path.clone());
    }

    let deps = root.join(DEPS_DIR);
    fs::create_dir_all(&deps)?;

    debug!(root = %root.display(), persisted = persist, "workspace ready");

    Ok(Workspace {
        root,
        deps,
        files_written,
        session_id,
        persisted: persist,
    })
}

/// A session id must name exactly one directory under the session root, so
/// path separators (and anything else exotic) are rejected up front.
fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.chars().all(|c| c == '.')
}

/// Lexically resolve `path` to a normalized relative path, or `None` if it
/// is absolute or climbs above the root. `canonicalize` is no use here: the
/// target does not exist yet.
fn contained_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Delete an ephemeral workspace; leave persistent ones intact.
///
/// Deletion failures are logged and swallowed: a stray temp directory is an
/// acceptable outcome, an error escaping cleanup is not.
pub fn finalize(workspace: &Workspace) {
    if workspace.persisted {
        debug!(root = %workspace.root.display(), "leaving persistent workspace in place");
        return;
    }
    if let Err(err) = fs::remove_dir_all(&workspace.root) {
        warn!(
            root = %workspace.root.display(),
            error = %err,
            "failed to remove ephemeral workspace"
        );
    }
}
