//! Workspace provisioning and path containment.
//!
//! Each thread works in `base/{user_id}/{thread_id}/`. Files the agent
//! asks the gateway to deliver must resolve inside that directory —
//! symlinks included — before anything leaves the machine.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Create (idempotently) and canonicalize the workspace directory for a
/// thread.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory cannot be created or resolved.
pub fn provision(base: &Path, user_id: i64, thread_id: i64) -> Result<PathBuf> {
    let dir = base.join(user_id.to_string()).join(thread_id.to_string());
    fs::create_dir_all(&dir)
        .map_err(|err| AppError::Io(format!("create workspace {}: {err}", dir.display())))?;
    dir.canonicalize()
        .map_err(|err| AppError::Io(format!("resolve workspace {}: {err}", dir.display())))
}

/// Copy agent template files into a workspace, never overwriting anything
/// the workspace already has.
///
/// # Errors
///
/// Returns `AppError::Io` when the template tree cannot be read or a copy
/// fails.
pub fn sync_templates(template_dir: &Path, workspace: &Path) -> Result<()> {
    copy_missing(template_dir, workspace)
}

fn copy_missing(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from)
        .map_err(|err| AppError::Io(format!("read templates {}: {err}", from.display())))?
    {
        let entry = entry.map_err(|err| AppError::Io(err.to_string()))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            fs::create_dir_all(&dst).map_err(|err| AppError::Io(err.to_string()))?;
            copy_missing(&src, &dst)?;
        } else if !dst.exists() {
            fs::copy(&src, &dst)
                .map_err(|err| AppError::Io(format!("copy template {}: {err}", src.display())))?;
            debug!(template = %src.display(), "template synced into workspace");
        }
    }
    Ok(())
}

/// Validate that `candidate` resolves inside `workspace_root` and return
/// the resolved absolute path.
///
/// Relative candidates are joined to the root with `..` normalized away;
/// absolute candidates must start under the root. Existing paths are
/// canonicalized so a symlink pointing outside the workspace is caught.
///
/// # Errors
///
/// Returns `AppError::PathViolation` on traversal, an outside-root
/// absolute path, or a symlink escape.
pub fn contain_path(workspace_root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = workspace_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;

    let candidate = candidate.as_ref();
    let absolute = if candidate.is_absolute() {
        normalize(candidate)?
    } else {
        let mut joined = root.clone();
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    if !joined.pop() {
                        return Err(AppError::PathViolation(
                            "path attempts to escape workspace".into(),
                        ));
                    }
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {}
                Component::Normal(part) => joined.push(part),
            }
        }
        joined
    };

    if !absolute.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "path {} is outside the workspace",
            absolute.display()
        )));
    }

    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(
                "symlink target escapes workspace".into(),
            ));
        }
        Ok(canonical)
    } else {
        Ok(absolute)
    }
}

/// Normalize an absolute path without touching the filesystem: fold `.`
/// and `..` lexically.
fn normalize(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape the filesystem root".into(),
                    ));
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

// ── Startup validation ───────────────────────────────────────────────────────

/// Resolve the agent binary: an explicit path must exist and be
/// executable; a bare name is searched on `PATH`.
///
/// # Errors
///
/// Returns `AppError::Config` when no executable is found.
pub fn resolve_agent_binary(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if is_executable(candidate) {
            return Ok(candidate.to_path_buf());
        }
        return Err(AppError::Config(format!(
            "agent binary '{name}' does not exist or is not executable"
        )));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(name);
        if is_executable(&full) {
            return Ok(full);
        }
    }
    Err(AppError::Config(format!(
        "agent binary '{name}' not found on PATH"
    )))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Verify the workspace root exists (creating it if needed) and is
/// writable, by round-tripping a probe file.
///
/// # Errors
///
/// Returns `AppError::Config` when the root cannot be created or written.
pub fn ensure_workspace_root(base: &Path) -> Result<()> {
    fs::create_dir_all(base).map_err(|err| {
        AppError::Config(format!(
            "workspace root {} cannot be created: {err}",
            base.display()
        ))
    })?;

    let probe = base.join(".switchboard-probe");
    fs::write(&probe, b"probe").map_err(|err| {
        AppError::Config(format!(
            "workspace root {} is not writable: {err}",
            base.display()
        ))
    })?;
    if let Err(err) = fs::remove_file(&probe) {
        warn!(%err, "probe file could not be removed");
    }
    Ok(())
}
