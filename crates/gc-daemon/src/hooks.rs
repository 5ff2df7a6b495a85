// SPDX-License-Identifier: MIT

//! Hook-script materializer for `<city>/<beads-state-dir>/hooks/
//! on_create|on_close|on_update`. These are the scripts the bead store's
//! reference adapter shells out to around create/close/update; the
//! controller's job is only to make sure they exist and are marked
//! executable before the bead store is asked to use them — it never
//! invents their contents beyond a no-op stub when none is configured,
//! since hook behavior itself is operator-owned.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("creating hooks dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing hook {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("marking hook executable {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub const HOOK_NAMES: [&str; 3] = ["on_create", "on_close", "on_update"];

const STUB_BODY: &str = "#!/bin/sh\nexit 0\n";

/// Ensure all three hook scripts exist under `hooks_dir` and are
/// executable. A hook already present is left with its existing contents
/// (only its permission bits are normalized); a missing hook gets a no-op
/// stub so the bead store always has something to exec.
pub fn ensure_hooks(hooks_dir: &Path) -> Result<Vec<String>, HookError> {
    std::fs::create_dir_all(hooks_dir).map_err(|source| HookError::CreateDir {
        path: hooks_dir.to_path_buf(),
        source,
    })?;

    let mut created = Vec::new();
    for name in HOOK_NAMES {
        let path = hooks_dir.join(name);
        if !path.exists() {
            let mut file = std::fs::File::create(&path).map_err(|source| HookError::Write {
                path: path.clone(),
                source,
            })?;
            file.write_all(STUB_BODY.as_bytes())
                .map_err(|source| HookError::Write {
                    path: path.clone(),
                    source,
                })?;
            created.push(name.to_string());
        }
        mark_executable(&path)?;
    }
    Ok(created)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), HookError> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path).map_err(|source| HookError::SetPermissions {
        path: path.to_path_buf(),
        source,
    })?;
    let mut perms = metadata.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(|source| HookError::SetPermissions {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), HookError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_all_three_stub_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        let created = ensure_hooks(&hooks_dir).unwrap();
        assert_eq!(created.len(), 3);
        for name in HOOK_NAMES {
            assert!(hooks_dir.join(name).exists());
        }
    }

    #[test]
    #[cfg(unix)]
    fn stub_hooks_are_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        ensure_hooks(&hooks_dir).unwrap();
        let meta = std::fs::metadata(hooks_dir.join("on_create")).unwrap();
        assert_ne!(meta.permissions().mode() & 0o111, 0);
    }

    #[test]
    fn existing_hook_contents_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        std::fs::write(hooks_dir.join("on_create"), "#!/bin/sh\necho custom\n").unwrap();

        let created = ensure_hooks(&hooks_dir).unwrap();
        assert!(!created.contains(&"on_create".to_string()));
        assert_eq!(
            std::fs::read_to_string(hooks_dir.join("on_create")).unwrap(),
            "#!/bin/sh\necho custom\n"
        );
    }

    #[test]
    fn second_call_creates_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        ensure_hooks(&hooks_dir).unwrap();
        let created = ensure_hooks(&hooks_dir).unwrap();
        assert!(created.is_empty());
    }
}
