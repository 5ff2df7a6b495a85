// SPDX-License-Identifier: MIT

//! Per-rig `routes.jsonl` writer. Each line is one JSON object
//! `{"prefix", "path"}` naming a rig reachable from this one, including
//! this rig itself under prefix `"."`. Rewritten in full on every
//! reconcile tick rather than patched incrementally, so the file is always
//! a faithful projection of the current rig set; writes are made
//! idempotent (byte-identical given the same rig set) by sorting on
//! prefix first.

use gc_core::rig::Rig;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutesError {
    #[error("creating beads state dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing routes file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing route entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
struct RouteEntry {
    prefix: String,
    path: String,
}

/// Write `<beads_state_dir>/routes.jsonl` for one rig, listing every rig in
/// the workspace (this one included as `"."`) relative to `rig_path`.
pub fn write_routes(
    beads_state_dir: &Path,
    rig_path: &Path,
    rigs: &[Rig],
) -> Result<(), RoutesError> {
    std::fs::create_dir_all(beads_state_dir).map_err(|source| RoutesError::CreateDir {
        path: beads_state_dir.to_path_buf(),
        source,
    })?;

    let mut entries: Vec<RouteEntry> = Vec::with_capacity(rigs.len());
    for rig in rigs {
        let prefix = if rig.path == rig_path {
            ".".to_string()
        } else {
            rig.prefix.clone()
        };
        let relative = relative_path(rig_path, &rig.path);
        entries.push(RouteEntry {
            prefix,
            path: relative,
        });
    }
    entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    let mut buf = String::new();
    for entry in &entries {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }

    let path = beads_state_dir.join("routes.jsonl");
    let tmp_path = beads_state_dir.join("routes.jsonl.tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|source| RoutesError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        tmp.write_all(buf.as_bytes())
            .map_err(|source| RoutesError::Write {
                path: tmp_path.clone(),
                source,
            })?;
    }
    std::fs::rename(&tmp_path, &path).map_err(|source| RoutesError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(())
}

fn relative_path(from: &Path, to: &Path) -> String {
    pathdiff(to, from)
        .unwrap_or_else(|| to.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Minimal relative-path diff, sufficient for the sibling-directory layout
/// rigs live in — no crate dependency needed beyond what's already pulled
/// in for a helper this narrow.
fn pathdiff(to: &Path, from: &Path) -> Option<PathBuf> {
    let to_components: Vec<_> = to.components().collect();
    let from_components: Vec<_> = from.components().collect();

    let common = to_components
        .iter()
        .zip(from_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &to_components[common..] {
        result.push(component);
    }

    if result.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(result)
    }
}
