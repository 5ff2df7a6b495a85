// SPDX-License-Identifier: MIT

//! Formula symlink materializer for `<city>/.<state-dir>/formulas/`.
//! Automations and pool check commands name formulas by a short id; this
//! module keeps one symlink per known formula id pointing at its source
//! file, recreating it every tick and removing symlinks for formula ids no
//! longer present in any layer. Never touches a path that isn't already a
//! symlink this module owns, so a real file accidentally placed under
//! `formulas/` is left alone, and materializing twice in a row with no
//! config change touches no files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("creating formulas dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading formulas dir {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("linking formula {name} to {target}: {source}")]
    Link {
        name: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("removing stale formula link {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Report of one materialization pass, for event-log/stdout reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub linked: Vec<String>,
    pub removed: Vec<String>,
    pub skipped_non_symlink: Vec<String>,
}

/// Ensure `formulas_dir` contains exactly one symlink per entry in
/// `formulas` (name -> absolute source path), removing any symlink this
/// module created for a name no longer present. Entries that aren't
/// symlinks (or aren't ones of ours) are left untouched and reported in
/// `skipped_non_symlink`.
pub fn materialize(
    formulas_dir: &Path,
    formulas: &BTreeMap<String, PathBuf>,
) -> Result<MaterializeReport, FormulaError> {
    std::fs::create_dir_all(formulas_dir).map_err(|source| FormulaError::CreateDir {
        path: formulas_dir.to_path_buf(),
        source,
    })?;

    let mut report = MaterializeReport::default();

    let existing = list_existing(formulas_dir)?;
    for (name, entry_path) in &existing {
        if formulas.contains_key(name) {
            continue;
        }
        match std::fs::symlink_metadata(entry_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::remove_file(entry_path).map_err(|source| FormulaError::RemoveStale {
                    path: entry_path.clone(),
                    source,
                })?;
                report.removed.push(name.clone());
            }
            _ => report.skipped_non_symlink.push(name.clone()),
        }
    }

    for (name, target) in formulas {
        let link_path = formulas_dir.join(name);
        if let Ok(meta) = std::fs::symlink_metadata(&link_path) {
            if !meta.file_type().is_symlink() {
                report.skipped_non_symlink.push(name.clone());
                continue;
            }
            match std::fs::read_link(&link_path) {
                Ok(current) if &current == target => continue,
                _ => {
                    std::fs::remove_file(&link_path).map_err(|source| FormulaError::RemoveStale {
                        path: link_path.clone(),
                        source,
                    })?;
                }
            }
        }

        make_symlink(target, &link_path).map_err(|source| FormulaError::Link {
            name: name.clone(),
            target: target.clone(),
            source,
        })?;
        report.linked.push(name.clone());
    }

    Ok(report)
}

fn list_existing(formulas_dir: &Path) -> Result<Vec<(String, PathBuf)>, FormulaError> {
    let mut out = Vec::new();
    let entries = std::fs::read_dir(formulas_dir).map_err(|source| FormulaError::ReadDir {
        path: formulas_dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| FormulaError::ReadDir {
            path: formulas_dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push((name, entry.path()));
    }
    Ok(out)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::fs::copy(target, link).map(|_| ())
}
