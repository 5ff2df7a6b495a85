// SPDX-License-Identifier: MIT

//! Load the primary config file plus overlay files and merge/validate them.

use crate::model::Config;
use crate::validate::{validate, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Load and validate the config at `primary`, applying any `overlays` in
/// order (later overlays win on a field-by-field basis via TOML table
/// merge).
pub fn load(primary: &Path, overlays: &[PathBuf]) -> Result<Config, ConfigError> {
    let mut merged = read_toml_value(primary)?;
    for overlay in overlays {
        let overlay_value = read_toml_value(overlay)?;
        merge_toml(&mut merged, overlay_value);
    }

    let config: Config =
        serde::Deserialize::deserialize(merged).map_err(|source| ConfigError::Parse {
            path: primary.to_path_buf(),
            source: Box::new(source),
        })?;

    validate(&config)?;
    Ok(config)
}

fn read_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    text.parse::<toml::Value>()
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
}

/// Merge `overlay` into `base` in place. Tables merge key-by-key
/// (recursively); any other value type in `overlay` replaces the value in
/// `base` outright, including arrays (arrays are not concatenated — an
/// overlay that sets `agents = [...]` replaces the primary's agent list,
/// matching how a human reading two files would expect layering to work).
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_toml(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{content}").unwrap();
        f
    }

    const MINIMAL: &str = r#"
        [workspace]
        name = "test"

        [[agents]]
        name = "mayor"
        command = "claude"
    "#;

    #[test]
    fn loads_minimal_config() {
        let f = write_temp(MINIMAL);
        let config = load(f.path(), &[]).unwrap();
        assert_eq!(config.workspace.name, "test");
        assert_eq!(config.agents.len(), 1);
    }

    #[test]
    fn overlay_overrides_scalar_fields() {
        let primary = write_temp(MINIMAL);
        let overlay = write_temp(
            r#"
            [workspace]
            suspended = true
        "#,
        );
        let config = load(primary.path(), &[overlay.path().to_path_buf()]).unwrap();
        assert!(config.workspace.suspended);
        assert_eq!(config.workspace.name, "test");
    }

    #[test]
    fn rejects_missing_file() {
        let err = load(Path::new("/nonexistent/city.toml"), &[]);
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn rejects_invalid_toml() {
        let f = write_temp("not valid toml [[[");
        let err = load(f.path(), &[]);
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }
}
