// SPDX-License-Identifier: MIT

//! Rig: a project directory participating in a city.

use std::path::PathBuf;

/// A project directory within a city.
///
/// `prefix` is either the explicit short prefix from config, or derived from
/// the name by splitting on separators/camel-case and taking first letters.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rig {
    pub name: String,
    pub path: PathBuf,
    pub prefix: String,
    #[serde(default)]
    pub suspended: bool,
}

impl Rig {
    pub fn new(name: impl Into<String>, path: PathBuf, explicit_prefix: Option<String>) -> Self {
        let name = name.into();
        let prefix = explicit_prefix.unwrap_or_else(|| derive_prefix(&name));
        Self {
            name,
            path,
            prefix,
            suspended: false,
        }
    }
}

/// Derive a short prefix from a rig name by splitting on separators and
/// camelCase boundaries, then taking the first letter of each segment.
///
/// `"my-cool-rig"` -> `"mcr"`, `"MyCoolRig"` -> `"mcr"`, `"widgets"` -> `"w"`.
pub fn derive_prefix(name: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == ' ' || ch == '.' {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase();
        current.push(ch);
    }
    if !current.is_empty() {
        segments.push(current);
    }

    let prefix: String = segments
        .iter()
        .filter_map(|s| s.chars().next())
        .flat_map(|c| c.to_lowercase())
        .collect();

    if prefix.is_empty() {
        name.to_lowercase()
    } else {
        prefix
    }
}

/// Validate that every rig has a unique prefix.
///
/// Returns the first duplicate prefix found, if any.
pub fn find_duplicate_prefix<'a>(rigs: impl IntoIterator<Item = &'a Rig>) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for rig in rigs {
        if !seen.insert(rig.prefix.as_str()) {
            return Some(rig.prefix.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        hyphenated  = { "my-cool-rig", "mcr" },
        camel_case  = { "MyCoolRig",   "mcr" },
        single_word = { "widgets",     "w" },
        underscored = { "api_gateway", "ag" },
        dotted      = { "svc.edge",    "se" },
    )]
    fn derives_prefix(name: &str, expected: &str) {
        assert_eq!(derive_prefix(name), expected);
    }

    #[test]
    fn explicit_prefix_wins() {
        let rig = Rig::new("widgets", PathBuf::from("/tmp/widgets"), Some("wid".into()));
        assert_eq!(rig.prefix, "wid");
    }

    #[test]
    fn detects_duplicate_prefixes() {
        let rigs = vec![
            Rig::new("alpha", PathBuf::from("/a"), None),
            Rig::new("apple", PathBuf::from("/b"), None),
        ];
        assert_eq!(find_duplicate_prefix(&rigs), Some("a".to_string()));
    }

    #[test]
    fn unique_prefixes_pass() {
        let rigs = vec![
            Rig::new("alpha", PathBuf::from("/a"), None),
            Rig::new("beta", PathBuf::from("/b"), None),
        ];
        assert_eq!(find_duplicate_prefix(&rigs), None);
    }
}
