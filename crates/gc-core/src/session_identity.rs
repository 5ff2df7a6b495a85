// SPDX-License-Identifier: MIT

//! Session identity derivation.
//!
//! A session identity is the stable string the session provider uses to key
//! a process: `gc-<city>-<sanitized-qualified-name>`. The `gc-<city>-` part
//! is the "city prefix" that brackets every session a controller owns; no
//! session whose name lacks it is ever touched by the reconciler.

/// The prefix that brackets every session identity owned by a city's
/// controller.
pub fn city_prefix(city_name: &str) -> String {
    format!("gc-{city_name}-")
}

/// Replace any character that is not alphanumeric, `-`, or `_` with `-`, and
/// collapse the qualified agent name into something safe to embed in a
/// session identity used by terminal multiplexers, container names, etc.
pub fn sanitize_qualified_name(qualified_name: &str) -> String {
    qualified_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Derive the default session identity for a qualified agent name within a
/// city. Templated identities (an explicit override in config) bypass this
/// and are used verbatim by the desired-state builder.
pub fn derive_session_identity(city_name: &str, qualified_name: &str) -> String {
    format!(
        "{}{}",
        city_prefix(city_name),
        sanitize_qualified_name(qualified_name)
    )
}

/// Build a qualified agent name: `<rig>/<local>` when rig-scoped, else
/// `<local>`.
pub fn qualified_agent_name(rig: Option<&str>, local_name: &str) -> String {
    match rig {
        Some(rig) => format!("{rig}/{local_name}"),
        None => local_name.to_string(),
    }
}
