// SPDX-License-Identifier: MIT

//! Pool descriptor: `{min, max, check-command, drain-timeout}`.

use std::time::Duration;

/// A pool of interchangeable instances of one agent with a dynamic count
/// between `min` and `max`, driven by a scale-check command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolDescriptor {
    pub min: u32,
    pub max: u32,
    pub check_command: String,
    #[serde(with = "duration_secs")]
    pub drain_timeout: Duration,
}

impl PoolDescriptor {
    /// Clamp a raw scale-check result into `[min, max]`.
    pub fn clamp(&self, desired: u32) -> u32 {
        desired.clamp(self.min, self.max)
    }

    /// Instance names for a given desired count: `<name>-1 .. <name>-d`.
    pub fn instance_names(name: &str, count: u32) -> Vec<String> {
        (1..=count).map(|i| format!("{name}-{i}")).collect()
    }
}

/// `serde` helper storing a `Duration` as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(min: u32, max: u32) -> PoolDescriptor {
        PoolDescriptor {
            min,
            max,
            check_command: "echo 1".to_string(),
            drain_timeout: Duration::from_secs(5),
        }
    }

    #[yare::parameterized(
        within_range = { 1, 3, 2,  2 },
        below_min    = { 1, 3, 0,  1 },
        above_max    = { 1, 3, 10, 3 },
        exactly_min  = { 1, 3, 1,  1 },
        exactly_max  = { 1, 3, 3,  3 },
        fixed_size   = { 2, 2, 5,  2 },
    )]
    fn clamp(min: u32, max: u32, desired: u32, expected: u32) {
        assert_eq!(pool(min, max).clamp(desired), expected);
    }

    proptest! {
        #[test]
        fn clamp_is_always_within_bounds(min in 0u32..50, spread in 0u32..50, desired in 0u32..200) {
            let max = min + spread;
            let clamped = pool(min, max).clamp(desired);
            prop_assert!(clamped >= min && clamped <= max);
        }

        #[test]
        fn instance_names_len_matches_count(count in 0u32..20) {
            let names = PoolDescriptor::instance_names("worker", count);
            prop_assert_eq!(names.len(), count as usize);
            for (i, name) in names.iter().enumerate() {
                prop_assert_eq!(name, &format!("worker-{}", i + 1));
            }
        }
    }

    #[test]
    fn instance_names_are_one_indexed() {
        assert_eq!(
            PoolDescriptor::instance_names("worker", 3),
            vec!["worker-1", "worker-2", "worker-3"]
        );
    }

    #[test]
    fn instance_names_empty_for_zero_count() {
        assert!(PoolDescriptor::instance_names("worker", 0).is_empty());
    }
}
