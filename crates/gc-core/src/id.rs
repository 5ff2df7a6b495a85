// SPDX-License-Identifier: MIT

//! String-newtype helper shared by the id-like types in this crate.

/// Truncate a string slice to at most `n` characters without panicking on a
/// multi-byte boundary in the middle of the requested length.
pub trait ShortId {
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        match self.char_indices().nth(n) {
            Some((byte_idx, _)) => &self[..byte_idx],
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        truncates         = { "gc-test-mayor", 6,  "gc-tes" },
        noop_when_shorter = { "abc",            10, "abc" },
        exact_length      = { "abcde",          5,  "abcde" },
        zero              = { "abcde",          0,  "" },
        multibyte_safe    = { "café",           3,  "caf" },
    )]
    fn short(input: &str, n: usize, expected: &str) {
        assert_eq!(input.short(n), expected);
    }
}
