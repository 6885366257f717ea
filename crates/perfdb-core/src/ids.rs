use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn from_str(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

key_newtype!(Fingerprint);
key_newtype!(FormatTag);
key_newtype!(OrderKey);

impl Fingerprint {
    /// Abbreviated form for console output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl FormatTag {
    pub const JSON: &'static str = "json";
    pub const YAML: &'static str = "yaml";
    /// Not a wire format: asks the registry to try every decoder in turn.
    pub const AUTO: &'static str = "auto";

    pub fn json() -> Self {
        Self::from_str(Self::JSON)
    }

    pub fn yaml() -> Self {
        Self::from_str(Self::YAML)
    }

    pub fn auto() -> Self {
        Self::from_str(Self::AUTO)
    }

    pub fn is_auto(&self) -> bool {
        self.0 == Self::AUTO
    }
}

/// Run-order keys sort naturally: digit runs compare as numbers, everything
/// else compares as text. "r9" < "r10", "2026-01-02" < "2026-01-10".
impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn split_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut prev: Option<bool> = None;
    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        if let Some(p) = prev {
            if p != digit {
                runs.push(&s[start..i]);
                start = i;
            }
        }
        prev = Some(digit);
    }
    if start < s.len() {
        runs.push(&s[start..]);
    }
    runs
}

fn cmp_run(a: &str, b: &str) -> Ordering {
    let a_num = a.bytes().all(|c| c.is_ascii_digit());
    let b_num = b.bytes().all(|c| c.is_ascii_digit());
    if a_num && b_num {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ra = split_runs(a);
    let rb = split_runs(b);
    for (x, y) in ra.iter().zip(rb.iter()) {
        match cmp_run(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    ra.len().cmp(&rb.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        assert!(OrderKey::from_str("9") < OrderKey::from_str("10"));
        assert!(OrderKey::from_str("r9") < OrderKey::from_str("r10"));
        assert!(OrderKey::from_str("1.2.10") > OrderKey::from_str("1.2.9"));
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let a = OrderKey::from_str("2026-01-02T00:00:00Z");
        let b = OrderKey::from_str("2026-01-10T00:00:00Z");
        assert!(a < b);
    }

    #[test]
    fn leading_zeros_do_not_collapse_distinct_keys() {
        let a = OrderKey::from_str("01");
        let b = OrderKey::from_str("1");
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(natural_cmp("01", "1"), Ordering::Equal);
    }

    #[test]
    fn short_fingerprint() {
        let fp = Fingerprint::from_str("0123456789abcdef");
        assert_eq!(fp.short(), "0123456789ab");
        assert_eq!(Fingerprint::from_str("abc").short(), "abc");
    }
}
