//! Semantic version parsing and precedence.
//!
//! Registry tags are looser than strict semver (`v1.2`, `2`, `1.04.0`), so
//! input is normalized to a full `major.minor.patch` core before being handed
//! to [`semver`]. Ordering follows semver precedence and ignores build
//! metadata.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::error::UpdateError;

/// A parsed, comparable version.
#[derive(Debug, Clone)]
pub struct Version(semver::Version);

impl Version {
    /// Parse a dotted numeric version with an optional pre-release suffix.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidVersion`] when the core is not 1–3
    /// numeric components or the suffix is not a valid semver identifier.
    pub fn parse(input: &str) -> Result<Self, UpdateError> {
        let invalid = |reason: String| UpdateError::InvalidVersion {
            input: input.to_owned(),
            reason,
        };

        let trimmed = input.trim();
        let body = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let (rest, build) = match body.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (body, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        if core.is_empty() {
            return Err(invalid("empty version".to_owned()));
        }

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid(format!(
                "expected at most 3 numeric components, found {}",
                parts.len()
            )));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("`{part}` is not a number")));
            }
            *slot = part
                .parse()
                .map_err(|e| invalid(format!("`{part}`: {e}")))?;
        }

        let mut version = semver::Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = pre {
            if pre.is_empty() {
                return Err(invalid("empty pre-release".to_owned()));
            }
            version.pre = semver::Prerelease::new(pre).map_err(|e| invalid(e.to_string()))?;
        }
        if let Some(build) = build {
            if build.is_empty() {
                return Err(invalid("empty build metadata".to_owned()));
            }
            version.build =
                semver::BuildMetadata::new(build).map_err(|e| invalid(e.to_string()))?;
        }

        Ok(Self(version))
    }
}

/// Order two versions by semver precedence.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.major, self.0.minor, self.0.patch)
            .cmp(&(other.0.major, other.0.minor, other.0.patch))
            // semver orders an empty pre-release above any non-empty one.
            .then_with(|| self.0.pre.cmp(&other.0.pre))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parses_full_core() {
        let version = v("1.2.3");
        assert_eq!(version.to_string(), "1.2.3");
        assert!(v("1.2.3") > v("1.2.3-rc.1"));
    }

    #[test]
    fn pads_short_cores() {
        assert_eq!(v("2").to_string(), "2.0.0");
        assert_eq!(v("1.4").to_string(), "1.4.0");
    }

    #[test]
    fn strips_tag_prefix_and_whitespace() {
        assert_eq!(v("v1.2.0"), v("1.2.0"));
        assert_eq!(v(" V3.1.4 ").to_string(), "3.1.4");
    }

    #[test]
    fn normalizes_leading_zeros() {
        assert_eq!(v("01.02.003").to_string(), "1.2.3");
    }

    #[test]
    fn keeps_prerelease_and_build() {
        let version = v("2.0.0-rc.1+build.7");
        assert!(version < v("2.0.0"));
        assert_eq!(version.to_string(), "2.0.0-rc.1+build.7");
    }

    #[test]
    fn rejects_garbage() {
        for input in [
            "", "  ", "v", "abc", "1.x.0", "1..0", "1.2.3.4", ".1", "1.0.0-", "1.0.0+", "-1.0",
            "1.0.0-beta..1",
        ] {
            let err = Version::parse(input).unwrap_err();
            assert!(
                matches!(err, UpdateError::InvalidVersion { .. }),
                "{input:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn compares_numerically_not_lexicographically() {
        assert_eq!(compare(&v("1.9.0"), &v("1.10.0")), Ordering::Less);
        assert_eq!(compare(&v("1.10.0"), &v("1.9.0")), Ordering::Greater);
        assert_eq!(compare(&v("0.1.10"), &v("0.1.9")), Ordering::Greater);
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-rc.1") > v("0.9.9"));
    }

    #[test]
    fn build_metadata_is_ignored() {
        assert_eq!(compare(&v("1.0.0+a"), &v("1.0.0+b")), Ordering::Equal);
        assert_eq!(v("1.0.0+linux"), v("1.0.0"));
    }

    #[test]
    fn ordering_is_reflexive_antisymmetric_and_transitive() {
        let samples: Vec<Version> = [
            "0.0.1",
            "0.1.0",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-beta",
            "1.0.0-rc.1",
            "1.0.0",
            "1.0.0+meta",
            "1.2",
            "1.9.0",
            "1.10.0",
            "2",
            "10.0.0",
        ]
        .iter()
        .map(|s| v(s))
        .collect();

        for a in &samples {
            assert_eq!(compare(a, a), Ordering::Equal);
            for b in &samples {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{a} vs {b}");
                for c in &samples {
                    if compare(a, b) != Ordering::Greater && compare(b, c) != Ordering::Greater {
                        assert_ne!(compare(a, c), Ordering::Greater, "{a} <= {b} <= {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn from_str_matches_parse() {
        let parsed: Version = "v4.5.6".parse().unwrap();
        assert_eq!(parsed, v("4.5.6"));
    }
}
