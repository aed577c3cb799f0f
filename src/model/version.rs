//! Semantic versioning support for WIT package versions.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use thiserror::Error;

/// Error returned when a version string is not valid semver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("Empty version string")]
    Empty,

    #[error("Missing {0} version component in '{1}'")]
    MissingComponent(&'static str, String),

    #[error("Invalid {component} version component '{value}'")]
    InvalidNumber {
        component: &'static str,
        value: String,
    },

    #[error("Unexpected extra version component in '{0}'")]
    TrailingComponent(String),
}

/// Semantic version following WIT package versioning convention.
///
/// Build metadata is kept for display but ignored for equality, hashing and
/// ordering, so `1.0.0+a` and `1.0.0+b` name the same package version.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: String,
    pub build: String,
}

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: String::new(),
            build: String::new(),
        }
    }

    /// Returns a copy with the pre-release identifier set.
    pub fn with_pre(mut self, pre: impl Into<String>) -> Self {
        self.pre = pre.into();
        self
    }

    /// Returns a copy with the build metadata set.
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = build.into();
        self
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Parse from string like "1.2.3", "0.2.0-rc.1" or "1.0.0+build.5".
    pub fn parse(s: &str) -> Result<Self, ParseVersionError> {
        if s.is_empty() {
            return Err(ParseVersionError::Empty);
        }

        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) => (rest, build.to_string()),
            None => (s, String::new()),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, pre.to_string()),
            None => (rest, String::new()),
        };

        let mut parts = core.split('.');
        let major = parse_component(parts.next(), "major", s)?;
        let minor = parse_component(parts.next(), "minor", s)?;
        let patch = parse_component(parts.next(), "patch", s)?;
        // Ensure no extra parts
        if parts.next().is_some() {
            return Err(ParseVersionError::TrailingComponent(s.to_string()));
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

fn parse_component(
    part: Option<&str>,
    component: &'static str,
    full: &str,
) -> Result<u64, ParseVersionError> {
    let part = part
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ParseVersionError::MissingComponent(component, full.to_string()))?;
    part.parse().map_err(|_| ParseVersionError::InvalidNumber {
        component,
        value: part.to_string(),
    })
}

/// Compare dot-separated pre-release identifiers: numeric identifiers sort
/// numerically and before alphanumeric ones, and a shorter list sorts first
/// when all shared identifiers are equal.
fn compare_pre(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release sorts before its release.
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, false) => compare_pre(&self.pre, &other.pre),
            })
    }
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SemanticVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(SemanticVersion::parse("0.1.0"), Ok(SemanticVersion::new(0, 1, 0)));
        assert_eq!(SemanticVersion::parse("1.2.3"), Ok(SemanticVersion::new(1, 2, 3)));
        assert_eq!(
            SemanticVersion::parse("1.2.3-rc.1"),
            Ok(SemanticVersion::new(1, 2, 3).with_pre("rc.1"))
        );
        assert!(SemanticVersion::parse("invalid").is_err());
        assert!(matches!(
            SemanticVersion::parse("1.2"),
            Err(ParseVersionError::MissingComponent("patch", _))
        ));
        assert!(matches!(
            SemanticVersion::parse("1.2.3.4"),
            Err(ParseVersionError::TrailingComponent(_))
        ));
        assert_eq!(SemanticVersion::parse(""), Err(ParseVersionError::Empty));
    }

    #[test]
    fn test_display() {
        assert_eq!(SemanticVersion::new(0, 1, 0).to_string(), "0.1.0");
        assert_eq!(
            SemanticVersion::new(1, 2, 3)
                .with_pre("alpha")
                .with_build("7")
                .to_string(),
            "1.2.3-alpha+7"
        );
    }

    #[test]
    fn test_build_metadata_ignored() {
        let a = SemanticVersion::new(1, 0, 0).with_build("a");
        let b = SemanticVersion::new(1, 0, 0).with_build("b");
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_precedence() {
        let ordered = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
            "1.0.1",
            "1.1.0",
            "2.0.0",
        ];
        let parsed: Vec<_> = ordered
            .iter()
            .map(|s| SemanticVersion::parse(s).unwrap())
            .collect();
        for pair in parsed.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }
}
