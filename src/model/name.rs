//! Package names: `ns:group/name@1.2.3`.

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::version::{ParseVersionError, SemanticVersion};

/// Errors produced while parsing a package reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Empty package name")]
    Empty,

    #[error("Empty segment in package name '{0}'")]
    EmptySegment(String),

    #[error("Package name '{0}' has a namespace but no name")]
    MissingName(String),

    #[error("Invalid version in package name '{name}': {source}")]
    Version {
        name: String,
        #[source]
        source: ParseVersionError,
    },
}

/// A package name split into namespace segments and a name path.
///
/// `ns:group/name` has namespace `["ns"]` and name path `["group", "name"]`.
/// A bare identifier such as `shapes` has an empty namespace and a single
/// name segment; those only make sense relative to some enclosing package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName {
    pub namespace: Vec<String>,
    pub name: Vec<String>,
}

impl PackageName {
    pub fn new<N, P>(namespace: N, name: P) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            name: name.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        let (namespace, path) = match s.rsplit_once(':') {
            Some((ns, path)) => (ns.split(':').map(str::to_string).collect(), path),
            None => (Vec::new(), s),
        };
        let name: Vec<String> = path.split('/').map(str::to_string).collect();
        let empty_namespace = namespace.iter().any(|seg: &String| seg.is_empty());
        if path.is_empty() {
            return Err(NameError::MissingName(s.to_string()));
        }
        if empty_namespace || name.iter().any(String::is_empty) {
            return Err(NameError::EmptySegment(s.to_string()));
        }
        Ok(Self { namespace, name })
    }

    /// A name with no namespace, used for references relative to a scope.
    pub fn is_identifier_only(&self) -> bool {
        self.namespace.is_empty()
    }

    pub fn last_name_part(&self) -> Option<&str> {
        self.name.last().map(String::as_str)
    }

    /// Split off the last name segment, returning it with the shortened name.
    ///
    /// Returns `None` when only one name segment is left, since a package
    /// cannot be addressed by its namespace alone.
    pub fn without_last_name_part(&self) -> Option<(String, PackageName)> {
        if self.name.len() < 2 {
            return None;
        }
        let mut shorter = self.clone();
        let last = shorter.name.pop()?;
        Some((last, shorter))
    }

    /// Append a name segment (`ns:pkg` + `iface` -> `ns:pkg/iface`).
    pub fn with_name_part(&self, part: impl Into<String>) -> PackageName {
        let mut longer = self.clone();
        longer.name.push(part.into());
        longer
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}:", self.namespace.join(":"))?;
        }
        write!(f, "{}", self.name.join("/"))
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A package name with an optional version, the key used to find a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageNameVersion {
    pub name: PackageName,
    pub version: Option<SemanticVersion>,
}

impl PackageNameVersion {
    pub fn new(name: PackageName, version: Option<SemanticVersion>) -> Self {
        Self { name, version }
    }

    /// Parse `ns:group/name`, `ns:group/name@1.0.0` or a bare identifier.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => {
                let version =
                    SemanticVersion::parse(version).map_err(|source| NameError::Version {
                        name: s.to_string(),
                        source,
                    })?;
                (name, Some(version))
            }
            None => (s, None),
        };
        Ok(Self {
            name: PackageName::parse(name)?,
            version,
        })
    }

    pub fn is_identifier_only(&self) -> bool {
        self.name.is_identifier_only()
    }

    /// Like [`PackageName::without_last_name_part`], keeping the version.
    pub fn without_last_name_part(&self) -> Option<(String, PackageNameVersion)> {
        let (last, name) = self.name.without_last_name_part()?;
        Some((
            last,
            Self {
                name,
                version: self.version.clone(),
            },
        ))
    }

    pub fn with_name_part(&self, part: impl Into<String>) -> PackageNameVersion {
        Self {
            name: self.name.with_name_part(part),
            version: self.version.clone(),
        }
    }
}

impl std::fmt::Display for PackageNameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageNameVersion {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageNameVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let name = PackageNameVersion::parse("ns:geo/shapes@1.0.0").unwrap();
        assert_eq!(name.name.namespace, vec!["ns"]);
        assert_eq!(name.name.name, vec!["geo", "shapes"]);
        assert_eq!(name.version, Some(SemanticVersion::new(1, 0, 0)));
        assert_eq!(name.to_string(), "ns:geo/shapes@1.0.0");
        assert!(!name.is_identifier_only());
    }

    #[test]
    fn test_parse_nested_namespace() {
        let name = PackageName::parse("a:b:c/d").unwrap();
        assert_eq!(name.namespace, vec!["a", "b"]);
        assert_eq!(name.name, vec!["c", "d"]);
        assert_eq!(name.to_string(), "a:b:c/d");
    }

    #[test]
    fn test_identifier_only() {
        let name = PackageNameVersion::parse("shapes").unwrap();
        assert!(name.is_identifier_only());
        assert_eq!(name.name.last_name_part(), Some("shapes"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PackageName::parse(""), Err(NameError::Empty));
        assert!(matches!(PackageName::parse("ns:"), Err(NameError::MissingName(_))));
        assert!(matches!(PackageName::parse("ns:a//b"), Err(NameError::EmptySegment(_))));
        assert!(matches!(
            PackageNameVersion::parse("ns:a@x"),
            Err(NameError::Version { .. })
        ));
    }

    #[test]
    fn test_strip_and_extend() {
        let name = PackageNameVersion::parse("ns:geo/shapes@1.0.0").unwrap();
        let (last, shorter) = name.without_last_name_part().unwrap();
        assert_eq!(last, "shapes");
        assert_eq!(shorter.to_string(), "ns:geo@1.0.0");
        assert!(shorter.without_last_name_part().is_none());
        assert_eq!(shorter.with_name_part("shapes"), name);
    }
}
