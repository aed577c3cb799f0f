//! Error types for type and package resolution.

use thiserror::Error;

use crate::model::TypeId;

/// Errors raised while resolving references to packages, containers and types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unknown package '{0}'")]
    UnknownPackage(String),

    #[error("Unresolved type '{name}' referenced from '{package}' (tried: {})", .attempts.join("; "))]
    UnresolvedType {
        name: String,
        package: String,
        attempts: Vec<String>,
    },

    #[error("Unresolved interface or world '{name}' referenced from '{package}' (tried: {})", .attempts.join("; "))]
    UnresolvedContainer {
        name: String,
        package: String,
        attempts: Vec<String>,
    },

    #[error("Cyclic alias chain through '{0}'")]
    AliasCycle(String),

    #[error("Unknown type id {0}")]
    UnknownTypeId(TypeId),

    #[error("Unknown world '{0}'")]
    UnknownWorld(String),

    #[error("World '{0}' includes itself")]
    IncludeCycle(String),
}

impl ResolveError {
    /// The unresolved symbol, for reference-level failures.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::UnresolvedType { name, .. } | Self::UnresolvedContainer { name, .. } => {
                Some(name)
            }
            Self::UnknownPackage(name) | Self::UnknownWorld(name) => Some(name),
            _ => None,
        }
    }
}
