//! Unified error type for the wit-canon library.
//!
//! Every module has its own error enum; [`Error`] wraps them all so callers
//! that cross module boundaries can use a single type.

use thiserror::Error;

use crate::abi::CanonicalAbiError;
use crate::config::ConfigError;
use crate::loader::LoadError;
use crate::model::{NameError, ParseVersionError};
use crate::resolve::ResolveError;

/// Unified error type for all wit-canon operations.
///
/// # Example
///
/// ```
/// use wit_canon::{loader, Result};
///
/// fn count_packages(dir: &str) -> Result<usize> {
///     let project = loader::load_dirs([dir], "json")?;
///     Ok(project.packages().len())
/// }
/// # let _ = count_packages;
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Error from layout, flattening or marshaling.
    #[error(transparent)]
    Abi(#[from] CanonicalAbiError),

    /// A package, container or type reference did not resolve.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Error while reading or ingesting documents.
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed package reference.
    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Version(#[from] ParseVersionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is an ABI error.
    pub fn is_abi(&self) -> bool {
        matches!(self, Self::Abi(_))
    }

    /// Returns `true` for resolution failures, including ones surfaced
    /// through the ABI calculator.
    pub fn is_resolve(&self) -> bool {
        matches!(
            self,
            Self::Resolve(_) | Self::Abi(CanonicalAbiError::Unresolved(_))
        )
    }

    /// Returns `true` if this is a load error.
    pub fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if this is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
