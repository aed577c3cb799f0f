//! Canonical ABI calculator.
//!
//! Computes how types flatten into core wasm words, how they are laid out in
//! linear memory, and how function signatures cross the component boundary.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for ABI operations
//! - [`flatten`]: Core word kinds, flattening and the join rule
//! - [`layout`]: Memory size, alignment and field offsets
//! - [`signature`]: Spill and return-pointer decisions per function
//! - [`memory`]: Simulated linear memory with allocation tracking
//! - [`buffer`]: Low-level buffer read/write helpers

mod buffer;
mod error;
mod flatten;
mod layout;
mod memory;
mod signature;

pub use buffer::align_to;
pub use error::CanonicalAbiError;
pub use flatten::{Bitcast, CoreType};
pub(crate) use flatten::{check_flags, unsupported};
pub use layout::{Layout, VariantLayout};
pub use memory::{AllocationMark, LinearMemory, MemoryStats};
pub use signature::FunctionAbi;

use crate::model::{Type, TypeArena, TypeId};
use crate::resolve::TypeResolver;

/// Maximum number of flat words passed as direct parameters.
pub const MAX_FLAT_PARAMS: usize = 16;

/// Maximum number of flat words returned directly.
pub const MAX_FLAT_RESULTS: usize = 1;

/// Maximum number of labels in a `flags` type (one `i32` word).
pub const MAX_FLAGS: usize = 32;

/// Canonical ABI calculator over a type arena.
///
/// Every operation is pure. Custom references and aliases are expanded on
/// demand through the optional [`TypeResolver`]; without one, meeting a
/// reference is a [`CanonicalAbiError::MissingResolver`] error.
///
/// # Example
///
/// ```
/// use wit_canon::abi::{CanonicalAbi, CoreType};
/// use wit_canon::model::{Type, TypeArena};
///
/// let mut types = TypeArena::new();
/// let s32 = types.alloc(Type::S32);
/// let f64 = types.alloc(Type::F64);
/// let point = types.record("point", [("x", s32), ("y", f64)]);
///
/// let abi = CanonicalAbi::new(&types);
/// assert_eq!(abi.flatten(point).unwrap(), vec![CoreType::I32, CoreType::F64]);
/// assert_eq!(abi.memory_size(point).unwrap(), 16);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CanonicalAbi<'a> {
    pub(crate) types: &'a TypeArena,
    pub(crate) resolver: Option<TypeResolver<'a>>,
}

impl<'a> CanonicalAbi<'a> {
    /// Calculator for a self-contained arena with no references.
    pub fn new(types: &'a TypeArena) -> Self {
        Self {
            types,
            resolver: None,
        }
    }

    /// Calculator that resolves references through `resolver`.
    pub fn with_resolver(resolver: TypeResolver<'a>) -> Self {
        Self {
            types: resolver.types(),
            resolver: Some(resolver),
        }
    }

    pub fn types(&self) -> &'a TypeArena {
        self.types
    }

    /// Look up `id`, following references to the concrete node.
    pub fn lookup(&self, id: TypeId) -> Result<(TypeId, &'a Type), CanonicalAbiError> {
        let ty = self
            .types
            .get(id)
            .ok_or(CanonicalAbiError::UnknownType(id))?;
        if !ty.is_reference() {
            return Ok((id, ty));
        }
        match &self.resolver {
            Some(resolver) => Ok(resolver.resolve_type(id)?),
            None => Err(CanonicalAbiError::MissingResolver(match ty {
                Type::Custom(reference) => reference.to_string(),
                Type::Alias(alias) => alias.to_string(),
                other => other.kind().to_string(),
            })),
        }
    }

    pub(crate) fn resolved(&self, id: TypeId) -> Result<&'a Type, CanonicalAbiError> {
        Ok(self.lookup(id)?.1)
    }

    /// Human readable description of a type, for diagnostics and plans.
    pub fn describe(&self, id: TypeId) -> String {
        match self.lookup(id) {
            Ok((_, ty)) => match ty.type_name() {
                Some(name) => format!("{} {}", ty.kind(), name),
                None => ty.kind().to_string(),
            },
            Err(_) => format!("unresolved {id}"),
        }
    }
}
