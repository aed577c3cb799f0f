//! Error types for canonical ABI operations.

use thiserror::Error;

use crate::model::TypeId;
use crate::resolve::ResolveError;

/// Errors that can occur while computing layouts or lowering and lifting values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanonicalAbiError {
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Invalid discriminant {discriminant} for variant with {num_cases} cases")]
    InvalidDiscriminant { discriminant: u32, num_cases: usize },

    #[error("Invalid char value: {0}")]
    InvalidChar(u32),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Unsupported type shape: {0}")]
    UnsupportedType(String),

    #[error("Flags type '{name}' has {count} flags, at most {max} are supported")]
    TooManyFlags {
        name: String,
        count: usize,
        max: usize,
    },

    #[error("Unknown type id {0}")]
    UnknownType(TypeId),

    #[error("Type reference '{0}' needs a resolver")]
    MissingResolver(String),

    #[error(transparent)]
    Unresolved(#[from] ResolveError),

    #[error("Expected {expected} flat values, got {got}")]
    FlatArityMismatch { expected: usize, got: usize },

    #[error("Invalid memory pointer: {ptr} with length {len} exceeds memory size {memory_size}")]
    InvalidMemoryPointer {
        ptr: u32,
        len: u32,
        memory_size: usize,
    },

    #[error("Allocation at {ptr} is not aligned to {align}")]
    MisalignedPointer { ptr: u32, align: usize },

    #[error("Free of unknown allocation at {0}")]
    UnknownAllocation(u32),

    #[error("Double free of allocation at {0}")]
    DoubleFree(u32),

    #[error(
        "Free of allocation at {ptr} with size {size} and align {align}, \
         allocated with size {expected_size} and align {expected_align}"
    )]
    AllocationMismatch {
        ptr: u32,
        size: usize,
        align: usize,
        expected_size: usize,
        expected_align: usize,
    },

    #[error("Unknown resource handle {0}")]
    HandleNotFound(u32),
}
