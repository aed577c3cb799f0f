//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```no_run
//! use wit_canon::prelude::*;
//!
//! # fn main() -> wit_canon::Result<()> {
//! let project = load_dirs(["wit"], "json")?;
//! let point = project.find_type("ns:geo/shapes.point@1.0.0")?;
//! let abi = project.abi();
//! println!("{} bytes, {:?}", abi.memory_size(point)?, abi.flatten(point)?);
//! # Ok(())
//! # }
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Loading and lookup
pub use crate::loader::{LoadError, Loader, SourceGroup, load_dirs};
pub use crate::project::{Project, WorldFunction};
pub use crate::resolve::{ResolveError, TypeResolver};

// Type model
pub use crate::model::{PackageNameVersion, SemanticVersion, Type, TypeArena, TypeId};

// ABI types
pub use crate::abi::{CanonicalAbi, CanonicalAbiError, CoreType, FunctionAbi, LinearMemory};

// Marshaling
pub use crate::marshal::{CallFrame, Direction, FunctionPlan, HandleTable, Value, WasmVal};

pub use crate::report::Report;
