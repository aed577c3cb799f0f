//! WIT package resolution and canonical ABI calculation.
//!
//! This library loads parsed IDL documents into an arena-based type model,
//! resolves references across packages and versions, and computes how every
//! function crosses the component boundary: flattened core words, memory
//! layout, spill and return-pointer decisions, and the ownership and cleanup
//! protocol for strings, lists and resource handles.
//!
//! # Quick Start
//!
//! ```no_run
//! use wit_canon::prelude::*;
//!
//! # fn main() -> wit_canon::Result<()> {
//! let project = load_dirs(["wit/deps/geo", "wit"], "json")?;
//! let report = Report::for_world(&project, "ns:app/main")?;
//! for function in &report.functions {
//!     println!("{}: {:?}", function.name, function.abi.as_ref().map(|abi| &abi.flat_params));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`model`] - Names, versions, the type arena and package containers
//! - [`document`] - The parsed document tree (parser boundary)
//! - [`loader`] - Directory grouping and ingestion into the model
//! - [`resolve`] - Package and type reference resolution
//! - [`project`] - Loaded packages, type lookup and world expansion
//! - [`abi`] - Flattening, layout and function signatures
//! - [`marshal`] - Lowering, lifting, call simulation and instruction plans
//! - [`report`] - Serializable ABI reports for code emitters
//! - [`config`] - TOML configuration
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `cli` - Enable the command-line interface binary and [`subscriber`]
//! - `full` - Enable all features

pub mod abi;
pub mod config;
pub mod document;
pub mod loader;
mod logging;
pub mod marshal;
pub mod model;
pub mod prelude;
pub mod project;
pub mod report;
pub mod resolve;
#[cfg(feature = "cli")]
pub mod subscriber;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

pub use abi::{CanonicalAbi, CanonicalAbiError, CoreType, FunctionAbi, LinearMemory};
pub use loader::{LoadError, load_dirs};
pub use marshal::{Value, WasmVal};
pub use model::{Type, TypeArena, TypeId};
pub use project::Project;
pub use resolve::ResolveError;
