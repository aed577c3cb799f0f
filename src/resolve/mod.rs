//! Package and type resolution.
//!
//! # Module Organization
//!
//! - [`container`]: the [`TypeContainer`] / [`ContainerResolver`] seams and
//!   their implementations over the package model
//! - [`reference`]: [`TypeResolver`], which follows custom references and
//!   `use` aliases to a fixed point
//! - [`error`]: [`ResolveError`]

mod container;
mod error;
mod reference;

pub use container::{ContainerResolver, PackageResolver, TypeContainer};
pub use error::ResolveError;
pub use reference::TypeResolver;
