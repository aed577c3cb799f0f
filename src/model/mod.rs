//! The type model: names, versions, the type arena and package containers.
//!
//! The model is built once by the [`loader`](crate::loader) and is not
//! mutated afterwards. References between packages are kept as
//! [`Type::Custom`] and [`Type::Alias`] nodes and resolved lazily by the
//! [`resolve`](crate::resolve) module.

mod name;
mod package;
mod types;
mod version;

pub use name::{NameError, PackageName, PackageNameVersion};
pub use package::{
    Definitions, IncludeDecl, Interface, Package, PackageVersion, UseDecl, UseName, World,
    WorldItem, WorldItemKind,
};
pub use types::{
    AliasRef, Case, CustomRef, EnumType, Field, FlagsType, FunctionType, NamedFunction, Param,
    RecordType, ResourceType, ResultType, Type, TypeArena, TypeId, TypeName, VariantType,
};
pub use version::{ParseVersionError, SemanticVersion};
