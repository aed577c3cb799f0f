//! Packages, package versions, worlds and interfaces.

use std::collections::BTreeMap;

use super::name::{PackageName, PackageNameVersion};
use super::types::{NamedFunction, TypeId};
use super::version::SemanticVersion;

/// Named type definitions and nested interfaces of one scope.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub types: BTreeMap<String, TypeId>,
    pub interfaces: BTreeMap<String, Interface>,
    pub uses: Vec<UseDecl>,
}

impl Definitions {
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.types.get(name).copied()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Add everything from `other`; later definitions replace earlier ones.
    pub fn merge(&mut self, other: Definitions) {
        self.types.extend(other.types);
        self.interfaces.extend(other.interfaces);
        self.uses.extend(other.uses);
    }
}

/// `use origin.{a, b as c}` as it was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseDecl {
    /// Package scope the origin interface is looked up from.
    pub package: PackageNameVersion,
    pub interface: String,
    pub names: Vec<UseName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseName {
    pub name: String,
    pub local: String,
    /// The alias node bound to `local`.
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    /// Scope the interface was declared in (`ns:pkg@1.0.0` or `ns:pkg/world`).
    pub package: PackageNameVersion,
    pub definitions: Definitions,
    pub functions: Vec<NamedFunction>,
    /// The `Type::Interface` node naming this interface.
    pub ty: TypeId,
}

impl Interface {
    /// Module name used for imports and exports: `ns:pkg/iface@1.0.0`.
    pub fn module_name(&self) -> String {
        let mut scope = self.package.clone();
        scope.name = scope.name.with_name_part(self.name.as_str());
        scope.to_string()
    }
}

/// What a world import or export refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldItemKind {
    /// A freestanding function.
    Function(TypeId),
    /// An interface, found like a `use` origin: `interface` inside `package`.
    Interface {
        package: PackageNameVersion,
        interface: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldItem {
    pub name: String,
    pub kind: WorldItemKind,
}

/// `include other-world` inside a world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDecl {
    pub package: PackageNameVersion,
    pub world: String,
}

#[derive(Debug, Clone)]
pub struct World {
    pub name: String,
    pub package: PackageNameVersion,
    pub definitions: Definitions,
    pub imports: Vec<WorldItem>,
    pub exports: Vec<WorldItem>,
    pub includes: Vec<IncludeDecl>,
    pub ty: TypeId,
}

/// Contents of one version of a package.
#[derive(Debug, Clone, Default)]
pub struct PackageVersion {
    pub worlds: BTreeMap<String, World>,
    pub definitions: Definitions,
}

impl PackageVersion {
    pub fn world(&self, name: &str) -> Option<&World> {
        self.worlds.get(name)
    }

    pub fn merge(&mut self, other: PackageVersion) {
        self.worlds.extend(other.worlds);
        self.definitions.merge(other.definitions);
    }
}

/// A package and all of its loaded versions.
///
/// Unversioned declarations are stored under the `None` key.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: PackageName,
    pub versions: BTreeMap<Option<SemanticVersion>, PackageVersion>,
}

impl Package {
    pub fn new(name: PackageName) -> Self {
        Self {
            name,
            versions: BTreeMap::new(),
        }
    }

    pub fn version(&self, version: Option<&SemanticVersion>) -> Option<&PackageVersion> {
        self.versions.get(&version.cloned())
    }

    /// Highest version, falling back to the unversioned declaration.
    pub fn latest(&self) -> Option<(Option<&SemanticVersion>, &PackageVersion)> {
        self.versions
            .iter()
            .next_back()
            .map(|(version, contents)| (version.as_ref(), contents))
    }

    pub fn insert(&mut self, version: Option<SemanticVersion>, contents: PackageVersion) {
        match self.versions.get_mut(&version) {
            Some(existing) => existing.merge(contents),
            None => {
                self.versions.insert(version, contents);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{Type, TypeArena};

    #[test]
    fn test_latest_prefers_highest_version() {
        let mut package = Package::new(PackageName::new(["ns"], ["geo"]));
        package.insert(None, PackageVersion::default());
        package.insert(Some(SemanticVersion::new(0, 2, 0)), PackageVersion::default());
        package.insert(Some(SemanticVersion::new(1, 0, 0)), PackageVersion::default());
        let (version, _) = package.latest().unwrap();
        assert_eq!(version, Some(&SemanticVersion::new(1, 0, 0)));
    }

    #[test]
    fn test_insert_merges_same_version() {
        let mut arena = TypeArena::new();
        let mut package = Package::new(PackageName::new(["ns"], ["geo"]));
        let mut first = PackageVersion::default();
        first.definitions.types.insert("a".into(), arena.alloc(Type::U8));
        let mut second = PackageVersion::default();
        second.definitions.types.insert("b".into(), arena.alloc(Type::U16));
        package.insert(None, first);
        package.insert(None, second);
        let merged = package.version(None).unwrap();
        assert!(merged.definitions.type_id("a").is_some());
        assert!(merged.definitions.type_id("b").is_some());
    }

    #[test]
    fn test_interface_module_name() {
        let mut arena = TypeArena::new();
        let iface = Interface {
            name: "shapes".into(),
            package: PackageNameVersion::parse("ns:geo@1.0.0").unwrap(),
            definitions: Definitions::default(),
            functions: Vec::new(),
            ty: arena.alloc(Type::Interface(Default::default())),
        };
        assert_eq!(iface.module_name(), "ns:geo/shapes@1.0.0");
    }
}
