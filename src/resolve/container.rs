//! Container lookups over the package model.

use std::collections::BTreeMap;

use super::ResolveError;
use crate::model::{
    Definitions, Interface, Package, PackageName, PackageNameVersion, PackageVersion, TypeId,
    World,
};

/// A named scope holding types and possibly further containers.
///
/// Package versions, worlds and interfaces are containers; leaf types are not.
pub trait TypeContainer {
    /// Look up a value-shaped type (record, variant, resource, alias, ...).
    fn try_get_type(&self, name: &str) -> Option<TypeId>;

    /// Look up a nested container (a world or an interface).
    fn try_get_container(&self, name: &str) -> Option<&dyn TypeContainer>;
}

/// Finds the root container for a package reference.
pub trait ContainerResolver {
    fn resolve(&self, package: &PackageNameVersion) -> Result<&dyn TypeContainer, ResolveError>;
}

impl TypeContainer for Definitions {
    fn try_get_type(&self, name: &str) -> Option<TypeId> {
        self.type_id(name)
    }

    fn try_get_container(&self, name: &str) -> Option<&dyn TypeContainer> {
        self.interface(name).map(|i| i as &dyn TypeContainer)
    }
}

impl TypeContainer for Interface {
    fn try_get_type(&self, name: &str) -> Option<TypeId> {
        self.definitions.try_get_type(name)
    }

    fn try_get_container(&self, name: &str) -> Option<&dyn TypeContainer> {
        self.definitions.try_get_container(name)
    }
}

impl TypeContainer for World {
    fn try_get_type(&self, name: &str) -> Option<TypeId> {
        self.definitions.try_get_type(name)
    }

    fn try_get_container(&self, name: &str) -> Option<&dyn TypeContainer> {
        self.definitions.try_get_container(name)
    }
}

impl TypeContainer for PackageVersion {
    fn try_get_type(&self, name: &str) -> Option<TypeId> {
        self.definitions.try_get_type(name)
    }

    fn try_get_container(&self, name: &str) -> Option<&dyn TypeContainer> {
        // Worlds shadow interfaces of the same name.
        match self.world(name) {
            Some(world) => Some(world),
            None => self.definitions.try_get_container(name),
        }
    }
}

/// Resolves package references against a set of loaded packages.
///
/// An exact version match wins. An unversioned reference to a package that
/// was only declared with versions selects the highest one.
#[derive(Debug, Clone, Copy)]
pub struct PackageResolver<'a> {
    packages: &'a BTreeMap<PackageName, Package>,
}

impl<'a> PackageResolver<'a> {
    pub fn new(packages: &'a BTreeMap<PackageName, Package>) -> Self {
        Self { packages }
    }

    pub fn package_version(
        &self,
        package: &PackageNameVersion,
    ) -> Result<&'a PackageVersion, ResolveError> {
        let unknown = || ResolveError::UnknownPackage(package.to_string());
        let found = self.packages.get(&package.name).ok_or_else(unknown)?;
        let contents = match &package.version {
            Some(version) => found.version(Some(version)),
            None => found
                .version(None)
                .or_else(|| found.latest().map(|(_, contents)| contents)),
        };
        contents.ok_or_else(unknown)
    }
}

impl ContainerResolver for PackageResolver<'_> {
    fn resolve(&self, package: &PackageNameVersion) -> Result<&dyn TypeContainer, ResolveError> {
        Ok(self.package_version(package)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SemanticVersion, Type, TypeArena};

    fn package_with_type(arena: &mut TypeArena, name: &str) -> PackageVersion {
        let mut contents = PackageVersion::default();
        contents.definitions.types.insert(name.into(), arena.alloc(Type::U8));
        contents
    }

    #[test]
    fn test_unversioned_reference_selects_highest() {
        let mut arena = TypeArena::new();
        let mut package = Package::new(PackageName::new(["ns"], ["geo"]));
        package.insert(
            Some(SemanticVersion::new(0, 1, 0)),
            package_with_type(&mut arena, "old"),
        );
        package.insert(
            Some(SemanticVersion::new(1, 0, 0)),
            package_with_type(&mut arena, "new"),
        );
        let mut packages = BTreeMap::new();
        packages.insert(package.name.clone(), package);
        let resolver = PackageResolver::new(&packages);

        let root = resolver
            .resolve(&PackageNameVersion::parse("ns:geo").unwrap())
            .unwrap();
        assert!(root.try_get_type("new").is_some());
        assert!(root.try_get_type("old").is_none());

        let root = resolver
            .resolve(&PackageNameVersion::parse("ns:geo@0.1.0").unwrap())
            .unwrap();
        assert!(root.try_get_type("old").is_some());
    }

    #[test]
    fn test_unknown_package_and_version() {
        let packages = BTreeMap::new();
        let resolver = PackageResolver::new(&packages);
        let err = resolver
            .resolve(&PackageNameVersion::parse("ns:missing@1.0.0").unwrap())
            .err()
            .unwrap();
        assert_eq!(err, ResolveError::UnknownPackage("ns:missing@1.0.0".into()));
    }
}
