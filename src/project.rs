//! A loaded set of packages and the lookups built on top of them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::abi::CanonicalAbi;
use crate::error::Result;
use crate::logging::debug;
use crate::marshal::Direction;
use crate::model::{
    CustomRef, Definitions, Interface, Package, PackageName, PackageNameVersion, PackageVersion,
    Type, TypeArena, TypeId, World, WorldItem, WorldItemKind,
};
use crate::resolve::{ContainerResolver, PackageResolver, ResolveError, TypeContainer, TypeResolver};

/// Every package loaded from a set of source groups, sharing one arena.
#[derive(Debug, Clone, Default)]
pub struct Project {
    arena: TypeArena,
    packages: BTreeMap<PackageName, Package>,
}

/// A function reachable through a world, or through an interface when no
/// world is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldFunction {
    pub direction: Direction,
    /// Import module (`ns:pkg/iface@1.0.0`); `None` for freestanding world
    /// functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Function name, with `[method]`, `[constructor]`, `[static]` or
    /// `[resource-drop]` prefixes for resource members.
    pub name: String,
    #[serde(skip)]
    pub func: TypeId,
}

impl Project {
    pub fn new(arena: TypeArena, packages: BTreeMap<PackageName, Package>) -> Self {
        Self { arena, packages }
    }

    pub fn types(&self) -> &TypeArena {
        &self.arena
    }

    pub fn packages(&self) -> &BTreeMap<PackageName, Package> {
        &self.packages
    }

    pub fn resolver(&self) -> TypeResolver<'_> {
        TypeResolver::new(&self.arena, self)
    }

    /// ABI calculator resolving references against this project.
    pub fn abi(&self) -> CanonicalAbi<'_> {
        CanonicalAbi::with_resolver(self.resolver())
    }

    /// Find a type by qualified name.
    ///
    /// Accepts `ns:geo/shapes.point@1.0.0` as well as `ns:geo/shapes/point`;
    /// the version is optional.
    pub fn find_type(&self, reference: &str) -> Result<TypeId> {
        let (path, version) = match reference.rsplit_once('@') {
            Some((path, version)) => (path, Some(version)),
            None => (reference, None),
        };
        let (container, name) = match path.rsplit_once('.') {
            Some((container, name)) => (container.to_string(), name.to_string()),
            None => {
                let parsed = PackageNameVersion::parse(path)?;
                let (name, container) = parsed.without_last_name_part().ok_or_else(|| {
                    ResolveError::UnresolvedType {
                        name: reference.to_string(),
                        package: String::new(),
                        attempts: vec!["not a qualified type reference".to_string()],
                    }
                })?;
                (container.to_string(), name)
            }
        };
        let container = match version {
            Some(version) => format!("{container}@{version}"),
            None => container,
        };
        let package = PackageNameVersion::parse(&container)?;
        let id = self
            .resolver()
            .resolve_custom(&CustomRef { package, name })?;
        Ok(self.resolver().resolve(id)?)
    }

    /// Every interface declared at the top level of a package, with its
    /// module name.
    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.packages
            .values()
            .flat_map(|package| package.versions.values())
            .flat_map(|contents| contents.definitions.interfaces.values())
    }

    /// Find the interface `name` relative to `package`, backtracking over
    /// the package path the same way type references do.
    pub fn find_interface(
        &self,
        package: &PackageNameVersion,
        name: &str,
    ) -> std::result::Result<&Interface, ResolveError> {
        let packages = PackageResolver::new(&self.packages);
        let mut attempts = Vec::new();
        let mut current = package.clone();
        let mut stripped: Vec<String> = Vec::new();
        loop {
            match packages.package_version(&current) {
                Ok(root) => {
                    for depth in (0..=stripped.len()).rev() {
                        let found = definitions_at(root, stripped.iter().take(depth))
                            .and_then(|definitions| definitions.interface(name));
                        if let Some(found) = found {
                            return Ok(found);
                        }
                    }
                    attempts.push(format!("not found in '{current}'"));
                }
                Err(err) => attempts.push(err.to_string()),
            }
            match current.without_last_name_part() {
                Some((segment, shorter)) => {
                    stripped.insert(0, segment);
                    current = shorter;
                }
                None => {
                    return Err(ResolveError::UnresolvedContainer {
                        name: name.to_string(),
                        package: package.to_string(),
                        attempts,
                    });
                }
            }
        }
    }

    /// Look up a world by `ns:pkg/world@1.0.0`.
    pub fn world(&self, reference: &str) -> Result<&World> {
        let parsed = PackageNameVersion::parse(reference)?;
        let (name, package) = parsed
            .without_last_name_part()
            .ok_or_else(|| ResolveError::UnknownWorld(reference.to_string()))?;
        Ok(self.world_in(&package, &name)?)
    }

    fn world_in(
        &self,
        package: &PackageNameVersion,
        name: &str,
    ) -> std::result::Result<&World, ResolveError> {
        PackageResolver::new(&self.packages)
            .package_version(package)?
            .world(name)
            .ok_or_else(|| ResolveError::UnknownWorld(package.with_name_part(name).to_string()))
    }

    /// Expand a world into the functions it imports and exports.
    ///
    /// Includes are spliced in transitively. Interface items expand to the
    /// interface's functions and resource members.
    pub fn world_functions(&self, reference: &str) -> Result<Vec<WorldFunction>> {
        let world = self.world(reference)?;
        let mut visiting = Vec::new();
        let mut out = Vec::new();
        self.expand_world(world, &mut visiting, &mut out)?;

        let mut seen = BTreeSet::new();
        out.retain(|f| {
            seen.insert((
                f.direction == Direction::Import,
                f.module.clone(),
                f.name.clone(),
            ))
        });
        debug!(world = reference, functions = out.len(), "expanded world");
        Ok(out)
    }

    fn expand_world(
        &self,
        world: &World,
        visiting: &mut Vec<String>,
        out: &mut Vec<WorldFunction>,
    ) -> std::result::Result<(), ResolveError> {
        let scope = world.package.with_name_part(world.name.as_str());
        let key = scope.to_string();
        if visiting.contains(&key) {
            return Err(ResolveError::IncludeCycle(key));
        }
        visiting.push(key);

        for item in &world.imports {
            self.expand_item(&scope, item, Direction::Import, out)?;
        }
        for item in &world.exports {
            self.expand_item(&scope, item, Direction::Export, out)?;
        }
        for include in &world.includes {
            let included = self.world_in(&include.package, &include.world)?;
            self.expand_world(included, visiting, out)?;
        }

        visiting.pop();
        Ok(())
    }

    fn expand_item(
        &self,
        scope: &PackageNameVersion,
        item: &WorldItem,
        direction: Direction,
        out: &mut Vec<WorldFunction>,
    ) -> std::result::Result<(), ResolveError> {
        match &item.kind {
            WorldItemKind::Function(func) => out.push(WorldFunction {
                direction,
                module: None,
                name: item.name.clone(),
                func: *func,
            }),
            WorldItemKind::Interface { package, interface } => {
                let found = self.find_interface(package, interface)?;
                // Inline interfaces are named by their world item.
                let module = if package == scope {
                    item.name.clone()
                } else {
                    found.module_name()
                };
                out.extend(self.interface_functions(found, &module, direction));
            }
        }
        Ok(())
    }

    /// The functions of `interface` under `module`, resource members included.
    pub fn interface_functions(
        &self,
        interface: &Interface,
        module: &str,
        direction: Direction,
    ) -> Vec<WorldFunction> {
        let entry = |name: String, func: TypeId| WorldFunction {
            direction,
            module: Some(module.to_string()),
            name,
            func,
        };
        let mut out: Vec<WorldFunction> = interface
            .functions
            .iter()
            .map(|f| entry(f.name.clone(), f.func))
            .collect();

        for (name, id) in &interface.definitions.types {
            let Some(Type::Resource(resource)) = self.arena.get(*id) else {
                continue;
            };
            for ctor in &resource.constructors {
                out.push(entry(format!("[constructor]{name}"), ctor.func));
            }
            for method in &resource.methods {
                out.push(entry(format!("[method]{name}.{}", method.name), method.func));
            }
            for func in &resource.statics {
                out.push(entry(format!("[static]{name}.{}", func.name), func.func));
            }
            if let Some(drop) = resource.drop {
                out.push(entry(format!("[resource-drop]{name}"), drop));
            }
        }
        out
    }
}

impl ContainerResolver for Project {
    fn resolve(
        &self,
        package: &PackageNameVersion,
    ) -> std::result::Result<&dyn TypeContainer, ResolveError> {
        Ok(PackageResolver::new(&self.packages).package_version(package)?)
    }
}

/// Definitions reached by walking `path` (worlds or interfaces) from `root`.
fn definitions_at<'p, 's>(
    root: &'p PackageVersion,
    path: impl Iterator<Item = &'s String>,
) -> Option<&'p Definitions> {
    let mut current: Option<&'p Definitions> = None;
    for segment in path {
        current = match current {
            None => root
                .world(segment)
                .map(|world| &world.definitions)
                .or_else(|| root.definitions.interface(segment).map(|i| &i.definitions)),
            Some(definitions) => definitions.interface(segment).map(|i| &i.definitions),
        };
        current?;
    }
    Some(current.unwrap_or(&root.definitions))
}
