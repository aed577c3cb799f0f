//! Resolution of custom references and `use` aliases to concrete types.

use std::collections::BTreeSet;

use super::{ContainerResolver, ResolveError, TypeContainer};
use crate::logging::{debug, trace};
use crate::model::{AliasRef, CustomRef, PackageNameVersion, Type, TypeArena, TypeId};

/// Follows [`Type::Custom`] and [`Type::Alias`] nodes to the type they name.
///
/// Lookups backtrack over the package name: when `ns:geo/shapes` is not a
/// package, `shapes` is stripped and retried as a container inside `ns:geo`.
/// Every stripped segment is kept and walked as a nested container path,
/// dropping innermost segments when a walk fails, so a reference can skip
/// through any number of enclosing worlds or interfaces.
#[derive(Clone, Copy)]
pub struct TypeResolver<'a> {
    types: &'a TypeArena,
    containers: &'a dyn ContainerResolver,
}

impl<'a> TypeResolver<'a> {
    pub fn new(types: &'a TypeArena, containers: &'a dyn ContainerResolver) -> Self {
        Self { types, containers }
    }

    pub fn types(&self) -> &'a TypeArena {
        self.types
    }

    /// Resolve `id` to a node that is neither a custom reference nor an alias.
    pub fn resolve(&self, id: TypeId) -> Result<TypeId, ResolveError> {
        let mut visited = BTreeSet::new();
        let mut current = id;
        loop {
            let ty = self
                .types
                .get(current)
                .ok_or(ResolveError::UnknownTypeId(current))?;
            let next = match ty {
                Type::Custom(reference) => {
                    if !visited.insert(current) {
                        return Err(ResolveError::AliasCycle(reference.to_string()));
                    }
                    self.resolve_custom(reference)?
                }
                Type::Alias(alias) => {
                    if !visited.insert(current) {
                        return Err(ResolveError::AliasCycle(alias.to_string()));
                    }
                    self.resolve_alias(alias)?
                }
                _ => return Ok(current),
            };
            trace!(from = %current, to = %next, "followed type reference");
            current = next;
        }
    }

    /// Resolve and return the concrete node.
    pub fn resolve_type(&self, id: TypeId) -> Result<(TypeId, &'a Type), ResolveError> {
        let resolved = self.resolve(id)?;
        let ty = self
            .types
            .get(resolved)
            .ok_or(ResolveError::UnknownTypeId(resolved))?;
        Ok((resolved, ty))
    }

    /// One hop of a custom reference.
    pub fn resolve_custom(&self, reference: &CustomRef) -> Result<TypeId, ResolveError> {
        self.search(&reference.package, |c| c.try_get_type(&reference.name))
            .map_err(|attempts| {
                debug!(reference = %reference, "type reference did not resolve");
                ResolveError::UnresolvedType {
                    name: reference.name.clone(),
                    package: reference.package.to_string(),
                    attempts,
                }
            })
    }

    /// One hop of a `use` alias: find the origin container, then the name in it.
    pub fn resolve_alias(&self, alias: &AliasRef) -> Result<TypeId, ResolveError> {
        let origin = self.resolve_container(&alias.package, &alias.interface)?;
        origin
            .try_get_type(&alias.name)
            .ok_or_else(|| ResolveError::UnresolvedType {
                name: alias.name.clone(),
                package: alias.package.to_string(),
                attempts: vec![format!("not defined in '{}'", alias.interface)],
            })
    }

    /// Find the container `name` (an interface or world) relative to `package`.
    pub fn resolve_container(
        &self,
        package: &PackageNameVersion,
        name: &str,
    ) -> Result<&'a dyn TypeContainer, ResolveError> {
        self.search(package, |c| c.try_get_container(name))
            .map_err(|attempts| ResolveError::UnresolvedContainer {
                name: name.to_string(),
                package: package.to_string(),
                attempts,
            })
    }

    /// Probe every candidate container for `package`, most specific first.
    ///
    /// Returns the attempted locations when nothing matched.
    fn search<T>(
        &self,
        package: &PackageNameVersion,
        probe: impl Fn(&'a dyn TypeContainer) -> Option<T>,
    ) -> Result<T, Vec<String>> {
        let mut attempts = Vec::new();
        let mut current = package.clone();
        let mut stripped: Vec<String> = Vec::new();
        loop {
            match self.containers.resolve(&current) {
                Ok(root) => {
                    for depth in (0..=stripped.len()).rev() {
                        let mut location = current.to_string();
                        let mut container = Some(root);
                        for segment in stripped.iter().take(depth) {
                            location.push('/');
                            location.push_str(segment);
                            container = container.and_then(|c| c.try_get_container(segment));
                        }
                        match container {
                            Some(container) => match probe(container) {
                                Some(found) => return Ok(found),
                                None => attempts.push(format!("not found in '{location}'")),
                            },
                            None => attempts.push(format!("no container '{location}'")),
                        }
                    }
                }
                Err(err) => attempts.push(err.to_string()),
            }
            match current.without_last_name_part() {
                Some((segment, shorter)) => {
                    stripped.insert(0, segment);
                    current = shorter;
                }
                None => return Err(attempts),
            }
        }
    }
}

impl std::fmt::Debug for TypeResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeResolver")
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}
