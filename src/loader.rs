//! Ingesting document trees into the type model.
//!
//! Documents are grouped by directory. Every file of a group that declares
//! a package must declare the same one; files without a declaration inherit
//! it. Type expressions become arena nodes, and every name that is not a
//! primitive becomes an unresolved [`Type::Custom`] or [`Type::Alias`] node
//! scoped to the interface or world it appears in, so forward references and
//! references into packages loaded later both work.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::document::{Compound, Document, FuncSig, Item, NamedFunc, TypeExpr, WorldItemDecl};
use crate::logging::{debug, error, info};
use crate::model::{
    AliasRef, Case, CustomRef, Definitions, EnumType, Field, FlagsType, FunctionType,
    IncludeDecl, Interface, NameError, NamedFunction, Package, PackageName, PackageNameVersion,
    PackageVersion, Param, RecordType, ResourceType, Type, TypeArena, TypeId, TypeName, UseDecl,
    UseName, VariantType, World, WorldItem, WorldItemKind,
};
use crate::project::Project;

/// Default extension of document files.
pub const DEFAULT_EXTENSION: &str = "json";

/// Errors raised while reading and ingesting documents.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse document '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Only a single package is allowed per directory. Found multiple packages: {first} and {second} in directory '{directory}'."
    )]
    MultiplePackages {
        first: String,
        second: String,
        directory: String,
    },

    #[error("Definitions in '{0}' are not inside any package")]
    MissingPackage(String),

    #[error("'{item}' is not allowed in {context}")]
    UnexpectedItem { item: &'static str, context: String },

    #[error("'{0}' does not name an interface or world inside a package")]
    InvalidReference(String),

    #[error(transparent)]
    Name(#[from] NameError),
}

impl LoadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub document: Document,
}

/// The documents of one directory.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub directory: PathBuf,
    pub files: Vec<SourceFile>,
}

impl SourceGroup {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            files: Vec::new(),
        }
    }

    pub fn with_document(mut self, path: impl Into<PathBuf>, document: Document) -> Self {
        self.files.push(SourceFile {
            path: path.into(),
            document,
        });
        self
    }

    /// Read every `*.{extension}` file directly inside `directory`, in file
    /// name order.
    pub fn read_dir(directory: impl AsRef<Path>, extension: &str) -> Result<Self, LoadError> {
        let directory = directory.as_ref();
        let entries = std::fs::read_dir(directory).map_err(|e| LoadError::io(directory, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| LoadError::io(directory, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut group = Self::new(directory);
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| LoadError::io(&path, e))?;
            let document = Document::from_json(&content).map_err(|source| LoadError::Json {
                path: path.display().to_string(),
                source,
            })?;
            group = group.with_document(path, document);
        }
        debug!(
            directory = %directory.display(),
            files = group.files.len(),
            "read source group"
        );
        Ok(group)
    }

    /// The package declared by the group's files, if any of them declares one.
    pub fn package(&self) -> Result<Option<PackageNameVersion>, LoadError> {
        let mut found: Option<PackageNameVersion> = None;
        for file in &self.files {
            let Some(declared) = &file.document.package else {
                continue;
            };
            let name = PackageNameVersion::parse(declared)?;
            match &found {
                Some(first) if *first != name => {
                    error!(
                        directory = %self.directory.display(),
                        first = %first,
                        second = %name,
                        "conflicting package declarations"
                    );
                    return Err(LoadError::MultiplePackages {
                        first: first.to_string(),
                        second: name.to_string(),
                        directory: self.directory.display().to_string(),
                    });
                }
                Some(_) => {}
                None => found = Some(name),
            }
        }
        Ok(found)
    }
}

/// Builds a [`Project`] from source groups.
#[derive(Debug, Default)]
pub struct Loader {
    arena: TypeArena,
    packages: BTreeMap<PackageName, Package>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one group. The one-package rule is checked before anything
    /// from the group is added.
    pub fn add_group(&mut self, group: &SourceGroup) -> Result<(), LoadError> {
        let package = group.package()?;
        for file in &group.files {
            let document = &file.document;
            if !document.items.is_empty() {
                let package = package
                    .as_ref()
                    .ok_or_else(|| LoadError::MissingPackage(file.path.display().to_string()))?;
                let contents = self.package_items(package, &document.items)?;
                self.insert(package, contents);
            }
            for nested in &document.packages {
                let name = PackageNameVersion::parse(&nested.package)?;
                let contents = self.package_items(&name, &nested.items)?;
                self.insert(&name, contents);
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Project {
        Project::new(self.arena, self.packages)
    }

    fn insert(&mut self, package: &PackageNameVersion, contents: PackageVersion) {
        debug!(package = %package, "adding package contents");
        self.packages
            .entry(package.name.clone())
            .or_insert_with(|| Package::new(package.name.clone()))
            .insert(package.version.clone(), contents);
    }

    fn package_items(
        &mut self,
        package: &PackageNameVersion,
        items: &[Item],
    ) -> Result<PackageVersion, LoadError> {
        let context = format!("package '{package}'");
        let mut contents = PackageVersion::default();
        for item in items {
            match item {
                Item::Interface { name, items } => {
                    let interface = self.interface(package, name, items)?;
                    contents.definitions.interfaces.insert(name.clone(), interface);
                }
                Item::World { name, items } => {
                    let world = self.world(package, name, items)?;
                    contents.worlds.insert(name.clone(), world);
                }
                other => self.definition(package, other, &mut contents.definitions, &context)?,
            }
        }
        Ok(contents)
    }

    fn interface(
        &mut self,
        package: &PackageNameVersion,
        name: &str,
        items: &[Item],
    ) -> Result<Interface, LoadError> {
        let scope = package.with_name_part(name);
        let context = format!("interface '{name}'");
        let mut definitions = Definitions::default();
        let mut functions = Vec::new();
        for item in items {
            match item {
                Item::Func(func) => functions.push(self.named_function(&scope, func)?),
                other => self.definition(&scope, other, &mut definitions, &context)?,
            }
        }
        let ty = self
            .arena
            .alloc(Type::Interface(TypeName::new(package.clone(), name)));
        Ok(Interface {
            name: name.to_string(),
            package: package.clone(),
            definitions,
            functions,
            ty,
        })
    }

    fn world(
        &mut self,
        package: &PackageNameVersion,
        name: &str,
        items: &[Item],
    ) -> Result<World, LoadError> {
        let scope = package.with_name_part(name);
        let context = format!("world '{name}'");
        let mut definitions = Definitions::default();
        let mut imports = Vec::new();
        let mut exports = Vec::new();
        let mut includes = Vec::new();
        for item in items {
            match item {
                Item::Import(decl) => {
                    imports.push(self.world_item(package, &scope, decl, &mut definitions)?);
                }
                Item::Export(decl) => {
                    exports.push(self.world_item(package, &scope, decl, &mut definitions)?);
                }
                Item::Include { world } => {
                    let (package, world) = split_reference(package, world)?;
                    includes.push(IncludeDecl { package, world });
                }
                other => self.definition(&scope, other, &mut definitions, &context)?,
            }
        }
        let ty = self
            .arena
            .alloc(Type::World(TypeName::new(package.clone(), name)));
        Ok(World {
            name: name.to_string(),
            package: package.clone(),
            definitions,
            imports,
            exports,
            includes,
            ty,
        })
    }

    fn world_item(
        &mut self,
        package: &PackageNameVersion,
        scope: &PackageNameVersion,
        decl: &WorldItemDecl,
        definitions: &mut Definitions,
    ) -> Result<WorldItem, LoadError> {
        let (name, kind) = match decl {
            WorldItemDecl::Function { name, func } => {
                (name.clone(), WorldItemKind::Function(self.function(scope, func)?))
            }
            WorldItemDecl::Inline { name, items } => {
                // Inline interfaces live in the world they are declared in.
                let interface = self.interface(scope, name, items)?;
                definitions.interfaces.insert(name.clone(), interface);
                let kind = WorldItemKind::Interface {
                    package: scope.clone(),
                    interface: name.clone(),
                };
                (name.clone(), kind)
            }
            WorldItemDecl::Interface { interface } => {
                let (package, name) = split_reference(package, interface)?;
                let kind = WorldItemKind::Interface {
                    package,
                    interface: name,
                };
                (interface.clone(), kind)
            }
        };
        Ok(WorldItem { name, kind })
    }

    /// Add a type definition or `use` to `definitions`.
    fn definition(
        &mut self,
        scope: &PackageNameVersion,
        item: &Item,
        definitions: &mut Definitions,
        context: &str,
    ) -> Result<(), LoadError> {
        let (name, id) = match item {
            Item::Record { name, fields } => {
                let mut converted = Vec::with_capacity(fields.len());
                for field in fields {
                    converted.push(Field {
                        name: field.name.clone(),
                        ty: self.type_expr(scope, &field.ty)?,
                    });
                }
                let id = self.arena.alloc(Type::Record(RecordType {
                    name: TypeName::new(scope.clone(), name.as_str()),
                    fields: converted,
                }));
                (name, id)
            }
            Item::Variant { name, cases } => {
                let mut converted = Vec::with_capacity(cases.len());
                for case in cases {
                    let ty = match &case.ty {
                        Some(ty) => Some(self.type_expr(scope, ty)?),
                        None => None,
                    };
                    converted.push(Case {
                        name: case.name.clone(),
                        ty,
                    });
                }
                let id = self.arena.alloc(Type::Variant(VariantType {
                    name: TypeName::new(scope.clone(), name.as_str()),
                    cases: converted,
                }));
                (name, id)
            }
            Item::Enum { name, cases } => {
                let id = self.arena.alloc(Type::Enum(EnumType {
                    name: TypeName::new(scope.clone(), name.as_str()),
                    cases: cases.clone(),
                }));
                (name, id)
            }
            Item::Flags { name, flags } => {
                let id = self.arena.alloc(Type::Flags(FlagsType {
                    name: TypeName::new(scope.clone(), name.as_str()),
                    flags: flags.clone(),
                }));
                (name, id)
            }
            Item::Resource {
                name,
                constructor,
                methods,
                statics,
            } => {
                let id = self.resource(scope, name, constructor.as_ref(), methods, statics)?;
                (name, id)
            }
            Item::Type { name, ty } => (name, self.type_expr(scope, ty)?),
            Item::Use { from, names } => {
                let (package, interface) = split_reference(scope, from)?;
                let mut bound = Vec::with_capacity(names.len());
                for item in names {
                    let local = item.alias.clone().unwrap_or_else(|| item.name.clone());
                    let ty = self.arena.alloc(Type::Alias(AliasRef {
                        package: package.clone(),
                        interface: interface.clone(),
                        name: item.name.clone(),
                    }));
                    definitions.types.insert(local.clone(), ty);
                    bound.push(UseName {
                        name: item.name.clone(),
                        local,
                        ty,
                    });
                }
                definitions.uses.push(UseDecl {
                    package,
                    interface,
                    names: bound,
                });
                return Ok(());
            }
            other => {
                return Err(LoadError::UnexpectedItem {
                    item: other.keyword(),
                    context: context.to_string(),
                });
            }
        };
        definitions.types.insert(name.clone(), id);
        Ok(())
    }

    /// Build a resource and its members. Methods get the implicit leading
    /// `self: borrow<resource>` parameter and constructors return the owned
    /// resource.
    fn resource(
        &mut self,
        scope: &PackageNameVersion,
        name: &str,
        constructor: Option<&FuncSig>,
        methods: &[NamedFunc],
        statics: &[NamedFunc],
    ) -> Result<TypeId, LoadError> {
        let name = TypeName::new(scope.clone(), name);
        let id = self.arena.alloc(Type::Resource(ResourceType {
            name: name.clone(),
            constructors: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
            drop: None,
        }));
        let borrowed = self.arena.alloc(Type::Borrow(id));

        let mut constructors = Vec::new();
        if let Some(sig) = constructor {
            let mut func = self.function_type(scope, sig)?;
            func.results = vec![id];
            constructors.push(NamedFunction {
                name: name.name.clone(),
                func: self.arena.alloc(Type::Function(func)),
            });
        }

        let mut converted = Vec::with_capacity(methods.len());
        for method in methods {
            let mut func = self.function_type(scope, &method.sig)?;
            func.params.insert(
                0,
                Param {
                    name: "self".to_string(),
                    ty: borrowed,
                },
            );
            converted.push(NamedFunction {
                name: method.name.clone(),
                func: self.arena.alloc(Type::Function(func)),
            });
        }

        let mut static_functions = Vec::with_capacity(statics.len());
        for func in statics {
            static_functions.push(self.named_function(scope, func)?);
        }

        let drop = self.arena.alloc(Type::Function(FunctionType {
            params: vec![Param {
                name: "self".to_string(),
                ty: id,
            }],
            results: Vec::new(),
        }));

        self.arena.replace(
            id,
            Type::Resource(ResourceType {
                name,
                constructors,
                methods: converted,
                statics: static_functions,
                drop: Some(drop),
            }),
        );
        Ok(id)
    }

    fn named_function(
        &mut self,
        scope: &PackageNameVersion,
        func: &NamedFunc,
    ) -> Result<NamedFunction, LoadError> {
        Ok(NamedFunction {
            name: func.name.clone(),
            func: self.function(scope, &func.sig)?,
        })
    }

    fn function(&mut self, scope: &PackageNameVersion, sig: &FuncSig) -> Result<TypeId, LoadError> {
        let func = self.function_type(scope, sig)?;
        Ok(self.arena.alloc(Type::Function(func)))
    }

    fn function_type(
        &mut self,
        scope: &PackageNameVersion,
        sig: &FuncSig,
    ) -> Result<FunctionType, LoadError> {
        let mut params = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            params.push(Param {
                name: param.name.clone(),
                ty: self.type_expr(scope, &param.ty)?,
            });
        }
        let mut results = Vec::with_capacity(sig.results.len());
        for result in &sig.results {
            results.push(self.type_expr(scope, result)?);
        }
        Ok(FunctionType { params, results })
    }

    fn type_expr(&mut self, scope: &PackageNameVersion, expr: &TypeExpr) -> Result<TypeId, LoadError> {
        let compound = match expr {
            TypeExpr::Name(name) => return self.named_type(scope, name),
            TypeExpr::Compound(compound) => compound.as_ref(),
        };
        let ty = match compound {
            Compound::List(element) => Type::List(self.type_expr(scope, element)?),
            Compound::Option(inner) => Type::Option(self.type_expr(scope, inner)?),
            Compound::Tuple(elements) => {
                let mut converted = Vec::with_capacity(elements.len());
                for element in elements {
                    converted.push(self.type_expr(scope, element)?);
                }
                Type::Tuple(converted)
            }
            Compound::Result { ok, err } => {
                let ok = self.optional_type(scope, ok.as_ref())?;
                let err = self.optional_type(scope, err.as_ref())?;
                return Ok(self.arena.result(ok, err));
            }
            Compound::Borrow(resource) => Type::Borrow(self.named_type(scope, resource)?),
            Compound::Own(resource) => return self.named_type(scope, resource),
            Compound::Stream(element) => Type::Stream(self.optional_type(scope, element.as_ref())?),
            Compound::Future(element) => Type::Future(self.optional_type(scope, element.as_ref())?),
            Compound::Func(sig) => return self.function(scope, sig),
            Compound::Interface(reference) => {
                let (package, name) = split_reference(scope, reference)?;
                Type::Interface(TypeName::new(package, name))
            }
        };
        Ok(self.arena.alloc(ty))
    }

    fn optional_type(
        &mut self,
        scope: &PackageNameVersion,
        expr: Option<&TypeExpr>,
    ) -> Result<Option<TypeId>, LoadError> {
        expr.map(|expr| self.type_expr(scope, expr)).transpose()
    }

    fn named_type(&mut self, scope: &PackageNameVersion, name: &str) -> Result<TypeId, LoadError> {
        if let Some(primitive) = Type::primitive(name) {
            return Ok(self.arena.alloc(primitive));
        }
        if name == "result" {
            return Ok(self.arena.result(None, None));
        }
        let (package, name) = split_reference(scope, name)?;
        Ok(self.arena.alloc(Type::Custom(CustomRef { package, name })))
    }
}

/// Split a reference into the package it is relative to and the last name.
///
/// Identifiers are relative to `scope`; `ns:pkg/iface@1.0.0` becomes
/// `(ns:pkg@1.0.0, iface)`.
fn split_reference(
    scope: &PackageNameVersion,
    reference: &str,
) -> Result<(PackageNameVersion, String), LoadError> {
    let parsed = PackageNameVersion::parse(reference)?;
    if parsed.is_identifier_only() {
        return Ok((scope.clone(), reference.to_string()));
    }
    parsed
        .without_last_name_part()
        .map(|(name, package)| (package, name))
        .ok_or_else(|| LoadError::InvalidReference(reference.to_string()))
}

/// Load one source group per directory and build the project.
pub fn load_dirs<P: AsRef<Path>>(
    directories: impl IntoIterator<Item = P>,
    extension: &str,
) -> Result<Project, LoadError> {
    let mut loader = Loader::new();
    for directory in directories {
        let group = SourceGroup::read_dir(directory, extension)?;
        loader.add_group(&group)?;
    }
    let project = loader.finish();
    info!(
        packages = project.packages().len(),
        types = project.types().len(),
        "loaded project"
    );
    Ok(project)
}
