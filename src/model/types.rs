//! Type arena and the closed set of IDL type shapes.
//!
//! Types reference each other through [`TypeId`] indices into a
//! [`TypeArena`], so self-referential shapes (a variant holding a list of
//! itself) need no recursive ownership.

use serde::Serialize;

use super::name::PackageNameVersion;

/// Stable index of a type node inside a [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global identity of a named shape: the package scope it was declared in
/// (`ns:pkg/iface@1.0.0`) plus its local name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeName {
    pub package: PackageNameVersion,
    pub name: String,
}

impl TypeName {
    pub fn new(package: PackageNameVersion, name: impl Into<String>) -> Self {
        Self {
            package,
            name: name.into(),
        }
    }

    /// A name with no package scope, mostly useful in tests.
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(PackageNameVersion::default(), name)
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.package.name.name.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: TypeName,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub name: String,
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantType {
    pub name: TypeName,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: TypeName,
    pub cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagsType {
    pub name: TypeName,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultType {
    pub ok: Option<TypeId>,
    pub err: Option<TypeId>,
}

/// A function attached to a name: interface functions and resource members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedFunction {
    pub name: String,
    pub func: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    pub name: TypeName,
    pub constructors: Vec<NamedFunction>,
    /// Methods, each taking the implicit `self` borrow as first parameter.
    pub methods: Vec<NamedFunction>,
    pub statics: Vec<NamedFunction>,
    /// Signature of `[resource-drop]`, taking the owned handle.
    pub drop: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub params: Vec<Param>,
    pub results: Vec<TypeId>,
}

/// An unresolved reference to a named type: `name` looked up in `package`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRef {
    pub package: PackageNameVersion,
    pub name: String,
}

/// A `use` binding: `name` inside the container `interface`, found relative
/// to `package`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRef {
    pub package: PackageNameVersion,
    pub interface: String,
    pub name: String,
}

impl std::fmt::Display for CustomRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

impl std::fmt::Display for AliasRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}.{}", self.package, self.interface, self.name)
    }
}

/// Every shape a type can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Char,
    String,
    List(TypeId),
    Tuple(Vec<TypeId>),
    Option(TypeId),
    Result(ResultType),
    Record(RecordType),
    Variant(VariantType),
    Enum(EnumType),
    Flags(FlagsType),
    Resource(ResourceType),
    Borrow(TypeId),
    Function(FunctionType),
    Interface(TypeName),
    World(TypeName),
    Stream(Option<TypeId>),
    Future(Option<TypeId>),
    Custom(CustomRef),
    Alias(AliasRef),
}

impl Type {
    /// Parse a primitive keyword (`u32`, `string`, ...).
    pub fn primitive(keyword: &str) -> Option<Type> {
        let ty = match keyword {
            "bool" => Type::Bool,
            "u8" => Type::U8,
            "u16" => Type::U16,
            "u32" => Type::U32,
            "u64" => Type::U64,
            "s8" => Type::S8,
            "s16" => Type::S16,
            "s32" => Type::S32,
            "s64" => Type::S64,
            "f32" | "float32" => Type::F32,
            "f64" | "float64" => Type::F64,
            "char" => Type::Char,
            "string" => Type::String,
            _ => return None,
        };
        Some(ty)
    }

    /// Short kind name used in diagnostics and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::U8 => "u8",
            Type::U16 => "u16",
            Type::U32 => "u32",
            Type::U64 => "u64",
            Type::S8 => "s8",
            Type::S16 => "s16",
            Type::S32 => "s32",
            Type::S64 => "s64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Char => "char",
            Type::String => "string",
            Type::List(_) => "list",
            Type::Tuple(_) => "tuple",
            Type::Option(_) => "option",
            Type::Result(_) => "result",
            Type::Record(_) => "record",
            Type::Variant(_) => "variant",
            Type::Enum(_) => "enum",
            Type::Flags(_) => "flags",
            Type::Resource(_) => "resource",
            Type::Borrow(_) => "borrow",
            Type::Function(_) => "function",
            Type::Interface(_) => "interface",
            Type::World(_) => "world",
            Type::Stream(_) => "stream",
            Type::Future(_) => "future",
            Type::Custom(_) => "custom",
            Type::Alias(_) => "alias",
        }
    }

    /// Name of a named shape, if this is one.
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            Type::Record(r) => Some(&r.name),
            Type::Variant(v) => Some(&v.name),
            Type::Enum(e) => Some(&e.name),
            Type::Flags(f) => Some(&f.name),
            Type::Resource(r) => Some(&r.name),
            Type::Interface(name) | Type::World(name) => Some(name),
            _ => None,
        }
    }

    /// `true` for references that must be resolved before inspection.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Custom(_) | Type::Alias(_))
    }
}

/// Owner of every type node in a project.
#[derive(Debug, Clone, Default)]
pub struct TypeArena {
    nodes: Vec<Type>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.nodes.get(id.index())
    }

    /// Replace a node in place. Used while a definition is still being
    /// built, e.g. to fill in resource members that refer to the resource.
    pub fn replace(&mut self, id: TypeId, ty: Type) -> Option<Type> {
        self.nodes
            .get_mut(id.index())
            .map(|slot| std::mem::replace(slot, ty))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }

    // Shorthands for building anonymous shapes.

    pub fn list(&mut self, element: TypeId) -> TypeId {
        self.alloc(Type::List(element))
    }

    pub fn option(&mut self, inner: TypeId) -> TypeId {
        self.alloc(Type::Option(inner))
    }

    pub fn tuple(&mut self, elements: Vec<TypeId>) -> TypeId {
        self.alloc(Type::Tuple(elements))
    }

    pub fn result(&mut self, ok: Option<TypeId>, err: Option<TypeId>) -> TypeId {
        self.alloc(Type::Result(ResultType { ok, err }))
    }

    pub fn record<'n>(
        &mut self,
        name: &str,
        fields: impl IntoIterator<Item = (&'n str, TypeId)>,
    ) -> TypeId {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Field {
                name: name.to_string(),
                ty,
            })
            .collect();
        self.alloc(Type::Record(RecordType {
            name: TypeName::local(name),
            fields,
        }))
    }

    pub fn variant<'n>(
        &mut self,
        name: &str,
        cases: impl IntoIterator<Item = (&'n str, Option<TypeId>)>,
    ) -> TypeId {
        let cases = cases
            .into_iter()
            .map(|(name, ty)| Case {
                name: name.to_string(),
                ty,
            })
            .collect();
        self.alloc(Type::Variant(VariantType {
            name: TypeName::local(name),
            cases,
        }))
    }

    pub fn function(&mut self, params: Vec<(&str, TypeId)>, results: Vec<TypeId>) -> TypeId {
        let params = params
            .into_iter()
            .map(|(name, ty)| Param {
                name: name.to_string(),
                ty,
            })
            .collect();
        self.alloc(Type::Function(FunctionType { params, results }))
    }
}
