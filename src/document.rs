//! The parsed document tree handed over by an IDL parser.
//!
//! Documents are plain serde data, stored on disk as JSON. Nothing in the
//! tree is resolved: type expressions name other types by string and the
//! [`loader`](crate::loader) turns them into reference nodes.
//!
//! ```json
//! {
//!   "package": "ns:geo@1.0.0",
//!   "items": [
//!     { "kind": "interface", "name": "shapes", "items": [
//!       { "kind": "record", "name": "point",
//!         "fields": [{ "name": "x", "type": "s32" }, { "name": "y", "type": "s32" }] },
//!       { "kind": "func", "name": "area", "params": [{ "name": "p", "type": "point" }],
//!         "results": ["f64"] }
//!     ]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// One parsed source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    /// Package declaration of the file (`ns:name@1.0.0`), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Explicit `package x { ... }` blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<NestedPackage>,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedPackage {
    pub package: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Item {
    Interface {
        name: String,
        #[serde(default)]
        items: Vec<Item>,
    },
    World {
        name: String,
        #[serde(default)]
        items: Vec<Item>,
    },
    Record {
        name: String,
        #[serde(default)]
        fields: Vec<FieldDecl>,
    },
    Variant {
        name: String,
        cases: Vec<CaseDecl>,
    },
    Enum {
        name: String,
        cases: Vec<String>,
    },
    Flags {
        name: String,
        #[serde(default)]
        flags: Vec<String>,
    },
    Resource {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constructor: Option<FuncSig>,
        #[serde(default)]
        methods: Vec<NamedFunc>,
        #[serde(default)]
        statics: Vec<NamedFunc>,
    },
    /// `type name = ty`
    Type {
        name: String,
        #[serde(rename = "type")]
        ty: TypeExpr,
    },
    /// `use from.{names}`; `from` is an interface name in the current
    /// scope or a qualified `ns:pkg/iface@version`.
    Use {
        from: String,
        names: Vec<UseItem>,
    },
    Func(NamedFunc),
    Import(WorldItemDecl),
    Export(WorldItemDecl),
    Include {
        world: String,
    },
}

impl Item {
    /// The item keyword, as written in diagnostics.
    pub fn keyword(&self) -> &'static str {
        match self {
            Item::Interface { .. } => "interface",
            Item::World { .. } => "world",
            Item::Record { .. } => "record",
            Item::Variant { .. } => "variant",
            Item::Enum { .. } => "enum",
            Item::Flags { .. } => "flags",
            Item::Resource { .. } => "resource",
            Item::Type { .. } => "type",
            Item::Use { .. } => "use",
            Item::Func(_) => "func",
            Item::Import(_) => "import",
            Item::Export(_) => "export",
            Item::Include { .. } => "include",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDecl {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseItem {
    pub name: String,
    /// `use x.{name as alias}`
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuncSig {
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub results: Vec<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedFunc {
    pub name: String,
    #[serde(flatten)]
    pub sig: FuncSig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
}

/// Target of a world `import` or `export`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldItemDecl {
    /// `import name: func(...)`
    Function { name: String, func: FuncSig },
    /// `import name: interface { ... }`
    Inline { name: String, items: Vec<Item> },
    /// `import shapes` or `import ns:geo/shapes@1.0.0`
    Interface { interface: String },
}

/// A type as written in a document.
///
/// A string is a primitive keyword, `result` (the empty result), a local
/// identifier or a qualified `ns:pkg/iface/name@version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeExpr {
    Name(String),
    Compound(Box<Compound>),
}

impl From<&str> for TypeExpr {
    fn from(name: &str) -> Self {
        TypeExpr::Name(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub enum Compound {
    List(TypeExpr),
    Option(TypeExpr),
    Tuple(Vec<TypeExpr>),
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<TypeExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<TypeExpr>,
    },
    Borrow(String),
    Own(String),
    Stream(Option<TypeExpr>),
    Future(Option<TypeExpr>),
    Func(FuncSig),
    Interface(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interface_document() {
        let doc = Document::from_json(
            r#"{
                "package": "ns:geo@1.0.0",
                "items": [
                    { "kind": "interface", "name": "shapes", "items": [
                        { "kind": "record", "name": "point",
                          "fields": [{ "name": "x", "type": "s32" },
                                     { "name": "tags", "type": { "list": "string" } }] },
                        { "kind": "func", "name": "area",
                          "params": [{ "name": "p", "type": "point" }],
                          "results": [{ "result": { "ok": "f64" } }] }
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.package.as_deref(), Some("ns:geo@1.0.0"));
        let Some(Item::Interface { name, items }) = doc.items.first() else {
            panic!("expected interface");
        };
        assert_eq!(name, "shapes");
        assert_eq!(items.len(), 2);
        match items.get(1) {
            Some(Item::Func(func)) => {
                assert_eq!(func.name, "area");
                assert_eq!(
                    func.sig.results,
                    vec![TypeExpr::Compound(Box::new(Compound::Result {
                        ok: Some("f64".into()),
                        err: None,
                    }))]
                );
            }
            other => panic!("expected func, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_world_items() {
        let doc = Document::from_json(
            r#"{
                "items": [
                    { "kind": "world", "name": "app", "items": [
                        { "kind": "import", "interface": "ns:geo/shapes@1.0.0" },
                        { "kind": "import", "name": "log", "func": { "params": [{ "name": "msg", "type": "string" }] } },
                        { "kind": "export", "name": "run", "items": [] },
                        { "kind": "include", "world": "base" }
                    ]}
                ]
            }"#,
        )
        .unwrap();
        let Some(Item::World { items, .. }) = doc.items.first() else {
            panic!("expected world");
        };
        assert!(matches!(
            items.first(),
            Some(Item::Import(WorldItemDecl::Interface { interface })) if interface == "ns:geo/shapes@1.0.0"
        ));
        assert!(matches!(
            items.get(1),
            Some(Item::Import(WorldItemDecl::Function { name, .. })) if name == "log"
        ));
        assert!(matches!(
            items.get(2),
            Some(Item::Export(WorldItemDecl::Inline { name, .. })) if name == "run"
        ));
        assert!(matches!(items.get(3), Some(Item::Include { world }) if world == "base"));
    }

    #[test]
    fn test_unknown_document_field_is_rejected() {
        assert!(Document::from_json(r#"{ "pakage": "ns:x" }"#).is_err());
    }
}
