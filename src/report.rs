//! Serializable ABI reports handed to code emitters.
//!
//! A [`Report`] lists, for every function, the flattened words and the
//! spill, return-pointer and post-return decisions, plus the size and
//! alignment of every type reachable from the signatures.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::abi::{CanonicalAbi, CanonicalAbiError, CoreType, FunctionAbi, VariantLayout};
use crate::error::Result;
use crate::logging::{debug, warn};
use crate::marshal::Direction;
use crate::model::{Type, TypeId};
use crate::project::{Project, WorldFunction};

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub functions: Vec<FunctionReport>,
    /// Every type reachable from the reported signatures, by id.
    pub types: BTreeMap<TypeId, TypeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionReport {
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub abi: Option<FunctionAbi>,
    /// Why the signature cannot cross the boundary (`stream`, oversized
    /// `flags`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Memory and flat representation of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeReport {
    pub description: String,
    pub size: usize,
    pub align: usize,
    pub flat: Vec<CoreType>,
    /// Field offsets of records and tuples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_offsets: Option<Vec<usize>>,
    /// Discriminant and payload placement of options, results and variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantLayout>,
}

impl TypeReport {
    pub fn of(abi: &CanonicalAbi<'_>, id: TypeId) -> std::result::Result<Self, CanonicalAbiError> {
        let (_, ty) = abi.lookup(id)?;
        let layout = abi.layout(id)?;
        let field_offsets = match ty {
            Type::Record(record) => {
                let fields: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                Some(abi.field_offsets(&fields)?)
            }
            Type::Tuple(elements) => Some(abi.field_offsets(elements)?),
            _ => None,
        };
        let variant = match ty {
            Type::Option(_) | Type::Result(_) | Type::Variant(_) => Some(abi.variant_layout(id)?),
            _ => None,
        };
        Ok(Self {
            description: abi.describe(id),
            size: layout.size,
            align: layout.align,
            flat: abi.flatten(id)?,
            field_offsets,
            variant,
        })
    }
}

impl Report {
    /// Report every function a world imports or exports.
    pub fn for_world(project: &Project, world: &str) -> Result<Self> {
        let functions = project.world_functions(world)?;
        Self::for_functions(&project.abi(), &functions)
    }

    /// Report the functions of every top-level interface, as imports.
    pub fn for_interfaces(project: &Project) -> Result<Self> {
        let mut functions = Vec::new();
        for interface in project.interfaces() {
            let module = interface.module_name();
            functions.extend(project.interface_functions(interface, &module, Direction::Import));
        }
        Self::for_functions(&project.abi(), &functions)
    }

    pub fn for_functions(abi: &CanonicalAbi<'_>, functions: &[WorldFunction]) -> Result<Self> {
        let mut report = Report {
            functions: Vec::with_capacity(functions.len()),
            types: BTreeMap::new(),
        };
        for function in functions {
            let (abi_info, error) = match abi.function_abi(function.func) {
                Ok(info) => (Some(info), None),
                // Resolution failures are a broken project, not a property of
                // one signature.
                Err(CanonicalAbiError::Unresolved(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(function = %function.name, %err, "signature cannot be lowered");
                    (None, Some(err.to_string()))
                }
            };
            if let Some(info) = &abi_info {
                for ty in info.param_types.iter().chain(&info.result_types) {
                    report.collect_types(abi, *ty)?;
                }
            }
            report.functions.push(FunctionReport {
                direction: function.direction,
                module: function.module.clone(),
                name: function.name.clone(),
                abi: abi_info,
                error,
            });
        }
        debug!(
            functions = report.functions.len(),
            types = report.types.len(),
            "built report"
        );
        Ok(report)
    }

    /// Add `id` and everything reachable from it.
    fn collect_types(&mut self, abi: &CanonicalAbi<'_>, id: TypeId) -> Result<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let (resolved, ty) = abi.lookup(id)?;
            if self.types.contains_key(&resolved) {
                continue;
            }
            self.types.insert(resolved, TypeReport::of(abi, resolved)?);
            pending.extend(components(ty));
        }
        Ok(())
    }
}

/// Types directly nested inside `ty`.
fn components(ty: &Type) -> Vec<TypeId> {
    match ty {
        Type::List(element) | Type::Option(element) | Type::Borrow(element) => vec![*element],
        Type::Tuple(elements) => elements.clone(),
        Type::Result(result) => result.ok.into_iter().chain(result.err).collect(),
        Type::Record(record) => record.fields.iter().map(|f| f.ty).collect(),
        Type::Variant(variant) => variant.cases.iter().filter_map(|c| c.ty).collect(),
        _ => Vec::new(),
    }
}
