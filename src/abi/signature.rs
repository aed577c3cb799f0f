//! Function signatures at the component boundary.

use std::collections::BTreeSet;

use serde::Serialize;

use super::flatten::unsupported;
use super::{CanonicalAbi, CanonicalAbiError, CoreType, Layout, MAX_FLAT_PARAMS, MAX_FLAT_RESULTS};
use crate::model::{FunctionType, Type, TypeId};

/// How one function crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionAbi {
    pub param_types: Vec<TypeId>,
    pub result_types: Vec<TypeId>,
    /// Flattened parameter words, before the spill decision.
    pub flat_params: Vec<CoreType>,
    /// Flattened result words, before the return-pointer decision.
    pub flat_results: Vec<CoreType>,
    /// Parameters are passed through one pointer to a memory area.
    pub spill_params: bool,
    /// Results are written into a caller-supplied memory area.
    pub ret_ptr: bool,
    /// Parameters of the core function, with the spill pointer and the
    /// return pointer substituted in.
    pub core_params: Vec<CoreType>,
    pub core_results: Vec<CoreType>,
    /// Layout of the spilled parameter area, when `spill_params`.
    pub param_area: Option<Layout>,
    /// Layout of the return area, when `ret_ptr`.
    pub return_area: Option<Layout>,
    /// Results own memory that the caller releases through post-return.
    pub needs_post_return: bool,
    /// Owned resource handles move from caller to callee.
    pub params_transfer_handles: bool,
    /// Owned resource handles move from callee to caller.
    pub results_transfer_handles: bool,
}

impl CanonicalAbi<'_> {
    /// Compute the boundary signature of a [`Type::Function`] node.
    pub fn function_abi(&self, func: TypeId) -> Result<FunctionAbi, CanonicalAbiError> {
        match self.resolved(func)? {
            Type::Function(function) => self.signature(function),
            other => Err(CanonicalAbiError::TypeMismatch {
                expected: "function".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub fn signature(&self, function: &FunctionType) -> Result<FunctionAbi, CanonicalAbiError> {
        let param_types: Vec<TypeId> = function.params.iter().map(|p| p.ty).collect();
        let result_types = function.results.clone();

        let flat_params = self.flatten_all(&param_types)?;
        let flat_results = self.flatten_all(&result_types)?;

        let spill_params = flat_params.len() > MAX_FLAT_PARAMS;
        let ret_ptr = result_types.len() > 1 || flat_results.len() > MAX_FLAT_RESULTS;

        let mut core_params = if spill_params {
            vec![CoreType::I32]
        } else {
            flat_params.clone()
        };
        let core_results = if ret_ptr {
            core_params.push(CoreType::I32);
            Vec::new()
        } else {
            flat_results.clone()
        };

        let param_area = match spill_params {
            true => Some(self.record_layout(&param_types)?),
            false => None,
        };
        let return_area = match ret_ptr {
            true => Some(self.record_layout(&result_types)?),
            false => None,
        };

        let mut needs_post_return = false;
        let mut results_transfer_handles = false;
        for ty in &result_types {
            needs_post_return |= self.needs_deallocate(*ty)?;
            results_transfer_handles |= self.owns_handles(*ty)?;
        }
        let mut params_transfer_handles = false;
        for ty in &param_types {
            params_transfer_handles |= self.owns_handles(*ty)?;
        }

        Ok(FunctionAbi {
            param_types,
            result_types,
            flat_params,
            flat_results,
            spill_params,
            ret_ptr,
            core_params,
            core_results,
            param_area,
            return_area,
            needs_post_return,
            params_transfer_handles,
            results_transfer_handles,
        })
    }

    /// Whether a lowered value of this type owns linear memory.
    pub fn needs_deallocate(&self, id: TypeId) -> Result<bool, CanonicalAbiError> {
        self.contains(id, &|ty| matches!(ty, Type::String | Type::List(_)))
    }

    /// Whether a value of this type carries an owned resource handle.
    pub fn owns_handles(&self, id: TypeId) -> Result<bool, CanonicalAbiError> {
        self.contains(id, &|ty| matches!(ty, Type::Resource(_)))
    }

    /// Search the type structure for a node matching `pred`.
    fn contains(&self, id: TypeId, pred: &dyn Fn(&Type) -> bool) -> Result<bool, CanonicalAbiError> {
        let mut visited = BTreeSet::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let (resolved, ty) = self.lookup(next)?;
            // Recursive shapes revisit the same node.
            if !visited.insert(resolved) {
                continue;
            }
            if pred(ty) {
                return Ok(true);
            }
            match ty {
                Type::List(inner) | Type::Option(inner) => pending.push(*inner),
                Type::Record(record) => pending.extend(record.fields.iter().map(|f| f.ty)),
                Type::Tuple(elements) => pending.extend(elements.iter().copied()),
                Type::Result(result) => pending.extend([result.ok, result.err].into_iter().flatten()),
                Type::Variant(variant) => pending.extend(variant.cases.iter().filter_map(|c| c.ty)),
                Type::Function(_)
                | Type::Interface(_)
                | Type::World(_)
                | Type::Stream(_)
                | Type::Future(_) => return Err(unsupported(ty)),
                _ => {}
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceType, TypeArena, TypeName};

    #[test]
    fn test_spill_threshold() {
        let mut types = TypeArena::new();
        let s32 = types.alloc(Type::S32);
        let sixteen = types.function(vec![("p", s32); 16], vec![]);
        let seventeen = types.function(vec![("p", s32); 17], vec![]);
        let abi = CanonicalAbi::new(&types);

        let sig = abi.function_abi(sixteen).unwrap();
        assert!(!sig.spill_params);
        assert_eq!(sig.core_params.len(), 16);

        let sig = abi.function_abi(seventeen).unwrap();
        assert!(sig.spill_params);
        assert_eq!(sig.core_params, vec![CoreType::I32]);
        assert_eq!(sig.param_area, Some(Layout::new(68, 4)));
    }

    #[test]
    fn test_ret_ptr_threshold() {
        let mut types = TypeArena::new();
        let s32 = types.alloc(Type::S32);
        let pair = types.record("pair", [("a", s32), ("b", s32)]);
        let one = types.function(vec![], vec![s32]);
        let wide = types.function(vec![("x", s32)], vec![pair]);
        let two = types.function(vec![], vec![s32, s32]);
        let abi = CanonicalAbi::new(&types);

        let sig = abi.function_abi(one).unwrap();
        assert!(!sig.ret_ptr);
        assert_eq!(sig.core_results, vec![CoreType::I32]);

        let sig = abi.function_abi(wide).unwrap();
        assert!(sig.ret_ptr);
        assert_eq!(sig.core_params, vec![CoreType::I32, CoreType::I32]);
        assert!(sig.core_results.is_empty());
        assert_eq!(sig.return_area, Some(Layout::new(8, 4)));

        assert!(abi.function_abi(two).unwrap().ret_ptr);
    }

    #[test]
    fn test_post_return_and_handles() {
        let mut types = TypeArena::new();
        let string = types.alloc(Type::String);
        let res = types.alloc(Type::Resource(ResourceType {
            name: TypeName::local("file"),
            constructors: vec![],
            methods: vec![],
            statics: vec![],
            drop: None,
        }));
        let borrowed = types.alloc(Type::Borrow(res));
        let strings = types.list(string);
        let opt = types.option(strings);
        let f = types.function(vec![("self", borrowed)], vec![opt]);
        let g = types.function(vec![("f", res)], vec![]);
        let abi = CanonicalAbi::new(&types);

        let sig = abi.function_abi(f).unwrap();
        assert!(sig.needs_post_return);
        assert!(!sig.params_transfer_handles);

        let sig = abi.function_abi(g).unwrap();
        assert!(!sig.needs_post_return);
        assert!(sig.params_transfer_handles);
    }
}
