//! Resource handle tables.

use std::collections::BTreeMap;

use super::value::Value;
use crate::abi::{CanonicalAbi, CanonicalAbiError};
use crate::model::{Type, TypeId};

/// Table of live resource representations indexed by opaque handle.
///
/// Handles start at 1 and are never reused, so a stale handle is always
/// reported instead of silently naming a newer resource.
#[derive(Debug, Clone)]
pub struct HandleTable<T> {
    entries: BTreeMap<u32, T>,
    next: u32,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: 1,
        }
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rep: T) -> u32 {
        let handle = self.next;
        self.next += 1;
        self.entries.insert(handle, rep);
        handle
    }

    pub fn get(&self, handle: u32) -> Result<&T, CanonicalAbiError> {
        self.entries
            .get(&handle)
            .ok_or(CanonicalAbiError::HandleNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: u32) -> Result<&mut T, CanonicalAbiError> {
        self.entries
            .get_mut(&handle)
            .ok_or(CanonicalAbiError::HandleNotFound(handle))
    }

    /// The `[resource-drop]` operation: remove and return the representation.
    pub fn drop(&mut self, handle: u32) -> Result<T, CanonicalAbiError> {
        self.entries
            .remove(&handle)
            .ok_or(CanonicalAbiError::HandleNotFound(handle))
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CanonicalAbi<'_> {
    /// Owned handles inside `value`, in the order they are lowered.
    ///
    /// These are the handles whose ownership moves when the value crosses
    /// the boundary; borrowed handles never move.
    pub fn owned_handles(&self, value: &Value, ty: TypeId) -> Result<Vec<u32>, CanonicalAbiError> {
        let mut out = Vec::new();
        self.collect_owned(value, ty, &mut out)?;
        Ok(out)
    }

    fn collect_owned(
        &self,
        value: &Value,
        id: TypeId,
        out: &mut Vec<u32>,
    ) -> Result<(), CanonicalAbiError> {
        match (self.resolved(id)?, value) {
            (Type::Resource(_), Value::Own(handle)) => out.push(*handle),
            (Type::List(element), Value::List(items)) => {
                for item in items {
                    self.collect_owned(item, *element, out)?;
                }
            }
            (Type::Record(record), Value::Record(fields)) => {
                for field in &record.fields {
                    if let Some((_, value)) = fields.iter().find(|(name, _)| *name == field.name) {
                        self.collect_owned(value, field.ty, out)?;
                    }
                }
            }
            (Type::Tuple(elements), Value::Tuple(values)) => {
                for (element, value) in elements.iter().zip(values) {
                    self.collect_owned(value, *element, out)?;
                }
            }
            (Type::Option(inner), Value::Option(Some(value))) => {
                self.collect_owned(value, *inner, out)?;
            }
            (Type::Result(result), Value::Result(value)) => {
                let (ty, payload) = match value {
                    Ok(payload) => (result.ok, payload),
                    Err(payload) => (result.err, payload),
                };
                if let (Some(ty), Some(payload)) = (ty, payload) {
                    self.collect_owned(payload, ty, out)?;
                }
            }
            (Type::Variant(variant), Value::Variant { case, payload }) => {
                let ty = variant
                    .cases
                    .iter()
                    .find(|c| c.name == *case)
                    .and_then(|c| c.ty);
                if let (Some(ty), Some(payload)) = (ty, payload) {
                    self.collect_owned(payload, ty, out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_drop() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.get(a), Ok(&"a"));
        assert_eq!(table.drop(a), Ok("a"));
        assert_eq!(table.drop(a), Err(CanonicalAbiError::HandleNotFound(a)));
        assert!(table.get(a).is_err());
        assert_eq!(table.len(), 1);
        // Handles are not reused after a drop.
        assert_eq!(table.insert("c"), 3);
    }
}
