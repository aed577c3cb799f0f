//! Releasing the memory owned by lowered values.
//!
//! Each allocation made while lowering has one owner that frees it: the
//! callee right after lifting its parameters, or the caller through the
//! post-return step once it is done with the results.

use super::lift::load_pair;
use super::value::{FlatReader, WasmVal};
use crate::abi::{Bitcast, CanonicalAbi, CanonicalAbiError, LinearMemory};
use crate::model::{Type, TypeId};

impl CanonicalAbi<'_> {
    /// Free every block owned by the flat lowering `values` of `ty`.
    pub fn free_flat(
        &self,
        ty: TypeId,
        values: &[WasmVal],
        memory: &mut LinearMemory,
    ) -> Result<(), CanonicalAbiError> {
        let mut reader = FlatReader::new(values);
        self.free_read(ty, &mut reader, memory)?;
        reader.finish()
    }

    fn free_read(
        &self,
        id: TypeId,
        reader: &mut FlatReader<'_>,
        memory: &mut LinearMemory,
    ) -> Result<(), CanonicalAbiError> {
        match self.resolved(id)? {
            Type::String => {
                let ptr = reader.next()?.as_u32()?;
                let len = reader.next()?.as_u32()?;
                memory.free(ptr, len as usize, 1)
            }
            Type::List(element) => {
                let ptr = reader.next()?.as_u32()?;
                let len = reader.next()?.as_u32()?;
                self.free_list(*element, ptr, len, memory)
            }
            Type::Record(record) => {
                for field in &record.fields {
                    self.free_read(field.ty, reader, memory)?;
                }
                Ok(())
            }
            Type::Tuple(elements) => {
                for element in elements {
                    self.free_read(*element, reader, memory)?;
                }
                Ok(())
            }
            Type::Option(inner) => self.free_read_case(&[None, Some(*inner)], reader, memory),
            Type::Result(result) => self.free_read_case(&[result.ok, result.err], reader, memory),
            Type::Variant(variant) => {
                let cases: Vec<Option<TypeId>> = variant.cases.iter().map(|c| c.ty).collect();
                self.free_read_case(&cases, reader, memory)
            }
            _ => {
                // Scalars, handles, enums and flags own nothing.
                let count = self.flat_count(id)?;
                reader.take(count)?;
                Ok(())
            }
        }
    }

    fn free_read_case(
        &self,
        cases: &[Option<TypeId>],
        reader: &mut FlatReader<'_>,
        memory: &mut LinearMemory,
    ) -> Result<(), CanonicalAbiError> {
        let joined = self.flatten_cases(cases.iter().copied())?;
        let index = reader.next()?.as_u32()?;
        let slots = reader.take(joined.len())?;
        let case = cases
            .get(index as usize)
            .ok_or(CanonicalAbiError::InvalidDiscriminant {
                discriminant: index,
                num_cases: cases.len(),
            })?;
        let Some(ty) = case else {
            return Ok(());
        };
        if !self.needs_deallocate(*ty)? {
            return Ok(());
        }
        let wanted = self.flatten(*ty)?;
        let mut words = Vec::with_capacity(wanted.len());
        for (slot, kind) in slots.iter().zip(&wanted) {
            let cast = Bitcast::between(*kind, slot.core_type())
                .ok_or_else(|| CanonicalAbiError::TypeMismatch {
                    expected: kind.to_string(),
                    got: slot.core_type().to_string(),
                })?
                .inverse();
            words.push(slot.bitcast(cast)?);
        }
        self.free_flat(*ty, &words, memory)
    }

    /// Free every block owned by the value of type `ty` stored at `ptr`.
    /// The storage at `ptr` itself is not freed.
    pub fn free_stored(
        &self,
        id: TypeId,
        memory: &mut LinearMemory,
        ptr: u32,
    ) -> Result<(), CanonicalAbiError> {
        match self.resolved(id)? {
            Type::String => {
                let (data, len) = load_pair(memory, ptr)?;
                memory.free(data, len as usize, 1)
            }
            Type::List(element) => {
                let (data, len) = load_pair(memory, ptr)?;
                self.free_list(*element, data, len, memory)
            }
            Type::Record(record) => {
                let types: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                self.free_fields(&types, memory, ptr)
            }
            Type::Tuple(elements) => self.free_fields(elements, memory, ptr),
            Type::Option(inner) => self.free_stored_case(id, &[None, Some(*inner)], memory, ptr),
            Type::Result(result) => {
                self.free_stored_case(id, &[result.ok, result.err], memory, ptr)
            }
            Type::Variant(variant) => {
                let cases: Vec<Option<TypeId>> = variant.cases.iter().map(|c| c.ty).collect();
                self.free_stored_case(id, &cases, memory, ptr)
            }
            _ => Ok(()),
        }
    }

    /// Free the values stored as consecutive fields at `ptr`, as in a
    /// record, a spilled parameter area or a return area.
    pub fn free_fields(
        &self,
        fields: &[TypeId],
        memory: &mut LinearMemory,
        ptr: u32,
    ) -> Result<(), CanonicalAbiError> {
        let offsets = self.field_offsets(fields)?;
        for (field, offset) in fields.iter().zip(offsets) {
            self.free_stored(*field, memory, ptr + offset as u32)?;
        }
        Ok(())
    }

    fn free_stored_case(
        &self,
        id: TypeId,
        cases: &[Option<TypeId>],
        memory: &mut LinearMemory,
        ptr: u32,
    ) -> Result<(), CanonicalAbiError> {
        let (index, payload_ptr) = self.load_discriminant(id, memory, ptr)?;
        match cases.get(index as usize) {
            Some(Some(ty)) => self.free_stored(*ty, memory, payload_ptr),
            Some(None) => Ok(()),
            None => Err(CanonicalAbiError::InvalidDiscriminant {
                discriminant: index,
                num_cases: cases.len(),
            }),
        }
    }

    /// Free list elements first, then the element block.
    fn free_list(
        &self,
        element: TypeId,
        ptr: u32,
        len: u32,
        memory: &mut LinearMemory,
    ) -> Result<(), CanonicalAbiError> {
        let layout = self.layout(element)?;
        if self.needs_deallocate(element)? {
            for i in 0..len as usize {
                self.free_stored(element, memory, ptr + (i * layout.size) as u32)?;
            }
        }
        memory.free(ptr, layout.size * len as usize, layout.align)
    }
}
