//! Lifting flat core values and linear memory back into native values.

use super::value::{FlatReader, Value, WasmVal};
use crate::abi::{Bitcast, CanonicalAbi, CanonicalAbiError, LinearMemory, check_flags};
use crate::model::{FlagsType, Type, TypeId};

impl CanonicalAbi<'_> {
    /// Lift a value of type `ty` from exactly the flat values `values`.
    ///
    /// Strings and lists are copied out of `memory`; the blocks themselves
    /// are left in place for the owner to free.
    pub fn lift_flat(
        &self,
        ty: TypeId,
        values: &[WasmVal],
        memory: &LinearMemory,
    ) -> Result<Value, CanonicalAbiError> {
        let mut reader = FlatReader::new(values);
        let value = self.read_lifted(ty, &mut reader, memory)?;
        reader.finish()?;
        Ok(value)
    }

    pub(crate) fn read_lifted(
        &self,
        id: TypeId,
        reader: &mut FlatReader<'_>,
        memory: &LinearMemory,
    ) -> Result<Value, CanonicalAbiError> {
        let value = match self.resolved(id)? {
            Type::Bool => Value::Bool(lift_bool(reader.next()?.as_u32()?)),
            Type::U8 => Value::U8(reader.next()?.as_i32()? as u8),
            Type::U16 => Value::U16(reader.next()?.as_i32()? as u16),
            Type::U32 => Value::U32(reader.next()?.as_u32()?),
            Type::U64 => Value::U64(reader.next()?.as_i64()? as u64),
            Type::S8 => Value::S8(reader.next()?.as_i32()? as i8),
            Type::S16 => Value::S16(reader.next()?.as_i32()? as i16),
            Type::S32 => Value::S32(reader.next()?.as_i32()?),
            Type::S64 => Value::S64(reader.next()?.as_i64()?),
            Type::F32 => Value::F32(reader.next()?.as_f32()?),
            Type::F64 => Value::F64(reader.next()?.as_f64()?),
            Type::Char => Value::Char(lift_char(reader.next()?.as_u32()?)?),
            Type::String => {
                let ptr = reader.next()?.as_u32()?;
                let len = reader.next()?.as_u32()?;
                Value::String(self.lift_string(memory, ptr, len)?)
            }
            Type::List(element) => {
                let ptr = reader.next()?.as_u32()?;
                let len = reader.next()?.as_u32()?;
                Value::List(self.lift_list(*element, memory, ptr, len)?)
            }
            Type::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    fields.push((field.name.clone(), self.read_lifted(field.ty, reader, memory)?));
                }
                Value::Record(fields)
            }
            Type::Tuple(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.read_lifted(*element, reader, memory)?);
                }
                Value::Tuple(values)
            }
            Type::Option(inner) => {
                let cases = [None, Some(*inner)];
                match self.read_lifted_case(&cases, reader, memory)? {
                    (0, _) => Value::Option(None),
                    (_, payload) => Value::Option(payload.map(Box::new)),
                }
            }
            Type::Result(result) => {
                let cases = [result.ok, result.err];
                match self.read_lifted_case(&cases, reader, memory)? {
                    (0, payload) => Value::Result(Ok(payload.map(Box::new))),
                    (_, payload) => Value::Result(Err(payload.map(Box::new))),
                }
            }
            Type::Variant(variant) => {
                let cases: Vec<Option<TypeId>> = variant.cases.iter().map(|c| c.ty).collect();
                let (index, payload) = self.read_lifted_case(&cases, reader, memory)?;
                let case = variant
                    .cases
                    .get(index as usize)
                    .ok_or(CanonicalAbiError::InvalidDiscriminant {
                        discriminant: index,
                        num_cases: variant.cases.len(),
                    })?;
                Value::Variant {
                    case: case.name.clone(),
                    payload: payload.map(Box::new),
                }
            }
            Type::Enum(enum_ty) => {
                let index = reader.next()?.as_u32()?;
                let case = enum_ty.cases.get(index as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant: index,
                        num_cases: enum_ty.cases.len(),
                    },
                )?;
                Value::Enum(case.clone())
            }
            Type::Flags(flags) => Value::Flags(lift_flags(flags, reader.next()?.as_u32()?)?),
            Type::Resource(_) => Value::Own(reader.next()?.as_u32()?),
            Type::Borrow(_) => Value::Borrow(reader.next()?.as_u32()?),
            other => return Err(crate::abi::unsupported(other)),
        };
        Ok(value)
    }

    /// Read a discriminant and the joined slots, then lift the active
    /// case's payload from its own words.
    fn read_lifted_case(
        &self,
        cases: &[Option<TypeId>],
        reader: &mut FlatReader<'_>,
        memory: &LinearMemory,
    ) -> Result<(u32, Option<Value>), CanonicalAbiError> {
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
            return Ok((index, None));
        };
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
        let payload = self.lift_flat(*ty, &words, memory)?;
        Ok((index, Some(payload)))
    }

    pub fn lift_string(
        &self,
        memory: &LinearMemory,
        ptr: u32,
        len: u32,
    ) -> Result<String, CanonicalAbiError> {
        let bytes = memory.read(ptr, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CanonicalAbiError::InvalidUtf8)
    }

    pub fn lift_list(
        &self,
        element: TypeId,
        memory: &LinearMemory,
        ptr: u32,
        len: u32,
    ) -> Result<Vec<Value>, CanonicalAbiError> {
        let size = self.memory_size(element)?;
        // The whole element range must be readable before anything is
        // allocated for it. Zero-sized elements count as one byte each.
        let total = u32::try_from(size.max(1))
            .ok()
            .and_then(|stride| stride.checked_mul(len))
            .ok_or(CanonicalAbiError::InvalidMemoryPointer {
                ptr,
                len: u32::MAX,
                memory_size: memory.len(),
            })?;
        memory.read(ptr, total)?;
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len as usize {
            items.push(self.load(element, memory, ptr + (i * size) as u32)?);
        }
        Ok(items)
    }

    /// Load a value of type `ty` stored at `ptr`.
    pub fn load(
        &self,
        id: TypeId,
        memory: &LinearMemory,
        ptr: u32,
    ) -> Result<Value, CanonicalAbiError> {
        let value = match self.resolved(id)? {
            Type::Bool => {
                Value::Bool(lift_bool(u32::from(u8::from_le_bytes(memory.read_bytes(ptr)?))))
            }
            Type::U8 => Value::U8(u8::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::U16 => Value::U16(u16::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::U32 => Value::U32(u32::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::U64 => Value::U64(u64::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::S8 => Value::S8(i8::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::S16 => Value::S16(i16::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::S32 => Value::S32(i32::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::S64 => Value::S64(i64::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::F32 => Value::F32(f32::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::F64 => Value::F64(f64::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::Char => Value::Char(lift_char(u32::from_le_bytes(memory.read_bytes(ptr)?))?),
            Type::String => {
                let (data, len) = load_pair(memory, ptr)?;
                Value::String(self.lift_string(memory, data, len)?)
            }
            Type::List(element) => {
                let (data, len) = load_pair(memory, ptr)?;
                Value::List(self.lift_list(*element, memory, data, len)?)
            }
            Type::Record(record) => {
                let types: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                let offsets = self.field_offsets(&types)?;
                let mut fields = Vec::with_capacity(types.len());
                for (field, offset) in record.fields.iter().zip(offsets) {
                    let value = self.load(field.ty, memory, ptr + offset as u32)?;
                    fields.push((field.name.clone(), value));
                }
                Value::Record(fields)
            }
            Type::Tuple(elements) => {
                let offsets = self.field_offsets(elements)?;
                let mut values = Vec::with_capacity(elements.len());
                for (element, offset) in elements.iter().zip(offsets) {
                    values.push(self.load(*element, memory, ptr + offset as u32)?);
                }
                Value::Tuple(values)
            }
            Type::Option(inner) => match self.load_case(id, &[None, Some(*inner)], memory, ptr)? {
                (0, _) => Value::Option(None),
                (_, payload) => Value::Option(payload.map(Box::new)),
            },
            Type::Result(result) => {
                match self.load_case(id, &[result.ok, result.err], memory, ptr)? {
                    (0, payload) => Value::Result(Ok(payload.map(Box::new))),
                    (_, payload) => Value::Result(Err(payload.map(Box::new))),
                }
            }
            Type::Variant(variant) => {
                let cases: Vec<Option<TypeId>> = variant.cases.iter().map(|c| c.ty).collect();
                let (index, payload) = self.load_case(id, &cases, memory, ptr)?;
                let case = variant.cases.get(index as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant: index,
                        num_cases: cases.len(),
                    },
                )?;
                Value::Variant {
                    case: case.name.clone(),
                    payload: payload.map(Box::new),
                }
            }
            Type::Enum(enum_ty) => {
                let index = u32::from_le_bytes(memory.read_bytes(ptr)?);
                let case = enum_ty.cases.get(index as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant: index,
                        num_cases: enum_ty.cases.len(),
                    },
                )?;
                Value::Enum(case.clone())
            }
            Type::Flags(flags) => {
                Value::Flags(lift_flags(flags, u32::from_le_bytes(memory.read_bytes(ptr)?))?)
            }
            Type::Resource(_) => Value::Own(u32::from_le_bytes(memory.read_bytes(ptr)?)),
            Type::Borrow(_) => Value::Borrow(u32::from_le_bytes(memory.read_bytes(ptr)?)),
            other => return Err(crate::abi::unsupported(other)),
        };
        Ok(value)
    }

    /// Read the discriminant of a stored `option`/`result`/`variant` and
    /// load the active payload.
    fn load_case(
        &self,
        id: TypeId,
        cases: &[Option<TypeId>],
        memory: &LinearMemory,
        ptr: u32,
    ) -> Result<(u32, Option<Value>), CanonicalAbiError> {
        let (index, payload_ptr) = self.load_discriminant(id, memory, ptr)?;
        let case = cases
            .get(index as usize)
            .ok_or(CanonicalAbiError::InvalidDiscriminant {
                discriminant: index,
                num_cases: cases.len(),
            })?;
        match case {
            Some(ty) => Ok((index, Some(self.load(*ty, memory, payload_ptr)?))),
            None => Ok((index, None)),
        }
    }

    /// Discriminant of a stored `option`/`result`/`variant`, with the
    /// address of its payload.
    pub(crate) fn load_discriminant(
        &self,
        id: TypeId,
        memory: &LinearMemory,
        ptr: u32,
    ) -> Result<(u32, u32), CanonicalAbiError> {
        let layout = self.variant_layout(id)?;
        let index = match layout.discriminant_size {
            1 => u32::from(u8::from_le_bytes(memory.read_bytes(ptr)?)),
            _ => u32::from_le_bytes(memory.read_bytes(ptr)?),
        };
        Ok((index, ptr + layout.payload_offset as u32))
    }
}

pub(crate) fn load_pair(memory: &LinearMemory, ptr: u32) -> Result<(u32, u32), CanonicalAbiError> {
    let data = u32::from_le_bytes(memory.read_bytes(ptr)?);
    let len = u32::from_le_bytes(memory.read_bytes(ptr + 4)?);
    Ok((data, len))
}

/// Any nonzero word is `true`.
fn lift_bool(raw: u32) -> bool {
    raw != 0
}

fn lift_char(raw: u32) -> Result<char, CanonicalAbiError> {
    char::from_u32(raw).ok_or(CanonicalAbiError::InvalidChar(raw))
}

/// Bits above the label count are ignored.
fn lift_flags(flags: &FlagsType, bits: u32) -> Result<Vec<String>, CanonicalAbiError> {
    check_flags(flags.flags.len(), &flags.name.to_string())?;
    Ok(flags
        .flags
        .iter()
        .enumerate()
        .filter(|(i, _)| bits & (1 << i) != 0)
        .map(|(_, name)| name.clone())
        .collect())
}
