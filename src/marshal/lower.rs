//! Lowering native values into flat core values and linear memory.

use super::value::{Value, WasmVal};
use crate::abi::{Bitcast, CanonicalAbi, CanonicalAbiError, LinearMemory, check_flags};
use crate::model::{Case, FlagsType, Type, TypeId};

impl CanonicalAbi<'_> {
    /// Lower `value` of type `ty` to its flat core values.
    ///
    /// Strings and lists are copied into freshly allocated blocks of
    /// `memory`; the caller of the receiving function owns those blocks until
    /// the callee frees them after lifting.
    pub fn lower_flat(
        &self,
        value: &Value,
        ty: TypeId,
        memory: &mut LinearMemory,
    ) -> Result<Vec<WasmVal>, CanonicalAbiError> {
        let mut out = Vec::new();
        self.push_lowered(value, ty, memory, &mut out)?;
        Ok(out)
    }

    pub(crate) fn push_lowered(
        &self,
        value: &Value,
        id: TypeId,
        memory: &mut LinearMemory,
        out: &mut Vec<WasmVal>,
    ) -> Result<(), CanonicalAbiError> {
        let ty = self.resolved(id)?;
        match (ty, value) {
            (Type::Bool, Value::Bool(b)) => out.push(WasmVal::I32(i32::from(*b))),
            (Type::U8, Value::U8(v)) => out.push(WasmVal::I32(i32::from(*v))),
            (Type::U16, Value::U16(v)) => out.push(WasmVal::I32(i32::from(*v))),
            (Type::U32, Value::U32(v)) => out.push(WasmVal::I32(*v as i32)),
            (Type::U64, Value::U64(v)) => out.push(WasmVal::I64(*v as i64)),
            (Type::S8, Value::S8(v)) => out.push(WasmVal::I32(i32::from(*v))),
            (Type::S16, Value::S16(v)) => out.push(WasmVal::I32(i32::from(*v))),
            (Type::S32, Value::S32(v)) => out.push(WasmVal::I32(*v)),
            (Type::S64, Value::S64(v)) => out.push(WasmVal::I64(*v)),
            (Type::F32, Value::F32(v)) => out.push(WasmVal::F32(*v)),
            (Type::F64, Value::F64(v)) => out.push(WasmVal::F64(*v)),
            (Type::Char, Value::Char(c)) => out.push(WasmVal::I32(u32::from(*c) as i32)),
            (Type::String, Value::String(s)) => {
                let (ptr, len) = self.lower_string(s, memory)?;
                out.extend([WasmVal::I32(ptr as i32), WasmVal::I32(len as i32)]);
            }
            (Type::List(element), Value::List(items)) => {
                let (ptr, len) = self.lower_list(items, *element, memory)?;
                out.extend([WasmVal::I32(ptr as i32), WasmVal::I32(len as i32)]);
            }
            (Type::Record(record), Value::Record(fields)) => {
                for field in &record.fields {
                    let value = record_field(fields, &field.name)?;
                    self.push_lowered(value, field.ty, memory, out)?;
                }
            }
            (Type::Tuple(elements), Value::Tuple(values)) => {
                check_len(elements.len(), values.len())?;
                for (element, value) in elements.iter().zip(values) {
                    self.push_lowered(value, *element, memory, out)?;
                }
            }
            (Type::Option(inner), Value::Option(value)) => {
                let case = match value {
                    None => (0, None),
                    Some(value) => (1, Some((*inner, &**value))),
                };
                self.push_lowered_case(case, [None, Some(*inner)], memory, out)?;
            }
            (Type::Result(result), Value::Result(value)) => {
                let case = match value {
                    Ok(payload) => (0, payload_with(result.ok, payload.as_deref())?),
                    Err(payload) => (1, payload_with(result.err, payload.as_deref())?),
                };
                self.push_lowered_case(case, [result.ok, result.err], memory, out)?;
            }
            (Type::Variant(variant), Value::Variant { case, payload }) => {
                let (index, found) = find_case(&variant.cases, case)?;
                let payload = payload_with(found.ty, payload.as_deref())?;
                self.push_lowered_case(
                    (index, payload),
                    variant.cases.iter().map(|c| c.ty),
                    memory,
                    out,
                )?;
            }
            (Type::Enum(enum_ty), Value::Enum(case)) => {
                let index = enum_ty
                    .cases
                    .iter()
                    .position(|c| c == case)
                    .ok_or_else(|| unknown_case(case))?;
                out.push(WasmVal::I32(index as i32));
            }
            (Type::Flags(flags), Value::Flags(set)) => {
                out.push(WasmVal::I32(flag_bits(flags, set)? as i32));
            }
            (Type::Resource(_), Value::Own(handle)) | (Type::Borrow(_), Value::Borrow(handle)) => {
                out.push(WasmVal::I32(*handle as i32));
            }
            (ty, value) => return Err(mismatch(ty, value)),
        }
        Ok(())
    }

    /// Discriminant, then the active payload coerced into the joined slots,
    /// then zeros for the slots it does not use.
    fn push_lowered_case(
        &self,
        (index, payload): (u32, Option<(TypeId, &Value)>),
        cases: impl IntoIterator<Item = Option<TypeId>>,
        memory: &mut LinearMemory,
        out: &mut Vec<WasmVal>,
    ) -> Result<(), CanonicalAbiError> {
        let joined = self.flatten_cases(cases)?;
        out.push(WasmVal::I32(index as i32));
        let mut words = Vec::new();
        if let Some((ty, value)) = payload {
            self.push_lowered(value, ty, memory, &mut words)?;
        }
        let mut words = words.into_iter();
        for slot in joined {
            let word = match words.next() {
                Some(word) => {
                    let cast = Bitcast::between(word.core_type(), slot).ok_or_else(|| {
                        CanonicalAbiError::TypeMismatch {
                            expected: slot.to_string(),
                            got: word.core_type().to_string(),
                        }
                    })?;
                    word.bitcast(cast)?
                }
                None => WasmVal::zero(slot),
            };
            out.push(word);
        }
        Ok(())
    }

    /// Copy a string into a fresh allocation. Empty strings are not
    /// allocated and get a dangling pointer of 1.
    pub fn lower_string(
        &self,
        s: &str,
        memory: &mut LinearMemory,
    ) -> Result<(u32, u32), CanonicalAbiError> {
        let bytes = s.as_bytes();
        let ptr = memory.alloc(bytes.len(), 1);
        memory.write(ptr, bytes)?;
        Ok((ptr, bytes.len() as u32))
    }

    /// Store list elements contiguously in a fresh allocation. Empty lists
    /// are not allocated and get a dangling pointer equal to the element
    /// alignment.
    pub fn lower_list(
        &self,
        items: &[Value],
        element: TypeId,
        memory: &mut LinearMemory,
    ) -> Result<(u32, u32), CanonicalAbiError> {
        let layout = self.layout(element)?;
        let ptr = memory.alloc(layout.size * items.len(), layout.align);
        for (i, item) in items.iter().enumerate() {
            self.store(item, element, memory, ptr + (i * layout.size) as u32)?;
        }
        Ok((ptr, items.len() as u32))
    }

    /// Store `value` of type `ty` at `ptr`, laid out as [`layout`] describes.
    ///
    /// [`layout`]: CanonicalAbi::layout
    pub fn store(
        &self,
        value: &Value,
        id: TypeId,
        memory: &mut LinearMemory,
        ptr: u32,
    ) -> Result<(), CanonicalAbiError> {
        let ty = self.resolved(id)?;
        match (ty, value) {
            (Type::Bool, Value::Bool(b)) => memory.write(ptr, &[u8::from(*b)]),
            (Type::U8, Value::U8(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::U16, Value::U16(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::U32, Value::U32(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::U64, Value::U64(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::S8, Value::S8(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::S16, Value::S16(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::S32, Value::S32(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::S64, Value::S64(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::F32, Value::F32(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::F64, Value::F64(v)) => memory.write(ptr, &v.to_le_bytes()),
            (Type::Char, Value::Char(c)) => memory.write(ptr, &u32::from(*c).to_le_bytes()),
            (Type::String, Value::String(s)) => {
                let (data, len) = self.lower_string(s, memory)?;
                store_pair(memory, ptr, data, len)
            }
            (Type::List(element), Value::List(items)) => {
                let (data, len) = self.lower_list(items, *element, memory)?;
                store_pair(memory, ptr, data, len)
            }
            (Type::Record(record), Value::Record(fields)) => {
                let types: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                let offsets = self.field_offsets(&types)?;
                for (field, offset) in record.fields.iter().zip(offsets) {
                    let value = record_field(fields, &field.name)?;
                    self.store(value, field.ty, memory, ptr + offset as u32)?;
                }
                Ok(())
            }
            (Type::Tuple(elements), Value::Tuple(values)) => {
                check_len(elements.len(), values.len())?;
                let offsets = self.field_offsets(elements)?;
                for ((element, value), offset) in elements.iter().zip(values).zip(offsets) {
                    self.store(value, *element, memory, ptr + offset as u32)?;
                }
                Ok(())
            }
            (Type::Option(inner), Value::Option(value)) => {
                let case = match value {
                    None => (0, None),
                    Some(value) => (1, Some((*inner, &**value))),
                };
                self.store_case(id, case, memory, ptr)
            }
            (Type::Result(result), Value::Result(value)) => {
                let case = match value {
                    Ok(payload) => (0, payload_with(result.ok, payload.as_deref())?),
                    Err(payload) => (1, payload_with(result.err, payload.as_deref())?),
                };
                self.store_case(id, case, memory, ptr)
            }
            (Type::Variant(variant), Value::Variant { case, payload }) => {
                let (index, found) = find_case(&variant.cases, case)?;
                let payload = payload_with(found.ty, payload.as_deref())?;
                self.store_case(id, (index, payload), memory, ptr)
            }
            (Type::Enum(enum_ty), Value::Enum(case)) => {
                let index = enum_ty
                    .cases
                    .iter()
                    .position(|c| c == case)
                    .ok_or_else(|| unknown_case(case))?;
                memory.write(ptr, &(index as u32).to_le_bytes())
            }
            (Type::Flags(flags), Value::Flags(set)) => {
                memory.write(ptr, &flag_bits(flags, set)?.to_le_bytes())
            }
            (Type::Resource(_), Value::Own(handle)) | (Type::Borrow(_), Value::Borrow(handle)) => {
                memory.write(ptr, &handle.to_le_bytes())
            }
            (ty, value) => Err(mismatch(ty, value)),
        }
    }

    fn store_case(
        &self,
        id: TypeId,
        (index, payload): (u32, Option<(TypeId, &Value)>),
        memory: &mut LinearMemory,
        ptr: u32,
    ) -> Result<(), CanonicalAbiError> {
        let layout = self.variant_layout(id)?;
        match layout.discriminant_size {
            1 => memory.write(ptr, &[index as u8])?,
            _ => memory.write(ptr, &index.to_le_bytes())?,
        }
        if let Some((ty, value)) = payload {
            self.store(value, ty, memory, ptr + layout.payload_offset as u32)?;
        }
        Ok(())
    }
}

fn store_pair(
    memory: &mut LinearMemory,
    ptr: u32,
    data: u32,
    len: u32,
) -> Result<(), CanonicalAbiError> {
    memory.write(ptr, &data.to_le_bytes())?;
    memory.write(ptr + 4, &len.to_le_bytes())
}

fn record_field<'v>(fields: &'v [(String, Value)], name: &str) -> Result<&'v Value, CanonicalAbiError> {
    fields
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
        .ok_or_else(|| CanonicalAbiError::TypeMismatch {
            expected: format!("record with field '{name}'"),
            got: "record without it".to_string(),
        })
}

fn check_len(expected: usize, got: usize) -> Result<(), CanonicalAbiError> {
    if expected != got {
        return Err(CanonicalAbiError::TypeMismatch {
            expected: format!("tuple of {expected}"),
            got: format!("tuple of {got}"),
        });
    }
    Ok(())
}

pub(crate) fn find_case<'c>(cases: &'c [Case], name: &str) -> Result<(u32, &'c Case), CanonicalAbiError> {
    cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.name == name)
        .map(|(i, c)| (i as u32, c))
        .ok_or_else(|| unknown_case(name))
}

/// Pair a case payload type with the payload value; both must be present or absent.
fn payload_with(ty: Option<TypeId>, value: Option<&Value>) -> Result<Option<(TypeId, &Value)>, CanonicalAbiError> {
    match (ty, value) {
        (Some(ty), Some(value)) => Ok(Some((ty, value))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(CanonicalAbiError::TypeMismatch {
            expected: "case payload".to_string(),
            got: "no payload".to_string(),
        }),
        (None, Some(value)) => Err(CanonicalAbiError::TypeMismatch {
            expected: "no payload".to_string(),
            got: value.kind().to_string(),
        }),
    }
}

fn flag_bits(flags: &FlagsType, set: &[String]) -> Result<u32, CanonicalAbiError> {
    check_flags(flags.flags.len(), &flags.name.to_string())?;
    let mut bits = 0u32;
    for name in set {
        let index = flags
            .flags
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| unknown_case(name))?;
        bits |= 1 << index;
    }
    Ok(bits)
}

fn unknown_case(name: &str) -> CanonicalAbiError {
    CanonicalAbiError::TypeMismatch {
        expected: "a declared case or flag".to_string(),
        got: format!("'{name}'"),
    }
}

fn mismatch(ty: &Type, value: &Value) -> CanonicalAbiError {
    CanonicalAbiError::TypeMismatch {
        expected: ty.kind().to_string(),
        got: value.kind().to_string(),
    }
}
