//! Linear memory layout: size, alignment and offsets.

use serde::Serialize;

use super::buffer::align_to;
use super::flatten::{check_flags, unsupported};
use super::{CanonicalAbi, CanonicalAbiError};
use crate::model::{Type, TypeId};

/// Byte size and alignment of a type in linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

impl Layout {
    pub const fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }
}

/// Layout of a discriminated shape (`option`, `result`, `variant`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariantLayout {
    /// Width of the discriminant store: 1 for `option`, 4 otherwise.
    pub discriminant_size: usize,
    /// Offset shared by every case payload.
    pub payload_offset: usize,
    pub size: usize,
    pub align: usize,
}

impl CanonicalAbi<'_> {
    pub fn layout(&self, id: TypeId) -> Result<Layout, CanonicalAbiError> {
        let layout = match self.resolved(id)? {
            Type::Bool | Type::U8 | Type::S8 => Layout::new(1, 1),
            Type::U16 | Type::S16 => Layout::new(2, 2),
            Type::U32 | Type::S32 | Type::F32 | Type::Char => Layout::new(4, 4),
            Type::U64 | Type::S64 | Type::F64 => Layout::new(8, 8),
            Type::String | Type::List(_) => Layout::new(8, 4),
            Type::Enum(_) | Type::Resource(_) | Type::Borrow(_) => Layout::new(4, 4),
            Type::Flags(flags) => {
                check_flags(flags.flags.len(), &flags.name.to_string())?;
                Layout::new(4, 4)
            }
            Type::Record(record) => {
                let fields: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                self.record_layout(&fields)?
            }
            Type::Tuple(elements) => self.record_layout(elements)?,
            Type::Option(_) | Type::Result(_) | Type::Variant(_) => {
                let variant = self.variant_layout(id)?;
                Layout::new(variant.size, variant.align)
            }
            other => return Err(unsupported(other)),
        };
        Ok(layout)
    }

    pub fn memory_size(&self, id: TypeId) -> Result<usize, CanonicalAbiError> {
        Ok(self.layout(id)?.size)
    }

    pub fn memory_align(&self, id: TypeId) -> Result<usize, CanonicalAbiError> {
        Ok(self.layout(id)?.align)
    }

    /// Layout of consecutive fields, as in a record, tuple or spilled
    /// parameter list. An empty field list has size 0 and alignment 1.
    pub fn record_layout(&self, fields: &[TypeId]) -> Result<Layout, CanonicalAbiError> {
        let mut offset = 0;
        let mut align = 1;
        for field in fields {
            let layout = self.layout(*field)?;
            offset = align_to(offset, layout.align) + layout.size;
            align = align.max(layout.align);
        }
        Ok(Layout::new(align_to(offset, align), align))
    }

    /// Offset of each field, in declaration order.
    pub fn field_offsets(&self, fields: &[TypeId]) -> Result<Vec<usize>, CanonicalAbiError> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for field in fields {
            let layout = self.layout(*field)?;
            offset = align_to(offset, layout.align);
            offsets.push(offset);
            offset += layout.size;
        }
        Ok(offsets)
    }

    /// Discriminant and payload placement of an `option`, `result` or `variant`.
    pub fn variant_layout(&self, id: TypeId) -> Result<VariantLayout, CanonicalAbiError> {
        match self.resolved(id)? {
            Type::Option(inner) => {
                let payload = self.layout(*inner)?;
                let align = payload.align.max(1);
                let payload_offset = align_to(1, payload.align);
                Ok(VariantLayout {
                    discriminant_size: 1,
                    payload_offset,
                    size: align_to(payload_offset + payload.size, align),
                    align,
                })
            }
            Type::Result(result) => self.cases_layout([result.ok, result.err]),
            Type::Variant(variant) => self.cases_layout(variant.cases.iter().map(|c| c.ty)),
            other => Err(CanonicalAbiError::TypeMismatch {
                expected: "option, result or variant".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    fn cases_layout(
        &self,
        cases: impl IntoIterator<Item = Option<TypeId>>,
    ) -> Result<VariantLayout, CanonicalAbiError> {
        let mut payload_size = 0;
        let mut align = 4;
        for case in cases.into_iter().flatten() {
            let layout = self.layout(case)?;
            payload_size = payload_size.max(layout.size);
            align = align.max(layout.align);
        }
        let payload_offset = align_to(4, align);
        Ok(VariantLayout {
            discriminant_size: 4,
            payload_offset,
            size: align_to(payload_offset + payload_size, align),
            align,
        })
    }
}
