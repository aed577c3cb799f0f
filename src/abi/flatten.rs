//! Flattening types into core wasm words.

use serde::Serialize;

use super::{CanonicalAbi, CanonicalAbiError, MAX_FLAGS};
use crate::model::{Type, TypeId};

/// Core wasm value kinds a flattened type is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreType {
    I32,
    I64,
    F32,
    F64,
}

impl CoreType {
    /// Reconcile two kinds sharing one flat slot.
    ///
    /// Equal kinds stay as they are, `i32` and `f32` share an `i32`, and
    /// every other mix widens to `i64`.
    pub fn join(self, other: CoreType) -> CoreType {
        match (self, other) {
            (a, b) if a == b => a,
            (CoreType::I32, CoreType::F32) | (CoreType::F32, CoreType::I32) => CoreType::I32,
            _ => CoreType::I64,
        }
    }

    /// Size of the kind in bytes.
    pub fn size(self) -> usize {
        match self {
            CoreType::I32 | CoreType::F32 => 4,
            CoreType::I64 | CoreType::F64 => 8,
        }
    }
}

impl std::fmt::Display for CoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CoreType::I32 => "i32",
            CoreType::I64 => "i64",
            CoreType::F32 => "f32",
            CoreType::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// How a case's own word is moved into a joined slot and back out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bitcast {
    None,
    F32ToI32,
    I32ToF32,
    I32ToI64,
    I64ToI32,
    F32ToI64,
    I64ToF32,
    F64ToI64,
    I64ToF64,
}

impl Bitcast {
    /// Cast from a case's kind into the joined kind (or back).
    ///
    /// Returns `None` for pairs the join rule never produces.
    pub fn between(from: CoreType, to: CoreType) -> Option<Bitcast> {
        use CoreType::*;
        let cast = match (from, to) {
            (a, b) if a == b => Bitcast::None,
            (F32, I32) => Bitcast::F32ToI32,
            (I32, F32) => Bitcast::I32ToF32,
            (I32, I64) => Bitcast::I32ToI64,
            (I64, I32) => Bitcast::I64ToI32,
            (F32, I64) => Bitcast::F32ToI64,
            (I64, F32) => Bitcast::I64ToF32,
            (F64, I64) => Bitcast::F64ToI64,
            (I64, F64) => Bitcast::I64ToF64,
            _ => return None,
        };
        Some(cast)
    }

    pub fn inverse(self) -> Bitcast {
        match self {
            Bitcast::None => Bitcast::None,
            Bitcast::F32ToI32 => Bitcast::I32ToF32,
            Bitcast::I32ToF32 => Bitcast::F32ToI32,
            Bitcast::I32ToI64 => Bitcast::I64ToI32,
            Bitcast::I64ToI32 => Bitcast::I32ToI64,
            Bitcast::F32ToI64 => Bitcast::I64ToF32,
            Bitcast::I64ToF32 => Bitcast::F32ToI64,
            Bitcast::F64ToI64 => Bitcast::I64ToF64,
            Bitcast::I64ToF64 => Bitcast::F64ToI64,
        }
    }
}

impl CanonicalAbi<'_> {
    /// Flatten a type into the sequence of core words it is passed as.
    pub fn flatten(&self, ty: TypeId) -> Result<Vec<CoreType>, CanonicalAbiError> {
        let mut out = Vec::new();
        self.push_flat(ty, &mut out)?;
        Ok(out)
    }

    /// Flatten several types back to back, as for a parameter list.
    pub fn flatten_all(&self, types: &[TypeId]) -> Result<Vec<CoreType>, CanonicalAbiError> {
        let mut out = Vec::new();
        for ty in types {
            self.push_flat(*ty, &mut out)?;
        }
        Ok(out)
    }

    pub fn flat_count(&self, ty: TypeId) -> Result<usize, CanonicalAbiError> {
        Ok(self.flatten(ty)?.len())
    }

    /// Joined payload words of a set of cases, without the discriminant.
    ///
    /// The result is as long as the widest case; each position holds the
    /// join of every case word present at that position.
    pub fn flatten_cases(
        &self,
        cases: impl IntoIterator<Item = Option<TypeId>>,
    ) -> Result<Vec<CoreType>, CanonicalAbiError> {
        let mut joined: Vec<CoreType> = Vec::new();
        for case in cases.into_iter().flatten() {
            for (i, word) in self.flatten(case)?.into_iter().enumerate() {
                match joined.get_mut(i) {
                    Some(slot) => *slot = slot.join(word),
                    None => joined.push(word),
                }
            }
        }
        Ok(joined)
    }

    fn push_flat(&self, id: TypeId, out: &mut Vec<CoreType>) -> Result<(), CanonicalAbiError> {
        match self.resolved(id)? {
            Type::Bool
            | Type::U8
            | Type::U16
            | Type::U32
            | Type::S8
            | Type::S16
            | Type::S32
            | Type::Char
            | Type::Enum(_)
            | Type::Resource(_)
            | Type::Borrow(_) => out.push(CoreType::I32),
            Type::U64 | Type::S64 => out.push(CoreType::I64),
            Type::F32 => out.push(CoreType::F32),
            Type::F64 => out.push(CoreType::F64),
            Type::String | Type::List(_) => out.extend([CoreType::I32, CoreType::I32]),
            Type::Flags(flags) => {
                check_flags(flags.flags.len(), &flags.name.to_string())?;
                out.push(CoreType::I32);
            }
            Type::Record(record) => {
                for field in &record.fields {
                    self.push_flat(field.ty, out)?;
                }
            }
            Type::Tuple(elements) => {
                for element in elements {
                    self.push_flat(*element, out)?;
                }
            }
            Type::Option(inner) => {
                out.push(CoreType::I32);
                self.push_flat(*inner, out)?;
            }
            Type::Result(result) => {
                out.push(CoreType::I32);
                out.extend(self.flatten_cases([result.ok, result.err])?);
            }
            Type::Variant(variant) => {
                out.push(CoreType::I32);
                out.extend(self.flatten_cases(variant.cases.iter().map(|c| c.ty))?);
            }
            other => return Err(unsupported(other)),
        }
        Ok(())
    }
}

pub(crate) fn check_flags(count: usize, name: &str) -> Result<(), CanonicalAbiError> {
    if count > MAX_FLAGS {
        return Err(CanonicalAbiError::TooManyFlags {
            name: name.to_string(),
            count,
            max: MAX_FLAGS,
        });
    }
    Ok(())
}

pub(crate) fn unsupported(ty: &Type) -> CanonicalAbiError {
    let what = match ty.type_name() {
        Some(name) => format!("{} {name} cannot be passed as a value", ty.kind()),
        None => format!("{} cannot be passed as a value", ty.kind()),
    };
    CanonicalAbiError::UnsupportedType(what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlagsType, TypeArena, TypeName};

    #[test]
    fn test_join_table() {
        use CoreType::*;
        assert_eq!(I32.join(I32), I32);
        assert_eq!(F32.join(I32), I32);
        assert_eq!(I32.join(F32), I32);
        assert_eq!(I32.join(F64), I64);
        assert_eq!(F32.join(F64), I64);
        assert_eq!(F64.join(F64), F64);
        assert_eq!(I64.join(F32), I64);
    }

    #[test]
    fn test_bitcast_inverse() {
        let cast = Bitcast::between(CoreType::F64, CoreType::I64).unwrap();
        assert_eq!(cast, Bitcast::F64ToI64);
        assert_eq!(cast.inverse(), Bitcast::I64ToF64);
        assert_eq!(Bitcast::between(CoreType::F32, CoreType::F64), None);
    }

    #[test]
    fn test_variant_joins_positions() {
        let mut types = TypeArena::new();
        let s32 = types.alloc(Type::S32);
        let f64 = types.alloc(Type::F64);
        let f32 = types.alloc(Type::F32);
        let pair = types.tuple(vec![f32, f32]);
        let v = types.variant(
            "v",
            [("a", Some(s32)), ("b", Some(f64)), ("c", None), ("d", Some(pair))],
        );
        let abi = CanonicalAbi::new(&types);
        assert_eq!(
            abi.flatten(v).unwrap(),
            vec![CoreType::I32, CoreType::I64, CoreType::F32]
        );
    }

    #[test]
    fn test_empty_result_is_discriminant_only() {
        let mut types = TypeArena::new();
        let r = types.result(None, None);
        let abi = CanonicalAbi::new(&types);
        assert_eq!(abi.flatten(r).unwrap(), vec![CoreType::I32]);
    }

    #[test]
    fn test_too_many_flags() {
        let mut types = TypeArena::new();
        let flags = types.alloc(Type::Flags(FlagsType {
            name: TypeName::local("perms"),
            flags: (0..33).map(|i| format!("f{i}")).collect(),
        }));
        let abi = CanonicalAbi::new(&types);
        assert!(matches!(
            abi.flatten(flags),
            Err(CanonicalAbiError::TooManyFlags { count: 33, .. })
        ));
    }

    #[test]
    fn test_stream_is_unsupported() {
        let mut types = TypeArena::new();
        let s = types.alloc(Type::Stream(None));
        let abi = CanonicalAbi::new(&types);
        assert!(matches!(
            abi.flatten(s),
            Err(CanonicalAbiError::UnsupportedType(_))
        ));
    }
}
