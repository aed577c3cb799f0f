//! Native values and core wasm words.

use serde::{Deserialize, Serialize};

use crate::abi::{Bitcast, CanonicalAbiError, CoreType};

/// A native value of some IDL type.
///
/// Record fields and variant cases are matched by name against the type
/// they are lowered as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
    Tuple(Vec<Value>),
    Variant {
        case: String,
        payload: Option<Box<Value>>,
    },
    Enum(String),
    Option(Option<Box<Value>>),
    Result(Result<Option<Box<Value>>, Option<Box<Value>>>),
    Flags(Vec<String>),
    /// An owned resource handle.
    Own(u32),
    /// A borrowed resource handle.
    Borrow(u32),
}

impl Value {
    /// Short kind name used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::S8(_) => "s8",
            Value::S16(_) => "s16",
            Value::S32(_) => "s32",
            Value::S64(_) => "s64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Tuple(_) => "tuple",
            Value::Variant { .. } => "variant",
            Value::Enum(_) => "enum",
            Value::Option(_) => "option",
            Value::Result(_) => "result",
            Value::Flags(_) => "flags",
            Value::Own(_) => "own",
            Value::Borrow(_) => "borrow",
        }
    }

    pub fn some(value: Value) -> Value {
        Value::Option(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Option(None)
    }

    pub fn ok(value: Option<Value>) -> Value {
        Value::Result(Ok(value.map(Box::new)))
    }

    pub fn err(value: Option<Value>) -> Value {
        Value::Result(Err(value.map(Box::new)))
    }

    pub fn variant(case: impl Into<String>, payload: Option<Value>) -> Value {
        Value::Variant {
            case: case.into(),
            payload: payload.map(Box::new),
        }
    }

    pub fn record<'n>(fields: impl IntoIterator<Item = (&'n str, Value)>) -> Value {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// A core wasm value, the unit functions are called with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum WasmVal {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl WasmVal {
    pub fn core_type(&self) -> CoreType {
        match self {
            WasmVal::I32(_) => CoreType::I32,
            WasmVal::I64(_) => CoreType::I64,
            WasmVal::F32(_) => CoreType::F32,
            WasmVal::F64(_) => CoreType::F64,
        }
    }

    /// The zero value of a kind, used for unused joined slots.
    pub fn zero(ty: CoreType) -> WasmVal {
        match ty {
            CoreType::I32 => WasmVal::I32(0),
            CoreType::I64 => WasmVal::I64(0),
            CoreType::F32 => WasmVal::F32(0.0),
            CoreType::F64 => WasmVal::F64(0.0),
        }
    }

    /// Reinterpret the value as another kind.
    ///
    /// Widening to `i64` zero-extends; narrowing to `i32` or `f32` keeps
    /// the low 32 bits.
    pub fn bitcast(self, cast: Bitcast) -> Result<WasmVal, CanonicalAbiError> {
        let cast_value = match (cast, self) {
            (Bitcast::None, v) => v,
            (Bitcast::F32ToI32, WasmVal::F32(f)) => WasmVal::I32(f.to_bits() as i32),
            (Bitcast::I32ToF32, WasmVal::I32(i)) => WasmVal::F32(f32::from_bits(i as u32)),
            (Bitcast::I32ToI64, WasmVal::I32(i)) => WasmVal::I64(i64::from(i as u32)),
            (Bitcast::I64ToI32, WasmVal::I64(i)) => WasmVal::I32(i as i32),
            (Bitcast::F32ToI64, WasmVal::F32(f)) => WasmVal::I64(i64::from(f.to_bits())),
            (Bitcast::I64ToF32, WasmVal::I64(i)) => WasmVal::F32(f32::from_bits(i as u32)),
            (Bitcast::F64ToI64, WasmVal::F64(f)) => WasmVal::I64(f.to_bits() as i64),
            (Bitcast::I64ToF64, WasmVal::I64(i)) => WasmVal::F64(f64::from_bits(i as u64)),
            (cast, v) => {
                return Err(CanonicalAbiError::TypeMismatch {
                    expected: format!("operand of {cast:?}"),
                    got: v.core_type().to_string(),
                });
            }
        };
        Ok(cast_value)
    }

    pub fn as_i32(self) -> Result<i32, CanonicalAbiError> {
        match self {
            WasmVal::I32(v) => Ok(v),
            other => Err(core_mismatch(CoreType::I32, other)),
        }
    }

    pub fn as_i64(self) -> Result<i64, CanonicalAbiError> {
        match self {
            WasmVal::I64(v) => Ok(v),
            other => Err(core_mismatch(CoreType::I64, other)),
        }
    }

    pub fn as_f32(self) -> Result<f32, CanonicalAbiError> {
        match self {
            WasmVal::F32(v) => Ok(v),
            other => Err(core_mismatch(CoreType::F32, other)),
        }
    }

    pub fn as_f64(self) -> Result<f64, CanonicalAbiError> {
        match self {
            WasmVal::F64(v) => Ok(v),
            other => Err(core_mismatch(CoreType::F64, other)),
        }
    }

    /// An `i32` read as an unsigned pointer or length.
    pub fn as_u32(self) -> Result<u32, CanonicalAbiError> {
        Ok(self.as_i32()? as u32)
    }
}

fn core_mismatch(expected: CoreType, got: WasmVal) -> CanonicalAbiError {
    CanonicalAbiError::TypeMismatch {
        expected: expected.to_string(),
        got: got.core_type().to_string(),
    }
}

/// Reads flat values in order.
#[derive(Debug)]
pub(crate) struct FlatReader<'v> {
    values: &'v [WasmVal],
    pos: usize,
}

impl<'v> FlatReader<'v> {
    pub(crate) fn new(values: &'v [WasmVal]) -> Self {
        Self { values, pos: 0 }
    }

    pub(crate) fn next(&mut self) -> Result<WasmVal, CanonicalAbiError> {
        let value = self
            .values
            .get(self.pos)
            .copied()
            .ok_or(CanonicalAbiError::FlatArityMismatch {
                expected: self.pos + 1,
                got: self.values.len(),
            })?;
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'v [WasmVal], CanonicalAbiError> {
        let values = self
            .values
            .get(self.pos..self.pos + n)
            .ok_or(CanonicalAbiError::FlatArityMismatch {
                expected: self.pos + n,
                got: self.values.len(),
            })?;
        self.pos += n;
        Ok(values)
    }

    /// Fails unless every value was consumed.
    pub(crate) fn finish(&self) -> Result<(), CanonicalAbiError> {
        if self.pos != self.values.len() {
            return Err(CanonicalAbiError::FlatArityMismatch {
                expected: self.pos,
                got: self.values.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitcast_roundtrip() {
        let f = WasmVal::F32(1.5);
        let joined = f.bitcast(Bitcast::F32ToI64).unwrap();
        assert_eq!(joined, WasmVal::I64(i64::from(1.5f32.to_bits())));
        assert_eq!(joined.bitcast(Bitcast::I64ToF32).unwrap(), f);

        let negative = WasmVal::I32(-1);
        let widened = negative.bitcast(Bitcast::I32ToI64).unwrap();
        assert_eq!(widened, WasmVal::I64(0xffff_ffff));
        assert_eq!(widened.bitcast(Bitcast::I64ToI32).unwrap(), negative);
    }

    #[test]
    fn test_bitcast_rejects_wrong_operand() {
        assert!(WasmVal::I32(1).bitcast(Bitcast::F64ToI64).is_err());
    }

    #[test]
    fn test_value_json_shape() {
        let value = Value::record([("x", Value::S32(1)), ("name", Value::String("a".into()))]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["kind"], "record");
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_reader_arity() {
        let values = [WasmVal::I32(1), WasmVal::I64(2)];
        let mut reader = FlatReader::new(&values);
        assert_eq!(reader.next().unwrap(), WasmVal::I32(1));
        assert!(reader.finish().is_err());
        assert_eq!(reader.take(1).unwrap(), &[WasmVal::I64(2)]);
        assert!(reader.next().is_err());
        assert!(reader.finish().is_ok());
    }
}
