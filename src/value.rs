//! Scalar values and their wire codec.
//!
//! Every scalar on the wire is a one-byte [`ScalarType`] tag followed by the
//! value. Numbers are little-endian, strings and byte buffers carry a u32
//! length prefix.

use std::fmt;

use crate::error::{GraphError, GraphResult};
use crate::wire::{WireReader, WireWriter};

/// A decoded scalar field value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Quat([f32; 4]),
    /// Enumeration discriminant.
    Enum(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScalarType {
    Bool = 1,
    I32 = 2,
    I64 = 3,
    U32 = 4,
    U64 = 5,
    F32 = 6,
    F64 = 7,
    Str = 8,
    Bytes = 9,
    Vec2 = 10,
    Vec3 = 11,
    Quat = 12,
    Enum = 13,
}

impl ScalarType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        let ty = match tag {
            1 => Self::Bool,
            2 => Self::I32,
            3 => Self::I64,
            4 => Self::U32,
            5 => Self::U64,
            6 => Self::F32,
            7 => Self::F64,
            8 => Self::Str,
            9 => Self::Bytes,
            10 => Self::Vec2,
            11 => Self::Vec3,
            12 => Self::Quat,
            13 => Self::Enum,
            _ => return None,
        };
        Some(ty)
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "string",
            Self::Bytes => "bytes",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Quat => "quat",
            Self::Enum => "enum",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::I32(_) => ScalarType::I32,
            Self::I64(_) => ScalarType::I64,
            Self::U32(_) => ScalarType::U32,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
            Self::Str(_) => ScalarType::Str,
            Self::Bytes(_) => ScalarType::Bytes,
            Self::Vec2(_) => ScalarType::Vec2,
            Self::Vec3(_) => ScalarType::Vec3,
            Self::Quat(_) => ScalarType::Quat,
            Self::Enum(_) => ScalarType::Enum,
        }
    }
}

/// A Rust type that can live in a scalar field of a script kind.
///
/// `Default` supplies the value a field is reset to when a policy treats it
/// as native.
pub trait Scalar: Clone + Default + 'static {
    const TYPE: ScalarType;

    fn to_value(&self) -> Value;

    /// Returns `None` when the value has the wrong shape or is out of range.
    fn from_value(value: Value) -> Option<Self>;
}

/// Fieldless enums stored by discriminant.
///
/// Implementors get a [`Scalar`] impl for free.
pub trait ScriptEnum: Copy + Default + 'static {
    fn to_discriminant(self) -> i64;
    fn from_discriminant(value: i64) -> Option<Self>;
}

impl<T: ScriptEnum> Scalar for T {
    const TYPE: ScalarType = ScalarType::Enum;

    fn to_value(&self) -> Value {
        Value::Enum(self.to_discriminant())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Enum(raw) => T::from_discriminant(raw),
            _ => None,
        }
    }
}

macro_rules! direct_scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const TYPE: ScalarType = ScalarType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

direct_scalar!(bool, Bool);
direct_scalar!(i32, I32);
direct_scalar!(i64, I64);
direct_scalar!(u32, U32);
direct_scalar!(u64, U64);
direct_scalar!(f32, F32);
direct_scalar!(f64, F64);
direct_scalar!(String, Str);
direct_scalar!(Vec<u8>, Bytes);
direct_scalar!([f32; 2], Vec2);
direct_scalar!([f32; 3], Vec3);
direct_scalar!([f32; 4], Quat);

macro_rules! widened_scalar {
    ($ty:ty, $variant:ident, $wide:ty) => {
        impl Scalar for $ty {
            const TYPE: ScalarType = ScalarType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(<$wide>::from(*self))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => <$ty>::try_from(inner).ok(),
                    _ => None,
                }
            }
        }
    };
}

widened_scalar!(i8, I32, i32);
widened_scalar!(i16, I32, i32);
widened_scalar!(u8, U32, u32);
widened_scalar!(u16, U32, u32);

impl Scalar for usize {
    const TYPE: ScalarType = ScalarType::U64;

    fn to_value(&self) -> Value {
        Value::U64(*self as u64)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::U64(inner) => usize::try_from(inner).ok(),
            _ => None,
        }
    }
}

/// Names the field a codec failure belongs to.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldContext<'a> {
    pub kind: &'a str,
    pub field: &'a str,
}

impl FieldContext<'_> {
    pub(crate) fn unsupported(&self, detail: impl Into<String>) -> GraphError {
        GraphError::UnsupportedValue {
            kind: self.kind.to_string(),
            field: self.field.to_string(),
            detail: detail.into(),
        }
    }
}

pub(crate) fn encode_value(writer: &mut WireWriter, value: &Value) -> GraphResult<()> {
    writer.put_u8(value.scalar_type().tag());
    match value {
        Value::Bool(v) => writer.put_u8(u8::from(*v)),
        Value::I32(v) => writer.put_i64(i64::from(*v)),
        Value::I64(v) | Value::Enum(v) => writer.put_i64(*v),
        Value::U32(v) => writer.put_u32(*v),
        Value::U64(v) => writer.put_u64(*v),
        Value::F32(v) => writer.put_f32(*v),
        Value::F64(v) => writer.put_f64(*v),
        Value::Str(v) => writer.put_str(v)?,
        Value::Bytes(v) => writer.put_bytes(v)?,
        Value::Vec2(v) => v.iter().for_each(|c| writer.put_f32(*c)),
        Value::Vec3(v) => v.iter().for_each(|c| writer.put_f32(*c)),
        Value::Quat(v) => v.iter().for_each(|c| writer.put_f32(*c)),
    }
    Ok(())
}

pub(crate) fn decode_value(
    reader: &mut WireReader<'_>,
    max_blob_bytes: usize,
    context: FieldContext<'_>,
) -> GraphResult<Value> {
    let tag = reader.u8()?;
    let ty = ScalarType::from_tag(tag)
        .ok_or_else(|| context.unsupported(format!("unknown scalar type tag {tag}")))?;
    let value = match ty {
        ScalarType::Bool => match reader.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(context.unsupported(format!("invalid bool byte {other}"))),
        },
        ScalarType::I32 => {
            let wide = reader.i64()?;
            let narrow = i32::try_from(wide)
                .map_err(|_| context.unsupported(format!("{wide} overflows i32")))?;
            Value::I32(narrow)
        }
        ScalarType::I64 => Value::I64(reader.i64()?),
        ScalarType::U32 => Value::U32(reader.u32()?),
        ScalarType::U64 => Value::U64(reader.u64()?),
        ScalarType::F32 => Value::F32(reader.f32()?),
        ScalarType::F64 => Value::F64(reader.f64()?),
        ScalarType::Str => Value::Str(reader.string(max_blob_bytes)?),
        ScalarType::Bytes => Value::Bytes(reader.bytes(max_blob_bytes)?.to_vec()),
        ScalarType::Vec2 => Value::Vec2([reader.f32()?, reader.f32()?]),
        ScalarType::Vec3 => Value::Vec3([reader.f32()?, reader.f32()?, reader.f32()?]),
        ScalarType::Quat => Value::Quat([
            reader.f32()?,
            reader.f32()?,
            reader.f32()?,
            reader.f32()?,
        ]),
        ScalarType::Enum => Value::Enum(reader.i64()?),
    };
    Ok(value)
}

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod tests;
