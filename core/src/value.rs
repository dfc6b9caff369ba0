//! Attribute values.
//!
//! A [`Value`] is either a primitive value,
//! a sequence of nested attribute sets,
//! or the placeholder reserved for the pixel data attribute.

use crate::attribute::AttributeSet;
use crate::header::{Tag, VR};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// An aggregation of one or more elements in a value.
pub type C<T> = SmallVec<[T; 2]>;

/// An enum representing a primitive value from an attribute.
///
/// Text of every textual VR is kept as a collection of strings,
/// one per value. Decimal and integer strings (DS, IS) keep
/// their textual form, and person names are held as
/// `Alphabetic=Ideographic=Phonetic`.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// No data. Used for any value of length 0.
    Empty,
    /// A sequence of strings.
    Strs(C<String>),
    /// A sequence of attribute tags. Used for AT.
    Tags(C<Tag>),
    /// Raw bytes. Used for OB, UN and the inline binary of other O* VRs.
    U8(C<u8>),
    /// A sequence of signed 16-bit integers. Used for SS.
    I16(C<i16>),
    /// A sequence of unsigned 16-bit integers. Used for US and OW.
    U16(C<u16>),
    /// A sequence of signed 32-bit integers. Used for SL.
    I32(C<i32>),
    /// A sequence of unsigned 32-bit integers. Used for UL and OL.
    U32(C<u32>),
    /// A sequence of signed 64-bit integers. Used for SV.
    I64(C<i64>),
    /// A sequence of unsigned 64-bit integers. Used for UV and OV.
    U64(C<u64>),
    /// A sequence of 32-bit floating point numbers. Used for FL and OF.
    F32(C<f32>),
    /// A sequence of 64-bit floating point numbers. Used for FD and OD.
    F64(C<f64>),
}

/// Construct a [`PrimitiveValue`] from a variant name and its elements.
///
/// ```
/// # use dimble_core::{dimble_value, PrimitiveValue};
/// let rows = dimble_value!(U16, 512);
/// let spacing = dimble_value!(F64, [0.5, 0.5]);
/// let image_type = dimble_value!(Strs, ["DERIVED".to_string(), "PRIMARY".to_string()]);
/// assert_eq!(spacing.multiplicity(), 2);
/// # let _ = (rows, image_type);
/// ```
#[macro_export]
macro_rules! dimble_value {
    () => {
        $crate::value::PrimitiveValue::Empty
    };
    ($typ: ident, [ $($elem: expr),* $(,)? ]) => {
        {
            use $crate::smallvec::smallvec;
            $crate::value::PrimitiveValue :: $typ (smallvec![$($elem,)*])
        }
    };
    ($typ: ident, $elem: expr) => {
        $crate::value::PrimitiveValue :: $typ ($crate::value::C::from_elem($elem, 1))
    };
}

macro_rules! impl_from_for_primitive {
    ($typ: ty, $variant: ident) => {
        impl From<$typ> for PrimitiveValue {
            fn from(value: $typ) -> Self {
                PrimitiveValue::$variant(C::from_elem(value, 1))
            }
        }

        impl From<Vec<$typ>> for PrimitiveValue {
            fn from(value: Vec<$typ>) -> Self {
                PrimitiveValue::$variant(C::from_vec(value))
            }
        }
    };
}

impl_from_for_primitive!(u8, U8);
impl_from_for_primitive!(i16, I16);
impl_from_for_primitive!(u16, U16);
impl_from_for_primitive!(i32, I32);
impl_from_for_primitive!(u32, U32);
impl_from_for_primitive!(i64, I64);
impl_from_for_primitive!(u64, U64);
impl_from_for_primitive!(f32, F32);
impl_from_for_primitive!(f64, F64);
impl_from_for_primitive!(Tag, Tags);
impl_from_for_primitive!(String, Strs);

impl From<&str> for PrimitiveValue {
    fn from(value: &str) -> Self {
        PrimitiveValue::Strs(C::from_elem(value.to_owned(), 1))
    }
}

impl From<&[u8]> for PrimitiveValue {
    fn from(value: &[u8]) -> Self {
        PrimitiveValue::U8(C::from(value))
    }
}

/// An enum representing an abstraction of a value's data type.
/// This is the equivalent of `PrimitiveValue` without the content,
/// plus the `Sequence` and `PixelPlaceholder` entries.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ValueType {
    /// No data.
    Empty,
    /// A sequence of strings.
    Strs,
    /// A sequence of attribute tags.
    Tags,
    /// Raw bytes.
    U8,
    /// Signed 16-bit integers.
    I16,
    /// Unsigned 16-bit integers.
    U16,
    /// Signed 32-bit integers.
    I32,
    /// Unsigned 32-bit integers.
    U32,
    /// Signed 64-bit integers.
    I64,
    /// Unsigned 64-bit integers.
    U64,
    /// 32-bit floating point numbers.
    F32,
    /// 64-bit floating point numbers.
    F64,
    /// Nested attribute sets.
    Sequence,
    /// The pixel data placeholder.
    PixelPlaceholder,
}

impl ValueType {
    /// Whether a value of this type may be held by an attribute of the
    /// given value representation.
    ///
    /// This is the closed admissibility table shared by the adapter,
    /// the encoder and the decoder.
    pub fn admitted_by(self, vr: VR) -> bool {
        use ValueType::*;
        match self {
            Empty => true,
            Strs => vr.is_text(),
            Tags => vr == VR::AT,
            U8 => vr.is_binary(),
            I16 => vr == VR::SS,
            U16 => matches!(vr, VR::US | VR::OW),
            I32 => vr == VR::SL,
            U32 => matches!(vr, VR::UL | VR::OL),
            I64 => vr == VR::SV,
            U64 => matches!(vr, VR::UV | VR::OV),
            F32 => matches!(vr, VR::FL | VR::OF),
            F64 => matches!(vr, VR::FD | VR::OD),
            Sequence => vr == VR::SQ,
            PixelPlaceholder => matches!(vr, VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::OV),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error type for an attempt of accessing a value
/// in an incompatible representation.
#[derive(Debug, Clone, PartialEq)]
pub struct CastValueError {
    /// The value format requested
    pub requested: &'static str,
    /// The value's actual representation
    pub got: ValueType,
}

impl fmt::Display for CastValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "bad value cast: requested {} but value is {}",
            self.requested, self.got
        )
    }
}

impl std::error::Error for CastValueError {}

macro_rules! impl_primitive_getters {
    ($name_single: ident, $name_multi: ident, $variant: ident, $ret: ty) => {
        /// Get a single value of the requested type.
        /// If it contains multiple values,
        /// only the first one is returned.
        /// An error is returned if the variant is not compatible.
        pub fn $name_single(&self) -> Result<$ret, CastValueError> {
            match self {
                PrimitiveValue::$variant(c) if c.is_empty() => Err(CastValueError {
                    requested: stringify!($name_single),
                    got: ValueType::Empty,
                }),
                PrimitiveValue::$variant(c) => Ok(c[0]),
                value => Err(CastValueError {
                    requested: stringify!($name_single),
                    got: value.value_type(),
                }),
            }
        }

        /// Get a sequence of values of the requested type without copying.
        /// An error is returned if the variant is not compatible.
        pub fn $name_multi(&self) -> Result<&[$ret], CastValueError> {
            match self {
                PrimitiveValue::$variant(c) => Ok(c),
                value => Err(CastValueError {
                    requested: stringify!($name_multi),
                    got: value.value_type(),
                }),
            }
        }
    };
}

impl PrimitiveValue {
    /// Obtain the number of individual values.
    pub fn multiplicity(&self) -> u32 {
        use self::PrimitiveValue::*;
        match self {
            Empty => 0,
            Strs(c) => c.len() as u32,
            Tags(c) => c.len() as u32,
            U8(c) => c.len() as u32,
            I16(c) => c.len() as u32,
            U16(c) => c.len() as u32,
            I32(c) => c.len() as u32,
            U32(c) => c.len() as u32,
            I64(c) => c.len() as u32,
            U64(c) => c.len() as u32,
            F32(c) => c.len() as u32,
            F64(c) => c.len() as u32,
        }
    }

    /// Determine whether this value holds no data.
    pub fn is_empty(&self) -> bool {
        self.multiplicity() == 0
    }

    /// Retrieve the type of this value, without its content.
    pub fn value_type(&self) -> ValueType {
        match self {
            PrimitiveValue::Empty => ValueType::Empty,
            PrimitiveValue::Strs(_) => ValueType::Strs,
            PrimitiveValue::Tags(_) => ValueType::Tags,
            PrimitiveValue::U8(_) => ValueType::U8,
            PrimitiveValue::I16(_) => ValueType::I16,
            PrimitiveValue::U16(_) => ValueType::U16,
            PrimitiveValue::I32(_) => ValueType::I32,
            PrimitiveValue::U32(_) => ValueType::U32,
            PrimitiveValue::I64(_) => ValueType::I64,
            PrimitiveValue::U64(_) => ValueType::U64,
            PrimitiveValue::F32(_) => ValueType::F32,
            PrimitiveValue::F64(_) => ValueType::F64,
        }
    }

    /// Convert the primitive value into a string representation.
    ///
    /// Multiple values are joined with a backslash (`\`).
    pub fn to_str(&self) -> Cow<str> {
        fn join<T: fmt::Display>(values: &[T]) -> String {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\\")
        }

        use self::PrimitiveValue::*;
        match self {
            Empty => Cow::from(""),
            Strs(c) if c.len() == 1 => Cow::from(c[0].as_str()),
            Strs(c) => Cow::from(c.join("\\")),
            Tags(c) => Cow::from(join(c)),
            U8(c) => Cow::from(join(c)),
            I16(c) => Cow::from(join(c)),
            U16(c) => Cow::from(join(c)),
            I32(c) => Cow::from(join(c)),
            U32(c) => Cow::from(join(c)),
            I64(c) => Cow::from(join(c)),
            U64(c) => Cow::from(join(c)),
            F32(c) => Cow::from(join(c)),
            F64(c) => Cow::from(join(c)),
        }
    }

    /// Get the string values without copying.
    pub fn strings(&self) -> Result<&[String], CastValueError> {
        match self {
            PrimitiveValue::Strs(c) => Ok(c),
            value => Err(CastValueError {
                requested: "strings",
                got: value.value_type(),
            }),
        }
    }

    /// Get the raw bytes without copying.
    pub fn bytes(&self) -> Result<&[u8], CastValueError> {
        match self {
            PrimitiveValue::U8(c) => Ok(c),
            value => Err(CastValueError {
                requested: "bytes",
                got: value.value_type(),
            }),
        }
    }

    impl_primitive_getters!(tag, tags, Tags, Tag);
    impl_primitive_getters!(int16, int16_slice, I16, i16);
    impl_primitive_getters!(uint16, uint16_slice, U16, u16);
    impl_primitive_getters!(int32, int32_slice, I32, i32);
    impl_primitive_getters!(uint32, uint32_slice, U32, u32);
    impl_primitive_getters!(int64, int64_slice, I64, i64);
    impl_primitive_getters!(uint64, uint64_slice, U64, u64);
    impl_primitive_getters!(float32, float32_slice, F32, f32);
    impl_primitive_getters!(float64, float64_slice, F64, f64);
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

/// The value of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A primitive value.
    Primitive(PrimitiveValue),
    /// A sequence of items, each one a nested attribute set.
    Sequence(Vec<AttributeSet>),
    /// Stands in for the pixel data,
    /// whose samples live in the container's tensor block.
    PixelPlaceholder,
}

impl Value {
    /// Retrieve the type of this value, without its content.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Primitive(v) => v.value_type(),
            Value::Sequence(_) => ValueType::Sequence,
            Value::PixelPlaceholder => ValueType::PixelPlaceholder,
        }
    }

    /// Gets a reference to the primitive value, if it is one.
    pub fn primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Gets a reference to the sequence items, if this is a sequence.
    pub fn items(&self) -> Option<&[AttributeSet]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// The number of individual values,
    /// or the number of items in the case of a sequence.
    pub fn multiplicity(&self) -> u32 {
        match self {
            Value::Primitive(v) => v.multiplicity(),
            Value::Sequence(items) => items.len() as u32,
            Value::PixelPlaceholder => 1,
        }
    }

    /// Whether this is the pixel data placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::PixelPlaceholder)
    }
}

impl From<PrimitiveValue> for Value {
    fn from(value: PrimitiveValue) -> Self {
        Value::Primitive(value)
    }
}

impl From<Vec<AttributeSet>> for Value {
    fn from(items: Vec<AttributeSet>) -> Self {
        Value::Sequence(items)
    }
}
