//! Value serialization

use dimble_core::PrimitiveValue;
use serde::ser::SerializeSeq;
use serde::Serialize;

use crate::{DicomJson, INFINITY, NAN, NEG_INFINITY};

/// Wrapper type for [primitive values][1]
/// which should always be encoded as strings.
///
/// Should be used for the value representations
/// AE, AS, CS, DA, DT, LO, LT, SH, ST, TM, UC, UI, UR, and UT.
///
/// [1]: dimble_core::PrimitiveValue
#[derive(Debug, Clone)]
pub struct AsStrings<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for AsStrings<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        AsStrings(value)
    }
}

impl Serialize for AsStrings<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0 {
            PrimitiveValue::Strs(strings) => serializer.collect_seq(strings),
            other => serializer.collect_seq([other.to_str()]),
        }
    }
}

/// Wrapper type for attribute tag values,
/// encoded as `"GGGGEEEE"` strings.
#[derive(Debug, Clone)]
pub struct AsTags<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for AsTags<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        AsTags(value)
    }
}

impl Serialize for AsTags<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0 {
            PrimitiveValue::Tags(tags) => serializer.collect_seq(tags.iter().copied().map(DicomJson)),
            PrimitiveValue::Strs(strings) => serializer.collect_seq(strings),
            other => Err(serde::ser::Error::custom(format!(
                "cannot encode {} as attribute tags",
                other.value_type()
            ))),
        }
    }
}

/// Wrapper type for decimal and integer strings (DS and IS).
///
/// Each string is encoded as a JSON number
/// when the number prints back to the exact same text,
/// and kept as a string otherwise.
#[derive(Debug, Clone)]
pub struct AsDecimals<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for AsDecimals<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        AsDecimals(value)
    }
}

fn decimal_to_json(text: &str) -> serde_json::Value {
    if let Ok(n) = text.parse::<i64>() {
        if n.to_string() == text {
            return serde_json::Value::from(n);
        }
    }
    if let Some(n) = text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        if n.to_string() == text {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::from(text)
}

impl Serialize for AsDecimals<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0 {
            PrimitiveValue::Strs(strings) => {
                serializer.collect_seq(strings.iter().map(|s| decimal_to_json(s)))
            }
            numbers => AsNumbers(numbers).serialize(serializer),
        }
    }
}

/// Wrapper type for [primitive values][1]
/// which should preferably be encoded as numbers,
/// unless the value is already a string,
/// or if serialization would result in precision loss.
///
/// Should be used for the value representations
/// FL, FD, SL, SS, SV, UL, US, and UV,
/// and for numeric values of O* value representations.
///
/// [1]: dimble_core::PrimitiveValue
#[derive(Debug, Clone)]
pub struct AsNumbers<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for AsNumbers<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        AsNumbers(value)
    }
}

macro_rules! serialize_wide_ints {
    ($serializer: expr, $numbers: expr) => {{
        let mut ser = $serializer.serialize_seq(Some($numbers.len()))?;
        for number in $numbers {
            let narrowed: Option<i32> = num_traits::NumCast::from(*number);
            if let Some(narrowed) = narrowed {
                ser.serialize_element(&narrowed)?;
            } else {
                ser.serialize_element(&number.to_string())?;
            }
        }
        ser.end()
    }};
}

impl Serialize for AsNumbers<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0 {
            // empty
            PrimitiveValue::Empty => serializer.serialize_seq(Some(0))?.end(),
            // not numeric
            PrimitiveValue::Tags(_) => Err(serde::ser::Error::custom(
                "cannot encode attribute tags as numbers",
            )),
            // strings
            PrimitiveValue::Strs(strings) => serializer.collect_seq(strings),
            // no risk of precision loss
            PrimitiveValue::U8(numbers) => serializer.collect_seq(numbers),
            PrimitiveValue::I16(numbers) => serializer.collect_seq(numbers),
            PrimitiveValue::U16(numbers) => serializer.collect_seq(numbers),
            PrimitiveValue::I32(numbers) => serializer.collect_seq(numbers),
            PrimitiveValue::U32(numbers) => serializer.collect_seq(numbers),
            // possible precision loss
            PrimitiveValue::I64(numbers) => serialize_wide_ints!(serializer, numbers),
            PrimitiveValue::U64(numbers) => serialize_wide_ints!(serializer, numbers),
            // floating point, single precision numbers
            // go through their shortest decimal form
            PrimitiveValue::F32(numbers) => {
                let mut ser = serializer.serialize_seq(Some(numbers.len()))?;
                for number in numbers {
                    match non_finite_text(f64::from(*number)) {
                        Some(text) => ser.serialize_element(text)?,
                        None => {
                            let shortest: f64 = number
                                .to_string()
                                .parse()
                                .unwrap_or_else(|_| f64::from(*number));
                            ser.serialize_element(&shortest)?
                        }
                    }
                }
                ser.end()
            }
            PrimitiveValue::F64(numbers) => {
                let mut ser = serializer.serialize_seq(Some(numbers.len()))?;
                for number in numbers {
                    match non_finite_text(*number) {
                        Some(text) => ser.serialize_element(text)?,
                        None => ser.serialize_element(number)?,
                    }
                }
                ser.end()
            }
        }
    }
}

fn non_finite_text(number: f64) -> Option<&'static str> {
    if number.is_nan() {
        Some(NAN)
    } else if number.is_infinite() && number.is_sign_positive() {
        Some(INFINITY)
    } else if number.is_infinite() {
        Some(NEG_INFINITY)
    } else {
        None
    }
}

/// Wrapper type for primitive binary values
/// which should be encoded as base64 inline strings.
///
/// Should be used for the value representations
/// OB, OW, OL, OF, OD, OV, and UN.
#[derive(Debug, Clone)]
pub struct InlineBinary<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for InlineBinary<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        InlineBinary(value)
    }
}

impl Serialize for InlineBinary<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = self.0.bytes().map_err(serde::ser::Error::custom)?;
        use base64::Engine;
        let str = base64::engine::general_purpose::STANDARD.encode(value);
        serializer.serialize_str(&str)
    }
}

/// Wrapper type for [primitive values][1]
/// which should always be encoded as person names.
///
/// Should only used for the value representation PN.
///
/// [1]: dimble_core::PrimitiveValue
#[derive(Debug, Clone)]
pub struct AsPersonNames<'a>(&'a PrimitiveValue);

impl<'a> From<&'a PrimitiveValue> for AsPersonNames<'a> {
    fn from(value: &'a PrimitiveValue) -> Self {
        AsPersonNames(value)
    }
}

impl Serialize for AsPersonNames<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let strings = self.0.strings().map_err(serde::ser::Error::custom)?;
        serializer.collect_seq(strings.iter().map(|p| PersonNameDef::from(p.as_str())))
    }
}

/// Wrapper type for a string
/// to be interpreted as a person's name,
/// split into its component groups.
///
/// Should only used for the value representation PN.
#[derive(Debug, Clone, Serialize)]
pub struct PersonNameDef<'a> {
    #[serde(rename = "Alphabetic")]
    alphabetic: &'a str,
    #[serde(rename = "Ideographic", skip_serializing_if = "Option::is_none")]
    ideographic: Option<&'a str>,
    #[serde(rename = "Phonetic", skip_serializing_if = "Option::is_none")]
    phonetic: Option<&'a str>,
}

impl<'a> From<&'a str> for PersonNameDef<'a> {
    fn from(value: &'a str) -> Self {
        let mut groups = value.splitn(3, '=');
        let alphabetic = groups.next().unwrap_or_default();
        let ideographic = groups.next();
        let phonetic = groups.next();
        PersonNameDef {
            alphabetic,
            // the ideographic group is kept when empty
            // so that the phonetic group keeps its position
            ideographic: if phonetic.is_some() {
                ideographic.or(Some(""))
            } else {
                ideographic
            },
            phonetic,
        }
    }
}
