//! DICOM JSON serialization module

use std::io::Write;

use crate::DicomJson;
use dimble_core::{Attribute, AttributeSet, PrimitiveValue, Tag, Value, VR};
use serde::{ser::SerializeMap, Serialize, Serializer};

use self::value::{AsDecimals, AsNumbers, AsPersonNames, AsStrings, AsTags, InlineBinary};
mod value;

/// The bulk data URI emitted for the pixel data placeholder
/// when no better reference is known.
pub const PIXEL_ARRAY_URI: &str = "dimble:pixel_array";

/// Serialize a piece of DIMBLE data as a string of JSON.
pub fn to_string<T>(data: T) -> Result<String, serde_json::Error>
where
    DicomJson<T>: From<T> + Serialize,
{
    serde_json::to_string(&DicomJson::from(data))
}

/// Serialize a piece of DIMBLE data as a pretty-printed string of JSON.
pub fn to_string_pretty<T>(data: T) -> Result<String, serde_json::Error>
where
    DicomJson<T>: From<T> + Serialize,
{
    serde_json::to_string_pretty(&DicomJson::from(data))
}

/// Serialize a piece of DIMBLE data as a serde JSON value.
pub fn to_value<T>(data: T) -> Result<serde_json::Value, serde_json::Error>
where
    DicomJson<T>: From<T> + Serialize,
{
    serde_json::to_value(DicomJson::from(data))
}

/// Serialize a piece of DIMBLE data to a vector of bytes.
pub fn to_vec<T>(data: T) -> Result<Vec<u8>, serde_json::Error>
where
    DicomJson<T>: From<T> + Serialize,
{
    serde_json::to_vec(&DicomJson::from(data))
}

/// Serialize a piece of DIMBLE data to a byte writer.
pub fn to_writer<W, T>(writer: W, data: T) -> Result<(), serde_json::Error>
where
    DicomJson<T>: From<T> + Serialize,
    W: Write,
{
    serde_json::to_writer(writer, &DicomJson::from(data))
}

/// Serialize an attribute set as a serde JSON value,
/// referring to the pixel tensor with the given bulk data URI.
pub(crate) fn to_value_with_pixel_uri(
    set: &AttributeSet,
    pixel_uri: &str,
) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(DataSetWithUri {
        set,
        pixel_uri,
    })
}

/// An attribute set together with the bulk data URI of its pixel data.
struct DataSetWithUri<'a> {
    set: &'a AttributeSet,
    pixel_uri: &'a str,
}

impl Serialize for DataSetWithUri<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.set.iter().map(|e| {
            (
                DicomJson(e.tag()),
                AttributeWithUri {
                    attribute: e,
                    pixel_uri: self.pixel_uri,
                },
            )
        }))
    }
}

struct AttributeWithUri<'a> {
    attribute: &'a Attribute,
    pixel_uri: &'a str,
}

impl<'a> From<&'a AttributeSet> for DicomJson<&'a AttributeSet> {
    fn from(value: &'a AttributeSet) -> Self {
        Self(value)
    }
}

impl Serialize for DicomJson<&'_ AttributeSet> {
    /// Serializes the attribute set as a JSON map
    /// containing one entry per attribute,
    /// indexed by tag.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DataSetWithUri {
            set: self.0,
            pixel_uri: PIXEL_ARRAY_URI,
        }
        .serialize(serializer)
    }
}

impl From<AttributeSet> for DicomJson<AttributeSet> {
    fn from(value: AttributeSet) -> Self {
        Self(value)
    }
}

impl Serialize for DicomJson<AttributeSet> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DicomJson(&self.0).serialize(serializer)
    }
}

impl<'a> From<&'a [AttributeSet]> for DicomJson<&'a [AttributeSet]> {
    fn from(value: &'a [AttributeSet]) -> Self {
        Self(value)
    }
}

impl Serialize for DicomJson<&'_ [AttributeSet]> {
    /// Serializes the sequence of attribute sets into a JSON array.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.0.iter().map(DicomJson::from))
    }
}

impl<'a> From<&'a Attribute> for DicomJson<&'a Attribute> {
    fn from(value: &'a Attribute) -> Self {
        Self(value)
    }
}

impl Serialize for DicomJson<&'_ Attribute> {
    /// Serializes the attribute as a single JSON map.
    ///
    /// The fields present will be:
    /// - `"vr"`, containing the value representation;
    /// - Either `"Value"` (as an array of values),
    ///   `"InlineBinary"` (binary data in base64)
    ///   or `"BulkDataURI"` (for the pixel data placeholder),
    ///   if the value is not empty.
    ///
    /// The tag is not encoded,
    /// as it is typically serialized as the entry key within a data set.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        AttributeWithUri {
            attribute: self.0,
            pixel_uri: PIXEL_ARRAY_URI,
        }
        .serialize(serializer)
    }
}

impl Serialize for AttributeWithUri<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut serializer = serializer.serialize_map(None)?;
        let vr = self.attribute.vr();
        serializer.serialize_entry("vr", vr.to_string())?;

        match self.attribute.value() {
            Value::Sequence(items) => {
                serializer.serialize_entry("Value", &DicomJson(items.as_slice()))?;
            }
            Value::PixelPlaceholder => {
                serializer.serialize_entry("BulkDataURI", self.pixel_uri)?;
            }
            Value::Primitive(PrimitiveValue::Empty) => {
                // no-op
            }
            Value::Primitive(v) => match vr {
                VR::AE
                | VR::AS
                | VR::CS
                | VR::DA
                | VR::DT
                | VR::LO
                | VR::LT
                | VR::SH
                | VR::UC
                | VR::UI
                | VR::UR
                | VR::TM
                | VR::ST
                | VR::UT => {
                    serializer.serialize_entry("Value", &AsStrings::from(v))?;
                }
                VR::AT => {
                    serializer.serialize_entry("Value", &AsTags::from(v))?;
                }
                VR::PN => {
                    serializer.serialize_entry("Value", &AsPersonNames::from(v))?;
                }
                VR::IS | VR::DS => {
                    serializer.serialize_entry("Value", &AsDecimals::from(v))?;
                }
                VR::FD | VR::FL | VR::SL | VR::SS | VR::SV | VR::UL | VR::US | VR::UV => {
                    serializer.serialize_entry("Value", &AsNumbers::from(v))?;
                }
                VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN => {
                    if let PrimitiveValue::U8(_) = v {
                        serializer.serialize_entry("InlineBinary", &InlineBinary::from(v))?;
                    } else {
                        serializer.serialize_entry("Value", &AsNumbers::from(v))?;
                    }
                }
                VR::SQ => {
                    return Err(serde::ser::Error::custom(format!(
                        "unexpected primitive value in sequence attribute {}",
                        self.attribute.tag()
                    )))
                }
            },
        }

        serializer.end()
    }
}

impl From<Tag> for DicomJson<Tag> {
    fn from(value: Tag) -> Self {
        Self(value)
    }
}

impl Serialize for DicomJson<Tag> {
    /// Serializes the tag as a single string in uppercase hexadecimal,
    /// with no separators or delimiters (`"GGGGEEEE"`).
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let Tag(g, e) = self.0;
        serializer.serialize_str(&format!("{:04X}{:04X}", g, e))
    }
}
