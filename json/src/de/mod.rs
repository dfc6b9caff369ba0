//! DICOM JSON deserialization module

use std::str::FromStr;

use crate::DicomJson;
use dimble_core::{
    tags, value::C, Attribute, AttributeSet, PrimitiveValue, Tag, Value, VR,
};
use serde::de::{Deserialize, DeserializeOwned, Error as _, Visitor};

use self::value::{BulkDataUri, DicomJsonPerson, NumberOrText};

mod value;

/// Deserialize a piece of DIMBLE data from a string of JSON.
pub fn from_str<'a, T>(string: &'a str) -> Result<T, serde_json::Error>
where
    DicomJson<T>: Deserialize<'a>,
{
    serde_json::from_str::<DicomJson<T>>(string).map(DicomJson::into_inner)
}

/// Deserialize a piece of DIMBLE data from a byte slice.
pub fn from_slice<'a, T>(slice: &'a [u8]) -> Result<T, serde_json::Error>
where
    DicomJson<T>: Deserialize<'a>,
{
    serde_json::from_slice::<DicomJson<T>>(slice).map(DicomJson::into_inner)
}

/// Deserialize a piece of DIMBLE data from a standard byte reader.
pub fn from_reader<R, T>(reader: R) -> Result<T, serde_json::Error>
where
    R: std::io::Read,
    DicomJson<T>: DeserializeOwned,
{
    serde_json::from_reader::<_, DicomJson<T>>(reader).map(DicomJson::into_inner)
}

/// Deserialize a piece of DIMBLE data from a serde JSON value.
pub fn from_value<T>(value: serde_json::Value) -> Result<T, serde_json::Error>
where
    DicomJson<T>: DeserializeOwned,
{
    serde_json::from_value::<DicomJson<T>>(value).map(DicomJson::into_inner)
}

#[derive(Debug, Default)]
struct AttributeSetVisitor;

impl<'de> Visitor<'de> for AttributeSetVisitor {
    type Value = AttributeSet;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a DICOM data set map")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut set = AttributeSet::new();
        while let Some(e) = map.next_entry::<DicomJson<Tag>, JsonAttribute>()? {
            let (
                DicomJson(tag),
                JsonAttribute {
                    vr,
                    value,
                    bulk_data_uri,
                },
            ) = e;
            let value = match bulk_data_uri {
                Some(_) if tag == tags::PIXEL_DATA => Value::PixelPlaceholder,
                Some(BulkDataUri(uri)) => {
                    return Err(A::Error::custom(format!(
                        "bulk data URI `{}` is only supported for pixel data, found in {}",
                        uri, tag
                    )));
                }
                None => value,
            };
            if set.put(Attribute::new(tag, vr, value)).is_some() {
                return Err(A::Error::custom(format!("duplicate attribute {}", tag)));
            }
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for DicomJson<AttributeSet> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer
            .deserialize_map(AttributeSetVisitor)
            .map(DicomJson)
    }
}

#[derive(Debug)]
struct JsonAttribute {
    vr: VR,
    value: Value,
    bulk_data_uri: Option<BulkDataUri>,
}

#[derive(Debug)]
struct AttributeVisitor;

fn parse_numbers<N, E>(value: serde_json::Value) -> Result<C<N>, E>
where
    N: Clone + FromStr + DeserializeOwned,
    <N as FromStr>::Err: std::fmt::Display,
    E: serde::de::Error,
{
    let items: Vec<NumberOrText<N>> = serde_json::from_value(value).map_err(E::custom)?;
    items
        .into_iter()
        .map(|v| v.to_num())
        .collect::<Result<C<N>, _>>()
        .map_err(E::custom)
}

impl<'de> Visitor<'de> for AttributeVisitor {
    type Value = JsonAttribute;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an attribute object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut vr = None;
        let mut value: Option<serde_json::Value> = None;
        let mut inline_binary = None;
        let mut bulk_data_uri = None;

        while let Some(key) = map.next_key::<String>()? {
            match &*key {
                "vr" => {
                    if vr.is_some() {
                        return Err(A::Error::custom("\"vr\" should only be set once"));
                    }

                    let val: String = map.next_value()?;
                    let parsed = VR::from_str(&val)
                        .map_err(|_| A::Error::custom(format!("unknown VR `{}`", val)))?;
                    vr = Some(parsed);
                }
                "Value" => {
                    if inline_binary.is_some() {
                        return Err(A::Error::custom(
                            "\"Value\" conflicts with \"InlineBinary\"",
                        ));
                    }

                    if bulk_data_uri.is_some() {
                        return Err(A::Error::custom("\"Value\" conflicts with \"BulkDataURI\""));
                    }

                    // a null value is the same as an absent one
                    value = match map.next_value()? {
                        serde_json::Value::Null => None,
                        value => Some(value),
                    };
                }
                "InlineBinary" => {
                    if value.is_some() {
                        return Err(A::Error::custom(
                            "\"InlineBinary\" conflicts with \"Value\"",
                        ));
                    }

                    if bulk_data_uri.is_some() {
                        return Err(A::Error::custom(
                            "\"InlineBinary\" conflicts with \"BulkDataURI\"",
                        ));
                    }
                    // read value as string
                    let val: String = map.next_value()?;
                    inline_binary = Some(val);
                }
                "BulkDataURI" => {
                    if value.is_some() {
                        return Err(A::Error::custom("\"BulkDataURI\" conflicts with \"Value\""));
                    }

                    if inline_binary.is_some() {
                        return Err(A::Error::custom(
                            "\"BulkDataURI\" conflicts with \"InlineBinary\"",
                        ));
                    }

                    let val: BulkDataUri = map.next_value()?;
                    bulk_data_uri = Some(val);
                }
                other => {
                    return Err(A::Error::custom(format!(
                        "unrecognized attribute field `{}`",
                        other
                    )));
                }
            }
        }

        // ensure that VR is present
        let Some(vr) = vr else {
            return Err(A::Error::custom("missing VR field"));
        };

        let value: Value = match (value, inline_binary) {
            (None, None) => PrimitiveValue::Empty.into(),
            (None, Some(inline_binary)) => {
                if !vr.is_binary() {
                    return Err(A::Error::custom(format!(
                        "inline binary is not allowed for VR {}",
                        vr
                    )));
                }
                // decode from Base64
                use base64::Engine;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(inline_binary)
                    .map_err(|_| A::Error::custom("inline binary data is not valid base64"))?;
                PrimitiveValue::from(data).into()
            }
            (Some(value), None) => parse_value(vr, value)?,
            (Some(_), Some(_)) => {
                return Err(A::Error::custom(
                    "\"Value\" conflicts with \"InlineBinary\"",
                ))
            }
        };

        Ok(JsonAttribute {
            vr,
            value,
            bulk_data_uri,
        })
    }
}

/// Deserialize the `Value` array of an attribute
/// in different ways depending on its VR.
fn parse_value<E>(vr: VR, value: serde_json::Value) -> Result<Value, E>
where
    E: serde::de::Error,
{
    let value = match vr {
        // sequence
        VR::SQ => {
            let items: Vec<Option<DicomJson<AttributeSet>>> =
                serde_json::from_value(value).map_err(E::custom)?;
            let items: Vec<AttributeSet> = items
                .into_iter()
                .map(|item| item.map(DicomJson::into_inner).unwrap_or_default())
                .collect();
            Value::Sequence(items)
        }
        // always text
        VR::AE
        | VR::AS
        | VR::CS
        | VR::DA
        | VR::DT
        | VR::LO
        | VR::LT
        | VR::SH
        | VR::ST
        | VR::UT
        | VR::UR
        | VR::TM
        | VR::UC
        | VR::UI => {
            let items: Vec<Option<String>> = serde_json::from_value(value).map_err(E::custom)?;
            let items: C<String> = items.into_iter().map(|v| v.unwrap_or_default()).collect();
            PrimitiveValue::Strs(items).into()
        }
        // sometimes numbers, sometimes text,
        // but retain string form
        VR::DS | VR::IS => {
            let items: Vec<Option<NumberOrText<serde_json::Number>>> =
                serde_json::from_value(value).map_err(E::custom)?;
            let items: C<String> = items
                .into_iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
                .collect();
            PrimitiveValue::Strs(items).into()
        }
        // person names
        VR::PN => {
            let items: Vec<Option<DicomJsonPerson>> =
                serde_json::from_value(value).map_err(E::custom)?;
            let items: C<String> = items
                .into_iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
                .collect();
            PrimitiveValue::Strs(items).into()
        }
        // tags
        VR::AT => {
            let items: Vec<DicomJson<Tag>> = serde_json::from_value(value).map_err(E::custom)?;
            let items: C<Tag> = items.into_iter().map(DicomJson::into_inner).collect();
            PrimitiveValue::Tags(items).into()
        }
        // numbers, possibly in text form
        VR::SS => PrimitiveValue::I16(parse_numbers(value)?).into(),
        VR::US | VR::OW => PrimitiveValue::U16(parse_numbers(value)?).into(),
        VR::SL => PrimitiveValue::I32(parse_numbers(value)?).into(),
        VR::UL | VR::OL => PrimitiveValue::U32(parse_numbers(value)?).into(),
        VR::SV => PrimitiveValue::I64(parse_numbers(value)?).into(),
        VR::UV | VR::OV => PrimitiveValue::U64(parse_numbers(value)?).into(),
        VR::FL | VR::OF => PrimitiveValue::F32(parse_numbers(value)?).into(),
        VR::FD | VR::OD => PrimitiveValue::F64(parse_numbers(value)?).into(),
        VR::OB => PrimitiveValue::U8(parse_numbers(value)?).into(),
        // unknown
        VR::UN => return Err(E::custom("can't parse JSON Value in UN")),
    };
    Ok(value)
}

impl<'de> Deserialize<'de> for JsonAttribute {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_struct(
            "Attribute",
            &["vr", "Value", "InlineBinary", "BulkDataURI"],
            AttributeVisitor,
        )
    }
}

#[derive(Debug)]
struct TagVisitor;

impl Visitor<'_> for TagVisitor {
    type Value = Tag;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a tag string in the form \"GGGGEEEE\"")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for DicomJson<Tag> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(TagVisitor).map(DicomJson)
    }
}

#[cfg(test)]
mod tests {
    use super::from_str;
    use dimble_core::{dimble_value, tags, Attribute, AttributeSet, PrimitiveValue, Tag, Value, VR};
    use num_traits::Float;
    use pretty_assertions::assert_eq;

    /// This asserts that two float slices are equal in size and content.
    /// It needs a special comparison for NAN values since assert_eq will not match.
    fn assert_float_slice_eq<T: Float + std::fmt::Debug>(actual: &[T], expected: &[T]) {
        assert_eq!(actual.len(), expected.len());
        assert!(
            actual
                .iter()
                .zip(expected.iter())
                .all(|(&a, &b)| (a == b) || (a.is_nan() && b.is_nan())),
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn can_parse_tags() {
        let serialized = "\"00080010\"";
        let tag: Tag = from_str(serialized).unwrap();
        assert_eq!(tag, Tag(0x0008, 0x0010));

        let serialized = "\"7fe00010\"";
        let tag: Tag = from_str(serialized).unwrap();
        assert_eq!(tag, tags::PIXEL_DATA);
    }

    #[test]
    fn can_parse_simple_data_sets() {
        let serialized = serde_json::json!({
            "00080005": {
                "Value": [ "ISO_IR 192" ],
                "vr": "CS"
            },
            "00080020": {
                "vr": "DA",
                "Value": [ "20130409" ]
            },
            "00080061": {
                "vr": "CS",
                "Value": [
                    "CT",
                    "PET"
                ]
            },
            "00080090": {
                "vr": "PN",
                "Value": [
                  {
                    "Alphabetic": "^Bob^^Dr."
                  }
                ]
            },
            "00091002": {
                "vr": "UN",
                "InlineBinary": "z0x9c8v7"
            },
            "00101010": {
                "vr": "AS",
                "Value": [ "30Y" ]
            },
            "00200013": {
                "vr": "IS",
                "Value": [ 5 ]
            }
        });

        let set: AttributeSet = super::from_value(serialized).unwrap();

        assert_eq!(set.len(), 7);
        let tag = Tag(0x0008, 0x0005);
        assert_eq!(
            set.get(tag),
            Some(&Attribute::new(tag, VR::CS, PrimitiveValue::from("ISO_IR 192"))),
        );
        assert_eq!(
            set.get(tags::REFERRING_PHYSICIAN_NAME).and_then(|a| a.to_str()).as_deref(),
            Some("^Bob^^Dr."),
        );
        assert_eq!(
            set.get(tags::INSTANCE_NUMBER),
            Some(&Attribute::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from("5"))),
        );
        assert_eq!(
            set.get(Tag(0x0009, 0x1002)).map(|a| a.value().clone()),
            Some(Value::from(dimble_value!(U8, [0xCF, 0x4C, 0x7D, 0x73, 0xCB, 0xFB]))),
        );
    }

    #[test]
    fn can_parse_null_values() {
        let serialized = serde_json::json!({
            "00080008": {
                "Value": [
                  "DERIVED",
                  "PRIMARY",
                  null,
                  "100000"
                ],
                "vr": "CS"
              }
        });

        let set: AttributeSet = super::from_value(serialized).unwrap();

        assert_eq!(
            set.get(tags::IMAGE_TYPE),
            Some(&Attribute::new(
                tags::IMAGE_TYPE,
                VR::CS,
                dimble_value!(
                    Strs,
                    [
                        "DERIVED".to_string(),
                        "PRIMARY".to_string(),
                        String::new(),
                        "100000".to_string(),
                    ]
                )
            )),
        )
    }

    #[test]
    fn null_value_is_empty() {
        let serialized = serde_json::json!({
            "00100010": { "vr": "PN", "Value": null },
            "00100020": { "vr": "LO" },
            "00089215": { "vr": "SQ", "Value": null }
        });

        let set: AttributeSet = super::from_value(serialized).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.get(tags::PATIENT_NAME),
            Some(&Attribute::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::Empty))
        );
        assert_eq!(
            set.get(tags::PATIENT_ID),
            Some(&Attribute::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::Empty))
        );
        assert_eq!(
            set.get(Tag(0x0008, 0x9215)).map(Attribute::value),
            Some(&Value::from(PrimitiveValue::Empty))
        );
    }

    #[test]
    fn can_parse_nested_sequences() {
        let serialized = serde_json::json!({
            "00089215": {
                "vr": "SQ",
                "Value": [
                    {
                        "00080100": { "vr": "SH", "Value": ["113072"] },
                        "00080102": { "vr": "SH", "Value": ["DCM"] }
                    },
                    {}
                ]
            }
        });

        let set: AttributeSet = super::from_value(serialized).unwrap();
        let items = set
            .get(tags::DERIVATION_CODE_SEQUENCE)
            .and_then(|a| a.items())
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].len(), 2);
        assert!(items[1].is_empty());
        assert_eq!(set.total_count(), 3);
    }

    #[test]
    fn bulk_data_is_only_for_pixel_data() {
        let serialized = serde_json::json!({
            "7FE00010": {
                "vr": "OW",
                "BulkDataURI": "http://localhost:8042/dicom-web/studies/1/series/2/instances/3/bulk/7fe00010"
            }
        });
        let set: AttributeSet = super::from_value(serialized).unwrap();
        assert_eq!(
            set.get(tags::PIXEL_DATA),
            Some(&Attribute::pixel_placeholder(VR::OW))
        );

        let serialized = serde_json::json!({
            "00091002": { "vr": "OB", "BulkDataURI": "http://localhost/bulk" }
        });
        assert!(super::from_value::<AttributeSet>(serialized).is_err());
    }

    #[test]
    fn rejects_malformed_attributes() {
        // unknown VR
        let serialized = serde_json::json!({ "00100010": { "vr": "ZZ", "Value": ["X"] } });
        assert!(super::from_value::<AttributeSet>(serialized).is_err());

        // missing VR
        let serialized = serde_json::json!({ "00100010": { "Value": ["X"] } });
        assert!(super::from_value::<AttributeSet>(serialized).is_err());

        // both value and inline binary
        let serialized =
            serde_json::json!({ "00091002": { "vr": "OB", "Value": [1], "InlineBinary": "AQ==" } });
        assert!(super::from_value::<AttributeSet>(serialized).is_err());

        // bad tag
        let serialized = serde_json::json!({ "0010001": { "vr": "PN" } });
        assert!(super::from_value::<AttributeSet>(serialized).is_err());
    }

    #[test]
    fn can_resolve_nan_and_inf_float() {
        let serialized = serde_json::json!({
            "0018605A": {
                "vr": "FL",
                "Value": [
                    5492.8545,
                    5462.5205,
                    "NaN",
                    "-inf",
                    "inf"
                ]
            }
        });

        let set: AttributeSet = super::from_value(serialized).unwrap();
        let tag = Tag(0x0018, 0x605A);
        let attribute = set.get(tag).unwrap();

        let actual_values = attribute
            .value()
            .primitive()
            .unwrap()
            .float32_slice()
            .unwrap();
        let expected_values = &[
            5492.8545,
            5462.5205,
            f32::NAN,
            f32::NEG_INFINITY,
            f32::INFINITY,
        ];

        assert_float_slice_eq(actual_values, expected_values);
    }
}
