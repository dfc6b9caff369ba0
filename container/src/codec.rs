//! Binary records of the metadata block.
//!
//! A record is the attribute tag, the VR, a value kind and the payload.
//! Sequence payloads nest further records, depth first.

use crate::error::{
    CorruptError, DuplicateAttributeSnafu, EncodeError, InadmissibleValueSnafu,
    IncompatibleValueSnafu, InvalidTextSnafu, MisplacedPlaceholderSnafu, NestingTooDeepSnafu,
    RecordMismatchSnafu, TooDeepSnafu, TooLargeSnafu, TruncatedRecordSnafu, UnknownValueKindSnafu,
    UnknownVrSnafu, WriteSnafu,
};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use byteordered::ByteOrdered;
use dimble_core::value::C;
use dimble_core::{tags, Attribute, AttributeSet, PrimitiveValue, Tag, Value, ValueType, VR};
use snafu::{ensure, OptionExt, ResultExt};
use std::io::Write;

/// The maximum sequence nesting depth.
pub const MAX_DEPTH: usize = 64;

/// The length of a record before its payload.
const RECORD_HEAD_LEN: usize = 7;

/// The value kind code of a value type.
fn kind_code(value_type: ValueType) -> u8 {
    match value_type {
        ValueType::Empty => 0,
        ValueType::Strs => 1,
        ValueType::Tags => 2,
        ValueType::U8 => 3,
        ValueType::I16 => 4,
        ValueType::U16 => 5,
        ValueType::I32 => 6,
        ValueType::U32 => 7,
        ValueType::I64 => 8,
        ValueType::U64 => 9,
        ValueType::F32 => 10,
        ValueType::F64 => 11,
        ValueType::Sequence => 12,
        ValueType::PixelPlaceholder => 13,
    }
}

fn value_type_of_code(code: u8) -> Option<ValueType> {
    Some(match code {
        0 => ValueType::Empty,
        1 => ValueType::Strs,
        2 => ValueType::Tags,
        3 => ValueType::U8,
        4 => ValueType::I16,
        5 => ValueType::U16,
        6 => ValueType::I32,
        7 => ValueType::U32,
        8 => ValueType::I64,
        9 => ValueType::U64,
        10 => ValueType::F32,
        11 => ValueType::F64,
        12 => ValueType::Sequence,
        13 => ValueType::PixelPlaceholder,
        _ => return None,
    })
}

/// Write the record of an attribute.
///
/// `depth` is 0 for top-level attributes.
/// The pixel data placeholder is only accepted at the top level.
pub fn write_attribute<W: Write>(
    to: &mut W,
    attribute: &Attribute,
    depth: usize,
) -> Result<(), EncodeError> {
    let tag = attribute.tag();
    let vr = attribute.vr();
    let value = attribute.value();
    let value_type = value.value_type();

    ensure!(
        value_type.admitted_by(vr),
        IncompatibleValueSnafu {
            tag,
            vr,
            value_type
        }
    );
    if value.is_placeholder() {
        ensure!(
            depth == 0 && tag == tags::PIXEL_DATA,
            MisplacedPlaceholderSnafu { tag, depth }
        );
    }

    {
        let mut out = ByteOrdered::le(&mut *to);
        out.write_u16(tag.group()).context(WriteSnafu)?;
        out.write_u16(tag.element()).context(WriteSnafu)?;
        out.write_all(&vr.to_bytes()).context(WriteSnafu)?;
        out.write_u8(kind_code(value_type)).context(WriteSnafu)?;
    }

    match value {
        Value::Primitive(primitive) => write_primitive(to, tag, primitive),
        Value::Sequence(items) => {
            ensure!(depth < MAX_DEPTH, TooDeepSnafu { tag });
            write_count(to, tag, "item count", items.len())?;
            for item in items {
                write_count(to, tag, "attribute count", item.len())?;
                for nested in item.iter() {
                    write_attribute(to, nested, depth + 1)?;
                }
            }
            Ok(())
        }
        Value::PixelPlaceholder => Ok(()),
    }
}

fn write_count<W: Write>(
    to: &mut W,
    tag: Tag,
    what: &'static str,
    count: usize,
) -> Result<(), EncodeError> {
    let count = u32::try_from(count).ok().with_context(|| TooLargeSnafu {
        what: format!("{} of {}", what, tag),
    })?;
    ByteOrdered::le(to).write_u32(count).context(WriteSnafu)
}

/// Write a count followed by fixed-width values.
macro_rules! write_values {
    ($to: expr, $tag: expr, $values: expr, $method: ident) => {{
        write_count($to, $tag, "value count", $values.len())?;
        let mut out = ByteOrdered::le(&mut *$to);
        for &v in $values.iter() {
            out.$method(v).context(WriteSnafu)?;
        }
        Ok(())
    }};
}

fn write_primitive<W: Write>(
    to: &mut W,
    tag: Tag,
    value: &PrimitiveValue,
) -> Result<(), EncodeError> {
    match value {
        PrimitiveValue::Empty => Ok(()),
        PrimitiveValue::Strs(strings) => {
            write_count(to, tag, "value count", strings.len())?;
            for s in strings {
                write_count(to, tag, "string length", s.len())?;
                to.write_all(s.as_bytes()).context(WriteSnafu)?;
            }
            Ok(())
        }
        PrimitiveValue::Tags(values) => {
            write_count(to, tag, "value count", values.len())?;
            let mut out = ByteOrdered::le(&mut *to);
            for t in values {
                out.write_u16(t.group()).context(WriteSnafu)?;
                out.write_u16(t.element()).context(WriteSnafu)?;
            }
            Ok(())
        }
        PrimitiveValue::U8(bytes) => {
            write_count(to, tag, "byte length", bytes.len())?;
            to.write_all(bytes).context(WriteSnafu)
        }
        PrimitiveValue::I16(values) => write_values!(to, tag, values, write_i16),
        PrimitiveValue::U16(values) => write_values!(to, tag, values, write_u16),
        PrimitiveValue::I32(values) => write_values!(to, tag, values, write_i32),
        PrimitiveValue::U32(values) => write_values!(to, tag, values, write_u32),
        PrimitiveValue::I64(values) => write_values!(to, tag, values, write_i64),
        PrimitiveValue::U64(values) => write_values!(to, tag, values, write_u64),
        PrimitiveValue::F32(values) => write_values!(to, tag, values, write_f32),
        PrimitiveValue::F64(values) => write_values!(to, tag, values, write_f64),
    }
}

/// A cursor over the bytes of one record.
#[derive(Debug)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Absolute offset of `bytes` in the container
    base: u64,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8], base: u64) -> Self {
        RecordReader {
            bytes,
            pos: 0,
            base,
        }
    }

    fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CorruptError> {
        ensure!(
            len <= self.remaining(),
            TruncatedRecordSnafu {
                offset: self.offset(),
                needed: (len - self.remaining()) as u64,
            }
        );
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, CorruptError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CorruptError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn read_u32(&mut self) -> Result<u32, CorruptError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a count of items which take at least `min_size` bytes each,
    /// checking it against the bytes left in the record.
    fn read_count(&mut self, min_size: usize) -> Result<usize, CorruptError> {
        let offset = self.offset();
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(min_size);
        ensure!(
            needed <= self.remaining(),
            TruncatedRecordSnafu {
                offset,
                needed: (needed - self.remaining()) as u64,
            }
        );
        Ok(count)
    }

    /// Read one record and all of its nested records.
    pub fn read_attribute(&mut self, depth: usize) -> Result<Attribute, CorruptError> {
        let offset = self.offset();
        let tag = Tag(self.read_u16()?, self.read_u16()?);
        let vr_bytes = [self.read_u8()?, self.read_u8()?];
        let vr = VR::from_binary(vr_bytes).context(UnknownVrSnafu {
            bytes: vr_bytes,
            offset: offset + 4,
        })?;
        let kind = self.read_u8()?;
        let value_type = value_type_of_code(kind).context(UnknownValueKindSnafu {
            tag,
            kind,
            offset: offset + 6,
        })?;
        let placeholder_allowed =
            value_type != ValueType::PixelPlaceholder || (depth == 0 && tag == tags::PIXEL_DATA);
        ensure!(
            value_type.admitted_by(vr) && placeholder_allowed,
            InadmissibleValueSnafu {
                tag,
                vr,
                value_type
            }
        );

        let value = match value_type {
            ValueType::Sequence => {
                ensure!(
                    depth < MAX_DEPTH,
                    NestingTooDeepSnafu {
                        max: MAX_DEPTH,
                        offset,
                    }
                );
                let count = self.read_count(4)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_item(depth + 1)?);
                }
                Value::Sequence(items)
            }
            ValueType::PixelPlaceholder => Value::PixelPlaceholder,
            _ => Value::Primitive(self.read_primitive(tag, value_type)?),
        };
        Ok(Attribute::new(tag, vr, value))
    }

    fn read_item(&mut self, depth: usize) -> Result<AttributeSet, CorruptError> {
        let count = self.read_count(RECORD_HEAD_LEN)?;
        let mut item = AttributeSet::new();
        for _ in 0..count {
            let offset = self.offset();
            let attribute = self.read_attribute(depth)?;
            let tag = attribute.tag();
            ensure!(
                item.put(attribute).is_none(),
                DuplicateAttributeSnafu { tag, offset }
            );
        }
        Ok(item)
    }

    fn read_primitive(
        &mut self,
        tag: Tag,
        value_type: ValueType,
    ) -> Result<PrimitiveValue, CorruptError> {
        macro_rules! read_values {
            ($variant: ident, $size: expr, $read: expr) => {{
                let count = self.read_count($size)?;
                let bytes = self.take(count * $size)?;
                PrimitiveValue::$variant(bytes.chunks_exact($size).map($read).collect())
            }};
        }

        Ok(match value_type {
            ValueType::Strs => {
                let count = self.read_count(4)?;
                let mut strings: C<String> = C::with_capacity(count);
                for _ in 0..count {
                    let len = self.read_count(1)?;
                    let offset = self.offset();
                    let bytes = self.take(len)?.to_vec();
                    let s = String::from_utf8(bytes).context(InvalidTextSnafu { tag, offset })?;
                    strings.push(s);
                }
                PrimitiveValue::Strs(strings)
            }
            ValueType::Tags => read_values!(Tags, 4, |b: &[u8]| Tag(
                LittleEndian::read_u16(&b[0..2]),
                LittleEndian::read_u16(&b[2..4])
            )),
            ValueType::U8 => {
                let len = self.read_count(1)?;
                PrimitiveValue::U8(C::from_slice(self.take(len)?))
            }
            ValueType::I16 => read_values!(I16, 2, LittleEndian::read_i16),
            ValueType::U16 => read_values!(U16, 2, LittleEndian::read_u16),
            ValueType::I32 => read_values!(I32, 4, LittleEndian::read_i32),
            ValueType::U32 => read_values!(U32, 4, LittleEndian::read_u32),
            ValueType::I64 => read_values!(I64, 8, LittleEndian::read_i64),
            ValueType::U64 => read_values!(U64, 8, LittleEndian::read_u64),
            ValueType::F32 => read_values!(F32, 4, LittleEndian::read_f32),
            ValueType::F64 => read_values!(F64, 8, LittleEndian::read_f64),
            ValueType::Empty | ValueType::Sequence | ValueType::PixelPlaceholder => {
                PrimitiveValue::Empty
            }
        })
    }

    /// Check that the whole record was consumed.
    pub fn finish(self) -> Result<(), CorruptError> {
        ensure!(
            self.remaining() == 0,
            RecordMismatchSnafu {
                offset: self.offset(),
                expected: "end of record".to_string(),
                found: format!("{} trailing bytes", self.remaining()),
            }
        );
        Ok(())
    }
}

/// Decode a complete top-level record,
/// checking it against the tag and VR recorded in the index.
pub fn decode_record(
    bytes: &[u8],
    base: u64,
    tag: Tag,
    vr: VR,
) -> Result<Attribute, CorruptError> {
    let mut reader = RecordReader::new(bytes, base);
    let attribute = reader.read_attribute(0)?;
    ensure!(
        attribute.tag() == tag && attribute.vr() == vr,
        RecordMismatchSnafu {
            offset: base,
            expected: format!("{} {}", tag, vr),
            found: format!("{} {}", attribute.tag(), attribute.vr()),
        }
    );
    reader.finish()?;
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimble_core::dimble_value;
    use pretty_assertions::assert_eq;

    fn encode(attribute: &Attribute) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_attribute(&mut bytes, attribute, 0).unwrap();
        bytes
    }

    fn derivation_code() -> Attribute {
        let item = AttributeSet::from_iter([
            Attribute::new(tags::CODE_VALUE, VR::SH, PrimitiveValue::from("113072")),
            Attribute::new(tags::CODING_SCHEME_DESIGNATOR, VR::SH, PrimitiveValue::from("DCM")),
        ]);
        Attribute::new(tags::DERIVATION_CODE_SEQUENCE, VR::SQ, vec![item, AttributeSet::new()])
    }

    #[test]
    fn string_record_layout() {
        let attribute = Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT"));
        assert_eq!(
            encode(&attribute),
            vec![
                0x08, 0x00, 0x60, 0x00, b'C', b'S', 1, //
                1, 0, 0, 0, //
                2, 0, 0, 0, b'C', b'T',
            ]
        );
    }

    #[test]
    fn decode_primitive_records() {
        let attributes = [
            Attribute::new(tags::ROWS, VR::US, dimble_value!(U16, [512, 3])),
            Attribute::new(tags::PIXEL_SPACING, VR::DS, dimble_value!(Strs, ["0.5".to_string(), "0.5".to_string()])),
            Attribute::new(Tag(0x0018, 0x9219), VR::SS, dimble_value!(I16, [-3])),
            Attribute::new(Tag(0x0020, 0x9165), VR::AT, dimble_value!(Tags, [tags::ROWS])),
            Attribute::new(Tag(0x0009, 0x1010), VR::UN, PrimitiveValue::from(&[1u8, 2, 3][..])),
            Attribute::new(Tag(0x0018, 0x9087), VR::FD, dimble_value!(F64, [f64::NAN])),
            Attribute::empty(tags::REFERRING_PHYSICIAN_NAME, VR::PN),
        ];
        for attribute in attributes {
            let bytes = encode(&attribute);
            let decoded = decode_record(&bytes, 0, attribute.tag(), attribute.vr()).unwrap();
            if attribute.tag() == Tag(0x0018, 0x9087) {
                let value = decoded.value().primitive().unwrap().float64().unwrap();
                assert!(value.is_nan());
            } else {
                assert_eq!(decoded, attribute);
            }
        }
    }

    #[test]
    fn decode_nested_sequence() {
        let attribute = derivation_code();
        let bytes = encode(&attribute);
        let decoded = decode_record(&bytes, 0, attribute.tag(), VR::SQ).unwrap();
        assert_eq!(decoded, attribute);
        assert_eq!(decoded.total_count(), 3);
    }

    #[test]
    fn reject_incompatible_value() {
        let attribute = Attribute::new(tags::ROWS, VR::US, PrimitiveValue::from("512"));
        let mut bytes = Vec::new();
        assert!(matches!(
            write_attribute(&mut bytes, &attribute, 0),
            Err(EncodeError::IncompatibleValue { vr: VR::US, value_type: ValueType::Strs, .. })
        ));
    }

    #[test]
    fn reject_nested_placeholder() {
        let item = AttributeSet::from_iter([Attribute::pixel_placeholder(VR::OW)]);
        let attribute = Attribute::new(tags::DERIVATION_CODE_SEQUENCE, VR::SQ, vec![item]);
        let mut bytes = Vec::new();
        assert!(matches!(
            write_attribute(&mut bytes, &attribute, 0),
            Err(EncodeError::MisplacedPlaceholder { depth: 1, .. })
        ));

        let misplaced = Attribute::new(tags::MODALITY, VR::OB, Value::PixelPlaceholder);
        assert!(matches!(
            write_attribute(&mut bytes, &misplaced, 0),
            Err(EncodeError::MisplacedPlaceholder { depth: 0, .. })
        ));
    }

    #[test]
    fn reject_vr_kind_mismatch_on_decode() {
        let attribute = Attribute::new(tags::ROWS, VR::US, dimble_value!(U16, 512));
        let mut bytes = encode(&attribute);
        // declare the record as text
        bytes[6] = 1;
        assert!(matches!(
            decode_record(&bytes, 0, tags::ROWS, VR::US),
            Err(CorruptError::InadmissibleValue { value_type: ValueType::Strs, .. })
        ));
    }

    #[test]
    fn reject_truncated_and_oversized_counts() {
        let bytes = encode(&derivation_code());
        for len in [3, 7, 12, bytes.len() - 1] {
            assert!(matches!(
                decode_record(&bytes[..len], 0, tags::DERIVATION_CODE_SEQUENCE, VR::SQ),
                Err(CorruptError::TruncatedRecord { .. })
            ));
        }

        let mut huge = bytes.clone();
        huge[7..11].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_record(&huge, 0, tags::DERIVATION_CODE_SEQUENCE, VR::SQ),
            Err(CorruptError::TruncatedRecord { offset: 7, .. })
        ));
    }

    #[test]
    fn reject_trailing_bytes_and_tag_mismatch() {
        let attribute = Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT"));
        let mut bytes = encode(&attribute);
        assert!(matches!(
            decode_record(&bytes, 40, tags::PATIENT_ID, VR::CS),
            Err(CorruptError::RecordMismatch { offset: 40, .. })
        ));
        bytes.push(0);
        assert!(matches!(
            decode_record(&bytes, 0, tags::MODALITY, VR::CS),
            Err(CorruptError::RecordMismatch { .. })
        ));
    }

    #[test]
    fn bounded_nesting_depth() {
        let mut attribute = Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT"));
        for _ in 0..=MAX_DEPTH {
            let item = AttributeSet::from_iter([attribute]);
            attribute = Attribute::new(tags::DERIVATION_CODE_SEQUENCE, VR::SQ, vec![item]);
        }
        let mut bytes = Vec::new();
        assert!(matches!(
            write_attribute(&mut bytes, &attribute, 0),
            Err(EncodeError::TooDeep { .. })
        ));
    }

    #[test]
    fn invalid_utf8() {
        let attribute = Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT"));
        let mut bytes = encode(&attribute);
        bytes[15] = 0xFF;
        assert!(matches!(
            decode_record(&bytes, 0, tags::MODALITY, VR::CS),
            Err(CorruptError::InvalidText { offset: 15, .. })
        ));
    }
}
