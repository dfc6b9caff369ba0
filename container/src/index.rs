//! The field index: one fixed-size entry per top-level attribute,
//! sorted by tag, mapping each tag to its record in the metadata block.

use crate::error::{
    CorruptError, IndexOrderSnafu, IndexOutOfRangeSnafu, UnknownEntryKindSnafu, UnknownVrSnafu,
};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use byteordered::ByteOrdered;
use dimble_core::{Tag, Value, VR};
use snafu::{ensure, OptionExt};
use std::io::Write;

/// The length of an index entry in bytes.
pub const ENTRY_LEN: usize = 24;

/// The kind of value held by a top-level attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Primitive,
    Sequence,
    PixelPlaceholder,
}

impl EntryKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Primitive(_) => EntryKind::Primitive,
            Value::Sequence(_) => EntryKind::Sequence,
            Value::PixelPlaceholder => EntryKind::PixelPlaceholder,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            EntryKind::Primitive => 0,
            EntryKind::Sequence => 1,
            EntryKind::PixelPlaceholder => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EntryKind::Primitive),
            1 => Some(EntryKind::Sequence),
            2 => Some(EntryKind::PixelPlaceholder),
            _ => None,
        }
    }
}

/// An entry of the field index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub tag: Tag,
    pub vr: VR,
    pub kind: EntryKind,
    /// Offset of the record relative to the start of the metadata block
    pub offset: u64,
    /// Length of the whole record, nested items included
    pub len: u64,
}

impl IndexEntry {
    pub fn write_to<W: Write>(&self, to: W) -> std::io::Result<()> {
        let mut to = ByteOrdered::le(to);
        to.write_u16(self.tag.group())?;
        to.write_u16(self.tag.element())?;
        to.write_all(&self.vr.to_bytes())?;
        to.write_u8(self.kind.code())?;
        to.write_u8(0)?;
        to.write_u64(self.offset)?;
        to.write_u64(self.len)?;
        Ok(())
    }

    /// Decode an entry from exactly [`ENTRY_LEN`] bytes
    /// found at `position` in the index.
    fn decode(bytes: &[u8], position: u64) -> Result<Self, CorruptError> {
        let tag = Tag(
            LittleEndian::read_u16(&bytes[0..2]),
            LittleEndian::read_u16(&bytes[2..4]),
        );
        let vr_bytes = [bytes[4], bytes[5]];
        let vr = VR::from_binary(vr_bytes).context(UnknownVrSnafu {
            bytes: vr_bytes,
            offset: position + 4,
        })?;
        let kind = EntryKind::from_code(bytes[6]).context(UnknownEntryKindSnafu {
            tag,
            kind: bytes[6],
        })?;
        Ok(IndexEntry {
            tag,
            vr,
            kind,
            offset: LittleEndian::read_u64(&bytes[8..16]),
            len: LittleEndian::read_u64(&bytes[16..24]),
        })
    }
}

/// The decoded field index of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIndex {
    entries: Vec<IndexEntry>,
}

impl FieldIndex {
    /// Decode and validate the field index.
    ///
    /// `base` is the absolute offset of the index, used in error reports.
    /// Entries must be in strictly ascending tag order
    /// and point inside a metadata block of `metadata_len` bytes.
    pub fn decode(bytes: &[u8], base: u64, metadata_len: u64) -> Result<Self, CorruptError> {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(bytes.len() / ENTRY_LEN);
        for (position, chunk) in bytes.chunks_exact(ENTRY_LEN).enumerate() {
            let entry = IndexEntry::decode(chunk, base + (position * ENTRY_LEN) as u64)?;
            if let Some(last) = entries.last() {
                ensure!(last.tag < entry.tag, IndexOrderSnafu { position });
            }
            let in_range = entry.len > 0
                && entry
                    .offset
                    .checked_add(entry.len)
                    .map_or(false, |end| end <= metadata_len);
            ensure!(
                in_range,
                IndexOutOfRangeSnafu {
                    tag: entry.tag,
                    offset: entry.offset,
                    len: entry.len,
                    metadata_len,
                }
            );
            entries.push(entry);
        }
        Ok(FieldIndex { entries })
    }

    /// Build an index from entries already sorted by tag.
    pub(crate) fn from_sorted(entries: Vec<IndexEntry>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].tag < w[1].tag));
        FieldIndex { entries }
    }

    /// Look up the entry of a top-level attribute.
    pub fn get(&self, tag: Tag) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by_key(&tag, |e| e.tag)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.iter().map(|e| e.tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to<W: Write>(&self, mut to: W) -> std::io::Result<()> {
        for entry in &self.entries {
            entry.write_to(&mut to)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimble_core::tags;
    use pretty_assertions::assert_eq;

    fn entries() -> Vec<IndexEntry> {
        vec![
            IndexEntry {
                tag: tags::MODALITY,
                vr: VR::CS,
                kind: EntryKind::Primitive,
                offset: 0,
                len: 17,
            },
            IndexEntry {
                tag: tags::DERIVATION_CODE_SEQUENCE,
                vr: VR::SQ,
                kind: EntryKind::Sequence,
                offset: 17,
                len: 60,
            },
            IndexEntry {
                tag: tags::PIXEL_DATA,
                vr: VR::OW,
                kind: EntryKind::PixelPlaceholder,
                offset: 77,
                len: 7,
            },
        ]
    }

    fn encoded(entries: &[IndexEntry]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for e in entries {
            e.write_to(&mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn entry_layout() {
        let bytes = encoded(&entries()[..1]);
        assert_eq!(
            bytes,
            vec![
                0x08, 0x00, 0x60, 0x00, b'C', b'S', 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, //
                17, 0, 0, 0, 0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn decode_and_lookup() {
        let index = FieldIndex::decode(&encoded(&entries()), 96, 84).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(tags::PIXEL_DATA), Some(&entries()[2]));
        assert_eq!(index.get(tags::PATIENT_NAME), None);
        assert_eq!(
            index.tags().collect::<Vec<_>>(),
            vec![tags::MODALITY, tags::DERIVATION_CODE_SEQUENCE, tags::PIXEL_DATA]
        );
    }

    #[test]
    fn reject_unsorted() {
        let mut entries = entries();
        entries.swap(0, 1);
        assert!(matches!(
            FieldIndex::decode(&encoded(&entries), 96, 84),
            Err(CorruptError::IndexOrder { position: 1, .. })
        ));
    }

    #[test]
    fn reject_range_outside_metadata() {
        assert!(matches!(
            FieldIndex::decode(&encoded(&entries()), 96, 80),
            Err(CorruptError::IndexOutOfRange { tag, .. }) if tag == tags::PIXEL_DATA
        ));
    }

    #[test]
    fn reject_unknown_vr() {
        let mut bytes = encoded(&entries());
        bytes[4] = b'Z';
        assert!(matches!(
            FieldIndex::decode(&bytes, 96, 84),
            Err(CorruptError::UnknownVr { offset: 100, .. })
        ));
    }
}
