//! Error types of the container encoder and loader.

use crate::device::Device;
use dimble_core::{Dtype, Tag, ValueType, VR};
use snafu::{Backtrace, Snafu};
use std::path::PathBuf;

/// An error which may occur when encoding a container.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    #[snafu(display("Attribute {} with VR {} cannot hold a {} value", tag, vr, value_type))]
    IncompatibleValue {
        tag: Tag,
        vr: VR,
        value_type: ValueType,
        backtrace: Backtrace,
    },
    #[snafu(display("Pixel data placeholder found in attribute {} at depth {}", tag, depth))]
    MisplacedPlaceholder {
        tag: Tag,
        depth: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("Pixel data attribute must be a placeholder when a tensor is given"))]
    PixelDataNotPlaceholder { backtrace: Backtrace },
    #[snafu(display("Pixel data VR {} cannot hold {} samples", vr, dtype))]
    PixelDataVr {
        vr: VR,
        dtype: Dtype,
        backtrace: Backtrace,
    },
    #[snafu(display("Pixel data attribute present but no pixel tensor was given"))]
    MissingTensor { backtrace: Backtrace },
    #[snafu(display("Tensor rank {} exceeds the maximum of {}", ndim, max))]
    TensorRank {
        ndim: usize,
        max: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("{} is too large to encode", what))]
    TooLarge { what: String, backtrace: Backtrace },
    #[snafu(display("Sequence in attribute {} exceeds the maximum nesting depth", tag))]
    TooDeep { tag: Tag, backtrace: Backtrace },
    #[snafu(display("Could not stage container in '{}'", dir.display()))]
    StageFile {
        dir: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write encoded container"))]
    Write {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not move staged container to '{}'", path.display()))]
    PersistFile {
        path: PathBuf,
        source: tempfile::PersistError,
        backtrace: Backtrace,
    },
}

/// A structural problem found in a container.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum CorruptError {
    #[snafu(display("Bad magic code {:02X?}", found))]
    BadMagic { found: [u8; 8], backtrace: Backtrace },
    #[snafu(display("Unsupported container version {}", version))]
    UnsupportedVersion { version: u16, backtrace: Backtrace },
    #[snafu(display("Container truncated: needed {} bytes, file has {}", needed, file_len))]
    Truncated {
        needed: u64,
        file_len: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Invalid header field `{}`: {}", field, value))]
    InvalidHeader {
        field: &'static str,
        value: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Unknown dtype code {}", code))]
    UnknownDtype { code: u8, backtrace: Backtrace },
    #[snafu(display(
        "Region `{}` at offset {} with length {} is out of range",
        region,
        offset,
        len
    ))]
    RegionOutOfRange {
        region: &'static str,
        offset: u64,
        len: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Index entry {} is not in ascending tag order", position))]
    IndexOrder { position: usize, backtrace: Backtrace },
    #[snafu(display(
        "Index entry for {} points at range {}+{} outside the metadata block of {} bytes",
        tag,
        offset,
        len,
        metadata_len
    ))]
    IndexOutOfRange {
        tag: Tag,
        offset: u64,
        len: u64,
        metadata_len: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Unknown index entry kind {} for {}", kind, tag))]
    UnknownEntryKind {
        tag: Tag,
        kind: u8,
        backtrace: Backtrace,
    },
    #[snafu(display("Pixel data index entry does not agree with the tensor flag"))]
    PixelEntryMismatch { backtrace: Backtrace },
    #[snafu(display("Unknown VR {:02X?} at offset {}", bytes, offset))]
    UnknownVr {
        bytes: [u8; 2],
        offset: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Unknown value kind {} for {} at offset {}", kind, tag, offset))]
    UnknownValueKind {
        tag: Tag,
        kind: u8,
        offset: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Attribute {} with VR {} cannot hold a {} value", tag, vr, value_type))]
    InadmissibleValue {
        tag: Tag,
        vr: VR,
        value_type: ValueType,
        backtrace: Backtrace,
    },
    #[snafu(display("Record truncated at offset {}: needed {} more bytes", offset, needed))]
    TruncatedRecord {
        offset: u64,
        needed: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Record at offset {} is {}, expected {}", offset, found, expected))]
    RecordMismatch {
        offset: u64,
        expected: String,
        found: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Invalid UTF-8 text in {} at offset {}", tag, offset))]
    InvalidText {
        tag: Tag,
        offset: u64,
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Sequence nesting deeper than {} at offset {}", max, offset))]
    NestingTooDeep {
        max: usize,
        offset: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Duplicate attribute {} in sequence item at offset {}", tag, offset))]
    DuplicateAttribute {
        tag: Tag,
        offset: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Tensor block prefix does not agree with the header"))]
    TensorPrefixMismatch { backtrace: Backtrace },
}

/// An error which may occur when loading from a container.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    #[snafu(display("Could not open container '{}'", filename.display()))]
    OpenFile {
        filename: PathBuf,
        backtrace: Backtrace,
        source: std::io::Error,
    },
    #[snafu(display("Could not read {} bytes at offset {} of '{}'", len, offset, filename.display()))]
    ReadFile {
        filename: PathBuf,
        offset: u64,
        len: u64,
        backtrace: Backtrace,
        source: std::io::Error,
    },
    #[snafu(display("Corrupt container '{}'", filename.display()))]
    CorruptContainer {
        filename: PathBuf,
        #[snafu(backtrace)]
        source: CorruptError,
    },
    #[snafu(display("Field {} not found", tag))]
    FieldNotFound { tag: Tag, backtrace: Backtrace },
    #[snafu(display(
        "Slice {}..{} is out of bounds for dimension {} of extent {}",
        start,
        end,
        dim,
        extent
    ))]
    SliceOutOfBounds {
        dim: usize,
        start: usize,
        end: usize,
        extent: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("Slice has {} dimensions but the tensor has {}", given, ndim))]
    SliceRank {
        given: usize,
        ndim: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not assemble the decoded pixel tensor"))]
    AssembleTensor {
        #[snafu(backtrace)]
        source: dimble_core::TensorError,
    },
    #[snafu(display("Could not place tensor on device {}", device))]
    Placement {
        device: Device,
        #[snafu(backtrace)]
        source: crate::device::PlacementError,
    },
}

impl LoadError {
    /// Whether this error comes from a structural problem in the container.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, LoadError::CorruptContainer { .. })
    }
}
