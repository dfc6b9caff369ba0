//! The fixed-size container header.
//!
//! ```text
//! offset  size  field
//!      0     8  magic "DIMBLE\r\n"
//!      8     2  format version
//!     10     2  flags (bit 0: has tensor)
//!     12     4  field count
//!     16     4  total attribute count
//!     20     4  reserved
//!     24    16  index region (offset, length)
//!     40    16  metadata region (offset, length)
//!     56    16  tensor block region (offset, length)
//!     72     1  dtype code
//!     73     1  number of dimensions
//!     74     6  reserved
//!     80 8*ndim shape
//! ```

use crate::error::{
    BadMagicSnafu, CorruptError, InvalidHeaderSnafu, RegionOutOfRangeSnafu, TruncatedSnafu,
    UnknownDtypeSnafu, UnsupportedVersionSnafu,
};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use byteordered::ByteOrdered;
use dimble_core::{Dtype, TensorInfo};
use snafu::{ensure, OptionExt};
use std::io::Write;

/// The magic code at the start of every container.
pub const MAGIC: &[u8; 8] = b"DIMBLE\r\n";
/// The container format version written by this library.
pub const VERSION: u16 = 1;
/// The length of the header without the tensor shape.
pub const FIXED_HEADER_LEN: u64 = 80;
/// The maximum number of tensor dimensions.
pub const MAX_NDIM: usize = 16;
/// The alignment of the tensor block.
pub const TENSOR_ALIGNMENT: u64 = 64;
/// The longest possible header.
pub const MAX_HEADER_LEN: u64 = FIXED_HEADER_LEN + 8 * MAX_NDIM as u64;

const FLAG_HAS_TENSOR: u16 = 0x0001;

/// A byte range of the container.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Region {
    /// Absolute byte offset
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
}

impl Region {
    pub fn new(offset: u64, len: u64) -> Self {
        Region { offset, len }
    }

    /// The offset right past the region, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.len)
    }
}

/// The decoded container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version
    pub version: u16,
    /// Number of top-level attributes, one per index entry
    pub field_count: u32,
    /// Number of attributes including those nested in sequences
    pub attribute_count: u32,
    /// Location of the field index
    pub index: Region,
    /// Location of the metadata block
    pub metadata: Region,
    /// Location of the tensor block, empty if there is no tensor
    pub tensor: Region,
    /// Description of the pixel tensor, if any
    pub tensor_info: Option<TensorInfo>,
}

impl FileHeader {
    /// Whether the container holds a pixel tensor.
    pub fn has_tensor(&self) -> bool {
        self.tensor_info.is_some()
    }

    /// The encoded length of this header.
    pub fn len(&self) -> u64 {
        header_len(self.tensor_info.as_ref().map_or(0, TensorInfo::ndim))
    }

    /// Write the header in its binary form.
    pub fn write_to<W: Write>(&self, to: W) -> std::io::Result<()> {
        let mut to = ByteOrdered::le(to);
        let (code, shape) = match &self.tensor_info {
            Some(info) => (info.dtype.code(), info.shape.as_slice()),
            None => (0, &[][..]),
        };
        let flags = if self.has_tensor() { FLAG_HAS_TENSOR } else { 0 };

        to.write_all(MAGIC)?;
        to.write_u16(self.version)?;
        to.write_u16(flags)?;
        to.write_u32(self.field_count)?;
        to.write_u32(self.attribute_count)?;
        to.write_u32(0)?;
        for region in [self.index, self.metadata, self.tensor] {
            to.write_u64(region.offset)?;
            to.write_u64(region.len)?;
        }
        to.write_u8(code)?;
        to.write_u8(shape.len() as u8)?;
        to.write_all(&[0; 6])?;
        for &d in shape {
            to.write_u64(d as u64)?;
        }
        Ok(())
    }

    /// Decode a header from the first bytes of a container.
    ///
    /// `bytes` holds up to [`MAX_HEADER_LEN`] bytes from the start of a
    /// file of `file_len` bytes.
    /// Only the header itself is checked here,
    /// see [`FileHeader::validate`] for the region layout.
    pub fn decode(bytes: &[u8], file_len: u64) -> Result<Self, CorruptError> {
        ensure!(
            bytes.len() as u64 >= FIXED_HEADER_LEN,
            TruncatedSnafu {
                needed: FIXED_HEADER_LEN,
                file_len,
            }
        );

        let mut magic = [0; 8];
        magic.copy_from_slice(&bytes[0..8]);
        ensure!(&magic == MAGIC, BadMagicSnafu { found: magic });

        let version = LittleEndian::read_u16(&bytes[8..10]);
        ensure!(version == VERSION, UnsupportedVersionSnafu { version });

        let flags = LittleEndian::read_u16(&bytes[10..12]);
        ensure!(
            flags & !FLAG_HAS_TENSOR == 0,
            InvalidHeaderSnafu {
                field: "flags",
                value: u64::from(flags),
            }
        );

        let field_count = LittleEndian::read_u32(&bytes[12..16]);
        let attribute_count = LittleEndian::read_u32(&bytes[16..20]);
        ensure!(
            attribute_count >= field_count,
            InvalidHeaderSnafu {
                field: "attribute count",
                value: u64::from(attribute_count),
            }
        );

        let region_at = |at: usize| {
            Region::new(
                LittleEndian::read_u64(&bytes[at..at + 8]),
                LittleEndian::read_u64(&bytes[at + 8..at + 16]),
            )
        };
        let index = region_at(24);
        let metadata = region_at(40);
        let tensor = region_at(56);

        let code = bytes[72];
        let ndim = usize::from(bytes[73]);
        ensure!(
            ndim <= MAX_NDIM,
            InvalidHeaderSnafu {
                field: "ndim",
                value: ndim as u64,
            }
        );

        let tensor_info = if flags & FLAG_HAS_TENSOR != 0 {
            let dtype = Dtype::from_code(code).context(UnknownDtypeSnafu { code })?;
            let needed = header_len(ndim);
            ensure!(
                bytes.len() as u64 >= needed,
                TruncatedSnafu { needed, file_len }
            );
            let shape = bytes[FIXED_HEADER_LEN as usize..needed as usize]
                .chunks_exact(8)
                .map(|chunk| {
                    let d = LittleEndian::read_u64(chunk);
                    usize::try_from(d).ok().context(InvalidHeaderSnafu {
                        field: "shape",
                        value: d,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(TensorInfo::new(dtype, shape))
        } else {
            ensure!(
                code == 0 && ndim == 0 && tensor == Region::default(),
                InvalidHeaderSnafu {
                    field: "tensor block",
                    value: tensor.len,
                }
            );
            None
        };

        Ok(FileHeader {
            version,
            field_count,
            attribute_count,
            index,
            metadata,
            tensor,
            tensor_info,
        })
    }

    /// Check that the regions follow the header in order,
    /// have consistent lengths, and fit in a file of `file_len` bytes.
    pub fn validate(&self, file_len: u64) -> Result<(), CorruptError> {
        let header_len = self.len();
        ensure!(
            header_len <= file_len,
            TruncatedSnafu {
                needed: header_len,
                file_len,
            }
        );

        check_region("index", self.index, header_len, file_len)?;
        ensure!(
            self.index.len == u64::from(self.field_count) * crate::index::ENTRY_LEN as u64,
            InvalidHeaderSnafu {
                field: "index length",
                value: self.index.len,
            }
        );

        let index_end = self.index.offset + self.index.len;
        check_region("metadata", self.metadata, index_end, file_len)?;
        // a record needs at least 7 bytes, a nested attribute as many
        let min_metadata = u64::from(self.attribute_count) * 7;
        ensure!(
            self.metadata.len >= min_metadata,
            InvalidHeaderSnafu {
                field: "attribute count",
                value: u64::from(self.attribute_count),
            }
        );

        if let Some(info) = &self.tensor_info {
            let metadata_end = self.metadata.offset + self.metadata.len;
            ensure!(
                self.tensor.offset % TENSOR_ALIGNMENT == 0,
                RegionOutOfRangeSnafu {
                    region: "tensor",
                    offset: self.tensor.offset,
                    len: self.tensor.len,
                }
            );
            check_region("tensor", self.tensor, metadata_end, file_len)?;
            let expected = info
                .byte_len()
                .and_then(|n| (n as u64).checked_add(tensor_prefix_len(info.ndim())))
                .context(InvalidHeaderSnafu {
                    field: "shape",
                    value: info.ndim() as u64,
                })?;
            ensure!(
                self.tensor.len == expected,
                InvalidHeaderSnafu {
                    field: "tensor length",
                    value: self.tensor.len,
                }
            );
        }

        Ok(())
    }

    /// The region of the raw tensor samples, past the tensor block prefix.
    pub fn sample_region(&self) -> Option<Region> {
        let info = self.tensor_info.as_ref()?;
        let prefix = tensor_prefix_len(info.ndim());
        Some(Region::new(
            self.tensor.offset + prefix,
            self.tensor.len.saturating_sub(prefix),
        ))
    }
}

/// The header length for a tensor of `ndim` dimensions.
pub fn header_len(ndim: usize) -> u64 {
    FIXED_HEADER_LEN + 8 * ndim as u64
}

/// The length of the tensor block prefix for `ndim` dimensions.
pub fn tensor_prefix_len(ndim: usize) -> u64 {
    8 + 8 * ndim as u64
}

/// Round `offset` up to the tensor block alignment.
pub fn align_tensor_offset(offset: u64) -> u64 {
    offset.div_ceil(TENSOR_ALIGNMENT) * TENSOR_ALIGNMENT
}

/// Write the tensor block prefix, which repeats the tensor description.
pub fn write_tensor_prefix<W: Write>(info: &TensorInfo, to: W) -> std::io::Result<()> {
    let mut to = ByteOrdered::le(to);
    to.write_u8(info.dtype.code())?;
    to.write_u8(info.ndim() as u8)?;
    to.write_all(&[0; 6])?;
    for &d in &info.shape {
        to.write_u64(d as u64)?;
    }
    Ok(())
}

/// Whether a tensor block prefix agrees with the tensor description.
pub fn tensor_prefix_matches(info: &TensorInfo, prefix: &[u8]) -> bool {
    let mut expected = Vec::with_capacity(prefix.len());
    if write_tensor_prefix(info, &mut expected).is_err() {
        return false;
    }
    expected == prefix
}

fn check_region(
    name: &'static str,
    region: Region,
    expected_offset: u64,
    file_len: u64,
) -> Result<(), CorruptError> {
    ensure!(
        region.offset >= expected_offset,
        RegionOutOfRangeSnafu {
            region: name,
            offset: region.offset,
            len: region.len,
        }
    );
    let end = region.end().context(RegionOutOfRangeSnafu {
        region: name,
        offset: region.offset,
        len: region.len,
    })?;
    ensure!(
        end <= file_len,
        TruncatedSnafu {
            needed: end,
            file_len,
        }
    );
    Ok(())
}
