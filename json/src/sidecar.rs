//! Tensor sidecar files.
//!
//! A sidecar holds the pixel tensor of an image next to its DICOM JSON
//! metadata, in the safetensors layout:
//! an unsigned 64-bit little endian header length,
//! a JSON header describing the tensors,
//! and the raw sample bytes.
//!
//! ```json
//! {
//!   "__metadata__": { "mymeta": "value" },
//!   "pixel_array": { "dtype": "U16", "shape": [2, 3], "data_offsets": [0, 12] }
//! }
//! ```
//!
//! Only the tensor named `pixel_array` is read.

use byteordered::byteorder::{ByteOrder, LittleEndian};
use byteordered::ByteOrdered;
use dimble_core::{Dtype, ParseDtypeError, PixelTensor, TensorError};
use serde::{Deserialize, Serialize};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The name of the pixel tensor in a sidecar.
pub const PIXEL_ARRAY: &str = "pixel_array";

const METADATA_KEY: &str = "__metadata__";

/// Upper bound of a sidecar JSON header.
const MAX_HEADER_LEN: u64 = 100_000_000;

/// An error reading or writing a tensor sidecar.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum SidecarError {
    #[snafu(display("Could not read sidecar file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write sidecar file {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Sidecar is truncated: needed {} bytes, found {}", needed, actual))]
    Truncated {
        needed: u64,
        actual: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Sidecar header of {} bytes is too large", len))]
    HeaderTooLarge { len: u64, backtrace: Backtrace },
    #[snafu(display("Invalid sidecar header"))]
    InvalidHeader {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Sidecar has no `{}` tensor", PIXEL_ARRAY))]
    MissingPixelArray { backtrace: Backtrace },
    #[snafu(display("Sidecar tensor has an unusable dtype"))]
    Dtype {
        source: ParseDtypeError,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "Sidecar data offsets [{}, {}] do not fit the {} data bytes",
        begin,
        end,
        data_len
    ))]
    DataOffsets {
        begin: u64,
        end: u64,
        data_len: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Sidecar tensor is inconsistent"))]
    Tensor {
        #[snafu(backtrace)]
        source: TensorError,
    },
    #[snafu(display("Could not serialize sidecar header"))]
    SerializeHeader {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = SidecarError> = std::result::Result<T, E>;

#[derive(Debug, Serialize, Deserialize)]
struct TensorEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [u64; 2],
}

/// The contents of a tensor sidecar:
/// the pixel tensor and the named string metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSidecar {
    /// The `pixel_array` tensor
    pub tensor: PixelTensor,
    /// Free form `__metadata__` entries
    pub metadata: BTreeMap<String, String>,
}

impl TensorSidecar {
    /// Create a sidecar with no metadata.
    pub fn new(tensor: PixelTensor) -> Self {
        TensorSidecar {
            tensor,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a sidecar file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(ReadFileSnafu { path })?;
        Self::from_bytes(&bytes)
    }

    /// Parse a sidecar from its bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let actual = bytes.len() as u64;
        let header_len = ByteOrdered::le(bytes)
            .read_u64()
            .ok()
            .context(TruncatedSnafu { needed: 8u64, actual })?;
        ensure!(
            header_len <= MAX_HEADER_LEN,
            HeaderTooLargeSnafu { len: header_len }
        );
        let data_start = 8 + header_len;
        ensure!(
            actual >= data_start,
            TruncatedSnafu {
                needed: data_start,
                actual
            }
        );
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..data_start as usize]).context(InvalidHeaderSnafu)?;
        let data = &bytes[data_start as usize..];

        let mut metadata = BTreeMap::new();
        let mut pixel_array = None;
        for (name, value) in header {
            match name.as_str() {
                METADATA_KEY => {
                    let entries: serde_json::Map<String, serde_json::Value> =
                        serde_json::from_value(value).context(InvalidHeaderSnafu)?;
                    for (key, value) in entries {
                        match value {
                            serde_json::Value::String(s) => {
                                metadata.insert(key, s);
                            }
                            other => {
                                warn!("Dropping non-string sidecar metadata entry `{}`: {}", key, other)
                            }
                        }
                    }
                }
                PIXEL_ARRAY => {
                    let entry: TensorEntry =
                        serde_json::from_value(value).context(InvalidHeaderSnafu)?;
                    pixel_array = Some(entry);
                }
                other => warn!("Ignoring sidecar tensor `{}`", other),
            }
        }

        let entry = pixel_array.context(MissingPixelArraySnafu)?;
        let dtype: Dtype = entry.dtype.parse().context(DtypeSnafu)?;
        let [begin, end] = entry.data_offsets;
        let data_len = data.len() as u64;
        ensure!(
            begin <= end && end <= data_len,
            DataOffsetsSnafu {
                begin,
                end,
                data_len
            }
        );
        let samples = data[begin as usize..end as usize].to_vec();
        let tensor = PixelTensor::new(dtype, entry.shape, samples).context(TensorSnafu)?;
        Ok(TensorSidecar { tensor, metadata })
    }

    /// Serialize the sidecar into its bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header.insert(
                METADATA_KEY.to_string(),
                serde_json::to_value(&self.metadata).context(SerializeHeaderSnafu)?,
            );
        }
        let entry = TensorEntry {
            dtype: self.tensor.dtype().short_name().to_string(),
            shape: self.tensor.shape().to_vec(),
            data_offsets: [0, self.tensor.as_bytes().len() as u64],
        };
        header.insert(
            PIXEL_ARRAY.to_string(),
            serde_json::to_value(&entry).context(SerializeHeaderSnafu)?,
        );
        let mut header = serde_json::to_vec(&header).context(SerializeHeaderSnafu)?;
        // align the sample bytes to 8 bytes
        while header.len() % 8 != 0 {
            header.push(b' ');
        }

        let mut out = Vec::with_capacity(8 + header.len() + self.tensor.as_bytes().len());
        let mut prefix = [0u8; 8];
        LittleEndian::write_u64(&mut prefix, header.len() as u64);
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&header);
        out.extend_from_slice(self.tensor.as_bytes());
        Ok(out)
    }

    /// Write the sidecar to a file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).context(WriteFileSnafu { path })
    }
}
