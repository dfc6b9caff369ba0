use dimble_container::{EncodeError, LoadError, ParseDeviceError, ParseSliceError};
use dimble_core::header::ParseTagError;
use dimble_core::ParseDtypeError;
use dimble_json::{AdapterError, SidecarError};
use snafu::{Backtrace, Snafu};
use std::path::PathBuf;

/// An error of a file-level DIMBLE operation.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Could not read metadata file '{}'", path.display()))]
    ReadMetadata {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Metadata file '{}' is not valid JSON", path.display()))]
    ParseMetadata {
        path: PathBuf,
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write output file '{}'", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not move output file to '{}'", path.display()))]
    PersistOutput {
        path: PathBuf,
        source: tempfile::PersistError,
        backtrace: Backtrace,
    },
    #[snafu(display("Output file '{}' already exists", path.display()))]
    OutputExists { path: PathBuf, backtrace: Backtrace },
    #[snafu(display("Could not serialize metadata"))]
    SerializeMetadata {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not adapt DICOM JSON metadata"))]
    Adapt {
        #[snafu(backtrace)]
        source: AdapterError,
    },
    #[snafu(display("Could not process tensor sidecar"))]
    Sidecar {
        #[snafu(backtrace)]
        source: SidecarError,
    },
    #[snafu(display("Could not encode container"))]
    Encode {
        #[snafu(backtrace)]
        source: EncodeError,
    },
    #[snafu(display("Could not load from container"))]
    Load {
        #[snafu(backtrace)]
        source: LoadError,
    },
    #[snafu(display("Invalid field tag `{}`", text))]
    ParseTag {
        text: String,
        source: ParseTagError,
        backtrace: Backtrace,
    },
    #[snafu(display("Invalid device"))]
    ParseDevice {
        source: ParseDeviceError,
        backtrace: Backtrace,
    },
    #[snafu(display("Invalid slice"))]
    ParseSlice {
        source: ParseSliceError,
        backtrace: Backtrace,
    },
    #[snafu(display("Unsupported dtype"))]
    UnsupportedDtype {
        source: ParseDtypeError,
        backtrace: Backtrace,
    },
    #[snafu(display("Container path '{}' has no file name", path.display()))]
    NoFileName { path: PathBuf, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
