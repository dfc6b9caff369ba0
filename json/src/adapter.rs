//! Conversion between the intermediate representation
//! (DICOM JSON metadata plus a pixel tensor)
//! and the DIMBLE data model.
//!
//! The pixel data attribute never carries samples in the data model:
//! [`from_source`] replaces it with a placeholder,
//! and [`to_source`] turns the placeholder into a `BulkDataURI`
//! which refers to the tensor.

use dimble_core::{tags, Attribute, AttributeSet, PixelTensor, TensorInfo, ValueType, VR};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use tracing::debug;

/// An error converting between the intermediate representation
/// and the data model.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum AdapterError {
    #[snafu(display("Invalid DICOM JSON metadata"))]
    ParseMetadata {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not produce DICOM JSON metadata"))]
    SerializeMetadata {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Metadata holds pixel data but no pixel tensor was given"))]
    PixelDataWithoutTensor { backtrace: Backtrace },
    #[snafu(display("Pixel data cannot have value representation {}", vr))]
    PixelDataVr { vr: VR, backtrace: Backtrace },
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;

/// The bulk data URI describing a tensor held by a DIMBLE container,
/// such as `dimble:pixel_array?dtype=uint16&shape=2,3`.
pub fn pixel_array_uri(info: &TensorInfo) -> String {
    let shape = info
        .shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}?dtype={}&shape={}", crate::ser::PIXEL_ARRAY_URI, info.dtype, shape)
}

/// Bind DICOM JSON metadata and an optional pixel tensor
/// into an attribute set.
///
/// The pixel data attribute, if present, is replaced with a placeholder
/// keeping its value representation. When a tensor is given but the
/// metadata has no pixel data attribute, a placeholder is inserted with
/// a value representation derived from the tensor dtype.
/// The tensor itself is passed through unchanged.
pub fn from_source(
    raw_metadata: serde_json::Value,
    pixel_array: Option<PixelTensor>,
) -> Result<(AttributeSet, Option<PixelTensor>)> {
    let mut set: AttributeSet = crate::from_value(raw_metadata).context(ParseMetadataSnafu)?;

    match (set.take(tags::PIXEL_DATA), &pixel_array) {
        (Some(_), None) => return PixelDataWithoutTensorSnafu.fail(),
        (Some(pixel_data), Some(_)) => {
            let vr = pixel_data.vr();
            ensure!(
                ValueType::PixelPlaceholder.admitted_by(vr),
                PixelDataVrSnafu { vr }
            );
            set.put(Attribute::pixel_placeholder(vr));
        }
        (None, Some(tensor)) => {
            let vr = tensor.dtype().pixel_data_vr();
            debug!("Inserting pixel data placeholder with VR {}", vr);
            set.put(Attribute::pixel_placeholder(vr));
        }
        (None, None) => {}
    }

    Ok((set, pixel_array))
}

/// Express an attribute set as DICOM JSON metadata.
///
/// The pixel data placeholder becomes a `BulkDataURI`
/// describing the given tensor.
pub fn to_source(set: &AttributeSet, tensor: Option<&TensorInfo>) -> Result<serde_json::Value> {
    let uri = match tensor {
        Some(info) => pixel_array_uri(info),
        None => crate::ser::PIXEL_ARRAY_URI.to_string(),
    };
    to_source_with_uri(set, &uri)
}

/// Express an attribute set as DICOM JSON metadata,
/// with the pixel data placeholder pointing at the given URI,
/// typically the file name of an exported tensor sidecar.
pub fn to_source_with_uri(set: &AttributeSet, uri: &str) -> Result<serde_json::Value> {
    crate::ser::to_value_with_pixel_uri(set, uri).context(SerializeMetadataSnafu)
}
