//! DICOM JSON and tensor sidecar adapter
//!
//! This library converts the intermediate representation of an image,
//! DICOM JSON metadata plus a tensor sidecar holding the `pixel_array`,
//! into the DIMBLE data model and back.
//!
//! - Metadata is read and written as DICOM JSON,
//!   as per the [DICOM standard part 18 chapter F][1],
//!   through the [`DicomJson`] wrapper.
//! - The [`adapter`] module binds metadata and pixel tensor together,
//!   substituting the pixel data attribute with a placeholder.
//! - The [`sidecar`] module reads and writes tensor sidecar files
//!   in the safetensors layout.
//!
//! [1]: https://dicom.nema.org/medical/dicom/current/output/chtml/part18/chapter_F.html
//!
//! # Example
//!
//! ```rust
//! # use dimble_core::{tags, Attribute, AttributeSet, PrimitiveValue, VR};
//! let set = AttributeSet::from_iter([
//!     Attribute::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20230610")),
//!     Attribute::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from("5")),
//! ]);
//!
//! let json = dimble_json::to_string(&set)?;
//!
//! assert_eq!(
//!     json,
//!     r#"{"00080020":{"vr":"DA","Value":["20230610"]},"00200013":{"vr":"IS","Value":[5]}}"#
//! );
//!
//! let back: AttributeSet = dimble_json::from_str(&json)?;
//! assert_eq!(back, set);
//! Ok::<(), serde_json::Error>(())
//! ```

pub mod adapter;
mod de;
mod ser;
pub mod sidecar;

pub use crate::adapter::{from_source, pixel_array_uri, to_source, to_source_with_uri, AdapterError};
pub use crate::de::{from_reader, from_slice, from_str, from_value};
pub use crate::ser::{to_string, to_string_pretty, to_value, to_vec, to_writer, PIXEL_ARRAY_URI};
pub use crate::sidecar::{SidecarError, TensorSidecar};

/// The textual form of a non-number in DICOM JSON.
const NAN: &str = "NaN";
/// The textual form of positive infinity in DICOM JSON.
const INFINITY: &str = "inf";
/// The textual form of negative infinity in DICOM JSON.
const NEG_INFINITY: &str = "-inf";

/// A wrapper type for DIMBLE data types
/// which are serialized from and to DICOM JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomJson<T>(T);

impl<T> DicomJson<T> {
    /// Unwrap the DICOM JSON wrapper,
    /// returning the underlying value.
    pub fn into_inner(self) -> T {
        self.0
    }

    /// Obtain a reference to the underlying value.
    pub fn inner(&self) -> &T {
        &self.0
    }
}
