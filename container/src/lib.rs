#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(missing_debug_implementations, unused_qualifications, unused_import_braces)]

//! The DIMBLE container: encoding and selective loading.
//!
//! A container holds the metadata of one image plus its pixel tensor:
//!
//! ```text
//! [header][field index][metadata block][padding][tensor block]
//! ```
//!
//! The field index maps every top-level tag to the byte range of its
//! record, so single fields are decoded without touching the rest of the
//! file, and the tensor block is read one region of interest at a time.
//!
//! - [`encode`] and [`WriteOptions`] produce containers.
//! - [`DimbleFile`] opens a container for reading,
//!   and [`LoadOptions`] loads a selection of fields,
//!   with the pixel tensor sliced, converted and placed on a device.
//!
//! # Example
//!
//! ```no_run
//! use dimble_container::{Device, LoadOptions, SliceSpec};
//! use dimble_core::{tags, Dtype};
//!
//! let loaded = LoadOptions::new()
//!     .fields([tags::PATIENT_ID, tags::PIXEL_DATA])
//!     .slice(SliceSpec::full().dim(0..1))
//!     .dtype(Dtype::F32)
//!     .device(Device::Cpu)
//!     .open("image.dimble")?;
//!
//! let patient_id = loaded.get(tags::PATIENT_ID)?;
//! let tensor = loaded.tensor();
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```

mod codec;
pub mod device;
pub mod encode;
pub mod error;
pub mod file;
pub mod header;
pub mod index;
pub mod options;
pub mod slice;

pub use crate::codec::MAX_DEPTH;
pub use crate::device::{Device, HostPlacement, ParseDeviceError, Placement, PlacementError, Tensor};
pub use crate::encode::{encode, encode_metadata_only, encode_with, WriteOptions};
pub use crate::error::{CorruptError, EncodeError, LoadError};
pub use crate::file::{DimbleFile, Field, LoadedFields};
pub use crate::header::FileHeader;
pub use crate::options::{FieldSelection, LoadOptions};
pub use crate::slice::{DimRange, ParseSliceError, ReadPlan, SliceSpec};

/// Open a container, reading its header and field index.
pub fn open_file<P>(path: P) -> Result<DimbleFile, LoadError>
where
    P: AsRef<std::path::Path>,
{
    DimbleFile::open(path)
}
