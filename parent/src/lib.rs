//! # DIMBLE
//!
//! This crate serves as a parent for the library crates of the DIMBLE
//! project, a container format for medical image metadata plus one pixel
//! tensor, built for selective field loading and region of interest
//! decoding.
//!
//! It aggregates the key modules,
//! which are also available as crates with the `dimble-` prefix,
//! and provides the file-level operations
//! between the intermediate representation
//! (a DICOM JSON file plus a tensor sidecar)
//! and containers.
//!
//! - The [`core`] crate has the data model:
//!   tags ([`Tag`](dimble_core::Tag)),
//!   value representations ([`VR`](dimble_core::VR)),
//!   attributes, attribute sets and pixel tensors.
//!   For convenience, the [`dimble_value!`] macro
//!   has been re-exported here as well.
//! - [`json`] converts between DICOM JSON and the data model,
//!   and reads and writes tensor sidecars.
//! - [`container`] encodes containers and loads fields from them.
//!
//! ## File-level operations
//!
//! - [`encode_dicom_like`] and [`convert_to_dimble`]
//!   turn the intermediate representation into a container.
//! - [`load`] fetches a selection of fields.
//! - [`export`] and [`export_to_metadata_json`]
//!   turn a container back into the intermediate representation.
//!
//! ```no_run
//! use std::path::Path;
//!
//! dimble::convert_to_dimble(
//!     "image.json",
//!     Some(Path::new("image.safetensors")),
//!     "image.dimble",
//!     &dimble::EncodeOptions::new(),
//! )?;
//!
//! let loaded = dimble::load("image.dimble", &["00100020", "7FE00010"], "cpu", Some("0:1"))?;
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```

mod convert;
mod error;
mod export;
mod load;

pub use dimble_container as container;
pub use dimble_core as core;
pub use dimble_json as json;

pub use crate::convert::{convert_to_dimble, encode_dicom_like, read_source, EncodeOptions};
pub use crate::error::{Error, Result};
pub use crate::export::{export, export_to_metadata_json, ExportOptions};
pub use crate::load::{load, load_as};

// re-export dimble_value macro
pub use dimble_core::dimble_value;
