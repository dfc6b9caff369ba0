#![crate_type = "lib"]
#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]

//! This is the core library of DIMBLE containing the data model
//! shared by the adapter, the encoder and the loader.
//!
//! The current structure of this crate is as follows:
//!
//! - [`header`] comprises attribute tags and value representations,
//!   along with a few well known tags such as the pixel data tag.
//! - [`value`] holds primitive values, sequences
//!   and the pixel data placeholder.
//! - [`attribute`] has the attribute and the ordered attribute set.
//! - [`dtype`] lists the sample types of pixel tensors.
//! - [`tensor`] holds the pixel tensor and numeric sample conversion.

pub mod attribute;
pub mod dtype;
pub mod header;
pub mod tensor;
pub mod value;

pub use attribute::{AccessError, Attribute, AttributeSet};
pub use dtype::{Dtype, ParseDtypeError};
pub use header::{tags, Tag, VR};
pub use tensor::{Element, PixelTensor, TensorError, TensorInfo};
pub use value::{PrimitiveValue, Value, ValueType};

// re-export crates that are part of the public API
pub use half;
pub use ndarray;
pub use smallvec;
