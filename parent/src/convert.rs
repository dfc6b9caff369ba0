//! From the intermediate representation to DIMBLE containers.

use crate::error::{
    AdaptSnafu, EncodeSnafu, ParseMetadataSnafu, ReadMetadataSnafu, Result, SidecarSnafu,
};
use dimble_container::WriteOptions;
use dimble_core::{tags, Attribute, AttributeSet, Dtype, PixelTensor};
use dimble_json::TensorSidecar;
use snafu::ResultExt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A builder type for converting DICOM JSON metadata
/// and a tensor sidecar into a container file.
///
/// # Example
///
/// ```no_run
/// # use dimble::EncodeOptions;
/// use dimble::core::Dtype;
/// EncodeOptions::new()
///     .pixel_dtype(Dtype::F32)
///     .convert("image.json", Some("image.safetensors".as_ref()), "image.dimble")?;
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct EncodeOptions {
    pixel_dtype: Option<Dtype>,
    staging_dir: Option<PathBuf>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        EncodeOptions::default()
    }

    /// Convert the pixel tensor to this dtype before encoding.
    pub fn pixel_dtype(mut self, dtype: Dtype) -> Self {
        self.pixel_dtype = Some(dtype);
        self
    }

    /// Set the directory where the container is staged before it is
    /// moved to its destination.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Read the metadata and the sidecar, then write a container.
    pub fn convert<P, O>(&self, metadata_path: P, tensor_path: Option<&Path>, output_path: O) -> Result<()>
    where
        P: AsRef<Path>,
        O: AsRef<Path>,
    {
        let (set, pixels) = read_source(metadata_path.as_ref(), tensor_path, self.pixel_dtype)?;
        let mut write = WriteOptions::new();
        if let Some(dir) = &self.staging_dir {
            write = write.staging_dir(dir);
        }
        write
            .write(output_path, &set, pixels.as_ref())
            .context(EncodeSnafu)
    }
}

/// Encode DICOM JSON metadata and an optional tensor sidecar
/// into the bytes of a container.
pub fn encode_dicom_like<P>(metadata_path: P, tensor_path: Option<&Path>) -> Result<Vec<u8>>
where
    P: AsRef<Path>,
{
    let (set, pixels) = read_source(metadata_path.as_ref(), tensor_path, None)?;
    dimble_container::encode_with(&set, pixels.as_ref()).context(EncodeSnafu)
}

/// Convert DICOM JSON metadata and an optional tensor sidecar
/// into a container file.
pub fn convert_to_dimble<P, O>(
    metadata_path: P,
    tensor_path: Option<&Path>,
    output_path: O,
    options: &EncodeOptions,
) -> Result<()>
where
    P: AsRef<Path>,
    O: AsRef<Path>,
{
    options.convert(metadata_path, tensor_path, output_path)
}

/// Read the intermediate representation into the data model.
pub fn read_source(
    metadata_path: &Path,
    tensor_path: Option<&Path>,
    pixel_dtype: Option<Dtype>,
) -> Result<(AttributeSet, Option<PixelTensor>)> {
    let file = File::open(metadata_path).context(ReadMetadataSnafu {
        path: metadata_path,
    })?;
    let raw: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .context(ParseMetadataSnafu {
            path: metadata_path,
        })?;

    let pixels = match tensor_path {
        Some(path) => {
            let sidecar = TensorSidecar::open(path).context(SidecarSnafu)?;
            for (key, value) in &sidecar.metadata {
                debug!("Sidecar metadata {}: {}", key, value);
            }
            let tensor = match pixel_dtype {
                Some(dtype) => sidecar.tensor.convert(dtype),
                None => sidecar.tensor,
            };
            Some(tensor)
        }
        None => None,
    };

    let (mut set, pixels) = dimble_json::from_source(raw, pixels).context(AdaptSnafu)?;
    if let (Some(dtype), Some(_)) = (pixel_dtype, &pixels) {
        // the stored placeholder may describe the samples before conversion
        let stale = set
            .get(tags::PIXEL_DATA)
            .map_or(false, |attribute| !dtype.admits_pixel_data_vr(attribute.vr()));
        if stale {
            let vr = dtype.pixel_data_vr();
            debug!("Replacing pixel data placeholder with VR {}", vr);
            set.put(Attribute::pixel_placeholder(vr));
        }
    }
    Ok((set, pixels))
}
