//! From DIMBLE containers back to the intermediate representation.

use crate::error::{
    AdaptSnafu, LoadSnafu, NoFileNameSnafu, OutputExistsSnafu, PersistOutputSnafu, Result,
    SerializeMetadataSnafu, SidecarSnafu, WriteOutputSnafu,
};
use dimble_container::{DimbleFile, SliceSpec};
use dimble_json::TensorSidecar;
use snafu::{ensure, OptionExt, ResultExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode every field of a container into DICOM JSON.
///
/// The tensor samples are not read:
/// the pixel data attribute becomes a `BulkDataURI`
/// describing the tensor from the container header.
pub fn export<P>(path: P) -> Result<serde_json::Value>
where
    P: AsRef<Path>,
{
    let file = DimbleFile::open(path).context(LoadSnafu)?;
    let set = file.read_metadata().context(LoadSnafu)?;
    dimble_json::to_source(&set, file.tensor_info()).context(AdaptSnafu)
}

/// Options for exporting a container to files.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct ExportOptions {
    output_dir: Option<PathBuf>,
    pixels: bool,
    overwrite: bool,
}

impl ExportOptions {
    pub fn new() -> Self {
        ExportOptions::default()
    }

    /// Write the exported files to this directory.
    ///
    /// By default, the directory of the container is used.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Also export the pixel tensor to a sidecar file,
    /// which the metadata then refers to.
    pub fn pixels(mut self, pixels: bool) -> Self {
        self.pixels = pixels;
        self
    }

    /// Replace exported files which already exist.
    ///
    /// By default, the export fails before writing anything
    /// if one of its files is already present.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Export a container to a DICOM JSON file named after it,
/// and optionally the pixel tensor to a `.safetensors` sidecar.
///
/// Each file is staged next to its destination and then moved in place.
/// Returns the path of the JSON file.
pub fn export_to_metadata_json<P>(container_path: P, options: &ExportOptions) -> Result<PathBuf>
where
    P: AsRef<Path>,
{
    let container_path = container_path.as_ref();
    let stem = container_path
        .file_stem()
        .context(NoFileNameSnafu {
            path: container_path,
        })?
        .to_string_lossy()
        .into_owned();
    let dir = match (&options.output_dir, container_path.parent()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        (None, _) => PathBuf::from("."),
    };

    let json_path = dir.join(format!("{}.json", stem));
    let sidecar_name = format!("{}.safetensors", stem);
    let sidecar_path = dir.join(&sidecar_name);

    let file = DimbleFile::open(container_path).context(LoadSnafu)?;
    let with_pixels = options.pixels && file.tensor_info().is_some();
    if !options.overwrite {
        ensure!(!json_path.exists(), OutputExistsSnafu { path: &json_path });
        ensure!(
            !with_pixels || !sidecar_path.exists(),
            OutputExistsSnafu {
                path: &sidecar_path
            }
        );
    }

    let set = file.read_metadata().context(LoadSnafu)?;
    let metadata = if with_pixels {
        let tensor = file.read_tensor(&SliceSpec::full()).context(LoadSnafu)?;
        let bytes = TensorSidecar::new(tensor).to_bytes().context(SidecarSnafu)?;
        write_output(&dir, &sidecar_path, &bytes, options.overwrite)?;
        debug!("Exported pixel tensor to {}", sidecar_path.display());
        dimble_json::to_source_with_uri(&set, &sidecar_name).context(AdaptSnafu)?
    } else {
        dimble_json::to_source(&set, file.tensor_info()).context(AdaptSnafu)?
    };

    let bytes = serde_json::to_vec_pretty(&metadata).context(SerializeMetadataSnafu)?;
    write_output(&dir, &json_path, &bytes, options.overwrite)?;
    debug!("Exported metadata to {}", json_path.display());
    Ok(json_path)
}

fn write_output(dir: &Path, path: &Path, bytes: &[u8], overwrite: bool) -> Result<()> {
    let mut staged = tempfile::Builder::new()
        .prefix(".dimble")
        .suffix(".tmp")
        .tempfile_in(dir)
        .context(WriteOutputSnafu { path })?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .context(WriteOutputSnafu { path })?;
    let persisted = if overwrite {
        staged.persist(path)
    } else {
        staged.persist_noclobber(path)
    };
    persisted.context(PersistOutputSnafu { path })?;
    Ok(())
}
