//! The container encoder.
//!
//! Every write is a full re-encode.
//! The layout is fully planned in memory before any byte reaches the
//! destination, so an invalid attribute set never produces a file.

use crate::codec::write_attribute;
use crate::error::{
    EncodeError, MissingTensorSnafu, PersistFileSnafu, PixelDataNotPlaceholderSnafu,
    PixelDataVrSnafu, StageFileSnafu, TensorRankSnafu, TooLargeSnafu, WriteSnafu,
};
use crate::header::{
    align_tensor_offset, header_len, tensor_prefix_len, write_tensor_prefix, FileHeader, Region,
    MAX_NDIM, VERSION,
};
use crate::index::{EntryKind, FieldIndex, IndexEntry, ENTRY_LEN};
use dimble_core::{tags, Attribute, AttributeSet, PixelTensor};
use snafu::{ensure, OptionExt, ResultExt};
use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// Encode an attribute set and its pixel tensor into a container.
///
/// When the set has no pixel data attribute,
/// a placeholder is inserted with a VR derived from the tensor dtype.
pub fn encode(set: &AttributeSet, pixels: &PixelTensor) -> Result<Vec<u8>> {
    encode_with(set, Some(pixels))
}

/// Encode an attribute set into a container without a pixel tensor.
pub fn encode_metadata_only(set: &AttributeSet) -> Result<Vec<u8>> {
    encode_with(set, None)
}

/// Encode an attribute set and an optional pixel tensor into a container.
pub fn encode_with(set: &AttributeSet, pixels: Option<&PixelTensor>) -> Result<Vec<u8>> {
    let layout = Layout::plan(set, pixels)?;
    let mut out = Vec::with_capacity(layout.total_len() as usize);
    layout.write_to(&mut out, pixels).context(WriteSnafu)?;
    Ok(out)
}

/// The complete layout of a container, short of the tensor samples.
#[derive(Debug)]
struct Layout {
    header: FileHeader,
    index: FieldIndex,
    metadata: Vec<u8>,
}

impl Layout {
    fn plan(set: &AttributeSet, pixels: Option<&PixelTensor>) -> Result<Self> {
        let set = with_pixel_placeholder(set, pixels)?;

        let tensor_info = pixels.map(|p| p.info().clone());
        let ndim = tensor_info.as_ref().map_or(0, |info| info.ndim());
        ensure!(ndim <= MAX_NDIM, TensorRankSnafu { ndim, max: MAX_NDIM });

        let mut metadata = Vec::new();
        let mut entries = Vec::with_capacity(set.len());
        for attribute in set.iter() {
            let offset = metadata.len() as u64;
            write_attribute(&mut metadata, attribute, 0)?;
            entries.push(IndexEntry {
                tag: attribute.tag(),
                vr: attribute.vr(),
                kind: EntryKind::of(attribute.value()),
                offset,
                len: metadata.len() as u64 - offset,
            });
        }

        let field_count = u32::try_from(entries.len())
            .ok()
            .with_context(|| TooLargeSnafu {
                what: "field count".to_string(),
            })?;
        let attribute_count = u32::try_from(set.total_count())
            .ok()
            .with_context(|| TooLargeSnafu {
                what: "attribute count".to_string(),
            })?;

        let index = Region::new(header_len(ndim), entries.len() as u64 * ENTRY_LEN as u64);
        let metadata_region = Region::new(index.offset + index.len, metadata.len() as u64);
        let tensor = match &tensor_info {
            Some(info) => Region::new(
                align_tensor_offset(metadata_region.offset + metadata_region.len),
                tensor_prefix_len(ndim) + pixels.map_or(0, |p| p.as_bytes().len() as u64),
            ),
            None => Region::default(),
        };

        debug!(
            "Encoding {} fields ({} attributes), {} metadata bytes, tensor {:?}",
            field_count,
            attribute_count,
            metadata.len(),
            tensor_info
        );

        Ok(Layout {
            header: FileHeader {
                version: VERSION,
                field_count,
                attribute_count,
                index,
                metadata: metadata_region,
                tensor,
                tensor_info,
            },
            index: FieldIndex::from_sorted(entries),
            metadata,
        })
    }

    fn total_len(&self) -> u64 {
        if self.header.has_tensor() {
            self.header.tensor.offset + self.header.tensor.len
        } else {
            self.header.metadata.offset + self.header.metadata.len
        }
    }

    fn write_to<W: Write>(&self, mut to: W, pixels: Option<&PixelTensor>) -> std::io::Result<()> {
        self.header.write_to(&mut to)?;
        self.index.write_to(&mut to)?;
        to.write_all(&self.metadata)?;
        if let (Some(info), Some(pixels)) = (&self.header.tensor_info, pixels) {
            let metadata_end = self.header.metadata.offset + self.header.metadata.len;
            let padding = (self.header.tensor.offset - metadata_end) as usize;
            to.write_all(&vec![0; padding])?;
            write_tensor_prefix(info, &mut to)?;
            to.write_all(pixels.as_bytes())?;
        }
        Ok(())
    }
}

/// Check the pixel data attribute against the tensor,
/// inserting a placeholder if a tensor is given without one.
fn with_pixel_placeholder<'a>(
    set: &'a AttributeSet,
    pixels: Option<&PixelTensor>,
) -> Result<Cow<'a, AttributeSet>> {
    match (set.get(tags::PIXEL_DATA), pixels) {
        (Some(attribute), Some(pixels)) => {
            ensure!(
                attribute.value().is_placeholder(),
                PixelDataNotPlaceholderSnafu
            );
            let (vr, dtype) = (attribute.vr(), pixels.dtype());
            ensure!(
                dtype.admits_pixel_data_vr(vr),
                PixelDataVrSnafu { vr, dtype }
            );
            Ok(Cow::Borrowed(set))
        }
        (Some(_), None) => MissingTensorSnafu.fail(),
        (None, Some(pixels)) => {
            let vr = pixels.dtype().pixel_data_vr();
            debug!("Inserting pixel data placeholder with VR {}", vr);
            let mut set = set.clone();
            set.put(Attribute::pixel_placeholder(vr));
            Ok(Cow::Owned(set))
        }
        (None, None) => Ok(Cow::Borrowed(set)),
    }
}

/// A builder type for writing a container to a file.
///
/// The container is first written to a temporary file
/// in the staging directory, then moved to its destination,
/// so that the destination either holds the complete container
/// or is left untouched.
///
/// # Example
///
/// ```no_run
/// # use dimble_container::WriteOptions;
/// # use dimble_core::{AttributeSet, PixelTensor};
/// # let set = AttributeSet::new();
/// let pixels = PixelTensor::from_vec(vec![2, 2], vec![0u16, 1, 2, 3])?;
/// WriteOptions::new()
///     .staging_dir("/scratch")
///     .write("out/image.dimble", &set, Some(&pixels))?;
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct WriteOptions {
    staging_dir: Option<PathBuf>,
}

impl WriteOptions {
    pub fn new() -> Self {
        WriteOptions::default()
    }

    /// Set the directory of the temporary file.
    ///
    /// It must be on the same file system as the destination.
    /// By default, the directory of the destination is used.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Encode and write a container to the given path,
    /// replacing any file already there.
    pub fn write<P>(
        &self,
        path: P,
        set: &AttributeSet,
        pixels: Option<&PixelTensor>,
    ) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let layout = Layout::plan(set, pixels)?;

        let dir = match (&self.staging_dir, path.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            (None, _) => PathBuf::from("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".dimble")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .context(StageFileSnafu { dir: &dir })?;

        {
            let mut to = BufWriter::new(staged.as_file_mut());
            layout.write_to(&mut to, pixels).context(WriteSnafu)?;
            to.flush().context(WriteSnafu)?;
        }
        staged.as_file().sync_all().context(WriteSnafu)?;

        staged.persist(path).context(PersistFileSnafu { path })?;
        debug!("Wrote {} bytes to {}", layout.total_len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MAX_HEADER_LEN;
    use dimble_core::{Dtype, PrimitiveValue, VR};
    use pretty_assertions::assert_eq;

    fn set() -> AttributeSet {
        AttributeSet::from_iter([
            Attribute::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P-01")),
            Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
        ])
    }

    fn header_of(bytes: &[u8]) -> FileHeader {
        let len = bytes.len().min(MAX_HEADER_LEN as usize);
        let header = FileHeader::decode(&bytes[..len], bytes.len() as u64).unwrap();
        header.validate(bytes.len() as u64).unwrap();
        header
    }

    #[test]
    fn layout_of_container_with_tensor() {
        let pixels = PixelTensor::from_vec(vec![2, 3], vec![1u16, 2, 3, 4, 5, 6]).unwrap();
        let bytes = encode(&set(), &pixels).unwrap();
        let header = header_of(&bytes);

        assert_eq!(header.field_count, 3);
        assert_eq!(header.attribute_count, 3);
        assert_eq!(header.index.offset, 96);
        assert_eq!(header.index.len, 72);
        assert_eq!(header.metadata.offset, 168);
        assert_eq!(header.tensor.offset % 64, 0);
        assert_eq!(header.tensor_info, Some(pixels.info().clone()));
        assert_eq!(bytes.len() as u64, header.tensor.offset + header.tensor.len);
        assert_eq!(&bytes[bytes.len() - 12..], pixels.as_bytes());
    }

    #[test]
    fn metadata_only_container() {
        let bytes = encode_metadata_only(&set()).unwrap();
        let header = header_of(&bytes);
        assert!(!header.has_tensor());
        assert_eq!(header.tensor, Region::default());
        assert_eq!(bytes.len() as u64, header.metadata.offset + header.metadata.len);
    }

    #[test]
    fn empty_set_is_legal() {
        let bytes = encode_metadata_only(&AttributeSet::new()).unwrap();
        let header = header_of(&bytes);
        assert_eq!(header.field_count, 0);
        assert_eq!(bytes.len(), 80);
    }

    #[test]
    fn pixel_data_rules() {
        let pixels = PixelTensor::from_vec(vec![1], vec![1.5f64]).unwrap();

        let mut with_placeholder = set();
        with_placeholder.put(Attribute::pixel_placeholder(VR::OD));
        assert!(encode(&with_placeholder, &pixels).is_ok());
        assert!(matches!(
            encode_metadata_only(&with_placeholder),
            Err(EncodeError::MissingTensor { .. })
        ));

        let mut inline = set();
        inline.put(Attribute::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(&[0u8, 1][..]),
        ));
        assert!(matches!(
            encode(&inline, &pixels),
            Err(EncodeError::PixelDataNotPlaceholder { .. })
        ));
    }

    #[test]
    fn placeholder_vr_must_fit_dtype() {
        let mut byte_placeholder = set();
        byte_placeholder.put(Attribute::pixel_placeholder(VR::OB));
        let doubles = PixelTensor::from_vec(vec![1], vec![1.5f64]).unwrap();
        assert!(matches!(
            encode(&byte_placeholder, &doubles),
            Err(EncodeError::PixelDataVr {
                vr: VR::OB,
                dtype: Dtype::F64,
                ..
            })
        ));

        let words = PixelTensor::from_vec(vec![2], vec![1u16, 2]).unwrap();
        assert!(encode(&byte_placeholder, &words).is_ok());

        let mut word_placeholder = set();
        word_placeholder.put(Attribute::pixel_placeholder(VR::OW));
        let bytes = PixelTensor::from_vec(vec![2], vec![1u8, 2]).unwrap();
        assert!(encode(&word_placeholder, &bytes).is_ok());

        let floats = PixelTensor::from_vec(vec![1], vec![0.5f32]).unwrap();
        assert!(matches!(
            encode(&word_placeholder, &floats),
            Err(EncodeError::PixelDataVr { vr: VR::OW, dtype: Dtype::F32, .. })
        ));
    }

    #[test]
    fn inserted_placeholder_follows_dtype() {
        let pixels = PixelTensor::from_vec(vec![2], vec![1i8, -1]).unwrap();
        let layout = Layout::plan(&set(), Some(&pixels)).unwrap();
        let entry = layout.index.get(tags::PIXEL_DATA).unwrap();
        assert_eq!(entry.vr, VR::OB);
        assert_eq!(entry.kind, EntryKind::PixelPlaceholder);
        assert_eq!(pixels.dtype(), Dtype::I8);
    }

    #[test]
    fn reject_high_rank_tensor() {
        let pixels = PixelTensor::new(Dtype::U8, vec![1; 17], vec![7]).unwrap();
        assert!(matches!(
            encode(&set(), &pixels),
            Err(EncodeError::TensorRank { ndim: 17, .. })
        ));
    }

    #[test]
    fn write_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.dimble");
        std::fs::write(&path, b"old").unwrap();

        WriteOptions::new().write(&path, &set(), None).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, encode_metadata_only(&set()).unwrap());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("image.dimble")]);
    }

    #[test]
    fn failed_encode_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.dimble");
        let mut bad = set();
        bad.put(Attribute::new(tags::ROWS, VR::US, PrimitiveValue::from("512")));

        let err = WriteOptions::new()
            .staging_dir(dir.path())
            .write(&path, &bad, None)
            .unwrap_err();
        assert!(matches!(err, EncodeError::IncompatibleValue { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
