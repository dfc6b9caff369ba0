//! Reading from DIMBLE containers.
//!
//! Opening a container reads and validates the header and the field index.
//! Every other read goes straight to the bytes it needs,
//! through a file handle of its own.

use crate::codec::decode_record;
use crate::device::Tensor;
use crate::error::{
    AssembleTensorSnafu, CorruptContainerSnafu, CorruptError, FieldNotFoundSnafu, LoadError,
    OpenFileSnafu, PixelEntryMismatchSnafu, PlacementSnafu, ReadFileSnafu, RecordMismatchSnafu,
    TensorPrefixMismatchSnafu,
};
use crate::header::{tensor_prefix_len, tensor_prefix_matches, FileHeader, MAX_HEADER_LEN};
use crate::index::{EntryKind, FieldIndex, IndexEntry};
use crate::options::{FieldSelection, LoadOptions};
use crate::slice::{ReadPlan, SliceSpec};
use dimble_core::{tags, Attribute, AttributeSet, PixelTensor, Tag, TensorInfo};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type Result<T, E = LoadError> = std::result::Result<T, E>;

/// An open DIMBLE container.
///
/// Only the header and the field index are held in memory.
/// The handle can be shared between threads,
/// since each read opens the file anew.
#[derive(Debug, Clone)]
pub struct DimbleFile {
    path: PathBuf,
    header: FileHeader,
    index: FieldIndex,
}

impl DimbleFile {
    /// Open a container, reading its header and field index.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).context(OpenFileSnafu { filename: &path })?;
        let file_len = file
            .metadata()
            .context(OpenFileSnafu { filename: &path })?
            .len();

        let mut head = vec![0; file_len.min(MAX_HEADER_LEN) as usize];
        read_exact_at(&path, &mut file, 0, &mut head)?;
        let header = FileHeader::decode(&head, file_len)
            .and_then(|header| header.validate(file_len).map(|_| header))
            .context(CorruptContainerSnafu { filename: &path })?;

        let mut index_bytes = vec![0; header.index.len as usize];
        read_exact_at(&path, &mut file, header.index.offset, &mut index_bytes)?;
        let index = FieldIndex::decode(&index_bytes, header.index.offset, header.metadata.len)
            .and_then(|index| check_pixel_entry(&header, &index).map(|_| index))
            .context(CorruptContainerSnafu { filename: &path })?;

        debug!(
            "Opened {} with {} fields, tensor {:?}",
            path.display(),
            index.len(),
            header.tensor_info
        );

        Ok(DimbleFile {
            path,
            header,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The description of the pixel tensor, if the container has one.
    pub fn tensor_info(&self) -> Option<&TensorInfo> {
        self.header.tensor_info.as_ref()
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    /// The tags of all top-level fields, in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.index.tags()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.index.contains(tag)
    }

    /// Read and decode a single top-level attribute.
    pub fn read_attribute(&self, tag: Tag) -> Result<Attribute> {
        let entry = self.index.get(tag).context(FieldNotFoundSnafu { tag })?;
        let mut file = self.open_file()?;
        self.read_entry(&mut file, entry)
    }

    /// Read and decode all top-level attributes.
    ///
    /// The pixel data attribute comes out as a placeholder.
    pub fn read_metadata(&self) -> Result<AttributeSet> {
        let mut file = self.open_file()?;
        let mut block = vec![0; self.header.metadata.len as usize];
        read_exact_at(&self.path, &mut file, self.header.metadata.offset, &mut block)?;
        self.index
            .iter()
            .map(|entry| {
                let start = entry.offset as usize;
                let bytes = &block[start..start + entry.len as usize];
                self.decode_entry(entry, bytes)
            })
            .collect()
    }

    /// Read a region of the pixel tensor.
    pub fn read_tensor(&self, slice: &SliceSpec) -> Result<PixelTensor> {
        let mut file = self.open_file()?;
        self.read_tensor_from(&mut file, slice)
    }

    /// Load the fields selected by the options.
    ///
    /// Missing fields are recorded in [`LoadedFields::not_found`]
    /// while the other fields still load.
    /// Any other failure aborts the whole operation.
    pub fn load(&self, options: &LoadOptions) -> Result<LoadedFields> {
        let selected: Vec<Tag> = match &options.fields {
            FieldSelection::All => self.index.tags().collect(),
            FieldSelection::Only(tags) => tags.iter().copied().collect(),
        };
        let mut file = self.open_file()?;
        let mut loaded = LoadedFields::default();

        for tag in selected {
            if tag == tags::PIXEL_DATA && self.header.has_tensor() {
                let pixels = self.read_tensor_from(&mut file, &options.slice)?;
                let pixels = match options.dtype {
                    Some(dtype) if dtype != pixels.dtype() => {
                        debug!("Converting pixel tensor from {} to {}", pixels.dtype(), dtype);
                        pixels.convert(dtype)
                    }
                    _ => pixels,
                };
                let tensor = options
                    .placement_or_default()
                    .place(pixels, &options.device)
                    .context(PlacementSnafu {
                        device: options.device.clone(),
                    })?;
                loaded.fields.insert(tag, Field::Tensor(tensor));
                continue;
            }

            match self.index.get(tag) {
                Some(entry) => {
                    let attribute = self.read_entry(&mut file, entry)?;
                    loaded.fields.insert(tag, Field::Attribute(attribute));
                }
                None => {
                    warn!("Field {} not found in {}", tag, self.path.display());
                    loaded.not_found.push(tag);
                }
            }
        }

        Ok(loaded)
    }

    fn open_file(&self) -> Result<File> {
        File::open(&self.path).context(OpenFileSnafu {
            filename: &self.path,
        })
    }

    fn read_entry(&self, file: &mut File, entry: &IndexEntry) -> Result<Attribute> {
        let mut bytes = vec![0; entry.len as usize];
        read_exact_at(
            &self.path,
            file,
            self.header.metadata.offset + entry.offset,
            &mut bytes,
        )?;
        self.decode_entry(entry, &bytes)
    }

    fn decode_entry(&self, entry: &IndexEntry, bytes: &[u8]) -> Result<Attribute> {
        let offset = self.header.metadata.offset + entry.offset;
        decode_record(bytes, offset, entry.tag, entry.vr)
            .and_then(|attribute| {
                let kind = EntryKind::of(attribute.value());
                ensure!(
                    kind == entry.kind,
                    RecordMismatchSnafu {
                        offset,
                        expected: format!("{:?} record", entry.kind),
                        found: format!("{:?} record", kind),
                    }
                );
                Ok(attribute)
            })
            .context(CorruptContainerSnafu {
                filename: &self.path,
            })
    }

    fn read_tensor_from(&self, file: &mut File, slice: &SliceSpec) -> Result<PixelTensor> {
        let info = self.tensor_info().context(FieldNotFoundSnafu {
            tag: tags::PIXEL_DATA,
        })?;
        let ranges = slice.resolve(&info.shape)?;

        let mut prefix = vec![0; tensor_prefix_len(info.ndim()) as usize];
        read_exact_at(&self.path, file, self.header.tensor.offset, &mut prefix)?;
        if !tensor_prefix_matches(info, &prefix) {
            return TensorPrefixMismatchSnafu
                .fail()
                .context(CorruptContainerSnafu {
                    filename: &self.path,
                });
        }

        let base = self.header.tensor.offset + prefix.len() as u64;
        let plan = ReadPlan::new(info, &ranges);
        let samples = plan.execute(|offset, buffer| {
            read_exact_at(&self.path, &mut *file, base + offset, buffer)
        })?;
        PixelTensor::new(info.dtype, plan.shape, samples).context(AssembleTensorSnafu)
    }
}

/// The pixel data placeholder entry must be present exactly when
/// the container holds a tensor.
fn check_pixel_entry(header: &FileHeader, index: &FieldIndex) -> Result<(), CorruptError> {
    let placeholders: Vec<Tag> = index
        .iter()
        .filter(|e| e.kind == EntryKind::PixelPlaceholder)
        .map(|e| e.tag)
        .collect();
    let expected: &[Tag] = if header.has_tensor() {
        &[tags::PIXEL_DATA]
    } else {
        &[]
    };
    ensure!(placeholders == expected, PixelEntryMismatchSnafu);
    Ok(())
}

fn read_exact_at(path: &Path, file: &mut File, offset: u64, buffer: &mut [u8]) -> Result<()> {
    let len = buffer.len() as u64;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buffer))
        .context(ReadFileSnafu {
            filename: path,
            offset,
            len,
        })
}

/// A loaded field: an attribute or the pixel tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Attribute(Attribute),
    Tensor(Tensor),
}

impl Field {
    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Field::Attribute(attribute) => Some(attribute),
            Field::Tensor(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Field::Tensor(tensor) => Some(tensor),
            Field::Attribute(_) => None,
        }
    }
}

/// The outcome of a load: the fields found, by tag,
/// and the requested tags which were not found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedFields {
    fields: BTreeMap<Tag, Field>,
    not_found: Vec<Tag>,
}

impl LoadedFields {
    /// Fetch a loaded field.
    pub fn get(&self, tag: Tag) -> Result<&Field> {
        self.fields.get(&tag).context(FieldNotFoundSnafu { tag })
    }

    /// Fetch a loaded attribute, if present.
    pub fn attribute(&self, tag: Tag) -> Option<&Attribute> {
        self.fields.get(&tag).and_then(Field::as_attribute)
    }

    /// Fetch the loaded pixel tensor, if present.
    pub fn tensor(&self) -> Option<&Tensor> {
        self.fields.get(&tags::PIXEL_DATA).and_then(Field::as_tensor)
    }

    /// The requested tags which are not in the container.
    pub fn not_found(&self) -> &[Tag] {
        &self.not_found
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Field)> + '_ {
        self.fields.iter().map(|(tag, field)| (*tag, field))
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.fields.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Split into the loaded attributes and the pixel tensor.
    pub fn into_parts(self) -> (AttributeSet, Option<Tensor>) {
        let mut set = AttributeSet::new();
        let mut tensor = None;
        for (_, field) in self.fields {
            match field {
                Field::Attribute(attribute) => {
                    set.put(attribute);
                }
                Field::Tensor(t) => tensor = Some(t),
            }
        }
        (set, tensor)
    }
}
