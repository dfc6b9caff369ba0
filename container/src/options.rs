use crate::device::{Device, HostPlacement, Placement};
use crate::file::{DimbleFile, LoadedFields};
use crate::slice::SliceSpec;
use crate::LoadError;
use dimble_core::{Dtype, Tag};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Which top-level fields to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// Every field, the pixel tensor included
    #[default]
    All,
    /// Only the listed fields, read in ascending tag order
    Only(BTreeSet<Tag>),
}

/// A builder type for loading fields from a DIMBLE container.
///
/// # Example
///
/// Create a `LoadOptions`,
/// call adaptor methods in a chain,
/// and finish the operation with [`.open()`](LoadOptions::open).
///
/// ```no_run
/// # use dimble_container::LoadOptions;
/// use dimble_core::{tags, Dtype};
/// let loaded = LoadOptions::new()
///     .field(tags::MODALITY)
///     .field(tags::PIXEL_DATA)
///     .slice("0:2".parse()?)
///     .dtype(Dtype::F32)
///     .open("path/to/image.dimble")?;
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct LoadOptions {
    pub(crate) fields: FieldSelection,
    pub(crate) slice: SliceSpec,
    pub(crate) dtype: Option<Dtype>,
    pub(crate) device: Device,
    pub(crate) placement: Option<Arc<dyn Placement>>,
}

impl LoadOptions {
    pub fn new() -> Self {
        LoadOptions::default()
    }

    /// Add a field to load.
    ///
    /// Once a field is named, only the named fields are loaded.
    pub fn field(mut self, tag: impl Into<Tag>) -> Self {
        let tag = tag.into();
        match &mut self.fields {
            FieldSelection::Only(tags) => {
                tags.insert(tag);
            }
            FieldSelection::All => self.fields = FieldSelection::Only(BTreeSet::from([tag])),
        }
        self
    }

    /// Add several fields to load.
    pub fn fields<I>(self, tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Tag>,
    {
        tags.into_iter().fold(self, |options, tag| options.field(tag))
    }

    /// Load every field of the container.
    ///
    /// This is the default behavior.
    pub fn all_fields(mut self) -> Self {
        self.fields = FieldSelection::All;
        self
    }

    /// Set the region of the pixel tensor to decode.
    pub fn slice(mut self, slice: SliceSpec) -> Self {
        self.slice = slice;
        self
    }

    /// Convert the pixel tensor to this dtype after decoding.
    pub fn dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Keep the dtype stored in the container.
    ///
    /// This is the default behavior.
    pub fn stored_dtype(mut self) -> Self {
        self.dtype = None;
        self
    }

    /// Set the device to place the pixel tensor on.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Set the placement policy moving the tensor onto its device.
    ///
    /// [`HostPlacement`] is used by default.
    pub fn placement<P>(mut self, placement: P) -> Self
    where
        P: Placement + 'static,
    {
        self.placement = Some(Arc::new(placement));
        self
    }

    pub fn selection(&self) -> &FieldSelection {
        &self.fields
    }

    pub(crate) fn placement_or_default(&self) -> &dyn Placement {
        match &self.placement {
            Some(placement) => placement.as_ref(),
            None => &HostPlacement,
        }
    }

    /// Open the container at the given path and load the selected fields.
    pub fn open<P>(&self, path: P) -> Result<LoadedFields, LoadError>
    where
        P: AsRef<Path>,
    {
        DimbleFile::open(path)?.load(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimble_core::tags;

    #[test]
    fn field_selection() {
        let options = LoadOptions::new();
        assert_eq!(options.selection(), &FieldSelection::All);

        let options = options
            .field(tags::PATIENT_ID)
            .fields([tags::MODALITY, tags::PATIENT_ID, tags::MODALITY]);
        assert_eq!(
            options.selection(),
            &FieldSelection::Only(BTreeSet::from([tags::MODALITY, tags::PATIENT_ID]))
        );

        let options = options.all_fields();
        assert_eq!(options.selection(), &FieldSelection::All);
    }

    #[test]
    fn many_fields_are_deduplicated() {
        let tags: Vec<Tag> = (0..10_000u32).map(|i| Tag(0x0009, (i % 5_000) as u16)).collect();
        let options = LoadOptions::new().fields(tags.iter().rev().copied());
        match options.selection() {
            FieldSelection::Only(selected) => {
                assert_eq!(selected.len(), 5_000);
                assert_eq!(selected.iter().next(), Some(&Tag(0x0009, 0)));
                assert_eq!(selected.iter().last(), Some(&Tag(0x0009, 4_999)));
            }
            FieldSelection::All => panic!("expected a field list"),
        }
    }
}
