//! Attributes and ordered attribute sets.

use crate::header::{Tag, VR};
use crate::value::{PrimitiveValue, Value};
use snafu::{Backtrace, OptionExt, Snafu};
use std::collections::{btree_map, BTreeMap};

/// An error which may occur when looking up an attribute.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum AccessError {
    #[snafu(display("No such attribute with tag {}", tag))]
    NoSuchAttribute { tag: Tag, backtrace: Backtrace },
}

/// A single attribute: its tag, value representation and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    tag: Tag,
    vr: VR,
    value: Value,
}

impl Attribute {
    /// Create an attribute from its parts.
    pub fn new(tag: impl Into<Tag>, vr: VR, value: impl Into<Value>) -> Self {
        Attribute {
            tag: tag.into(),
            vr,
            value: value.into(),
        }
    }

    /// Create an attribute with no value.
    pub fn empty(tag: impl Into<Tag>, vr: VR) -> Self {
        Attribute::new(tag, vr, PrimitiveValue::Empty)
    }

    /// Create the pixel data placeholder attribute.
    pub fn pixel_placeholder(vr: VR) -> Self {
        Attribute {
            tag: crate::header::tags::PIXEL_DATA,
            vr,
            value: Value::PixelPlaceholder,
        }
    }

    /// Retrieve the attribute's tag.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Retrieve the attribute's value representation.
    #[inline]
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// Retrieve the attribute's value.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Move the value out of the attribute.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The sequence items, if this attribute is a sequence.
    pub fn items(&self) -> Option<&[AttributeSet]> {
        self.value.items()
    }

    /// Convert the primitive value into a string representation.
    /// Sequences and the pixel placeholder have none.
    pub fn to_str(&self) -> Option<std::borrow::Cow<str>> {
        self.value.primitive().map(PrimitiveValue::to_str)
    }

    /// Number of attributes held by this attribute,
    /// itself included, counting nested items recursively.
    pub fn total_count(&self) -> usize {
        1 + self
            .items()
            .map(|items| items.iter().map(AttributeSet::total_count).sum())
            .unwrap_or(0)
    }
}

/// An ordered collection of attributes with unique tags,
/// iterated in ascending tag order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttributeSet {
    entries: BTreeMap<Tag, Attribute>,
}

impl AttributeSet {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve an attribute by tag, if present.
    pub fn get(&self, tag: Tag) -> Option<&Attribute> {
        self.entries.get(&tag)
    }

    /// Retrieve an attribute by tag,
    /// failing if it is not in the set.
    pub fn element(&self, tag: Tag) -> Result<&Attribute, AccessError> {
        self.entries.get(&tag).context(NoSuchAttributeSnafu { tag })
    }

    /// Insert an attribute, replacing any attribute with the same tag.
    /// Returns the replaced attribute.
    pub fn put(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.entries.insert(attribute.tag(), attribute)
    }

    /// Remove the attribute with the given tag.
    /// Returns whether it was present.
    pub fn remove(&mut self, tag: Tag) -> bool {
        self.entries.remove(&tag).is_some()
    }

    /// Remove and return the attribute with the given tag.
    pub fn take(&mut self, tag: Tag) -> Option<Attribute> {
        self.entries.remove(&tag)
    }

    /// Whether an attribute with the given tag is present.
    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Iterate over the attributes in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.entries.values()
    }

    /// Iterate over the tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.keys().copied()
    }

    /// Number of top-level attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of attributes, counting those nested in sequences.
    pub fn total_count(&self) -> usize {
        self.entries.values().map(Attribute::total_count).sum()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        AttributeSet {
            entries: iter.into_iter().map(|a| (a.tag(), a)).collect(),
        }
    }
}

impl Extend<Attribute> for AttributeSet {
    fn extend<I: IntoIterator<Item = Attribute>>(&mut self, iter: I) {
        self.entries
            .extend(iter.into_iter().map(|a| (a.tag(), a)));
    }
}

impl IntoIterator for AttributeSet {
    type Item = Attribute;
    type IntoIter = btree_map::IntoValues<Tag, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Attribute;
    type IntoIter = btree_map::Values<'a, Tag, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimble_value;
    use crate::header::tags;
    use pretty_assertions::assert_eq;

    fn derivation_item() -> AttributeSet {
        AttributeSet::from_iter([
            Attribute::new(tags::CODE_VALUE, VR::SH, dimble_value!(Strs, ["113072".to_string()])),
            Attribute::new(
                tags::CODING_SCHEME_DESIGNATOR,
                VR::SH,
                PrimitiveValue::from("DCM"),
            ),
        ])
    }

    #[test]
    fn ascending_order_regardless_of_insertion() {
        let mut set = AttributeSet::new();
        set.put(Attribute::new(tags::ROWS, VR::US, dimble_value!(U16, 2)));
        set.put(Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")));
        set.put(Attribute::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("X")));

        let order: Vec<_> = set.tags().collect();
        assert_eq!(order, vec![tags::MODALITY, tags::PATIENT_ID, tags::ROWS]);
    }

    #[test]
    fn put_replaces_and_take_removes() {
        let mut set = AttributeSet::new();
        assert!(set
            .put(Attribute::new(tags::ROWS, VR::US, dimble_value!(U16, 2)))
            .is_none());
        let old = set.put(Attribute::new(tags::ROWS, VR::US, dimble_value!(U16, 4)));
        assert_eq!(
            old.map(|a| a.into_value()),
            Some(Value::from(dimble_value!(U16, 2)))
        );
        assert_eq!(set.len(), 1);

        let taken = set.take(tags::ROWS).unwrap();
        assert_eq!(taken.tag(), tags::ROWS);
        assert!(set.is_empty());
        assert!(!set.remove(tags::ROWS));
    }

    #[test]
    fn missing_element_is_an_error() {
        let set = AttributeSet::new();
        let err = set.element(tags::PATIENT_NAME).unwrap_err();
        assert!(matches!(err, AccessError::NoSuchAttribute { tag, .. } if tag == tags::PATIENT_NAME));
    }

    #[test]
    fn total_count_includes_nested_items() {
        let set = AttributeSet::from_iter([
            Attribute::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            Attribute::new(
                tags::DERIVATION_CODE_SEQUENCE,
                VR::SQ,
                vec![derivation_item(), derivation_item()],
            ),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_count(), 2 + 4);
        assert_eq!(
            set.get(tags::DERIVATION_CODE_SEQUENCE)
                .and_then(|a| a.items())
                .map(|items| items.len()),
            Some(2)
        );
    }
}
