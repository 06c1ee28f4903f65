//! Field-level change tracking.
//!
//! A [`Tracked`] value owns an entity together with the names of the fields
//! mutated since tracking began or since the last successful persist. The
//! change set travels with the entity, so two equal entities wrapped
//! separately never share a dirty set and nothing outlives the wrapper.

use std::collections::BTreeSet;

use tracing::trace;

use crate::entity::Entity;
use crate::error::TrackingError;
use crate::value::FieldValue;

/// Names of fields changed since the last persist.
///
/// Set semantics; iteration is in field-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyFields(BTreeSet<String>);

impl DirtyFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field`. Returns `false` if it was already present.
    pub fn insert(&mut self, field: impl Into<String>) -> bool {
        self.0.insert(field.into())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for DirtyFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a DirtyFields {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An entity under change tracking.
///
/// Mutations go through [`Tracked::set`], which applies the value and
/// records the field when it is tracked and the value actually differs from
/// the current one.
#[derive(Debug, Clone)]
pub struct Tracked<E: Entity> {
    original: E,
    current: E,
    dirty: DirtyFields,
}

impl<E: Entity> Tracked<E> {
    pub fn new(entity: E) -> Self {
        Self {
            original: entity.clone(),
            current: entity,
            dirty: DirtyFields::new(),
        }
    }

    /// The entity with all mutations applied.
    pub fn entity(&self) -> &E {
        &self.current
    }

    /// Snapshot taken when tracking began or at the last persist.
    pub fn original(&self) -> &E {
        &self.original
    }

    pub fn into_inner(self) -> E {
        self.current
    }

    /// Assigns `value` to `field`.
    ///
    /// Returns `true` when the change was recorded in the dirty set. Writing
    /// a value equal to the current one, `Null` over `Null` included, is
    /// applied but not recorded. Untracked fields are applied and never
    /// recorded.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<bool, TrackingError> {
        let descriptor = E::descriptor();
        if descriptor.field(field).is_none() {
            return Err(TrackingError::unknown_field(descriptor.name, field));
        }

        let value = value.into();
        let changed = !self
            .current
            .field_value(field)
            .unwrap_or(FieldValue::Null)
            .same_as(&value);
        self.current.set_field(field, value)?;

        let recorded = changed && descriptor.is_tracked(field);
        if recorded {
            self.dirty.insert(field);
            trace!(entity = descriptor.name, field, "field marked dirty");
        }
        Ok(recorded)
    }

    /// Records `field` as changed without touching its value. Idempotent.
    pub fn mark_updated(&mut self, field: impl Into<String>) {
        self.dirty.insert(field);
    }

    /// Snapshot of the dirty set.
    pub fn updated_fields(&self) -> DirtyFields {
        self.dirty.clone()
    }

    pub fn is_field_updated(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty(&self) -> &DirtyFields {
        &self.dirty
    }

    /// Empties the dirty set after a successful persist and re-bases the
    /// original snapshot on the current state.
    pub fn clear_updated_fields(&mut self) {
        self.dirty.clear();
        self.original = self.current.clone();
    }

    pub(crate) fn entity_mut(&mut self) -> &mut E {
        &mut self.current
    }
}
