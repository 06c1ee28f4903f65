//! Static entity descriptors.
//!
//! Each entity type declares once, at compile time, which fields it has,
//! which of them are tracked for changes and which column they map to. The
//! tracker and the update builder work only from this declaration.

use std::borrow::Cow;

use crate::error::TrackingError;
use crate::value::FieldValue;

/// Declaration of a single persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name as used by callers (`stockQuantity`).
    pub name: &'static str,
    /// Explicit column override. Falls back to [`camel_to_upper_snake`].
    pub column: Option<&'static str>,
    /// Field-level tracking marker.
    pub tracked: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            tracked: false,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn tracked(mut self) -> Self {
        self.tracked = true;
        self
    }

    /// The backing-store column this field is written to.
    pub fn column_name(&self) -> Cow<'static, str> {
        match self.column {
            Some(column) => Cow::Borrowed(column),
            None => Cow::Owned(camel_to_upper_snake(self.name)),
        }
    }
}

/// Declaration of an entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Entity type name for logs and errors.
    pub name: &'static str,
    /// Table updated by selective persists.
    pub table: &'static str,
    /// Identifier field; only ever appears in WHERE clauses.
    pub id_field: &'static str,
    pub id_column: &'static str,
    /// Last-modified timestamp, assigned on every selective update.
    pub updated_at_field: &'static str,
    pub updated_at_column: &'static str,
    /// Type-level tracking marker: every declared field is tracked.
    pub track_all: bool,
    pub fields: &'static [FieldDescriptor],
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Whether a mutation of `name` is recorded in the dirty set.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.field(name)
            .is_some_and(|field| self.track_all || field.tracked)
    }

    /// Column for an updatable field.
    ///
    /// Returns `None` for undeclared fields, the identifier and the
    /// last-modified timestamp, none of which can be assigned from a dirty set.
    pub fn column_for(&self, name: &str) -> Option<Cow<'static, str>> {
        if name == self.id_field || name == self.updated_at_field {
            return None;
        }
        self.field(name).map(FieldDescriptor::column_name)
    }
}

/// An entity that can be tracked and selectively persisted.
pub trait Entity: Clone + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Current value of a declared field, `None` if the field is unknown.
    fn field_value(&self, field: &str) -> Option<FieldValue>;

    /// Assign a declared field.
    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), TrackingError>;
}

/// Default column naming convention: `stockQuantity` becomes `STOCK_QUANTITY`.
///
/// An underscore is inserted only where a lowercase letter is followed by an
/// uppercase one.
pub fn camel_to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if prev_lower && ch.is_ascii_uppercase() {
            out.push('_');
        }
        prev_lower = ch.is_ascii_lowercase();
        out.push(ch.to_ascii_uppercase());
    }
    out
}
