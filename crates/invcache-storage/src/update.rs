//! Selective update builder.
//!
//! Turns the dirty set of a [`Tracked`] entity into a single `UPDATE` that
//! assigns only the changed columns plus the last-modified timestamp.

use std::fmt::Write as _;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::StorageResult;
use crate::entity::Entity;
use crate::error::TrackingError;
use crate::tracking::{DirtyFields, Tracked};
use crate::traits::EntityStore;
use crate::value::FieldValue;

/// One `column = value` pair of a partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub column: String,
    pub value: FieldValue,
}

/// A partial update of a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    pub table: &'static str,
    pub id_column: &'static str,
    pub id: i64,
    /// Dirty-field assignments in field-name order; the timestamp is last.
    pub assignments: Vec<Assignment>,
}

impl PartialUpdate {
    /// Renders the statement with positional placeholders.
    ///
    /// The identifier is bound after every assignment.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("UPDATE {} SET ", self.table);
        for (index, assignment) in self.assignments.iter().enumerate() {
            if index > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "{} = ${}", assignment.column, index + 1);
        }
        let _ = write!(
            sql,
            " WHERE {} = ${}",
            self.id_column,
            self.assignments.len() + 1
        );
        sql
    }

    /// Bind parameters matching [`PartialUpdate::to_sql`].
    pub fn params(&self) -> Vec<FieldValue> {
        self.assignments
            .iter()
            .map(|assignment| assignment.value.clone())
            .chain(std::iter::once(FieldValue::Int(self.id)))
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.assignments
            .iter()
            .map(|assignment| assignment.column.as_str())
    }
}

/// Result of [`persist_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The statement ran and touched this many rows.
    Updated(u64),
    /// Nothing resolvable was dirty, no statement was issued.
    Skipped,
}

/// Builds the partial update for `dirty` fields of `entity`.
///
/// Fields that cannot be resolved to an updatable column are logged and
/// skipped. Returns `Ok(None)` when no field resolves, in which case the
/// caller must not contact the store at all.
pub fn build_update<E: Entity>(
    entity: &E,
    dirty: &DirtyFields,
    now: OffsetDateTime,
) -> Result<Option<PartialUpdate>, TrackingError> {
    let descriptor = E::descriptor();
    let mut assignments = Vec::with_capacity(dirty.len() + 1);

    for field in dirty.iter() {
        let Some(column) = descriptor.column_for(field) else {
            warn!(
                entity = descriptor.name,
                field, "dirty field has no updatable column, skipping"
            );
            continue;
        };
        let Some(value) = entity.field_value(field) else {
            warn!(
                entity = descriptor.name,
                field, "dirty field has no readable value, skipping"
            );
            continue;
        };
        assignments.push(Assignment {
            field: field.to_string(),
            column: column.into_owned(),
            value,
        });
    }

    if assignments.is_empty() {
        return Ok(None);
    }

    let id = entity.id().ok_or(TrackingError::MissingId {
        entity: descriptor.name,
    })?;

    assignments.push(Assignment {
        field: descriptor.updated_at_field.to_string(),
        column: descriptor.updated_at_column.to_string(),
        value: FieldValue::Timestamp(now),
    });

    Ok(Some(PartialUpdate {
        table: descriptor.table,
        id_column: descriptor.id_column,
        id,
        assignments,
    }))
}

/// Writes the dirty fields of `tracked` through `store`.
///
/// When a row was written the entity's last-modified timestamp is refreshed
/// and its dirty set is cleared. When nothing resolves the store is not
/// called, and when no row matched the id the entity and its dirty set are
/// left untouched so the change can be retried.
pub async fn persist_changes<E, S>(store: &S, tracked: &mut Tracked<E>) -> StorageResult<PersistOutcome>
where
    E: Entity,
    S: EntityStore<E> + ?Sized,
{
    let now = OffsetDateTime::now_utc();
    let Some(update) = build_update(tracked.entity(), tracked.dirty(), now)? else {
        debug!(
            entity = E::descriptor().name,
            "no resolvable dirty fields, skipping update"
        );
        return Ok(PersistOutcome::Skipped);
    };

    let rows = store.execute_partial_update(&update).await?;
    debug!(
        entity = E::descriptor().name,
        id = update.id,
        columns = update.assignments.len(),
        rows,
        "selective update executed"
    );
    if rows == 0 {
        return Ok(PersistOutcome::Updated(0));
    }

    tracked
        .entity_mut()
        .set_field(E::descriptor().updated_at_field, FieldValue::Timestamp(now))?;
    tracked.clear_updated_fields();
    Ok(PersistOutcome::Updated(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::tracking::tests::{Item, item};
    use bigdecimal::BigDecimal;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    #[test]
    fn test_single_field_update() {
        let mut tracked = Tracked::new(item(5, "A"));
        tracked.set("sku", "B").unwrap();
        assert_eq!(
            tracked.updated_fields(),
            DirtyFields::from_iter(["sku"])
        );

        let update = build_update(tracked.entity(), tracked.dirty(), NOW)
            .unwrap()
            .unwrap();
        assert_eq!(
            update.to_sql(),
            "UPDATE ITEMS SET SKU = $1, UPDATED_AT = $2 WHERE ID = $3"
        );
        assert_eq!(
            update.params(),
            vec![
                FieldValue::from("B"),
                FieldValue::Timestamp(NOW),
                FieldValue::Int(5),
            ]
        );
        assert_eq!(update.columns().collect::<Vec<_>>(), ["SKU", "UPDATED_AT"]);
    }

    #[test]
    fn test_column_override_and_ordering() {
        let mut tracked = Tracked::new(item(9, "A"));
        tracked.set("quantity", 4_i64).unwrap();
        tracked.set("price", BigDecimal::from(12)).unwrap();

        let update = build_update(tracked.entity(), tracked.dirty(), NOW)
            .unwrap()
            .unwrap();
        assert_eq!(
            update.to_sql(),
            "UPDATE ITEMS SET UNIT_PRICE = $1, QUANTITY = $2, UPDATED_AT = $3 WHERE ID = $4"
        );
    }

    #[test]
    fn test_empty_dirty_set_builds_nothing() {
        let entity = item(5, "A");
        assert_eq!(build_update(&entity, &DirtyFields::new(), NOW).unwrap(), None);
    }

    #[test]
    fn test_unresolvable_fields_are_skipped() {
        let entity = item(5, "A");
        let dirty = DirtyFields::from_iter(["colour", "id", "updatedAt"]);
        assert_eq!(build_update(&entity, &dirty, NOW).unwrap(), None);

        let dirty = DirtyFields::from_iter(["colour", "sku"]);
        let update = build_update(&entity, &dirty, NOW).unwrap().unwrap();
        assert_eq!(update.columns().collect::<Vec<_>>(), ["SKU", "UPDATED_AT"]);
    }

    #[test]
    fn test_missing_id() {
        let entity = Item {
            sku: Some("A".into()),
            ..Item::default()
        };
        let dirty = DirtyFields::from_iter(["sku"]);
        assert_eq!(
            build_update(&entity, &dirty, NOW).unwrap_err(),
            TrackingError::MissingId { entity: "Item" }
        );
    }

    #[tokio::test]
    async fn test_persist_changes_clears_dirty_set() {
        let store = InMemoryStore::<Item>::new();
        let saved = store
            .save(Item {
                sku: Some("A".into()),
                ..Item::default()
            })
            .await
            .unwrap();
        let id = saved.id.unwrap();

        let mut tracked = Tracked::new(saved);
        tracked.set("sku", "B").unwrap();
        let outcome = persist_changes(&store, &mut tracked).await.unwrap();

        assert_eq!(outcome, PersistOutcome::Updated(1));
        assert!(!tracked.is_dirty());
        assert!(tracked.entity().updated_at.is_some());
        let stored = store.load(id).await.unwrap().unwrap();
        assert_eq!(stored.sku.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_persist_changes_skips_round_trip() {
        let store = InMemoryStore::<Item>::new();
        let mut tracked = Tracked::new(item(5, "A"));
        tracked.mark_updated("colour");

        let outcome = persist_changes(&store, &mut tracked).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(store.partial_updates(), 0);
    }

    #[tokio::test]
    async fn test_missing_row_keeps_changes_for_retry() {
        let store = InMemoryStore::<Item>::new();
        let mut tracked = Tracked::new(item(77, "A"));
        tracked.set("sku", "B").unwrap();

        let outcome = persist_changes(&store, &mut tracked).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Updated(0));
        assert!(tracked.is_field_updated("sku"));
        assert_eq!(tracked.original().sku.as_deref(), Some("A"));
        assert!(tracked.entity().updated_at.is_none());

        // Once the row exists the same tracked change goes through
        store.save(item(77, "A")).await.unwrap();
        let outcome = persist_changes(&store, &mut tracked).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Updated(1));
        assert!(!tracked.is_dirty());
        let stored = store.load(77).await.unwrap().unwrap();
        assert_eq!(stored.sku.as_deref(), Some("B"));
    }
}
