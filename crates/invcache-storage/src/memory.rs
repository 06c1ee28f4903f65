//! In-memory entity store.
//!
//! A DashMap-backed [`EntityStore`] used by tests and single-node runs. It
//! behaves like a durable store from the caller's point of view: reads always
//! see the latest committed write.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::trace;

use crate::StorageResult;
use crate::entity::Entity;
use crate::traits::{EntityStore, Lookup};
use crate::update::PartialUpdate;
use crate::value::FieldValue;

#[derive(Debug)]
pub struct InMemoryStore<E: Entity> {
    rows: DashMap<i64, E>,
    next_id: AtomicI64,
    /// Number of loads served, for asserting cache hits in tests.
    loads: AtomicU64,
    partial_updates: AtomicU64,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> InMemoryStore<E> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
            loads: AtomicU64::new(0),
            partial_updates: AtomicU64::new(0),
            _entity: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total `load` and `load_by` calls served so far.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Total partial updates executed so far.
    pub fn partial_updates(&self) -> u64 {
        self.partial_updates.load(Ordering::Relaxed)
    }

    fn matches(entity: &E, lookup: &Lookup) -> bool {
        match lookup {
            Lookup::All => true,
            Lookup::FieldEquals { field, value } => entity
                .field_value(field)
                .is_some_and(|current| !current.is_null() && current.same_as(value)),
        }
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for InMemoryStore<E> {
    async fn load(&self, id: i64) -> StorageResult<Option<E>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    async fn load_by(&self, lookup: &Lookup) -> StorageResult<Vec<E>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let mut found: Vec<(i64, E)> = self
            .rows
            .iter()
            .filter(|row| Self::matches(row.value(), lookup))
            .map(|row| (*row.key(), row.value().clone()))
            .collect();
        found.sort_by_key(|(id, _)| *id);
        Ok(found.into_iter().map(|(_, entity)| entity).collect())
    }

    async fn save(&self, mut entity: E) -> StorageResult<E> {
        let id = match entity.id() {
            Some(id) => {
                self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                entity.set_id(id);
                id
            }
        };
        entity.set_field(
            E::descriptor().updated_at_field,
            FieldValue::Timestamp(OffsetDateTime::now_utc()),
        )?;
        self.rows.insert(id, entity.clone());
        trace!(entity = E::descriptor().name, id, "saved");
        Ok(entity)
    }

    async fn delete_by_id(&self, id: i64) -> StorageResult<bool> {
        Ok(self.rows.remove(&id).is_some())
    }

    async fn execute_partial_update(&self, update: &PartialUpdate) -> StorageResult<u64> {
        self.partial_updates.fetch_add(1, Ordering::Relaxed);
        let Some(mut row) = self.rows.get_mut(&update.id) else {
            return Ok(0);
        };
        let mut patched = row.value().clone();
        for assignment in &update.assignments {
            patched.set_field(&assignment.field, assignment.value.clone())?;
        }
        *row = patched;
        Ok(1)
    }
}
