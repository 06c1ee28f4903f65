use invcache_storage::{Entity, EntityDescriptor, FieldDescriptor, FieldValue, TrackingError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::required_text;
use crate::cache::{CATEGORIES, CacheKey, Cacheable};

/// A product category. Only `name` and `description` are tracked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "Category",
    table: "CATEGORIES",
    id_field: "id",
    id_column: "ID",
    updated_at_field: "updatedAt",
    updated_at_column: "UPDATED_AT",
    track_all: false,
    fields: &[
        FieldDescriptor::new("id"),
        FieldDescriptor::new("name").tracked(),
        FieldDescriptor::new("description").tracked(),
        FieldDescriptor::new("createdAt"),
        FieldDescriptor::new("updatedAt"),
    ],
};

impl Entity for Category {
    fn descriptor() -> &'static EntityDescriptor {
        &DESCRIPTOR
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> Option<FieldValue> {
        Some(match field {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "description" => self.description.clone().into(),
            "createdAt" => self.created_at.into(),
            "updatedAt" => self.updated_at.into(),
            _ => return None,
        })
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), TrackingError> {
        match field {
            "id" => self.id = value.into_int(field)?,
            "name" => self.name = required_text(field, value)?,
            "description" => self.description = value.into_text(field)?,
            "createdAt" => self.created_at = value.into_timestamp(field)?,
            "updatedAt" => self.updated_at = value.into_timestamp(field)?,
            _ => return Err(TrackingError::unknown_field(DESCRIPTOR.name, field)),
        }
        Ok(())
    }
}

impl Cacheable for Category {
    const CACHE_NAME: &'static str = CATEGORIES;

    fn cache_keys(&self) -> Vec<CacheKey> {
        let mut keys = vec![CacheKey::All, CacheKey::Name(self.name.clone())];
        keys.extend(self.id.map(CacheKey::Id));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invcache_storage::Tracked;

    #[test]
    fn test_field_level_tracking() {
        let mut tracked = Tracked::new(Category {
            id: Some(3),
            name: "Tools".into(),
            ..Category::default()
        });

        assert!(tracked.set("name", "Hand tools").unwrap());
        // createdAt is declared but not tracked
        assert!(!tracked.set("createdAt", OffsetDateTime::now_utc()).unwrap());
        assert!(tracked.entity().created_at.is_some());
        assert_eq!(tracked.updated_fields().iter().collect::<Vec<_>>(), ["name"]);
    }
}
