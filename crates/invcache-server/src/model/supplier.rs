use invcache_storage::{Entity, EntityDescriptor, FieldDescriptor, FieldValue, TrackingError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::required_text;
use crate::cache::{CacheKey, Cacheable, SUPPLIERS};

/// A product supplier. Unique by name and by e-mail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Option<i64>,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "Supplier",
    table: "SUPPLIERS",
    id_field: "id",
    id_column: "ID",
    updated_at_field: "updatedAt",
    updated_at_column: "UPDATED_AT",
    track_all: true,
    fields: &[
        FieldDescriptor::new("id"),
        FieldDescriptor::new("name"),
        FieldDescriptor::new("contactName").column("CONTACT_PERSON"),
        FieldDescriptor::new("email"),
        FieldDescriptor::new("phone"),
        FieldDescriptor::new("address"),
        FieldDescriptor::new("createdAt"),
        FieldDescriptor::new("updatedAt"),
    ],
};

impl Entity for Supplier {
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
            "contactName" => self.contact_name.clone().into(),
            "email" => self.email.clone().into(),
            "phone" => self.phone.clone().into(),
            "address" => self.address.clone().into(),
            "createdAt" => self.created_at.into(),
            "updatedAt" => self.updated_at.into(),
            _ => return None,
        })
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), TrackingError> {
        match field {
            "id" => self.id = value.into_int(field)?,
            "name" => self.name = required_text(field, value)?,
            "contactName" => self.contact_name = value.into_text(field)?,
            "email" => self.email = value.into_text(field)?,
            "phone" => self.phone = value.into_text(field)?,
            "address" => self.address = value.into_text(field)?,
            "createdAt" => self.created_at = value.into_timestamp(field)?,
            "updatedAt" => self.updated_at = value.into_timestamp(field)?,
            _ => return Err(TrackingError::unknown_field(DESCRIPTOR.name, field)),
        }
        Ok(())
    }
}

impl Cacheable for Supplier {
    const CACHE_NAME: &'static str = SUPPLIERS;

    fn cache_keys(&self) -> Vec<CacheKey> {
        let mut keys = vec![CacheKey::All, CacheKey::Name(self.name.clone())];
        keys.extend(self.id.map(CacheKey::Id));
        keys.extend(self.email.clone().map(CacheKey::Email));
        keys
    }
}
