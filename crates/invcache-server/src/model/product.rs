use bigdecimal::BigDecimal;
use invcache_storage::{Entity, EntityDescriptor, FieldDescriptor, FieldValue, TrackingError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{required, required_text};
use crate::cache::{CacheKey, Cacheable, PRODUCTS};

/// A stocked product. Every column is tracked for selective updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "Product",
    table: "PRODUCTS",
    id_field: "id",
    id_column: "ID",
    updated_at_field: "updatedAt",
    updated_at_column: "UPDATED_AT",
    track_all: true,
    fields: &[
        FieldDescriptor::new("id"),
        FieldDescriptor::new("name"),
        FieldDescriptor::new("description"),
        FieldDescriptor::new("sku"),
        FieldDescriptor::new("price"),
        FieldDescriptor::new("stockQuantity"),
        FieldDescriptor::new("categoryId"),
        FieldDescriptor::new("supplierId"),
        FieldDescriptor::new("createdAt"),
        FieldDescriptor::new("updatedAt"),
    ],
};

impl Entity for Product {
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
            "sku" => self.sku.as_str().into(),
            "price" => self.price.clone().into(),
            "stockQuantity" => self.stock_quantity.into(),
            "categoryId" => self.category_id.into(),
            "supplierId" => self.supplier_id.into(),
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
            "sku" => self.sku = required_text(field, value)?,
            "price" => self.price = required(field, value.into_decimal(field)?, "decimal")?,
            "stockQuantity" => {
                let quantity = required(field, value.into_int(field)?, "int")?;
                self.stock_quantity = i32::try_from(quantity)
                    .map_err(|_| TrackingError::type_mismatch(field, "int32", "int64"))?;
            }
            "categoryId" => self.category_id = value.into_int(field)?,
            "supplierId" => self.supplier_id = value.into_int(field)?,
            "createdAt" => self.created_at = value.into_timestamp(field)?,
            "updatedAt" => self.updated_at = value.into_timestamp(field)?,
            _ => return Err(TrackingError::unknown_field(DESCRIPTOR.name, field)),
        }
        Ok(())
    }
}

impl Cacheable for Product {
    const CACHE_NAME: &'static str = PRODUCTS;

    fn cache_keys(&self) -> Vec<CacheKey> {
        let mut keys = vec![CacheKey::All, CacheKey::Sku(self.sku.clone())];
        keys.extend(self.id.map(CacheKey::Id));
        keys.extend(self.category_id.map(CacheKey::Category));
        keys.extend(self.supplier_id.map(CacheKey::Supplier));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invcache_storage::{Tracked, build_update};
    use std::str::FromStr;

    fn product() -> Product {
        Product {
            id: Some(5),
            name: "Hammer".into(),
            sku: "A".into(),
            price: BigDecimal::from_str("9.90").unwrap(),
            stock_quantity: 10,
            category_id: Some(3),
            ..Product::default()
        }
    }

    #[test]
    fn test_sku_change_updates_only_sku() {
        let mut tracked = Tracked::new(product());
        assert!(tracked.set("sku", "B").unwrap());

        let update = build_update(tracked.entity(), tracked.dirty(), OffsetDateTime::now_utc())
            .unwrap()
            .unwrap();
        assert_eq!(
            update.to_sql(),
            "UPDATE PRODUCTS SET SKU = $1, UPDATED_AT = $2 WHERE ID = $3"
        );
        assert_eq!(update.id, 5);
    }

    #[test]
    fn test_camel_case_columns() {
        let mut tracked = Tracked::new(product());
        tracked.set("stockQuantity", 4).unwrap();
        tracked.set("supplierId", Some(7_i64)).unwrap();

        let update = build_update(tracked.entity(), tracked.dirty(), OffsetDateTime::now_utc())
            .unwrap()
            .unwrap();
        assert_eq!(
            update.columns().collect::<Vec<_>>(),
            ["STOCK_QUANTITY", "SUPPLIER_ID", "UPDATED_AT"]
        );
    }

    #[test]
    fn test_required_fields_reject_null() {
        let mut tracked = Tracked::new(product());
        assert!(tracked.set("name", None::<String>).is_err());
        assert!(tracked.set("stockQuantity", i64::MAX).is_err());
        assert_eq!(tracked.entity().name, "Hammer");
    }

    #[test]
    fn test_price_scale_is_not_a_change() {
        let mut tracked = Tracked::new(product());
        assert!(!tracked.set("price", BigDecimal::from_str("9.9").unwrap()).unwrap());
    }

    #[test]
    fn test_cache_keys() {
        let keys = product().cache_keys();
        assert!(keys.contains(&CacheKey::Id(5)));
        assert!(keys.contains(&CacheKey::All));
        assert!(keys.contains(&CacheKey::Sku("A".into())));
        assert!(keys.contains(&CacheKey::Category(3)));
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_cache_roundtrip() {
        let encoded = rmp_serde::to_vec(&product()).unwrap();
        let decoded: Product = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded, product());
    }
}
