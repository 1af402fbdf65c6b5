//! Object-class registry (spec §3a/§9a).
//!
//! Object classes are a server-known, closed set rather than an external
//! domain plugin surface. This keeps the two demo classes (`Product`,
//! `Setting`) as a compiled-in registry built once at startup — not a
//! runtime plugin system, which would be over-design for a fixed set of
//! "per-application domain models".

use std::collections::HashMap;
use std::sync::LazyLock;

use postgres_types::ToSql;
use serde_json::Value;
use tokio_postgres::Row;

use crate::error::ProtocolError;

/// The wire/storage type of a class-specific field. Both demo classes only
/// use text fields; the enum exists so a future registration can add more
/// without touching the dispatch machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
}

/// One class-specific column (beyond the base columns every class carries).
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
}

/// A bound value for one class-specific column, ready to hand to the driver.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
}

impl FieldValue {
    fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            FieldValue::Text(s) => s,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Everything the core needs to know about a registered object class:
/// its table name, its class-specific columns, and the statements built
/// from them. Built once at process start (spec §9a).
pub struct ObjectClassDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
    pub insert_sql: String,
    pub select_sql: String,
}

impl ObjectClassDescriptor {
    fn build(name: &'static str, table: &'static str, fields: &'static [FieldSpec]) -> Self {
        let extra_columns: Vec<&str> = fields.iter().map(|f| f.name).collect();

        // Base columns are positional $1..$6, extra columns follow.
        let mut insert_columns = vec![
            "origin_client_id",
            "origin_client_object_id",
            "last_updated_by_client_id",
            "owner_user_id",
            "last_sync",
            "deleted",
        ];
        insert_columns.extend_from_slice(&extra_columns);

        let placeholders: Vec<String> = (1..=insert_columns.len())
            .map(|i| format!("${i}"))
            .collect();

        let update_assignments: Vec<String> = [
            "last_updated_by_client_id",
            "last_sync",
            "deleted",
        ]
        .iter()
        .chain(extra_columns.iter())
        .map(|col| format!("{col} = EXCLUDED.{col}"))
        .collect();

        let insert_sql = format!(
            "INSERT INTO {table} ({cols}) VALUES ({vals}) \
             ON CONFLICT (origin_client_id, origin_client_object_id) DO UPDATE \
             SET {updates} WHERE {table}.owner_user_id = EXCLUDED.owner_user_id \
             RETURNING id",
            table = table,
            cols = insert_columns.join(", "),
            vals = placeholders.join(", "),
            updates = update_assignments.join(", "),
        );

        let mut select_columns = vec![
            "id AS rowid",
            "origin_client_id",
            "origin_client_object_id",
            "last_updated_by_client_id",
            "owner_user_id",
            "last_sync",
            "deleted",
        ];
        select_columns.extend_from_slice(&extra_columns);

        let select_sql = format!(
            "SELECT {cols} FROM {table} \
             WHERE owner_user_id = $1 AND last_sync > $2 AND last_sync <= $3 \
             ORDER BY last_sync",
            cols = select_columns.join(", "),
            table = table,
        );

        Self {
            name,
            table,
            fields,
            insert_sql,
            select_sql,
        }
    }

    /// Extracts this class's extra fields from an uploaded JSON object, in
    /// declaration order, ready to append to the base-column bind list.
    pub fn extract_fields(&self, object: &Value) -> Result<Vec<FieldValue>, ProtocolError> {
        let map = object.as_object().ok_or_else(|| {
            ProtocolError::InvalidJson(format!("{} object must be a JSON object", self.name))
        })?;

        self.fields
            .iter()
            .map(|field| {
                let value = map.get(field.name).ok_or_else(|| {
                    ProtocolError::InvalidJson(format!(
                        "{} object missing field {:?}",
                        self.name, field.name
                    ))
                })?;
                match field.field_type {
                    FieldType::Text => value
                        .as_str()
                        .map(|s| FieldValue::Text(s.to_string()))
                        .ok_or_else(|| {
                            ProtocolError::InvalidJson(format!(
                                "{} field {:?} must be a string",
                                self.name, field.name
                            ))
                        }),
                }
            })
            .collect()
    }

    /// Maps a row returned by `select_sql` into the wire JSON shape clients
    /// expect: base columns plus the class-specific fields, flattened.
    pub fn row_to_json(&self, row: &Row) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("rowid".into(), Value::from(row.get::<_, i64>("rowid")));
        map.insert(
            "originClientId".into(),
            Value::from(row.get::<_, i32>("origin_client_id")),
        );
        map.insert(
            "originClientObjectId".into(),
            Value::from(row.get::<_, i64>("origin_client_object_id")),
        );
        map.insert(
            "lastUpdatedByClientId".into(),
            Value::from(row.get::<_, i32>("last_updated_by_client_id")),
        );
        map.insert(
            "ownerUserId".into(),
            Value::from(row.get::<_, i32>("owner_user_id")),
        );
        map.insert("lastSync".into(), Value::from(row.get::<_, i64>("last_sync")));
        map.insert("deleted".into(), Value::from(row.get::<_, bool>("deleted")));

        for field in self.fields {
            let value = match field.field_type {
                FieldType::Text => FieldValue::Text(row.get::<_, String>(field.name)),
            };
            map.insert(field.name.to_string(), value.to_json());
        }

        Value::Object(map)
    }
}

/// Binds the base columns plus a class's extra fields into one parameter
/// list, in the exact order `insert_sql` expects.
pub fn insert_params<'a>(
    origin_client_id: &'a i32,
    origin_client_object_id: &'a i64,
    last_updated_by_client_id: &'a i32,
    owner_user_id: &'a i32,
    last_sync: &'a i64,
    deleted: &'a bool,
    extra: &'a [FieldValue],
) -> Vec<&'a (dyn ToSql + Sync)> {
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![
        origin_client_id,
        origin_client_object_id,
        last_updated_by_client_id,
        owner_user_id,
        last_sync,
        deleted,
    ];
    params.extend(extra.iter().map(|v| v.as_to_sql()));
    params
}

/// The compiled-in registry: class name -> descriptor. Built once, lazily,
/// the first time it's touched (effectively at startup under normal use).
pub static REGISTRY: LazyLock<HashMap<&'static str, ObjectClassDescriptor>> = LazyLock::new(|| {
    let mut registry = HashMap::new();
    registry.insert(
        "Product",
        ObjectClassDescriptor::build(
            "Product",
            "product",
            &[FieldSpec {
                name: "name",
                field_type: FieldType::Text,
            }],
        ),
    );
    registry.insert(
        "Setting",
        ObjectClassDescriptor::build(
            "Setting",
            "setting",
            &[
                FieldSpec {
                    name: "name",
                    field_type: FieldType::Text,
                },
                FieldSpec {
                    name: "value",
                    field_type: FieldType::Text,
                },
            ],
        ),
    );
    registry
});

/// Looks up a registered class by name, or `UnknownObjectClass` (spec §4.4:
/// unknown names are a `MALFORMED_REQUEST`).
pub fn lookup(name: &str) -> Result<&'static ObjectClassDescriptor, ProtocolError> {
    REGISTRY
        .get(name)
        .ok_or_else(|| ProtocolError::UnknownObjectClass(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_product_and_setting() {
        assert!(lookup("Product").is_ok());
        assert!(lookup("Setting").is_ok());
        assert!(lookup("Widget").is_err());
    }

    #[test]
    fn product_insert_sql_has_one_extra_column() {
        let product = lookup("Product").unwrap();
        assert!(product.insert_sql.contains("name"));
        assert!(!product.insert_sql.contains("value"));
    }

    #[test]
    fn setting_extract_fields_requires_name_and_value() {
        let setting = lookup("Setting").unwrap();
        let ok = serde_json::json!({"name": "theme", "value": "dark"});
        assert_eq!(setting.extract_fields(&ok).unwrap().len(), 2);

        let missing = serde_json::json!({"name": "theme"});
        assert!(setting.extract_fields(&missing).is_err());

        let wrong_type = serde_json::json!({"name": "theme", "value": 1});
        assert!(setting.extract_fields(&wrong_type).is_err());
    }
}
