//! Properties stored in side tables keyed by the owning row's id.
//!
//! An external field reads like a column of the entity but lives in another
//! table, one row per owner. Values are fetched on first read, staged like
//! any other change on write, upserted after the owner is saved and deleted
//! with it.
//!
//! # Examples
//!
//! ```no_run
//! use rowguard::external::ExternalFields;
//! use rowguard::registry::KindDef;
//!
//! let item = KindDef::new("Item").on_init(|kind| {
//!     ExternalFields::new()
//!         .field("city_name", "item_city", Some("title"))
//!         .field("city_population", "item_city", Some("population"))
//!         .install(kind);
//!     Ok(())
//! });
//! ```

use crate::adapter::Params;
use crate::entity::{Entity, Kind};
use crate::error::Result;
use crate::registry::{Trigger, TriggerEvent, TriggerOutcome};
use crate::sql::quote_identifier;
use crate::value::FieldValue;
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_PARENT_KEY: &str = "parent_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalField {
    pub property: String,
    pub table: String,
    pub column: String,
}

/// Set of external fields of one kind, sharing the owner key column
#[derive(Debug, Clone)]
pub struct ExternalFields {
    parent_key: String,
    fields: Vec<ExternalField>,
}

impl Default for ExternalFields {
    fn default() -> Self {
        Self {
            parent_key: DEFAULT_PARENT_KEY.to_string(),
            fields: Vec::new(),
        }
    }
}

impl ExternalFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column of the side tables holding the owner's id (`parent_id` by default)
    #[must_use]
    pub fn parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = key.into();
        self
    }

    /// Declare `property`, stored in `column` of `table` (the property name when `None`)
    #[must_use]
    pub fn field(mut self, property: &str, table: &str, column: Option<&str>) -> Self {
        self.fields.push(ExternalField {
            property: property.to_string(),
            table: table.to_string(),
            column: column.unwrap_or(property).to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[ExternalField] {
        &self.fields
    }

    /// Attach getters and the save/delete triggers to `kind`
    pub fn install(self, kind: &Kind) {
        let shared = Arc::new(self);
        for field in &shared.fields {
            let owner = Arc::clone(&shared);
            let field = field.clone();
            let property = field.property.clone();
            kind.add_getter(&property, move |entity, staged| {
                owner.read(entity, &field, staged)
            });
        }

        let owner = Arc::clone(&shared);
        kind.on(Trigger::Saved, move |entity, event| {
            owner.save(entity, event)?;
            Ok(TriggerOutcome::Continue)
        });

        let owner = shared;
        kind.on(Trigger::Deleted, move |entity, event| {
            if let Some(id) = event.deleted_id {
                owner.delete(entity, id)?;
            }
            Ok(TriggerOutcome::Continue)
        });
    }

    fn read(&self, entity: &Entity, field: &ExternalField, staged: FieldValue) -> Result<FieldValue> {
        if !staged.is_null() || entity.id() == 0 {
            return Ok(staged);
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {}=?",
            quote_identifier(&field.column),
            quote_identifier(&field.table),
            quote_identifier(&self.parent_key)
        );
        let value = entity
            .kind()
            .registry()
            .adapter()
            .fetch_single_value(&sql, &Params::positional([entity.id()]))?;
        Ok(value.unwrap_or_default())
    }

    /// Upsert every side table with a changed property
    fn save(&self, entity: &Entity, event: &TriggerEvent) -> Result<()> {
        let mut by_table: BTreeMap<&str, Vec<(&str, FieldValue)>> = BTreeMap::new();
        for field in &self.fields {
            if event.changed.iter().any(|c| c == &field.property) {
                by_table
                    .entry(field.table.as_str())
                    .or_default()
                    .push((field.column.as_str(), entity.raw(&field.property)));
            }
        }
        let adapter = entity.kind().registry().adapter();
        let id = entity.id();
        for (table, columns) in by_table {
            let assignments = columns
                .iter()
                .map(|(c, _)| format!("{}=?", quote_identifier(c)))
                .collect::<Vec<_>>()
                .join(", ");
            let update = format!(
                "UPDATE {} SET {assignments} WHERE {}=?",
                quote_identifier(table),
                quote_identifier(&self.parent_key)
            );
            let mut values: Vec<FieldValue> = columns.iter().map(|(_, v)| v.clone()).collect();
            values.push(FieldValue::Int(id));
            if adapter.query(&update, &Params::Positional(values))? > 0 {
                continue;
            }

            let mut row = crate::value::FieldMap::new();
            row.insert(self.parent_key.clone(), FieldValue::Int(id));
            for (column, value) in columns {
                row.insert(column.to_string(), value);
            }
            adapter.insert(table, &row)?;
            log::debug!("created {table} row for {} #{id}", entity.kind_name());
        }
        Ok(())
    }

    fn delete(&self, entity: &Entity, id: i64) -> Result<()> {
        let mut tables: Vec<&str> = self.fields.iter().map(|f| f.table.as_str()).collect();
        tables.sort_unstable();
        tables.dedup();
        let adapter = entity.kind().registry().adapter();
        for table in tables {
            let sql = format!(
                "DELETE FROM {} WHERE {}=?",
                quote_identifier(table),
                quote_identifier(&self.parent_key)
            );
            adapter.query(&sql, &Params::positional([id]))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_defaults_to_property() {
        let fields = ExternalFields::new()
            .field("info", "test_items_info", None)
            .field("city", "item_city", Some("title"));
        assert_eq!(fields.fields()[0].column, "info");
        assert_eq!(fields.fields()[1].column, "title");
        assert_eq!(fields.parent_key, "parent_id");
    }
}
