//! Entities: rows of a registered kind with change tracking.
//!
//! An [`Entity`] keeps the field snapshot last read from (or written to) the
//! store, the set of pending changes, and a cache of related entities and
//! collections it already resolved. Reads go through the kind's getter
//! chains, writes through its setter chains; [`Entity::save`] persists the
//! pending changes and folds them into the snapshot.

mod kind;
mod lifecycle;
mod relations;

pub use kind::Kind;
pub use lifecycle::Outcome;

use crate::collection::Collection;
use crate::condition::IntoCondition;
use crate::error::{OrmError, Result};
use crate::inflect;
use crate::value::{FieldMap, FieldValue};
use std::collections::HashMap;
use std::fmt;

/// A related entity or collection resolved through a declared relation
#[derive(Debug, Clone)]
pub enum Related {
    /// Parent on a belongs-to relation; `None` when the foreign key is unset
    One(Option<Box<Entity>>),
    /// Children on a has-many (or through) relation
    Many(Collection),
}

impl Related {
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Related::One(entity) => entity.map(|e| *e),
            Related::Many(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Related::Many(collection) => Some(collection),
            Related::One(_) => None,
        }
    }
}

/// Result of [`Entity::get`]
#[derive(Debug, Clone)]
pub enum Property {
    Value(FieldValue),
    Related(Related),
}

impl Property {
    /// The scalar value; `Null` for relations
    pub fn into_value(self) -> FieldValue {
        match self {
            Property::Value(value) => value,
            Property::Related(_) => FieldValue::Null,
        }
    }

    pub fn into_related(self) -> Option<Related> {
        match self {
            Property::Related(related) => Some(related),
            Property::Value(_) => None,
        }
    }
}

/// One row of a registered kind
#[derive(Clone)]
pub struct Entity {
    kind: Kind,
    fields: FieldMap,
    changed: FieldMap,
    foreign: HashMap<String, Related>,
}

impl Entity {
    /// Transient entity holding the column defaults
    pub(crate) fn transient(kind: Kind) -> Self {
        let fields = kind.metadata().defaults.clone();
        Self::from_row(kind, fields)
    }

    pub(crate) fn from_row(kind: Kind, fields: FieldMap) -> Self {
        Self {
            kind,
            fields,
            changed: FieldMap::new(),
            foreign: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn kind_name(&self) -> &str {
        self.kind.name()
    }

    /// Row id, `0` while transient or after deletion
    pub fn id(&self) -> i64 {
        self.fields.get("id").map_or(0, FieldValue::as_id)
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.fields.insert("id".to_string(), FieldValue::Int(id));
    }

    /// Field snapshot as last read from or written to the store
    pub fn snapshot(&self) -> &FieldMap {
        &self.fields
    }

    /// Pending changes
    pub fn changes(&self) -> &FieldMap {
        &self.changed
    }

    pub fn changed_keys(&self) -> Vec<String> {
        self.changed.keys().cloned().collect()
    }

    pub fn has_own_field(&self, field: &str) -> bool {
        self.kind.has_field(field)
    }

    /// Value before any getter runs: the pending change, else the snapshot
    pub fn raw(&self, field: &str) -> FieldValue {
        self.changed
            .get(field)
            .or_else(|| self.fields.get(field))
            .cloned()
            .unwrap_or_default()
    }

    /// Field value seen through the kind's getter chain.
    ///
    /// # Errors
    ///
    /// Propagates the first getter failure.
    pub fn value(&self, field: &str) -> Result<FieldValue> {
        let getters = self.kind.metadata().getters(field);
        let mut value = self.raw(field);
        for getter in getters {
            value = getter(self, value)?;
        }
        Ok(value)
    }

    /// Resolve a property: a field (through getters), else a related
    /// entity or collection named after the related kind (`sub_items`,
    /// `SubItem`, `item`), else `Null`.
    ///
    /// # Errors
    ///
    /// Propagates getter failures and failures loading the relation.
    pub fn get(&mut self, name: &str) -> Result<Property> {
        let known = !self.kind.metadata().getters(name).is_empty()
            || self.changed.contains_key(name)
            || self.fields.contains_key(name);
        if known {
            return self.value(name).map(Property::Value);
        }
        match self.related_kind_for(name) {
            Some(kind) => self.load_foreign(&kind).map(Property::Related),
            None => Ok(Property::Value(FieldValue::Null)),
        }
    }

    /// Stage a field change.
    ///
    /// The value first runs through the kind's setter chain. A value equal to
    /// the snapshot cancels a pending change. Names that are not columns are
    /// kept as extra values alongside the row.
    ///
    /// # Errors
    ///
    /// * `OrmError::ImmutableField` - `field` is `id`
    /// * `OrmError::InvalidArgument` - `field` names a relation; use
    ///   [`Entity::set_related`]
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        if field == "id" {
            return Err(OrmError::ImmutableField {
                kind: self.kind_name().to_string(),
                field: field.to_string(),
            });
        }
        let mut value = value.into();
        for setter in self.kind.metadata().setters(field) {
            value = setter(self, value)?;
        }
        if self.has_own_field(field) {
            let unchanged = self
                .fields
                .get(field)
                .is_some_and(|current| current.loose_eq(&value));
            if unchanged {
                self.changed.remove(field);
            } else {
                self.changed.insert(field.to_string(), value);
            }
            return Ok(self);
        }
        if let Some(kind) = self.related_kind_for(field) {
            return Err(OrmError::InvalidArgument(format!(
                "{field} refers to related {kind}; assign it with set_related"
            )));
        }
        self.changed.insert(field.to_string(), value);
        Ok(self)
    }

    /// [`Entity::set`] for every pair of `fields`
    ///
    /// # Errors
    ///
    /// Stops at the first failing assignment.
    pub fn set_many(&mut self, fields: FieldMap) -> Result<&mut Self> {
        for (field, value) in fields {
            self.set(&field, value)?;
        }
        Ok(self)
    }

    /// Transient entities and entities with pending changes need saving
    pub fn was_changed(&self) -> bool {
        self.id() == 0 || !self.changed.is_empty()
    }

    /// Test a condition against the current field values
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` for raw SQL conditions.
    pub fn is_match(&self, condition: impl IntoCondition) -> Result<bool> {
        condition.into_condition().test(&self.current_fields())
    }

    /// Snapshot overlaid with pending changes
    pub fn current_fields(&self) -> FieldMap {
        let mut fields = self.fields.clone();
        fields.extend(self.changed.iter().map(|(k, v)| (k.clone(), v.clone())));
        fields
    }

    /// Field map of the entity.
    ///
    /// Columns are read through their getters; extra values kept alongside
    /// the row are included as stored. With a non-empty `needed`, exactly
    /// those keys are returned, `Null` for unknown ones.
    ///
    /// # Errors
    ///
    /// Propagates getter failures.
    pub fn to_field_map(&self, needed: &[&str]) -> Result<FieldMap> {
        let mut all = self.current_fields();
        for field in &self.kind.metadata().fields {
            all.insert(field.clone(), self.value(field)?);
        }
        if needed.is_empty() {
            return Ok(all);
        }
        Ok(needed
            .iter()
            .map(|key| ((*key).to_string(), all.get(*key).cloned().unwrap_or_default()))
            .collect())
    }

    /// Copy without the related-entity cache
    pub(crate) fn detached(&self) -> Entity {
        Entity {
            kind: self.kind.clone(),
            fields: self.fields.clone(),
            changed: self.changed.clone(),
            foreign: HashMap::new(),
        }
    }

    fn own_changes(&self) -> FieldMap {
        self.changed
            .iter()
            .filter(|(k, _)| k.as_str() != "id" && self.has_own_field(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn apply_changes(&mut self) {
        let changed = std::mem::take(&mut self.changed);
        self.fields.extend(changed);
    }

    /// Related kind a property name refers to: has-many kinds first, then belongs-to
    fn related_kind_for(&self, name: &str) -> Option<String> {
        let singular = inflect::singularize(name);
        let meta = self.kind.metadata();
        meta.has_many
            .iter()
            .map(|(kind, _)| kind)
            .chain(meta.belongs_to.iter().map(|(kind, _)| kind))
            .find(|kind| inflect::same_name(kind, name) || inflect::same_name(kind, &singular))
            .cloned()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind.name())
            .field("fields", &self.fields)
            .field("changed", &self.changed)
            .field("foreign", &self.foreign.keys().collect::<Vec<_>>())
            .finish()
    }
}
