//! Kind declarations and the metadata resolved from them.

use super::hooks::{GetterFn, Hooks, SetterFn, Trigger, TriggerFn};
use crate::condition::{Condition, IntoCondition};
use crate::entity::Kind;
use crate::error::Result;
use crate::inflect;
use crate::value::FieldMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Callback run once, right after a kind is first registered
pub type InitFn = Arc<dyn Fn(&Kind) -> Result<()> + Send + Sync>;

/// Kind of relation between two entity kinds, seen from the first one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    /// The other kind holds a foreign key pointing here
    HasMany,
    /// This kind holds a foreign key pointing at the other
    BelongsTo,
    None,
}

/// Parameters of a one-to-many (or through) relation
///
/// # Examples
///
/// ```
/// use rowguard::registry::HasMany;
///
/// let children = HasMany::new("parent_id").counter("children_count");
/// let related = HasMany::through("ItemsRelation").unique().counter("hits");
/// assert!(related.is_through());
/// assert_eq!(children.foreign_key.as_deref(), Some("parent_id"));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HasMany {
    /// Column on the child kind referencing the parent id; `None` for through relations
    pub foreign_key: Option<String>,
    /// Extra filter applied whenever the relation is loaded
    pub condition: Option<Condition>,
    /// Column on the parent kept equal to the number of children
    pub counter: Option<String>,
    /// Join kind for many-to-many relations
    pub through: Option<String>,
    /// At most one join row per (parent, child) pair
    pub unique: bool,
}

impl HasMany {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Self {
            foreign_key: Some(foreign_key.into()),
            ..Self::default()
        }
    }

    /// Many-to-many relation routed over the `through` kind
    pub fn through(through: impl Into<String>) -> Self {
        Self {
            through: Some(through.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn condition(mut self, condition: impl IntoCondition) -> Self {
        self.condition = Some(condition.into_condition());
        self
    }

    #[must_use]
    pub fn counter(mut self, field: impl Into<String>) -> Self {
        self.counter = Some(field.into());
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }
}

/// Declaration of an entity kind
///
/// # Examples
///
/// ```
/// use rowguard::registry::{HasMany, KindDef};
///
/// let item = KindDef::new("Item")
///     .table("test_items")
///     .has_many("Item", HasMany::new("parent_id").counter("children_count"))
///     .belongs_to("Item", "parent_id");
/// assert_eq!(item.table_name(), "test_items");
/// ```
#[derive(Clone)]
pub struct KindDef {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) has_many: Vec<(String, HasMany)>,
    pub(crate) belongs_to: Vec<(String, String)>,
    pub(crate) preload: bool,
    pub(crate) init: Option<InitFn>,
}

impl KindDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            has_many: Vec::new(),
            belongs_to: Vec::new(),
            preload: false,
            init: None,
        }
    }

    /// Override the table name derived from the kind name
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn has_many(mut self, kind: impl Into<String>, params: HasMany) -> Self {
        self.has_many.push((kind.into(), params));
        self
    }

    #[must_use]
    pub fn belongs_to(mut self, kind: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.belongs_to.push((kind.into(), foreign_key.into()));
        self
    }

    /// Serve every read of this kind from a table snapshot held in memory
    #[must_use]
    pub fn preload(mut self) -> Self {
        self.preload = true;
        self
    }

    /// Run `init` once, after the kind is first registered.
    ///
    /// This is where triggers and property interceptors are usually attached.
    #[must_use]
    pub fn on_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&Kind) -> Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| inflect::table_name_for(&self.name))
    }
}

impl fmt::Debug for KindDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDef")
            .field("name", &self.name)
            .field("table", &self.table_name())
            .field("has_many", &self.has_many)
            .field("belongs_to", &self.belongs_to)
            .field("preload", &self.preload)
            .finish_non_exhaustive()
    }
}

/// Everything the registry knows about one registered kind.
///
/// Columns and relations are fixed once built. Triggers and property
/// interceptors may still be appended afterwards.
pub struct ClassMetadata {
    pub name: String,
    pub table: String,
    /// Column names in declaration order
    pub fields: Vec<String>,
    /// Column defaults; `Null` where the column declares none
    pub defaults: FieldMap,
    pub has_many: Vec<(String, HasMany)>,
    pub belongs_to: Vec<(String, String)>,
    pub preload: bool,
    hooks: RwLock<Hooks>,
}

impl ClassMetadata {
    pub(crate) fn new(def: &KindDef, fields: Vec<String>, defaults: FieldMap) -> Self {
        Self {
            name: def.name.clone(),
            table: def.table_name(),
            fields,
            defaults,
            has_many: def.has_many.clone(),
            belongs_to: def.belongs_to.clone(),
            preload: def.preload,
            hooks: RwLock::new(Hooks::default()),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn has_many_params(&self, kind: &str) -> Option<&HasMany> {
        self.has_many.iter().find(|(k, _)| k == kind).map(|(_, p)| p)
    }

    pub fn belongs_to_key(&self, kind: &str) -> Option<&str> {
        self.belongs_to
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, fk)| fk.as_str())
    }

    pub(crate) fn add_trigger(&self, trigger: Trigger, callback: TriggerFn) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_trigger(trigger, callback);
    }

    pub(crate) fn add_property(&self, property: &str, getter: Option<GetterFn>, setter: Option<SetterFn>) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(getter) = getter {
            hooks.add_getter(property, getter);
        }
        if let Some(setter) = setter {
            hooks.add_setter(property, setter);
        }
    }

    pub(crate) fn triggers(&self, trigger: Trigger) -> Vec<TriggerFn> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .triggers(trigger)
    }

    pub(crate) fn getters(&self, property: &str) -> Vec<GetterFn> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .getters(property)
    }

    pub(crate) fn setters(&self, property: &str) -> Vec<SetterFn> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .setters(property)
    }
}

impl fmt::Debug for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("has_many", &self.has_many)
            .field("belongs_to", &self.belongs_to)
            .field("preload", &self.preload)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_defaults_to_plural_snake_case() {
        assert_eq!(KindDef::new("SubItem").table_name(), "sub_items");
        assert_eq!(KindDef::new("SubItem").table("test_subitems").table_name(), "test_subitems");
    }

    #[test]
    fn test_has_many_builder() {
        let params = HasMany::new("item_id").condition("extra = one").counter("n");
        assert_eq!(params.foreign_key.as_deref(), Some("item_id"));
        assert_eq!(params.condition, Some(Condition::parse("extra = one")));
        assert!(!params.is_through());
        assert!(!params.unique);
    }

    #[test]
    fn test_metadata_lookups() {
        let def = KindDef::new("Item")
            .has_many("SubItem", HasMany::new("item_id"))
            .belongs_to("Item", "parent_id");
        let meta = ClassMetadata::new(&def, vec!["id".into(), "parent_id".into()], FieldMap::new());
        assert!(meta.has_field("parent_id"));
        assert!(!meta.has_field("title"));
        assert!(meta.has_many_params("SubItem").is_some());
        assert!(meta.has_many_params("Other").is_none());
        assert_eq!(meta.belongs_to_key("Item"), Some("parent_id"));
    }
}
