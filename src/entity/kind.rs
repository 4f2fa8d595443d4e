//! Per-kind entry point: finders, constructors and hook registration.

use super::Entity;
use crate::adapter::Params;
use crate::collection::Collection;
use crate::condition::{Condition, IntoCondition};
use crate::error::{OrmError, Result};
use crate::registry::{ClassMetadata, GetterFn, Registry, SetterFn, Trigger, TriggerEvent, TriggerOutcome};
use crate::sql::{self, Limit, OrderBy};
use crate::value::{FieldMap, FieldValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Handle on a registered entity kind
///
/// Cheap to clone; every entity and collection carries one.
///
/// # Examples
///
/// ```no_run
/// # fn demo(registry: std::sync::Arc<rowguard::Registry>) -> rowguard::Result<()> {
/// use rowguard::{Limit, OrderBy};
///
/// let items = registry.kind("Item")?;
/// let mut roots = items.find(["parent_id = 0", "title ~ item%"]);
/// println!("{} root items", roots.count()?);
///
/// let mut latest = items.select(None, Some(OrderBy::desc("id")), Some(Limit::count(5)));
/// for item in latest.stream()? {
///     println!("{}", item?.id());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Kind {
    registry: Arc<Registry>,
    meta: Arc<ClassMetadata>,
}

impl Kind {
    pub(crate) fn new(registry: Arc<Registry>, meta: Arc<ClassMetadata>) -> Self {
        Self { registry, meta }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn table(&self) -> &str {
        &self.meta.table
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.meta
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.meta.has_field(field)
    }

    /// Handle on another kind of the same registry
    ///
    /// # Errors
    ///
    /// Fails when `name` cannot be registered.
    pub fn sibling(&self, name: &str) -> Result<Kind> {
        self.registry.kind(name)
    }

    /// Transient entity holding the column defaults
    pub fn new_entity(&self) -> Entity {
        Entity::transient(self.clone())
    }

    /// Transient entity with `fields` staged as changes. Nothing is written.
    ///
    /// # Errors
    ///
    /// Fails like [`Entity::set`].
    pub fn create(&self, fields: FieldMap) -> Result<Entity> {
        let mut entity = self.new_entity();
        entity.set_many(fields)?;
        Ok(entity)
    }

    /// # Errors
    ///
    /// Returns `OrmError::NotFound` when no row has this id.
    pub fn load(&self, id: i64) -> Result<Entity> {
        self.find_first(Condition::equals("id", id), None)?
            .ok_or_else(|| OrmError::NotFound {
                kind: self.name().to_string(),
                id,
            })
    }

    /// Lazy collection of rows matching `condition`
    pub fn find(&self, condition: impl IntoCondition) -> Collection {
        Collection::by_condition(self.clone(), Some(condition.into_condition()), None, None)
    }

    /// Lazy collection with explicit ordering and window
    pub fn select(&self, condition: Option<Condition>, order: Option<OrderBy>, limit: Option<Limit>) -> Collection {
        Collection::by_condition(self.clone(), condition, order, limit)
    }

    pub fn all(&self) -> Collection {
        self.select(None, None, None)
    }

    pub fn all_ordered(&self, order: impl Into<OrderBy>) -> Collection {
        self.select(None, Some(order.into()), None)
    }

    /// First row matching `condition`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the query fails.
    pub fn find_first(&self, condition: impl IntoCondition, order: Option<OrderBy>) -> Result<Option<Entity>> {
        let condition = condition.into_condition();
        let rows = self.rows(Some(&condition), order.as_ref(), Some(Limit::count(1)))?;
        Ok(self.materialize(rows).into_iter().next())
    }

    /// Rows in random order. Always served by the store, even for preloaded kinds.
    pub fn find_random(&self, condition: Option<Condition>, limit: Option<Limit>) -> Collection {
        self.select(condition, Some(OrderBy::random()), limit)
    }

    /// Lazy collection over a literal query
    pub fn find_by_sql(&self, sql: impl Into<String>, params: Params) -> Collection {
        Collection::by_sql(self.clone(), sql.into(), params)
    }

    /// First row of a literal query
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the query fails.
    pub fn find_one_by_sql(&self, sql: &str, params: &Params) -> Result<Option<Entity>> {
        let row = self.registry.adapter().fetch_row(sql, params)?;
        Ok(row.and_then(|r| self.materialize(vec![r]).pop()))
    }

    /// Number of rows matching `condition`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the query fails, and
    /// `OrmError::ConditionParse` when a raw SQL condition hits a preloaded kind.
    pub fn count(&self, condition: Option<&Condition>) -> Result<u64> {
        if self.serves_from_memory(condition, None) {
            let rows = self.registry.preloaded_rows(&self.meta)?;
            let mut total = 0;
            for row in rows.iter() {
                if condition.map_or(Ok(true), |c| c.test(row))? {
                    total += 1;
                }
            }
            return Ok(total);
        }
        let adapter = self.registry.adapter();
        let query = sql::count_query(&self.meta.table, condition, adapter.dialect());
        let value = adapter.fetch_single_value(&query, &Params::None)?;
        Ok(value
            .and_then(|v| v.as_i64())
            .map_or(0, |n| u64::try_from(n).unwrap_or(0)))
    }

    /// Load a row from the cache provider, falling back to the store.
    ///
    /// With `autocache`, a row read from the store is written back to the cache.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::NotFound` when the row exists nowhere, and cache
    /// provider failures.
    pub fn load_from_cache(&self, id: i64, autocache: bool, ttl: Option<Duration>) -> Result<Entity> {
        let Some(cache) = self.registry.cache() else {
            return self.load(id);
        };
        if let Some(entity) = cache
            .get_record(self.name(), id)?
            .and_then(|row| self.materialize(vec![row]).pop())
        {
            return Ok(entity);
        }
        let mut entity = self.load(id)?;
        if autocache {
            entity.cache(ttl)?;
        }
        Ok(entity)
    }

    /// Collection stored under `key` by [`Collection::cache`]; `None` when unknown
    ///
    /// # Errors
    ///
    /// Propagates cache provider failures.
    pub fn load_cached_set(&self, key: &str) -> Result<Option<Collection>> {
        Collection::from_cache(self.clone(), key)
    }

    /// Attach a trigger handler
    pub fn on<F>(&self, trigger: Trigger, handler: F)
    where
        F: Fn(&mut Entity, &TriggerEvent) -> Result<TriggerOutcome> + Send + Sync + 'static,
    {
        self.meta.add_trigger(trigger, Arc::new(handler));
    }

    /// Attach one handler to several triggers
    pub fn on_events<F>(&self, triggers: &[Trigger], handler: F)
    where
        F: Fn(&mut Entity, &TriggerEvent) -> Result<TriggerOutcome> + Send + Sync + 'static,
    {
        let handler: crate::registry::TriggerFn = Arc::new(handler);
        for trigger in triggers {
            self.meta.add_trigger(*trigger, Arc::clone(&handler));
        }
    }

    /// Append interceptors to the getter and/or setter chain of `property`
    pub fn add_property(&self, property: &str, getter: Option<GetterFn>, setter: Option<SetterFn>) {
        self.meta.add_property(property, getter, setter);
    }

    pub fn add_getter<F>(&self, property: &str, getter: F)
    where
        F: Fn(&Entity, FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        self.add_property(property, Some(Arc::new(getter)), None);
    }

    pub fn add_setter<F>(&self, property: &str, setter: F)
    where
        F: Fn(&mut Entity, FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        self.add_property(property, None, Some(Arc::new(setter)));
    }

    /// Drop the in-memory table snapshot of a preloaded kind
    pub fn flush_preloaded(&self) {
        self.registry.flush_preloaded(self.name());
    }

    fn serves_from_memory(&self, condition: Option<&Condition>, order: Option<&OrderBy>) -> bool {
        self.meta.preload
            && !condition.is_some_and(Condition::has_raw_sql)
            && !matches!(order, Some(OrderBy::Random))
    }

    /// Select rows, from the preloaded snapshot when the kind is preloaded
    pub(crate) fn rows(
        &self,
        condition: Option<&Condition>,
        order: Option<&OrderBy>,
        limit: Option<Limit>,
    ) -> Result<Vec<FieldMap>> {
        if self.serves_from_memory(condition, order) {
            let snapshot = self.registry.preloaded_rows(&self.meta)?;
            let mut rows = Vec::new();
            for row in snapshot.iter() {
                if condition.map_or(Ok(true), |c| c.test(row))? {
                    rows.push(row.clone());
                }
            }
            if let Some(order) = order {
                rows.sort_by(|a, b| order.compare(a, b));
            }
            if let Some(limit) = limit {
                let (start, end) = limit.bounds(rows.len());
                rows.truncate(end);
                rows.drain(..start);
            }
            return Ok(rows);
        }
        let adapter = self.registry.adapter();
        let query = sql::select_query(&self.meta.table, condition, order, limit, adapter.dialect());
        adapter.fetch_rows(&query, &Params::None)
    }

    pub(crate) fn materialize(&self, rows: Vec<FieldMap>) -> Vec<Entity> {
        #[cfg(feature = "metrics")]
        METRICS.record_materialized(rows.len());
        rows.into_iter()
            .map(|row| Entity::from_row(self.clone(), row))
            .collect()
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kind")
            .field("name", &self.meta.name)
            .field("table", &self.meta.table)
            .finish()
    }
}
