//! Lazy, relation-aware collections of entities.
//!
//! A [`Collection`] knows where its rows come from but fetches nothing until
//! asked. `count()` is answered with a `COUNT(*)` whenever the source allows
//! it, and [`Collection::stream`] pages through large results without
//! materializing them all at once.

mod stream;

pub use stream::Stream;

use crate::adapter::Params;
use crate::condition::{Condition, IntoCondition};
use crate::entity::{Entity, Kind};
use crate::error::{OrmError, Result};
use crate::registry::RelationType;
use crate::sql::{self, Limit, OrderBy};
use crate::value::{FieldMap, FieldValue};
use std::fmt;
use std::time::Duration;

/// Where the rows of a collection come from
#[derive(Debug, Clone)]
pub(crate) enum Source {
    Condition {
        condition: Option<Condition>,
        order: Option<OrderBy>,
        limit: Option<Limit>,
    },
    Sql {
        sql: String,
        params: Params,
    },
    /// Children of the initiator along a has-many or through relation
    Relation,
    /// Ids read back from a cache provider
    Cache {
        ids: Vec<i64>,
    },
    /// Rows put in place by filtering, slicing or appending
    Filter,
}

/// Relation rows as one of two query shapes
enum RelationPlan {
    Direct(Condition),
    Join {
        through_table: String,
        target_key: String,
        condition: Condition,
    },
}

/// Lazily loaded, ordered set of entities of one kind
///
/// A collection is a single-owner value: page fetches and mutations are not
/// synchronized.
#[derive(Clone)]
pub struct Collection {
    kind: Kind,
    source: Source,
    records: Vec<Entity>,
    loaded: bool,
    count: Option<u64>,
    initiator: Option<Box<Entity>>,
    portion: u64,
}

impl Collection {
    fn new(kind: Kind, source: Source, initiator: Option<Entity>) -> Self {
        let portion = kind.registry().config().orm.portion_size.max(1);
        Self {
            kind,
            source,
            records: Vec::new(),
            loaded: false,
            count: None,
            initiator: initiator.map(Box::new),
            portion,
        }
    }

    pub(crate) fn by_condition(
        kind: Kind,
        condition: Option<Condition>,
        order: Option<OrderBy>,
        limit: Option<Limit>,
    ) -> Self {
        Self::new(
            kind,
            Source::Condition {
                condition,
                order,
                limit,
            },
            None,
        )
    }

    pub(crate) fn by_sql(kind: Kind, sql: String, params: Params) -> Self {
        Self::new(kind, Source::Sql { sql, params }, None)
    }

    /// Children of `initiator` of kind `kind`.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` unless the initiator's kind
    /// declares has-many of `kind`.
    pub fn from_relation(kind: Kind, initiator: Entity) -> Result<Self> {
        let relation = kind
            .registry()
            .relation_type_with(initiator.kind_name(), kind.name())?;
        if relation != RelationType::HasMany {
            return Err(OrmError::InvalidArgument(format!(
                "{} has no has-many relation with {}",
                initiator.kind_name(),
                kind.name()
            )));
        }
        Ok(Self::new(kind, Source::Relation, Some(initiator.detached())))
    }

    /// Collection of the ids cached under `key`; `None` when the key is unknown
    ///
    /// # Errors
    ///
    /// Propagates cache provider failures.
    pub fn from_cache(kind: Kind, key: &str) -> Result<Option<Self>> {
        let Some(cache) = kind.registry().cache() else {
            return Ok(None);
        };
        let Some(ids) = cache.get_record_set(kind.name(), key)? else {
            return Ok(None);
        };
        Ok(Some(Self::new(kind, Source::Cache { ids }, None)))
    }

    /// Empty, already loaded collection
    pub fn empty(kind: Kind) -> Self {
        let mut collection = Self::new(kind, Source::Filter, None);
        collection.mark_loaded();
        collection
    }

    /// Loaded collection of the same kind and initiator holding `records`
    fn derived(&self, records: Vec<Entity>) -> Self {
        let mut collection = Self::new(
            self.kind.clone(),
            Source::Filter,
            self.initiator.as_deref().cloned(),
        );
        collection.records = records;
        collection.mark_loaded();
        collection
    }

    fn mark_loaded(&mut self) {
        self.loaded = true;
        self.count = Some(self.records.len() as u64);
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn initiator(&self) -> Option<&Entity> {
        self.initiator.as_deref()
    }

    pub(crate) fn set_initiator(&mut self, initiator: Entity) {
        self.initiator = Some(Box::new(initiator));
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Rows fetched per page by [`Collection::stream`]
    #[must_use]
    pub fn with_portion(mut self, portion: u64) -> Self {
        self.portion = portion.max(1);
        self
    }

    /// Materialize every entity. Does nothing when already loaded.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the query fails and
    /// `OrmError::ConditionParse` when a raw SQL condition hits a preloaded kind.
    pub fn load(&mut self) -> Result<&mut Self> {
        if self.loaded {
            return Ok(self);
        }
        if matches!(self.source, Source::Filter) {
            self.mark_loaded();
            return Ok(self);
        }
        let rows = match &self.source {
            Source::Condition {
                condition,
                order,
                limit,
            } => self.kind.rows(condition.as_ref(), order.as_ref(), *limit)?,
            Source::Sql { sql, params } => self.kind.registry().adapter().fetch_rows(sql, params)?,
            Source::Relation => self.relation_rows(None)?,
            Source::Cache { ids } => self.cached_rows(ids)?,
            Source::Filter => Vec::new(),
        };
        log::trace!("loaded {} {} rows", rows.len(), self.kind.name());
        self.records = self.kind.materialize(rows);
        self.mark_loaded();
        Ok(self)
    }

    /// Drop the materialized rows so the next access refetches them.
    ///
    /// Filtered collections have no source to refetch from and keep their rows.
    pub fn reload(&mut self) -> &mut Self {
        if matches!(self.source, Source::Filter) {
            return self;
        }
        self.loaded = false;
        self.records.clear();
        self.count = None;
        self
    }

    /// Number of entities, answered without loading whenever the source allows it.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the count query fails.
    pub fn count(&mut self) -> Result<u64> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        if let Some(count) = self.prefetch_count()? {
            self.count = Some(count);
            return Ok(count);
        }
        self.load()?;
        Ok(self.records.len() as u64)
    }

    fn prefetch_count(&self) -> Result<Option<u64>> {
        match &self.source {
            Source::Condition { condition, limit, .. } => {
                let total = self.kind.count(condition.as_ref())?;
                Ok(Some(sql::clamp_count(total, *limit)))
            }
            Source::Relation => self.relation_count().map(Some),
            Source::Sql { sql, params } => {
                let Some((query, limit)) = sql::select_to_count_query(sql) else {
                    return Ok(None);
                };
                let total = self
                    .kind
                    .registry()
                    .adapter()
                    .fetch_single_value(&query, params)?
                    .and_then(|v| v.as_i64())
                    .map_or(0, |n| u64::try_from(n).unwrap_or(0));
                Ok(Some(sql::clamp_count(total, limit)))
            }
            Source::Cache { ids } => Ok(Some(ids.len() as u64)),
            Source::Filter => Ok(Some(self.records.len() as u64)),
        }
    }

    /// # Errors
    ///
    /// Same as [`Collection::count`].
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Every entity, loading first
    ///
    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn records(&mut self) -> Result<&[Entity]> {
        self.load()?;
        Ok(&self.records)
    }

    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn records_mut(&mut self) -> Result<&mut [Entity]> {
        self.load()?;
        Ok(&mut self.records)
    }

    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn into_vec(mut self) -> Result<Vec<Entity>> {
        self.load()?;
        Ok(self.records)
    }

    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn get(&mut self, index: usize) -> Result<Option<&Entity>> {
        self.load()?;
        Ok(self.records.get(index))
    }

    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn first(&mut self) -> Result<Option<&Entity>> {
        self.get(0)
    }

    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn ids(&mut self) -> Result<Vec<i64>> {
        self.load()?;
        Ok(self.records.iter().map(Entity::id).collect())
    }

    /// Visit every entity in order until `visit` returns `false`.
    ///
    /// Unloaded collections are streamed page by page; changes made to
    /// streamed entities are not kept by the collection.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures and the first error returned by `visit`.
    pub fn for_each<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &mut Entity) -> Result<bool>,
    {
        if self.loaded {
            for (index, entity) in self.records.iter_mut().enumerate() {
                if !visit(index, entity)? {
                    break;
                }
            }
            return Ok(());
        }
        for (index, entity) in self.stream()?.enumerate() {
            let mut entity = entity?;
            if !visit(index, &mut entity)? {
                break;
            }
        }
        Ok(())
    }

    /// Save every loaded entity
    ///
    /// # Errors
    ///
    /// Stops at the first failing save.
    pub fn save(&mut self, test_relations: bool) -> Result<()> {
        for entity in &mut self.records {
            entity.save(test_relations)?;
        }
        Ok(())
    }

    /// Entities matching `condition`, as a new loaded collection
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` for raw SQL conditions.
    pub fn filter(&mut self, condition: impl IntoCondition) -> Result<Collection> {
        let condition = condition.into_condition();
        let mut matched = Vec::new();
        self.for_each(|_, entity| {
            if entity.is_match(&condition)? {
                matched.push(entity.clone());
            }
            Ok(true)
        })?;
        Ok(self.derived(matched))
    }

    /// First entity matching `condition`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` for raw SQL conditions.
    pub fn filter_first(&mut self, condition: impl IntoCondition) -> Result<Option<Entity>> {
        let condition = condition.into_condition();
        let mut found = None;
        self.for_each(|_, entity| {
            if entity.is_match(&condition)? {
                found = Some(entity.clone());
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// Entities accepted by `predicate`, as a new loaded collection
    ///
    /// # Errors
    ///
    /// Propagates fetch failures.
    pub fn filter_with<F>(&mut self, mut predicate: F) -> Result<Collection>
    where
        F: FnMut(&Entity) -> bool,
    {
        let mut matched = Vec::new();
        self.for_each(|_, entity| {
            if predicate(entity) {
                matched.push(entity.clone());
            }
            Ok(true)
        })?;
        Ok(self.derived(matched))
    }

    /// # Errors
    ///
    /// Propagates fetch failures.
    pub fn filter_first_with<F>(&mut self, mut predicate: F) -> Result<Option<Entity>>
    where
        F: FnMut(&Entity) -> bool,
    {
        let mut found = None;
        self.for_each(|_, entity| {
            if predicate(entity) {
                found = Some(entity.clone());
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// Remove and return the first entity
    ///
    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn shift(&mut self) -> Result<Option<Entity>> {
        self.remove(0)
    }

    /// Remove and return the entity at `index`; `None` when out of range
    ///
    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn remove(&mut self, index: usize) -> Result<Option<Entity>> {
        self.load()?;
        let entity = (index < self.records.len()).then(|| self.records.remove(index));
        self.count = Some(self.records.len() as u64);
        Ok(entity)
    }

    /// Remove and return the last entity
    ///
    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn pop(&mut self) -> Result<Option<Entity>> {
        self.load()?;
        let entity = self.records.pop();
        self.count = Some(self.records.len() as u64);
        Ok(entity)
    }

    /// Insert at the front without persisting
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when `entity` is of another kind.
    pub fn prepend(&mut self, entity: Entity) -> Result<&mut Self> {
        self.check_kind(&entity)?;
        self.load()?;
        self.records.insert(0, entity);
        self.count = Some(self.records.len() as u64);
        Ok(self)
    }

    /// Push at the back without persisting
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when `entity` is of another kind.
    pub fn append(&mut self, entity: Entity) -> Result<&mut Self> {
        self.check_kind(&entity)?;
        self.load()?;
        self.records.push(entity);
        self.count = Some(self.records.len() as u64);
        Ok(self)
    }

    /// Up to `count` entities starting at `from`, as a new loaded collection
    ///
    /// # Errors
    ///
    /// Same as [`Collection::load`].
    pub fn slice(&mut self, count: usize, from: usize) -> Result<Collection> {
        self.load()?;
        let start = from.min(self.records.len());
        let end = start.saturating_add(count).min(self.records.len());
        Ok(self.derived(self.records[start..end].to_vec()))
    }

    /// Field maps of every entity; see [`Entity::to_field_map`]
    ///
    /// # Errors
    ///
    /// Propagates fetch and getter failures.
    pub fn to_field_maps(&mut self, needed: &[&str]) -> Result<Vec<FieldMap>> {
        let mut maps = Vec::new();
        self.for_each(|_, entity| {
            maps.push(entity.to_field_map(needed)?);
            Ok(true)
        })?;
        Ok(maps)
    }

    /// Store every entity and the id list under `key` in the cache provider.
    ///
    /// Transient entities are saved first.
    ///
    /// # Errors
    ///
    /// Propagates save and cache provider failures.
    pub fn cache(&mut self, key: &str, ttl: Option<Duration>) -> Result<&mut Self> {
        let registry = std::sync::Arc::clone(self.kind.registry());
        let Some(cache) = registry.cache() else {
            return Ok(self);
        };
        let ttl = ttl.or_else(|| registry.config().cache.ttl_seconds.map(Duration::from_secs));
        self.load()?;
        let mut ids = Vec::with_capacity(self.records.len());
        for entity in &mut self.records {
            entity.cache(ttl)?;
            ids.push(entity.id());
        }
        cache.store_record_set(self.kind.name(), key, &ids, ttl)?;
        Ok(self)
    }

    /// Add `entry` to the relation this collection was loaded from, and persist.
    ///
    /// The initiator must already be stored: the collection only holds a copy
    /// of it, so saving that copy would leave the owning entity transient. Use
    /// [`Entity::add_related`], which saves the owner first. On a plain
    /// has-many relation the entry's foreign key is pointed at the initiator
    /// and the entry saved.
    /// On a through relation the entry is saved if transient, then a join row
    /// is created, or reused when the relation is unique; its counter column
    /// is set to 1 on creation and incremented on reuse.
    ///
    /// # Errors
    ///
    /// * `OrmError::InvalidArgument` - no initiator, a transient initiator,
    ///   wrong entry kind, or the initiator's kind has no has-many relation
    ///   with this kind
    /// * `OrmError::Driver` - a statement failed
    pub fn add(&mut self, entry: &mut Entity) -> Result<()> {
        self.check_kind(entry)?;
        let Some(initiator) = self.initiator.as_deref() else {
            return Err(OrmError::InvalidArgument(format!(
                "can't add {} to a collection without an initiator",
                entry.kind_name()
            )));
        };
        if initiator.id() == 0 {
            return Err(OrmError::InvalidArgument(format!(
                "{} is not saved yet; add {} through Entity::add_related",
                initiator.kind_name(),
                entry.kind_name()
            )));
        }
        let registry = std::sync::Arc::clone(self.kind.registry());
        let source = initiator.kind_name().to_string();
        let target = self.kind.name().to_string();
        if registry.relation_type_with(&source, &target)? != RelationType::HasMany {
            return Err(OrmError::InvalidArgument(format!(
                "{source} has no has-many relation with {target}"
            )));
        }
        let params = registry.relation_params_with(&source, &target)?;

        let Some(through) = &params.through else {
            let fk = params.foreign_key.clone().unwrap_or_default();
            entry.set(&fk, initiator.id())?;
            entry.save(true)?;
            self.count = None;
            if self.loaded {
                self.records.push(entry.clone());
                self.count = Some(self.records.len() as u64);
            }
            return Ok(());
        };

        if entry.id() == 0 {
            entry.save(true)?;
        }
        let join_kind = registry.kind(through)?;
        let source_key = join_key(&registry.relation_params_with(&source, through)?, &source, through)?;
        let target_key = join_key(&registry.relation_params_with(&target, through)?, &target, through)?;
        let existing = if params.unique {
            join_kind.find_first(
                Condition::and([
                    Condition::equals(&source_key, initiator.id()),
                    Condition::equals(&target_key, entry.id()),
                ]),
                None,
            )?
        } else {
            None
        };
        let fresh = existing.is_none();
        let mut join = match existing {
            Some(join) => join,
            None => {
                let mut join = join_kind.new_entity();
                join.set(&target_key, entry.id())?;
                join.set(&source_key, initiator.id())?;
                join
            }
        };
        if let Some(counter) = &params.counter {
            let next = if fresh {
                1
            } else {
                join.value(counter)?.as_i64().unwrap_or(0) + 1
            };
            join.set(counter, next)?;
        }
        self.reload();
        join.save(true)?;
        Ok(())
    }

    /// [`Collection::add`] for every entity of `entries`, in order
    ///
    /// # Errors
    ///
    /// Stops at the first failing add.
    pub fn add_all(&mut self, entries: &mut [Entity]) -> Result<()> {
        for entry in entries {
            self.add(entry)?;
        }
        Ok(())
    }

    /// [`Collection::add`] for every entity of another collection
    ///
    /// # Errors
    ///
    /// Stops at the first failing add.
    pub fn add_collection(&mut self, other: &mut Collection) -> Result<()> {
        other.load()?;
        for entry in &mut other.records {
            self.add(entry)?;
        }
        Ok(())
    }

    /// Lazy iterator over the entities.
    ///
    /// Loaded collections iterate their rows. Condition, SQL and relation
    /// sources are fetched in pages of `orm.portion_size` rows, honoring the
    /// source's own window. Cached sources, and SQL whose trailing `LIMIT`
    /// is a bound parameter, are loaded first.
    ///
    /// # Errors
    ///
    /// Returns the load error of those sources.
    pub fn stream(&mut self) -> Result<Stream<'_>> {
        let load_first = match &self.source {
            Source::Cache { .. } => true,
            Source::Sql { sql, .. } => sql::has_placeholder_limit(sql),
            _ => false,
        };
        if load_first {
            self.load()?;
        }
        Ok(Stream::new(self))
    }

    /// Window of the source itself, used as bounds by the pager
    pub(crate) fn source_window(&self) -> Option<Limit> {
        match &self.source {
            Source::Condition { limit, .. } => *limit,
            Source::Sql { sql, .. } => sql::extract_limit(sql).1,
            _ => None,
        }
    }

    /// Fetch `count` rows starting at `from`
    pub(crate) fn fetch_page(&self, from: u64, count: u64) -> Result<Vec<Entity>> {
        let window = Limit::range(from, count);
        let rows = match &self.source {
            Source::Condition { condition, order, .. } => {
                self.kind.rows(condition.as_ref(), order.as_ref(), Some(window))?
            }
            Source::Sql { sql, params } => {
                let (unlimited, _) = sql::extract_limit(sql);
                let query = format!("{} LIMIT {}", unlimited.trim_end().trim_end_matches(';'), window.to_sql());
                self.kind.registry().adapter().fetch_rows(&query, params)?
            }
            Source::Relation => self.relation_rows(Some(window))?,
            Source::Cache { .. } | Source::Filter => {
                let (start, end) = window.bounds(self.records.len());
                return Ok(self.records[start..end].to_vec());
            }
        };
        Ok(self.kind.materialize(rows))
    }

    fn check_kind(&self, entity: &Entity) -> Result<()> {
        if entity.kind_name() == self.kind.name() {
            return Ok(());
        }
        Err(OrmError::InvalidArgument(format!(
            "can't put {} into a collection of {}",
            entity.kind_name(),
            self.kind.name()
        )))
    }

    fn cached_rows(&self, ids: &[i64]) -> Result<Vec<FieldMap>> {
        let registry = self.kind.registry();
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let cached = match registry.cache() {
                Some(cache) => cache.get_record(self.kind.name(), *id)?,
                None => None,
            };
            match cached {
                Some(row) => rows.push(row),
                None => {
                    log::warn!("{} #{id} missing from cache, reading the store", self.kind.name());
                    let fresh = self
                        .kind
                        .rows(Some(&Condition::equals("id", *id)), None, Some(Limit::count(1)))?;
                    rows.extend(fresh);
                }
            }
        }
        Ok(rows)
    }

    fn relation_plan(&self) -> Result<RelationPlan> {
        let initiator = self.initiator.as_deref().ok_or_else(|| {
            OrmError::InvalidArgument(format!(
                "collection of {} has no initiator to load relations from",
                self.kind.name()
            ))
        })?;
        let registry = self.kind.registry();
        let source = initiator.kind_name();
        let target = self.kind.name();
        let params = registry.relation_params_with(source, target)?;

        match &params.through {
            Some(through) => {
                let target_params = registry.relation_params_with(target, through)?;
                let source_params = registry.relation_params_with(source, through)?;
                let source_key = join_key(&source_params, source, through)?;
                let mut condition = Condition::equals(&source_key, initiator.id());
                if let Some(extra) = source_params.condition {
                    condition = condition.and_also(extra);
                }
                Ok(RelationPlan::Join {
                    through_table: registry.register(through)?.table.clone(),
                    target_key: join_key(&target_params, target, through)?,
                    condition,
                })
            }
            None => {
                let fk = params.foreign_key.clone().unwrap_or_default();
                let mut condition = Condition::equals(&fk, initiator.id());
                if let Some(extra) = params.condition {
                    condition = condition.and_also(extra);
                }
                Ok(RelationPlan::Direct(condition))
            }
        }
    }

    fn relation_rows(&self, window: Option<Limit>) -> Result<Vec<FieldMap>> {
        let order = OrderBy::asc("id");
        match self.relation_plan()? {
            RelationPlan::Direct(condition) => self.kind.rows(Some(&condition), Some(&order), window),
            RelationPlan::Join {
                through_table,
                target_key,
                condition,
            } => {
                let adapter = self.kind.registry().adapter();
                let query = sql::select_join_query(
                    self.kind.table(),
                    &through_table,
                    &target_key,
                    Some(&condition),
                    Some(&order),
                    window,
                    adapter.dialect(),
                );
                adapter.fetch_rows(&query, &Params::None)
            }
        }
    }

    fn relation_count(&self) -> Result<u64> {
        match self.relation_plan()? {
            RelationPlan::Direct(condition) => self.kind.count(Some(&condition)),
            RelationPlan::Join {
                through_table,
                target_key,
                condition,
            } => {
                let adapter = self.kind.registry().adapter();
                let query = sql::count_join_query(
                    self.kind.table(),
                    &through_table,
                    &target_key,
                    Some(&condition),
                    adapter.dialect(),
                );
                Ok(adapter
                    .fetch_single_value(&query, &Params::None)?
                    .and_then(|v: FieldValue| v.as_i64())
                    .map_or(0, |n| u64::try_from(n).unwrap_or(0)))
            }
        }
    }
}

fn join_key(params: &crate::registry::HasMany, kind: &str, through: &str) -> Result<String> {
    params.foreign_key.clone().ok_or_else(|| {
        OrmError::InvalidArgument(format!("{kind} has no foreign key on {through}"))
    })
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &self.kind.name())
            .field("source", &self.source)
            .field("loaded", &self.loaded)
            .field("count", &self.count)
            .field("records", &self.records.len())
            .field("initiator", &self.initiator.as_ref().map(|e| (e.kind_name().to_string(), e.id())))
            .finish()
    }
}
