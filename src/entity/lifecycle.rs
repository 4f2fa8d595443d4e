//! Save, drop and reload, with triggers and denormalized counters.

use super::Entity;
use crate::adapter::{with_transaction, Params};
use crate::condition::Condition;
use crate::error::{OrmError, Result};
use crate::registry::{RelationType, Trigger, TriggerEvent, TriggerOutcome};
use crate::sql::quote_identifier;
use crate::value::FieldValue;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// What a save or drop actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Statements were issued
    Applied,
    /// Nothing to do: no pending change, or no id to delete
    Unchanged,
    /// A trigger handler stopped the operation
    Vetoed,
}

impl Entity {
    /// Run every handler of `trigger` in registration order.
    ///
    /// # Errors
    ///
    /// Propagates the first handler failure.
    pub fn fire(&mut self, trigger: Trigger, changed: &[String], deleted_id: Option<i64>) -> Result<TriggerOutcome> {
        let handlers = self.kind.metadata().triggers(trigger);
        if handlers.is_empty() {
            return Ok(TriggerOutcome::Continue);
        }
        let event = TriggerEvent {
            trigger,
            changed: changed.to_vec(),
            deleted_id,
        };
        for handler in handlers {
            if handler(self, &event)? == TriggerOutcome::Stop {
                log::debug!("{:?} trigger on {} #{} stopped the chain", trigger, self.kind_name(), self.id());
                return Ok(TriggerOutcome::Stop);
            }
        }
        Ok(TriggerOutcome::Continue)
    }

    /// Persist pending changes.
    ///
    /// Transient entities are inserted, persisted ones updated with their
    /// changed columns only. Counter columns on parents are refreshed when a
    /// foreign key moved. Pending changes are folded into the snapshot before
    /// the `Saved` trigger runs.
    ///
    /// # Arguments
    ///
    /// * `test_relations` - check that every belongs-to foreign key points at
    ///   an existing row first
    ///
    /// # Returns
    ///
    /// `Outcome::Unchanged` when nothing was pending, `Outcome::Vetoed` when a
    /// trigger stopped the save.
    ///
    /// # Errors
    ///
    /// * `OrmError::RelatedMissing` - a foreign key is dangling
    /// * `OrmError::Driver` - a statement failed
    pub fn save(&mut self, test_relations: bool) -> Result<Outcome> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::lifecycle_span("save", self.kind_name(), self.id()).entered();

        let changed = self.changed_keys();
        if self.fire(Trigger::Save, &changed, None)? == TriggerOutcome::Stop {
            return Ok(Outcome::Vetoed);
        }
        if !self.was_changed() {
            return Ok(Outcome::Unchanged);
        }
        if test_relations {
            self.check_foreign_keys()?;
        }

        let stamps = self.kind.registry().config().orm.auto_timestamps;
        let now = FieldValue::Int(chrono::Utc::now().timestamp());
        let id = self.id();
        let adapter = Arc::clone(self.kind.registry().adapter());

        let completed = if id > 0 {
            let stamped = (stamps && self.has_own_field("updated_at"))
                .then(|| self.changed.insert("updated_at".to_string(), now));
            if self.fire(Trigger::SaveUpdate, &changed, None)? == TriggerOutcome::Stop {
                self.unstamp("updated_at", stamped);
                return Ok(Outcome::Vetoed);
            }
            let own = self.own_changes();
            if !own.is_empty() {
                let assignments = own
                    .keys()
                    .map(|k| format!("{}=?", quote_identifier(k)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {} SET {assignments} WHERE `id`=?",
                    quote_identifier(self.kind.table())
                );
                let mut values: Vec<FieldValue> = own.into_values().collect();
                values.push(FieldValue::Int(id));
                adapter.query(&sql, &Params::Positional(values))?;
            }
            Trigger::SaveUpdated
        } else {
            let stamped = (stamps
                && self.has_own_field("created_at")
                && !self.changed.contains_key("created_at"))
            .then(|| self.changed.insert("created_at".to_string(), now));
            if self.fire(Trigger::SaveCreate, &changed, None)? == TriggerOutcome::Stop {
                self.unstamp("created_at", stamped);
                return Ok(Outcome::Vetoed);
            }
            let new_id = adapter.insert(self.kind.table(), &self.own_changes())?;
            self.set_id(new_id);
            log::debug!("inserted {} #{new_id}", self.kind_name());
            Trigger::SaveCreated
        };

        self.update_counters(true)?;
        self.apply_changes();
        if self.kind.metadata().preload {
            self.kind.flush_preloaded();
        }
        self.fire(Trigger::Saved, &changed, None)?;
        self.fire(completed, &changed, None)?;
        Ok(Outcome::Applied)
    }

    /// Delete the row, cascading to has-many children.
    ///
    /// Children of through relations are left alone; the join rows belong to
    /// whichever kind declares a direct has-many of the join kind. The entity
    /// stays usable as a detached value with id `0`. With
    /// `orm.transactional_cascades` the whole cascade runs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when a statement fails. Without a
    /// transaction, rows deleted before the failure stay deleted.
    pub fn drop(&mut self) -> Result<Outcome> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::lifecycle_span("drop", self.kind_name(), self.id()).entered();

        let changed = self.changed_keys();
        if self.fire(Trigger::Delete, &changed, None)? == TriggerOutcome::Stop {
            return Ok(Outcome::Vetoed);
        }
        let id = self.id();
        if id <= 0 {
            return Ok(Outcome::Unchanged);
        }
        if self.kind.registry().config().orm.transactional_cascades {
            let adapter = Arc::clone(self.kind.registry().adapter());
            with_transaction(adapter.as_ref(), || self.delete_cascade(id))?;
        } else {
            self.delete_cascade(id)?;
        }
        self.fire(Trigger::Deleted, &changed, Some(id))?;
        Ok(Outcome::Applied)
    }

    fn delete_cascade(&mut self, id: i64) -> Result<()> {
        let registry = Arc::clone(self.kind.registry());
        for kind in registry.class_relations(self.kind_name(), RelationType::HasMany)? {
            let through = self
                .kind
                .metadata()
                .has_many_params(&kind)
                .is_some_and(|p| p.is_through());
            if through {
                continue;
            }
            let mut children = self.many(&kind)?.clone();
            children.reload();
            for child in children.records_mut()? {
                child.drop()?;
            }
        }

        let sql = format!("DELETE FROM {} WHERE `id`=?", quote_identifier(self.kind.table()));
        registry.adapter().query(&sql, &Params::positional([id]))?;
        log::debug!("deleted {} #{id}", self.kind_name());

        self.update_counters(false)?;
        self.set_id(0);
        self.foreign.clear();
        if self.kind.metadata().preload {
            self.kind.flush_preloaded();
        }
        Ok(())
    }

    /// Re-read the row and discard pending changes and related caches
    ///
    /// # Errors
    ///
    /// Returns `OrmError::NotFound` when the row is gone.
    pub fn reload(&mut self) -> Result<&mut Self> {
        let id = self.id();
        if id <= 0 {
            return Ok(self);
        }
        let rows = self
            .kind
            .rows(Some(&Condition::equals("id", id)), None, Some(crate::sql::Limit::count(1)))?;
        let row = rows.into_iter().next().ok_or_else(|| OrmError::NotFound {
            kind: self.kind_name().to_string(),
            id,
        })?;
        self.fields = row;
        self.changed.clear();
        self.foreign.clear();
        Ok(self)
    }

    /// Store the current field map in the cache provider, saving first when transient
    ///
    /// # Errors
    ///
    /// Propagates save and cache provider failures. Without a cache provider
    /// this only saves.
    pub fn cache(&mut self, ttl: Option<Duration>) -> Result<&mut Self> {
        if self.id() == 0 {
            self.save(true)?;
        }
        let registry = Arc::clone(self.kind.registry());
        let Some(cache) = registry.cache() else {
            return Ok(self);
        };
        let ttl = ttl.or_else(|| registry.config().cache.ttl_seconds.map(Duration::from_secs));
        cache.store_record(self.kind_name(), self.id(), &self.to_field_map(&[])?, ttl)?;
        Ok(self)
    }

    /// Recount children on every parent whose foreign key this entity holds.
    ///
    /// With `only_moved`, parents whose key is not pending are skipped.
    /// Both the new and the previous parent are refreshed.
    fn update_counters(&self, only_moved: bool) -> Result<()> {
        let registry = self.kind.registry();
        let counters = registry.class_counters(self.kind_name(), None)?;
        for counter in counters {
            let pending = self.changed.get(&counter.foreign_key);
            if only_moved && pending.is_none() {
                continue;
            }
            let mut parents: Vec<i64> = pending
                .into_iter()
                .chain(self.fields.get(&counter.foreign_key))
                .map(FieldValue::as_id)
                .filter(|id| *id > 0)
                .collect();
            parents.dedup();

            let parent_table = registry.register(&counter.parent)?.table.clone();
            let sql = format!(
                "UPDATE {} SET {}=(SELECT COUNT(*) FROM (SELECT `id` FROM {} WHERE {}=?) AS counted) WHERE `id`=?",
                quote_identifier(&parent_table),
                quote_identifier(&counter.counter),
                quote_identifier(self.kind.table()),
                quote_identifier(&counter.foreign_key),
            );
            for parent in parents {
                registry
                    .adapter()
                    .query(&sql, &Params::positional([parent, parent]))?;
            }
        }
        Ok(())
    }

    /// Undo an automatic timestamp written before a vetoed save
    fn unstamp(&mut self, field: &str, stamped: Option<Option<FieldValue>>) {
        match stamped {
            Some(Some(previous)) => {
                self.changed.insert(field.to_string(), previous);
            }
            Some(None) => {
                self.changed.remove(field);
            }
            None => {}
        }
    }
}
