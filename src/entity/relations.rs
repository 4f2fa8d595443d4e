//! Relation traversal and assignment on a single entity.

use super::{Entity, Related};
use crate::collection::Collection;
use crate::condition::Condition;
use crate::error::{OrmError, Result};
use crate::registry::RelationType;
use std::sync::Arc;

impl Entity {
    /// Related entity or collection of kind `kind`, cached on first use.
    ///
    /// For a belongs-to relation this is the parent row (`None` while the
    /// foreign key is unset); for has-many and through relations a lazy
    /// collection whose initiator is this entity. On a self-relation the
    /// has-many side wins; use [`Entity::parent`] for the other direction.
    ///
    /// # Errors
    ///
    /// * `OrmError::RelationUndefined` - the kinds are unrelated
    /// * `OrmError::NotFound` - the foreign key points at a missing row
    pub fn load_foreign(&mut self, kind: &str) -> Result<Related> {
        if let Some(related) = self.foreign.get(kind) {
            return Ok(related.clone());
        }
        let registry = Arc::clone(self.kind.registry());
        let related = match registry.relation_type_with(self.kind_name(), kind)? {
            RelationType::BelongsTo => {
                let params = registry.relation_params_with(self.kind_name(), kind)?;
                let fk = params.foreign_key.ok_or_else(|| {
                    OrmError::InvalidArgument(format!(
                        "{} reaches {kind} only through a join kind; load it from {kind}",
                        self.kind_name()
                    ))
                })?;
                Related::One(self.load_by_key(kind, &fk)?.map(Box::new))
            }
            RelationType::HasMany => {
                Related::Many(Collection::from_relation(registry.kind(kind)?, self.detached())?)
            }
            RelationType::None => {
                return Err(OrmError::RelationUndefined {
                    from: self.kind_name().to_string(),
                    to: kind.to_string(),
                })
            }
        };
        self.foreign.insert(kind.to_string(), related.clone());
        Ok(related)
    }

    /// Cached has-many collection of kind `kind`, mutable in place
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when `kind` is not a has-many relation.
    pub fn many(&mut self, kind: &str) -> Result<&mut Collection> {
        if !matches!(self.foreign.get(kind), Some(Related::Many(_))) {
            self.foreign.remove(kind);
            if let Related::One(_) = self.load_foreign(kind)? {
                return Err(OrmError::InvalidArgument(format!(
                    "{} belongs to {kind}; it has no collection of them",
                    self.kind_name()
                )));
            }
        }
        let current = self.detached();
        let from = self.kind_name().to_string();
        match self.foreign.get_mut(kind) {
            Some(Related::Many(collection)) => {
                // built while this entity was transient
                if collection.initiator().map(Entity::id) != Some(current.id()) {
                    collection.set_initiator(current);
                    collection.reload();
                }
                Ok(collection)
            }
            _ => Err(OrmError::RelationUndefined {
                from,
                to: kind.to_string(),
            }),
        }
    }

    /// Parent of kind `kind` along the declared belongs-to foreign key
    ///
    /// # Errors
    ///
    /// * `OrmError::RelationUndefined` - no belongs-to relation with `kind`
    /// * `OrmError::NotFound` - the foreign key points at a missing row
    pub fn parent(&self, kind: &str) -> Result<Option<Entity>> {
        let fk = self.belongs_to_key(kind)?;
        self.load_by_key(kind, &fk)
    }

    /// Point this entity's belongs-to foreign key at `parent`.
    ///
    /// A transient parent is saved first.
    ///
    /// # Errors
    ///
    /// * `OrmError::InvalidArgument` - `parent` is not of kind `kind`
    /// * `OrmError::RelationUndefined` - no belongs-to relation with `kind`
    pub fn set_parent(&mut self, kind: &str, parent: &mut Entity) -> Result<&mut Self> {
        if parent.kind_name() != kind {
            return Err(OrmError::InvalidArgument(format!(
                "can't use {} as related {kind}",
                parent.kind_name()
            )));
        }
        let fk = self.belongs_to_key(kind)?;
        if parent.id() == 0 {
            parent.save(true)?;
        }
        let relation = self
            .kind
            .registry()
            .relation_type_with(self.kind_name(), kind)?;
        if relation == RelationType::BelongsTo {
            self.foreign
                .insert(kind.to_string(), Related::One(Some(Box::new(parent.detached()))));
        }
        self.set(&fk, parent.id())?;
        Ok(self)
    }

    /// Point every child's foreign key at this entity. Children are not saved.
    ///
    /// A transient entity is saved first so the children have an id to point at.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` for through relations, which are
    /// managed with [`Entity::add_related`].
    pub fn assign_children(&mut self, kind: &str, children: &mut [Entity]) -> Result<()> {
        let registry = Arc::clone(self.kind.registry());
        if registry.relation_type_with(self.kind_name(), kind)? != RelationType::HasMany {
            return Err(OrmError::RelationUndefined {
                from: self.kind_name().to_string(),
                to: kind.to_string(),
            });
        }
        let params = registry.relation_params_with(self.kind_name(), kind)?;
        let Some(fk) = params.foreign_key else {
            return Err(OrmError::InvalidArgument(format!(
                "{} reaches {kind} through a join kind; add entries instead",
                self.kind_name()
            )));
        };
        if self.id() == 0 {
            self.save(true)?;
        }
        let id = self.id();
        for child in children.iter_mut() {
            if child.kind_name() != kind {
                return Err(OrmError::InvalidArgument(format!(
                    "can't assign {} as {kind}",
                    child.kind_name()
                )));
            }
            child.set(&fk, id)?;
        }
        self.foreign.remove(kind);
        Ok(())
    }

    /// Assign related entities by property name, e.g. `"item"` or `"sub_items"`.
    ///
    /// The name is singularized and matched against the related kinds,
    /// has-many first. A has-many match points every entry at this entity
    /// (see [`Entity::assign_children`]); a belongs-to match takes the single
    /// entry as parent (see [`Entity::set_parent`]).
    ///
    /// # Errors
    ///
    /// * `OrmError::RelationUndefined` - the name matches no related kind
    /// * `OrmError::InvalidArgument` - not exactly one entry for a belongs-to
    ///   relation, or an entry of the wrong kind
    pub fn set_related(&mut self, name: &str, entries: &mut [Entity]) -> Result<&mut Self> {
        let Some(kind) = self.related_kind_for(name) else {
            return Err(OrmError::RelationUndefined {
                from: self.kind_name().to_string(),
                to: name.to_string(),
            });
        };
        let registry = Arc::clone(self.kind.registry());
        if registry.relation_type_with(self.kind_name(), &kind)? == RelationType::HasMany {
            self.assign_children(&kind, entries)?;
            return Ok(self);
        }
        match entries {
            [parent] => self.set_parent(&kind, parent),
            _ => Err(OrmError::InvalidArgument(format!(
                "{name} takes exactly one {kind}, got {}",
                entries.len()
            ))),
        }
    }

    /// Add `entry` to the has-many (or through) relation with `kind` and persist it.
    ///
    /// A transient entity is saved first.
    ///
    /// # Errors
    ///
    /// See [`Collection::add`].
    pub fn add_related(&mut self, kind: &str, entry: &mut Entity) -> Result<()> {
        if self.id() == 0 {
            self.save(true)?;
        }
        self.many(kind)?.add(entry)
    }

    /// Children on the kind's self-relation
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when the kind has no self-relation.
    pub fn children(&mut self) -> Result<Collection> {
        let kind = self.kind_name().to_string();
        self.many(&kind).map(|c| c.clone())
    }

    /// # Errors
    ///
    /// Same as [`Entity::children`], plus query failures.
    pub fn has_children(&mut self) -> Result<bool> {
        let kind = self.kind_name().to_string();
        Ok(self.many(&kind)?.count()? > 0)
    }

    /// Check that every belongs-to foreign key points at an existing row.
    ///
    /// Self-relations and unset keys (`0` or `NULL`) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::RelatedMissing` for the first dangling key.
    pub fn check_foreign_keys(&self) -> Result<()> {
        let registry = self.kind.registry();
        for (kind, fk) in &self.kind.metadata().belongs_to {
            if kind == self.kind_name() {
                continue;
            }
            let id = self.raw(fk).as_id();
            if id <= 0 {
                continue;
            }
            let parent = registry.kind(kind)?;
            if parent.count(Some(&Condition::equals("id", id)))? == 0 {
                return Err(OrmError::RelatedMissing {
                    kind: self.kind_name().to_string(),
                    related: kind.clone(),
                    foreign_key: fk.clone(),
                    id,
                });
            }
        }
        Ok(())
    }

    fn belongs_to_key(&self, kind: &str) -> Result<String> {
        if let Some(fk) = self.kind.metadata().belongs_to_key(kind) {
            return Ok(fk.to_string());
        }
        let registry = self.kind.registry();
        if registry.relation_type_with(self.kind_name(), kind)? == RelationType::BelongsTo {
            if let Some(fk) = registry.relation_params_with(self.kind_name(), kind)?.foreign_key {
                return Ok(fk);
            }
        }
        Err(OrmError::RelationUndefined {
            from: self.kind_name().to_string(),
            to: kind.to_string(),
        })
    }

    fn load_by_key(&self, kind: &str, fk: &str) -> Result<Option<Entity>> {
        let id = self.value(fk)?.as_id();
        if id <= 0 {
            return Ok(None);
        }
        self.kind.registry().kind(kind)?.load(id).map(Some)
    }
}
