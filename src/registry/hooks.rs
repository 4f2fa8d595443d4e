//! Lifecycle triggers and property interceptors.

use crate::entity::Entity;
use crate::error::Result;
use crate::value::FieldValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle event a trigger can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Before any save; may veto
    Save,
    /// Before an UPDATE; may veto
    SaveUpdate,
    /// Before an INSERT; may veto
    SaveCreate,
    /// After any save
    Saved,
    /// After an UPDATE
    SaveUpdated,
    /// After an INSERT
    SaveCreated,
    /// Before a delete; may veto
    Delete,
    /// After a delete, with the removed id as payload
    Deleted,
}

impl Trigger {
    pub const ALL: [Trigger; 8] = [
        Trigger::Save,
        Trigger::SaveUpdate,
        Trigger::SaveCreate,
        Trigger::Saved,
        Trigger::SaveUpdated,
        Trigger::SaveCreated,
        Trigger::Delete,
        Trigger::Deleted,
    ];

    /// Whether a `Stop` from a handler aborts the surrounding operation
    pub fn can_veto(self) -> bool {
        matches!(
            self,
            Trigger::Save | Trigger::SaveUpdate | Trigger::SaveCreate | Trigger::Delete
        )
    }
}

/// What a trigger handler sees
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub trigger: Trigger,
    /// Field names pending when the operation started
    pub changed: Vec<String>,
    /// Id the row had before deletion (`Deleted` only)
    pub deleted_id: Option<i64>,
}

/// Handler verdict. `Stop` halts the remaining handlers and, for vetoable
/// triggers, aborts the operation without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerOutcome {
    #[default]
    Continue,
    Stop,
}

pub type TriggerFn = Arc<dyn Fn(&mut Entity, &TriggerEvent) -> Result<TriggerOutcome> + Send + Sync>;
pub type GetterFn = Arc<dyn Fn(&Entity, FieldValue) -> Result<FieldValue> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&mut Entity, FieldValue) -> Result<FieldValue> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    triggers: HashMap<Trigger, Vec<TriggerFn>>,
    getters: HashMap<String, Vec<GetterFn>>,
    setters: HashMap<String, Vec<SetterFn>>,
}

impl Hooks {
    pub(crate) fn add_trigger(&mut self, trigger: Trigger, callback: TriggerFn) {
        self.triggers.entry(trigger).or_default().push(callback);
    }

    pub(crate) fn add_getter(&mut self, property: &str, getter: GetterFn) {
        self.getters.entry(property.to_string()).or_default().push(getter);
    }

    pub(crate) fn add_setter(&mut self, property: &str, setter: SetterFn) {
        self.setters.entry(property.to_string()).or_default().push(setter);
    }

    pub(crate) fn triggers(&self, trigger: Trigger) -> Vec<TriggerFn> {
        self.triggers.get(&trigger).cloned().unwrap_or_default()
    }

    pub(crate) fn getters(&self, property: &str) -> Vec<GetterFn> {
        self.getters.get(property).cloned().unwrap_or_default()
    }

    pub(crate) fn setters(&self, property: &str) -> Vec<SetterFn> {
        self.setters.get(property).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_keep_registration_order() {
        let mut hooks = Hooks::default();
        hooks.add_getter("title", Arc::new(|_, v| Ok(FieldValue::from(format!("{v}a")))));
        hooks.add_getter("title", Arc::new(|_, v| Ok(FieldValue::from(format!("{v}b")))));
        assert_eq!(hooks.getters("title").len(), 2);
        assert!(hooks.getters("other").is_empty());
        assert!(hooks.setters("title").is_empty());
    }

    #[test]
    fn test_veto_capable_triggers() {
        let vetoable: Vec<Trigger> = Trigger::ALL.into_iter().filter(|t| t.can_veto()).collect();
        assert_eq!(
            vetoable,
            vec![Trigger::Save, Trigger::SaveUpdate, Trigger::SaveCreate, Trigger::Delete]
        );
    }
}
