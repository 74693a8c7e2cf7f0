//! Pre-load / post-load listener registry.

use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use crate::context::EntityKey;
use crate::core::Result;
use crate::instance::{EntityInstance, ObjectValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Fired before the loaded state is injected into the instance
    PreLoad,
    /// Fired once the state is injected and its snapshot taken
    PostLoad,
}

/// Load of one entity during the two-phase load pass.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub event_type: EventType,
    pub entity_name: String,
    pub key: EntityKey,
    pub instance: EntityInstance,
    /// Live state array, indexed by state-array position.
    pub state: Rc<Vec<ObjectValue>>,
}

pub trait LoadEventListener: fmt::Debug {
    fn name(&self) -> &str;

    fn on_load(&self, event: &LoadEvent) -> Result<()>;
}

/// Listeners grouped by event type, invoked in registration order.
#[derive(Debug, Default, Clone)]
pub struct EventListenerRegistry {
    listeners: HashMap<EventType, Vec<Rc<dyn LoadEventListener>>>,
}

impl EventListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_type: EventType, listener: Rc<dyn LoadEventListener>) {
        trace!("Registered {:?} listener: {}", event_type, listener.name());
        self.listeners.entry(event_type).or_default().push(listener);
    }

    pub fn listeners(&self, event_type: EventType) -> &[Rc<dyn LoadEventListener>] {
        self.listeners.get(&event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_listeners(&self, event_type: EventType) -> bool {
        !self.listeners(event_type).is_empty()
    }

    /// Dispatch to every listener of the event's type. A listener error aborts the load.
    pub fn fire(&self, event: &LoadEvent) -> Result<()> {
        for listener in self.listeners(event.event_type) {
            listener.on_load(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Identifier, OrmError, Value};
    use crate::metamodel::ManagedTypeId;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct Recorder {
        seen: RefCell<Vec<String>>,
    }

    impl LoadEventListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_load(&self, event: &LoadEvent) -> Result<()> {
            self.seen.borrow_mut().push(format!("{:?} {}", event.event_type, event.key));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Veto;

    impl LoadEventListener for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn on_load(&self, _event: &LoadEvent) -> Result<()> {
            Err(OrmError::ExecutionError("vetoed".into()))
        }
    }

    fn event(event_type: EventType) -> LoadEvent {
        LoadEvent {
            event_type,
            entity_name: "Point".into(),
            key: EntityKey::new(Identifier::Simple(Value::Integer(1)), ManagedTypeId(0), ManagedTypeId(0), "Point"),
            instance: EntityInstance::new("Point"),
            state: Rc::new(Vec::new()),
        }
    }

    #[test]
    fn test_dispatch_by_event_type() {
        let recorder = Rc::new(Recorder::default());
        let mut registry = EventListenerRegistry::new();
        registry.register(EventType::PostLoad, recorder.clone());

        registry.fire(&event(EventType::PreLoad)).unwrap();
        registry.fire(&event(EventType::PostLoad)).unwrap();

        assert_eq!(*recorder.seen.borrow(), vec!["PostLoad Point#1".to_string()]);
        assert!(!registry.has_listeners(EventType::PreLoad));
    }

    #[test]
    fn test_listener_error_propagates() {
        let mut registry = EventListenerRegistry::new();
        registry.register(EventType::PreLoad, Rc::new(Veto));
        assert!(registry.fire(&event(EventType::PreLoad)).is_err());
    }
}
