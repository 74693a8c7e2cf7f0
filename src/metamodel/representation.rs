use std::fmt;
use crate::instance::{CompositeValue, EntityInstance, ObjectValue};
use super::{ManagedTypeDescriptor, PersistentAttribute};

/// How instances of a managed type are created and how their properties
/// are read and written.
pub trait RepresentationStrategy: fmt::Debug + Send + Sync {
    fn instantiate(&self, descriptor: &ManagedTypeDescriptor) -> EntityInstance;

    fn get_identifier(&self, instance: &EntityInstance) -> Option<ObjectValue>;

    fn set_identifier(&self, instance: &EntityInstance, identifier: ObjectValue);

    fn get_property(&self, instance: &EntityInstance, attribute: &PersistentAttribute) -> ObjectValue;

    fn set_property(&self, instance: &EntityInstance, attribute: &PersistentAttribute, value: ObjectValue);

    fn instantiate_composite(
        &self,
        embeddable: &ManagedTypeDescriptor,
        values: Vec<ObjectValue>,
    ) -> ObjectValue {
        ObjectValue::Composite(CompositeValue::new(&embeddable.name, values))
    }

    /// Inject a full state array through the property setters.
    fn inject_state(
        &self,
        instance: &EntityInstance,
        descriptor: &ManagedTypeDescriptor,
        state: &[ObjectValue],
    ) {
        for attribute in descriptor.attributes() {
            let value = state.get(attribute.position).cloned().unwrap_or(ObjectValue::Null);
            self.set_property(instance, attribute, value);
        }
    }

    fn extract_state(
        &self,
        instance: &EntityInstance,
        descriptor: &ManagedTypeDescriptor,
    ) -> Vec<ObjectValue> {
        descriptor
            .attributes()
            .iter()
            .map(|attribute| self.get_property(instance, attribute))
            .collect()
    }
}

/// Dynamic-map representation: instances are property maps keyed by
/// attribute name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicMapRepresentation;

impl RepresentationStrategy for DynamicMapRepresentation {
    fn instantiate(&self, descriptor: &ManagedTypeDescriptor) -> EntityInstance {
        EntityInstance::new(&descriptor.name)
    }

    fn get_identifier(&self, instance: &EntityInstance) -> Option<ObjectValue> {
        instance.identifier()
    }

    fn set_identifier(&self, instance: &EntityInstance, identifier: ObjectValue) {
        instance.set_identifier(identifier);
    }

    fn get_property(&self, instance: &EntityInstance, attribute: &PersistentAttribute) -> ObjectValue {
        instance.get(&attribute.name).unwrap_or(ObjectValue::Null)
    }

    fn set_property(&self, instance: &EntityInstance, attribute: &PersistentAttribute, value: ObjectValue) {
        instance.set(&attribute.name, value);
    }
}
