use std::fmt;
use crate::context::EntityKey;
use crate::instance::{EntityInstance, ObjectValue};
use crate::metamodel::ManagedTypeId;
use crate::shape::FrameId;

/// Outcome of key resolution for one entity frame of the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Unstarted,
    /// Identifier columns were all null: no entity on this row.
    Missing,
    /// Already managed by the persistence context; its state is not re-read.
    FoundInContext,
    /// Instantiated (or refreshed) by this row, which supplies its state.
    ResolvedNew,
    /// Adopted from an entry another row or frame registered in this traversal.
    Loading,
}

impl FrameState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unstarted | Self::Missing)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "UNSTARTED"),
            Self::Missing => write!(f, "MISSING"),
            Self::FoundInContext => write!(f, "FOUND_IN_CONTEXT"),
            Self::ResolvedNew => write!(f, "RESOLVED_NEW"),
            Self::Loading => write!(f, "LOADING"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityFrame {
    pub state: FrameState,
    pub key: Option<EntityKey>,
    /// Concrete type, resolved from the discriminator or subclass keys.
    pub concrete: Option<ManagedTypeId>,
    pub instance: Option<EntityInstance>,
    pub(crate) assembled: bool,
}

impl EntityFrame {
    pub fn value(&self) -> ObjectValue {
        match (&self.state, &self.instance) {
            (state, Some(instance)) if state.is_resolved() => ObjectValue::Entity(instance.clone()),
            _ => ObjectValue::Null,
        }
    }
}

/// Per-row mutable state of the frames of one query shape. The shape itself
/// stays immutable; everything a row produces lives here and is reset
/// before the next row.
#[derive(Debug, Default)]
pub struct RowContext {
    entities: Vec<EntityFrame>,
    collections: Vec<Option<ObjectValue>>,
}

impl RowContext {
    pub fn new(entity_frames: usize, collection_frames: usize) -> Self {
        Self {
            entities: vec![EntityFrame::default(); entity_frames],
            collections: vec![None; collection_frames],
        }
    }

    pub fn reset(&mut self) {
        self.entities.iter_mut().for_each(|frame| *frame = EntityFrame::default());
        self.collections.iter_mut().for_each(|frame| *frame = None);
    }

    pub fn entity(&self, frame: FrameId) -> Option<&EntityFrame> {
        self.entities.get(frame)
    }

    pub(crate) fn entity_mut(&mut self, frame: FrameId) -> Option<&mut EntityFrame> {
        self.entities.get_mut(frame)
    }

    pub(crate) fn collection(&self, frame: FrameId) -> Option<&ObjectValue> {
        self.collections.get(frame).and_then(Option::as_ref)
    }

    pub(crate) fn set_collection(&mut self, frame: FrameId, value: ObjectValue) {
        if let Some(slot) = self.collections.get_mut(frame) {
            *slot = Some(value);
        }
    }
}
