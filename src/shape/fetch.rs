use crate::metamodel::{BasicValueConverter, CollectionId, ManagedTypeId, NotFoundAction};
use crate::relational::TableId;
use super::{NavigablePath, SqlSelection};

/// Index of an entity or collection frame in the per-row context.
pub type FrameId = usize;

/// Table aliases used by one fetch parent, one per table of its closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableGroup {
    aliases: Vec<(TableId, String)>,
}

impl TableGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, table: TableId, alias: String) {
        if self.alias_of(table).is_none() {
            self.aliases.push((table, alias));
        }
    }

    pub fn alias_of(&self, table: TableId) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, alias)| alias.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &(TableId, String)> {
        self.aliases.iter()
    }
}

/// Top-level element of a query's select clause.
#[derive(Debug, Clone)]
pub enum DomainResult {
    Basic(BasicFetch),
    Entity(EntityShape),
}

impl DomainResult {
    pub fn path(&self) -> &NavigablePath {
        match self {
            Self::Basic(basic) => &basic.path,
            Self::Entity(entity) => &entity.path,
        }
    }
}

/// An entity loaded from the current row: root result, joined to-one fetch
/// or collection element.
#[derive(Debug, Clone)]
pub struct EntityShape {
    pub path: NavigablePath,
    /// Declared type; rows may produce any type of its polymorphic closure.
    pub entity: ManagedTypeId,
    pub frame: FrameId,
    pub tables: TableGroup,
    pub identifier: Vec<SqlSelection>,
    pub discriminator: Option<SqlSelection>,
    /// First key column of each joined-subclass or table-per-class table, deepest subclasses last.
    pub subclass_keys: Vec<(ManagedTypeId, SqlSelection)>,
    pub tenant: Option<SqlSelection>,
    /// Fetches of the declared type's state array.
    pub fetches: Vec<Fetch>,
    /// Fetches added by each subtype level, keyed by the subtype.
    pub subtype_fetches: Vec<(ManagedTypeId, Vec<Fetch>)>,
}

impl EntityShape {
    pub fn subtype_level(&self, entity: ManagedTypeId) -> Option<&[Fetch]> {
        self.subtype_fetches
            .iter()
            .find(|(id, _)| *id == entity)
            .map(|(_, fetches)| fetches.as_slice())
    }
}

/// Describes how one navigable's value is obtained for a row.
#[derive(Debug, Clone)]
pub enum Fetch {
    Basic(BasicFetch),
    Composite(CompositeFetch),
    /// Joined to-one: the target entity is loaded from the same row.
    Entity(EntityFetch),
    /// Lazy or too-deep to-one: only the foreign key is read.
    DelayedEntity(DelayedEntityFetch),
    /// Joined collection, populated row by row.
    Plural(PluralFetch),
    DelayedCollection(DelayedCollectionFetch),
    /// Fetch that refers back to an entity already loaded by another fetch.
    Circular(CircularFetch),
}

impl Fetch {
    pub fn path(&self) -> &NavigablePath {
        match self {
            Self::Basic(f) => &f.path,
            Self::Composite(f) => &f.path,
            Self::Entity(f) => &f.path,
            Self::DelayedEntity(f) => &f.path,
            Self::Plural(f) => &f.path,
            Self::DelayedCollection(f) => &f.path,
            Self::Circular(f) => &f.path,
        }
    }

    /// State-array position the fetched value is stored at.
    pub fn position(&self) -> usize {
        match self {
            Self::Basic(f) => f.position,
            Self::Composite(f) => f.position,
            Self::Entity(f) => f.position,
            Self::DelayedEntity(f) => f.position,
            Self::Plural(f) => f.position,
            Self::DelayedCollection(f) => f.position,
            Self::Circular(f) => f.position,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Basic(_) => "basic",
            Self::Composite(_) => "composite",
            Self::Entity(_) => "entity",
            Self::DelayedEntity(_) => "delayed-entity",
            Self::Plural(_) => "plural",
            Self::DelayedCollection(_) => "delayed-collection",
            Self::Circular(f) => match f.kind {
                CircularKind::Bidirectional => "bidirectional",
                CircularKind::SelfReferencing => "self-referencing",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub selection: SqlSelection,
    pub converter: Option<BasicValueConverter>,
}

#[derive(Debug, Clone)]
pub struct CompositeFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub embeddable: ManagedTypeId,
    /// One fetch per attribute of the embeddable, in local position order.
    pub fetches: Vec<Fetch>,
}

#[derive(Debug, Clone)]
pub struct EntityFetch {
    pub path: NavigablePath,
    pub position: usize,
    /// Foreign key on the owner's row; empty for an inverse side.
    pub referring: Vec<SqlSelection>,
    pub not_found: NotFoundAction,
    pub entity: Box<EntityShape>,
}

#[derive(Debug, Clone)]
pub struct DelayedEntityFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub target: ManagedTypeId,
    pub key: Vec<SqlSelection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircularKind {
    /// The other side of the association that led to this entity.
    Bidirectional,
    /// The same association reached again further down the tree.
    SelfReferencing,
}

#[derive(Debug, Clone)]
pub struct CircularFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub kind: CircularKind,
    pub target: ManagedTypeId,
    /// Frame holding the referenced instance (bidirectional fetches).
    pub referenced_frame: Option<FrameId>,
    /// Foreign key on the owner's row (self-referencing fetches).
    pub key: Vec<SqlSelection>,
}

#[derive(Debug, Clone)]
pub struct PluralFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub collection: CollectionId,
    pub frame: FrameId,
    /// Owner key columns on the collection rows.
    pub key: Vec<SqlSelection>,
    pub identifier: Option<SqlSelection>,
    pub index: Option<Box<Fetch>>,
    /// Basic, composite or entity fetch of the element.
    pub element: Box<Fetch>,
}

#[derive(Debug, Clone)]
pub struct DelayedCollectionFetch {
    pub path: NavigablePath,
    pub position: usize,
    pub collection: CollectionId,
}
