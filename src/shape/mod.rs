//! Result-shape tree: the domain results a query selects and the fetch
//! graph below each of them.

mod builder;
mod fetch;
mod path;
mod selection;

pub use builder::ShapeBuilder;
pub use fetch::{
    BasicFetch, CircularFetch, CircularKind, CompositeFetch, DelayedCollectionFetch, DelayedEntityFetch,
    DomainResult, EntityFetch, EntityShape, Fetch, FrameId, PluralFetch, TableGroup,
};
pub use path::NavigablePath;
pub use selection::{SqlExpressionResolver, SqlSelection, SqlSelectionCollector};

/// Built shape of one query: its domain results plus the number of entity
/// and collection frames row processing allocates per row.
#[derive(Debug, Clone)]
pub struct QueryShape {
    results: Vec<DomainResult>,
    entity_frames: usize,
    collection_frames: usize,
}

impl QueryShape {
    pub(crate) fn new(results: Vec<DomainResult>, entity_frames: usize, collection_frames: usize) -> Self {
        Self {
            results,
            entity_frames,
            collection_frames,
        }
    }

    pub fn results(&self) -> &[DomainResult] {
        &self.results
    }

    pub fn entity_frames(&self) -> usize {
        self.entity_frames
    }

    pub fn collection_frames(&self) -> usize {
        self.collection_frames
    }

    /// Every fetch of the tree in depth-first order, with its nesting depth.
    pub fn walk(&self) -> Vec<(usize, &Fetch)> {
        fn visit<'a>(fetches: &'a [Fetch], depth: usize, out: &mut Vec<(usize, &'a Fetch)>) {
            for fetch in fetches {
                out.push((depth, fetch));
                match fetch {
                    Fetch::Composite(composite) => visit(&composite.fetches, depth + 1, out),
                    Fetch::Entity(entity) => visit_entity(&entity.entity, depth + 1, out),
                    Fetch::Plural(plural) => {
                        if let Some(index) = &plural.index {
                            visit(std::slice::from_ref(index.as_ref()), depth + 1, out);
                        }
                        visit(std::slice::from_ref(plural.element.as_ref()), depth + 1, out);
                    }
                    _ => {}
                }
            }
        }

        fn visit_entity<'a>(shape: &'a EntityShape, depth: usize, out: &mut Vec<(usize, &'a Fetch)>) {
            visit(&shape.fetches, depth, out);
            for (_, level) in &shape.subtype_fetches {
                visit(level, depth, out);
            }
        }

        let mut out = Vec::new();
        for result in &self.results {
            if let DomainResult::Entity(shape) = result {
                visit_entity(shape, 0, &mut out);
            }
        }
        out
    }
}
