//! Row processing: walks the result-shape tree once per row, resolving
//! entity keys first and assembling state second.

mod assembler;
mod collection;
mod delayed;
mod entity;
mod frame;

use log::trace;
use std::collections::HashSet;
use crate::config::SessionConfig;
use crate::context::PersistenceContext;
use crate::core::{OrmError, Result, Value};
use crate::instance::ObjectValue;
use crate::metamodel::RuntimeModel;
use crate::processing::ProcessingState;
use crate::result::Row;
use crate::shape::{DomainResult, FrameId, QueryShape, SqlSelection};

pub use frame::{EntityFrame, FrameState, RowContext};

/// Everything row processing reads and reports into while one result set is
/// traversed. Only the current row and its frames change between rows.
pub struct RowProcessingState<'a> {
    pub(crate) model: &'a RuntimeModel,
    pub(crate) options: &'a SessionConfig,
    pub(crate) context: &'a mut dyn PersistenceContext,
    pub(crate) processing: &'a mut ProcessingState,
    row: Row,
    frames: RowContext,
}

impl<'a> RowProcessingState<'a> {
    pub fn new(
        model: &'a RuntimeModel,
        options: &'a SessionConfig,
        context: &'a mut dyn PersistenceContext,
        processing: &'a mut ProcessingState,
        shape: &QueryShape,
    ) -> Self {
        Self {
            model,
            options,
            context,
            processing,
            row: Row::new(),
            frames: RowContext::new(shape.entity_frames(), shape.collection_frames()),
        }
    }

    pub fn frames(&self) -> &RowContext {
        &self.frames
    }

    /// Raw value at a selection's position of the current row, coerced to
    /// the column type.
    pub(crate) fn read(&self, selection: &SqlSelection) -> Result<Value> {
        let raw = self.row.get(selection.position).cloned().ok_or_else(|| {
            OrmError::ResultSetError(format!(
                "Row has {} values; selection '{}' reads position {}",
                self.row.len(),
                selection.alias,
                selection.position
            ))
        })?;
        raw.coerce(selection.sql_type)
    }

    pub(crate) fn read_all(&self, selections: &[SqlSelection]) -> Result<Vec<Value>> {
        selections.iter().map(|selection| self.read(selection)).collect()
    }

    pub(crate) fn frame(&self, frame: FrameId) -> Result<&EntityFrame> {
        self.frames
            .entity(frame)
            .ok_or_else(|| OrmError::ExecutionError(format!("Unknown entity frame {}", frame)))
    }

    pub(crate) fn frame_mut(&mut self, frame: FrameId) -> Result<&mut EntityFrame> {
        self.frames
            .entity_mut(frame)
            .ok_or_else(|| OrmError::ExecutionError(format!("Unknown entity frame {}", frame)))
    }

    /// Process one row: resolve every entity key of the shape, then assemble
    /// each domain result.
    pub fn process_row(&mut self, shape: &QueryShape, row: Row) -> Result<Vec<ObjectValue>> {
        self.frames.reset();
        self.row = row;

        for result in shape.results() {
            if let DomainResult::Entity(entity) = result {
                self.resolve_keys(entity)?;
            }
        }

        let mut values = Vec::with_capacity(shape.results().len());
        for result in shape.results() {
            let value = match result {
                DomainResult::Basic(basic) => self.assemble_basic(basic)?,
                DomainResult::Entity(entity) => self.assemble_entity(entity)?,
            };
            values.push(value);
        }
        trace!("Processed row into {} values", values.len());
        Ok(values)
    }
}

/// Reads rows from a cursor through one query shape.
pub struct RowReader<'s> {
    shape: &'s QueryShape,
}

impl<'s> RowReader<'s> {
    pub fn new(shape: &'s QueryShape) -> Self {
        Self { shape }
    }

    pub fn read_row(&self, state: &mut RowProcessingState<'_>, row: Row) -> Result<Vec<ObjectValue>> {
        state.process_row(self.shape, row)
    }
}

/// Collects processed rows, optionally dropping rows whose values are
/// identical to an earlier row (the same root entities repeated by a
/// collection join fetch).
#[derive(Debug, Default)]
pub struct ResultsConsumer {
    unique: bool,
    rows: Vec<Vec<ObjectValue>>,
    seen: HashSet<Vec<ObjectValue>>,
}

impl ResultsConsumer {
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            ..Self::default()
        }
    }

    pub fn consume(&mut self, row: Vec<ObjectValue>) {
        if self.unique && !self.seen.insert(row.clone()) {
            trace!("Dropped repeated result row");
            return;
        }
        self.rows.push(row);
    }

    pub fn finish(self) -> Vec<Vec<ObjectValue>> {
        self.rows
    }
}
