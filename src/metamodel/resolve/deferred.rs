use log::debug;
use std::collections::VecDeque;
use crate::boot::{ElementMapping, IndexMapping, PluralMapping};
use crate::core::{OrmError, Result, SqlType};
use crate::metamodel::{
    AttributeKind, CollectionClassification, CollectionElement, CollectionId,
    CollectionIdentifierDescriptor, CollectionIndex, CollectionKeyDescriptor, ElementNature,
    EmbeddedContainer, ManagedTypeId, NavigableRole, ToOneKey,
};
use crate::relational::{ColumnId, ForeignKeyId, TableId, TableKind};
use super::ModelResolver;
use super::attributes::EmbeddableUsage;

/// Resolution steps that need another descriptor's side resolved first.
#[derive(Debug, Clone)]
pub(crate) enum DeferredTask {
    /// Inverse to-one borrowing the foreign key of `target.mapped_by`.
    InverseToOne {
        role: NavigableRole,
        target: ManagedTypeId,
        mapped_by: String,
    },
    /// Resolve key, element, index and identifier of a collection.
    FinishCollection {
        collection: CollectionId,
        mapping: PluralMapping,
    },
}

enum TaskOutcome {
    Resolved,
    Waiting(String),
}

impl<'a> ModelResolver<'a> {
    /// Run deferred tasks until the queue is empty. A full pass without
    /// progress means the remaining references can never resolve.
    pub(super) fn drain_deferred(&mut self) -> Result<()> {
        let mut round = 0;
        loop {
            round += 1;
            let mut waiting = VecDeque::new();
            let mut last_reason = None;
            let mut progressed = false;

            while let Some(task) = self.deferred.pop_front() {
                match self.run_task(&task)? {
                    TaskOutcome::Resolved => progressed = true,
                    TaskOutcome::Waiting(reason) => {
                        debug!("Deferred resolution round {}: {}", round, reason);
                        last_reason = Some(reason);
                        waiting.push_back(task);
                    }
                }
            }

            if waiting.is_empty() {
                return Ok(());
            }
            if !progressed {
                return Err(OrmError::UnresolvedReference(
                    last_reason.unwrap_or_else(|| format!("{} references never resolved", waiting.len())),
                ));
            }
            self.deferred = waiting;
        }
    }

    fn run_task(&mut self, task: &DeferredTask) -> Result<TaskOutcome> {
        match task {
            DeferredTask::InverseToOne { role, target, mapped_by } => {
                self.resolve_inverse_to_one(role, *target, mapped_by)
            }
            DeferredTask::FinishCollection { collection, mapping } => {
                self.finish_collection(*collection, mapping)
            }
        }
    }

    /// Key columns of the owning side `target.mapped_by`.
    fn owning_side_key(
        &self,
        role: &NavigableRole,
        target: ManagedTypeId,
        mapped_by: &str,
    ) -> Result<Option<(Vec<ColumnId>, ForeignKeyId)>> {
        let descriptor = &self.managed_types[target.0];
        let attribute = descriptor.find_attribute(mapped_by).ok_or_else(|| {
            OrmError::mapping(format!(
                "'{}' is mapped by unknown attribute '{}.{}'",
                role, descriptor.name, mapped_by
            ))
        })?;
        let to_one = attribute.as_to_one().ok_or_else(|| {
            OrmError::mapping(format!(
                "'{}' is mapped by '{}', which is not a to-one association",
                role, attribute.role
            ))
        })?;
        match &to_one.key {
            ToOneKey::Referring { columns, foreign_key } => Ok(Some((columns.clone(), *foreign_key))),
            ToOneKey::Pending => Ok(None),
            ToOneKey::Target { .. } => Err(OrmError::mapping(format!(
                "'{}' is mapped by '{}', which is itself an inverse side",
                role, attribute.role
            ))),
        }
    }

    fn resolve_inverse_to_one(
        &mut self,
        role: &NavigableRole,
        target: ManagedTypeId,
        mapped_by: &str,
    ) -> Result<TaskOutcome> {
        let Some((columns, foreign_key)) = self.owning_side_key(role, target, mapped_by)? else {
            return Ok(TaskOutcome::Waiting(format!(
                "'{}' waits for '{}.{}'",
                role, self.managed_types[target.0].name, mapped_by
            )));
        };

        let key = ToOneKey::Target { columns, foreign_key };
        for descriptor in &mut self.managed_types {
            for attribute in descriptor.attributes_mut() {
                if &attribute.role == role
                    && let AttributeKind::ToOne(to_one) = &mut attribute.kind
                {
                    to_one.key = key.clone();
                }
            }
        }
        Ok(TaskOutcome::Resolved)
    }

    fn finish_collection(&mut self, collection: CollectionId, mapping: &PluralMapping) -> Result<TaskOutcome> {
        let role = self.collections[collection.0].role.clone();
        let owner = self.collections[collection.0].owner;
        let classification = mapping.classification;
        validate_collection_shape(&role, mapping)?;

        let owner_details = self.entity_details(owner)?;
        let owner_table = owner_details.primary_table;
        let owner_columns = owner_details.identifier_columns.clone();

        let (key, element) = match &mapping.collection_table {
            Some(table_name) => {
                let table = self.relational.ensure_table(table_name, TableKind::Collection);
                let owner_name = self.managed_types[owner.0].name.to_lowercase();
                let key_columns = self.typed_columns(
                    table,
                    &mapping.key_columns,
                    &owner_columns,
                    &owner_name,
                    false,
                    &role,
                )?;
                let foreign_key = self.relational.add_foreign_key(
                    table,
                    owner_table,
                    key_columns.iter().copied().zip(owner_columns.iter().copied()).collect(),
                )?;
                let key = CollectionKeyDescriptor {
                    table,
                    columns: key_columns,
                    foreign_key,
                };
                let element = self.collection_table_element(collection, &role, owner, table, &mapping.element)?;
                (key, element)
            }
            None => {
                let ElementMapping::OneToMany { target } = &mapping.element else {
                    return Err(OrmError::mapping(format!(
                        "Collection '{}' of basic or embedded elements requires a collection table",
                        role
                    )));
                };
                let target = self.entity_id(target)?;
                let (columns, foreign_key) = match &mapping.mapped_by {
                    Some(mapped_by) => match self.owning_side_key(&role, target, mapped_by)? {
                        Some(key) => key,
                        None => {
                            return Ok(TaskOutcome::Waiting(format!(
                                "'{}' waits for '{}.{}'",
                                role, self.managed_types[target.0].name, mapped_by
                            )));
                        }
                    },
                    None if !mapping.key_columns.is_empty() => {
                        let target_table = self.own_table(target)?;
                        let owner_name = self.managed_types[owner.0].name.to_lowercase();
                        let columns = self.typed_columns(
                            target_table,
                            &mapping.key_columns,
                            &owner_columns,
                            &owner_name,
                            true,
                            &role,
                        )?;
                        let foreign_key = self.relational.add_foreign_key(
                            target_table,
                            owner_table,
                            columns.iter().copied().zip(owner_columns.iter().copied()).collect(),
                        )?;
                        (columns, foreign_key)
                    }
                    None => {
                        return Err(OrmError::mapping(format!(
                            "One-to-many '{}' needs either mapped_by or key columns",
                            role
                        )));
                    }
                };
                let table = self.relational.column(columns[0]).table;
                let key = CollectionKeyDescriptor {
                    table,
                    columns,
                    foreign_key,
                };
                let element = CollectionElement::Entity {
                    target,
                    nature: ElementNature::OneToMany,
                    columns: Vec::new(),
                };
                (key, element)
            }
        };

        let key_table = key.table;
        let index = match &mapping.index {
            Some(IndexMapping::Basic { column, sql_type, base }) => {
                if matches!(classification, CollectionClassification::List | CollectionClassification::Array)
                    && *sql_type != SqlType::Integer
                {
                    return Err(OrmError::mapping(format!(
                        "List index of '{}' must be an integer column",
                        role
                    )));
                }
                Some(CollectionIndex::Basic {
                    column: self.relational.add_column(key_table, column, *sql_type, false)?,
                    sql_type: *sql_type,
                    base: *base,
                })
            }
            Some(IndexMapping::Embedded { embeddable, column_prefix }) => {
                if classification != CollectionClassification::Map {
                    return Err(OrmError::mapping(format!(
                        "Only maps can have an embeddable index ('{}')",
                        role
                    )));
                }
                let embeddable = self.bind_embeddable(
                    embeddable,
                    EmbeddableUsage {
                        role: role.append("{index}"),
                        container: EmbeddedContainer::CollectionIndex(collection),
                        entity: owner,
                        table: key_table,
                        column_prefix: column_prefix.clone(),
                        identifier_part: false,
                    },
                    &mut Vec::new(),
                )?;
                Some(CollectionIndex::Embedded { embeddable })
            }
            None => None,
        };

        let identifier = match &mapping.identifier_column {
            Some(column) => Some(CollectionIdentifierDescriptor {
                column: self.relational.add_column(key_table, column, SqlType::Integer, false)?,
                sql_type: SqlType::Integer,
            }),
            None => None,
        };

        let descriptor = &mut self.collections[collection.0];
        descriptor.collection_table = mapping.collection_table.as_ref().map(|_| key_table);
        descriptor.key = Some(key);
        descriptor.element = element;
        descriptor.index = index;
        descriptor.identifier = identifier;
        debug!("Resolved collection '{}'", role);
        Ok(TaskOutcome::Resolved)
    }

    fn collection_table_element(
        &mut self,
        collection: CollectionId,
        role: &NavigableRole,
        owner: ManagedTypeId,
        table: TableId,
        element: &ElementMapping,
    ) -> Result<CollectionElement> {
        match element {
            ElementMapping::Basic { column, sql_type, converter } => Ok(CollectionElement::Basic {
                column: self.relational.add_column(table, column, *sql_type, true)?,
                sql_type: *sql_type,
                converter: converter.clone(),
            }),
            ElementMapping::Embedded { embeddable, column_prefix } => {
                let embeddable = self.bind_embeddable(
                    embeddable,
                    EmbeddableUsage {
                        role: role.append("{element}"),
                        container: EmbeddedContainer::CollectionElement(collection),
                        entity: owner,
                        table,
                        column_prefix: column_prefix.clone(),
                        identifier_part: false,
                    },
                    &mut Vec::new(),
                )?;
                Ok(CollectionElement::Embedded { embeddable })
            }
            ElementMapping::ManyToMany { target, columns } => {
                self.entity_element(table, target, columns, ElementNature::ManyToMany, role)
            }
            ElementMapping::OneToMany { target } => {
                self.entity_element(table, target, &[], ElementNature::OneToMany, role)
            }
            ElementMapping::Any => Err(OrmError::UnsupportedOperation(format!(
                "<many-to-any> element of '{}'",
                role
            ))),
        }
    }

    /// Element columns on a collection table referring to the target identifier.
    fn entity_element(
        &mut self,
        table: TableId,
        target: &str,
        columns: &[String],
        nature: ElementNature,
        role: &NavigableRole,
    ) -> Result<CollectionElement> {
        let target_id = self.entity_id(target)?;
        let target_details = self.entity_details(target_id)?;
        let target_table = target_details.primary_table;
        let target_columns = target_details.identifier_columns.clone();
        let element_columns = self.typed_columns(
            table,
            columns,
            &target_columns,
            &target.to_lowercase(),
            true,
            role,
        )?;
        self.relational.add_foreign_key(
            table,
            target_table,
            element_columns.iter().copied().zip(target_columns).collect(),
        )?;
        Ok(CollectionElement::Entity {
            target: target_id,
            nature,
            columns: element_columns,
        })
    }

    /// Add columns typed like `like`, named explicitly or `{prefix}_{column}`.
    fn typed_columns(
        &mut self,
        table: TableId,
        names: &[String],
        like: &[ColumnId],
        default_prefix: &str,
        nullable: bool,
        role: &NavigableRole,
    ) -> Result<Vec<ColumnId>> {
        let names: Vec<String> = if names.is_empty() {
            like.iter()
                .map(|c| format!("{}_{}", default_prefix, self.relational.column(*c).name))
                .collect()
        } else {
            names.to_vec()
        };
        if names.len() != like.len() {
            return Err(OrmError::mapping(format!(
                "'{}' declares {} columns where {} are required",
                role,
                names.len(),
                like.len()
            )));
        }
        let mut columns = Vec::with_capacity(names.len());
        for (name, source) in names.iter().zip(like) {
            let sql_type = self.relational.column(*source).sql_type;
            columns.push(self.relational.add_column(table, name, sql_type, nullable)?);
        }
        Ok(columns)
    }
}

fn validate_collection_shape(role: &NavigableRole, mapping: &PluralMapping) -> Result<()> {
    let classification = mapping.classification;
    if classification.is_indexed() && mapping.index.is_none() {
        return Err(OrmError::mapping(format!(
            "Indexed collection '{}' ({:?}) requires an index column",
            role, classification
        )));
    }
    if !classification.is_indexed() && mapping.index.is_some() {
        return Err(OrmError::mapping(format!(
            "Collection '{}' ({:?}) cannot declare an index",
            role, classification
        )));
    }
    match (classification, &mapping.identifier_column) {
        (CollectionClassification::IdBag, None) => Err(OrmError::mapping(format!(
            "Id-bag '{}' requires an identifier column",
            role
        ))),
        (CollectionClassification::IdBag, Some(_)) if mapping.collection_table.is_none() => {
            Err(OrmError::mapping(format!("Id-bag '{}' requires a collection table", role)))
        }
        (CollectionClassification::IdBag, Some(_)) | (_, None) => Ok(()),
        (_, Some(_)) => Err(OrmError::mapping(format!(
            "Only id-bags can declare an identifier column ('{}')",
            role
        ))),
    }
}
