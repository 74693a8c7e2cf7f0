use serde::{Deserialize, Serialize};
use crate::cache::AccessType;
use crate::core::{Result, SqlType};
use crate::hierarchy::{IdGeneratorKind, InheritanceStrategy, OptimisticLockStyle};
use crate::metamodel::{BasicValueConverter, CollectionClassification, FetchTiming, NotFoundAction};

const fn default_true() -> bool {
    true
}

/// Boot-time mapping document: the complete set of managed type mappings
/// handed over by the annotation/XML binders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootModel {
    #[serde(default)]
    pub types: Vec<ManagedTypeMapping>,
}

impl BootModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn with_type(mut self, mapping: ManagedTypeMapping) -> Self {
        self.types.push(mapping);
        self
    }

    pub fn find(&self, name: &str) -> Option<&ManagedTypeMapping> {
        self.types.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedTypeKindMapping {
    Entity,
    MappedSuperclass,
    Embeddable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryTableMapping {
    pub name: String,
    /// Key columns of the secondary table, in primary key order.
    pub key_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminatorMapping {
    pub column: String,
    pub sql_type: SqlType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMapping {
    #[serde(default)]
    pub region: Option<String>,
    pub access: AccessType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedTypeMapping {
    pub name: String,
    pub kind: ManagedTypeKindMapping,
    #[serde(default)]
    pub jpa_name: Option<String>,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub secondary_tables: Vec<SecondaryTableMapping>,
    #[serde(default)]
    pub inheritance: Option<InheritanceStrategy>,
    #[serde(default)]
    pub discriminator: Option<DiscriminatorMapping>,
    /// Literal discriminator value, parsed against the discriminator column type.
    #[serde(default)]
    pub discriminator_value: Option<String>,
    #[serde(default = "default_true")]
    pub mutable: bool,
    #[serde(default)]
    pub enhanced_for_lazy_loading: bool,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub cache: Option<CacheMapping>,
    #[serde(default)]
    pub optimistic_lock: OptimisticLockStyle,
    #[serde(default)]
    pub row_id: Option<String>,
    #[serde(default)]
    pub tenant_column: Option<String>,
    #[serde(default)]
    pub natural_id_mutable: bool,
    /// Name of the shadow embeddable synthesized for a non-aggregated id.
    #[serde(default)]
    pub id_class: Option<String>,
    #[serde(default)]
    pub id_generator: Option<IdGeneratorKind>,
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

impl ManagedTypeMapping {
    fn with_kind(name: &str, kind: ManagedTypeKindMapping) -> Self {
        Self {
            name: name.to_string(),
            kind,
            jpa_name: None,
            superclass: None,
            table: None,
            secondary_tables: Vec::new(),
            inheritance: None,
            discriminator: None,
            discriminator_value: None,
            mutable: true,
            enhanced_for_lazy_loading: false,
            batch_size: None,
            cache: None,
            optimistic_lock: OptimisticLockStyle::default(),
            row_id: None,
            tenant_column: None,
            natural_id_mutable: false,
            id_class: None,
            id_generator: None,
            attributes: Vec::new(),
        }
    }

    pub fn entity(name: &str) -> Self {
        Self::with_kind(name, ManagedTypeKindMapping::Entity)
    }

    pub fn mapped_superclass(name: &str) -> Self {
        Self::with_kind(name, ManagedTypeKindMapping::MappedSuperclass)
    }

    pub fn embeddable(name: &str) -> Self {
        Self::with_kind(name, ManagedTypeKindMapping::Embeddable)
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn inheritance(mut self, strategy: InheritanceStrategy) -> Self {
        self.inheritance = Some(strategy);
        self
    }

    pub fn discriminator(mut self, column: &str, sql_type: SqlType) -> Self {
        self.discriminator = Some(DiscriminatorMapping {
            column: column.to_string(),
            sql_type,
        });
        self
    }

    pub fn discriminator_value(mut self, value: &str) -> Self {
        self.discriminator_value = Some(value.to_string());
        self
    }

    pub fn secondary_table(mut self, name: &str, key_columns: &[&str]) -> Self {
        self.secondary_tables.push(SecondaryTableMapping {
            name: name.to_string(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn enhanced(mut self) -> Self {
        self.enhanced_for_lazy_loading = true;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn cached(mut self, access: AccessType) -> Self {
        self.cache = Some(CacheMapping { region: None, access });
        self
    }

    pub fn tenant_column(mut self, column: &str) -> Self {
        self.tenant_column = Some(column.to_string());
        self
    }

    pub fn row_id(mut self, column: &str) -> Self {
        self.row_id = Some(column.to_string());
        self
    }

    pub fn id_class(mut self, name: &str) -> Self {
        self.id_class = Some(name.to_string());
        self
    }

    pub fn attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub name: String,
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub embedded_id: bool,
    #[serde(default)]
    pub version: bool,
    #[serde(default)]
    pub natural_id: bool,
    /// Identifier attribute this association derives its key from (`@MapsId`).
    #[serde(default)]
    pub maps_id: Option<String>,
    #[serde(default = "default_true")]
    pub insertable: bool,
    #[serde(default = "default_true")]
    pub updatable: bool,
    #[serde(default)]
    pub immutable: bool,
    #[serde(flatten)]
    pub kind: AttributeKindMapping,
}

impl AttributeMapping {
    fn with_kind(name: &str, kind: AttributeKindMapping) -> Self {
        Self {
            name: name.to_string(),
            id: false,
            embedded_id: false,
            version: false,
            natural_id: false,
            maps_id: None,
            insertable: true,
            updatable: true,
            immutable: false,
            kind,
        }
    }

    pub fn basic(name: &str, column: &str, sql_type: SqlType) -> Self {
        Self::with_kind(
            name,
            AttributeKindMapping::Basic(BasicMapping {
                column: column.to_string(),
                sql_type,
                nullable: true,
                table: None,
                converter: None,
            }),
        )
    }

    pub fn embedded(name: &str, embeddable: &str, column_prefix: &str) -> Self {
        Self::with_kind(
            name,
            AttributeKindMapping::Embedded(EmbeddedMapping {
                embeddable: embeddable.to_string(),
                column_prefix: column_prefix.to_string(),
            }),
        )
    }

    pub fn many_to_one(name: &str, target: &str, join_columns: &[&str]) -> Self {
        Self::with_kind(name, AttributeKindMapping::ManyToOne(ToOneMapping::new(target, join_columns)))
    }

    pub fn one_to_one(name: &str, target: &str, join_columns: &[&str]) -> Self {
        Self::with_kind(name, AttributeKindMapping::OneToOne(ToOneMapping::new(target, join_columns)))
    }

    /// Inverse one-to-one borrowing the foreign key of `target.mapped_by`.
    pub fn one_to_one_inverse(name: &str, target: &str, mapped_by: &str) -> Self {
        let mut mapping = ToOneMapping::new(target, &[]);
        mapping.mapped_by = Some(mapped_by.to_string());
        Self::with_kind(name, AttributeKindMapping::OneToOne(mapping))
    }

    pub fn plural(name: &str, mapping: PluralMapping) -> Self {
        Self::with_kind(name, AttributeKindMapping::Plural(mapping))
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn embedded_id(mut self) -> Self {
        self.embedded_id = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn natural_id(mut self) -> Self {
        self.natural_id = true;
        self
    }

    pub fn maps_id(mut self, id_attribute: &str) -> Self {
        self.maps_id = Some(id_attribute.to_string());
        self
    }

    pub fn not_null(mut self) -> Self {
        if let AttributeKindMapping::Basic(basic) = &mut self.kind {
            basic.nullable = false;
        }
        if let AttributeKindMapping::ManyToOne(to_one) | AttributeKindMapping::OneToOne(to_one) =
            &mut self.kind
        {
            to_one.optional = false;
        }
        self
    }

    pub fn converter(mut self, converter: BasicValueConverter) -> Self {
        if let AttributeKindMapping::Basic(basic) = &mut self.kind {
            basic.converter = Some(converter);
        }
        self
    }

    pub fn in_table(mut self, table: &str) -> Self {
        if let AttributeKindMapping::Basic(basic) = &mut self.kind {
            basic.table = Some(table.to_string());
        }
        self
    }

    pub fn fetch(mut self, timing: FetchTiming) -> Self {
        match &mut self.kind {
            AttributeKindMapping::ManyToOne(to_one) | AttributeKindMapping::OneToOne(to_one) => {
                to_one.fetch = timing;
            }
            AttributeKindMapping::Plural(plural) => plural.fetch = timing,
            _ => {}
        }
        self
    }

    pub fn not_found(mut self, action: NotFoundAction) -> Self {
        if let AttributeKindMapping::ManyToOne(to_one) | AttributeKindMapping::OneToOne(to_one) =
            &mut self.kind
        {
            to_one.not_found = action;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKindMapping {
    Basic(BasicMapping),
    Embedded(EmbeddedMapping),
    ManyToOne(ToOneMapping),
    OneToOne(ToOneMapping),
    Plural(PluralMapping),
    Any,
    DynamicComponent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicMapping {
    pub column: String,
    pub sql_type: SqlType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Secondary table holding the column; the primary table when absent.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub converter: Option<BasicValueConverter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedMapping {
    pub embeddable: String,
    #[serde(default)]
    pub column_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToOneMapping {
    pub target: String,
    #[serde(default)]
    pub join_columns: Vec<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default = "FetchTiming::eager")]
    pub fetch: FetchTiming,
    #[serde(default = "default_true")]
    pub optional: bool,
    #[serde(default)]
    pub not_found: NotFoundAction,
}

impl ToOneMapping {
    pub fn new(target: &str, join_columns: &[&str]) -> Self {
        Self {
            target: target.to_string(),
            join_columns: join_columns.iter().map(|c| c.to_string()).collect(),
            mapped_by: None,
            fetch: FetchTiming::Eager,
            optional: true,
            not_found: NotFoundAction::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluralMapping {
    pub classification: CollectionClassification,
    pub element: ElementMapping,
    #[serde(default)]
    pub index: Option<IndexMapping>,
    #[serde(default)]
    pub collection_table: Option<String>,
    /// Columns (on the collection or element table) referring back to the owner.
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub orphan_delete: bool,
    #[serde(default)]
    pub extra_lazy: bool,
    #[serde(default = "FetchTiming::lazy")]
    pub fetch: FetchTiming,
    /// Surrogate row identifier column of an id-bag.
    #[serde(default)]
    pub identifier_column: Option<String>,
}

impl PluralMapping {
    pub fn new(classification: CollectionClassification, element: ElementMapping) -> Self {
        Self {
            classification,
            element,
            index: None,
            collection_table: None,
            key_columns: Vec::new(),
            mapped_by: None,
            batch_size: None,
            inverse: false,
            orphan_delete: false,
            extra_lazy: false,
            fetch: FetchTiming::Lazy,
            identifier_column: None,
        }
    }

    pub fn collection_table(mut self, table: &str, key_columns: &[&str]) -> Self {
        self.collection_table = Some(table.to_string());
        self.key_columns = key_columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn key_columns(mut self, key_columns: &[&str]) -> Self {
        self.key_columns = key_columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn mapped_by(mut self, attribute: &str) -> Self {
        self.mapped_by = Some(attribute.to_string());
        self.inverse = true;
        self
    }

    pub fn index(mut self, index: IndexMapping) -> Self {
        self.index = Some(index);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn identifier_column(mut self, column: &str) -> Self {
        self.identifier_column = Some(column.to_string());
        self
    }

    pub fn eager(mut self) -> Self {
        self.fetch = FetchTiming::Eager;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementMapping {
    Basic {
        column: String,
        sql_type: SqlType,
        #[serde(default)]
        converter: Option<BasicValueConverter>,
    },
    Embedded {
        embeddable: String,
        #[serde(default)]
        column_prefix: String,
    },
    /// Target entity rows carry the key columns themselves.
    OneToMany { target: String },
    /// Collection table rows carry foreign key columns to the target.
    ManyToMany { target: String, columns: Vec<String> },
    Any,
}

impl ElementMapping {
    pub fn basic(column: &str, sql_type: SqlType) -> Self {
        Self::Basic {
            column: column.to_string(),
            sql_type,
            converter: None,
        }
    }

    pub fn one_to_many(target: &str) -> Self {
        Self::OneToMany {
            target: target.to_string(),
        }
    }

    pub fn many_to_many(target: &str, columns: &[&str]) -> Self {
        Self::ManyToMany {
            target: target.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexMapping {
    Basic {
        column: String,
        sql_type: SqlType,
        /// First list index value stored in the column (lists and arrays).
        #[serde(default)]
        base: i64,
    },
    Embedded {
        embeddable: String,
        #[serde(default)]
        column_prefix: String,
    },
}

impl IndexMapping {
    pub fn basic(column: &str, sql_type: SqlType) -> Self {
        Self::Basic {
            column: column.to_string(),
            sql_type,
            base: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_document_round_trips_attribute_kinds() {
        let document = r#"{
            "types": [{
                "name": "Point",
                "kind": "entity",
                "table": "point",
                "attributes": [
                    { "name": "id", "id": true, "kind": "basic", "column": "id", "sql_type": "Integer", "nullable": false },
                    { "name": "owner", "kind": "many_to_one", "target": "Person", "join_columns": ["owner_id"], "fetch": "lazy" },
                    { "name": "tags", "kind": "plural", "classification": "set",
                      "element": { "kind": "basic", "column": "tag", "sql_type": "Text" },
                      "collection_table": "point_tags", "key_columns": ["point_id"] }
                ]
            }]
        }"#;

        let model = BootModel::from_json(document).unwrap();
        let point = model.find("Point").unwrap();
        assert_eq!(point.attributes.len(), 3);
        assert!(point.attributes[0].id);
        assert!(point.mutable);
        match &point.attributes[1].kind {
            AttributeKindMapping::ManyToOne(to_one) => {
                assert_eq!(to_one.fetch, FetchTiming::Lazy);
                assert!(to_one.optional);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        match &point.attributes[2].kind {
            AttributeKindMapping::Plural(plural) => {
                assert_eq!(plural.classification, CollectionClassification::Set);
                assert_eq!(plural.fetch, FetchTiming::Lazy);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
