use std::fmt;

use crate::error::PersistenceError;
use crate::persister::Loader;
use crate::types::{EntityId, FetchType, RelationKind, RowValues};

type Getter<T> = Box<dyn Fn(&T) -> RowValues + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, RowValues) -> Result<(), PersistenceError> + Send + Sync>;
type RelatedId<T> = Box<dyn Fn(&T) -> Result<RowValues, PersistenceError> + Send + Sync>;
pub(crate) type Resolver<T> = Box<
    dyn Fn(&mut T, &mut Loader<'_>, RowValues) -> Result<(), PersistenceError> + Send + Sync,
>;

pub(crate) fn resolver<T, F>(f: F) -> Resolver<T>
where
    F: Fn(&mut T, &mut Loader<'_>, RowValues) -> Result<(), PersistenceError> + Send + Sync + 'static,
{
    Box::new(f)
}

pub(crate) enum ColumnAccess<T> {
    Value { get: Getter<T>, set: Setter<T> },
    JoinColumn { related_id: RelatedId<T> },
}

/// A persisted column: a scalar field or the join column of a to-one relation.
pub struct ColumnDescriptor<T> {
    pub(crate) field: &'static str,
    pub(crate) column: String,
    pub(crate) is_identifier: bool,
    pub(crate) is_generated: bool,
    pub(crate) access: ColumnAccess<T>,
}

impl<T> ColumnDescriptor<T> {
    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.is_identifier
    }

    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.is_generated
    }

    /// `true` for the join column of a many-to-one or one-to-one relation.
    #[must_use]
    pub fn is_join_column(&self) -> bool {
        matches!(self.access, ColumnAccess::JoinColumn { .. })
    }

    /// Value bound for this column when writing `entity`.
    ///
    /// # Errors
    /// Fails for a join column whose related entity has no identifier.
    pub fn value_of(&self, entity: &T) -> Result<RowValues, PersistenceError> {
        match &self.access {
            ColumnAccess::Value { get, .. } => Ok(get(entity)),
            ColumnAccess::JoinColumn { related_id } => related_id(entity),
        }
    }

    pub(crate) fn assign(&self, entity: &mut T, value: RowValues) -> Result<(), PersistenceError> {
        match &self.access {
            ColumnAccess::Value { set, .. } => set(entity, value),
            ColumnAccess::JoinColumn { .. } => Ok(()),
        }
    }
}

impl<T> fmt::Debug for ColumnDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("field", &self.field)
            .field("column", &self.column)
            .field("is_identifier", &self.is_identifier)
            .field("is_generated", &self.is_generated)
            .field("join_column", &self.is_join_column())
            .finish()
    }
}

/// A relation to another entity type.
pub struct RelationDescriptor<T> {
    pub(crate) field: &'static str,
    pub(crate) kind: RelationKind,
    pub(crate) target: &'static str,
    pub(crate) join_column: Option<String>,
    pub(crate) mapped_by: Option<&'static str>,
    pub(crate) fetch: FetchType,
    pub(crate) resolve: Resolver<T>,
}

impl<T> RelationDescriptor<T> {
    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }

    #[must_use]
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Simple type name of the related entity.
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    #[must_use]
    pub fn join_column(&self) -> Option<&str> {
        self.join_column.as_deref()
    }

    #[must_use]
    pub fn mapped_by(&self) -> Option<&'static str> {
        self.mapped_by
    }

    #[must_use]
    pub fn fetch(&self) -> FetchType {
        self.fetch
    }
}

impl<T> fmt::Debug for RelationDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("join_column", &self.join_column)
            .field("mapped_by", &self.mapped_by)
            .field("fetch", &self.fetch)
            .finish()
    }
}

/// Resolved, immutable mapping of one entity type.
pub struct EntityDescriptor<T> {
    pub(crate) type_name: &'static str,
    pub(crate) table: String,
    pub(crate) columns: Vec<ColumnDescriptor<T>>,
    pub(crate) id_index: usize,
    pub(crate) relations: Vec<RelationDescriptor<T>>,
}

impl<T> EntityDescriptor<T> {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in declaration order, join columns included.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor<T>] {
        &self.columns
    }

    #[must_use]
    pub fn id_column(&self) -> &ColumnDescriptor<T> {
        &self.columns[self.id_index]
    }

    #[must_use]
    pub fn relations(&self) -> &[RelationDescriptor<T>] {
        &self.relations
    }

    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&RelationDescriptor<T>> {
        self.relations.iter().find(|r| r.field == field)
    }

    /// Column for a field name; column names are accepted too.
    ///
    /// # Errors
    /// Returns `PersistenceError::Mapping` for an unknown field.
    pub fn column_for(&self, field: &str) -> Result<&ColumnDescriptor<T>, PersistenceError> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .or_else(|| self.columns.iter().find(|c| c.column == field))
            .ok_or_else(|| {
                PersistenceError::Mapping(format!("{} has no mapped field {field}", self.type_name))
            })
    }

    /// Current identifier value of `entity`; `Null` when unset.
    #[must_use]
    pub fn id_value(&self, entity: &T) -> RowValues {
        match &self.id_column().access {
            ColumnAccess::Value { get, .. } => get(entity),
            ColumnAccess::JoinColumn { .. } => RowValues::Null,
        }
    }

    /// # Errors
    /// Returns `PersistenceError::TypeConversion` when the identifier cannot serve as a key.
    pub fn entity_id(&self, entity: &T) -> Result<Option<EntityId>, PersistenceError> {
        EntityId::from_value(&self.id_value(entity))
    }

    pub(crate) fn set_id(&self, entity: &mut T, value: RowValues) -> Result<(), PersistenceError> {
        self.id_column().assign(entity, value)
    }

    /// Values of every scalar column, identifier included, in declaration order.
    #[must_use]
    pub fn snapshot(&self, entity: &T) -> Vec<RowValues> {
        self.columns
            .iter()
            .filter_map(|c| match &c.access {
                ColumnAccess::Value { get, .. } => Some(get(entity)),
                ColumnAccess::JoinColumn { .. } => None,
            })
            .collect()
    }
}

impl<T> fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .finish()
    }
}
