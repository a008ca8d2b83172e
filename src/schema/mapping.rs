use crate::conversion::SqlValue;
use crate::error::PersistenceError;
use crate::lazy::EntityCollection;
use crate::types::{FetchType, RelationKind, RowValues};

use super::descriptor::{
    ColumnAccess, ColumnDescriptor, EntityDescriptor, RelationDescriptor, resolver,
};
use super::registry::descriptor;
use super::{Entity, EntityRef, simple_type_name};

#[derive(Debug, Clone, Copy)]
enum Declared {
    Column(usize),
    JoinColumn { column: usize, relation: usize },
    Collection(&'static str),
}

/// Builder for the mapping of one entity type.
///
/// Each field is declared with a getter and a setter. The column name defaults to the field
/// name (`field + "_id"` for a join column); [`named`](Self::named) overrides the column of the
/// field declared just before it. The table name defaults to the type's simple name.
pub struct EntityMapping<T> {
    table: Option<String>,
    columns: Vec<ColumnDescriptor<T>>,
    relations: Vec<RelationDescriptor<T>>,
    last: Option<Declared>,
    errors: Vec<String>,
}

impl<T: 'static> Default for EntityMapping<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EntityMapping<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: None,
            columns: Vec::new(),
            relations: Vec::new(),
            last: None,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Identifier assigned by the application.
    #[must_use]
    pub fn id<V: SqlValue + 'static>(
        self,
        field: &'static str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.value_column(field, true, false, get, set)
    }

    /// Identifier generated by the database on insert.
    #[must_use]
    pub fn generated_id<V: SqlValue + 'static>(
        self,
        field: &'static str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.value_column(field, true, true, get, set)
    }

    #[must_use]
    pub fn column<V: SqlValue + 'static>(
        self,
        field: &'static str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.value_column(field, false, false, get, set)
    }

    /// Single related entity referenced through a join column.
    #[must_use]
    pub fn many_to_one<R: Entity>(
        self,
        field: &'static str,
        get: impl Fn(&T) -> Option<EntityRef<R>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<EntityRef<R>>) + Send + Sync + 'static,
    ) -> Self {
        self.to_one(RelationKind::ManyToOne, field, get, set)
    }

    #[must_use]
    pub fn one_to_one<R: Entity>(
        self,
        field: &'static str,
        get: impl Fn(&T) -> Option<EntityRef<R>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<EntityRef<R>>) + Send + Sync + 'static,
    ) -> Self {
        self.to_one(RelationKind::OneToOne, field, get, set)
    }

    /// Collection of entities whose `mapped_by` relation points back at this type.
    #[must_use]
    pub fn one_to_many<R: Entity>(
        mut self,
        field: &'static str,
        mapped_by: &'static str,
        fetch: FetchType,
        set: impl Fn(&mut T, EntityCollection<R>) + Send + Sync + 'static,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            field,
            kind: RelationKind::OneToMany,
            target: simple_type_name::<R>(),
            join_column: None,
            mapped_by: Some(mapped_by),
            fetch,
            resolve: resolver(move |entity, loader, owner_id| {
                let collection = loader.collection::<R>(mapped_by, owner_id, fetch)?;
                set(entity, collection);
                Ok(())
            }),
        });
        self.last = Some(Declared::Collection(field));
        self
    }

    /// Override the column name of the previously declared field.
    #[must_use]
    pub fn named(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        match self.last {
            Some(Declared::Column(idx)) => self.columns[idx].column = column,
            Some(Declared::JoinColumn {
                column: col_idx,
                relation,
            }) => {
                self.columns[col_idx].column.clone_from(&column);
                self.relations[relation].join_column = Some(column);
            }
            Some(Declared::Collection(field)) => self.errors.push(format!(
                "named({column}) cannot rename one-to-many field {field}: it has no column"
            )),
            None => self
                .errors
                .push(format!("named({column}) must follow a field declaration")),
        }
        self
    }

    fn value_column<V: SqlValue + 'static>(
        mut self,
        field: &'static str,
        is_identifier: bool,
        is_generated: bool,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.columns.push(ColumnDescriptor {
            field,
            column: field.to_string(),
            is_identifier,
            is_generated,
            access: ColumnAccess::Value {
                get: Box::new(move |entity: &T| get(entity).to_row_value()),
                set: Box::new(move |entity: &mut T, value: RowValues| {
                    set(entity, V::from_row_value(value)?);
                    Ok(())
                }),
            },
        });
        self.last = Some(Declared::Column(self.columns.len() - 1));
        self
    }

    fn to_one<R: Entity>(
        mut self,
        kind: RelationKind,
        field: &'static str,
        get: impl Fn(&T) -> Option<EntityRef<R>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<EntityRef<R>>) + Send + Sync + 'static,
    ) -> Self {
        let join_column = format!("{field}_id");
        self.columns.push(ColumnDescriptor {
            field,
            column: join_column.clone(),
            is_identifier: false,
            is_generated: false,
            access: ColumnAccess::JoinColumn {
                related_id: Box::new(move |entity: &T| related_id(get(entity), field)),
            },
        });
        self.relations.push(RelationDescriptor {
            field,
            kind,
            target: simple_type_name::<R>(),
            join_column: Some(join_column),
            mapped_by: None,
            fetch: FetchType::Eager,
            resolve: resolver(move |entity, loader, join_value| {
                let related = if join_value.is_null() {
                    None
                } else {
                    loader.load_by_id::<R>(&join_value)?
                };
                set(entity, related);
                Ok(())
            }),
        });
        self.last = Some(Declared::JoinColumn {
            column: self.columns.len() - 1,
            relation: self.relations.len() - 1,
        });
        self
    }

    /// Resolve the declarations into a descriptor.
    pub(crate) fn build(self) -> Result<EntityDescriptor<T>, PersistenceError> {
        let type_name = simple_type_name::<T>();
        if let Some(first) = self.errors.into_iter().next() {
            return Err(PersistenceError::schema(format!("{type_name}: {first}")));
        }

        let ids: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_identifier)
            .map(|(idx, _)| idx)
            .collect();
        let id_index = match ids.as_slice() {
            [idx] => *idx,
            [] => {
                return Err(PersistenceError::schema(format!(
                    "Entity {type_name} has no identifier field"
                )));
            }
            many => {
                return Err(PersistenceError::schema(format!(
                    "Entity {type_name} declares {} identifier fields, expected exactly one",
                    many.len()
                )));
            }
        };

        for (idx, col) in self.columns.iter().enumerate() {
            if self.columns[..idx]
                .iter()
                .any(|prev| prev.column.eq_ignore_ascii_case(&col.column))
            {
                return Err(PersistenceError::schema(format!(
                    "Entity {type_name} maps column {} more than once",
                    col.column
                )));
            }
        }

        Ok(EntityDescriptor {
            type_name,
            table: self.table.unwrap_or_else(|| type_name.to_string()),
            columns: self.columns,
            id_index,
            relations: self.relations,
        })
    }
}

fn related_id<R: Entity>(
    related: Option<EntityRef<R>>,
    field: &'static str,
) -> Result<RowValues, PersistenceError> {
    let Some(related) = related else {
        return Ok(RowValues::Null);
    };
    let desc = descriptor::<R>()?;
    let related = related.try_borrow().map_err(|_| {
        PersistenceError::state(format!(
            "related {} of field {field} is mutably borrowed",
            desc.type_name()
        ))
    })?;
    let id = desc.id_value(&related);
    if id.is_null() {
        return Err(PersistenceError::state(format!(
            "ID field of {} referenced by {field} is null",
            desc.type_name()
        )));
    }
    Ok(id)
}
