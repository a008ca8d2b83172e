use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::connection::DbConnection;
use crate::context::{EntityKey, PersistenceContext};
use crate::error::PersistenceError;
use crate::lazy::EntityCollection;
use crate::results::{CustomDbRow, ResultSet};
use crate::schema::{Entity, EntityDescriptor, EntityRef, descriptor, simple_type_name};
use crate::session::{SessionCore, lazy_collection};
use crate::types::{EntityId, FetchType, RelationKind, RowValues};

use super::{EntityPersister, sql};

/// One load operation: runs queries on a single connection and turns rows into entities.
///
/// Each instance is registered before its relations are resolved, so a relation that leads
/// back to it (directly or through a cycle of eager relations) gets the same instance instead
/// of loading it again. With a context, instances are registered there and shared with the
/// session; without one, they are shared for the duration of this load only.
pub(crate) struct Loader<'a> {
    persister: EntityPersister,
    conn: &'a mut dyn DbConnection,
    context: Option<&'a mut PersistenceContext>,
    loaded: HashMap<EntityKey, Rc<dyn Any>>,
    session: Option<Weak<RefCell<SessionCore>>>,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(
        persister: EntityPersister,
        conn: &'a mut dyn DbConnection,
        context: Option<&'a mut PersistenceContext>,
        session: Option<Weak<RefCell<SessionCore>>>,
    ) -> Self {
        Self {
            persister,
            conn,
            context,
            loaded: HashMap::new(),
            session,
        }
    }

    pub(crate) fn load_by_id<T: Entity>(
        &mut self,
        id: &RowValues,
    ) -> Result<Option<EntityRef<T>>, PersistenceError> {
        let Some(entity_id) = EntityId::from_value(id)? else {
            return Ok(None);
        };
        if let Some(found) = self.lookup::<T>(&EntityKey::of::<T>(entity_id)) {
            return Ok(Some(found));
        }
        let desc = descriptor::<T>()?;
        self.find_one(&desc, desc.id_column().column(), id)
    }

    pub(crate) fn find_one<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        column: &str,
        value: &RowValues,
    ) -> Result<Option<EntityRef<T>>, PersistenceError> {
        let sql = sql::select_by(desc.table(), column);
        let rs = self.query(&sql, std::slice::from_ref(value))?;
        match rs.results.as_slice() {
            [] => Ok(None),
            [row] => self.map_row(desc, row).map(Some),
            rows => Err(PersistenceError::NonUniqueResult {
                table: desc.table().to_string(),
                rows: rows.len(),
            }),
        }
    }

    pub(crate) fn find_all_by<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        column: &str,
        value: &RowValues,
    ) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        let sql = sql::select_by(desc.table(), column);
        let rs = self.query(&sql, std::slice::from_ref(value))?;
        self.map_rows(desc, &rs)
    }

    pub(crate) fn find_all<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
    ) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        let sql = sql::select_all(desc.table());
        let rs = self.query(&sql, &[])?;
        self.map_rows(desc, &rs)
    }

    /// Collection of `R` whose `mapped_by` relation holds `owner_id`.
    pub(crate) fn collection<R: Entity>(
        &mut self,
        mapped_by: &str,
        owner_id: RowValues,
        fetch: FetchType,
    ) -> Result<EntityCollection<R>, PersistenceError> {
        let desc = descriptor::<R>()?;
        let column = desc
            .relation(mapped_by)
            .filter(|r| r.kind() != RelationKind::OneToMany)
            .and_then(|r| r.join_column())
            .ok_or_else(|| {
                PersistenceError::schema(format!(
                    "mappedBy field {mapped_by} is not a to-one relation of {}",
                    desc.type_name()
                ))
            })?
            .to_string();

        match fetch {
            FetchType::Eager => Ok(EntityCollection::from_vec(
                self.find_all_by(&desc, &column, &owner_id)?,
            )),
            FetchType::Lazy => Ok(match &self.session {
                Some(session) => lazy_collection::<R>(Weak::clone(session), column, owner_id),
                None => EntityCollection::lazy(|| {
                    Err(PersistenceError::LazyInitialization {
                        entity: simple_type_name::<R>().to_string(),
                    })
                }),
            }),
        }
    }

    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PersistenceError> {
        self.persister.log_sql(sql);
        self.conn.query(sql, params)
    }

    fn map_rows<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        rs: &ResultSet,
    ) -> Result<Vec<EntityRef<T>>, PersistenceError> {
        rs.results.iter().map(|row| self.map_row(desc, row)).collect()
    }

    fn lookup<T: Entity>(&self, key: &EntityKey) -> Option<EntityRef<T>> {
        if let Some(context) = &self.context {
            return context.get_by_key::<T>(key);
        }
        let entity = Rc::clone(self.loaded.get(key)?);
        entity.downcast::<RefCell<T>>().ok()
    }

    fn register<T: Entity>(
        &mut self,
        key: EntityKey,
        entity: &EntityRef<T>,
    ) -> Result<(), PersistenceError> {
        match &mut self.context {
            Some(context) => {
                context.cache(Rc::clone(entity))?;
            }
            None => {
                self.loaded.insert(key, Rc::clone(entity) as Rc<dyn Any>);
            }
        }
        Ok(())
    }

    fn map_row<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        row: &CustomDbRow,
    ) -> Result<EntityRef<T>, PersistenceError> {
        let mut value = T::default();
        for column in desc.columns().iter().filter(|c| !c.is_join_column()) {
            column.assign(&mut value, row.get_required(column.column())?.clone())?;
        }

        let id = desc.entity_id(&value)?.ok_or_else(|| {
            PersistenceError::Mapping(format!(
                "row of {} has a NULL identifier",
                desc.table()
            ))
        })?;
        let key = EntityKey::of::<T>(id.clone());
        if let Some(existing) = self.lookup::<T>(&key) {
            return Ok(existing);
        }

        let entity = value.into_ref();
        self.register(key, &entity)?;

        for relation in desc.relations() {
            let input = match relation.join_column() {
                Some(join_column) => row.get_required(join_column)?.clone(),
                None => id.to_value(),
            };
            let mut guard = entity.try_borrow_mut().map_err(|_| {
                PersistenceError::state(format!("{} is borrowed while loading", desc.type_name()))
            })?;
            (relation.resolve)(&mut *guard, self, input)?;
        }
        Ok(entity)
    }
}
