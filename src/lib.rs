//! Lightweight object-relational persistence runtime.
//!
//! Entities declare their table mapping through [`Entity::mapping`]. A [`SessionFactory`]
//! owns a fixed pool of connections and opens [`Session`]s; each session is a unit of work
//! with its own identity map, snapshot-based dirty checking and a queue of pending inserts
//! and deletes that runs, ordered, on flush.
//!
//! ```rust,no_run
//! use sql_persistence::prelude::*;
//!
//! #[derive(Default)]
//! struct Product {
//!     id: Option<i64>,
//!     product_name: String,
//!     price: f64,
//! }
//!
//! impl Entity for Product {
//!     fn mapping() -> EntityMapping<Self> {
//!         EntityMapping::new()
//!             .generated_id("id", |p: &Product| p.id, |p, v| p.id = v)
//!             .column("product_name", |p| p.product_name.clone(), |p, v| p.product_name = v)
//!             .column("price", |p| p.price, |p, v| p.price = v)
//!     }
//! }
//!
//! # fn main() -> Result<(), PersistenceError> {
//! let factory = SessionFactory::new(DatabaseConfig::builder("shop.db").pool_size(2).finish())?;
//! let session = factory.open_session()?;
//!
//! let product = Product { id: None, product_name: "Widget".into(), price: 9.5 }.into_ref();
//! let tx = session.transaction();
//! tx.begin()?;
//! session.persist(&product)?;
//! tx.commit()?;
//!
//! let id = product.borrow().id.unwrap();
//! let found = session.find::<Product>(id)?.unwrap();
//! assert!(std::rc::Rc::ptr_eq(&found, &product));
//!
//! session.close()?;
//! factory.close()?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod connection;
pub mod context;
pub mod conversion;
pub mod error;
pub mod lazy;
pub mod persister;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod schema;
pub mod session;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{ConfigProvider, DatabaseConfig, DatabaseConfigBuilder};
pub use connection::{Connector, DbConnection};
pub use error::PersistenceError;
pub use lazy::EntityCollection;
pub use persister::EntityPersister;
pub use pool::{ConnectionPool, PooledConnection};
pub use results::{CustomDbRow, ResultSet};
pub use schema::{Entity, EntityDescriptor, EntityMapping, EntityRef, descriptor};
pub use session::{Session, SessionFactory, Transaction};
pub use types::{EntityId, FetchType, RelationKind, RowValues};
