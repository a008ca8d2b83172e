//! Convenient imports for common functionality.
//!
//! This module re-exports the types needed to map entities and work with sessions.

pub use crate::config::{ConfigProvider, DatabaseConfig};
pub use crate::connection::{Connector, DbConnection};
pub use crate::conversion::SqlValue;
pub use crate::error::PersistenceError;
pub use crate::lazy::EntityCollection;
pub use crate::persister::EntityPersister;
pub use crate::schema::{Entity, EntityMapping, EntityRef, descriptor};
pub use crate::session::{Session, SessionFactory, Transaction};
pub use crate::types::{EntityId, FetchType, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteConnector};
