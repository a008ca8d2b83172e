// SQLite module - adapts rusqlite to the runtime's driver surface
//
// - config: connector that opens physical connections from a `ConfigProvider`
// - params: parameter conversion from `RowValues` to rusqlite values
// - query: result extraction and building
// - connection: `DbConnection` implementation with auto-commit emulation

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::SqliteConnector;
pub use connection::SqliteConnection;
pub use params::{Params, row_value_to_sqlite_value};
pub use query::build_result_set;
