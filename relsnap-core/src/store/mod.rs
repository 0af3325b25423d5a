/*!
Relational store abstraction.

The writer and restorer reach the live database only through [`RecordStore`].
Concrete adapters live in submodules; the SQLite adapter is enabled by the
`sqlite` feature.
*/

#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::catalog::EntityQuery;
use crate::{Record, Result};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Narrow interface over the live relational store
pub trait RecordStore {
    /// Run an entity's read query, display-only joins included
    fn query(&self, query: &EntityQuery) -> Result<Vec<Record>>;

    /// Current column names of a table, in table order
    ///
    /// Fails if the table does not exist.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Delete every row of a table
    fn truncate(&mut self, table: &str) -> Result<()>;

    /// Insert a single row
    fn insert(&mut self, table: &str, record: &Record) -> Result<()>;

    /// Open a transaction spanning subsequent truncates and inserts
    ///
    /// Stores without transactions keep the default no-ops.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}
