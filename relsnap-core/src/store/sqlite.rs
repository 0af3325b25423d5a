/*!
SQLite record store adapter.
*/

use std::collections::HashSet;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::debug;

use super::RecordStore;
use crate::catalog::EntityQuery;
use crate::{Record, Result, SnapshotError};

const BASE_ALIAS: &str = "base";

/// Record store backed by a SQLite database
///
/// Foreign keys are enforced on every connection the store opens. Inside a
/// restore transaction enforcement is switched off, so truncating a parent
/// never fires `ON DELETE` actions on tables outside the restore, and the
/// whole database is checked for dangling references before the commit.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            SnapshotError::database(format!(
                "Failed to open database {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Underlying connection, for schema setup and ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Columns whose declared type is `BLOB`
    fn blob_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name FROM pragma_table_info(?1) WHERE upper(type) = 'BLOB'",
        )?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(columns)
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl RecordStore for SqliteStore {
    fn query(&self, query: &EntityQuery) -> Result<Vec<Record>> {
        let sql = select_statement(query);
        debug!(table = query.table, sql = %sql, "running entity query");

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map([], |row| {
            let mut record = Record::new();
            for (index, name) in names.iter().enumerate() {
                record.set(name.as_str(), json_value(row.get_ref(index)?));
            }
            Ok(record)
        })?;

        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(SnapshotError::database(format!(
                "table '{table}' does not exist"
            )));
        }
        Ok(columns)
    }

    fn truncate(&mut self, table: &str) -> Result<()> {
        let sql = format!("DELETE FROM {}", quote_identifier(table));
        self.conn
            .execute(&sql, [])
            .map_err(|e| SnapshotError::database(format!("Failed to truncate {table}: {e}")))?;
        Ok(())
    }

    /// Strings bound for a column declared `BLOB` are decoded from the base64
    /// text [`RecordStore::query`] exports blobs as.
    fn insert(&mut self, table: &str, record: &Record) -> Result<()> {
        let sql = insert_statement(table, record);
        let blobs = self.blob_columns(table)?;
        let values: Vec<SqlValue> = record
            .iter()
            .map(|(field, value)| {
                if blobs.contains(field) {
                    blob_value(value)
                } else {
                    sql_value(value)
                }
            })
            .collect();

        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values.iter()))
            .map_err(|e| SnapshotError::database(format!("Insert into {table} rejected: {e}")))?;
        Ok(())
    }

    /// `PRAGMA foreign_keys` is a no-op inside a transaction, so it is
    /// switched off before `BEGIN`.
    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = OFF; BEGIN;")?;
        Ok(())
    }

    /// Refuses to commit while any row references a missing parent
    fn commit(&mut self) -> Result<()> {
        let violations = foreign_key_violations(&self.conn)?;
        if let Some(first) = violations.first() {
            return Err(SnapshotError::database(format!(
                "{} foreign key violation(s), first: {first}",
                violations.len()
            )));
        }
        self.conn
            .execute_batch("COMMIT; PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK; PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}

/// Rows reported by `PRAGMA foreign_key_check`, rendered for error messages
fn foreign_key_violations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let violations = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(match rowid {
                Some(rowid) => format!("{table} row {rowid} references a missing {parent} row"),
                None => format!("{table} references a missing {parent} row"),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(violations)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_statement(query: &EntityQuery) -> String {
    let base = quote_identifier(BASE_ALIAS);
    let mut columns = vec![format!("{base}.*")];
    let mut joins = String::new();

    for (index, join) in query.joins.iter().enumerate() {
        let alias = quote_identifier(&format!("j{index}"));
        for (column, field) in join.fields {
            columns.push(format!(
                "{alias}.{} AS {}",
                quote_identifier(column),
                quote_identifier(field)
            ));
        }
        joins.push_str(&format!(
            " LEFT JOIN {} AS {alias} ON {base}.{} = {alias}.{}",
            quote_identifier(join.table),
            quote_identifier(join.local_key),
            quote_identifier(join.foreign_key)
        ));
    }

    let mut sql = format!(
        "SELECT {} FROM {} AS {base}{joins}",
        columns.join(", "),
        quote_identifier(query.table)
    );
    if let Some(order_by) = query.order_by {
        sql.push_str(&format!(" ORDER BY {base}.{}", quote_identifier(order_by)));
    }
    sql
}

fn insert_statement(table: &str, record: &Record) -> String {
    if record.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table));
    }
    let columns = record
        .fields()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=record.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_identifier(table)
    )
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}

/// Base64 text back to bytes; text that does not decode is kept as text
fn blob_value(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => match BASE64.decode(s) {
            Ok(bytes) => SqlValue::Blob(bytes),
            Err(_) => SqlValue::Text(s.clone()),
        },
        other => sql_value(other),
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(f)) => SqlValue::Real(f),
            (None, None) => SqlValue::Text(n.to_string()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}
