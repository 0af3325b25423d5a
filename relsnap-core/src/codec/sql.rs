/*!
SQL-statement codec: a comment header followed by one `INSERT` per record.
*/

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{FormatCodec, SnapshotFormat};
use crate::{Record, Result};

/// SQL export codec
///
/// Strings are single-quoted with backslash escaping, numbers and booleans are
/// emitted bare, null becomes `NULL`. Export only.
#[derive(Debug, Clone)]
pub struct SqlCodec {
    generated_at: DateTime<Utc>,
}

impl SqlCodec {
    /// Codec stamping its output with the current time
    pub fn new() -> Self {
        Self::generated_at(Utc::now())
    }

    /// Codec stamping its output with a fixed time
    pub fn generated_at(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }
}

impl Default for SqlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatCodec for SqlCodec {
    fn encode(&self, table: &str, records: &[Record]) -> Result<Vec<u8>> {
        let Some(first) = records.first() else {
            return Ok(format!("-- no data for table `{table}`\n").into_bytes());
        };

        let mut out = String::new();
        out.push_str(&format!("-- Backup of table `{table}`\n"));
        out.push_str(&format!(
            "-- Generated at {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        let columns: Vec<&str> = first.fields().collect();
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        for record in records {
            let values = columns
                .iter()
                .map(|c| sql_literal(record.get(c).unwrap_or(&Value::Null)))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "INSERT INTO {} ({column_list}) VALUES ({values});\n",
                quote_identifier(table)
            ));
        }

        Ok(out.into_bytes())
    }

    fn format(&self) -> SnapshotFormat {
        SnapshotFormat::Sql
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        nested => quote_string(&nested.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
