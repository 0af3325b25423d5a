/*!
Format codecs for entity snapshots.

This module defines the codec abstraction and the three registered formats.
Only the structured-record (JSON) format can be decoded; the tabular and SQL
formats are export-only and are never read back by the restorer.
*/

pub mod csv;
pub mod json;
pub mod sql;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Record, Result, SnapshotError};

pub use self::csv::CsvCodec;
pub use self::json::JsonCodec;
pub use self::sql::SqlCodec;

/// Codec abstraction for entity snapshot payloads
///
/// Implementations turn an ordered record sequence into bytes. The `table`
/// argument names the entity being encoded; formats that embed it (SQL) use it,
/// others ignore it.
pub trait FormatCodec {
    /// Encode the records of one entity
    fn encode(&self, table: &str, records: &[Record]) -> Result<Vec<u8>>;

    /// Decode a payload previously produced by [`FormatCodec::encode`]
    ///
    /// Export-only formats keep the default, which rejects the call.
    fn decode(&self, _payload: &[u8]) -> Result<Vec<Record>> {
        Err(SnapshotError::UnsupportedFormat(format!(
            "{} snapshots cannot be read back",
            self.format()
        )))
    }

    /// The format this codec implements
    fn format(&self) -> SnapshotFormat;
}

/// The registered snapshot formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// Pretty-printed JSON array of objects (the only restorable format)
    Json,
    /// Fully quoted CSV with a header line
    Csv,
    /// One `INSERT` statement per record
    Sql,
}

impl SnapshotFormat {
    pub const ALL: [SnapshotFormat; 3] = [Self::Json, Self::Csv, Self::Sql];

    /// File extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Sql => "sql",
        }
    }

    /// Build the codec for this format
    pub fn codec(self) -> Box<dyn FormatCodec> {
        match self {
            Self::Json => Box::new(JsonCodec::new()),
            Self::Csv => Box::new(CsvCodec::new()),
            Self::Sql => Box::new(SqlCodec::new()),
        }
    }

    /// File name of an entity's snapshot in this format
    pub fn file_name(self, entity: &str) -> String {
        format!("{entity}.{}", self.extension())
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SnapshotFormat {
    type Err = SnapshotError;

    /// Accepts the extension names and the descriptive aliases
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(Self::Json),
            "csv" | "tabular" => Ok(Self::Csv),
            "sql" => Ok(Self::Sql),
            other => Err(SnapshotError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render a scalar value as plain text, `None` for null
pub(crate) fn scalar_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats_and_aliases() {
        assert_eq!("json".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Json);
        assert_eq!("Structured".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Json);
        assert_eq!("tabular".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Csv);
        assert_eq!("SQL".parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Sql);
    }

    #[test]
    fn test_unknown_format_is_unsupported() {
        let err = "xml".parse::<SnapshotFormat>().unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedFormat(f) if f == "xml"));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(SnapshotFormat::Json.file_name("cities"), "cities.json");
        assert_eq!(SnapshotFormat::Csv.file_name("jobs"), "jobs.csv");
        assert_eq!(SnapshotFormat::Sql.file_name("deals"), "deals.sql");
    }

    #[test]
    fn test_export_only_codecs_refuse_decode() {
        for format in [SnapshotFormat::Csv, SnapshotFormat::Sql] {
            let err = format.codec().decode(b"anything").unwrap_err();
            assert!(matches!(err, SnapshotError::UnsupportedFormat(_)));
        }
    }
}
