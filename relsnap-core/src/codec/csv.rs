/*!
Tabular-text codec: fully quoted CSV with a header line taken from the first record.
*/

use ::csv::{QuoteStyle, Terminator, WriterBuilder};

use super::{scalar_text, FormatCodec, SnapshotFormat};
use crate::{Record, Result, SnapshotError};

/// CSV export codec
///
/// Every field is quoted and embedded quotes are doubled, so values containing
/// quotes, commas or line breaks survive intact. Null renders as an empty
/// quoted field. Export only.
#[derive(Debug, Clone, Default)]
pub struct CsvCodec;

impl CsvCodec {
    pub fn new() -> Self {
        Self
    }
}

impl FormatCodec for CsvCodec {
    fn encode(&self, _table: &str, records: &[Record]) -> Result<Vec<u8>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let header: Vec<&str> = first.fields().collect();

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .double_quote(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(&header)?;
        for record in records {
            let row: Vec<String> = header
                .iter()
                .map(|field| {
                    record
                        .get(field)
                        .and_then(scalar_text)
                        .unwrap_or_default()
                })
                .collect();
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|e| SnapshotError::storage(format!("Failed to flush CSV output: {e}")))
    }

    fn format(&self) -> SnapshotFormat {
        SnapshotFormat::Csv
    }
}
