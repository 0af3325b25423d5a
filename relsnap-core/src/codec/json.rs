/*!
Structured-record codec: a pretty-printed JSON array of flat objects.
*/

use super::{FormatCodec, SnapshotFormat};
use crate::{Record, Result, SnapshotError};

/// JSON codec, the only format the restorer reads
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl FormatCodec for JsonCodec {
    fn encode(&self, _table: &str, records: &[Record]) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(records).map_err(SnapshotError::Json)
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<Record>> {
        serde_json::from_slice(payload).map_err(SnapshotError::Json)
    }

    fn format(&self) -> SnapshotFormat {
        SnapshotFormat::Json
    }
}
