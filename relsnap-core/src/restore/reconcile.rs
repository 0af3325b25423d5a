/*!
Schema reconciliation between snapshot records and the live table.
*/

use std::collections::{BTreeSet, HashSet};

use crate::catalog::EntityDef;
use crate::Record;

/// Remove the display-only fields the entity's joins added at export time
///
/// Runs before [`retain_live_columns`], so a display alias is dropped even when
/// the live table happens to have a column of the same name.
pub fn strip_display_fields(def: &EntityDef, records: &mut [Record]) {
    for record in records.iter_mut() {
        for field in def.query.display_fields() {
            record.remove(field);
        }
    }
}

/// Drop every field the live table no longer has
///
/// # Returns
/// The names of the dropped fields across all records
pub fn retain_live_columns(records: &mut [Record], live_columns: &[String]) -> BTreeSet<String> {
    let live: HashSet<&str> = live_columns.iter().map(String::as_str).collect();
    let mut dropped = BTreeSet::new();

    for record in records.iter_mut() {
        dropped.extend(
            record
                .fields()
                .filter(|field| !live.contains(field))
                .map(str::to_string),
        );
        record.retain(|field| live.contains(field));
    }
    dropped
}

/// Strip display fields, then intersect with the live columns
pub fn reconcile(
    def: &EntityDef,
    records: &mut [Record],
    live_columns: &[String],
) -> BTreeSet<String> {
    strip_display_fields(def, records);
    retain_live_columns(records, live_columns)
}
