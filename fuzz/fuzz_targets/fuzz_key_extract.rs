//! Fuzz target for key extraction and filter rendering.
//!
//! Tests that `extract_key`, `string_field` and `Filter::to_condition_map`
//! never panic on arbitrary records and field names.

#![no_main]

use cmdb_replicator::filter::Filter;
use cmdb_replicator::model::{extract_key, string_field, Record};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (raw, field) = data;

    if let Ok(record) = serde_json::from_str::<Record>(raw) {
        let _ = extract_key(&record, field);
        let _ = string_field(&record, field);
        for key in record.keys() {
            let _ = extract_key(&record, key);
        }
    }

    let filter = Filter::new()
        .field_in(field, [raw])
        .field_ne(field, raw)
        .field_not_in(raw, [field]);
    let _ = filter.to_condition_map();
});
