//! Approximate byte-footprint accounting for records.
//!
//! The buffer layer compares queue contents against configured memory
//! budgets, so it needs a footprint number that is cheap, deterministic,
//! and consistent — not wire-accurate. The estimator is an explicit
//! visitor over the fixed [`DataRecord`] schema: because the record shape
//! is fully known ahead of time, there is no generic object-graph walking
//! and, the schema being owned and acyclic, no cycle guard.
//!
//! Costs: every traversed reference contributes one pointer word; text
//! contributes two bytes per character (producers are frequently UTF-16
//! sources); scalars cost a word. The same record always yields the same
//! estimate, which is all the threshold comparisons require.

use crate::record::{DataRecord, Field, FieldValue, TimedSample};

/// Cost of one traversed reference, in bytes.
const POINTER_SIZE: u64 = 8;

/// Returns the approximate byte footprint of a record.
///
/// Non-negative, deterministic for a given record, and never fails.
/// Route buffers call this once at enqueue time and store the result, so
/// dequeue can subtract the exact same value.
pub fn estimated_size(record: &DataRecord) -> u64 {
    POINTER_SIZE
        + text_size(&record.route)
        + record.samples.iter().map(sample_size).sum::<u64>()
}

fn sample_size(sample: &TimedSample) -> u64 {
    // One word for the group, one for the timestamp scalar, plus the
    // format tag text and the fields.
    POINTER_SIZE
        + POINTER_SIZE
        + text_size(sample.format().as_str())
        + sample.fields().iter().map(field_size).sum::<u64>()
}

fn field_size(field: &Field) -> u64 {
    POINTER_SIZE + text_size(&field.name) + value_size(&field.value)
}

fn value_size(value: &FieldValue) -> u64 {
    match value {
        FieldValue::Number(_) | FieldValue::Bool(_) => POINTER_SIZE,
        FieldValue::Text(text) => text_size(text),
    }
}

fn text_size(text: &str) -> u64 {
    POINTER_SIZE + 2 * text.chars().count() as u64
}
