//! Data models for expocrawl.

mod record;

pub use record::{columns, ExhibitorRecord, FieldValues, DEFAULT_MISSING_VALUE};
