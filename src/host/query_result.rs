//! Result of a statement or batch execution (spec §4.3).

use std::time::Duration;

use crate::host::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    /// Reflects the most recent inserting statement within the call
    /// (spec §4.3 Ordering); `None` if nothing inserted a rowid.
    pub last_insert_id: Option<i64>,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
            last_insert_id: None,
            elapsed: Duration::ZERO,
        }
    }
}
