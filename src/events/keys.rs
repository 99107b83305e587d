//! Event keys published by the engine and the payload kind carried by each.

use super::PayloadKind;

/// Load pipeline state: Opening, Validating, Building, Ready, Error, Cancelled
pub const LINES_STATE: &str = "lines.state";
/// Human readable status line
pub const LINES_STATUS: &str = "lines.status";
/// Build progress in permille
pub const LINES_PROGRESS: &str = "lines.progress";
pub const LINES_FILE: &str = "lines.file";
pub const LINES_ERROR: &str = "lines.error";
pub const LINES_REASON: &str = "lines.reason";
pub const LINES_ELAPSED: &str = "lines.elapsed";
/// True once the row count is final
pub const LINES_LOADED: &str = "lines.loaded";
/// Rows indexed so far
pub const LINES_ROWS: &str = "lines.rows";

pub const SEARCH_STATE: &str = "search.state";
pub const SEARCH_PROGRESS: &str = "search.progress";
pub const SEARCH_ERROR: &str = "search.error";
pub const SEARCH_REASON: &str = "search.reason";
pub const SEARCH_ELAPSED: &str = "search.elapsed";
/// Final cursor of a completed search (match position, or the start when not found)
pub const SEARCH_CURSOR: &str = "search.cursor";
pub const SEARCH_FOUND: &str = "search.found";

/// A registered handler panicked during dispatch
pub const HANDLER_ERROR: &str = "events.handler_error";

const KINDS: &[(&str, PayloadKind)] = &[
    (LINES_STATE, PayloadKind::Text),
    (LINES_STATUS, PayloadKind::Text),
    (LINES_PROGRESS, PayloadKind::Int),
    (LINES_FILE, PayloadKind::Text),
    (LINES_ERROR, PayloadKind::Error),
    (LINES_REASON, PayloadKind::Text),
    (LINES_ELAPSED, PayloadKind::Elapsed),
    (LINES_LOADED, PayloadKind::Bool),
    (LINES_ROWS, PayloadKind::Int),
    (SEARCH_STATE, PayloadKind::Text),
    (SEARCH_PROGRESS, PayloadKind::Int),
    (SEARCH_ERROR, PayloadKind::Error),
    (SEARCH_REASON, PayloadKind::Text),
    (SEARCH_ELAPSED, PayloadKind::Elapsed),
    (SEARCH_CURSOR, PayloadKind::Cursor),
    (SEARCH_FOUND, PayloadKind::Bool),
    (HANDLER_ERROR, PayloadKind::Text),
];

/// Payload kind documented for a known key
pub fn kind_of(key: &str) -> Option<PayloadKind> {
    KINDS.iter().find(|(k, _)| *k == key).map(|(_, kind)| *kind)
}

/// All keys known to the engine
pub fn all() -> impl Iterator<Item = &'static str> {
    KINDS.iter().map(|(k, _)| *k)
}
