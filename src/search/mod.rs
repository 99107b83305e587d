//! Cancellable forward/backward text search over indexed lines.
//!
//! A search runs on its own thread, walks the lines one at a time starting at
//! a cursor, wraps around the ends of the file at most once and reports its
//! progress and result through the [`EventChannel`].
//!
//! Matching is ordinal over `char`s. Case-insensitive matching folds each
//! character to upper case; there is no locale-aware collation.

use crate::error::{HfrError, Result};
use crate::events::{EventChannel, EventValue, keys};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Random access to decoded lines
pub trait LineSource: Send + Sync {
    /// Number of rows currently available
    fn rows(&self) -> u64;

    /// Text of `row`, `None` when the row is not available
    fn read_line(&self, row: u64) -> Result<Option<String>>;
}

/// Parameters of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Start row. Values outside the file start at the first row (forward) or the last (backward).
    pub row: i64,
    /// Start column in characters
    pub col: u32,
    pub needle: String,
    pub case_sensitive: bool,
    pub forward: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found { row: u64, col: u32 },
    NotFound,
    Cancelled,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }
}

/// A search running in the background
pub struct SearchHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<SearchOutcome>>>,
}

impl SearchHandle {
    /// Ask the search to stop. It returns [`SearchOutcome::Cancelled`] at the next line.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the search to end
    pub fn join(mut self) -> Result<SearchOutcome> {
        self.join_inner()
    }

    /// Cancel, then wait
    pub fn stop(self) -> Result<SearchOutcome> {
        self.cancel();
        self.join()
    }

    fn join_inner(&mut self) -> Result<SearchOutcome> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| HfrError::Invariant("search thread panicked".into()))?,
            None => Ok(SearchOutcome::Cancelled),
        }
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            let _ = self.join_inner();
        }
    }
}

/// Start `request` on a background thread
pub fn start(
    source: Arc<dyn LineSource>,
    events: Arc<EventChannel>,
    request: SearchRequest,
) -> Result<SearchHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    let thread = thread::Builder::new()
        .name("hfr-search".into())
        .spawn(move || run(source.as_ref(), &events, &request, &flag))?;

    Ok(SearchHandle {
        cancel,
        thread: Some(thread),
    })
}

/// Run `request` on the calling thread, publishing state as it goes
pub fn run(
    source: &dyn LineSource,
    events: &EventChannel,
    request: &SearchRequest,
    cancel: &AtomicBool,
) -> Result<SearchOutcome> {
    let started = Instant::now();
    events.publish(keys::SEARCH_STATE, "Searching");
    events.publish(keys::SEARCH_PROGRESS, 0i64);

    let outcome = scan(source, events, request, cancel);
    events.publish(keys::SEARCH_ELAPSED, started.elapsed());

    match &outcome {
        Ok(SearchOutcome::Found { row, col }) => {
            debug!("Found {:?} at {}:{}", request.needle, row, col);
            finish(events, *row, *col, true);
        }
        Ok(SearchOutcome::NotFound) => {
            let rows = source.rows();
            let row = start_row(request.row, rows, request.forward).unwrap_or(0);
            finish(events, row, request.col, false);
        }
        Ok(SearchOutcome::Cancelled) => {
            events.publish(keys::SEARCH_STATE, "Cancelled");
            events.publish(keys::SEARCH_REASON, "Search cancelled.");
        }
        Err(e) => {
            events.publish(keys::SEARCH_ERROR, e.duplicate());
            events.publish(keys::SEARCH_REASON, e.to_string());
            events.publish(keys::SEARCH_STATE, "Error");
        }
    }

    outcome
}

fn finish(events: &EventChannel, row: u64, col: u32, found: bool) {
    events.publish(keys::SEARCH_CURSOR, EventValue::Cursor { row, col });
    events.publish(keys::SEARCH_FOUND, found);
    events.publish(keys::SEARCH_REASON, if found { "Found" } else { "Not found" });
    events.publish(keys::SEARCH_PROGRESS, 1000i64);
    events.publish(keys::SEARCH_STATE, "Done");
}

fn start_row(row: i64, rows: u64, forward: bool) -> Option<u64> {
    if rows == 0 {
        return None;
    }
    match u64::try_from(row) {
        Ok(row) if row < rows => Some(row),
        _ if forward => Some(0),
        _ => Some(rows - 1),
    }
}

fn scan(
    source: &dyn LineSource,
    events: &EventChannel,
    request: &SearchRequest,
    cancel: &AtomicBool,
) -> Result<SearchOutcome> {
    let rows = source.rows();
    let needle = fold_text(&request.needle, request.case_sensitive);
    let Some(mut row) = start_row(request.row, rows, request.forward) else {
        return Ok(SearchOutcome::NotFound);
    };
    if needle.is_empty() {
        return Ok(SearchOutcome::NotFound);
    }

    let col = request.col as usize;
    let mut visited = 0u64;
    let mut last_permille = 0u64;

    loop {
        if cancel.load(Ordering::Acquire) {
            return Ok(SearchOutcome::Cancelled);
        }

        let line = source.read_line(row)?.unwrap_or_default();
        let hay = fold_text(&line, request.case_sensitive);

        let first = visited == 0;
        let hit = if request.forward {
            find_forward(&hay, &needle, if first { col } else { 0 })
        } else {
            find_backward(&hay, &needle, if first { col } else { usize::MAX })
        };
        if let Some(at) = hit {
            let col = u32::try_from(at).unwrap_or(u32::MAX);
            return Ok(SearchOutcome::Found { row, col });
        }

        visited += 1;
        let permille = visited * 1000 / rows;
        if permille != last_permille {
            last_permille = permille;
            events.publish(keys::SEARCH_PROGRESS, permille as i64);
        }
        if visited >= rows {
            return Ok(SearchOutcome::NotFound);
        }

        row = if request.forward {
            (row + 1) % rows
        } else if row == 0 {
            rows - 1
        } else {
            row - 1
        };
    }
}

fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

fn fold_text(text: &str, case_sensitive: bool) -> Vec<char> {
    if case_sensitive {
        text.chars().collect()
    } else {
        text.chars().map(fold_char).collect()
    }
}

/// First match starting at or after `from`
fn find_forward(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    let last = hay.len().checked_sub(needle.len())?;
    (from..=last).find(|&i| hay[i..i + needle.len()] == *needle)
}

/// Last match starting before `before`
fn find_backward(hay: &[char], needle: &[char], before: usize) -> Option<usize> {
    let last = hay.len().checked_sub(needle.len())?;
    let upper = last.min(before.checked_sub(1)?);
    (0..=upper).rev().find(|&i| hay[i..i + needle.len()] == *needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Lines(Vec<String>);

    impl Lines {
        fn of(lines: &[&str]) -> Self {
            Lines(lines.iter().map(|s| s.to_string()).collect())
        }
    }

    impl LineSource for Lines {
        fn rows(&self) -> u64 {
            self.0.len() as u64
        }

        fn read_line(&self, row: u64) -> Result<Option<String>> {
            Ok(self.0.get(row as usize).cloned())
        }
    }

    struct Failing;

    impl LineSource for Failing {
        fn rows(&self) -> u64 {
            3
        }

        fn read_line(&self, _row: u64) -> Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::Other, "disk gone").into())
        }
    }

    fn request(row: i64, col: u32, needle: &str, forward: bool) -> SearchRequest {
        SearchRequest {
            row,
            col,
            needle: needle.to_string(),
            case_sensitive: true,
            forward,
        }
    }

    fn search(source: &dyn LineSource, req: &SearchRequest) -> (SearchOutcome, EventChannel) {
        let events = EventChannel::new();
        let outcome = run(source, &events, req, &AtomicBool::new(false)).unwrap();
        (outcome, events)
    }

    #[test]
    fn test_forward_skips_match_before_column_and_wraps() {
        let lines = Lines::of(&["cat", "dog", "cat"]);
        let (outcome, events) = search(&lines, &request(0, 1, "cat", true));
        assert_eq!(outcome, SearchOutcome::Found { row: 2, col: 0 });
        assert_eq!(
            events.peek(keys::SEARCH_CURSOR).unwrap().as_cursor(),
            Some((2, 0))
        );
        assert_eq!(events.peek(keys::SEARCH_FOUND).unwrap().as_bool(), Some(true));
        assert_eq!(events.peek(keys::SEARCH_STATE).unwrap().as_text(), Some("Done"));
        assert_eq!(events.peek(keys::SEARCH_REASON).unwrap().as_text(), Some("Found"));
    }

    #[test]
    fn test_forward_from_start_of_line() {
        let lines = Lines::of(&["cat", "dog", "cat"]);
        let (outcome, _) = search(&lines, &request(0, 0, "cat", true));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 0 });
    }

    #[test]
    fn test_wraps_past_last_row() {
        let lines = Lines::of(&["needle", "hay", "hay"]);
        let (outcome, _) = search(&lines, &request(1, 0, "needle", true));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 0 });
    }

    #[test]
    fn test_backward() {
        let lines = Lines::of(&["cat", "dog", "cat"]);
        let (outcome, _) = search(&lines, &request(2, 0, "cat", false));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 0 });

        let (outcome, _) = search(&lines, &request(0, 0, "dog", false));
        assert_eq!(outcome, SearchOutcome::Found { row: 1, col: 0 });
    }

    #[test]
    fn test_backward_on_start_line_respects_column() {
        let lines = Lines::of(&["cat cat"]);
        let (outcome, _) = search(&lines, &request(0, 4, "cat", false));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 0 });
        let (outcome, _) = search(&lines, &request(0, 5, "cat", false));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 4 });
    }

    #[test]
    fn test_absent_needle_terminates() {
        let lines = Lines::of(&["cat", "dog", "cat"]);
        for forward in [true, false] {
            let (outcome, events) = search(&lines, &request(1, 0, "bird", forward));
            assert_eq!(outcome, SearchOutcome::NotFound);
            assert_eq!(events.peek(keys::SEARCH_FOUND).unwrap().as_bool(), Some(false));
            assert_eq!(events.peek(keys::SEARCH_PROGRESS).unwrap().as_int(), Some(1000));
            assert_eq!(
                events.peek(keys::SEARCH_REASON).unwrap().as_text(),
                Some("Not found")
            );
            assert_eq!(
                events.peek(keys::SEARCH_CURSOR).unwrap().as_cursor(),
                Some((1, 0))
            );
        }
    }

    #[test]
    fn test_case_folding() {
        let lines = Lines::of(&["Hello World"]);
        let mut req = request(0, 0, "WORLD", true);
        assert_eq!(search(&lines, &req).0, SearchOutcome::NotFound);
        req.case_sensitive = false;
        assert_eq!(search(&lines, &req).0, SearchOutcome::Found { row: 0, col: 6 });
    }

    #[test]
    fn test_columns_count_characters() {
        let lines = Lines::of(&["\u{e9}t\u{e9} d\u{e9}j\u{e0}"]);
        let (outcome, _) = search(&lines, &request(0, 0, "d\u{e9}j", true));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 4 });
    }

    #[test]
    fn test_start_row_is_normalised() {
        let lines = Lines::of(&["a", "b", "c"]);
        let (outcome, _) = search(&lines, &request(-5, 0, "a", true));
        assert_eq!(outcome, SearchOutcome::Found { row: 0, col: 0 });
        let (outcome, _) = search(&lines, &request(99, 5, "c", false));
        // last row, column 5 is past the end of "c"
        assert_eq!(outcome, SearchOutcome::Found { row: 2, col: 0 });
    }

    #[test]
    fn test_empty_source_and_empty_needle() {
        let empty = Lines(Vec::new());
        assert_eq!(search(&empty, &request(0, 0, "x", true)).0, SearchOutcome::NotFound);
        let lines = Lines::of(&["x"]);
        assert_eq!(search(&lines, &request(0, 0, "", true)).0, SearchOutcome::NotFound);
    }

    #[test]
    fn test_cancelled_before_first_line() {
        let lines = Lines::of(&["a", "b"]);
        let events = EventChannel::new();
        let outcome = run(&lines, &events, &request(0, 0, "b", true), &AtomicBool::new(true)).unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled);
        assert_eq!(events.peek(keys::SEARCH_STATE).unwrap().as_text(), Some("Cancelled"));
    }

    #[test]
    fn test_read_error_is_reported() {
        let events = EventChannel::new();
        let err = run(&Failing, &events, &request(0, 0, "x", true), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.kind(), "IOFailure");
        assert_eq!(events.peek(keys::SEARCH_STATE).unwrap().as_text(), Some("Error"));
        assert!(events.peek(keys::SEARCH_ERROR).unwrap().as_error().is_some());
    }

    #[test]
    fn test_background_search() {
        let lines: Arc<dyn LineSource> = Arc::new(Lines::of(&["one", "two", "three"]));
        let events = Arc::new(EventChannel::new());
        let handle = start(lines, Arc::clone(&events), request(0, 0, "three", true)).unwrap();
        assert_eq!(handle.join().unwrap(), SearchOutcome::Found { row: 2, col: 0 });
        assert!(events.peek(keys::SEARCH_ELAPSED).is_some());
    }

    #[test]
    fn test_find_helpers() {
        let hay: Vec<char> = "abcabc".chars().collect();
        let needle: Vec<char> = "abc".chars().collect();
        assert_eq!(find_forward(&hay, &needle, 1), Some(3));
        assert_eq!(find_forward(&hay, &needle, 4), None);
        assert_eq!(find_backward(&hay, &needle, 3), Some(0));
        assert_eq!(find_backward(&hay, &needle, 0), None);
        assert_eq!(find_backward(&hay, &needle, usize::MAX), Some(3));
    }
}
