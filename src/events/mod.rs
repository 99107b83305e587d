//! Coalescing state channel between background producers and consumers.
//!
//! Producers (the index builder and the searcher) [`publish`](EventChannel::publish)
//! `(key, value)` pairs. At most one value is pending per key: a newer value
//! replaces an older one that has not been dispatched yet, so a consumer that
//! drains slowly only ever sees the latest state of each key.
//!
//! Consumers either register handlers and call [`dispatch`](EventChannel::dispatch)
//! periodically, or pull values with [`drain`](EventChannel::drain) / [`take`](EventChannel::take).

pub mod keys;

use crate::error::HfrError;
use log::error;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

/// Payload type carried by an event key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Int,
    Bool,
    Cursor,
    Elapsed,
    Error,
}

/// Value published for a key
#[derive(Debug, Clone)]
pub enum EventValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Cursor { row: u64, col: u32 },
    Elapsed(Duration),
    Error(Arc<HfrError>),
}

impl EventValue {
    pub fn kind(&self) -> PayloadKind {
        match self {
            EventValue::Text(_) => PayloadKind::Text,
            EventValue::Int(_) => PayloadKind::Int,
            EventValue::Bool(_) => PayloadKind::Bool,
            EventValue::Cursor { .. } => PayloadKind::Cursor,
            EventValue::Elapsed(_) => PayloadKind::Elapsed,
            EventValue::Error(_) => PayloadKind::Error,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EventValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EventValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EventValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_cursor(&self) -> Option<(u64, u32)> {
        match self {
            EventValue::Cursor { row, col } => Some((*row, *col)),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&HfrError> {
        match self {
            EventValue::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&str> for EventValue {
    fn from(s: &str) -> Self {
        EventValue::Text(s.to_string())
    }
}

impl From<String> for EventValue {
    fn from(s: String) -> Self {
        EventValue::Text(s)
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        EventValue::Int(v)
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Bool(v)
    }
}

impl From<Duration> for EventValue {
    fn from(d: Duration) -> Self {
        EventValue::Elapsed(d)
    }
}

impl From<HfrError> for EventValue {
    fn from(e: HfrError) -> Self {
        EventValue::Error(Arc::new(e))
    }
}

impl From<Arc<HfrError>> for EventValue {
    fn from(e: Arc<HfrError>) -> Self {
        EventValue::Error(e)
    }
}

/// Callback invoked with each dispatched `(key, value)`
pub type Handler = Arc<dyn Fn(&str, &EventValue) + Send + Sync>;

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handler invocations that returned normally
    pub delivered: usize,
    /// Handler invocations that panicked
    pub failed: usize,
}

/// Last-value-wins map of pending events plus the handlers registered per key
#[derive(Default)]
pub struct EventChannel {
    pending: Mutex<HashMap<String, EventValue>>,
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, EventValue>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the pending value of `key`
    pub fn publish(&self, key: &str, value: impl Into<EventValue>) {
        self.pending().insert(key.to_string(), value.into());
    }

    /// Register a handler for `key`. Several handlers may share a key.
    pub fn subscribe<F>(&self, key: &str, handler: F)
    where
        F: Fn(&str, &EventValue) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Pending value for `key` without consuming it
    pub fn peek(&self, key: &str) -> Option<EventValue> {
        self.pending().get(key).cloned()
    }

    /// Remove and return the pending value for `key`
    pub fn take(&self, key: &str) -> Option<EventValue> {
        self.pending().remove(key)
    }

    /// Payload kind documented for `key`, `None` for unknown keys
    pub fn key_kind(key: &str) -> Option<PayloadKind> {
        keys::kind_of(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    /// Remove every pending value, sorted by key
    pub fn drain(&self) -> Vec<(String, EventValue)> {
        let mut events: Vec<_> = std::mem::take(&mut *self.pending()).into_iter().collect();
        events.sort_by(|a, b| a.0.cmp(&b.0));
        events
    }

    /// Deliver every pending value to the handlers of its key, then forget it.
    ///
    /// A panicking handler does not stop the pass: the failure is logged and
    /// republished under [`keys::HANDLER_ERROR`] for the next pass.
    pub fn dispatch(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (key, value) in self.drain() {
            let handlers: Vec<Handler> = {
                let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
                match map.get(&key) {
                    Some(list) => list.clone(),
                    None => continue,
                }
            };

            for handler in handlers {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&key, &value)));
                match outcome {
                    Ok(()) => report.delivered += 1,
                    Err(payload) => {
                        report.failed += 1;
                        let message = panic_message(payload.as_ref());
                        error!("event handler for '{}' failed: {}", key, message);
                        self.publish(keys::HANDLER_ERROR, format!("{}: {}", key, message));
                    }
                }
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
