//! Conversion of OS-level diagnostics into typed failures.
//!
//! Platform calls report problems as `io::Error`. The stream types never let
//! those escape raw: each call site runs the platform operation through
//! [`capture`] together with a handler that decides which typed [`Error`](crate::Error)
//! the diagnostic becomes (or recovers from it). Operations that make
//! several attempts, such as connecting to every resolved address, use
//! [`capture_all`] to keep every diagnostic instead of only the first.

use crate::error::Result;
use std::io;

/// Run `op` and route a failure through `handler`.
///
/// The diagnostic is logged at debug level before the handler sees it, so a
/// handler that recovers (for example a non-blocking accept that found
/// nothing pending) still leaves a trace.
pub fn capture<T, F, H>(op: F, handler: H) -> Result<T>
where
    F: FnOnce() -> io::Result<T>,
    H: FnOnce(io::Error) -> Result<T>,
{
    match op() {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::debug!(error = %err, kind = ?err.kind(), "captured platform diagnostic");
            handler(err)
        }
    }
}

/// Every diagnostic raised while running a block under [`capture_all`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<io::Error>,
}

impl Diagnostics {
    pub fn push(&mut self, err: io::Error) {
        self.entries.push(err);
    }

    /// Record the error side of `result` and pass the success value through.
    pub fn record<T>(&mut self, result: io::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &io::Error> {
        self.entries.iter()
    }

    /// The most recent diagnostic, which is what a caller reporting a
    /// single failure usually wants.
    pub fn into_last(self) -> Option<io::Error> {
        self.entries.into_iter().last()
    }

    /// Human readable summary of all diagnostics, one per line.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run `block`, handing it a [`Diagnostics`] sink, and return both the
/// block's value and everything it recorded.
pub fn capture_all<T, F>(block: F) -> (T, Diagnostics)
where
    F: FnOnce(&mut Diagnostics) -> T,
{
    let mut diagnostics = Diagnostics::default();
    let value = block(&mut diagnostics);
    for (index, err) in diagnostics.iter().enumerate() {
        tracing::debug!(index, error = %err, "captured platform diagnostic");
    }
    (value, diagnostics)
}
