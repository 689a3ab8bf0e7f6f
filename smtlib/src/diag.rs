// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Collect free-form diagnostics produced by a solver.
//!
//! Solvers print warnings and errors on stderr and as `(error ...)` replies.
//! These arrive on whatever thread happens to be reading, so the accumulator is
//! shared and lock-protected.

use std::sync::{Arc, Mutex};

/// Prefix marking a warning line.
pub const WARNING_MARKER: &str = "WARNING: ";

#[derive(Debug, Default)]
struct Inner {
    warnings: Vec<String>,
    errors: Vec<String>,
    // errors already dropped from the front of `errors`
    forgotten: usize,
}

/// A cloneable handle to a session's warnings and errors.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Arc<Mutex<Inner>>);

impl Diagnostics {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk of solver diagnostic text.
    ///
    /// Leading lines starting with [`WARNING_MARKER`] become warnings (with the
    /// marker removed); whatever remains, if anything, is one error.
    pub fn report(&self, msg: &str) {
        let mut s = msg.replace('\r', "");
        let mut inner = self.0.lock().unwrap();
        while let Some(rest) = s.strip_prefix(WARNING_MARKER) {
            let (warn, remaining) = match rest.find('\n') {
                Some(idx) => (rest[..idx].to_string(), rest[idx + 1..].to_string()),
                None => (rest.to_string(), String::new()),
            };
            inner.warnings.push(warn);
            s = remaining;
        }
        if s.is_empty() {
            return;
        }
        log::warn!("prover error: {s}");
        inner.errors.push(s);
    }

    /// Remove and return all buffered warnings.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut self.0.lock().unwrap().warnings)
    }

    /// Number of errors recorded so far, including forgotten ones. Useful as
    /// a mark for [`Diagnostics::errors_since`].
    pub fn error_count(&self) -> usize {
        let inner = self.0.lock().unwrap();
        inner.forgotten + inner.errors.len()
    }

    /// All retained errors recorded after the first `mark` errors.
    pub fn errors_since(&self, mark: usize) -> Vec<String> {
        let inner = self.0.lock().unwrap();
        let skip = mark.saturating_sub(inner.forgotten);
        inner.errors.iter().skip(skip).cloned().collect()
    }

    /// Whether any error recorded after the first `mark` contains `needle`.
    pub fn any_error_since(&self, mark: usize, needle: &str) -> bool {
        let inner = self.0.lock().unwrap();
        let skip = mark.saturating_sub(inner.forgotten);
        inner.errors.iter().skip(skip).any(|e| e.contains(needle))
    }

    /// Drop the errors recorded before `mark`. Later marks stay valid.
    pub fn forget_before(&self, mark: usize) {
        let mut inner = self.0.lock().unwrap();
        let n = mark.saturating_sub(inner.forgotten).min(inner.errors.len());
        inner.errors.drain(..n);
        inner.forgotten += n;
    }

    /// All errors retained so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors_since(0)
    }
}
