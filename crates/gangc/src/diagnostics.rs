//! Diagnostic reporting utilities for the gang compiler.
//!
//! This module provides lightweight, rustc-style error reporting functions
//! that emit colored diagnostic messages to stderr. Recoverable semantic
//! errors go through [`error`]; they are counted so that the driver can
//! fail the compilation at the end while individual passes keep walking
//! the tree and surface as many problems as possible in one run.
//!
//! Internal consistency failures (an analysis reaching a node kind it has
//! no rule for, a region stack underflow) go through [`fatal`], which
//! aborts compilation immediately.
//!
//! Error and warning counts are kept per thread: the compiler itself is
//! single-threaded, and per-thread counts keep parallel test binaries from
//! observing each other's diagnostics.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::pos::SourcePos;

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Structured diagnostic container for propagating compiler errors.
///
/// Most of the compiler reports eagerly through [`error`] / [`warning`];
/// the `Diagnostic` form exists for API boundaries that want to hand a
/// failure to the caller instead of printing it on the spot.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub pos: Option<SourcePos>,
}

impl Diagnostic {
    pub fn simple(severity: Severity, msg: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: msg.into(),
            pos: None,
        }
    }

    pub fn at(severity: Severity, pos: &SourcePos, msg: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: msg.into(),
            pos: Some(pos.clone()),
        }
    }

    /// Print this diagnostic through the shared reporting path.
    pub fn emit(&self) {
        report(self.severity, self.pos.as_ref(), &self.message);
    }
}

/// `Result` alias used where a failure should be handed back rather than
/// printed at the point of detection.
pub type DiagnosticResult<T> = Result<T, Box<Diagnostic>>;

thread_local! {
    static ERROR_COUNT: Cell<usize> = const { Cell::new(0) };
    static WARNING_COUNT: Cell<usize> = const { Cell::new(0) };
}

static OUTPUT_ENABLED: AtomicBool = AtomicBool::new(true);

/// Report a recoverable semantic error at `pos` and bump the error count.
///
/// The caller is expected to return its rejection sentinel afterwards;
/// sibling subtrees keep getting checked.
pub fn error(pos: &SourcePos, message: impl AsRef<str>) {
    ERROR_COUNT.with(|c| c.set(c.get() + 1));
    report(Severity::Error, Some(pos), message.as_ref());
}

/// Report a non-fatal warning at `pos`.
pub fn warning(pos: &SourcePos, message: impl AsRef<str>) {
    WARNING_COUNT.with(|c| c.set(c.get() + 1));
    report(Severity::Warning, Some(pos), message.as_ref());
}

/// Abort compilation due to an internal inconsistency.
///
/// This is reserved for bugs in the compiler itself; user-facing problems
/// must go through [`error`].
pub fn fatal(message: &str) -> ! {
    panic!("internal compiler error: {}", message);
}

/// Number of errors reported on this thread so far.
pub fn error_count() -> usize {
    ERROR_COUNT.with(|c| c.get())
}

/// Number of warnings reported on this thread so far.
pub fn warning_count() -> usize {
    WARNING_COUNT.with(|c| c.get())
}

/// Reset the per-thread error/warning counts. The driver calls this at
/// the start of a compilation unit.
pub fn reset_counts() {
    ERROR_COUNT.with(|c| c.set(0));
    WARNING_COUNT.with(|c| c.set(0));
}

fn report(severity: Severity, pos: Option<&SourcePos>, message: &str) {
    if !OUTPUT_ENABLED.load(Ordering::SeqCst) {
        return;
    }

    // ANSI escapes, matching rustc's red "error:" / yellow "warning:"
    let reset = "\x1b[0m";
    let (color, label) = match severity {
        Severity::Error => ("\x1b[31m", "error"),
        Severity::Warning => ("\x1b[33m", "warning"),
    };

    eprintln!("{}{}{}: {}", color, label, reset, message);
    if let Some(pos) = pos {
        eprintln!("  --> {}", pos);
    }
}

/// Temporarily suppresses diagnostic output for testing scenarios.
///
/// Counting still happens while suppressed, so tests can assert that an
/// error was detected without cluttering stderr. The returned guard
/// restores the previous state when dropped.
pub fn suppress() -> SuppressGuard {
    let prev = OUTPUT_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard restoring diagnostic output state.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        OUTPUT_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}
