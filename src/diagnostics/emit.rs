//! Diagnostic emission backend.
//!
//! Handles outputting diagnostics to stderr, the `log` crate, or a sink
//! installed on the current thread.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::kind::{Diagnostic, DiagnosticKind};
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Global flag to enable verbose diagnostics.
static VERBOSE_DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

thread_local! {
    static THREAD_SINK: RefCell<Option<Arc<dyn DiagnosticSink>>> = RefCell::new(None);
}

/// Suppress all stderr/log output. Installed sinks still receive diagnostics.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Enable verbose diagnostic output (shows notes on stderr).
pub fn set_verbose(verbose: bool) {
    VERBOSE_DIAGNOSTICS.store(verbose, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    dispatch(diag, None);
}

/// Emit a diagnostic with additional runtime context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    dispatch(diag, Some(context));
}

fn dispatch(diag: &Diagnostic, context: Option<&str>) {
    let sink = THREAD_SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = sink {
        sink.emit(diag, context);
        return;
    }

    if is_suppressed() {
        return;
    }

    #[cfg(feature = "log")]
    emit_to_log(diag, context);

    #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
    emit_to_stderr(diag, context);
}

/// Internal: emit to stderr.
#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: Option<&str>) {
    use std::io::Write;

    if diag.kind == DiagnosticKind::Note && !VERBOSE_DIAGNOSTICS.load(Ordering::Relaxed) {
        return;
    }

    let mut stderr = std::io::stderr().lock();

    let _ = writeln!(
        stderr,
        "[framepool][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );

    if let Some(context) = context {
        let _ = writeln!(stderr, "  context: {}", context);
    }
    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }

    let _ = writeln!(stderr);
}

/// Emit a diagnostic using the log crate.
#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let context = context.unwrap_or("");
    match diag.kind {
        DiagnosticKind::Error => {
            log::error!("[{}] {} {}", diag.code, diag.message, context);
        }
        DiagnosticKind::Warning => {
            log::warn!("[{}] {} {}", diag.code, diag.message, context);
        }
        DiagnosticKind::Note => {
            log::debug!("[{}] {} {}", diag.code, diag.message, context);
        }
    }

    if diag.kind != DiagnosticKind::Note {
        if let Some(note) = diag.note {
            log::info!("  note: {}", note);
        }
        if let Some(help) = diag.help {
            log::info!("  help: {}", help);
        }
    }
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic, context: Option<&str>);
}

/// RAII guard that routes this thread's diagnostics to a sink.
///
/// The previously installed sink (if any) is restored on drop.
pub struct SinkGuard {
    previous: Option<Arc<dyn DiagnosticSink>>,
}

impl SinkGuard {
    /// Install `sink` for the current thread.
    pub fn install(sink: Arc<dyn DiagnosticSink>) -> Self {
        let previous = THREAD_SINK.with(|slot| slot.borrow_mut().replace(sink));
        Self { previous }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_SINK.with(|slot| *slot.borrow_mut() = previous);
    }
}

impl std::fmt::Debug for SinkGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkGuard")
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

/// A simple sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<(Diagnostic, Option<String>)>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics with their context.
    pub fn diagnostics(&self) -> Vec<(Diagnostic, Option<String>)> {
        self.diagnostics.lock().clone()
    }

    /// Codes of all collected diagnostics, in emission order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics.lock().iter().map(|(d, _)| d.code).collect()
    }

    /// Whether a diagnostic with `code` was collected.
    pub fn contains(&self, code: &str) -> bool {
        self.diagnostics.lock().iter().any(|(d, _)| d.code == code)
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|(d, _)| d.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: Option<&str>) {
        self.diagnostics
            .lock()
            .push((diag.clone(), context.map(str::to_owned)));
    }
}
