//! Diagnostic kinds and predefined codes.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard failure: the requested operation did not happen.
    Error,
    /// Something is probably wrong or leaking, but work continues.
    Warning,
    /// Informational event (pool growth, dedicated allocations).
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "FP101").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new informational diagnostic.
    pub const fn note(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Note,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (FP1xx - Buffer pool)
// =============================================================================

/// FP101: A new buffer chunk could not be created.
pub const FP101: Diagnostic = Diagnostic::error(
    "FP101",
    "buffer pool could not grow"
).with_note("creating, backing or mapping a new host-visible chunk failed")
 .with_help("check host-visible memory availability or reduce geometry size");

/// FP102: Request larger than a whole chunk.
pub const FP102: Diagnostic = Diagnostic::error(
    "FP102",
    "buffer pool request exceeds chunk size"
).with_note("buffer pools have no dedicated path for oversized requests")
 .with_help("increase buffer_chunk_size in PoolConfig or split the geometry");

/// FP103: Shutdown while allocations are still live.
pub const FP103: Diagnostic = Diagnostic::warning(
    "FP103",
    "buffer pool shut down with live allocations"
).with_note("chunks are destroyed regardless; outstanding ranges are now dangling")
 .with_help("release all geometry before shutting the pool down");

/// FP110: Buffer pool grew by one chunk.
pub const FP110: Diagnostic = Diagnostic::note("FP110", "buffer pool created a chunk");

// =============================================================================
// Predefined diagnostics (FP2xx - Image memory pool)
// =============================================================================

/// FP201: No memory type satisfies the image requirements.
pub const FP201: Diagnostic = Diagnostic::error(
    "FP201",
    "no memory type matches the image requirements"
).with_help("check the requested property flags against the device's memory types");

/// FP202: A new image memory page could not be allocated.
pub const FP202: Diagnostic = Diagnostic::error(
    "FP202",
    "image memory pool could not grow"
).with_note("allocating a new device memory page failed")
 .with_help("reduce texture memory usage or lower image_page_size in PoolConfig");

/// FP203: A dedicated allocation for an oversized image failed.
pub const FP203: Diagnostic = Diagnostic::error(
    "FP203",
    "dedicated image allocation failed"
);

/// FP204: Shutdown while allocations are still live.
pub const FP204: Diagnostic = Diagnostic::warning(
    "FP204",
    "image memory pool shut down with live allocations"
).with_note("pages are freed regardless; outstanding ranges are now dangling")
 .with_help("release all textures before shutting the pool down");

/// FP210: Image pool grew by one page.
pub const FP210: Diagnostic = Diagnostic::note("FP210", "image memory pool created a page");

/// FP211: Oversized image took the dedicated path.
pub const FP211: Diagnostic = Diagnostic::note("FP211", "dedicated image allocation");

// =============================================================================
// Predefined diagnostics (FP3xx - Uploads)
// =============================================================================

/// FP301: Batched upload could not be recorded or submitted.
pub const FP301: Diagnostic = Diagnostic::error(
    "FP301",
    "texture upload batch failed"
).with_note("textures from this batch stay valid but have no pixel data")
 .with_help("regenerate the affected textures");

/// FP302: Immediate upload could not be recorded or submitted.
pub const FP302: Diagnostic = Diagnostic::error(
    "FP302",
    "immediate texture upload failed"
);

/// FP303: Staging buffer creation failed.
pub const FP303: Diagnostic = Diagnostic::error(
    "FP303",
    "staging buffer creation failed"
);

// =============================================================================
// Predefined diagnostics (FP4xx - Resources)
// =============================================================================

/// FP401: The fallback texture could not be created.
pub const FP401: Diagnostic = Diagnostic::error(
    "FP401",
    "fallback white texture could not be created"
).with_note("untextured geometry samples this texture; rendering cannot continue without it");

/// FP402: Geometry could not be compiled.
pub const FP402: Diagnostic = Diagnostic::warning(
    "FP402",
    "geometry dropped: buffer allocation failed"
);

/// FP403: Texture could not be generated.
pub const FP403: Diagnostic = Diagnostic::warning(
    "FP403",
    "texture dropped: generation failed"
);
