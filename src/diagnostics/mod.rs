//! Coded diagnostics for pool and resource failures.
//!
//! Every failure site in the pools and the resource layer emits exactly one
//! diagnostic carrying a stable code plus runtime context (requested size,
//! chunk/page counts, ...), then propagates a typed error to the caller.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                         |
//! |-------|---------------------------------|
//! | FP1xx | Buffer pool                     |
//! | FP2xx | Image memory pool               |
//! | FP3xx | Texture uploads                 |
//! | FP4xx | Resource lifecycle              |
//!
//! ## Output
//!
//! With the `log` feature, diagnostics go through the `log` crate. Without
//! it, they are written to stderr in debug builds or when the `diagnostics`
//! feature is enabled. Notes (chunk and page creation) are only shown in
//! verbose mode, or at `debug` level through `log`.
//!
//! A [`DiagnosticSink`] installed on the current thread with [`SinkGuard`]
//! receives every diagnostic regardless of build configuration.

pub mod emit;
pub mod kind;
pub mod macros;

pub use emit::{emit, emit_with_context, set_verbose, suppress_diagnostics, CollectingSink, DiagnosticSink, SinkGuard};
pub use kind::{Diagnostic, DiagnosticKind};

pub use kind::{
    FP101, FP102, FP103, FP110, FP201, FP202, FP203, FP204, FP210, FP211, FP301, FP302, FP303, FP401, FP402,
    FP403,
};
