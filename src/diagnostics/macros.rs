//! Diagnostic macros used at failure sites.

/// Emit a predefined diagnostic by code.
///
/// # Example
///
/// ```rust,ignore
/// fp_emit!(FP110);
/// ```
#[macro_export]
macro_rules! fp_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
}

/// Emit a predefined diagnostic with formatted runtime context.
///
/// # Example
///
/// ```rust,ignore
/// fp_emit_ctx!(FP101, "requested {} bytes, {} chunks", size, chunks);
/// ```
#[macro_export]
macro_rules! fp_emit_ctx {
    ($code:ident, $($arg:tt)+) => {{
        $crate::diagnostics::emit::emit_with_context(
            &$crate::diagnostics::$code,
            &format!($($arg)+),
        );
    }};
}

pub use crate::{fp_emit, fp_emit_ctx};
