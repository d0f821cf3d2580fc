//! Allocation backends.
//!
//! Pure bookkeeping, no device calls: the pools in [`crate::gpu`] own the
//! memory and use these to carve it up.

pub mod free_list;
pub mod handles;
