//! Small helpers shared by the allocators and pools.

pub(crate) mod layout;
pub mod size;
