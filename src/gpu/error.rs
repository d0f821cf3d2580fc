//! Pool errors.

use std::fmt;

use super::memory::MemoryPropertyFlags;
use super::traits::GpuError;

/// Errors returned by [`BufferPool`](super::BufferPool) and
/// [`ImageMemoryPool`](super::ImageMemoryPool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Zero size or zero alignment
    InvalidRequest,
    /// No memory type in `type_filter` has the `required` properties
    NoSuitableMemoryType {
        type_filter: u32,
        required: MemoryPropertyFlags,
    },
    /// The request can never fit in one chunk or page
    ExceedsBlockSize { requested: u64, block_size: u64 },
    /// The device refused to create or back a chunk, page or dedicated allocation
    Device(GpuError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidRequest => write!(f, "invalid allocation request"),
            PoolError::NoSuitableMemoryType { type_filter, required } => write!(
                f,
                "no suitable memory type (filter=0x{:x}, props=0x{:x})",
                type_filter,
                required.bits()
            ),
            PoolError::ExceedsBlockSize { requested, block_size } => write!(
                f,
                "request of {} bytes exceeds block size of {} bytes",
                requested, block_size
            ),
            PoolError::Device(err) => write!(f, "device error: {}", err),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GpuError> for PoolError {
    fn from(err: GpuError) -> Self {
        PoolError::Device(err)
    }
}
