//! Resource-layer errors.

use std::fmt;

use crate::gpu::error::PoolError;
use crate::gpu::traits::GpuError;

/// Errors returned by the upload pipeline and [`RenderResources`](super::RenderResources)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A pool could not serve the allocation
    Pool(PoolError),
    /// A device call failed
    Device(GpuError),
    /// Texture width or height is zero
    InvalidDimensions,
    /// Pixel data length does not match `width * height * 4`
    DataSizeMismatch { expected: u64, actual: u64 },
    /// The 1x1 white fallback texture could not be created
    FallbackTexture(Box<ResourceError>),
}

impl ResourceError {
    /// Whether this error was caused by caller input rather than resources.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ResourceError::Pool(PoolError::InvalidRequest)
                | ResourceError::InvalidDimensions
                | ResourceError::DataSizeMismatch { .. }
        )
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Pool(err) => write!(f, "pool error: {}", err),
            ResourceError::Device(err) => write!(f, "device error: {}", err),
            ResourceError::InvalidDimensions => write!(f, "texture dimensions must be nonzero"),
            ResourceError::DataSizeMismatch { expected, actual } => write!(
                f,
                "texture data is {} bytes, expected {}",
                actual, expected
            ),
            ResourceError::FallbackTexture(err) => write!(f, "fallback texture creation failed: {}", err),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Pool(err) => Some(err),
            ResourceError::Device(err) => Some(err),
            ResourceError::FallbackTexture(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<PoolError> for ResourceError {
    fn from(err: PoolError) -> Self {
        ResourceError::Pool(err)
    }
}

impl From<GpuError> for ResourceError {
    fn from(err: GpuError) -> Self {
        ResourceError::Device(err)
    }
}
