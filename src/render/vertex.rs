//! UI vertex layout.

/// One UI vertex as uploaded to geometry chunks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Position in pixels.
    pub position: [f32; 2],
    /// Premultiplied RGBA colour.
    pub colour: [u8; 4],
    /// Texture coordinate.
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex.
    pub const fn new(position: [f32; 2], colour: [u8; 4], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            colour,
            tex_coord,
        }
    }
}
