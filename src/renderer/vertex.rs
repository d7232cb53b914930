//! Vertex type for the flat mesh buffers

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// One vertex: world position with depth, texture coordinate and colour
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub colour: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: Vec2, z: f32, uv: [f32; 2], colour: [f32; 3]) -> Self {
        Self {
            position: [pos.x, pos.y, z],
            uv,
            colour,
        }
    }

    /// Stride in bytes when uploaded interleaved
    pub const STRIDE: usize = std::mem::size_of::<Vertex>();
}

/// Colours for board elements
pub mod colours {
    pub const BOARD: [f32; 3] = [0.12, 0.12, 0.16];
    pub const BOARD_CLOSED: [f32; 3] = [0.22, 0.1, 0.1];
    pub const PEG: [f32; 3] = [0.85, 0.85, 0.9];
    pub const PIPE: [f32; 3] = [0.5, 0.5, 0.55];
}
