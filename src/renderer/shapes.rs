//! Shape generation for 2D primitives
//!
//! Every shape is a triangle list. UVs span the shape's bounding box.

use glam::Vec2;

use super::vertex::Vertex;
use crate::sim::{EMPTY_COLOUR, LiquidBar};

/// Axis-aligned rectangle as two triangles
pub fn quad(min: Vec2, max: Vec2, z: f32, colour: [f32; 3]) -> Vec<Vertex> {
    let (a, b) = (min, Vec2::new(max.x, min.y));
    let (c, d) = (max, Vec2::new(min.x, max.y));
    vec![
        Vertex::new(a, z, [0.0, 0.0], colour),
        Vertex::new(b, z, [1.0, 0.0], colour),
        Vertex::new(c, z, [1.0, 1.0], colour),
        Vertex::new(c, z, [1.0, 1.0], colour),
        Vertex::new(d, z, [0.0, 1.0], colour),
        Vertex::new(a, z, [0.0, 0.0], colour),
    ]
}

/// Square centred on `center`
pub fn square(center: Vec2, half_size: f32, z: f32, colour: [f32; 3]) -> Vec<Vertex> {
    let half = Vec2::splat(half_size);
    quad(center - half, center + half, z, colour)
}

/// Peg triangle. The apex leans toward the side balls fall to more often.
pub fn peg(center: Vec2, half_size: f32, left_prob: f32, z: f32, colour: [f32; 3]) -> Vec<Vertex> {
    let lean = (0.5 - left_prob) * 2.0 * half_size;
    let apex = center + Vec2::new(lean, half_size);
    let left = center + Vec2::new(-half_size, -half_size);
    let right = center + Vec2::new(half_size, -half_size);
    let apex_u = 0.5 + lean / (2.0 * half_size);
    vec![
        Vertex::new(left, z, [0.0, 0.0], colour),
        Vertex::new(right, z, [1.0, 0.0], colour),
        Vertex::new(apex, z, [apex_u, 1.0], colour),
    ]
}

/// Thick line from `from` to `to`
pub fn pipe(from: Vec2, to: Vec2, half_width: f32, z: f32, colour: [f32; 3]) -> Vec<Vertex> {
    let dir = (to - from).normalize_or_zero();
    if dir == Vec2::ZERO {
        return Vec::new();
    }
    // Perpendicular for width
    let perp = Vec2::new(-dir.y, dir.x) * half_width;

    let (fa, fb) = (from + perp, from - perp);
    let (ta, tb) = (to + perp, to - perp);
    vec![
        Vertex::new(fa, z, [0.0, 0.0], colour),
        Vertex::new(fb, z, [0.0, 1.0], colour),
        Vertex::new(ta, z, [1.0, 0.0], colour),
        Vertex::new(ta, z, [1.0, 0.0], colour),
        Vertex::new(fb, z, [0.0, 1.0], colour),
        Vertex::new(tb, z, [1.0, 1.0], colour),
    ]
}

/// Stacked liquid bar filling `min..max` from the bottom, empty space on top
pub fn liquid_bar(min: Vec2, max: Vec2, bar: &LiquidBar, z: f32) -> Vec<Vertex> {
    let height = max.y - min.y;
    let mut vertices = Vec::with_capacity((bar.segments.len() + 1) * 6);
    let mut y = min.y;

    for segment in &bar.segments {
        let h = segment.fraction.clamp(0.0, 1.0) * height;
        if h <= 0.0 {
            continue;
        }
        let top = (y + h).min(max.y);
        vertices.extend(quad(Vec2::new(min.x, y), Vec2::new(max.x, top), z, segment.colour));
        y = top;
    }
    if y < max.y {
        vertices.extend(quad(Vec2::new(min.x, y), max, z, EMPTY_COLOUR));
    }

    vertices
}
