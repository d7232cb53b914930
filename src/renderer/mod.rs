//! Mesh buffer output
//!
//! The core has no opinion on shaders, textures or windows. Each drawable
//! produces three parallel flat sequences (xyz positions, uv coordinates,
//! rgb colour values) that a rendering collaborator concatenates and
//! uploads verbatim.

pub mod shapes;
pub mod vertex;

pub use vertex::{Vertex, colours};

use crate::consts::{BALL_SIZE, PEG_SIZE, Z_BALL, Z_BOARD, Z_BUCKET};
use crate::sim::{Ball, Board, Boards, LogicalLocation, Simulation, TagPalette, liquid_bar_structure};

/// Flat per-vertex buffers: 3 position floats, 2 uv floats and 3 colour
/// floats per vertex
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<f32>,
    pub uvs: Vec<f32>,
    pub colours: Vec<f32>,
}

impl MeshBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vertices: &[Vertex]) {
        for v in vertices {
            self.positions.extend_from_slice(&v.position);
            self.uvs.extend_from_slice(&v.uv);
            self.colours.extend_from_slice(&v.colour);
        }
    }

    pub fn append(&mut self, other: &MeshBuffers) {
        self.positions.extend_from_slice(&other.positions);
        self.uvs.extend_from_slice(&other.uvs);
        self.colours.extend_from_slice(&other.colours);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Interleaved view for a single vertex buffer upload
    pub fn interleaved(&self) -> Vec<Vertex> {
        self.positions
            .chunks_exact(3)
            .zip(self.uvs.chunks_exact(2))
            .zip(self.colours.chunks_exact(3))
            .map(|((p, uv), c)| Vertex {
                position: [p[0], p[1], p[2]],
                uv: [uv[0], uv[1]],
                colour: [c[0], c[1], c[2]],
            })
            .collect()
    }
}

/// Per-frame state every drawable may read
pub struct FrameContext<'a> {
    pub boards: &'a Boards,
    pub palette: &'a TagPalette,
    pub capacity: f32,
}

impl<'a> FrameContext<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self {
            boards: sim.boards(),
            palette: sim.palette(),
            capacity: sim.capacity(),
        }
    }
}

/// Something that can emit mesh buffers
pub trait Drawable {
    fn append_mesh(&self, ctx: &FrameContext<'_>, out: &mut MeshBuffers);

    fn mesh(&self, ctx: &FrameContext<'_>) -> MeshBuffers {
        let mut out = MeshBuffers::new();
        self.append_mesh(ctx, &mut out);
        out
    }
}

impl Drawable for Board {
    fn append_mesh(&self, ctx: &FrameContext<'_>, out: &mut MeshBuffers) {
        let unit = self.unit_distance();
        let half = self.size() * 0.5;
        let background = if self.is_open() {
            colours::BOARD
        } else {
            colours::BOARD_CLOSED
        };
        out.push(&shapes::quad(
            self.position() - half,
            self.position() + half,
            Z_BOARD,
            background,
        ));

        for peg in self.pegs() {
            out.push(&shapes::peg(
                peg.world_pos(),
                PEG_SIZE * unit,
                peg.left_prob(),
                Z_BUCKET,
                colours::PEG,
            ));
        }

        for bucket in self.buckets() {
            let (min, max) = self.bucket_rect(bucket);
            let bar = liquid_bar_structure(bucket, ctx.capacity, ctx.palette);
            out.push(&shapes::liquid_bar(min, max, &bar, Z_BUCKET));

            // Pipe from the bucket floor to the board it feeds
            if let Some(target) = bucket.output().and_then(|o| ctx.boards.get(o.board)) {
                out.push(&shapes::pipe(
                    bucket.world_pos(),
                    target.input_pos(),
                    PEG_SIZE * unit * 0.5,
                    Z_BOARD,
                    colours::PIPE,
                ));
            }
        }
    }
}

impl Drawable for Ball {
    fn append_mesh(&self, ctx: &FrameContext<'_>, out: &mut MeshBuffers) {
        let unit = ctx
            .boards
            .get(self.current_node().board())
            .map(Board::unit_distance)
            .unwrap_or(1.0);
        out.push(&shapes::square(
            self.pos,
            BALL_SIZE * unit,
            Z_BALL,
            ctx.palette.peek(self.tag.as_deref()),
        ));
    }
}

/// One buffer set per drawable: every board (arena order), then every live ball
pub fn drawables(sim: &Simulation) -> Vec<MeshBuffers> {
    let ctx = FrameContext::new(sim);
    sim.boards()
        .values()
        .map(|board| board.mesh(&ctx))
        .chain(sim.balls().iter().map(|ball| ball.mesh(&ctx)))
        .collect()
}

/// Everything concatenated into one buffer set
pub fn build_buffers(sim: &Simulation) -> MeshBuffers {
    let mut out = MeshBuffers::new();
    for mesh in drawables(sim) {
        out.append(&mesh);
    }
    out
}
