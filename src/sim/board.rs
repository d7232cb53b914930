//! Triangular peg board
//!
//! A board owns its pegs (indexed by triangular number), the implicit output
//! columns below the bottom row and the buckets that partition those
//! columns. All world positions are derived from the board's position, size
//! and row count, and are recomputed after every structural edit.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::topology::{BoardId, Bucket, BucketId, Column, LogicalLocation, NodeRef, Peg};
use crate::consts::*;
use crate::error::SimError;
use crate::{grid_to_index, triangular};

/// Statistical shape a board's peg probabilities are preset to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distribution {
    /// Every peg splits evenly
    #[default]
    Binomial,
    /// Every output column is equally likely
    Uniform,
    /// Column k counts consecutive rightward falls down the right edge
    Geometric,
}

impl Distribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::Binomial => "Binomial",
            Distribution::Uniform => "Uniform",
            Distribution::Geometric => "Geometric",
        }
    }

    /// Left-fall probability of peg (row, index) for this shape
    pub fn left_probability(&self, row: usize, index: usize) -> f32 {
        match self {
            Distribution::Binomial => 0.5,
            // Keeps the ball's column uniform on 0..=row+1 after each row
            Distribution::Uniform => (row + 1 - index) as f32 / (row + 2) as f32,
            Distribution::Geometric => {
                if index == row {
                    0.5
                } else {
                    1.0
                }
            }
        }
    }
}

/// A triangular grid of pegs with its output columns and buckets
#[derive(Debug, Clone)]
pub struct Board {
    id: BoardId,
    rows: usize,
    position: Vec2,
    size: Vec2,
    unit: f32,
    open: bool,
    /// Shape to re-apply when rows are added; cleared by manual peg edits
    shape: Option<Distribution>,
    pegs: Vec<Peg>,
    columns: Vec<Column>,
    /// Sorted by start column, always a partition of the columns
    buckets: Vec<Bucket>,
    next_bucket: u32,
    /// Buckets on other boards that output into this one
    inputs: Vec<(BoardId, BucketId)>,
}

impl Board {
    /// Create a board with every peg at probability 0.5 and one bucket per column
    pub fn new(rows: usize, position: Vec2, size: Vec2) -> Result<Self, SimError> {
        Self::with_distribution(rows, Distribution::Binomial, position, size)
    }

    pub fn with_distribution(
        rows: usize,
        shape: Distribution,
        position: Vec2,
        size: Vec2,
    ) -> Result<Self, SimError> {
        if rows == 0 {
            return Err(SimError::InvalidRows(rows));
        }
        let mut board = Self {
            id: BoardId::default(),
            rows: 0,
            position,
            size,
            unit: 1.0,
            open: true,
            shape: Some(shape),
            pegs: Vec::with_capacity(triangular(rows)),
            columns: Vec::with_capacity(rows + 1),
            buckets: Vec::with_capacity(rows + 1),
            next_bucket: 0,
            inputs: Vec::new(),
        };
        board.columns.push(Column::new(0));
        let id = board.allocate_bucket_id();
        board.buckets.push(Bucket::new(id, 0, 1));
        for _ in 0..rows {
            board.push_row();
        }
        board.relayout();
        Ok(board)
    }

    fn allocate_bucket_id(&mut self) -> BucketId {
        let id = BucketId(self.next_bucket);
        self.next_bucket += 1;
        id
    }

    /// Append one row of pegs plus the output column and bucket it opens up
    fn push_row(&mut self) {
        let row = self.rows;
        for index in 0..=row {
            let p = self
                .shape
                .map(|s| s.left_probability(row, index))
                .unwrap_or(0.5);
            let peg = Peg::new(row, index, p).unwrap_or_else(|_| Peg::even(row, index));
            self.pegs.push(peg);
        }
        self.rows += 1;
        let column = self.rows;
        self.columns.push(Column::new(column));
        let id = self.allocate_bucket_id();
        self.buckets.push(Bucket::new(id, column, 1));
    }

    // === Geometry ===

    /// Recompute grid spacing and every node position
    fn relayout(&mut self) {
        let columns = self.column_count() as f32;
        let grid_height =
            TOP_MARGIN + (self.rows - 1) as f32 * ROW_HEIGHT + COLUMN_GAP + BUCKET_DEPTH;
        self.unit = (self.size.x / columns).min(self.size.y / grid_height);

        let (unit, origin) = (self.unit, self.position.x);
        let top = self.top();
        let bottom = self.bottom();
        let column_x = |column: f32| origin + (column - columns * 0.5) * unit;

        for peg in &mut self.pegs {
            let (row, index) = peg.grid_pos();
            let x = origin + (index as f32 - row as f32 * 0.5) * unit;
            let y = top - (TOP_MARGIN + row as f32 * ROW_HEIGHT) * unit;
            peg.world_pos = Vec2::new(x, y);
        }
        for column in &mut self.columns {
            let x = column_x(column.index as f32 + 0.5);
            column.top.world_pos = Vec2::new(x, bottom + BUCKET_DEPTH * unit);
            column.bottom.world_pos = Vec2::new(x, bottom);
        }
        for bucket in &mut self.buckets {
            let x = column_x(bucket.start_column as f32 + bucket.width as f32 * 0.5);
            bucket.world_pos = Vec2::new(x, bottom);
        }
    }

    /// World x of a fractional column coordinate
    fn column_x(&self, column: f32) -> f32 {
        self.position.x + (column - self.column_count() as f32 * 0.5) * self.unit
    }

    fn top(&self) -> f32 {
        self.position.y + self.size.y * 0.5
    }

    fn bottom(&self) -> f32 {
        self.position.y - self.size.y * 0.5
    }

    /// Centre of the board in world space
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Grid spacing derived from size and row count
    pub fn unit_distance(&self) -> f32 {
        self.unit
    }

    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
        self.relayout();
    }

    pub fn resize(&mut self, size: Vec2) {
        self.size = size;
        self.relayout();
    }

    /// Where incoming pipes attach, one unit above the root peg
    pub fn input_pos(&self) -> Vec2 {
        self.pegs[0].world_pos() + Vec2::new(0.0, self.unit)
    }

    /// World-space rectangle (min, max) of a bucket's liquid bar
    pub fn bucket_rect(&self, bucket: &Bucket) -> (Vec2, Vec2) {
        let bottom = self.bottom();
        let min = Vec2::new(self.column_x(bucket.start_column as f32), bottom);
        let max = Vec2::new(
            self.column_x(bucket.end_column() as f32),
            bottom + BUCKET_DEPTH * self.unit,
        );
        (min, max)
    }

    // === Addressing ===

    /// Arena handle, assigned when the board joins a simulation
    pub fn id(&self) -> BoardId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: BoardId) {
        self.id = id;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn peg_count(&self) -> usize {
        self.pegs.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows + 1
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Closed boards hold arriving balls at their bucket boundary
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    pub fn shape(&self) -> Option<Distribution> {
        self.shape
    }

    pub fn pegs(&self) -> &[Peg] {
        &self.pegs
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn peg(&self, row: usize, index: usize) -> Option<&Peg> {
        if row >= self.rows || index > row {
            return None;
        }
        self.pegs.get(grid_to_index(row, index))
    }

    pub fn peg_at(&self, peg: usize) -> Option<&Peg> {
        self.pegs.get(peg)
    }

    pub fn column(&self, column: usize) -> Option<&Column> {
        self.columns.get(column)
    }

    pub fn bucket(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.id() == id)
    }

    pub(crate) fn bucket_mut(&mut self, id: BucketId) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.id() == id)
    }

    pub(crate) fn buckets_mut(&mut self) -> impl Iterator<Item = &mut Bucket> {
        self.buckets.iter_mut()
    }

    /// Resolve a node on this board. `None` if it no longer exists.
    pub fn location(&self, node: &NodeRef) -> Option<&dyn LogicalLocation> {
        match *node {
            NodeRef::Peg { peg, .. } => self.pegs.get(peg).map(|p| p as &dyn LogicalLocation),
            NodeRef::ColumnTop { column, .. } => {
                self.columns.get(column).map(|c| &c.top as &dyn LogicalLocation)
            }
            NodeRef::ColumnBottom { column, .. } => {
                self.columns.get(column).map(|c| &c.bottom as &dyn LogicalLocation)
            }
            NodeRef::Bucket { bucket, .. } => self.bucket(bucket).map(|b| b as &dyn LogicalLocation),
        }
    }

    pub fn location_mut(&mut self, node: &NodeRef) -> Option<&mut dyn LogicalLocation> {
        match *node {
            NodeRef::Peg { peg, .. } => {
                self.pegs.get_mut(peg).map(|p| p as &mut dyn LogicalLocation)
            }
            NodeRef::ColumnTop { column, .. } => self
                .columns
                .get_mut(column)
                .map(|c| &mut c.top as &mut dyn LogicalLocation),
            NodeRef::ColumnBottom { column, .. } => self
                .columns
                .get_mut(column)
                .map(|c| &mut c.bottom as &mut dyn LogicalLocation),
            NodeRef::Bucket { bucket, .. } => self
                .bucket_mut(bucket)
                .map(|b| b as &mut dyn LogicalLocation),
        }
    }

    /// The bucket whose column range contains `column`
    pub fn bucket_for_column(&self, column: usize) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.covers(column))
    }

    /// Flat index of the child a left fall from `peg` reaches, if not on the bottom row
    pub fn left_child(&self, peg: usize) -> Option<usize> {
        let (row, index) = self.pegs.get(peg)?.grid_pos();
        (row + 1 < self.rows).then(|| grid_to_index(row + 1, index))
    }

    /// Flat index of the child a right fall from `peg` reaches, if not on the bottom row
    pub fn right_child(&self, peg: usize) -> Option<usize> {
        let (row, index) = self.pegs.get(peg)?.grid_pos();
        (row + 1 < self.rows).then(|| grid_to_index(row + 1, index + 1))
    }

    // === Probability editing ===

    pub fn set_probability(
        &mut self,
        row: usize,
        index: usize,
        probability: f32,
    ) -> Result<(), SimError> {
        let rows = self.rows;
        if row >= rows || index > row {
            return Err(SimError::UnknownPeg { row, index, rows });
        }
        self.pegs[grid_to_index(row, index)].set_probability(probability)?;
        self.shape = None;
        Ok(())
    }

    /// Reset every peg to the given shape
    pub fn apply_distribution(&mut self, shape: Distribution) {
        for peg in &mut self.pegs {
            let (row, index) = peg.grid_pos();
            // Shape probabilities are always within [0, 1]
            let _ = peg.set_probability(shape.left_probability(row, index));
        }
        self.shape = Some(shape);
    }

    // === Structural edits ===

    pub fn add_row(&mut self) {
        self.push_row();
        self.relayout();
        log::debug!("Board grown to {} rows", self.rows);
    }

    /// Remove the bottom row. Returns buckets that no longer exist so the
    /// caller can detach their outputs.
    pub fn remove_row(&mut self) -> Result<Vec<Bucket>, SimError> {
        if self.rows <= 1 {
            return Err(SimError::TooFewRows);
        }
        let lost_column = self.rows;
        self.rows -= 1;
        self.pegs.truncate(triangular(self.rows));
        self.columns.truncate(self.rows + 1);

        let mut removed = Vec::new();
        if let Some(pos) = self.buckets.iter().position(|b| b.covers(lost_column)) {
            if self.buckets[pos].width > 1 {
                self.buckets[pos].width -= 1;
            } else {
                removed.push(self.buckets.remove(pos));
            }
        }
        self.relayout();
        log::debug!("Board shrunk to {} rows", self.rows);
        Ok(removed)
    }

    /// Change a bucket's width, keeping the buckets a partition of the
    /// columns. Returns buckets swallowed by the widened one.
    pub fn set_bucket_width(&mut self, id: BucketId, width: usize) -> Result<Vec<Bucket>, SimError> {
        if width == 0 {
            return Err(SimError::ZeroWidth);
        }
        let columns = self.column_count();
        let (start, old_end) = match self.bucket(id) {
            Some(b) => (b.start_column, b.end_column()),
            None => {
                return Err(SimError::UnknownBucket {
                    board: self.id,
                    bucket: id,
                });
            }
        };
        if start + width > columns {
            return Err(SimError::WidthExceedsColumns {
                start,
                width,
                columns,
            });
        }
        let new_end = start + width;

        let mut removed = Vec::new();
        if new_end > old_end {
            let mut kept = Vec::with_capacity(self.buckets.len());
            for mut bucket in self.buckets.drain(..) {
                if bucket.id() == id {
                    bucket.width = width;
                    kept.push(bucket);
                } else if bucket.start_column >= old_end && bucket.end_column() <= new_end {
                    removed.push(bucket);
                } else if bucket.start_column >= old_end && bucket.start_column < new_end {
                    bucket.width = bucket.end_column() - new_end;
                    bucket.start_column = new_end;
                    kept.push(bucket);
                } else {
                    kept.push(bucket);
                }
            }
            self.buckets = kept;
        } else if new_end < old_end {
            if let Some(bucket) = self.bucket_mut(id) {
                bucket.width = width;
            }
            for column in new_end..old_end {
                let fresh = self.allocate_bucket_id();
                self.buckets.push(Bucket::new(fresh, column, 1));
            }
            self.buckets.sort_by_key(|b| b.start_column);
        }
        self.relayout();
        Ok(removed)
    }

    // === Inbound wiring ===

    pub fn inputs(&self) -> &[(BoardId, BucketId)] {
        &self.inputs
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    pub(crate) fn attach_input(&mut self, board: BoardId, bucket: BucketId) {
        if !self.inputs.contains(&(board, bucket)) {
            self.inputs.push((board, bucket));
        }
    }

    pub(crate) fn detach_input(&mut self, board: BoardId, bucket: BucketId) {
        self.inputs.retain(|&input| input != (board, bucket));
    }
}
