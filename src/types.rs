//! Core grid types.
//!
//! Defines cell positions on the bounded 2-D grid and the per-agent
//! displacements produced by decoding a joint action.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A cell on the grid, `0 <= x < width`, `0 <= y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Origin cell (0, 0).
    pub fn origin() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Returns true if this cell lies inside a `width` x `height` grid.
    pub fn in_bounds(&self, width: usize, height: usize) -> bool {
        self.x < width && self.y < height
    }

    /// Applies a displacement, returning `None` if the result leaves the grid.
    pub fn offset(&self, d: Displacement, width: usize, height: usize) -> Option<Position> {
        let x = self.x as i64 + d.dx;
        let y = self.y as i64 + d.dy;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            return None;
        }
        Some(Position::new(x as usize, y as usize))
    }

    /// Cell coordinates as a real-valued point.
    pub fn as_point(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A single agent's move for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Displacement {
    pub dx: i64,
    pub dy: i64,
}

impl Displacement {
    pub fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    /// The "no movement" displacement.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// Euclidean length of the move.
    pub fn length(&self) -> f64 {
        ((self.dx * self.dx + self.dy * self.dy) as f64).sqrt()
    }
}

impl fmt::Display for Displacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:+}, {:+}]", self.dx, self.dy)
    }
}
