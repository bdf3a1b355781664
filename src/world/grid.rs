//! Fixed-size cell grid holding integer cell codes
//!
//! Cells are stored row-major and serialized as `cells[y][x]` rows, which is
//! the layout documents are written in.

use crate::core::types::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer code stored in each grid cell
pub type CellCode = i32;

/// Open floor
pub const EMPTY: CellCode = 0;
/// Impassable wall
pub const WALL: CellCode = 1;
/// Goal marker, counted by `count_entities_on_goals`
pub const GOAL: CellCode = 4;

/// Largest grid a document may declare
pub const MAX_CELLS: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("grid of {width}x{height} cells is too large")]
    TooLarge { width: u32, height: u32 },

    #[error("grid declares {expected} rows but cells has {got}")]
    RowCount { expected: u32, got: usize },

    #[error("grid row {row} has {got} cells, expected {expected}")]
    RowWidth { row: usize, expected: u32, got: usize },
}

/// Dense `width x height` grid of cell codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridRepr", into = "GridRepr")]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<CellCode>,
}

#[derive(Serialize, Deserialize)]
struct GridRepr {
    width: u32,
    height: u32,
    #[serde(default)]
    cells: Vec<Vec<CellCode>>,
}

impl Grid {
    /// Create a grid with every cell empty
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        let len = Self::cell_count(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![EMPTY; len],
        })
    }

    /// Create a grid from `rows[y][x]`; an empty row list means all-empty
    pub fn from_rows(width: u32, height: u32, rows: Vec<Vec<CellCode>>) -> Result<Self, GridError> {
        let mut grid = Self::new(width, height)?;
        if rows.is_empty() {
            return Ok(grid);
        }
        if rows.len() != height as usize {
            return Err(GridError::RowCount {
                expected: height,
                got: rows.len(),
            });
        }
        for (y, row) in rows.into_iter().enumerate() {
            if row.len() != width as usize {
                return Err(GridError::RowWidth {
                    row: y,
                    expected: width,
                    got: row.len(),
                });
            }
            let start = y * width as usize;
            grid.cells[start..start + row.len()].copy_from_slice(&row);
        }
        Ok(grid)
    }

    fn cell_count(width: u32, height: u32) -> Result<usize, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::ZeroSize { width, height });
        }
        (width as usize)
            .checked_mul(height as usize)
            .filter(|&len| len <= MAX_CELLS)
            .ok_or(GridError::TooLarge { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    #[inline]
    fn index(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.y as usize * self.width as usize + pos.x as usize)
        } else {
            None
        }
    }

    /// Cell code at `pos`, `None` when off-grid
    #[inline]
    pub fn get(&self, pos: Position) -> Option<CellCode> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Set a cell; off-grid writes are ignored and reported as `false`
    pub fn set(&mut self, pos: Position, code: CellCode) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.cells[i] = code;
                true
            }
            None => false,
        }
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        self.get(pos) == Some(WALL)
    }

    pub fn is_goal(&self, pos: Position) -> bool {
        self.get(pos) == Some(GOAL)
    }

    /// All positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let width = self.width as i32;
        (0..self.height as i32).flat_map(move |y| (0..width).map(move |x| Position::new(x, y)))
    }

    pub fn rows(&self) -> Vec<Vec<CellCode>> {
        self.cells
            .chunks(self.width as usize)
            .map(|row| row.to_vec())
            .collect()
    }
}

impl TryFrom<GridRepr> for Grid {
    type Error = GridError;

    fn try_from(repr: GridRepr) -> Result<Self, Self::Error> {
        Grid::from_rows(repr.width, repr.height, repr.cells)
    }
}

impl From<Grid> for GridRepr {
    fn from(grid: Grid) -> Self {
        GridRepr {
            width: grid.width,
            height: grid.height,
            cells: grid.rows(),
        }
    }
}
