//! The walkability matrix of one map.
//!
//! A [`Matrix`] holds one [`Cell`] per tile in row-major order. It is built
//! fresh from a [`MapSnapshot`] for every navigation request and is never
//! cached across locations.

use questbot_types::{MapSnapshot, Tile};

use crate::error::WorldError;

/// Largest accepted width or height. Game maps are far smaller.
pub const MAX_DIMENSION: u32 = 4096;

/// Walkability of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    /// The avatar can stand here.
    Free,
    /// Wall, water, object or anything else the avatar cannot enter.
    Blocked,
}

/// Two-dimensional walkability grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    /// Number of columns.
    width: u32,
    /// Number of rows.
    height: u32,
    /// Cells in row-major order.
    cells: Vec<Cell>,
}

impl Matrix {
    /// Create a matrix with every tile free.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::GridTooLarge`] if either side exceeds
    /// [`MAX_DIMENSION`].
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(WorldError::GridTooLarge { width, height });
        }
        let len = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h))
            .ok_or(WorldError::GridTooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            cells: vec![Cell::Free; len],
        })
    }

    /// Build a matrix from the session's blocked-cell snapshot.
    ///
    /// Blocked tiles outside the stated dimensions are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::GridTooLarge`] if the dimensions are too large.
    pub fn from_snapshot(snapshot: &MapSnapshot) -> Result<Self, WorldError> {
        let mut matrix = Self::new(snapshot.width, snapshot.height)?;
        for &tile in &snapshot.blocked {
            matrix.set(tile, Cell::Blocked);
        }
        Ok(matrix)
    }

    /// Parse a textual grid: `#` is blocked, `.` is free, one row per line.
    ///
    /// Handy for describing small maps in configuration and tests.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::MalformedGrid`] on ragged rows or unknown
    /// characters.
    pub fn from_rows(rows: &[&str]) -> Result<Self, WorldError> {
        let width = rows.first().map_or(0, |row| row.chars().count());
        let width_u32 = u32::try_from(width).map_err(|err| WorldError::MalformedGrid {
            row: 0,
            reason: format!("row too wide: {err}"),
        })?;
        let height_u32 = u32::try_from(rows.len()).map_err(|err| WorldError::MalformedGrid {
            row: 0,
            reason: format!("too many rows: {err}"),
        })?;

        let mut cells = Vec::with_capacity(width.saturating_mul(rows.len()));
        for (row, line) in rows.iter().enumerate() {
            if line.chars().count() != width {
                return Err(WorldError::MalformedGrid {
                    row,
                    reason: format!("expected {width} columns"),
                });
            }
            for ch in line.chars() {
                let cell = match ch {
                    '.' => Cell::Free,
                    '#' => Cell::Blocked,
                    other => {
                        return Err(WorldError::MalformedGrid {
                            row,
                            reason: format!("unknown cell character {other:?}"),
                        });
                    }
                };
                cells.push(cell);
            }
        }

        Ok(Self {
            width: width_u32,
            height: height_u32,
            cells,
        })
    }

    /// Number of columns.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether `tile` lies inside the grid.
    pub const fn contains(&self, tile: Tile) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    /// Whether `tile` cannot be entered. Tiles outside the grid count as
    /// blocked.
    pub fn is_blocked(&self, tile: Tile) -> bool {
        self.cell(tile).is_none_or(|cell| cell == Cell::Blocked)
    }

    /// Whether `tile` can be entered.
    pub fn is_free(&self, tile: Tile) -> bool {
        !self.is_blocked(tile)
    }

    /// The cell at `tile`, or `None` outside the grid.
    pub fn cell(&self, tile: Tile) -> Option<Cell> {
        self.index(tile).and_then(|i| self.cells.get(i)).copied()
    }

    /// Overwrite the cell at `tile`. Returns `false` if `tile` is outside
    /// the grid.
    pub fn set(&mut self, tile: Tile, cell: Cell) -> bool {
        let Some(slot) = self.index(tile).and_then(|i| self.cells.get_mut(i)) else {
            return false;
        };
        *slot = cell;
        true
    }

    /// Row-major index of `tile`.
    fn index(&self, tile: Tile) -> Option<usize> {
        if !self.contains(tile) {
            return None;
        }
        let row = usize::try_from(tile.y).ok()?;
        let col = usize::try_from(tile.x).ok()?;
        let width = usize::try_from(self.width).ok()?;
        row.checked_mul(width)?.checked_add(col)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_marks_blocked_tiles() {
        let snapshot = MapSnapshot {
            width: 3,
            height: 2,
            blocked: vec![Tile::new(1, 0), Tile::new(9, 9)],
        };
        let matrix = Matrix::from_snapshot(&snapshot).unwrap();
        assert!(matrix.is_blocked(Tile::new(1, 0)));
        assert!(matrix.is_free(Tile::new(0, 0)));
        assert!(matrix.is_free(Tile::new(2, 1)));
        assert!(matrix.is_blocked(Tile::new(9, 9)));
    }

    #[test]
    fn outside_counts_as_blocked() {
        let matrix = Matrix::new(2, 2).unwrap();
        assert!(matrix.is_blocked(Tile::new(2, 0)));
        assert!(!matrix.contains(Tile::new(0, 2)));
    }

    #[test]
    fn rows_parse() {
        let matrix = Matrix::from_rows(&["..#", "#.."]).unwrap();
        assert_eq!(matrix.width(), 3);
        assert_eq!(matrix.height(), 2);
        assert_eq!(matrix.cell(Tile::new(2, 0)), Some(Cell::Blocked));
        assert_eq!(matrix.cell(Tile::new(0, 1)), Some(Cell::Blocked));
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Matrix::from_rows(&["...", ".."]).unwrap_err();
        assert!(matches!(err, WorldError::MalformedGrid { row: 1, .. }));
    }

    #[test]
    fn oversized_grid_rejected() {
        assert_eq!(
            Matrix::new(MAX_DIMENSION + 1, 4),
            Err(WorldError::GridTooLarge {
                width: MAX_DIMENSION + 1,
                height: 4,
            })
        );
    }
}
