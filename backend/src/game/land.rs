use super::constants::{CELL_SIZE, GRID_COLS, GRID_ROWS};
use super::types::Point;
use serde::ser::{Serialize, Serializer};

/// Per-player ownership map over the field's cell partition, addressed `(col, row)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandGrid {
    cols: usize,
    rows: usize,
    cells: Vec<bool>,
}

impl LandGrid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![false; cols * rows],
        }
    }

    pub fn for_field() -> Self {
        Self::new(GRID_COLS, GRID_ROWS)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Field coordinates expressed in cell units.
    pub fn to_cell_space(point: Point) -> Point {
        Point::new(point.x / CELL_SIZE, point.y / CELL_SIZE)
    }

    fn index(&self, col: i64, row: i64) -> Option<usize> {
        if col < 0 || row < 0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.cols || row >= self.rows {
            return None;
        }
        Some(row * self.cols + col)
    }

    pub fn get(&self, col: i64, row: i64) -> bool {
        self.index(col, row)
            .map(|index| self.cells[index])
            .unwrap_or(false)
    }

    /// Marks a cell owned. Out-of-range cells are skipped and report `false`.
    pub fn set(&mut self, col: i64, row: i64) -> bool {
        match self.index(col, row) {
            Some(index) => {
                self.cells[index] = true;
                true
            }
            None => false,
        }
    }

    /// ORs every owned cell of `other` into this grid.
    pub fn merge_from(&mut self, other: &LandGrid) {
        let cols = self.cols.min(other.cols);
        let rows = self.rows.min(other.rows);
        for row in 0..rows {
            for col in 0..cols {
                if other.cells[row * other.cols + col] {
                    self.cells[row * self.cols + col] = true;
                }
            }
        }
    }

    pub fn owned_count(&self) -> usize {
        self.cells.iter().filter(|owned| **owned).count()
    }

    #[cfg(test)]
    pub fn owned_cells(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, owned)| **owned)
            .map(|(index, _)| ((index % self.cols) as i64, (index / self.cols) as i64))
    }
}

impl Serialize for LandGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.cols == 0 {
            return serializer.collect_seq(std::iter::empty::<&[bool]>());
        }
        serializer.collect_seq(self.cells.chunks(self.cols))
    }
}
