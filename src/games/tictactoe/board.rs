use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

pub const CELLS: usize = 9;

/// Winning lines, checked in this order
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Ongoing,
    Won { mark: Mark, line: [usize; 3] },
    Draw,
}

/// 3x3 grid, cells indexed 0..9 row by row
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Board {
    cells: [Option<Mark>; CELLS],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Mark>; 9]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<Mark>; 9] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    pub fn is_open(&self, index: usize) -> bool {
        matches!(self.cells.get(index), Some(None))
    }

    pub fn open_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CELLS).filter(move |i| self.cells[*i].is_none())
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Place `mark` on an open cell. Returns false for taken or out-of-range cells.
    pub fn place(&mut self, index: usize, mark: Mark) -> bool {
        if !self.is_open(index) {
            return false;
        }
        self.cells[index] = Some(mark);
        true
    }

    pub fn with_mark(mut self, index: usize, mark: Mark) -> Option<Board> {
        self.place(index, mark).then_some(self)
    }

    /// First complete line in `LINES` order
    pub fn winner(&self) -> Option<(Mark, [usize; 3])> {
        LINES.iter().find_map(|line| {
            let [a, b, c] = *line;
            match (self.cells[a], self.cells[b], self.cells[c]) {
                (Some(x), Some(y), Some(z)) if x == y && y == z => Some((x, *line)),
                _ => None,
            }
        })
    }

    pub fn state(&self) -> BoardState {
        match self.winner() {
            Some((mark, line)) => BoardState::Won { mark, line },
            None if self.is_full() => BoardState::Draw,
            None => BoardState::Ongoing,
        }
    }

    /// The single cell `mark` added to get from `self` to `next`.
    ///
    /// `None` unless `next` keeps every existing mark and adds exactly one
    /// `mark` on an open cell.
    pub fn single_move_to(&self, next: &Board, mark: Mark) -> Option<usize> {
        let mut added = None;
        for (index, (before, after)) in self.cells.iter().zip(next.cells.iter()).enumerate() {
            match (before, after) {
                (a, b) if a == b => {}
                (None, Some(m)) if *m == mark && added.is_none() => added = Some(index),
                _ => return None,
            }
        }
        added
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(3) {
            let line: Vec<String> = row
                .iter()
                .map(|cell| cell.map_or_else(|| ".".to_string(), |m| m.to_string()))
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
