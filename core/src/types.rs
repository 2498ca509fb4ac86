use core::fmt;
use serde::{Deserialize, Serialize};

/// Single coordinate axis, signed so the infinite board can extend in every direction.
pub type Coord = i64;

/// Edge length of a chunk on the infinite board.
pub const CHUNK_SIZE: usize = 16;

/// Tiles held by one chunk.
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

const CHUNK_SIZE_COORD: Coord = CHUNK_SIZE as Coord;

/// Integer grid position `(x, y)`, also used as a chunk index on the infinite board.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: Coord,
    pub y: Coord,
}

impl Position {
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Index of the chunk holding this tile.
    ///
    /// Uses floor division, so `-1` lands in chunk `-1` rather than chunk `0`.
    pub const fn chunk_index(self) -> Position {
        Position::new(
            self.x.div_euclid(CHUNK_SIZE_COORD),
            self.y.div_euclid(CHUNK_SIZE_COORD),
        )
    }

    /// Offset of this tile inside its chunk, each axis in `0..CHUNK_SIZE`.
    pub const fn chunk_offset(self) -> (usize, usize) {
        (
            self.x.rem_euclid(CHUNK_SIZE_COORD) as usize,
            self.y.rem_euclid(CHUNK_SIZE_COORD) as usize,
        )
    }

    /// Inverse of [`chunk_index`](Self::chunk_index) and [`chunk_offset`](Self::chunk_offset).
    ///
    /// Returns `None` when the tile would fall outside the coordinate range.
    pub fn from_chunk(chunk: Position, (offset_x, offset_y): (usize, usize)) -> Option<Position> {
        let x = chunk
            .x
            .checked_mul(CHUNK_SIZE_COORD)?
            .checked_add(offset_x as Coord)?;
        let y = chunk
            .y
            .checked_mul(CHUNK_SIZE_COORD)?
            .checked_add(offset_y as Coord)?;
        Some(Position::new(x, y))
    }

    /// The 8 surrounding positions; positions past the edge of the coordinate range are skipped.
    pub fn neighbors(self) -> NeighborIter {
        NeighborIter::new(self)
    }

    /// Whether `other` is within Chebyshev distance 1 of this position (itself included).
    pub fn is_adjacent_or_same(self, other: Position) -> bool {
        self.x.abs_diff(other.x) <= 1 && self.y.abs_diff(other.y) <= 1
    }
}

impl From<(Coord, Coord)> for Position {
    fn from((x, y): (Coord, Coord)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

const DISPLACEMENTS: [(Coord, Coord); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug)]
pub struct NeighborIter {
    center: Position,
    index: u8,
}

impl NeighborIter {
    fn new(center: Position) -> Self {
        Self { center, index: 0 }
    }
}

impl Iterator for NeighborIter {
    type Item = Position;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (dx, dy) = *DISPLACEMENTS.get(usize::from(self.index))?;
            self.index += 1;

            let next_item = self
                .center
                .x
                .checked_add(dx)
                .zip(self.center.y.checked_add(dy))
                .map(|(x, y)| Position::new(x, y));

            if next_item.is_some() {
                return next_item;
            }
        }
    }
}

/// Converts a position into a `[row, column]` index of a `width`×`height` grid, if it is in bounds.
pub(crate) fn grid_index(pos: Position, (width, height): (usize, usize)) -> Option<[usize; 2]> {
    let x = usize::try_from(pos.x).ok().filter(|&x| x < width)?;
    let y = usize::try_from(pos.y).ok().filter(|&y| y < height)?;
    Some([y, x])
}
