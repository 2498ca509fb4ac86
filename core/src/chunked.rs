use hashbrown::HashMap;
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand::seq::index;
use smallvec::SmallVec;
use std::io::{self, Read, Write};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::save::*;
use crate::*;

/// Largest mine density a chunk accepts, leaving room for the first-click safe zone.
pub const CHUNK_MINE_LIMIT: usize = CHUNK_AREA - SAFE_ZONE;

/// Upper bound on map capacity reserved from an untrusted chunk count.
const PREALLOCATED_CHUNKS: usize = 1024;

type Neighbors = SmallVec<[(Position, ChunkTile); 8]>;

/// A 16×16 block of the infinite board, indexed `[y][x]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Chunk {
    tiles: [[ChunkTile; CHUNK_SIZE]; CHUNK_SIZE],
}

impl Chunk {
    /// Chunk with `mine_count` mines, none of them within one tile of `safe` if given.
    fn random(mine_count: usize, rng: &mut SmallRng, safe: Option<(usize, usize)>) -> Self {
        let candidates: Vec<usize> = (0..CHUNK_AREA)
            .filter(|&i| {
                safe.is_none_or(|(safe_x, safe_y)| {
                    (i % CHUNK_SIZE).abs_diff(safe_x) > 1 || (i / CHUNK_SIZE).abs_diff(safe_y) > 1
                })
            })
            .collect();

        let mut chunk = Self::default();
        let amount = mine_count.min(candidates.len());
        for pick in index::sample(rng, candidates.len(), amount).into_iter() {
            let i = candidates[pick];
            chunk.tiles[i / CHUNK_SIZE][i % CHUNK_SIZE].mine = true;
        }
        chunk
    }

    fn tile(&self, (x, y): (usize, usize)) -> ChunkTile {
        self.tiles[y][x]
    }

    fn to_bytes(&self) -> [u8; CHUNK_AREA] {
        let mut bytes = [0; CHUNK_AREA];
        for (byte, tile) in bytes.iter_mut().zip(self.tiles.iter().flatten()) {
            *byte = tile.to_byte();
        }
        bytes
    }

    fn from_bytes(bytes: &[u8; CHUNK_AREA]) -> Option<Self> {
        let mut chunk = Self::default();
        for (tile, &byte) in chunk.tiles.iter_mut().flatten().zip(bytes) {
            *tile = ChunkTile::from_byte(byte)?;
        }
        Some(chunk)
    }
}

/// Minesweeper on an unbounded plane, generated chunk by chunk as it is explored.
///
/// Chunks are created on first touch and never evicted, so memory grows with
/// the explored area. There is no win and no loss: a mine hit only uncovers
/// that mine.
#[derive(Clone, Debug)]
pub struct ChunkedGame {
    mine_density: usize,
    field: HashMap<Position, Chunk>,
    state: GameState,
    start_time: SystemTime,
    rng: SmallRng,
}

impl ChunkedGame {
    pub fn new(mine_density: usize, seed: u64) -> Result<Self> {
        let mut game = Self {
            mine_density: 0,
            field: HashMap::new(),
            state: GameState::Start,
            start_time: UNIX_EPOCH,
            rng: SmallRng::seed_from_u64(seed),
        };
        game.reset(mine_density)?;
        Ok(game)
    }

    pub fn mine_density(&self) -> usize {
        self.mine_density
    }

    pub fn chunk_count(&self) -> usize {
        self.field.len()
    }

    pub fn has_chunk(&self, chunk_index: Position) -> bool {
        self.field.contains_key(&chunk_index)
    }

    /// Indices of every chunk created so far, in no particular order.
    pub fn chunk_indices(&self) -> impl Iterator<Item = Position> + '_ {
        self.field.keys().copied()
    }

    /// Stored tile at `pos`, `None` if its chunk does not exist yet.
    pub fn tile(&self, pos: Position) -> Option<ChunkTile> {
        self.field
            .get(&pos.chunk_index())
            .map(|chunk| chunk.tile(pos.chunk_offset()))
    }

    /// Tile at `pos`, creating its chunk first if needed.
    fn tile_mut(&mut self, pos: Position) -> &mut ChunkTile {
        let (x, y) = pos.chunk_offset();
        let chunk_index = pos.chunk_index();
        let mine_density = self.mine_density;
        let rng = &mut self.rng;
        let chunk = self.field.entry(chunk_index).or_insert_with(|| {
            log::trace!("creating chunk {}", chunk_index);
            Chunk::random(mine_density, rng, None)
        });
        &mut chunk.tiles[y][x]
    }

    /// The 8 tiles around `pos`, creating missing chunks.
    fn neighbors_of(&mut self, pos: Position) -> Neighbors {
        pos.neighbors()
            .map(|neighbor| (neighbor, *self.tile_mut(neighbor)))
            .collect()
    }

    /// Creates the chunk of the first click with a mine-free 3×3 around it.
    ///
    /// Only tiles inside that chunk are protected; a neighboring chunk is
    /// generated without the exemption when the reveal first reaches it.
    fn start_at(&mut self, pos: Position) {
        let chunk_index = pos.chunk_index();
        if !self.field.contains_key(&chunk_index) {
            let chunk = Chunk::random(self.mine_density, &mut self.rng, Some(pos.chunk_offset()));
            self.field.insert(chunk_index, chunk);
        }
        self.start_time = SystemTime::now();
        self.state = GameState::Playing;
        log::debug!(
            "started infinite game with density {} at {}",
            self.mine_density,
            pos
        );
    }

    /// Iterative flood fill; the work is unbounded when the reveal keeps finding open space.
    fn flood_fill(&mut self, start: Position) {
        let mut stack = vec![start];
        let mut revealed = 0usize;

        while let Some(pos) = stack.pop() {
            let tile = self.tile_mut(pos);
            if tile.discovered {
                continue;
            }
            tile.discovered = true;
            revealed += 1;

            let neighbors = self.neighbors_of(pos);
            if neighbors.iter().all(|(_, tile)| !tile.mine) {
                stack.extend(
                    neighbors
                        .into_iter()
                        .filter(|(_, tile)| !tile.discovered)
                        .map(|(neighbor, _)| neighbor),
                );
            }
        }

        log::trace!(
            "flood fill from {} revealed {} tiles, {} chunks exist",
            start,
            revealed,
            self.field.len()
        );
    }

    /// Visible type without creating chunks; a neighbor in a missing chunk counts as no mine.
    fn visible_type(&self, pos: Position) -> TileType {
        let Some(tile) = self.tile(pos) else {
            return TileType::Hidden;
        };
        if !tile.discovered {
            return if tile.flagged {
                TileType::Flag
            } else {
                TileType::Hidden
            };
        }
        if tile.mine {
            return TileType::Mine;
        }

        let count = pos
            .neighbors()
            .filter(|&neighbor| self.tile(neighbor).is_some_and(|tile| tile.mine))
            .count() as u8;
        TileType::from_mine_count(count).unwrap_or(TileType::Hidden)
    }

    pub(crate) fn read_payload(
        reader: &mut impl Read,
        seed: u64,
    ) -> core::result::Result<Self, SaveError> {
        let mine_density = read_len(reader, "mine density out of range")?;
        let start_time = time_from_nanos(read_i64(reader)?);
        let state = read_state(reader)?;

        if mine_density > CHUNK_MINE_LIMIT {
            log::warn!("rejected save with mine density {}", mine_density);
            return Err(GameError::TooManyMines {
                mines: mine_density,
                limit: CHUNK_MINE_LIMIT,
            }
            .into());
        }

        let chunk_count = read_len(reader, "chunk count out of range")?;
        let mut field = HashMap::with_capacity(chunk_count.min(PREALLOCATED_CHUNKS));
        for _ in 0..chunk_count {
            let chunk_index = Position::new(read_i64(reader)?, read_i64(reader)?);
            let mut bytes = [0; CHUNK_AREA];
            reader.read_exact(&mut bytes)?;
            let chunk =
                Chunk::from_bytes(&bytes).ok_or(SaveError::Malformed("invalid chunk tile byte"))?;
            if field.insert(chunk_index, chunk).is_some() {
                return Err(SaveError::Malformed("duplicate chunk"));
            }
        }

        Ok(Self {
            mine_density,
            field,
            state,
            start_time,
            rng: SmallRng::seed_from_u64(seed),
        })
    }
}

impl Game for ChunkedGame {
    fn reset(&mut self, mine_density: usize) -> Result<()> {
        if mine_density > CHUNK_MINE_LIMIT {
            return Err(GameError::TooManyMines {
                mines: mine_density,
                limit: CHUNK_MINE_LIMIT,
            });
        }

        self.mine_density = mine_density;
        self.state = GameState::Start;
        self.start_time = UNIX_EPOCH;
        self.field.clear();
        log::debug!("reset infinite game with density {}", mine_density);
        Ok(())
    }

    fn uncover(&mut self, pos: Position) -> GameState {
        if self.state.is_final() {
            return self.state;
        }
        if self
            .tile(pos)
            .is_some_and(|tile| tile.discovered || tile.flagged)
        {
            return self.state;
        }

        if self.state == GameState::Start {
            self.start_at(pos);
        }

        let tile = self.tile_mut(pos);
        if tile.mine {
            tile.discovered = true;
            log::debug!("mine uncovered at {}", pos);
            return self.state;
        }

        self.flood_fill(pos);
        self.state
    }

    fn flag(&mut self, pos: Position) -> f64 {
        if self.state.is_final() {
            return self.remaining_mines();
        }
        let tile = self.tile_mut(pos);
        if !tile.discovered {
            tile.flagged = !tile.flagged;
        }
        self.remaining_mines()
    }

    fn remaining_mines(&self) -> f64 {
        f64::INFINITY
    }

    fn state(&self) -> GameState {
        self.state
    }

    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn appearance(&self, origin: Position, width: Coord, height: Coord) -> Appearance {
        let xs = origin.x..origin.x.saturating_add(width.max(0));
        let ys = origin.y..origin.y.saturating_add(height.max(0));

        let mut appearance = Appearance::new();
        for y in ys {
            for x in xs.clone() {
                let pos = Position::new(x, y);
                appearance.insert(pos, self.visible_type(pos));
            }
        }
        appearance
    }

    fn settings(&self) -> GameSettings {
        GameSettings::Chunked {
            mine_density: self.mine_density,
        }
    }

    fn save(&self, writer: &mut dyn Write) -> io::Result<()> {
        write_header(writer, GameKind::Chunked)?;
        write_len(writer, self.mine_density)?;
        write_i64(writer, time_to_nanos(self.start_time))?;
        write_state(writer, self.state)?;
        write_len(writer, self.field.len())?;

        for (chunk_index, chunk) in &self.field {
            write_i64(writer, chunk_index.x)?;
            write_i64(writer, chunk_index.y)?;
            writer.write_all(&chunk.to_bytes())?;
        }
        log::debug!("saved infinite game with {} chunks", self.field.len());
        Ok(())
    }
}
