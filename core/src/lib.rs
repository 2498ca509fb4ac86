//! Rules and state engine for minesweeper, on a bounded board or on an
//! unbounded board generated in chunks.
//!
//! Front ends drive a game through the [`Game`] trait and never touch the
//! boards directly. Games persist to a compact binary format, see [`load`].

use core::fmt;
use core::time::Duration;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use web_time::SystemTime;

pub use bounded::*;
pub use chunked::*;
pub use error::*;
pub use save::{SAVE_VERSION, load};
pub use tile::*;
pub use types::*;

mod bounded;
mod chunked;
mod error;
mod save;
mod tile;
mod types;

/// Tiles kept free of mines around the first click, the click itself included.
pub const SAFE_ZONE: usize = 9;

/// Visible tile types of a viewport, keyed by position.
pub type Appearance = HashMap<Position, TileType>;

/// Valid transitions:
/// - Start -> Playing, on the first successful uncover
/// - Playing -> Loss, when a mine is uncovered on a bounded board
/// - Playing -> Win, when every safe tile of a bounded board is uncovered
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    /// Nothing uncovered yet, mines are not placed
    #[default]
    Start = 0,
    Playing = 1,
    Loss = 2,
    Win = 3,
}

impl GameState {
    /// Indicates the game has ended and no moves can be made anymore
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Loss | Self::Win)
    }
}

impl TryFrom<u8> for GameState {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::Playing),
            2 => Ok(Self::Loss),
            3 => Ok(Self::Win),
            other => Err(other),
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Playing => "playing",
            Self::Loss => "loss",
            Self::Win => "win",
        })
    }
}

/// Board variant, stored as the type tag of a save.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameKind {
    Bounded = 0,
    Chunked = 1,
}

impl TryFrom<u8> for GameKind {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Bounded),
            1 => Ok(Self::Chunked),
            other => Err(other),
        }
    }
}

/// What a game is played with, enough to build a fresh one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GameSettings {
    Bounded {
        width: usize,
        height: usize,
        mines: usize,
    },
    Chunked {
        mine_density: usize,
    },
}

impl GameSettings {
    pub const fn beginner() -> Self {
        Self::Bounded {
            width: 9,
            height: 9,
            mines: 10,
        }
    }

    pub const fn intermediate() -> Self {
        Self::Bounded {
            width: 16,
            height: 16,
            mines: 40,
        }
    }

    pub const fn expert() -> Self {
        Self::Bounded {
            width: 30,
            height: 16,
            mines: 99,
        }
    }

    pub const fn infinite() -> Self {
        Self::Chunked { mine_density: 40 }
    }

    pub const fn kind(&self) -> GameKind {
        match self {
            Self::Bounded { .. } => GameKind::Bounded,
            Self::Chunked { .. } => GameKind::Chunked,
        }
    }

    /// Builds a fresh game, failing if the mine count does not fit the board.
    pub fn build(self, seed: u64) -> Result<AnyGame> {
        Ok(match self {
            Self::Bounded {
                width,
                height,
                mines,
            } => AnyGame::Bounded(BoundedGame::new(width, height, mines, seed)?),
            Self::Chunked { mine_density } => {
                AnyGame::Chunked(ChunkedGame::new(mine_density, seed)?)
            }
        })
    }
}

/// Operations shared by both boards.
///
/// Moves that cannot apply (out of range, on a flagged or uncovered tile,
/// after the game ended) are not errors: they leave the game untouched and
/// report the current state.
pub trait Game {
    /// Starts over with `mines` mines, the mine density on the infinite board.
    /// On error the game is left as it was.
    fn reset(&mut self, mines: usize) -> Result<()>;

    /// Uncovers the tile at `pos` and returns the state after the move.
    fn uncover(&mut self, pos: Position) -> GameState;

    /// Toggles the flag on a covered tile, returns [`remaining_mines`](Self::remaining_mines).
    fn flag(&mut self, pos: Position) -> f64;

    /// Mines minus flags, may go negative; infinite on the unbounded board.
    fn remaining_mines(&self) -> f64;

    fn state(&self) -> GameState;

    /// When the first tile was uncovered.
    fn start_time(&self) -> SystemTime;

    /// Time since the first uncover, zero before it.
    fn since_start(&self) -> Duration {
        if self.state() == GameState::Start {
            return Duration::ZERO;
        }
        SystemTime::now()
            .duration_since(self.start_time())
            .unwrap_or_default()
    }

    /// Visible type of every tile in `[x, x + width) × [y, y + height)` from `origin`.
    fn appearance(&self, origin: Position, width: Coord, height: Coord) -> Appearance;

    fn settings(&self) -> GameSettings;

    /// Writes the game in the binary save format.
    fn save(&self, writer: &mut dyn Write) -> io::Result<()>;
}

/// Either board, as produced by [`GameSettings::build`] and [`load`].
#[derive(Clone, Debug)]
pub enum AnyGame {
    Bounded(BoundedGame),
    Chunked(ChunkedGame),
}

impl AnyGame {
    pub fn new_bounded(width: usize, height: usize, mines: usize, seed: u64) -> Result<Self> {
        BoundedGame::new(width, height, mines, seed).map(Self::Bounded)
    }

    pub fn new_chunked(mine_density: usize, seed: u64) -> Result<Self> {
        ChunkedGame::new(mine_density, seed).map(Self::Chunked)
    }

    pub fn load<R: Read>(reader: R, seed: u64) -> core::result::Result<Self, SaveError> {
        load(reader, seed)
    }

    pub const fn kind(&self) -> GameKind {
        match self {
            Self::Bounded(_) => GameKind::Bounded,
            Self::Chunked(_) => GameKind::Chunked,
        }
    }

    fn as_game(&self) -> &dyn Game {
        match self {
            Self::Bounded(game) => game,
            Self::Chunked(game) => game,
        }
    }

    fn as_game_mut(&mut self) -> &mut dyn Game {
        match self {
            Self::Bounded(game) => game,
            Self::Chunked(game) => game,
        }
    }
}

impl Game for AnyGame {
    fn reset(&mut self, mines: usize) -> Result<()> {
        self.as_game_mut().reset(mines)
    }

    fn uncover(&mut self, pos: Position) -> GameState {
        self.as_game_mut().uncover(pos)
    }

    fn flag(&mut self, pos: Position) -> f64 {
        self.as_game_mut().flag(pos)
    }

    fn remaining_mines(&self) -> f64 {
        self.as_game().remaining_mines()
    }

    fn state(&self) -> GameState {
        self.as_game().state()
    }

    fn start_time(&self) -> SystemTime {
        self.as_game().start_time()
    }

    fn appearance(&self, origin: Position, width: Coord, height: Coord) -> Appearance {
        self.as_game().appearance(origin, width, height)
    }

    fn settings(&self) -> GameSettings {
        self.as_game().settings()
    }

    fn save(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.as_game().save(writer)
    }
}
