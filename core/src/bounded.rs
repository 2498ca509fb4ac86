use core::num::Saturating;
use core::ops::Range;
use ndarray::Array2;
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand::seq::index;
use std::io::{self, Read, Write};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::save::*;
use crate::types::grid_index;
use crate::*;

/// Largest mine count a `width`×`height` board accepts, zero when the board
/// is smaller than the first-click safe zone.
///
/// Fails only when the area overflows `usize`.
pub fn mine_limit(width: usize, height: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .map(|total| total.saturating_sub(SAFE_ZONE))
        .ok_or(GameError::InvalidSize { width, height })
}

fn check_mine_budget(width: usize, height: usize, mines: usize) -> Result<usize> {
    let limit = mine_limit(width, height)?;
    // without room for the safe zone not even zero mines fit
    if mines > limit || width * height < SAFE_ZONE {
        return Err(GameError::TooManyMines { mines, limit });
    }
    Ok(limit)
}

/// Classic minesweeper on a fixed grid, mines are placed on the first uncover.
#[derive(Clone, Debug)]
pub struct BoundedGame {
    width: usize,
    height: usize,
    mine_count: usize,
    /// Indexed `[y, x]`, so the logical iteration order is row-major.
    field: Array2<Tile>,
    state: GameState,
    start_time: SystemTime,
    flag_count: Saturating<usize>,
    rng: SmallRng,
}

impl BoundedGame {
    pub fn new(width: usize, height: usize, mine_count: usize, seed: u64) -> Result<Self> {
        check_mine_budget(width, height, mine_count)?;

        let mut game = Self {
            width,
            height,
            mine_count: 0,
            field: Array2::default((height, width)),
            state: GameState::Start,
            start_time: UNIX_EPOCH,
            flag_count: Saturating(0),
            rng: SmallRng::seed_from_u64(seed),
        };
        game.reset(mine_count)?;
        Ok(game)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn mine_count(&self) -> usize {
        self.mine_count
    }

    pub fn flag_count(&self) -> usize {
        self.flag_count.0
    }

    /// Stored tile at `pos`, including its hidden type.
    pub fn tile(&self, pos: Position) -> Option<Tile> {
        self.index_of(pos).map(|index| self.field[index])
    }

    fn index_of(&self, pos: Position) -> Option<[usize; 2]> {
        grid_index(pos, (self.width, self.height))
    }

    fn populate(&mut self, start: Position) {
        self.field.fill(Tile::default());
        self.flag_count = Saturating(0);

        let width = self.width;
        let candidates: Vec<usize> = (0..self.field.len())
            .filter(|&i| {
                let pos = Position::new((i % width) as Coord, (i / width) as Coord);
                !start.is_adjacent_or_same(pos)
            })
            .collect();

        for pick in index::sample(&mut self.rng, candidates.len(), self.mine_count).into_iter() {
            let i = candidates[pick];
            self.field[[i / width, i % width]].tile_type = TileType::Mine;
        }

        self.fill_counts();
        log::debug!(
            "populated {}x{} field with {} mines around {}",
            self.width,
            self.height,
            self.mine_count,
            start
        );
    }

    fn fill_counts(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                if self.field[[y, x]].tile_type.is_mine() {
                    continue;
                }
                let count = self.adjacent_mines(Position::new(x as Coord, y as Coord));
                if let Some(tile_type) = TileType::from_mine_count(count) {
                    self.field[[y, x]].tile_type = tile_type;
                }
            }
        }
    }

    fn adjacent_mines(&self, pos: Position) -> u8 {
        pos.neighbors()
            .filter_map(|neighbor| self.index_of(neighbor))
            .filter(|&index| self.field[index].tile_type.is_mine())
            .count() as u8
    }

    fn reveal_mines(&mut self) {
        for tile in self.field.iter_mut().filter(|tile| tile.tile_type.is_mine()) {
            tile.discovered = true;
        }
    }

    /// Iterative flood fill with an explicit stack, bounded by the board size.
    fn flood_fill(&mut self, start: Position) {
        let mut stack = vec![start];
        let mut revealed = 0usize;

        while let Some(pos) = stack.pop() {
            let Some(index) = self.index_of(pos) else {
                continue;
            };
            let tile = &mut self.field[index];
            if tile.discovered {
                continue;
            }
            tile.discovered = true;
            revealed += 1;

            if tile.tile_type == TileType::Empty {
                stack.extend(pos.neighbors().filter(|&neighbor| {
                    self.index_of(neighbor)
                        .is_some_and(|index| !self.field[index].discovered)
                }));
            }
        }

        log::trace!("flood fill from {} revealed {} tiles", start, revealed);
    }

    fn is_cleared(&self) -> bool {
        self.field
            .iter()
            .all(|tile| tile.discovered || tile.tile_type.is_mine())
    }

    pub(crate) fn read_payload(
        reader: &mut impl Read,
        seed: u64,
    ) -> core::result::Result<Self, SaveError> {
        let width = read_len(reader, "board width out of range")?;
        let height = read_len(reader, "board height out of range")?;
        let mine_count = read_len(reader, "mine count out of range")?;
        let start_time = time_from_nanos(read_i64(reader)?);
        let state = read_state(reader)?;

        if let Err(err) = check_mine_budget(width, height, mine_count) {
            log::warn!("rejected {}x{} save: {}", width, height, err);
            return Err(err.into());
        }

        // the area was checked above; read without trusting it for allocation
        let area = width * height;
        let mut bytes = Vec::new();
        reader.by_ref().take(area as u64).read_to_end(&mut bytes)?;
        if bytes.len() != area {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let tiles = bytes
            .into_iter()
            .map(Tile::from_byte)
            .collect::<Option<Vec<_>>>()
            .ok_or(SaveError::Malformed("invalid tile byte"))?;
        let field = Array2::from_shape_vec((height, width), tiles)
            .map_err(|_| SaveError::Malformed("field does not match board size"))?;
        let flag_count = field.iter().filter(|tile| tile.flagged).count();

        Ok(Self {
            width,
            height,
            mine_count,
            field,
            state,
            start_time,
            flag_count: Saturating(flag_count),
            rng: SmallRng::seed_from_u64(seed),
        })
    }
}

/// Intersection of `[start, start + len)` with `[0, bound)`.
fn clamp_span(start: Coord, len: Coord, bound: usize) -> Range<usize> {
    let end = start.saturating_add(len.max(0));
    let clamp = |value: Coord| usize::try_from(value.max(0)).map_or(bound, |value| value.min(bound));
    clamp(start)..clamp(end)
}

impl Game for BoundedGame {
    fn reset(&mut self, mine_count: usize) -> Result<()> {
        check_mine_budget(self.width, self.height, mine_count)?;

        self.mine_count = mine_count;
        self.state = GameState::Start;
        self.start_time = UNIX_EPOCH;
        self.flag_count = Saturating(0);
        self.field.fill(Tile::default());
        log::debug!(
            "reset {}x{} game with {} mines",
            self.width,
            self.height,
            mine_count
        );
        Ok(())
    }

    fn uncover(&mut self, pos: Position) -> GameState {
        if self.state.is_final() {
            return self.state;
        }
        let Some(index) = self.index_of(pos) else {
            return self.state;
        };
        let tile = self.field[index];
        if tile.discovered || tile.flagged {
            return self.state;
        }

        if self.state == GameState::Start {
            self.populate(pos);
            self.start_time = SystemTime::now();
            self.state = GameState::Playing;
        }

        if self.field[index].tile_type.is_mine() {
            self.reveal_mines();
            self.state = GameState::Loss;
            log::debug!("mine uncovered at {}, game lost", pos);
            return self.state;
        }

        self.flood_fill(pos);

        if self.is_cleared() {
            self.state = GameState::Win;
            log::debug!("every safe tile uncovered, game won");
        }
        self.state
    }

    fn flag(&mut self, pos: Position) -> f64 {
        if self.state.is_final() {
            return self.remaining_mines();
        }
        if let Some(index) = self.index_of(pos) {
            let tile = &mut self.field[index];
            if !tile.discovered {
                tile.flagged = !tile.flagged;
                if tile.flagged {
                    self.flag_count += 1;
                } else {
                    self.flag_count -= 1;
                }
            }
        }
        self.remaining_mines()
    }

    fn remaining_mines(&self) -> f64 {
        self.mine_count as f64 - self.flag_count.0 as f64
    }

    fn state(&self) -> GameState {
        self.state
    }

    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn appearance(&self, origin: Position, width: Coord, height: Coord) -> Appearance {
        let xs = clamp_span(origin.x, width, self.width);
        let ys = clamp_span(origin.y, height, self.height);

        let mut appearance = Appearance::with_capacity(xs.len() * ys.len());
        for y in ys {
            for x in xs.clone() {
                let mut tile = self.field[[y, x]];
                // nothing is uncovered before the first click
                if self.state == GameState::Start {
                    tile.discovered = false;
                }
                appearance.insert(Position::new(x as Coord, y as Coord), tile.appearance());
            }
        }
        appearance
    }

    fn settings(&self) -> GameSettings {
        GameSettings::Bounded {
            width: self.width,
            height: self.height,
            mines: self.mine_count,
        }
    }

    fn save(&self, writer: &mut dyn Write) -> io::Result<()> {
        write_header(writer, GameKind::Bounded)?;
        write_len(writer, self.width)?;
        write_len(writer, self.height)?;
        write_len(writer, self.mine_count)?;
        write_i64(writer, time_to_nanos(self.start_time))?;
        write_state(writer, self.state)?;

        let bytes: Vec<u8> = self.field.iter().map(|tile| tile.to_byte()).collect();
        writer.write_all(&bytes)?;
        log::debug!("saved {}x{} game", self.width, self.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Board already in play with mines at fixed coordinates.
    fn layout(width: usize, height: usize, mines: &[(Coord, Coord)]) -> BoundedGame {
        let mut game = BoundedGame::new(width.max(3), height.max(3), 0, 0).unwrap();
        game.width = width;
        game.height = height;
        game.field = Array2::default((height, width));
        for &(x, y) in mines {
            game.field[[y as usize, x as usize]].tile_type = TileType::Mine;
        }
        game.mine_count = mines.len();
        game.fill_counts();
        game.state = GameState::Playing;
        game
    }

    fn mines_on_board(game: &BoundedGame) -> usize {
        game.field.iter().filter(|tile| tile.tile_type.is_mine()).count()
    }

    #[test]
    fn new_checks_mine_budget() {
        assert!(BoundedGame::new(16, 16, 247, 0).is_ok());
        assert_eq!(
            BoundedGame::new(16, 16, 248, 0).unwrap_err(),
            GameError::TooManyMines {
                mines: 248,
                limit: 247
            }
        );
        assert!(BoundedGame::new(3, 3, 0, 0).is_ok());
        assert_eq!(
            BoundedGame::new(2, 2, 0, 0).unwrap_err(),
            GameError::TooManyMines { mines: 0, limit: 0 }
        );
        assert_eq!(
            BoundedGame::new(usize::MAX, 2, 0, 0).unwrap_err(),
            GameError::InvalidSize {
                width: usize::MAX,
                height: 2
            }
        );
    }

    #[test]
    fn failed_reset_leaves_game_untouched() {
        let mut game = BoundedGame::new(9, 9, 10, 3).unwrap();
        game.uncover(Position::new(4, 4));
        let before = game.clone();

        assert!(game.reset(73).is_err());
        assert_eq!(game.state(), before.state());
        assert_eq!(game.mine_count(), 10);
        assert_eq!(game.field, before.field);
    }

    #[test]
    fn reset_starts_over() {
        let mut game = BoundedGame::new(9, 9, 10, 3).unwrap();
        game.uncover(Position::new(4, 4));
        game.flag(Position::new(0, 0));

        game.reset(20).unwrap();

        assert_eq!(game.state(), GameState::Start);
        assert_eq!(game.remaining_mines(), 20.0);
        assert!(game.field.iter().all(|tile| *tile == Tile::default()));
        assert!(game.since_start().is_zero());
    }

    #[test]
    fn first_click_is_safe() {
        for seed in 0..50 {
            let mut game = BoundedGame::new(16, 16, 40, seed).unwrap();
            let start = Position::new((seed % 16) as Coord, (seed * 7 % 16) as Coord);

            let state = game.uncover(start);
            assert!(matches!(state, GameState::Playing | GameState::Win));
            assert_eq!(mines_on_board(&game), 40);
            for neighbor in start.neighbors() {
                if let Some(tile) = game.tile(neighbor) {
                    assert!(!tile.tile_type.is_mine());
                }
            }
            assert_eq!(game.tile(start).unwrap().tile_type, TileType::Empty);
        }
    }

    #[test]
    fn densest_board_is_won_by_first_click() {
        let mut game = BoundedGame::new(9, 9, 72, 11).unwrap();

        assert_eq!(game.uncover(Position::new(4, 4)), GameState::Win);
        assert_eq!(mines_on_board(&game), 72);
    }

    #[test]
    fn flood_fill_opens_zero_region() {
        let mut game = layout(3, 3, &[(2, 2)]);

        assert_eq!(game.uncover(Position::new(0, 0)), GameState::Win);
        assert_eq!(game.tile(Position::new(1, 1)).unwrap().tile_type, TileType::One);
        assert!(!game.tile(Position::new(2, 2)).unwrap().discovered);
    }

    #[test]
    fn flood_fill_opens_flagged_safe_tiles() {
        let mut game = layout(3, 3, &[(2, 2)]);
        game.flag(Position::new(0, 1));

        assert_eq!(game.uncover(Position::new(0, 0)), GameState::Win);
        for (x, y) in [(0, 1), (0, 2), (1, 2)] {
            assert!(game.tile(Position::new(x, y)).unwrap().discovered);
        }
        let appearance = game.appearance(Position::new(0, 1), 1, 1);
        assert_eq!(appearance[&Position::new(0, 1)], TileType::Empty);

        // a flag is only ever removed by the player
        assert!(game.tile(Position::new(0, 1)).unwrap().flagged);
        assert_eq!(game.remaining_mines(), 0.0);
    }

    #[test]
    fn flagged_click_is_ignored() {
        let mut game = layout(4, 1, &[(3, 0)]);
        game.flag(Position::new(0, 0));

        assert_eq!(game.uncover(Position::new(0, 0)), GameState::Playing);
        assert!(game.field.iter().all(|tile| !tile.discovered));
    }

    #[test]
    fn hitting_a_mine_reveals_all_mines() {
        let mines = [(0, 0), (3, 3), (1, 3)];
        let mut game = layout(4, 4, &mines);

        assert_eq!(game.uncover(Position::new(3, 3)), GameState::Loss);
        for (x, y) in mines {
            assert!(game.tile(Position::new(x, y)).unwrap().discovered);
        }
        assert!(!game.tile(Position::new(2, 2)).unwrap().discovered);
    }

    #[test]
    fn uncovering_every_safe_tile_wins() {
        let mut game = BoundedGame::new(12, 10, 30, 5).unwrap();
        game.uncover(Position::new(6, 5));

        for y in 0..10 {
            for x in 0..12 {
                let pos = Position::new(x, y);
                if !game.tile(pos).unwrap().tile_type.is_mine() {
                    game.uncover(pos);
                }
            }
        }
        assert_eq!(game.state(), GameState::Win);
    }

    #[test]
    fn no_ops_leave_game_untouched() {
        let mut game = BoundedGame::new(9, 9, 10, 8).unwrap();

        assert_eq!(game.uncover(Position::new(-1, 0)), GameState::Start);
        assert_eq!(game.uncover(Position::new(0, 9)), GameState::Start);

        game.flag(Position::new(2, 2));
        assert_eq!(game.uncover(Position::new(2, 2)), GameState::Start);
        assert_eq!(game.remaining_mines(), 9.0);

        let state = game.uncover(Position::new(7, 7));
        let before = game.field.clone();
        let remaining = game.remaining_mines();
        assert_eq!(game.uncover(Position::new(7, 7)), state);
        assert_eq!(game.flag(Position::new(7, 7)), remaining);
        assert_eq!(game.flag(Position::new(100, 100)), remaining);
        assert_eq!(game.field, before);
    }

    #[test]
    fn no_moves_after_game_ends() {
        let mut game = layout(4, 4, &[(0, 0)]);
        assert_eq!(game.uncover(Position::new(0, 0)), GameState::Loss);
        let before = game.field.clone();

        assert_eq!(game.uncover(Position::new(3, 3)), GameState::Loss);
        assert_eq!(game.flag(Position::new(3, 3)), 1.0);
        assert_eq!(game.field, before);
    }

    #[test]
    fn flag_accounting() {
        let mut game = layout(4, 4, &[(0, 0)]);
        let hidden = [(1, 1), (2, 2), (3, 3), (0, 3)].map(|(x, y)| Position::new(x, y));

        for pos in hidden {
            game.flag(pos);
        }
        assert_eq!(game.remaining_mines(), -3.0);
        assert_eq!(game.flag(hidden[0]), -2.0);
        assert_eq!(game.flag_count(), 3);
        assert_eq!(
            game.flag_count(),
            game.field.iter().filter(|tile| tile.flagged).count()
        );
    }

    #[test]
    fn first_click_clears_early_flags() {
        let mut game = BoundedGame::new(9, 9, 10, 1).unwrap();
        game.flag(Position::new(8, 8));
        assert_eq!(game.remaining_mines(), 9.0);

        game.uncover(Position::new(0, 0));
        assert_eq!(game.remaining_mines(), 10.0);
        assert!(!game.tile(Position::new(8, 8)).unwrap().flagged);
    }

    #[test]
    fn appearance_is_clamped() {
        let mut game = BoundedGame::new(9, 9, 10, 2).unwrap();
        assert_eq!(game.appearance(Position::new(-5, -5), 100, 100).len(), 81);
        assert!(game.appearance(Position::new(9, 0), 5, 5).is_empty());
        assert!(game.appearance(Position::new(0, 0), -1, 5).is_empty());

        game.flag(Position::new(1, 1));
        let appearance = game.appearance(Position::new(0, 0), 2, 2);
        assert_eq!(appearance.len(), 4);
        assert_eq!(appearance[&Position::new(1, 1)], TileType::Flag);
        assert_eq!(appearance[&Position::new(0, 0)], TileType::Hidden);

        game.uncover(Position::new(5, 5));
        let appearance = game.appearance(Position::new(5, 5), 1, 1);
        assert_eq!(appearance[&Position::new(5, 5)], TileType::Empty);
    }

    #[test]
    fn save_load_round_trip() {
        let mut game = BoundedGame::new(16, 16, 40, 42).unwrap();
        game.uncover(Position::new(8, 8));
        game.flag(Position::new(0, 0));
        game.flag(Position::new(15, 0));

        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        assert_eq!(buf.len(), 2 + 4 * 8 + 1 + 256);

        let mut reader = &buf[..];
        let loaded = match load(&mut reader, 0).unwrap() {
            AnyGame::Bounded(game) => game,
            other => panic!("loaded wrong game kind: {:?}", other.kind()),
        };

        assert_eq!(loaded.size(), game.size());
        assert_eq!(loaded.mine_count(), game.mine_count());
        assert_eq!(loaded.state(), game.state());
        assert_eq!(loaded.field, game.field);
        assert_eq!(loaded.flag_count(), game.flag_count());
        assert_eq!(
            time_to_nanos(loaded.start_time()) / 1_000_000_000,
            time_to_nanos(game.start_time()) / 1_000_000_000
        );
    }

    #[test]
    fn load_rejects_mine_budget_violation() {
        let game = BoundedGame::new(9, 9, 10, 1).unwrap();
        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        // mine count field follows the header, width and height
        buf[2 + 16..2 + 24].copy_from_slice(&80i64.to_be_bytes());

        let err = load(&buf[..], 0).unwrap_err();
        assert!(matches!(err, SaveError::Game(GameError::TooManyMines { .. })));
    }

    #[test]
    fn load_rejects_invalid_tile_bytes() {
        let game = BoundedGame::new(9, 9, 10, 1).unwrap();
        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        *buf.last_mut().unwrap() = 0xf0;

        let err = load(&buf[..], 0).unwrap_err();
        assert!(matches!(err, SaveError::Malformed(_)));
    }
}
