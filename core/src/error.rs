use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Too many mines: {mines} exceeds the limit of {limit}")]
    TooManyMines { mines: usize, limit: usize },
    #[error("Invalid board size {width}x{height}")]
    InvalidSize { width: usize, height: usize },
}

pub type Result<T> = core::result::Result<T, GameError>;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("save version {found} is not supported, expected {expected}")]
    VersionMismatch { found: u8, expected: u8 },
    #[error("unknown game type {0}")]
    UnknownGameType(u8),
    #[error("malformed save: {0}")]
    Malformed(&'static str),
    #[error("invalid saved game: {0}")]
    Game(#[from] GameError),
}
