use bitflags::bitflags;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Kind of a tile as shown to the player.
///
/// `Hidden` and `Flag` are never stored on a tile, they only describe what an
/// undiscovered tile looks like.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
    #[default]
    Empty = 0,
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Mine = 9,
    Hidden = 10,
    Flag = 11,
}

impl TileType {
    pub const ALL: [TileType; 12] = [
        TileType::Empty,
        TileType::One,
        TileType::Two,
        TileType::Three,
        TileType::Four,
        TileType::Five,
        TileType::Six,
        TileType::Seven,
        TileType::Eight,
        TileType::Mine,
        TileType::Hidden,
        TileType::Flag,
    ];

    /// Type of a safe tile with `count` adjacent mines, `None` above 8.
    pub const fn from_mine_count(count: u8) -> Option<Self> {
        if count <= 8 {
            Some(Self::ALL[count as usize])
        } else {
            None
        }
    }

    /// Number of adjacent mines for `Empty` and the numbered types.
    pub const fn mine_count(self) -> Option<u8> {
        match self {
            Self::Mine | Self::Hidden | Self::Flag => None,
            other => Some(other as u8),
        }
    }

    pub const fn is_mine(self) -> bool {
        matches!(self, Self::Mine)
    }
}

impl TryFrom<u8> for TileType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(value)).copied().ok_or(value)
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str(" "),
            Self::Mine => f.write_str("*"),
            Self::Hidden => f.write_str("#"),
            Self::Flag => f.write_str("F"),
            other => write!(f, "{}", *other as u8),
        }
    }
}

bitflags! {
    /// Bit layout shared by both tile byte encodings.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TileBits: u8 {
        const DISCOVERED = 1 << 0;
        const FLAGGED = 1 << 1;
        /// Chunk tiles only, bounded tiles keep their type in the upper nibble.
        const MINE = 1 << 2;
    }
}

const TYPE_SHIFT: u32 = 4;

/// A tile of the bounded board.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub discovered: bool,
    pub flagged: bool,
    pub tile_type: TileType,
}

impl Tile {
    /// Visible type: the stored type once discovered, otherwise `Flag` or `Hidden`.
    pub const fn appearance(self) -> TileType {
        if self.discovered {
            self.tile_type
        } else if self.flagged {
            TileType::Flag
        } else {
            TileType::Hidden
        }
    }

    /// Packs as `bit0 discovered | bit1 flagged | bits4-7 type`.
    pub fn to_byte(self) -> u8 {
        let mut bits = TileBits::empty();
        bits.set(TileBits::DISCOVERED, self.discovered);
        bits.set(TileBits::FLAGGED, self.flagged);
        bits.bits() | ((self.tile_type as u8) << TYPE_SHIFT)
    }

    /// Unpacks a byte written by [`to_byte`](Self::to_byte).
    ///
    /// Returns `None` for an unknown type or for bits outside the layout.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let low = byte & 0x0f;
        let bits = TileBits::from_bits(low).filter(|bits| !bits.contains(TileBits::MINE))?;
        let tile_type = TileType::try_from(byte >> TYPE_SHIFT).ok()?;
        Some(Self {
            discovered: bits.contains(TileBits::DISCOVERED),
            flagged: bits.contains(TileBits::FLAGGED),
            tile_type,
        })
    }
}

/// A tile of an infinite board chunk; neighbor counts are derived, never stored.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkTile {
    pub discovered: bool,
    pub flagged: bool,
    pub mine: bool,
}

impl ChunkTile {
    /// Packs as `bit0 discovered | bit1 flagged | bit2 mine`.
    pub fn to_byte(self) -> u8 {
        let mut bits = TileBits::empty();
        bits.set(TileBits::DISCOVERED, self.discovered);
        bits.set(TileBits::FLAGGED, self.flagged);
        bits.set(TileBits::MINE, self.mine);
        bits.bits()
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        let bits = TileBits::from_bits(byte)?;
        Some(Self {
            discovered: bits.contains(TileBits::DISCOVERED),
            flagged: bits.contains(TileBits::FLAGGED),
            mine: bits.contains(TileBits::MINE),
        })
    }
}
