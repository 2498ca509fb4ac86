//! Binary save format.
//!
//! A save starts with a two byte header, `version` then the [`GameKind`] tag,
//! followed by the payload of that board. Every integer is a big-endian `i64`
//! except the header bytes, the state byte and the tile bytes.

use core::time::Duration;
use std::io::{self, Read, Write};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::*;

/// Format version written by [`Game::save`] and accepted by [`load`].
pub const SAVE_VERSION: u8 = 1;

/// Reads a saved game of either kind.
///
/// The header is checked before anything else: a foreign version fails with
/// [`SaveError::VersionMismatch`] even if the game type is unknown as well.
/// `seed` seeds the loaded board's random source, used by later resets and,
/// on the infinite board, by chunks created after loading.
pub fn load<R: Read>(mut reader: R, seed: u64) -> core::result::Result<AnyGame, SaveError> {
    let kind = read_header(&mut reader)?;
    let game = match kind {
        GameKind::Bounded => AnyGame::Bounded(BoundedGame::read_payload(&mut reader, seed)?),
        GameKind::Chunked => AnyGame::Chunked(ChunkedGame::read_payload(&mut reader, seed)?),
    };
    log::debug!("loaded {:?} game in state {}", kind, game.state());
    Ok(game)
}

pub(crate) fn write_header(writer: &mut dyn Write, kind: GameKind) -> io::Result<()> {
    writer.write_all(&[SAVE_VERSION, kind as u8])
}

fn read_header(reader: &mut impl Read) -> core::result::Result<GameKind, SaveError> {
    let mut header = [0; 2];
    reader.read_exact(&mut header)?;
    let [version, kind] = header;
    if version != SAVE_VERSION {
        log::warn!("rejected save with version {}", version);
        return Err(SaveError::VersionMismatch {
            found: version,
            expected: SAVE_VERSION,
        });
    }
    GameKind::try_from(kind).map_err(SaveError::UnknownGameType)
}

pub(crate) fn write_i64(writer: &mut dyn Write, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_i64(reader: &mut impl Read) -> io::Result<i64> {
    let mut bytes = [0; 8];
    reader.read_exact(&mut bytes)?;
    Ok(i64::from_be_bytes(bytes))
}

/// Writes a size or count, which the format stores as a signed 64 bit integer.
pub(crate) fn write_len(writer: &mut dyn Write, value: usize) -> io::Result<()> {
    let value = i64::try_from(value)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value does not fit the save format"))?;
    write_i64(writer, value)
}

/// Reads a size or count, rejecting negative values and values that overflow `usize`.
pub(crate) fn read_len(
    reader: &mut impl Read,
    what: &'static str,
) -> core::result::Result<usize, SaveError> {
    let value = read_i64(reader)?;
    usize::try_from(value).map_err(|_| SaveError::Malformed(what))
}

pub(crate) fn write_state(writer: &mut dyn Write, state: GameState) -> io::Result<()> {
    writer.write_all(&[state as u8])
}

pub(crate) fn read_state(reader: &mut impl Read) -> core::result::Result<GameState, SaveError> {
    let mut byte = [0; 1];
    reader.read_exact(&mut byte)?;
    GameState::try_from(byte[0]).map_err(|_| SaveError::Malformed("unknown game state"))
}

/// Nanoseconds since the unix epoch, negative before it, saturating at the `i64` range.
pub(crate) fn time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(err) => i64::try_from(err.duration().as_nanos()).map_or(i64::MIN, |nanos| -nanos),
    }
}

pub(crate) fn time_from_nanos(nanos: i64) -> SystemTime {
    let offset = Duration::from_nanos(nanos.unsigned_abs());
    let time = if nanos >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    time.unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let game = BoundedGame::new(9, 9, 10, 1).unwrap();
        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[SAVE_VERSION, 0]);

        let game = ChunkedGame::new(10, 1).unwrap();
        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[SAVE_VERSION, 1]);
    }

    #[test]
    fn version_is_checked_before_type() {
        let err = load(&[SAVE_VERSION + 1, 7][..], 0).unwrap_err();
        assert!(matches!(
            err,
            SaveError::VersionMismatch {
                found: 2,
                expected: SAVE_VERSION
            }
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = load(&[SAVE_VERSION, 7][..], 0).unwrap_err();
        assert!(matches!(err, SaveError::UnknownGameType(7)));
    }

    #[test]
    fn truncated_save_is_io_error() {
        let err = load(&[SAVE_VERSION][..], 0).unwrap_err();
        assert!(matches!(err, SaveError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));

        let game = BoundedGame::new(9, 9, 10, 1).unwrap();
        let mut buf = Vec::new();
        game.save(&mut buf).unwrap();
        buf.pop();
        let err = load(&buf[..], 0).unwrap_err();
        assert!(matches!(err, SaveError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn sink_errors_are_propagated() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let game = ChunkedGame::new(10, 1).unwrap();
        let err = game.save(&mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn time_conversion_keeps_sign() {
        for nanos in [0, 1, -1, 1_700_000_000_123_456_789, -86_400_000_000_000] {
            assert_eq!(time_to_nanos(time_from_nanos(nanos)), nanos);
        }
    }

    #[test]
    fn negative_sizes_are_malformed() {
        let mut buf = vec![SAVE_VERSION, GameKind::Bounded as u8];
        buf.extend_from_slice(&(-3i64).to_be_bytes());
        buf.extend_from_slice(&[0; 64]);
        let err = load(&buf[..], 0).unwrap_err();
        assert!(matches!(err, SaveError::Malformed(_)));
    }
}
