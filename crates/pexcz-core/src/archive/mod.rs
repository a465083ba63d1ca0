//! Archive access layer
//!
//! Every open zip archive is owned by exactly one handle. Sources are
//! opened read-only through [`SourceArchive`]; destinations are built
//! through [`DestinationArchive`], whose queued entries only become
//! visible at the destination path once [`DestinationArchive::close`]
//! returns successfully.
//!
//! Handles are never shared between threads. Code that needs concurrent
//! reads opens the same path once per thread instead.

pub mod destination;
pub mod entry;
pub mod source;

pub use destination::DestinationArchive;
pub use entry::Entry;
pub use source::SourceArchive;

use crate::{Error, Result};
use std::fmt;
use zip::DateTime;

/// How an archive handle is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read an existing archive
    ReadOnly,
    /// Create a new archive; an existing file at the path is never replaced
    Create,
    /// Create a new archive, discarding whatever exists at the path
    CreateTruncate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ReadOnly => write!(f, "read-only"),
            Mode::Create => write!(f, "create"),
            Mode::CreateTruncate => write!(f, "create-truncate"),
        }
    }
}

/// The earliest timestamp a zip entry can carry: 1980-01-01 00:00:00
pub fn min_timestamp() -> DateTime {
    DateTime::default()
}

/// Largest prefix the host can hold in a single buffer
pub const MAX_PREFIX_LEN: u64 = isize::MAX as u64;

/// Convert a reported prefix length into an in-memory size, refusing
/// anything the host cannot address.
pub fn checked_prefix_len(len: u64) -> Result<usize> {
    checked_prefix_len_within(len, MAX_PREFIX_LEN)
}

pub(crate) fn checked_prefix_len_within(len: u64, limit: u64) -> Result<usize> {
    if len > limit {
        return Err(Error::PrefixTooLarge { len, limit });
    }
    usize::try_from(len).map_err(|_| Error::PrefixTooLarge { len, limit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_timestamp_is_dos_epoch() {
        let ts = min_timestamp();
        assert_eq!(ts.year(), 1980);
        assert_eq!(ts.month(), 1);
        assert_eq!(ts.day(), 1);
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (0, 0, 0));
    }

    #[test]
    fn test_checked_prefix_len() {
        assert_eq!(checked_prefix_len(0).unwrap(), 0);
        assert_eq!(checked_prefix_len(4096).unwrap(), 4096);
        assert!(matches!(
            checked_prefix_len(u64::MAX),
            Err(Error::PrefixTooLarge { len: u64::MAX, .. })
        ));
        assert!(matches!(
            checked_prefix_len_within(11, 10),
            Err(Error::PrefixTooLarge { len: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::ReadOnly.to_string(), "read-only");
        assert_eq!(Mode::CreateTruncate.to_string(), "create-truncate");
    }
}
