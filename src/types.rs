//! Common types used throughout splitline

use crate::error::{Result, SplitLineError};
use std::path::{Path, PathBuf};

/// A byte range `[start, start + length)` of one file
///
/// Offsets are in the file's on-disk (compressed) coordinates. For
/// block-compressed codecs, `start` must fall on a block boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSplit {
    /// File the split belongs to; its extension selects the codec
    pub path: PathBuf,
    /// First byte of the split
    pub start: u64,
    /// Number of bytes covered by the split
    pub length: u64,
}

impl FileSplit {
    /// Create a new split
    ///
    /// # Examples
    ///
    /// ```
    /// use splitline::FileSplit;
    ///
    /// let split = FileSplit::new("logs/app.log.bgz", 65_536, 65_536);
    /// assert_eq!(split.end(), Some(131_072));
    /// ```
    pub fn new<P: AsRef<Path>>(path: P, start: u64, length: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            start,
            length,
        }
    }

    /// Exclusive end offset, or `None` if `start + length` overflows
    pub fn end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }

    /// Exclusive end offset, failing on overflow
    pub(crate) fn checked_end(&self) -> Result<u64> {
        self.end().ok_or_else(|| {
            SplitLineError::InvalidRange(format!(
                "split of {} at {} with length {} overflows",
                self.path.display(),
                self.start,
                self.length
            ))
        })
    }

    /// Whether this split covers no bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Lifecycle of a [`SplitLineReader`](crate::SplitLineReader)
///
/// Alignment happens inside construction, so a live reader is never observed
/// in a created or aligning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Lines may still be returned
    Reading,
    /// The split's range has been passed or the stream ended
    Exhausted,
    /// Resources have been released
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_end() {
        let split = FileSplit::new("a.txt", 4, 8);
        assert_eq!(split.end(), Some(12));
        assert!(!split.is_empty());
    }

    #[test]
    fn test_split_end_overflow() {
        let split = FileSplit::new("a.txt", u64::MAX, 1);
        assert_eq!(split.end(), None);
        assert!(matches!(
            split.checked_end(),
            Err(SplitLineError::InvalidRange(_))
        ));
    }
}
