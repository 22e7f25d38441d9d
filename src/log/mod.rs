//! Time-Ordered Append-Only Log
//!
//! The on-disk log engine: a directory of immutable-once-closed segment
//! files, written by a single lock-holding writer and scanned in time order
//! by any number of readers. Segment start times live in the filenames, so
//! the directory is self-describing, without a manifest or an index.

mod entry;
mod reader;
mod search;
mod segment;
mod writer;

pub use reader::{LogReader, ReaderOptions, SeekPolicy};
pub use segment::Segment;
pub use writer::{LogWriter, WriterOptions};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Handle to a log directory.
///
/// A `Log` is a plain value: creating one never touches the filesystem. The
/// directory is created lazily when a writer is opened.
#[derive(Debug, Clone)]
pub struct Log {
    dir: PathBuf,
}

impl Log {
    /// Create a handle to the log stored in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the log directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the single writer for this log, taking the exclusive lock.
    ///
    /// Fails with [`Error::Locked`] if another writer, in this process or
    /// any other, currently holds the lock.
    pub fn open_writer(&self, options: WriterOptions) -> Result<LogWriter> {
        LogWriter::open(self, options)
    }

    /// Open a reader over the segments currently in the directory
    pub fn open_reader(&self, options: ReaderOptions) -> Result<LogReader> {
        LogReader::open(self, options)
    }

    /// List the log's segments, ascending by start time
    pub fn segments(&self) -> Result<Vec<Segment>> {
        segment::list_segments(&self.dir)
    }

    /// Remove the segment starting at `t`.
    ///
    /// Refuses with [`Error::InvalidParameter`] when only one segment
    /// remains; a log never loses its last segment this way. Removing a
    /// segment that does not exist surfaces the I/O error.
    pub fn remove_segment_starting_at(&self, t: DateTime<Utc>) -> Result<()> {
        let segments = self.segments()?;
        if segments.len() == 1 {
            return Err(Error::InvalidParameter(
                "cannot remove the only remaining segment".into(),
            ));
        }

        fs::remove_file(segment::segment_path(&self.dir, t))?;
        Ok(())
    }

    /// Read the newest entry in the log.
    ///
    /// Drains a reader to find it; an empty log yields [`Error::EndOfLog`].
    pub fn last_entry(&self) -> Result<(DateTime<Utc>, Vec<u8>)> {
        let mut reader = self.open_reader(ReaderOptions::default())?;
        let mut last = None;

        loop {
            match reader.read() {
                Ok(entry) => last = Some(entry),
                Err(Error::EndOfLog) => return last.ok_or(Error::EndOfLog),
                Err(err) => return Err(err),
            }
        }
    }
}
