//! Segment Files
//!
//! A segment is one append-only file holding an ordered run of entries. Its
//! start time is encoded in the filename, which is the only source of truth
//! for segment ordering.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Filename date format: UTC with nanosecond precision, `:` replaced by `_`
/// for filesystem portability. Trailing zeros are always emitted.
const FILENAME_DATE_FORMAT: &str = "%Y-%m-%dT%H_%M_%S%.9fZ";

/// Extension of segment files
const FILENAME_EXTENSION: &str = ".segment";

/// A single log segment, identified by its start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Segment {
    /// Timestamp the segment starts at, decoded from its filename
    pub starting_at: DateTime<Utc>,
}

/// Build the filename for a segment starting at `t`
pub(crate) fn filename_for(t: DateTime<Utc>) -> String {
    format!("{}{}", t.format(FILENAME_DATE_FORMAT), FILENAME_EXTENSION)
}

/// Get the path of the segment starting at `t` inside the log directory
pub(crate) fn segment_path(dir: &Path, t: DateTime<Utc>) -> PathBuf {
    dir.join(filename_for(t))
}

/// Decode a segment's start time from its filename
pub(crate) fn starting_at_of(filename: &str) -> Result<DateTime<Utc>> {
    let stem = filename.strip_suffix(FILENAME_EXTENSION).unwrap_or(filename);

    let parsed = NaiveDateTime::parse_from_str(stem, FILENAME_DATE_FORMAT)
        .map_err(|err| Error::Format(format!("invalid segment filename {filename:?}: {err}")))?;

    Ok(parsed.and_utc())
}

/// List all segments in the log directory, ascending by start time.
///
/// Filesystem enumeration order is unspecified, so the result is sorted
/// explicitly. A directory that does not exist yet lists as empty.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();

    if !dir.exists() {
        return Ok(segments);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.ends_with(FILENAME_EXTENSION) {
            continue;
        }
        segments.push(Segment {
            starting_at: starting_at_of(name)?,
        });
    }

    segments.sort();
    Ok(segments)
}

/// Append handle for the current (newest) segment.
///
/// Tracks the accumulated file size so the writer can decide when to roll
/// over without re-statting the file on every entry.
pub(crate) struct SegmentWriter {
    file: File,
    size_bytes: u64,
    starting_at: DateTime<Utc>,
}

impl SegmentWriter {
    /// Open the segment starting at `starting_at` for appending, creating
    /// the file if it does not exist. The size is initialized from file
    /// metadata so reopened segments keep accurate roll-over accounting.
    pub(crate) fn open(dir: &Path, starting_at: DateTime<Utc>) -> Result<Self> {
        let path = segment_path(dir, starting_at);

        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o664);
        }

        let file = options.open(&path)?;
        let size_bytes = file.metadata()?.len();

        Ok(Self {
            file,
            size_bytes,
            starting_at,
        })
    }

    pub(crate) fn starting_at(&self) -> DateTime<Utc> {
        self.starting_at
    }

    #[cfg(test)]
    pub(crate) fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Check if the accumulated size is strictly above `max_size` bytes
    pub(crate) fn max_size_exceeded(&self, max_size: u64) -> bool {
        self.size_bytes > max_size
    }

    /// Check if `t` is strictly past the segment's start plus `max_duration`
    pub(crate) fn max_duration_exceeded(&self, t: DateTime<Utc>, max_duration: chrono::Duration) -> bool {
        t > self.starting_at + max_duration
    }

    /// Flush and close the segment file
    pub(crate) fn close(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl Write for SegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Partial writes count what actually reached the file, keeping
        // roll-over accounting consistent even after an error.
        let written = self.file.write(buf)?;
        self.size_bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
