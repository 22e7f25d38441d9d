//! Log Reader
//!
//! Reads entries in time order across segment files, presenting them as one
//! contiguous stream. The segment list is snapshotted when the reader is
//! opened; segments created afterwards are not observed.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::log::entry::decode_entry;
use crate::log::search::find_entry_position;
use crate::log::segment::{self, Segment};
use crate::log::Log;

/// How a reader picks its starting position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekPolicy {
    /// Start at the oldest segment's first entry
    #[default]
    Head,
    /// Start at the first entry whose timestamp is at or after the given time
    FromTime(DateTime<Utc>),
}

/// Options for [`Log::open_reader`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    seek: SeekPolicy,
}

impl ReaderOptions {
    /// Start reading at the first entry whose timestamp is `>= t`
    pub fn starting_from(mut self, t: DateTime<Utc>) -> Self {
        self.seek = SeekPolicy::FromTime(t);
        self
    }
}

/// Sequential read handle over a log directory.
///
/// Multiple readers may coexist with one writer; readers never take the
/// writer lock.
pub struct LogReader {
    inner: ReaderInner,
}

/// A log with no segments gets a dedicated variant so `read` can yield
/// [`Error::EndOfLog`] without holding a file handle.
enum ReaderInner {
    Empty,
    Segments(SegmentsReader),
}

struct SegmentsReader {
    dir: PathBuf,
    segments: Vec<Segment>,
    current: usize,
    file: File,
}

impl LogReader {
    pub(crate) fn open(log: &Log, options: ReaderOptions) -> Result<Self> {
        let segments = segment::list_segments(log.dir())?;
        if segments.is_empty() {
            return Ok(Self {
                inner: ReaderInner::Empty,
            });
        }

        let (current, file) = match options.seek {
            SeekPolicy::Head => (0, open_segment_file(log.dir(), segments[0])?),
            SeekPolicy::FromTime(t) => {
                // The last segment starting at or before `t` is the only one
                // that can contain entries from just before `t`; if every
                // segment starts later, begin at the oldest.
                let current = segments
                    .iter()
                    .rposition(|segment| segment.starting_at <= t)
                    .unwrap_or(0);

                let mut file = open_segment_file(log.dir(), segments[current])?;
                let position = find_entry_position(t, &mut file)?;
                file.seek(SeekFrom::Start(position))?;

                (current, file)
            }
        };

        debug!(
            "opened log reader for {} at segment {current} of {}",
            log.dir().display(),
            segments.len()
        );

        Ok(Self {
            inner: ReaderInner::Segments(SegmentsReader {
                dir: log.dir().to_path_buf(),
                segments,
                current,
                file,
            }),
        })
    }

    /// Read the next entry.
    ///
    /// Advances across segment boundaries transparently. Once every segment
    /// in the snapshot is drained, returns [`Error::EndOfLog`] and keeps
    /// returning it, even if a writer appends more entries afterwards.
    pub fn read(&mut self) -> Result<(DateTime<Utc>, Vec<u8>)> {
        match &mut self.inner {
            ReaderInner::Empty => Err(Error::EndOfLog),
            ReaderInner::Segments(reader) => reader.read(),
        }
    }

    /// Close the reader, releasing the current segment file handle
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

impl SegmentsReader {
    fn read(&mut self) -> Result<(DateTime<Utc>, Vec<u8>)> {
        loop {
            if self.current >= self.segments.len() {
                return Err(Error::EndOfLog);
            }

            match decode_entry(&mut self.file) {
                Err(Error::EndOfLog) => {
                    // Current segment cleanly drained; chain to the next one.
                    self.current += 1;
                    if self.current >= self.segments.len() {
                        return Err(Error::EndOfLog);
                    }
                    self.file = open_segment_file(&self.dir, self.segments[self.current])?;
                }
                other => return other,
            }
        }
    }
}

fn open_segment_file(dir: &Path, segment: Segment) -> Result<File> {
    Ok(File::open(segment::segment_path(dir, segment.starting_at))?)
}
