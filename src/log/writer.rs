//! Log Writer
//!
//! The single-producer append path: exclusive directory lock, monotone
//! timestamp assignment, and segment roll-over on size or duration
//! thresholds.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::log::entry::encode_entry;
use crate::log::segment::{self, SegmentWriter};
use crate::log::{Log, ReaderOptions};

/// Name of the advisory lock file inside the log directory
const LOCK_FILE: &str = "log.lock";

const ONE_MEGABYTE: u64 = 1024 * 1024;
const ONE_GIGABYTE: u64 = 1024 * ONE_MEGABYTE;
const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Options for [`Log::open_writer`]
pub struct WriterOptions {
    now: Box<dyn FnMut() -> DateTime<Utc> + Send>,
    max_segment_size_bytes: u64,
    max_segment_duration: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            now: Box::new(Utc::now),
            max_segment_size_bytes: ONE_GIGABYTE,
            max_segment_duration: THIRTY_DAYS,
        }
    }
}

impl WriterOptions {
    /// Replace the clock used to generate entry timestamps. The writer never
    /// reads a time source except through this function.
    pub fn now_fn(mut self, now: impl FnMut() -> DateTime<Utc> + Send + 'static) -> Self {
        self.now = Box::new(now);
        self
    }

    /// Set the segment size threshold in megabytes (default 1 GiB). The
    /// write crossing the threshold still lands in the old segment, so a
    /// segment file can exceed the threshold by up to one entry.
    pub fn max_segment_size_mb(mut self, megabytes: u64) -> Self {
        self.max_segment_size_bytes = megabytes * ONE_MEGABYTE;
        self
    }

    /// Set the segment duration threshold (default 30 days)
    pub fn max_segment_duration(mut self, duration: Duration) -> Self {
        self.max_segment_duration = duration;
        self
    }
}

/// Exclusive append handle for a log directory.
///
/// Returned timestamps are strictly increasing across the whole log, even
/// when the clock stalls or goes backwards. Methods take `&mut self`; the
/// handle is not meant to be shared between threads.
pub struct LogWriter {
    dir: PathBuf,
    current_segment: Option<SegmentWriter>,
    next_segment_start: Option<DateTime<Utc>>,
    now: Box<dyn FnMut() -> DateTime<Utc> + Send>,
    last_time: Option<DateTime<Utc>>,
    max_segment_size_bytes: u64,
    max_segment_duration: chrono::Duration,
    lock: File,
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("dir", &self.dir)
            .field("next_segment_start", &self.next_segment_start)
            .field("last_time", &self.last_time)
            .field("max_segment_size_bytes", &self.max_segment_size_bytes)
            .field("max_segment_duration", &self.max_segment_duration)
            .finish_non_exhaustive()
    }
}

impl LogWriter {
    pub(crate) fn open(log: &Log, options: WriterOptions) -> Result<Self> {
        let max_segment_duration = chrono::Duration::from_std(options.max_segment_duration)
            .map_err(|_| Error::InvalidParameter("max segment duration out of range".into()))?;

        create_dir_if_missing(log.dir())?;
        let lock = acquire_lock(log.dir())?;

        let last_time = read_last_time(log)?;
        let current_segment = open_newest_segment(log.dir())?;

        debug!("opened log writer for {}", log.dir().display());

        Ok(Self {
            dir: log.dir().to_path_buf(),
            current_segment,
            next_segment_start: None,
            now: options.now,
            last_time,
            max_segment_size_bytes: options.max_segment_size_bytes,
            max_segment_duration,
            lock,
        })
    }

    /// Append an entry, assigning it a timestamp from the clock.
    ///
    /// If the clock has not advanced past the last entry's timestamp, the
    /// assigned timestamp is the last one plus a nanosecond. The returned
    /// timestamp is the one written.
    pub fn write(&mut self, payload: &[u8]) -> Result<DateTime<Utc>> {
        let mut t = (self.now)();
        if let Some(last) = self.last_time {
            if t <= last {
                t = last + chrono::Duration::nanoseconds(1);
            }
        }

        self.write_with_time(t, payload)?;
        Ok(t)
    }

    /// Append an entry with a caller-supplied timestamp.
    ///
    /// The timestamp must be strictly after the last entry's; otherwise
    /// [`Error::InvalidParameter`] is returned and nothing is written.
    pub fn write_with_time(&mut self, t: DateTime<Utc>, payload: &[u8]) -> Result<()> {
        if let Some(last) = self.last_time {
            if t <= last {
                return Err(Error::InvalidParameter(format!(
                    "entry time {t} is not after the last entry time {last}"
                )));
            }
        }

        self.append_entry(t, payload)?;
        self.last_time = Some(t);

        Ok(())
    }

    fn append_entry(&mut self, t: DateTime<Utc>, payload: &[u8]) -> Result<()> {
        let max_size = self.max_segment_size_bytes;
        let max_duration = self.max_segment_duration;

        let segment = self.ensure_segment(t)?;
        encode_entry(segment, t, payload)?;

        let needs_roll = segment.max_size_exceeded(max_size)
            || segment.max_duration_exceeded(t, max_duration);
        if needs_roll {
            self.roll_over(t + chrono::Duration::nanoseconds(1))?;
        }

        Ok(())
    }

    /// Get the current segment, opening one if needed. A segment created
    /// after a roll-over starts at the time recorded by the roll-over;
    /// the very first segment starts at the first entry's timestamp.
    fn ensure_segment(&mut self, t: DateTime<Utc>) -> Result<&mut SegmentWriter> {
        let segment = match self.current_segment.take() {
            Some(segment) => segment,
            None => {
                let starting_at = self.next_segment_start.take().unwrap_or(t);
                SegmentWriter::open(&self.dir, starting_at)?
            }
        };

        Ok(self.current_segment.insert(segment))
    }

    /// Close the current segment and arrange for the next one to start at
    /// `starting_at`. The file itself is created on the next write.
    fn roll_over(&mut self, starting_at: DateTime<Utc>) -> Result<()> {
        if let Some(segment) = self.current_segment.take() {
            debug!(
                "rolling over segment started at {}; next starts at {starting_at}",
                segment.starting_at()
            );
            segment.close()?;
        }
        self.next_segment_start = Some(starting_at);

        Ok(())
    }

    /// Release the directory lock and close the current segment file.
    ///
    /// The lock is released first; if that fails, the segment file is still
    /// closed (its error discarded) and the unlock error is reported.
    pub fn close(self) -> Result<()> {
        let unlock_result = self.lock.unlock();

        let close_result = match self.current_segment {
            Some(segment) => segment.close(),
            None => Ok(()),
        };

        unlock_result?;
        close_result
    }
}

fn create_dir_if_missing(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o775);
    }
    builder.create(dir)?;

    Ok(())
}

/// Take the exclusive advisory lock on `<dir>/log.lock` without blocking.
///
/// The lock is tied to the returned handle: it is released when the handle
/// is unlocked or closed, including by process death.
fn acquire_lock(dir: &Path) -> Result<File> {
    let lock = File::create(dir.join(LOCK_FILE))?;

    lock.try_lock_exclusive().map_err(|err| {
        if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
            Error::Locked
        } else {
            Error::Io(err)
        }
    })?;

    Ok(lock)
}

/// Timestamp of the last entry in the log, found by draining a reader
fn read_last_time(log: &Log) -> Result<Option<DateTime<Utc>>> {
    let mut reader = log.open_reader(ReaderOptions::default())?;
    let mut last_time = None;

    loop {
        match reader.read() {
            Ok((t, _)) => last_time = Some(t),
            Err(Error::EndOfLog) => return Ok(last_time),
            Err(err) => return Err(err),
        }
    }
}

fn open_newest_segment(dir: &Path) -> Result<Option<SegmentWriter>> {
    let segments = segment::list_segments(dir)?;

    match segments.last() {
        Some(newest) => Ok(Some(SegmentWriter::open(dir, newest.starting_at)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn time_2006() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    }

    fn fixed_clock(t: DateTime<Utc>) -> WriterOptions {
        WriterOptions::default().now_fn(move || t)
    }

    /// A clock the test can move while the writer holds the `now` closure
    fn shared_clock(
        start: DateTime<Utc>,
    ) -> (Arc<Mutex<DateTime<Utc>>>, impl FnMut() -> DateTime<Utc> + Send + 'static) {
        let clock = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&clock);
        (clock, move || *handle.lock().unwrap())
    }

    fn read_all(log: &Log) -> Vec<(DateTime<Utc>, Vec<u8>)> {
        let mut reader = log.open_reader(ReaderOptions::default()).unwrap();
        let mut entries = Vec::new();
        loop {
            match reader.read() {
                Ok(entry) => entries.push(entry),
                Err(Error::EndOfLog) => return entries,
                Err(err) => panic!("read failed: {err}"),
            }
        }
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path().join("missing"));

        let writer = log.open_writer(WriterOptions::default()).unwrap();

        assert!(dir.path().join("missing").is_dir());
        writer.close().unwrap();
    }

    #[test]
    fn test_no_segment_until_first_write() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());

        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();
        assert!(log.segments().unwrap().is_empty());

        writer.write(b"data1").unwrap();
        let segments = log.segments().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].starting_at, time_2006());
        writer.close().unwrap();
    }

    #[test]
    fn test_write_returns_clock_time() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();

        let t = writer.write(b"data1").unwrap();

        assert_eq!(t, time_2006());
        writer.close().unwrap();
    }

    #[test]
    fn test_stalled_clock_bumps_by_one_nanosecond() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();

        let t1 = writer.write(b"data1").unwrap();
        let t2 = writer.write(b"data2").unwrap();
        writer.close().unwrap();

        assert_eq!(t1, time_2006());
        assert_eq!(t2, time_2006() + chrono::Duration::nanoseconds(1));
        assert_eq!(
            read_all(&log),
            vec![(t1, b"data1".to_vec()), (t2, b"data2".to_vec())]
        );
    }

    #[test]
    fn test_clock_regression_still_monotone() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let (clock, now) = shared_clock(time_2006());
        let mut writer = log
            .open_writer(WriterOptions::default().now_fn(now))
            .unwrap();

        let t1 = writer.write(b"data1").unwrap();
        *clock.lock().unwrap() = time_2006() - chrono::Duration::days(365);
        let t2 = writer.write(b"data2").unwrap();
        writer.close().unwrap();

        assert!(t2 > t1);
    }

    #[test]
    fn test_reopened_writer_continues_after_last_entry() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());

        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();
        let t1 = writer.write(b"data1").unwrap();
        writer.close().unwrap();

        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();
        let t2 = writer.write(b"data2").unwrap();
        writer.close().unwrap();

        assert!(t2 > t1);
        assert_eq!(log.segments().unwrap().len(), 1);
        assert_eq!(read_all(&log).len(), 2);
    }

    #[test]
    fn test_write_with_time_rejects_non_monotone_time() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let mut writer = log.open_writer(fixed_clock(time_2006())).unwrap();

        let t1 = writer.write(b"data1").unwrap();

        let same = writer.write_with_time(t1, b"data2").unwrap_err();
        assert!(matches!(same, Error::InvalidParameter(_)));
        let earlier = writer
            .write_with_time(t1 - chrono::Duration::hours(1), b"data2")
            .unwrap_err();
        assert!(matches!(earlier, Error::InvalidParameter(_)));

        writer.close().unwrap();
        assert_eq!(read_all(&log).len(), 1);
    }

    #[test]
    fn test_size_roll_over() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let mut writer = log
            .open_writer(fixed_clock(time_2006()).max_segment_size_mb(1))
            .unwrap();
        let payload = vec![0xAB; 1024 * 1024];

        let t1 = writer.write(&payload).unwrap();
        let t2 = writer.write(&payload).unwrap();
        writer.close().unwrap();

        let segments = log.segments().unwrap();
        assert_eq!(segments.len(), 2);
        // The second segment starts a nanosecond after the first one's last
        // entry, and holds the entry that crossed the threshold's successor.
        assert_eq!(
            segments[1].starting_at,
            t1 + chrono::Duration::nanoseconds(1)
        );
        assert_eq!(segments[1].starting_at, t2);
        assert_eq!(read_all(&log).len(), 2);
    }

    #[test]
    fn test_segment_size_bounded_by_max_plus_one_entry() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let mut writer = log
            .open_writer(fixed_clock(time_2006()).max_segment_size_mb(1))
            .unwrap();
        let payload = vec![0xCD; 300 * 1024];

        for _ in 0..8 {
            writer.write(&payload).unwrap();
        }
        writer.close().unwrap();

        let max_size = 1024 * 1024;
        let entry_size = 15 + 4 + payload.len() as u64;
        for segment in log.segments().unwrap() {
            let file_size = fs::metadata(segment::segment_path(dir.path(), segment.starting_at))
                .unwrap()
                .len();
            assert!(file_size <= max_size + entry_size);
        }
    }

    #[test]
    fn test_duration_roll_over() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());
        let (clock, now) = shared_clock(time_2006());
        let mut writer = log
            .open_writer(
                WriterOptions::default()
                    .now_fn(now)
                    .max_segment_duration(Duration::from_secs(60 * 60)),
            )
            .unwrap();

        let t1 = writer.write(b"data1").unwrap();
        *clock.lock().unwrap() = time_2006() + chrono::Duration::hours(2);
        let t2 = writer.write(b"data2").unwrap();
        *clock.lock().unwrap() = time_2006() + chrono::Duration::hours(3);
        writer.write(b"data3").unwrap();
        writer.close().unwrap();

        let segments = log.segments().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].starting_at, t1);
        // The entry that crossed the duration threshold stays in the old
        // segment; the next segment starts a nanosecond after it.
        assert_eq!(
            segments[1].starting_at,
            t2 + chrono::Duration::nanoseconds(1)
        );
        assert_eq!(read_all(&log).len(), 3);
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let log = Log::new(dir.path());

        let writer = log.open_writer(WriterOptions::default()).unwrap();
        let second = log.open_writer(WriterOptions::default());
        assert!(matches!(second.unwrap_err(), Error::Locked));

        writer.close().unwrap();
        let third = log.open_writer(WriterOptions::default()).unwrap();
        third.close().unwrap();
    }
}
