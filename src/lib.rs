//! Chronolog - Embedded Time-Ordered Append-Only Log
//!
//! An embedded, single-writer log stored as a directory of
//! immutable-once-closed segment files. Every entry is an opaque byte
//! payload tagged with a strictly increasing timestamp assigned at write
//! time; readers scan entries in time order across segments, and a
//! background compactor evicts segments older than a retention horizon.
//!
//! # Architecture
//!
//! A log is just a directory. Segment files carry their start time in the
//! filename, so listing the directory is enough to reconstruct the log's
//! structure without a manifest or an index. One writer per directory is
//! enforced across processes with an advisory file lock; readers are
//! unsynchronized and any number of them may run concurrently.
//!
//! # Features
//!
//! - Strictly monotone entry timestamps, even across clock stalls and
//!   regressions
//! - Segment roll-over on configurable size and duration thresholds
//! - Time-seeking readers (`ReaderOptions::starting_from`)
//! - Cross-process exclusive writer lock
//! - Retention-based background compaction with cooperative shutdown
//! - Pluggable value serialization with a JSON reference format

pub mod codec;
pub mod compactor;
pub mod error;
pub mod log;

pub use error::{Error, Result};
pub use log::{Log, LogReader, LogWriter, ReaderOptions, Segment, SeekPolicy, WriterOptions};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{Codec, Format, Json};
    pub use crate::compactor::CompactorOptions;
    pub use crate::error::{Error, Result};
    pub use crate::log::{Log, LogReader, LogWriter, ReaderOptions, Segment, WriterOptions};
}
