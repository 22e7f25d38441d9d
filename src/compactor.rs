//! Segment Compactor
//!
//! Removes segments that start before a retention horizon, either as a
//! one-shot sweep or as a cancellable background loop. The compactor is the
//! only component that logs and continues on errors; everything else
//! surfaces them to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{error, info};

use crate::error;
use crate::log::{Log, Segment};

/// Options for [`run`]
#[derive(Debug, Clone, Copy)]
pub struct CompactorOptions {
    /// Time between sweeps (default 1 hour)
    pub interval: Duration,
    /// Age a segment's start time must exceed before it is removed
    /// (default 7 days)
    pub retention: Duration,
}

impl Default for CompactorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Outcome of a removal sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    /// Segments removed by the sweep, oldest first
    pub segments: Vec<Segment>,
}

/// A sweep failure. Carries the segments removed before the failure, so
/// callers see the partial progress along with its cause.
#[derive(Debug, Error)]
#[error("segment sweep failed after removing {} segment(s)", removed.segments.len())]
pub struct RemovalError {
    /// Segments removed before the failure
    pub removed: Removed,
    #[source]
    pub source: error::Error,
}

/// Remove every segment whose start time lies before `older_than`.
///
/// Stops at the first failure and returns the partial results with it.
/// The log's last remaining segment is never removed
/// ([`crate::Log::remove_segment_starting_at`] refuses), so a sweep whose
/// cutoff is past the whole log ends with that refusal after removing
/// everything else.
pub fn remove_old_segments(log: &Log, older_than: DateTime<Utc>) -> Result<Removed, RemovalError> {
    let mut removed = Removed::default();

    let segments = match log.segments() {
        Ok(segments) => segments,
        Err(source) => return Err(RemovalError { removed, source }),
    };

    for segment in segments {
        if segment.starting_at >= older_than {
            continue;
        }
        if let Err(source) = log.remove_segment_starting_at(segment.starting_at) {
            return Err(RemovalError { removed, source });
        }
        removed.segments.push(segment);
    }

    Ok(removed)
}

/// Run the compaction loop until `shutdown` signals.
///
/// Every `interval`, segments older than `now - retention` are swept.
/// Sweep failures are logged and the loop continues; option validation
/// failures abort before the loop begins. The first sweep happens one full
/// interval after the call.
pub async fn run(
    log: Log,
    options: CompactorOptions,
    mut shutdown: watch::Receiver<bool>,
) -> error::Result<()> {
    if options.interval.is_zero() {
        return Err(error::Error::InvalidParameter(
            "compactor interval must be non-zero".into(),
        ));
    }
    let retention = chrono::Duration::from_std(options.retention)
        .map_err(|_| error::Error::InvalidParameter("compactor retention out of range".into()))?;

    let mut ticker = time::interval_at(Instant::now() + options.interval, options.interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cutoff = Utc::now() - retention;
                match remove_old_segments(&log, cutoff) {
                    Ok(removed) if !removed.segments.is_empty() => {
                        info!("removed {} segment(s) older than {cutoff}", removed.segments.len());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!("segment sweep failed: {err}");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("compactor shutting down");
                    return Ok(());
                }
            }
        }
    }
}
