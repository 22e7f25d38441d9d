//! Binary Entry Codec
//!
//! Frames one `(timestamp, payload)` record as bytes and decodes it back.
//! The on-disk layout is `timestamp(15) ‖ length(4, LE u32) ‖ payload` with
//! no padding, alignment or checksum.

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Size of the serialized timestamp in bytes
pub(crate) const TIMESTAMP_LEN: usize = 15;

/// Version tag of the binary time encoding
const TIME_BINARY_VERSION: u8 = 1;

/// Seconds between 0001-01-01T00:00:00Z (the encoding epoch) and the Unix epoch
const SECONDS_TO_UNIX_EPOCH: i64 = 62_135_596_800;

/// Serialize a timestamp into the fixed 15-byte layout: version tag,
/// big-endian seconds since year 1, big-endian nanoseconds, big-endian zone
/// offset in minutes. Timestamps are always written as UTC (offset zero).
pub(crate) fn encode_timestamp(t: DateTime<Utc>) -> [u8; TIMESTAMP_LEN] {
    let seconds = t.timestamp() + SECONDS_TO_UNIX_EPOCH;
    let nanos = t.timestamp_subsec_nanos() as i32;

    let mut buf = [0u8; TIMESTAMP_LEN];
    buf[0] = TIME_BINARY_VERSION;
    buf[1..9].copy_from_slice(&seconds.to_be_bytes());
    buf[9..13].copy_from_slice(&nanos.to_be_bytes());
    // bytes 13..15 stay zero: zone offset in minutes, UTC
    buf
}

/// Parse a timestamp from the fixed 15-byte layout.
///
/// The seconds field is absolute, so the zone offset in the trailing two
/// bytes does not affect the instant; the result is always UTC.
pub(crate) fn decode_timestamp(buf: &[u8; TIMESTAMP_LEN]) -> Result<DateTime<Utc>> {
    if buf[0] != TIME_BINARY_VERSION {
        return Err(Error::Format(format!(
            "unsupported time encoding version: {}",
            buf[0]
        )));
    }

    let seconds = i64::from_be_bytes(buf[1..9].try_into().unwrap()) - SECONDS_TO_UNIX_EPOCH;
    let nanos = i32::from_be_bytes(buf[9..13].try_into().unwrap());
    let nanos = u32::try_from(nanos)
        .map_err(|_| Error::Format(format!("negative nanoseconds in timestamp: {}", nanos)))?;

    DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| Error::Format(format!("timestamp out of range: {}s {}ns", seconds, nanos)))
}

/// Append one entry frame to `writer`.
///
/// Writes exactly `15 + 4 + payload.len()` bytes. Payloads longer than
/// `u32::MAX` are rejected before any byte is written.
pub(crate) fn encode_entry<W: Write>(writer: &mut W, t: DateTime<Utc>, payload: &[u8]) -> Result<()> {
    let length = u32::try_from(payload.len())
        .map_err(|_| Error::InvalidParameter("entry payload exceeds 4 GiB".into()))?;

    writer.write_all(&encode_timestamp(t))?;
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(payload)?;

    Ok(())
}

/// Read one entry frame from `reader`.
///
/// A clean end-of-file before the first timestamp byte yields
/// [`Error::EndOfLog`]; end-of-file anywhere else in the frame yields
/// [`Error::Truncated`]. The payload is returned as a freshly owned buffer.
pub(crate) fn decode_entry<R: Read>(reader: &mut R) -> Result<(DateTime<Utc>, Vec<u8>)> {
    let mut time_buf = [0u8; TIMESTAMP_LEN];
    let filled = read_until_full(reader, &mut time_buf)?;
    if filled == 0 {
        return Err(Error::EndOfLog);
    }
    if filled < TIMESTAMP_LEN {
        return Err(Error::Truncated("entry time"));
    }
    let t = decode_timestamp(&time_buf)?;

    let mut len_buf = [0u8; 4];
    read_frame_part(reader, &mut len_buf, "entry length")?;
    let length = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; length];
    read_frame_part(reader, &mut payload, "entry payload")?;

    Ok((t, payload))
}

/// Read as many bytes as available up to `buf.len()`, retrying on
/// interruption. Returns the number of bytes read; fewer than `buf.len()`
/// means end-of-file.
fn read_until_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

fn read_frame_part<R: Read>(reader: &mut R, buf: &mut [u8], part: &'static str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::Truncated(part),
        _ => Error::Io(err),
    })
}
