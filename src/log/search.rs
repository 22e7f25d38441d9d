//! In-Segment Time Search

use std::io::{Read, Seek};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::log::entry::decode_entry;

/// Find the byte offset of the first entry whose timestamp is `>= t`, or the
/// end-of-file offset if no such entry exists in this segment.
///
/// Linear scan from the current position. Entries are framed without an
/// index, so each one has to be decoded to learn where the next begins.
pub(crate) fn find_entry_position<F: Read + Seek>(t: DateTime<Utc>, file: &mut F) -> Result<u64> {
    loop {
        let position = file.stream_position()?;

        match decode_entry(file) {
            Ok((entry_time, _)) if entry_time >= t => return Ok(position),
            Ok(_) => continue,
            Err(Error::EndOfLog) => return Ok(position),
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::entry::encode_entry;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn time_2006() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    }

    fn segment_with_hourly_entries(count: i64) -> (Vec<u64>, Cursor<Vec<u8>>) {
        let mut buf = Vec::new();
        let mut positions = Vec::new();
        for i in 0..count {
            positions.push(buf.len() as u64);
            let t = time_2006() + chrono::Duration::hours(i);
            encode_entry(&mut buf, t, format!("entry-{i}").as_bytes()).unwrap();
        }
        positions.push(buf.len() as u64); // end-of-file offset
        (positions, Cursor::new(buf))
    }

    #[test]
    fn test_finds_exact_match() {
        let (positions, mut file) = segment_with_hourly_entries(3);

        let target = time_2006() + chrono::Duration::hours(1);
        assert_eq!(find_entry_position(target, &mut file).unwrap(), positions[1]);
    }

    #[test]
    fn test_finds_next_entry_between_timestamps() {
        let (positions, mut file) = segment_with_hourly_entries(3);

        let target = time_2006() + chrono::Duration::minutes(1);
        assert_eq!(find_entry_position(target, &mut file).unwrap(), positions[1]);
    }

    #[test]
    fn test_target_before_first_entry() {
        let (positions, mut file) = segment_with_hourly_entries(3);

        let target = time_2006() - chrono::Duration::hours(1);
        assert_eq!(find_entry_position(target, &mut file).unwrap(), positions[0]);
    }

    #[test]
    fn test_target_past_all_entries_returns_eof_offset() {
        let (positions, mut file) = segment_with_hourly_entries(3);

        let target = time_2006() + chrono::Duration::days(1);
        assert_eq!(
            find_entry_position(target, &mut file).unwrap(),
            *positions.last().unwrap()
        );
    }

    #[test]
    fn test_empty_segment() {
        let mut file = Cursor::new(Vec::new());
        assert_eq!(find_entry_position(time_2006(), &mut file).unwrap(), 0);
    }
}
