//! Extraction of the optional `YYYY-MM-DD HH:MM:SS.mmm ` line prefix.
//!
//! When present, the prefix is the transcoder's own wall clock and is
//! authoritative for all timing computations; byte-shape checks reject
//! non-candidates before chrono parsing runs.

use chrono::NaiveDateTime;

const TIMESTAMP_LEN: usize = 23;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Split a leading timestamp off `line`, returning it with the remainder of
/// the line. `None` when the line carries no well-formed prefix.
pub fn split_timestamp(line: &str) -> Option<(NaiveDateTime, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < TIMESTAMP_LEN + 2 || bytes[TIMESTAMP_LEN] != b' ' {
        return None;
    }
    if bytes[4] != b'-'
        || bytes[7] != b'-'
        || bytes[10] != b' '
        || bytes[13] != b':'
        || bytes[16] != b':'
        || bytes[19] != b'.'
    {
        return None;
    }
    if !bytes[0].is_ascii_digit() {
        return None;
    }
    let ts = NaiveDateTime::parse_from_str(&line[..TIMESTAMP_LEN], TIMESTAMP_FORMAT).ok()?;
    Some((ts, &line[TIMESTAMP_LEN + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn splits_a_valid_prefix() {
        let (ts, rest) =
            split_timestamp("2026-01-23 08:12:52.614 [tcp @ 0x1] Starting connection").unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.minute(), 12);
        assert_eq!(ts.second(), 52);
        assert_eq!(ts.and_utc().timestamp_subsec_millis(), 614);
        assert_eq!(rest, "[tcp @ 0x1] Starting connection");
    }

    #[test]
    fn rejects_lines_without_a_prefix() {
        assert!(split_timestamp("[hls @ 0x1] HLS request for url 'x'").is_none());
        assert!(split_timestamp("").is_none());
        assert!(split_timestamp("2026-01-23").is_none());
        // Right shape, wrong digits.
        assert!(split_timestamp("2026-13-99 99:99:99.999 rest").is_none());
        // Shape check: separators in the wrong slots.
        assert!(split_timestamp("2026/01/23 08:12:52.614 rest").is_none());
    }

    #[test]
    fn requires_content_after_the_prefix() {
        assert!(split_timestamp("2026-01-23 08:12:52.614").is_none());
        assert!(split_timestamp("2026-01-23 08:12:52.614 x").is_some());
    }
}
