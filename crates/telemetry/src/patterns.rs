//! Pre-compiled pattern table for the diagnostic stream, ordered by the
//! approximate frequency each line shape occurs at in a healthy run.

use std::sync::LazyLock;

use regex::Regex;

/// Cheap inclusion test: a line that contains none of these cannot match any
/// pattern of interest, and most lines fail here without touching a regex.
const NEEDLES: [&str; 8] = [
    " @ 0x",
    "BANDWIDTH=",
    "Format",
    "Skip",
    "HTTP error",
    "reconnect",
    "Failed to",
    "skipping",
];

pub(crate) fn line_of_interest(line: &str) -> bool {
    NEEDLES.iter().any(|needle| line.contains(needle))
}

pub(crate) static TCP_CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Successfully connected to (\S+) port (\d+)").unwrap());

pub(crate) static HLS_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HLS request for url '([^']+)'").unwrap());

pub(crate) static HTTP_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Opening '([^']+)' for reading").unwrap());

pub(crate) static HTTP_GET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"request: GET (\S+)").unwrap());

pub(crate) static TCP_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Starting connection attempt to (\S+) port (\d+)").unwrap());

pub(crate) static TCP_FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Connection attempt to (\S+) port (\d+) failed: (.+)").unwrap());

pub(crate) static SEQUENCE_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Mm]edia sequence changed unexpectedly: (-?\d+) -> (-?\d+)").unwrap()
});

pub(crate) static FORMAT_PROBED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Format \S+ probed with size").unwrap());

pub(crate) static MANIFEST_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Skip \('").unwrap());

pub(crate) static BANDWIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BANDWIDTH=(\d+)").unwrap());

pub(crate) static HTTP_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HTTP error (\d+)\s*(.*)").unwrap());

pub(crate) static RECONNECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Will reconnect at").unwrap());

pub(crate) static SEGMENT_FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Failed to open segment '?([^' ]+)'? of playlist (\S+)").unwrap());

pub(crate) static SEGMENT_SKIPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Ss]egment '?([^' ]+)'? of playlist (\S+) failed too many times, skipping")
        .unwrap()
});

pub(crate) static PLAYLIST_FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Failed to reload playlist (\S+)").unwrap());

pub(crate) static SEGMENTS_EXPIRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"skipping (\d+) segments ahead, expired from playlists").unwrap());

pub(crate) static CONTENT_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Content-Length:\s*(\d+)").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_test_admits_every_pattern_shape() {
        let samples = [
            "[tcp @ 0x55] Successfully connected to 10.0.0.1 port 80",
            "[hls @ 0x55] HLS request for url 'http://o/seg1.ts', offset 0, playlist 0",
            "[http @ 0x55] Opening 'http://o/live.m3u8' for reading",
            "[http @ 0x55] request: GET /seg1.ts HTTP/1.1",
            "[tcp @ 0x55] Starting connection attempt to 10.0.0.1 port 80",
            "[tcp @ 0x55] Connection attempt to 10.0.0.1 port 80 failed: Connection refused",
            "[hls @ 0x55] Media sequence changed unexpectedly: 100 -> 104",
            "Format hls probed with size=2048 and score=100",
            "[hls @ 0x55] Skip ('#EXT-X-VERSION:3')",
            "[hls @ 0x55] Opening variant with BANDWIDTH=1200000",
            "[http @ 0x55] HTTP error 404 Not Found",
            "[http @ 0x55] Will reconnect at 1024 in 0 second(s)",
            "[hls @ 0x55] Failed to open segment 101 of playlist 0",
            "[hls @ 0x55] segment 101 of playlist 0 failed too many times, skipping",
            "[hls @ 0x55] Failed to reload playlist 0",
            "[hls @ 0x55] skipping 3 segments ahead, expired from playlists",
            "[http @ 0x55] Content-Length: 524288",
        ];
        for line in samples {
            assert!(line_of_interest(line), "inclusion test rejected: {line}");
        }
    }

    #[test]
    fn inclusion_test_rejects_chatter() {
        for line in [
            "frame= 1432 fps= 25 q=-1.0 size=N/A time=00:00:57.28 bitrate=N/A",
            "Input #0, hls, from 'http://origin/live.m3u8':",
            "Stream mapping:",
        ] {
            assert!(!line_of_interest(line), "inclusion test admitted: {line}");
        }
    }
}
