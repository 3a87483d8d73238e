//! Typed events reconstructed from the transcoder's diagnostic stream.

use chrono::NaiveDateTime;

/// Classification of a failed TCP connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpFailureKind {
    Refused,
    TimedOut,
    Error,
}

impl TcpFailureKind {
    pub(crate) fn classify(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        if reason.contains("refused") {
            TcpFailureKind::Refused
        } else if reason.contains("timed out") || reason.contains("timeout") {
            TcpFailureKind::TimedOut
        } else {
            TcpFailureKind::Error
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugEventKind {
    /// HLS layer requests a segment (or the manifest itself).
    HlsRequest { url: String },
    /// HTTP layer opens a resource over a new connection path.
    HttpOpen { url: String },
    /// HTTP GET issued, including on reused keep-alive connections.
    HttpRequestGet { path: String },
    HttpError { code: u16, message: String },
    HttpContentLength { bytes: u64 },
    Reconnect,
    TcpStart { ip: String, port: u16 },
    TcpConnected { ip: String, port: u16 },
    TcpFailed { kind: TcpFailureKind },
    /// Manifest opened for reading.
    PlaylistOpen { url: String },
    /// Manifest fully read and parsed; covers both the format-probe line and
    /// the manifest skip line, which signal the same thing.
    ManifestParsed,
    SequenceChange { old: i64, new: i64 },
    SegmentFailed { segment: String, playlist: String },
    SegmentSkipped { segment: String, playlist: String },
    SegmentsExpired { count: u64 },
    PlaylistFailed { playlist: String },
    /// Advertised stream bandwidth from the master playlist.
    Bandwidth { bits_per_sec: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugEvent {
    /// Authoritative timestamp when the line carried one, ingestion time
    /// otherwise.
    pub at: NaiveDateTime,
    pub kind: DebugEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failure_reasons() {
        assert_eq!(
            TcpFailureKind::classify("Connection refused"),
            TcpFailureKind::Refused
        );
        assert_eq!(
            TcpFailureKind::classify("Connection timed out"),
            TcpFailureKind::TimedOut
        );
        assert_eq!(
            TcpFailureKind::classify("No route to host"),
            TcpFailureKind::Error
        );
    }
}
