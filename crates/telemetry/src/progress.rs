//! Parser for the transcoder's machine-readable progress stream.
//!
//! The stream is `key=value` lines, one report block per `progress=` line.
//! Live streams report `N/A` for byte totals, so every numeric field is
//! parsed best-effort. This is the producer for playback speed, drift and
//! current-process byte accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use line_pipeline::LineParser;

use crate::client_stats::ClientStats;

pub struct ProgressParser {
    stats: Arc<ClientStats>,
    lines_total: AtomicU64,
    blocks: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStats {
    pub lines_total: u64,
    /// Completed report blocks (`progress=` lines).
    pub blocks: u64,
    pub ignored: u64,
}

impl ProgressParser {
    pub fn new(stats: Arc<ClientStats>) -> Self {
        Self {
            stats,
            lines_total: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    pub fn progress_stats(&self) -> ProgressStats {
        ProgressStats {
            lines_total: self.lines_total.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

impl LineParser for ProgressParser {
    fn parse_line(&self, line: &str) {
        self.lines_total.fetch_add(1, Ordering::Relaxed);
        let Some((key, value)) = line.trim().split_once('=') else {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match key {
            "speed" => {
                // `speed=1.01x`, or `N/A` while the encoder warms up.
                let value = value.trim().trim_end_matches('x');
                if let Ok(speed) = value.parse::<f64>() {
                    self.stats.update_speed(speed);
                }
            }
            // The transcoder emits microseconds under both spellings.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<u64>() {
                    self.stats.update_drift(Duration::from_micros(us));
                }
            }
            "total_size" => {
                if let Ok(bytes) = value.trim().parse::<u64>() {
                    self.stats.update_current_bytes(bytes);
                }
            }
            "progress" => {
                self.blocks.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_stats::ClientStatsConfig;

    fn parser() -> (Arc<ClientStats>, ProgressParser) {
        let stats = Arc::new(ClientStats::new(ClientStatsConfig::default()));
        let parser = ProgressParser::new(stats.clone());
        (stats, parser)
    }

    #[test]
    fn routes_speed_size_and_progress() {
        let (stats, parser) = parser();
        parser.parse_line("speed=1.01x");
        parser.parse_line("total_size=1048576");
        parser.parse_line("progress=continue");

        assert!((stats.speed() - 1.01).abs() < 1e-9);
        assert_eq!(stats.total_bytes(), 1_048_576);
        assert_eq!(parser.progress_stats().blocks, 1);
    }

    #[test]
    fn tolerates_not_available_values() {
        let (stats, parser) = parser();
        parser.parse_line("speed=N/A");
        parser.parse_line("total_size=N/A");
        parser.parse_line("out_time_us=N/A");

        assert_eq!(stats.speed(), 0.0);
        assert_eq!(stats.total_bytes(), 0);
    }

    #[test]
    fn out_time_feeds_drift() {
        let (stats, parser) = parser();
        // Playback way ahead of wall clock: drift goes negative.
        parser.parse_line("out_time_us=999999999999");
        assert!(stats.drift() < 0);
    }

    #[test]
    fn counts_unknown_keys_and_noise() {
        let (_stats, parser) = parser();
        parser.parse_line("bitrate= 950.3kbits/s");
        parser.parse_line("not a key value line");
        let stats = parser.progress_stats();
        assert_eq!(stats.lines_total, 2);
        assert_eq!(stats.ignored, 2);
    }
}
