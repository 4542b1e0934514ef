//! Percentage-based progress logging for artifact transfers.
//!
//! Transfers log an `INFO` line every time the transferred byte count
//! crosses another increment of the expected total.

use tracing::info;

/// Default logging increment, in percent of the total size.
pub const DEFAULT_PROGRESS_INCREMENT: u64 = 5;

/// Tracks bytes moved against an expected total and decides when to log.
#[derive(Debug, Clone)]
pub struct PercentageLogger {
    /// Expected size in bytes
    total_bytes: u64,

    /// Bytes seen so far
    transferred_bytes: u64,

    /// Logging step in percent
    increment: u64,

    /// Next percentage at which a line is emitted
    next_threshold: u64,

    /// Prefix for every progress line
    message: String,
}

impl PercentageLogger {
    pub fn new(total_bytes: u64, increment: u64, message: impl Into<String>) -> Self {
        let increment = increment.clamp(1, 100);
        Self {
            total_bytes,
            transferred_bytes: 0,
            increment,
            next_threshold: increment,
            message: message.into(),
        }
    }

    /// Record `bytes` more transferred. Returns the percentage that was
    /// logged, if a threshold was crossed.
    pub fn record(&mut self, bytes: u64) -> Option<u64> {
        self.transferred_bytes = self.transferred_bytes.saturating_add(bytes);
        if self.total_bytes == 0 || self.next_threshold > 100 {
            return None;
        }

        let percent = self.percent_complete();
        if percent < self.next_threshold {
            return None;
        }

        info!("{} -- {}% complete", self.message, percent);
        self.next_threshold = (percent / self.increment + 1) * self.increment;
        Some(percent)
    }

    /// Progress in whole percent, capped at 100 when the stream outgrows
    /// the reported size.
    pub fn percent_complete(&self) -> u64 {
        if self.total_bytes == 0 {
            return 0;
        }
        let percent = (self.transferred_bytes as u128 * 100) / self.total_bytes as u128;
        percent.min(100) as u64
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
