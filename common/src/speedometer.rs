//! Throughput metering for a transfer session.
//!
//! A passive observer: the orchestrator feeds it the byte count of
//! every successfully transferred chunk and it periodically rewrites a
//! one-line rate report on stderr. The final summary is bound to the
//! meter's lifetime so it is emitted even when the session aborts.

use std::time::{Duration, Instant};

const PREFIXES: [&str; 11] = [
    "B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB", "RiB", "QiB",
];

/// Scale a byte value to a binary-prefixed unit.
///
/// Divides by 1024 while the scaled value is still >= 1000, so the
/// displayed number always fits in four significant digits; saturates
/// at the largest defined prefix.
#[must_use]
pub fn binary_prefix(value: f64) -> (f64, &'static str) {
    let mut scaled = value;
    for prefix in &PREFIXES[..PREFIXES.len() - 1] {
        if scaled < 1000.0 {
            return (scaled, prefix);
        }
        scaled /= 1024.0;
    }
    (scaled, PREFIXES[PREFIXES.len() - 1])
}

/// Accumulates transferred byte counts and reports throughput.
#[derive(Debug)]
pub struct Speedometer {
    start: Instant,
    interval_start: Instant,
    last: Instant,
    bytes: u64,
    interval_bytes: u64,
    interval: Duration,
    remark: String,
    quiet: bool,
    finished: bool,
}

impl Speedometer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            interval_start: now,
            last: now,
            bytes: 0,
            interval_bytes: 0,
            interval: Duration::from_secs(1),
            remark: String::new(),
            quiet: false,
            finished: false,
        }
    }

    /// Restart the session clock and zero all counters.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.interval_start = now;
        self.last = now;
        self.bytes = 0;
        self.interval_bytes = 0;
    }

    /// Record one transferred chunk of `increase` bytes.
    ///
    /// Emits an interval report once the configured interval has
    /// elapsed, then starts a fresh interval.
    pub fn measure(&mut self, increase: u64) {
        self.last = Instant::now();
        self.bytes += increase;
        self.interval_bytes += increase;

        let elapsed = self.last.duration_since(self.interval_start);
        if elapsed >= self.interval {
            let rate = self.interval_bytes as f64 / elapsed.as_secs_f64();
            if !self.quiet {
                eprint!("{}\r", self.report_line(rate));
            }
            self.interval_bytes = 0;
            self.interval_start = Instant::now();
        }
    }

    /// Emit the final summary and terminate the output line.
    ///
    /// Runs at most once; also invoked from `Drop` so an aborted
    /// session still reports. With no bytes ever measured the rate is
    /// reported as zero rather than dividing by zero elapsed time.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.quiet {
            eprintln!("{}\r", self.report_line(self.final_rate()));
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn set_remark(&mut self, remark: impl Into<String>) {
        self.remark = remark.into();
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Cumulative bytes measured this session.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }

    fn final_rate(&self) -> f64 {
        if self.last == self.start {
            0.0
        } else {
            self.bytes as f64 / self.last.duration_since(self.start).as_secs_f64()
        }
    }

    fn report_line(&self, rate: f64) -> String {
        let (scaled_bytes, bytes_prefix) = binary_prefix(self.bytes as f64);
        let (scaled_rate, rate_prefix) = binary_prefix(rate);
        let elapsed = self.last.duration_since(self.start);
        let secs = elapsed.as_secs();
        format!(
            "{:6.2} {:>3} {:>2}:{:02}:{:02}.{:03} [{:6.2} {:>3}/s] {:<15}",
            scaled_bytes,
            bytes_prefix,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            elapsed.subsec_millis(),
            scaled_rate,
            rate_prefix,
            self.remark,
        )
    }
}

impl Default for Speedometer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Speedometer {
    fn drop(&mut self) {
        self.finish();
    }
}
