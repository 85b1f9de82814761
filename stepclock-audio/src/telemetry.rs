//! Tick handler timing for the sequencer thread.
//!
//! Fixed-size ring buffer, no allocation per sample.

use std::time::Duration;

const TICK_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Cumulative count of handlers slower than their tick period
    pub overruns: u64,
}

pub struct TickTelemetry {
    durations_us: [u32; TICK_BUFFER_SIZE],
    idx: usize,
    sample_count: usize,
    /// Max within the current summary window
    max_us: u32,
    overruns: u64,
}

impl Default for TickTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTelemetry {
    pub fn new() -> Self {
        Self {
            durations_us: [0; TICK_BUFFER_SIZE],
            idx: 0,
            sample_count: 0,
            max_us: 0,
            overruns: 0,
        }
    }

    /// Record one handler duration against the tick period `budget`.
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        let us = duration.as_micros().min(u32::MAX as u128) as u32;
        self.durations_us[self.idx] = us;
        self.idx = (self.idx + 1) % TICK_BUFFER_SIZE;
        self.sample_count = (self.sample_count + 1).min(TICK_BUFFER_SIZE);
        self.max_us = self.max_us.max(us);
        if duration > budget {
            self.overruns += 1;
        }
    }

    /// Summarise the buffered samples and start a new max window.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        if self.sample_count == 0 {
            return TelemetrySummary::default();
        }
        let samples = &self.durations_us[..self.sample_count];
        let sum: u64 = samples.iter().map(|&us| us as u64).sum();

        let mut sorted = self.durations_us;
        sorted[..self.sample_count].sort_unstable();
        let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;

        let summary = TelemetrySummary {
            avg_us: (sum / self.sample_count as u64) as u32,
            max_us: self.max_us,
            p95_us: sorted[p95_idx],
            overruns: self.overruns,
        };
        self.max_us = 0;
        summary
    }
}
