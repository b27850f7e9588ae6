use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sliding window: `limit` or more submissions whose span is at most
/// `window_secs` seconds constitute a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstWindow {
    pub window_secs: u32,
    pub limit: u32,
}

impl BurstWindow {
    pub fn duration(&self) -> Duration {
        Duration::seconds(i64::from(self.window_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstSignal {
    pub key: String,
    /// Largest number of submissions found inside a single window.
    pub peak_count: u32,
    pub window: BurstWindow,
}

#[derive(Debug, Clone)]
pub struct BurstDetector {
    window: BurstWindow,
}

impl BurstDetector {
    pub fn new(window: BurstWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> BurstWindow {
        self.window
    }

    /// Earliest timestamp that can still share a window with `now`.
    pub fn lookback_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window.duration()
    }

    pub fn inspect(&self, key: &str, timestamps: &[DateTime<Utc>]) -> Option<BurstSignal> {
        let peak_count = peak_in_window(timestamps, self.window.duration());
        if self.window.limit == 0 || peak_count < self.window.limit {
            return None;
        }
        Some(BurstSignal {
            key: key.to_string(),
            peak_count,
            window: self.window,
        })
    }
}

/// Boolean form of [`BurstDetector::inspect`].
pub fn detect_burst(key: &str, timestamps: &[DateTime<Utc>], window: BurstWindow) -> bool {
    BurstDetector::new(window).inspect(key, timestamps).is_some()
}

fn peak_in_window(timestamps: &[DateTime<Utc>], window: Duration) -> u32 {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let mut peak = 0usize;
    let mut start = 0usize;
    for end in 0..sorted.len() {
        while sorted[end] - sorted[start] > window {
            start += 1;
        }
        peak = peak.max(end - start + 1);
    }
    peak as u32
}
