//! Usage accounting for the local/remote split. In-memory only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_queries: u64,
    pub local_hits: u64,
    pub remote_hits: u64,
    pub total_tokens: u64,
    pub avg_local_ms: f64,
    pub avg_remote_ms: f64,
}

/// `avg = (avg * (n - 1) + sample) / n`
fn running_average(avg: f64, n: u64, sample: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (avg * (n - 1) as f64 + sample as f64) / n as f64
}

impl Analytics {
    pub fn record_query(&mut self) {
        self.total_queries += 1;
    }

    pub fn record_local(&mut self, duration_ms: u64) {
        self.local_hits += 1;
        self.avg_local_ms = running_average(self.avg_local_ms, self.local_hits, duration_ms);
    }

    pub fn record_remote(&mut self, duration_ms: u64, tokens: u64) {
        self.remote_hits += 1;
        self.total_tokens += tokens;
        self.avg_remote_ms = running_average(self.avg_remote_ms, self.remote_hits, duration_ms);
    }

    /// Share of answered queries served locally, in `[0, 1]`.
    pub fn local_hit_rate(&self) -> f64 {
        let answered = self.local_hits + self.remote_hits;
        if answered == 0 {
            0.0
        } else {
            self.local_hits as f64 / answered as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_averages() {
        let mut analytics = Analytics::default();
        analytics.record_local(10);
        analytics.record_local(20);
        analytics.record_local(30);
        assert!((analytics.avg_local_ms - 20.0).abs() < 1e-9);

        analytics.record_remote(1000, 120);
        analytics.record_remote(500, 80);
        assert!((analytics.avg_remote_ms - 750.0).abs() < 1e-9);
        assert_eq!(analytics.total_tokens, 200);
        assert!((analytics.local_hit_rate() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut analytics = Analytics::default();
        analytics.record_query();
        analytics.record_remote(40, 9);
        analytics.reset();
        assert_eq!(analytics, Analytics::default());
        assert_eq!(analytics.local_hit_rate(), 0.0);
    }
}
