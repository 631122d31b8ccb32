//! Process-wide request counters
//!
//! Updated once per request around the panic boundary, so panicked handlers
//! are counted with their 500. Read through `GET /debug/vars`.

use hyper::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    responses_by_status: Mutex<BTreeMap<u16, u64>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    /// Keyed by numeric status code
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, status: StatusCode, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        let mut by_status = self.responses_by_status.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics lock poisoned, recovering");
            poisoned.into_inner()
        });
        *by_status.entry(status.as_u16()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_status = self
            .responses_by_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(code, count)| (code.to_string(), *count))
            .collect();

        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status,
        }
    }
}
