//! Bounded history buffers for trend display.

use std::collections::VecDeque;

use crate::types::Snapshot;

pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    while dq.len() >= cap.max(1) {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Fixed-capacity FIFO: pushing onto a full ring evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRing<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T> HistoryRing<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, v: T) {
        push_capped(&mut self.buf, v, self.cap);
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

impl<T: Clone> HistoryRing<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}

// One ring per charted metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricHistory {
    pub cpu: HistoryRing<f64>,
    pub gpu: HistoryRing<f64>,
    pub memory: HistoryRing<f64>,
    pub net_in: HistoryRing<f64>,
    pub net_out: HistoryRing<f64>,
    net_in_peak: f64,
    net_out_peak: f64,
}

impl MetricHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cpu: HistoryRing::new(cap),
            gpu: HistoryRing::new(cap),
            memory: HistoryRing::new(cap),
            net_in: HistoryRing::new(cap),
            net_out: HistoryRing::new(cap),
            net_in_peak: 0.0,
            net_out_peak: 0.0,
        }
    }

    pub fn record(&mut self, s: &Snapshot) {
        self.cpu.push(s.cpu_usage_percent);
        self.gpu.push(s.gpu_usage_percent);
        self.memory.push(s.memory_usage_percent);
        self.net_in.push(s.network_in_bytes_per_sec);
        self.net_out.push(s.network_out_bytes_per_sec);
        self.net_in_peak = self.net_in_peak.max(s.network_in_bytes_per_sec);
        self.net_out_peak = self.net_out_peak.max(s.network_out_bytes_per_sec);
    }

    /// Highest (in, out) rates seen since start, for sparkline scaling.
    pub fn network_peaks(&self) -> (f64, f64) {
        (self.net_in_peak, self.net_out_peak)
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
