use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Pipeline counters shared between the capture thread, the encode thread
/// and whoever reports health. Monitoring only; nothing branches on them.
#[derive(Debug)]
pub struct PipelineStats {
    pub frames_captured: AtomicU64,
    pub capture_gaps: AtomicU64,
    /// Popped frames discarded before stamping (empty or unconvertible).
    pub frames_skipped: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub frames_submitted: AtomicU64,
    pub units_sent: AtomicU64,
    pub datagrams_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub units_dropped_oversize: AtomicU64,
    /// Last `VideoSource::is_healthy` answer seen by the capture loop.
    pub source_healthy: AtomicBool,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            capture_gaps: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            frames_submitted: AtomicU64::new(0),
            units_sent: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            units_dropped_oversize: AtomicU64::new(0),
            source_healthy: AtomicBool::new(true),
        }
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_captured: load(&self.frames_captured),
            capture_gaps: load(&self.capture_gaps),
            frames_skipped: load(&self.frames_skipped),
            frames_rejected: load(&self.frames_rejected),
            frames_submitted: load(&self.frames_submitted),
            units_sent: load(&self.units_sent),
            datagrams_sent: load(&self.datagrams_sent),
            send_failures: load(&self.send_failures),
            units_dropped_oversize: load(&self.units_dropped_oversize),
            source_healthy: self.source_healthy.load(Ordering::Relaxed),
            relay_depth: 0,
            relay_dropped: 0,
        }
    }
}

/// Point-in-time copy of `PipelineStats` plus relay occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub capture_gaps: u64,
    pub frames_skipped: u64,
    pub frames_rejected: u64,
    pub frames_submitted: u64,
    pub units_sent: u64,
    pub datagrams_sent: u64,
    pub send_failures: u64,
    pub units_dropped_oversize: u64,
    pub source_healthy: bool,
    pub relay_depth: usize,
    pub relay_dropped: u64,
}
