//! UPnP subscription health tracker (spec.md §4.4).
//!
//! Compares HTTP-detected field changes against matched UPnP events within
//! a grace window and classifies the subscription as healthy/unhealthy so
//! callers can adapt polling rate. Hysteresis prevents flapping on thin
//! evidence.

use std::time::{Duration, Instant};

/// Fields the tracker watches for a detected-change/matched-event pair
/// (spec.md §4.4).
pub const MONITORED_FIELDS: &[&str] = &["play_state", "volume", "muted", "title", "artist", "album"];

const GRACE_WINDOW: Duration = Duration::from_secs(2);
const MIN_SAMPLES: u32 = 3;
const UNHEALTHY_MISS_RATE: f64 = 0.5;
const HEALTHY_MISS_RATE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub detected: u32,
    pub matched: u32,
}

impl Statistics {
    pub fn miss_rate(&self) -> f64 {
        if self.detected == 0 {
            0.0
        } else {
            1.0 - (self.matched as f64 / self.detected as f64)
        }
    }
}

struct PendingChange {
    field: &'static str,
    detected_at: Instant,
}

/// Tracks HTTP-detected field changes and the UPnP events that confirm
/// them within [`GRACE_WINDOW`].
pub struct HealthTracker {
    pending: Vec<PendingChange>,
    stats: Statistics,
    status: Status,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            stats: Statistics::default(),
            status: Status::Unknown,
        }
    }

    /// Record that HTTP polling observed a change in a monitored field.
    /// Expires stale pending entries before recording.
    pub fn note_http_change(&mut self, field: &'static str, now: Instant) {
        if !MONITORED_FIELDS.contains(&field) {
            return;
        }
        self.expire_pending(now);
        self.stats.detected += 1;
        self.pending.push(PendingChange {
            field,
            detected_at: now,
        });
        self.reclassify();
    }

    /// Record that a UPnP event confirmed a change in `field`. Matches
    /// against the oldest pending detection for that field still inside
    /// the grace window.
    pub fn note_upnp_event(&mut self, field: &'static str, now: Instant) {
        if !MONITORED_FIELDS.contains(&field) {
            return;
        }
        self.expire_pending(now);
        if let Some(pos) = self.pending.iter().position(|p| p.field == field) {
            self.pending.remove(pos);
            self.stats.matched += 1;
            self.reclassify();
        }
    }

    fn expire_pending(&mut self, now: Instant) {
        self.pending
            .retain(|p| now.saturating_duration_since(p.detected_at) <= GRACE_WINDOW);
    }

    fn reclassify(&mut self) {
        if self.stats.detected < MIN_SAMPLES {
            return;
        }
        let miss_rate = self.stats.miss_rate();
        if miss_rate > UNHEALTHY_MISS_RATE {
            self.status = Status::Unhealthy;
        } else if miss_rate < HEALTHY_MISS_RATE {
            if self.status == Status::Unhealthy {
                self.stats = Statistics::default();
            }
            self.status = Status::Healthy;
        }
        // otherwise: hysteresis, keep current status.
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, Status::Healthy | Status::Unknown)
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    pub fn status(&self) -> Status {
        self.status
    }
}
