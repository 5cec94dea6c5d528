use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::orders::{OrderStatus, WorkOrder};

/// Risk bucket derived from time spent in the current status. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaTier {
    Normal,
    Attention,
    Overdue,
    Critical,
}

impl SlaTier {
    pub const ALL: [SlaTier; 4] = [
        SlaTier::Normal,
        SlaTier::Attention,
        SlaTier::Overdue,
        SlaTier::Critical,
    ];
}

impl fmt::Display for SlaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SlaTier::Normal => "NORMAL",
            SlaTier::Attention => "ATTENTION",
            SlaTier::Overdue => "OVERDUE",
            SlaTier::Critical => "CRITICAL",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("thresholds must be finite and non-negative, got ({attention}, {overdue}, {critical})")]
    OutOfRange {
        attention: f64,
        overdue: f64,
        critical: f64,
    },
    #[error("thresholds must be strictly increasing, got ({attention}, {overdue}, {critical})")]
    NotIncreasing {
        attention: f64,
        overdue: f64,
        critical: f64,
    },
}

/// Hour boundaries `t1 < t2 < t3` for one status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaThresholds {
    attention_hours: f64,
    overdue_hours: f64,
    critical_hours: f64,
}

impl SlaThresholds {
    pub fn new(attention: f64, overdue: f64, critical: f64) -> Result<Self, ThresholdError> {
        let all = [attention, overdue, critical];
        if all.iter().any(|h| !h.is_finite() || *h < 0.0) {
            return Err(ThresholdError::OutOfRange {
                attention,
                overdue,
                critical,
            });
        }
        if !(attention < overdue && overdue < critical) {
            return Err(ThresholdError::NotIncreasing {
                attention,
                overdue,
                critical,
            });
        }
        Ok(Self {
            attention_hours: attention,
            overdue_hours: overdue,
            critical_hours: critical,
        })
    }

    pub fn attention_hours(&self) -> f64 {
        self.attention_hours
    }

    pub fn overdue_hours(&self) -> f64 {
        self.overdue_hours
    }

    pub fn critical_hours(&self) -> f64 {
        self.critical_hours
    }

    /// Upper bounds are inclusive: exactly `t1` hours is still NORMAL.
    pub fn tier_for_minutes(&self, elapsed_minutes: i64) -> SlaTier {
        let elapsed = elapsed_minutes as f64;
        if elapsed <= self.attention_hours * 60.0 {
            SlaTier::Normal
        } else if elapsed <= self.overdue_hours * 60.0 {
            SlaTier::Attention
        } else if elapsed <= self.critical_hours * 60.0 {
            SlaTier::Overdue
        } else {
            SlaTier::Critical
        }
    }
}

/// Per-status threshold table. Classification is pure and total: a status
/// without configured thresholds is NORMAL.
#[derive(Debug, Clone, Default)]
pub struct SlaPolicy {
    thresholds: HashMap<OrderStatus, SlaThresholds>,
}

impl SlaPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, status: OrderStatus, thresholds: SlaThresholds) -> Self {
        self.thresholds.insert(status, thresholds);
        self
    }

    pub fn thresholds_for(&self, status: OrderStatus) -> Option<&SlaThresholds> {
        self.thresholds.get(&status)
    }

    pub fn classify(&self, status: OrderStatus, elapsed_minutes: i64) -> SlaTier {
        match self.thresholds.get(&status) {
            Some(thresholds) => thresholds.tier_for_minutes(elapsed_minutes),
            None => {
                // Closed orders have no SLA clock; only open gaps are worth a warning.
                if status.is_open() {
                    warn!(status = %status, "No SLA thresholds configured, defaulting to NORMAL");
                }
                SlaTier::Normal
            }
        }
    }

    /// Minutes counted against the SLA for `order` at `now`. A visit booked
    /// for a future slot yields a negative value (time remaining).
    pub fn elapsed_minutes(&self, order: &WorkOrder, now: DateTime<Utc>) -> i64 {
        let anchor = match (order.status, order.scheduled_at) {
            (OrderStatus::PendingVisit, Some(scheduled_at)) => scheduled_at,
            _ => order.status_changed_at,
        };
        (now - anchor).num_minutes()
    }

    pub fn tier_for(&self, order: &WorkOrder, now: DateTime<Utc>) -> SlaTier {
        let elapsed = self.elapsed_minutes(order, now);
        if elapsed < 0 {
            return SlaTier::Normal;
        }
        self.classify(order.status, elapsed)
    }
}
