//! Agreed against actual delivery dates. Phases carry one deadline per
//! owning team; tasks carry at most one. Variance is whole days late
//! (negative means early).

use crate::error::{PortalError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OWNERSHIP: &str = "Platform Team";

/// Slips of at most this many days count as minor.
pub const MINOR_SLIP_DAYS: i64 = 3;

/// Dates supplied by an operator. Every write replaces all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlineDates {
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
    #[serde(default)]
    pub agreed_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

pub fn variance_days(agreed: Option<NaiveDate>, actual: Option<NaiveDate>) -> Option<i64> {
    match (agreed, actual) {
        (Some(agreed), Some(actual)) => Some((actual - agreed).num_days()),
        _ => None,
    }
}

impl DeadlineDates {
    pub fn variance_days(&self) -> Option<i64> {
        variance_days(self.agreed_date, self.actual_date)
    }
}

pub fn validate_ownership(ownership: &str) -> Result<()> {
    if ownership.trim().is_empty() || ownership.len() > 64 {
        return Err(PortalError::Validation(format!(
            "ownership '{ownership}' must be 1-64 characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDeadline {
    pub project_id: u64,
    pub phase_id: u64,
    pub phase_number: u8,
    pub phase_name: String,
    pub ownership: String,
    #[serde(flatten)]
    pub dates: DeadlineDates,
    pub variance_days: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDeadline {
    pub project_id: u64,
    pub task_id: u64,
    pub task_key: String,
    pub task_name: String,
    pub ownership: String,
    pub phase_number: u8,
    #[serde(flatten)]
    pub dates: DeadlineDates,
    pub variance_days: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceStats {
    pub total_deadlines: usize,
    pub on_time: usize,
    pub minor_slip: usize,
    pub major_slip: usize,
    /// Mean of the known variances, one decimal; 0 when none are known.
    pub avg_variance: f64,
}

/// Band every deadline. Deadlines without both dates count toward the
/// total only.
pub fn variance_stats(variances: &[Option<i64>]) -> VarianceStats {
    let mut stats = VarianceStats {
        total_deadlines: variances.len(),
        ..VarianceStats::default()
    };
    let known: Vec<i64> = variances.iter().flatten().copied().collect();
    for v in &known {
        match *v {
            v if v <= 0 => stats.on_time += 1,
            v if v <= MINOR_SLIP_DAYS => stats.minor_slip += 1,
            _ => stats.major_slip += 1,
        }
    }
    if !known.is_empty() {
        let mean = known.iter().sum::<i64>() as f64 / known.len() as f64;
        stats.avg_variance = (mean * 10.0).round() / 10.0;
    }
    stats
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceReport {
    pub project_id: u64,
    pub phase_deadlines: Vec<PhaseDeadline>,
    pub task_deadlines: Vec<TaskDeadline>,
    /// Computed over phase deadlines.
    pub stats: VarianceStats,
}

impl VarianceReport {
    pub fn new(
        project_id: u64,
        mut phase_deadlines: Vec<PhaseDeadline>,
        mut task_deadlines: Vec<TaskDeadline>,
    ) -> Self {
        phase_deadlines.sort_by(|a, b| {
            (a.phase_number, &a.ownership).cmp(&(b.phase_number, &b.ownership))
        });
        task_deadlines.sort_by_key(|d| (d.phase_number, d.task_id));
        let variances: Vec<Option<i64>> =
            phase_deadlines.iter().map(|d| d.variance_days).collect();
        Self {
            project_id,
            stats: variance_stats(&variances),
            phase_deadlines,
            task_deadlines,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
