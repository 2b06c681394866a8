pub mod catalog;
pub mod init;
pub mod link;
pub mod output;
pub mod project;
pub mod serve;
pub mod task;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use onboard_core::deadline::DeadlineDates;
use onboard_core::Portal;
use std::path::Path;

/// Dates shared by phase and task deadlines (YYYY-MM-DD).
#[derive(Args)]
pub struct DeadlineArgs {
    #[arg(long)]
    planned: Option<NaiveDate>,
    /// Date the owning team committed to
    #[arg(long)]
    agreed: Option<NaiveDate>,
    /// Date the work actually finished
    #[arg(long)]
    actual: Option<NaiveDate>,
    #[arg(long, default_value = "")]
    notes: String,
}

impl From<DeadlineArgs> for DeadlineDates {
    fn from(a: DeadlineArgs) -> Self {
        DeadlineDates {
            planned_date: a.planned,
            agreed_date: a.agreed,
            actual_date: a.actual,
            notes: a.notes,
        }
    }
}

pub fn variance_label(days: Option<i64>) -> String {
    match days {
        None => "-".to_string(),
        Some(d) if d > 0 => format!("+{d}d"),
        Some(d) => format!("{d}d"),
    }
}

/// Open the portal at `root`, pointing at `onboard init` when it is missing.
pub fn open(root: &Path) -> anyhow::Result<Portal> {
    Portal::open(root).with_context(|| format!("failed to open portal at {}", root.display()))
}
