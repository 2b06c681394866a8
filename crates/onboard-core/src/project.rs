use crate::error::{PortalError, Result};
use crate::types::{Environment, PhaseStatus, ProjectStatus};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_AWS_REGION: &str = "us-east-1";

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("valid regex"))
}

fn aws_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{12}$").expect("valid regex"))
}

pub fn is_slug(s: &str) -> bool {
    slug_re().is_match(s)
}

// ---------------------------------------------------------------------------
// ProjectMeta: operator input
// ---------------------------------------------------------------------------

/// Form fields submitted when creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project_name: String,
    #[serde(default)]
    pub domain: String,
    /// Kept as text so an unknown value surfaces as a validation error.
    pub environment: String,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub team_email: String,
    #[serde(default)]
    pub jira_project: String,
    #[serde(default)]
    pub ticket_ref: String,
    #[serde(default)]
    pub aws_account_id: String,
    #[serde(default = "default_region")]
    pub aws_region: String,
    #[serde(default)]
    pub eks_cluster_name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_completion: Option<NaiveDate>,
}

fn default_region() -> String {
    DEFAULT_AWS_REGION.to_string()
}

impl ProjectMeta {
    /// Field-level checks. All problems are reported together.
    pub fn validate(&self) -> Result<Environment> {
        let mut problems = Vec::new();

        if !is_slug(&self.project_name) {
            problems.push(format!(
                "project_name '{}' must be lowercase alphanumeric with hyphens",
                self.project_name
            ));
        }
        let environment = match self.environment.parse::<Environment>() {
            Ok(env) => Some(env),
            Err(_) => {
                problems.push(format!(
                    "environment must be one of dev, uat, prod (got '{}')",
                    self.environment
                ));
                None
            }
        };
        if !email_re().is_match(&self.team_email) {
            problems.push(format!("team_email '{}' is not a valid address", self.team_email));
        }
        if !self.aws_account_id.is_empty() && !aws_account_re().is_match(&self.aws_account_id) {
            problems.push(format!(
                "aws_account_id '{}' must be 12 digits",
                self.aws_account_id
            ));
        }
        if let (Some(start), Some(target)) = (self.start_date, self.target_completion) {
            if target < start {
                problems.push(format!(
                    "target_completion {target} is before start_date {start}"
                ));
            }
        }

        match environment {
            Some(env) if problems.is_empty() => Ok(env),
            _ => Err(PortalError::Validation(problems.join("; "))),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectUpdate: partial metadata edit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub team_email: Option<String>,
    #[serde(default)]
    pub jira_project: Option<String>,
    #[serde(default)]
    pub ticket_ref: Option<String>,
    #[serde(default)]
    pub aws_account_id: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub eks_cluster_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_completion: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub project_name: String,
    pub domain: String,
    pub environment: Environment,
    pub team_name: String,
    pub team_email: String,
    pub jira_project: String,
    pub ticket_ref: String,
    pub aws_account_id: String,
    pub aws_region: String,
    pub eks_cluster_name: String,
    pub(crate) status: ProjectStatus,
    pub(crate) percent_complete: f64,
    pub start_date: Option<NaiveDate>,
    pub target_completion: Option<NaiveDate>,
    pub catalog_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_meta(id: u64, meta: ProjectMeta, now: DateTime<Utc>) -> Result<Self> {
        let environment = meta.validate()?;
        Ok(Self {
            id,
            project_name: meta.project_name,
            domain: meta.domain,
            environment,
            team_name: meta.team_name,
            team_email: meta.team_email,
            jira_project: meta.jira_project,
            ticket_ref: meta.ticket_ref,
            aws_account_id: meta.aws_account_id,
            aws_region: meta.aws_region,
            eks_cluster_name: meta.eks_cluster_name,
            status: ProjectStatus::Draft,
            percent_complete: 0.0,
            start_date: meta.start_date,
            target_completion: meta.target_completion,
            catalog_version: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn percent_complete(&self) -> f64 {
        self.percent_complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ProjectStatus::Cancelled
    }

    /// Key of the unique `(environment, project_name)` index.
    pub fn name_key(&self) -> String {
        name_key(self.environment, &self.project_name)
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = ProjectStatus::Cancelled;
        self.updated_at = now;
    }

    /// Apply a partial edit, re-running field validation on the result.
    pub fn apply_update(&mut self, update: ProjectUpdate, now: DateTime<Utc>) -> Result<()> {
        let meta = ProjectMeta {
            project_name: update.project_name.unwrap_or_else(|| self.project_name.clone()),
            domain: update.domain.unwrap_or_else(|| self.domain.clone()),
            environment: update
                .environment
                .unwrap_or_else(|| self.environment.to_string()),
            team_name: update.team_name.unwrap_or_else(|| self.team_name.clone()),
            team_email: update.team_email.unwrap_or_else(|| self.team_email.clone()),
            jira_project: update.jira_project.unwrap_or_else(|| self.jira_project.clone()),
            ticket_ref: update.ticket_ref.unwrap_or_else(|| self.ticket_ref.clone()),
            aws_account_id: update
                .aws_account_id
                .unwrap_or_else(|| self.aws_account_id.clone()),
            aws_region: update.aws_region.unwrap_or_else(|| self.aws_region.clone()),
            eks_cluster_name: update
                .eks_cluster_name
                .unwrap_or_else(|| self.eks_cluster_name.clone()),
            start_date: update.start_date.or(self.start_date),
            target_completion: update.target_completion.or(self.target_completion),
        };
        let environment = meta.validate()?;

        self.project_name = meta.project_name;
        self.domain = meta.domain;
        self.environment = environment;
        self.team_name = meta.team_name;
        self.team_email = meta.team_email;
        self.jira_project = meta.jira_project;
        self.ticket_ref = meta.ticket_ref;
        self.aws_account_id = meta.aws_account_id;
        self.aws_region = meta.aws_region;
        self.eks_cluster_name = meta.eks_cluster_name;
        self.start_date = meta.start_date;
        self.target_completion = meta.target_completion;
        self.updated_at = now;
        Ok(())
    }

    /// Value of a named project field, for template substitution.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "project_id" => self.id.to_string(),
            "project_name" => self.project_name.clone(),
            "domain" => self.domain.clone(),
            "environment" => self.environment.to_string(),
            "team_name" => self.team_name.clone(),
            "team_email" => self.team_email.clone(),
            "jira_project" => self.jira_project.clone(),
            "ticket_ref" => self.ticket_ref.clone(),
            "aws_account_id" => self.aws_account_id.clone(),
            "aws_region" => self.aws_region.clone(),
            "eks_cluster_name" => self.eks_cluster_name.clone(),
            "start_date" => self.start_date?.to_string(),
            "target_completion" => self.target_completion?.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Compare actual progress against elapsed schedule time.
    pub fn schedule_health(&self, today: NaiveDate) -> ScheduleHealth {
        let (Some(start), Some(target)) = (self.start_date, self.target_completion) else {
            return ScheduleHealth::Gray;
        };
        let total_days = (target - start).num_days().max(1) as f64;
        let elapsed = (today - start).num_days() as f64;
        let expected = (elapsed / total_days * 100.0).clamp(0.0, 100.0);
        let diff = self.percent_complete - expected;
        if diff >= -10.0 {
            ScheduleHealth::Green
        } else if diff >= -25.0 {
            ScheduleHealth::Amber
        } else {
            ScheduleHealth::Red
        }
    }
}

pub fn name_key(environment: Environment, project_name: &str) -> String {
    format!("{environment}/{project_name}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleHealth {
    Green,
    Amber,
    Red,
    Gray,
}

// ---------------------------------------------------------------------------
// ProjectFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFilter {
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub domain: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        self.environment.map_or(true, |e| e == project.environment)
            && self.status.map_or(true, |s| s == project.status)
            && self
                .domain
                .as_deref()
                .map_or(true, |d| d == project.domain)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: u64,
    pub project_id: u64,
    pub phase_number: u8,
    pub name: String,
    pub(crate) status: PhaseStatus,
    pub estimated_days: u32,
    pub target_start: Option<NaiveDate>,
    pub target_end: Option<NaiveDate>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Selected phase numbers this phase waits on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<u8>,
}

impl Phase {
    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    /// Whole days between first start and completion.
    pub fn actual_days(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => Some((c - s).num_days()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_meta() -> ProjectMeta {
        ProjectMeta {
            project_name: "pega-claims-dev".to_string(),
            domain: "claims".to_string(),
            environment: "dev".to_string(),
            team_name: "Claims Platform".to_string(),
            team_email: "claims-platform@example.com".to_string(),
            jira_project: "CLM".to_string(),
            ticket_ref: "RITM0012345".to_string(),
            aws_account_id: "123456789012".to_string(),
            aws_region: DEFAULT_AWS_REGION.to_string(),
            eks_cluster_name: "eks-claims-dev".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5),
            target_completion: None,
        }
    }

    #[test]
    fn valid_meta_passes() {
        assert_eq!(sample_meta().validate().unwrap(), Environment::Dev);
    }

    #[test]
    fn bad_fields_are_reported_together() {
        let mut meta = sample_meta();
        meta.team_email = "not-an-email".to_string();
        meta.environment = "staging".to_string();
        let err = meta.validate().unwrap_err().to_string();
        assert!(err.contains("team_email"), "{err}");
        assert!(err.contains("environment"), "{err}");
    }

    #[test]
    fn project_name_must_be_slug() {
        let mut meta = sample_meta();
        meta.project_name = "Pega Claims".to_string();
        assert!(matches!(meta.validate(), Err(PortalError::Validation(_))));
    }

    #[test]
    fn aws_account_id_is_twelve_digits_when_present() {
        let mut meta = sample_meta();
        meta.aws_account_id = "1234".to_string();
        assert!(meta.validate().is_err());
        meta.aws_account_id = String::new();
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn update_revalidates() {
        let mut p = Project::from_meta(7, sample_meta(), Utc::now()).unwrap();
        let err = p
            .apply_update(
                ProjectUpdate {
                    team_email: Some("broken".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
        assert_eq!(p.team_email, "claims-platform@example.com");

        p.apply_update(
            ProjectUpdate {
                environment: Some("uat".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(p.environment, Environment::Uat);
        assert_eq!(p.name_key(), "uat/pega-claims-dev");
    }

    #[test]
    fn schedule_health_bands() {
        let mut p = Project::from_meta(1, sample_meta(), Utc::now()).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        p.start_date = Some(start);
        p.target_completion = NaiveDate::from_ymd_opt(2026, 4, 11); // 100 days

        let day_50 = start + chrono::Days::new(50);
        p.percent_complete = 45.0;
        assert_eq!(p.schedule_health(day_50), ScheduleHealth::Green);
        p.percent_complete = 30.0;
        assert_eq!(p.schedule_health(day_50), ScheduleHealth::Amber);
        p.percent_complete = 10.0;
        assert_eq!(p.schedule_health(day_50), ScheduleHealth::Red);

        p.target_completion = None;
        assert_eq!(p.schedule_health(day_50), ScheduleHealth::Gray);
    }

    #[test]
    fn filter_matches_on_all_given_fields() {
        let p = Project::from_meta(1, sample_meta(), Utc::now()).unwrap();
        assert!(ProjectFilter::default().matches(&p));
        let f = ProjectFilter {
            environment: Some(Environment::Dev),
            domain: Some("claims".to_string()),
            ..Default::default()
        };
        assert!(f.matches(&p));
        let f = ProjectFilter {
            status: Some(ProjectStatus::Active),
            ..Default::default()
        };
        assert!(!f.matches(&p));
    }

    #[test]
    fn unknown_field_has_no_value() {
        let p = Project::from_meta(1, sample_meta(), Utc::now()).unwrap();
        assert_eq!(p.field("project_name").as_deref(), Some("pega-claims-dev"));
        assert_eq!(p.field("environment").as_deref(), Some("dev"));
        assert!(p.field("rds_endpoint").is_none());
        assert!(p.field("target_completion").is_none());
    }
}
