//! Project-scoped key/value outputs. One value per key; a later write
//! replaces both the value and the phase tag.

use crate::error::{PortalError, Result};
use crate::project::Project;
use crate::types::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub project_id: u64,
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_number: Option<u8>,
    /// Write sequence; higher is more recent.
    pub seq: u64,
    pub updated_at: DateTime<Utc>,
}

/// Output keys are template tokens, so they must survive `{key}` scanning.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 128 {
        return Err(PortalError::Validation(format!(
            "output key must be 1-128 characters (got {})",
            key.len()
        )));
    }
    if let Some(c) = key.chars().find(|c| matches!(c, '{' | '}') || c.is_whitespace()) {
        return Err(PortalError::Validation(format!(
            "output key '{key}' contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// Newest write first.
pub fn sort_newest_first(outputs: &mut [Output]) {
    outputs.sort_by(|a, b| b.seq.cmp(&a.seq));
}

pub fn as_map(outputs: &[Output]) -> HashMap<String, String> {
    outputs
        .iter()
        .map(|o| (o.key.clone(), o.value.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            _ => Err(PortalError::Validation(format!(
                "export format must be json or yaml (got '{s}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedOutput {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_number: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputExport {
    pub project: String,
    pub environment: Environment,
    pub exported_at: DateTime<Utc>,
    pub outputs: Vec<ExportedOutput>,
}

impl OutputExport {
    pub fn new(project: &Project, mut outputs: Vec<Output>, now: DateTime<Utc>) -> Self {
        sort_newest_first(&mut outputs);
        Self {
            project: project.project_name.clone(),
            environment: project.environment,
            exported_at: now,
            outputs: outputs
                .into_iter()
                .map(|o| ExportedOutput {
                    key: o.key,
                    value: o.value,
                    phase_number: o.phase_number,
                    updated_at: o.updated_at,
                })
                .collect(),
        }
    }

    pub fn render(&self, format: ExportFormat) -> Result<String> {
        Ok(match format {
            ExportFormat::Json => serde_json::to_string_pretty(self)?,
            ExportFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }
}
