use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("not initialized: run 'onboard init'")]
    NotInitialized,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("project '{name}' already exists in environment '{environment}'")]
    DuplicateProject { name: String, environment: String },

    #[error("project not found: {0}")]
    ProjectNotFound(u64),

    #[error("phase not found: {0}")]
    PhaseNotFound(u64),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("action not found: {0}")]
    ActionNotFound(u64),

    #[error("task '{task}' has unmet prerequisites: {}", unmet.join(", "))]
    PrerequisiteUnmet { task: String, unmet: Vec<String> },

    #[error("task '{task}' has unchecked validation items: {}", unchecked.join("; "))]
    ValidationIncomplete {
        task: String,
        unchecked: Vec<String>,
    },

    #[error("task '{task}' is missing outputs: {}", missing.join(", "))]
    OutputsMissing { task: String, missing: Vec<String> },

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("project {0} is cancelled")]
    ProjectClosed(u64),

    #[error("malformed template: {0}")]
    Template(String),

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("database error: {0}")]
    Db(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PortalError>;
