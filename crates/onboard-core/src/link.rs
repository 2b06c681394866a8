//! Placeholder substitution for action URLs and task commands.
//!
//! Templates use `{name}` tokens. A token resolves against the project's own
//! fields first, then against the project's recorded outputs. Tokens that
//! resolve to nothing are left in place verbatim and reported back so the
//! caller can flag the missing value instead of producing a broken link.
//! Only unbalanced delimiters are an error.

use crate::error::{PortalError, Result};
use crate::project::Project;
use crate::task::TaskAction;
use crate::types::ActionType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Rendered
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendered {
    pub text: String,
    /// Token names left unsubstituted, in order of first appearance.
    pub unresolved: Vec<String>,
}

impl Rendered {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolved link for one task action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLink {
    pub action_id: u64,
    pub task_id: u64,
    pub action_type: ActionType,
    pub label: String,
    pub url: String,
    pub unresolved: Vec<String>,
    pub is_automated: bool,
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

enum Piece<'a> {
    Text(&'a str),
    /// `name` is trimmed; `raw` is the token exactly as written, braces included.
    Token { name: &'a str, raw: &'a str },
}

fn scan(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut text_start = 0;
    let mut open: Option<usize> = None;

    for (i, c) in template.char_indices() {
        match (c, open) {
            ('{', None) => {
                if text_start < i {
                    pieces.push(Piece::Text(&template[text_start..i]));
                }
                open = Some(i);
            }
            ('{', Some(at)) => {
                return Err(PortalError::Template(format!(
                    "nested '{{' at byte {i} inside placeholder opened at byte {at}"
                )));
            }
            ('}', None) => {
                return Err(PortalError::Template(format!(
                    "unmatched '}}' at byte {i}"
                )));
            }
            ('}', Some(at)) => {
                let name = template[at + 1..i].trim();
                if name.is_empty() {
                    return Err(PortalError::Template(format!(
                        "empty placeholder at byte {at}"
                    )));
                }
                pieces.push(Piece::Token {
                    name,
                    raw: &template[at..=i],
                });
                open = None;
                text_start = i + 1;
            }
            _ => {}
        }
    }

    if let Some(at) = open {
        return Err(PortalError::Template(format!(
            "unclosed '{{' at byte {at}"
        )));
    }
    if text_start < template.len() {
        pieces.push(Piece::Text(&template[text_start..]));
    }
    Ok(pieces)
}

/// Check that `template` is structurally well-formed.
pub fn validate(template: &str) -> Result<()> {
    scan(template).map(|_| ())
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for piece in scan(template)? {
        if let Piece::Token { name, .. } = piece {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Substitute every token via `lookup`; unresolved tokens pass through.
pub fn render<F>(template: &str, lookup: F) -> Result<Rendered>
where
    F: Fn(&str) -> Option<String>,
{
    let mut text = String::with_capacity(template.len());
    let mut unresolved: Vec<String> = Vec::new();

    for piece in scan(template)? {
        match piece {
            Piece::Text(t) => text.push_str(t),
            Piece::Token { name, raw } => match lookup(name) {
                Some(value) => text.push_str(&value),
                None => {
                    text.push_str(raw);
                    if !unresolved.iter().any(|n| n == name) {
                        unresolved.push(name.to_string());
                    }
                }
            },
        }
    }

    Ok(Rendered { text, unresolved })
}

/// Render against a project: project fields win, outputs fill the rest.
pub fn render_for_project(
    template: &str,
    project: &Project,
    outputs: &HashMap<String, String>,
) -> Result<Rendered> {
    render(template, |name| {
        project
            .field(name)
            .filter(|v| !v.is_empty())
            .or_else(|| outputs.get(name).cloned())
    })
}

/// Build the URL for one action. Pure: never touches storage or the network.
pub fn build_action_url(
    action: &TaskAction,
    project: &Project,
    outputs: &HashMap<String, String>,
) -> Result<ActionLink> {
    let rendered = render_for_project(&action.url_template, project, outputs)?;
    Ok(ActionLink {
        action_id: action.id,
        task_id: action.task_id,
        action_type: action.action_type,
        label: action.label.clone(),
        url: rendered.text,
        unresolved: rendered.unresolved,
        is_automated: action.is_automated,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{tests::sample_meta, Project};

    fn project(name: &str) -> Project {
        let mut meta = sample_meta();
        meta.project_name = name.to_string();
        Project::from_meta(1, meta, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn substitutes_project_name() {
        let p = project("pega-claims-dev");
        let r = render_for_project(
            "https://jira.example.com/create?summary=Access+for+{project_name}",
            &p,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(
            r.text,
            "https://jira.example.com/create?summary=Access+for+pega-claims-dev"
        );
        assert!(r.is_complete());
    }

    #[test]
    fn falls_back_to_outputs_then_passthrough() {
        let p = project("claims");
        let mut outputs = HashMap::new();
        outputs.insert("rds_endpoint".to_string(), "db.rds.amazonaws.com".to_string());

        let r = render_for_project("{rds_endpoint}/{vpc_id}/{vpc_id}", &p, &outputs).unwrap();
        assert_eq!(r.text, "db.rds.amazonaws.com/{vpc_id}/{vpc_id}");
        assert_eq!(r.unresolved, vec!["vpc_id".to_string()]);
    }

    #[test]
    fn project_field_beats_output_of_same_name() {
        let p = project("claims");
        let mut outputs = HashMap::new();
        outputs.insert("project_name".to_string(), "shadowed".to_string());
        let r = render_for_project("{project_name}", &p, &outputs).unwrap();
        assert_eq!(r.text, "claims");
    }

    #[test]
    fn empty_project_field_falls_through_to_outputs() {
        let mut p = project("claims");
        p.eks_cluster_name = String::new();
        let mut outputs = HashMap::new();
        outputs.insert("eks_cluster_name".to_string(), "eks-shared-01".to_string());
        let r = render_for_project("{eks_cluster_name}", &p, &outputs).unwrap();
        assert_eq!(r.text, "eks-shared-01");
    }

    #[test]
    fn unbalanced_delimiters_are_errors() {
        for bad in ["{open", "close}", "{a{b}}", "{}", "x{ }y"] {
            let err = validate(bad).unwrap_err();
            assert!(matches!(err, PortalError::Template(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn placeholders_are_distinct_and_ordered() {
        let names = placeholders("{b}-{a}-{b}").unwrap();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn unresolved_token_keeps_its_spacing() {
        let r = render("vpc={ vpc_id }&ns={namespace}", |name| {
            (name == "namespace").then(|| "claims".to_string())
        })
        .unwrap();
        assert_eq!(r.text, "vpc={ vpc_id }&ns=claims");
        assert_eq!(r.unresolved, vec!["vpc_id".to_string()]);
    }

    #[test]
    fn template_without_tokens_is_unchanged() {
        let r = render("https://nexus.example.com/", |_| None).unwrap();
        assert_eq!(r.text, "https://nexus.example.com/");
    }
}
