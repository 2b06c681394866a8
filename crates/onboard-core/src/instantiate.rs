use crate::catalog::{check_phase_number, Catalog};
use crate::error::{PortalError, Result};
use crate::project::{Phase, Project, ProjectMeta};
use crate::task::{self, ChecklistItem, Task, TaskAction};
use crate::types::PhaseStatus;
use chrono::{DateTime, Days, NaiveDate, Utc};
use std::collections::{BTreeSet, HashSet};

/// Every row a new project consists of, ready to persist in one transaction.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub project: Project,
    pub phases: Vec<Phase>,
    pub tasks: Vec<Task>,
    pub actions: Vec<TaskAction>,
}

/// Check the phase selection: non-empty, in range, present in the catalog.
/// Returns the numbers ascending with duplicates removed.
pub fn select_phases(catalog: &Catalog, selected: &[u8]) -> Result<Vec<u8>> {
    if selected.is_empty() {
        return Err(PortalError::Validation(
            "select at least one phase".to_string(),
        ));
    }
    let unique: BTreeSet<u8> = selected.iter().copied().collect();
    for &n in &unique {
        check_phase_number(n)?;
        if catalog.phase(n).is_none() {
            return Err(PortalError::Validation(format!(
                "phase {n} is not defined in catalog {}",
                catalog.version
            )));
        }
    }
    Ok(unique.into_iter().collect())
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(date)
}

/// Stamp the selected catalog phases into a new project.
///
/// `next_id` hands out row ids. Prerequisites and phase dependencies that
/// point into phases not selected are dropped; what remains must be an acyclic graph over the
/// project's own tasks.
pub fn instantiate<F>(
    catalog: &Catalog,
    meta: ProjectMeta,
    selected: &[u8],
    mut next_id: F,
    now: DateTime<Utc>,
) -> Result<NewProject>
where
    F: FnMut() -> Result<u64>,
{
    let numbers = select_phases(catalog, selected)?;
    meta.validate()?;

    let mut project = Project::from_meta(next_id()?, meta, now)?;
    project.catalog_version = catalog.version.clone();

    let templates: Vec<_> = numbers
        .iter()
        .filter_map(|&n| catalog.phase(n))
        .collect();

    if project.target_completion.is_none() {
        let total: u32 = templates.iter().map(|p| p.duration_days).sum();
        project.target_completion = project.start_date.map(|s| add_days(s, total));
    }

    let in_scope: HashSet<&str> = templates
        .iter()
        .flat_map(|p| p.tasks.iter().map(|t| t.key.as_str()))
        .collect();

    let mut phases = Vec::with_capacity(templates.len());
    let mut tasks = Vec::new();
    let mut actions = Vec::new();
    let mut running = project.start_date;

    for template in templates {
        let phase_id = next_id()?;
        let target_end = running.map(|d| add_days(d, template.duration_days));
        phases.push(Phase {
            id: phase_id,
            project_id: project.id,
            phase_number: template.number,
            name: template.name.clone(),
            status: PhaseStatus::Pending,
            estimated_days: template.duration_days,
            target_start: running,
            target_end,
            started_at: None,
            completed_at: None,
            depends_on: template
                .depends_on
                .iter()
                .copied()
                .filter(|n| numbers.contains(n))
                .collect(),
        });
        if template.sequential {
            running = target_end;
        }

        for (order, t) in template.tasks.iter().enumerate() {
            let task_id = next_id()?;
            let prerequisites: Vec<String> = t
                .prerequisites
                .iter()
                .filter(|k| in_scope.contains(k.as_str()))
                .cloned()
                .collect();
            tasks.push(Task {
                id: task_id,
                project_id: project.id,
                phase_id,
                phase_number: template.number,
                key: t.key.clone(),
                task_order: order as u32 + 1,
                name: t.name.clone(),
                category: t.category.clone(),
                ownership: t.ownership.clone(),
                description: t.description.clone(),
                command: t.command.clone(),
                status: task::initial_status(&prerequisites),
                prerequisites,
                expected_outputs: t.outputs.clone(),
                checklist: t
                    .validation
                    .iter()
                    .map(|text| ChecklistItem {
                        text: text.clone(),
                        checked: false,
                    })
                    .collect(),
                started_at: None,
                completed_at: None,
                completed_by: None,
            });
            for a in &t.actions {
                actions.push(TaskAction {
                    id: next_id()?,
                    task_id,
                    project_id: project.id,
                    action_type: a.action_type,
                    label: a.label.clone(),
                    url_template: a.url.clone(),
                    is_automated: false,
                });
            }
        }
    }

    task::validate_prerequisites(&tasks)?;

    Ok(NewProject {
        project,
        phases,
        tasks,
        actions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::sample_meta;
    use crate::types::{ProjectStatus, TaskStatus};

    fn counter() -> impl FnMut() -> Result<u64> {
        let mut n = 0;
        move || {
            n += 1;
            Ok(n)
        }
    }

    #[test]
    fn phase_one_only() {
        let catalog = Catalog::builtin().unwrap();
        let np = instantiate(&catalog, sample_meta(), &[1], counter(), Utc::now()).unwrap();

        assert_eq!(np.phases.len(), 1);
        assert_eq!(np.tasks.len(), 14);
        assert_eq!(np.project.status(), ProjectStatus::Draft);
        assert_eq!(np.project.percent_complete(), 0.0);
        for t in &np.tasks {
            let expected = if t.prerequisites.is_empty() {
                TaskStatus::Pending
            } else {
                TaskStatus::Blocked
            };
            assert_eq!(t.status(), expected, "{}", t.key);
        }
        let orders: Vec<u32> = np.tasks.iter().map(|t| t.task_order).collect();
        assert_eq!(orders, (1..=14).collect::<Vec<u32>>());
    }

    #[test]
    fn ids_are_unique_across_rows() {
        let catalog = Catalog::builtin().unwrap();
        let np = instantiate(&catalog, sample_meta(), &[1, 2], counter(), Utc::now()).unwrap();
        let mut ids: Vec<u64> = vec![np.project.id];
        ids.extend(np.phases.iter().map(|p| p.id));
        ids.extend(np.tasks.iter().map(|t| t.id));
        ids.extend(np.actions.iter().map(|a| a.id));
        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(np.actions.iter().all(|a| !a.is_automated));
    }

    #[test]
    fn prerequisites_outside_selection_are_dropped() {
        let catalog = Catalog::builtin().unwrap();
        let np = instantiate(&catalog, sample_meta(), &[2], counter(), Utc::now()).unwrap();
        let rds = np.tasks.iter().find(|t| t.key == "rds-provision").unwrap();
        assert!(rds.prerequisites.is_empty());
        assert_eq!(rds.status(), TaskStatus::Pending);
        let iam = np.tasks.iter().find(|t| t.key == "iam-roles").unwrap();
        assert_eq!(iam.prerequisites, vec!["eks-namespace".to_string()]);
        assert_eq!(iam.status(), TaskStatus::Blocked);
    }

    #[test]
    fn empty_or_out_of_range_selection_fails() {
        let catalog = Catalog::builtin().unwrap();
        for bad in [&[][..], &[0][..], &[1, 10][..]] {
            let err = instantiate(&catalog, sample_meta(), bad, counter(), Utc::now()).unwrap_err();
            assert!(matches!(err, PortalError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn invalid_meta_fails() {
        let catalog = Catalog::builtin().unwrap();
        let mut meta = sample_meta();
        meta.environment = "qa".to_string();
        let err = instantiate(&catalog, meta, &[1], counter(), Utc::now()).unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[test]
    fn schedule_advances_only_past_sequential_phases() {
        let catalog = Catalog::builtin().unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut meta = sample_meta();
        meta.start_date = Some(start);
        let np = instantiate(&catalog, meta, &[1, 2, 6, 7], counter(), Utc::now()).unwrap();

        let p1 = &np.phases[0];
        assert_eq!(p1.target_start, Some(start));
        assert_eq!(p1.target_end, Some(add_days(start, 21)));
        let p2 = &np.phases[1];
        assert_eq!(p2.target_start, p1.target_end);
        // Phase 6 is not sequential, so phase 7 starts alongside it.
        assert_eq!(np.phases[2].target_start, np.phases[3].target_start);

        assert_eq!(np.project.target_completion, Some(add_days(start, 21 + 28 + 10 + 10)));
    }

    #[test]
    fn phase_dependencies_outside_selection_are_dropped() {
        let catalog = Catalog::builtin().unwrap();
        let np = instantiate(&catalog, sample_meta(), &[1, 3, 6, 7], counter(), Utc::now()).unwrap();
        let deps: Vec<(u8, Vec<u8>)> = np
            .phases
            .iter()
            .map(|p| (p.phase_number, p.depends_on.clone()))
            .collect();
        // 3 depends on the unselected 2, so that edge goes.
        assert_eq!(
            deps,
            vec![(1, vec![]), (3, vec![]), (6, vec![3]), (7, vec![6])]
        );
    }
}
