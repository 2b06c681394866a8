use super::{variance_label, DeadlineArgs};
use crate::output::{opt, print_fields, print_json, print_table};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use onboard_core::deadline::VarianceReport;
use onboard_core::portal::ProjectDetail;
use onboard_core::project::{ProjectFilter, ProjectMeta, ProjectUpdate, ScheduleHealth};
use onboard_core::types::{Environment, ProjectStatus};
use std::path::Path;

#[derive(Args)]
pub struct MetaArgs {
    /// Team contact email
    #[arg(long)]
    team_email: Option<String>,
    #[arg(long)]
    domain: Option<String>,
    #[arg(long)]
    team_name: Option<String>,
    /// Jira project key used in action links
    #[arg(long)]
    jira_project: Option<String>,
    /// External ticket reference (e.g. RITM0012345)
    #[arg(long)]
    ticket_ref: Option<String>,
    /// 12-digit AWS account id
    #[arg(long)]
    aws_account_id: Option<String>,
    #[arg(long)]
    aws_region: Option<String>,
    #[arg(long)]
    eks_cluster_name: Option<String>,
    /// Planned start (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,
    /// Planned completion (YYYY-MM-DD); defaults to start plus phase durations
    #[arg(long)]
    target_completion: Option<NaiveDate>,
}

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a project from selected catalog phases
    Create {
        /// Project name (lowercase letters, digits, hyphens)
        #[arg(long)]
        name: String,
        /// dev, uat or prod
        #[arg(long)]
        environment: String,
        /// Phase numbers to include, e.g. 1,2,3
        #[arg(long, value_delimiter = ',', required = true)]
        phases: Vec<u8>,
        #[command(flatten)]
        meta: MetaArgs,
    },
    /// List projects
    List {
        #[arg(long)]
        environment: Option<Environment>,
        #[arg(long)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show a project with its phases and tasks
    Show { id: u64 },
    /// Edit project metadata
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        #[command(flatten)]
        meta: MetaArgs,
    },
    /// Cancel a project; its tasks stop accepting changes
    Cancel { id: u64 },
    /// Delete a project and everything recorded against it
    Delete { id: u64 },
    /// Task counts by status, phase and owner
    Stats { id: u64 },
    /// Re-derive phase and project status from the tasks
    Recompute { id: u64 },
    /// Phase dependency graph with progress
    Graph { id: u64 },
    /// Set one team's agreed and actual dates for a phase
    Deadline {
        /// Phase id as shown by `project show --json`
        phase_id: u64,
        /// Owning team (default: Platform Team)
        #[arg(long)]
        ownership: Option<String>,
        #[command(flatten)]
        dates: DeadlineArgs,
    },
    /// Deadline variance report
    Variance { id: u64 },
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let portal = super::open(root)?;
    match subcmd {
        ProjectSubcommand::Create {
            name,
            environment,
            phases,
            meta,
        } => {
            let meta = ProjectMeta {
                project_name: name,
                domain: meta.domain.unwrap_or_default(),
                environment,
                team_name: meta.team_name.unwrap_or_default(),
                team_email: meta.team_email.unwrap_or_default(),
                jira_project: meta.jira_project.unwrap_or_default(),
                ticket_ref: meta.ticket_ref.unwrap_or_default(),
                aws_account_id: meta.aws_account_id.unwrap_or_default(),
                aws_region: meta
                    .aws_region
                    .unwrap_or_else(|| onboard_core::project::DEFAULT_AWS_REGION.to_string()),
                eks_cluster_name: meta.eks_cluster_name.unwrap_or_default(),
                start_date: meta.start_date,
                target_completion: meta.target_completion,
            };
            let detail = portal
                .create_project(meta, &phases)
                .context("failed to create project")?;
            if json {
                return print_json(&detail);
            }
            println!(
                "Created project {} [{}] {} with {} tasks across {} phase(s)",
                detail.project.id,
                detail.project.environment,
                detail.project.project_name,
                detail.phases.iter().map(|p| p.tasks.len()).sum::<usize>(),
                detail.phases.len()
            );
            Ok(())
        }
        ProjectSubcommand::List {
            environment,
            status,
            domain,
        } => {
            let filter = ProjectFilter {
                environment,
                status,
                domain,
            };
            let projects = portal.list_projects(&filter)?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("No projects.");
                return Ok(());
            }
            let rows = projects
                .iter()
                .map(|s| {
                    vec![
                        s.project.id.to_string(),
                        s.project.project_name.clone(),
                        s.project.environment.to_string(),
                        s.project.status().to_string(),
                        format!("{:.1}%", s.project.percent_complete()),
                        health_label(s.health).to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "ENV", "STATUS", "DONE", "HEALTH"], rows);
            Ok(())
        }
        ProjectSubcommand::Show { id } => {
            let detail = portal.project_detail(id)?;
            if json {
                return print_json(&detail);
            }
            show(&detail);
            Ok(())
        }
        ProjectSubcommand::Update {
            id,
            name,
            environment,
            meta,
        } => {
            let update = ProjectUpdate {
                project_name: name,
                domain: meta.domain,
                environment,
                team_name: meta.team_name,
                team_email: meta.team_email,
                jira_project: meta.jira_project,
                ticket_ref: meta.ticket_ref,
                aws_account_id: meta.aws_account_id,
                aws_region: meta.aws_region,
                eks_cluster_name: meta.eks_cluster_name,
                start_date: meta.start_date,
                target_completion: meta.target_completion,
            };
            let project = portal.update_project(id, update)?;
            if json {
                return print_json(&project);
            }
            println!("Updated project {} ({})", project.id, project.project_name);
            Ok(())
        }
        ProjectSubcommand::Cancel { id } => {
            let project = portal.cancel_project(id)?;
            if json {
                return print_json(&project);
            }
            println!("Cancelled project {} ({})", project.id, project.project_name);
            Ok(())
        }
        ProjectSubcommand::Delete { id } => {
            portal.delete_project(id)?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted project {id}");
            Ok(())
        }
        ProjectSubcommand::Stats { id } => {
            let stats = portal.stats(id)?;
            if json {
                return print_json(&stats);
            }
            println!("{} ({:.1}% complete)\n", stats.summary, stats.percent_complete);
            let rows = stats
                .by_phase
                .iter()
                .map(|p| {
                    vec![
                        p.phase_number.to_string(),
                        p.name.clone(),
                        p.status.to_string(),
                        format!("{}/{}", p.progress.completed, p.progress.total),
                    ]
                })
                .collect();
            print_table(&["PHASE", "NAME", "STATUS", "DONE"], rows);
            println!();
            let rows = stats
                .by_ownership
                .iter()
                .map(|(owner, p)| vec![owner.clone(), format!("{}/{}", p.completed, p.total)])
                .collect();
            print_table(&["OWNER", "DONE"], rows);
            Ok(())
        }
        ProjectSubcommand::Recompute { id } => {
            let project = portal.recompute_project(id)?;
            if json {
                return print_json(&project);
            }
            println!(
                "Project {}: {} ({:.1}%)",
                project.id,
                project.status(),
                project.percent_complete()
            );
            Ok(())
        }
        ProjectSubcommand::Graph { id } => {
            let graph = portal.dependency_graph(id)?;
            if json {
                return print_json(&graph);
            }
            let rows = graph
                .nodes
                .iter()
                .map(|n| {
                    let after: Vec<String> = graph
                        .edges
                        .iter()
                        .filter(|e| e.to == n.phase_number)
                        .map(|e| format!("{} ({})", e.from, e.from_status))
                        .collect();
                    vec![
                        n.phase_number.to_string(),
                        n.name.clone(),
                        n.status.to_string(),
                        format!("{}% ({}/{})", n.percent, n.progress.completed, n.progress.total),
                        after.join(", "),
                    ]
                })
                .collect();
            print_table(&["PHASE", "NAME", "STATUS", "DONE", "AFTER"], rows);
            Ok(())
        }
        ProjectSubcommand::Deadline {
            phase_id,
            ownership,
            dates,
        } => {
            let d = portal.set_phase_deadline(phase_id, ownership.as_deref(), dates.into())?;
            if json {
                return print_json(&d);
            }
            println!(
                "Phase {} deadline for {}: agreed {}, actual {}, variance {}",
                d.phase_number,
                d.ownership,
                opt(d.dates.agreed_date),
                opt(d.dates.actual_date),
                variance_label(d.variance_days)
            );
            Ok(())
        }
        ProjectSubcommand::Variance { id } => {
            let report = portal.variance_report(id)?;
            if json {
                return print_json(&report);
            }
            let s = &report.stats;
            println!(
                "{} phase deadline(s): {} on time, {} minor slip, {} major slip, avg {:+.1}d\n",
                s.total_deadlines, s.on_time, s.minor_slip, s.major_slip, s.avg_variance
            );
            let rows = deadline_rows(&report);
            if rows.is_empty() {
                println!("No deadlines.");
                return Ok(());
            }
            print_table(&["FOR", "OWNER", "AGREED", "ACTUAL", "VARIANCE"], rows);
            Ok(())
        }
    }
}

fn deadline_rows(report: &VarianceReport) -> Vec<Vec<String>> {
    let phases = report.phase_deadlines.iter().map(|d| {
        vec![
            format!("phase {}", d.phase_number),
            d.ownership.clone(),
            opt(d.dates.agreed_date),
            opt(d.dates.actual_date),
            variance_label(d.variance_days),
        ]
    });
    let tasks = report.task_deadlines.iter().map(|d| {
        vec![
            d.task_key.clone(),
            d.ownership.clone(),
            opt(d.dates.agreed_date),
            opt(d.dates.actual_date),
            variance_label(d.variance_days),
        ]
    });
    phases.chain(tasks).collect()
}

fn health_label(health: ScheduleHealth) -> &'static str {
    match health {
        ScheduleHealth::Green => "green",
        ScheduleHealth::Amber => "amber",
        ScheduleHealth::Red => "red",
        ScheduleHealth::Gray => "gray",
    }
}

fn show(detail: &ProjectDetail) {
    let p = &detail.project;
    print_fields(&[
        ("project", format!("{} ({})", p.project_name, p.id)),
        ("environment", p.environment.to_string()),
        ("status", p.status().to_string()),
        ("progress", format!("{:.1}%  {}", p.percent_complete(), detail.summary)),
        ("health", health_label(detail.health).to_string()),
        ("team", format!("{} <{}>", p.team_name, p.team_email)),
        ("start", opt(p.start_date)),
        ("target", opt(p.target_completion)),
        ("catalog", p.catalog_version.clone()),
    ]);

    let today = Utc::now().date_naive();
    for view in &detail.phases {
        let ph = &view.phase;
        println!(
            "\nPhase {}: {} [{}] {} .. {}",
            ph.phase_number,
            ph.name,
            ph.status(),
            opt(ph.target_start),
            opt(ph.target_end)
        );
        if ph.target_end.is_some_and(|end| end < today) && ph.completed_at.is_none() {
            println!("  (past target end)");
        }
        let rows = view
            .tasks
            .iter()
            .map(|t| {
                vec![
                    t.id.to_string(),
                    t.key.clone(),
                    t.status().to_string(),
                    t.ownership.clone(),
                    t.name.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "KEY", "STATUS", "OWNER", "NAME"], rows);
    }

    if !detail.outputs.is_empty() {
        println!("\nOutputs:");
        for o in &detail.outputs {
            println!("  {} = {}", o.key, o.value);
        }
    }
}
