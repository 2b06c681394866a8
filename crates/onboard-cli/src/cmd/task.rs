use crate::output::{opt, print_fields, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use onboard_core::log::LogEntry;
use super::{variance_label, DeadlineArgs};
use onboard_core::portal::{TaskChange, TaskDetail};
use onboard_core::task::TaskFilter;
use onboard_core::types::{LogType, TaskStatus};
use std::path::Path;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List tasks across projects
    List {
        /// Only tasks of this project id
        #[arg(long)]
        project: Option<u64>,
        /// Only tasks of this phase number
        #[arg(long)]
        phase: Option<u8>,
        /// pending, blocked, in_progress or completed
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Owning team, e.g. "App Team"
        #[arg(long)]
        ownership: Option<String>,
    },
    /// Show a task with its checklist, links and log
    Show { id: u64 },
    /// Start a task whose prerequisites are complete
    Start { id: u64 },
    /// Complete an in-progress task
    Complete { id: u64 },
    /// Reopen a completed task
    Reopen {
        id: u64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Tick (or untick) a validation checklist item
    Check {
        id: u64,
        /// 1-based item number as shown by `task show`
        item: usize,
        /// Clear the item instead of ticking it
        #[arg(long)]
        uncheck: bool,
    },
    /// Append a note to the task's execution log
    Note {
        id: u64,
        #[arg(required = true)]
        text: Vec<String>,
        /// note, output or error
        #[arg(long, default_value = "note")]
        kind: LogType,
    },
    /// Record an output value produced by this task
    Output { id: u64, key: String, value: String },
    /// Set the task's agreed and actual dates
    Deadline {
        id: u64,
        #[command(flatten)]
        dates: DeadlineArgs,
    },
}

pub fn run(
    root: &Path,
    subcmd: TaskSubcommand,
    author: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let portal = super::open(root)?;
    match subcmd {
        TaskSubcommand::List {
            project,
            phase,
            status,
            ownership,
        } => {
            let filter = TaskFilter {
                project_id: project,
                phase,
                status,
                ownership,
            };
            let tasks = portal.list_tasks(&filter)?;
            if json {
                return print_json(&tasks);
            }
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            let rows = tasks
                .iter()
                .map(|l| {
                    vec![
                        l.task.id.to_string(),
                        l.project_name.clone(),
                        l.task.phase_number.to_string(),
                        l.task.key.clone(),
                        l.task.status().to_string(),
                        l.task.ownership.clone(),
                    ]
                })
                .collect();
            print_table(&["ID", "PROJECT", "PHASE", "KEY", "STATUS", "OWNER"], rows);
            Ok(())
        }
        TaskSubcommand::Show { id } => {
            let detail = portal.task_detail(id)?;
            if json {
                return print_json(&detail);
            }
            show(&detail);
            Ok(())
        }
        TaskSubcommand::Start { id } => {
            let change = portal.start_task(id)?;
            report(&change, "Started", json)
        }
        TaskSubcommand::Complete { id } => {
            let change = portal
                .complete_task(id, author)
                .with_context(|| format!("cannot complete task {id}"))?;
            report(&change, "Completed", json)
        }
        TaskSubcommand::Reopen { id, reason } => {
            let change = portal.reopen_task(id, author, reason.as_deref())?;
            report(&change, "Reopened", json)
        }
        TaskSubcommand::Check { id, item, uncheck } => {
            let index = item
                .checked_sub(1)
                .context("checklist items are numbered from 1")?;
            let change = portal.check_item(id, index, !uncheck)?;
            if json {
                return print_json(&change);
            }
            let t = &change.task;
            let done = t.checklist.iter().filter(|i| i.checked).count();
            println!(
                "[{}] {}: checklist {done}/{}",
                t.id,
                t.key,
                t.checklist.len()
            );
            Ok(())
        }
        TaskSubcommand::Note { id, text, kind } => {
            let entry = LogEntry {
                log_type: kind,
                note: text.join(" "),
                payload: None,
            };
            let log = portal.record_log(id, entry, author)?;
            if json {
                return print_json(&log);
            }
            println!("Logged {} on task {id} by {}", log.log_type, log.author);
            Ok(())
        }
        TaskSubcommand::Output { id, key, value } => {
            let out = portal.record_output(id, &key, &value, author)?;
            if json {
                return print_json(&out);
            }
            println!("{} = {} (phase {})", out.key, out.value, opt(out.phase_number));
            Ok(())
        }
        TaskSubcommand::Deadline { id, dates } => {
            let d = portal.set_task_deadline(id, dates.into())?;
            if json {
                return print_json(&d);
            }
            println!(
                "Task {} deadline: agreed {}, actual {}, variance {}",
                d.task_key,
                opt(d.dates.agreed_date),
                opt(d.dates.actual_date),
                variance_label(d.variance_days)
            );
            Ok(())
        }
    }
}

fn report(change: &TaskChange, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(change);
    }
    let t = &change.task;
    println!("{verb} task [{}] {}: {}", t.id, t.key, t.status());
    if !change.affected.is_empty() {
        let ids: Vec<String> = change.affected.iter().map(u64::to_string).collect();
        println!("  also changed: {}", ids.join(", "));
    }
    println!(
        "  phase {} is {}; project is {} ({:.1}%)",
        t.phase_number, change.phase_status, change.project_status, change.percent_complete
    );
    Ok(())
}

fn show(detail: &TaskDetail) {
    let t = &detail.task;
    print_fields(&[
        ("task", format!("{} ({})", t.name, t.id)),
        ("key", t.key.clone()),
        ("phase", t.phase_number.to_string()),
        ("status", t.status().to_string()),
        ("owner", t.ownership.clone()),
        ("category", t.category.clone()),
        ("prerequisites", t.prerequisites.join(", ")),
        ("unmet", detail.unmet_prerequisites.join(", ")),
        ("outputs", t.expected_outputs.join(", ")),
        ("completed by", opt(t.completed_by.as_deref())),
    ]);
    if !t.description.is_empty() {
        println!("\n{}", t.description);
    }
    if let Some(cmd) = &detail.rendered_command {
        println!("\nCommand:\n  {}", cmd.text);
        if !cmd.unresolved.is_empty() {
            println!("  (unresolved: {})", cmd.unresolved.join(", "));
        }
    }
    if !t.checklist.is_empty() {
        println!("\nChecklist:");
        for (i, item) in t.checklist.iter().enumerate() {
            let mark = if item.checked { "x" } else { " " };
            println!("  {}. [{mark}] {}", i + 1, item.text);
        }
    }
    if !detail.actions.is_empty() {
        println!("\nActions:");
        let rows = detail
            .actions
            .iter()
            .map(|a| {
                vec![
                    a.action_id.to_string(),
                    a.action_type.to_string(),
                    a.label.clone(),
                    a.url.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "TYPE", "LABEL", "URL"], rows);
    }
    if !detail.logs.is_empty() {
        println!("\nLog:");
        for l in &detail.logs {
            println!(
                "  {} {} [{}] {}",
                l.created_at.format("%Y-%m-%d %H:%M"),
                l.author,
                l.log_type,
                l.note
            );
        }
    }
}
