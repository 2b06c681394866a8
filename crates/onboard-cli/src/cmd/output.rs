use crate::output::{opt, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use onboard_core::output::ExportFormat;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum OutputSubcommand {
    /// Set an output value (last write wins)
    Set {
        project: u64,
        key: String,
        value: String,
        /// Phase that produced the value
        #[arg(long)]
        phase: Option<u8>,
    },
    /// Print one output value
    Get { project: u64, key: String },
    /// List outputs, most recent first
    List { project: u64 },
    /// Export all outputs as a JSON or YAML document
    Export {
        project: u64,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcmd: OutputSubcommand, json: bool) -> anyhow::Result<()> {
    let portal = super::open(root)?;
    match subcmd {
        OutputSubcommand::Set {
            project,
            key,
            value,
            phase,
        } => {
            let out = portal.set_output(project, &key, &value, phase)?;
            if json {
                return print_json(&out);
            }
            println!("{} = {}", out.key, out.value);
            Ok(())
        }
        OutputSubcommand::Get { project, key } => {
            let out = portal
                .get_output(project, &key)?
                .with_context(|| format!("output '{key}' is not set on project {project}"))?;
            if json {
                return print_json(&out);
            }
            println!("{}", out.value);
            Ok(())
        }
        OutputSubcommand::List { project } => {
            let outputs = portal.get_outputs(project)?;
            if json {
                return print_json(&outputs);
            }
            if outputs.is_empty() {
                println!("No outputs recorded.");
                return Ok(());
            }
            let rows = outputs
                .iter()
                .map(|o| {
                    vec![
                        o.key.clone(),
                        o.value.clone(),
                        opt(o.phase_number),
                        o.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            print_table(&["KEY", "VALUE", "PHASE", "UPDATED"], rows);
            Ok(())
        }
        OutputSubcommand::Export {
            project,
            format,
            out,
        } => {
            let export = portal.export_outputs(project)?;
            let body = export.render(format)?;
            match out {
                Some(path) => {
                    onboard_core::io::atomic_write(&path, body.as_bytes())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Wrote {} outputs to {}", export.outputs.len(), path.display());
                }
                None => println!("{}", body.trim_end()),
            }
            Ok(())
        }
    }
}
