mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{output::OutputSubcommand, project::ProjectSubcommand, task::TaskSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "onboard",
    about = "Application onboarding portal: projects, phases, tasks and their outputs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Portal root (default: auto-detect from .onboard/)
    #[arg(long, global = true, env = "ONBOARD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Who is acting (defaults to `default_author` from config)
    #[arg(long, global = true, env = "ONBOARD_AUTHOR")]
    author: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the portal in the current directory
    Init {
        /// Portal name recorded in config (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the phase and task catalog
    Catalog {
        /// Show the tasks of one phase
        #[arg(long)]
        phase: Option<u8>,
    },

    /// Create, inspect and manage onboarding projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Move tasks through their lifecycle
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Read and write project outputs
    Output {
        #[command(subcommand)]
        subcommand: OutputSubcommand,
    },

    /// Resolve the URL of a task action
    Link { action_id: u64 },

    /// Serve the JSON HTTP API
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Open a browser once listening
        #[arg(long)]
        open: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let author = cli.author.as_deref();

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref(), cli.json),
        Commands::Catalog { phase } => cmd::catalog::run(&root, phase, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, author, cli.json),
        Commands::Output { subcommand } => cmd::output::run(&root, subcommand, cli.json),
        Commands::Link { action_id } => cmd::link::run(&root, action_id, cli.json),
        Commands::Serve { port, open } => cmd::serve::run(&root, port, open),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
