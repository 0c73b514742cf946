mod cmd;
mod output;
mod prompt;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlrig",
    about = "Database deployment orchestration: run named build actions against a target database",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from sqlrig.yaml or .git/)
    #[arg(long, global = true, env = "SQLRIG_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true, short = 'y')]
    yes: bool,

    /// Log debug output
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize sqlrig in the current project
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List the available actions
    ListActions,

    /// Run an action
    Run {
        /// Action name
        action: String,

        /// Extra arguments passed to the action
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Validate or show the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Any other subcommand runs the action of the same name
    #[command(external_subcommand)]
    Action(Vec<String>),
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Run { .. } | Commands::Action(_) => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::ListActions => cmd::list::run(&root, cli.json),
        Commands::Run { action, args } => cmd::run::run(&root, &action, &args, cli.yes, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Action(words) => match words.split_first() {
            Some((action, args)) => cmd::run::run(&root, action, args, cli.yes, cli.json),
            None => Err(anyhow::anyhow!("no action given")),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
