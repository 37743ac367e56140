mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, TaskArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "conductor",
    about = "Run, retry and schedule MAA sessions against an Android emulator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .conductor/)
    #[arg(long, global = true, env = "CONDUCTOR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .conductor/config.yaml in the project root
    Init {
        /// MAA installation directory to record as engine.path
        #[arg(long)]
        engine: Option<PathBuf>,
    },

    /// Execute one run: stage the config, launch MAA, retry, restore
    Run {
        /// Run a profile from config.yaml
        #[arg(long, conflicts_with_all = ["tasks", "params"])]
        profile: Option<String>,

        #[command(flatten)]
        tasks: TaskArgs,

        /// ADB address to connect to (overrides the profile)
        #[arg(long)]
        address: Option<String>,

        /// Configured emulator to check and start before launching
        #[arg(long)]
        emulator: Option<String>,
    },

    /// Print the task configuration and engine task queue without running
    Build {
        /// Build a profile from config.yaml
        #[arg(long, conflicts_with_all = ["tasks", "params"])]
        profile: Option<String>,

        #[command(flatten)]
        tasks: TaskArgs,
    },

    /// Fire scheduled profiles until interrupted
    Schedule {
        /// List schedule entries instead of running the loop
        #[arg(long)]
        list: bool,
    },

    /// Find an online adb device address
    Discover,

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match (&cli.command, cli.verbose) {
        (_, 1) => tracing::Level::DEBUG,
        (_, v) if v > 1 => tracing::Level::TRACE,
        (Commands::Run { .. } | Commands::Schedule { list: false }, _) => tracing::Level::INFO,
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

    let result = match cli.command {
        Commands::Init { engine } => cmd::init::run(&root, engine.as_deref()),
        Commands::Run {
            profile,
            tasks,
            address,
            emulator,
        } => {
            let target = cmd::Target::new(profile, tasks);
            cmd::run::run(&root, target, address, emulator, cli.json)
        }
        Commands::Build { profile, tasks } => {
            cmd::build::run(&root, cmd::Target::new(profile, tasks), cli.json)
        }
        Commands::Schedule { list } => cmd::schedule::run(&root, list, cli.json),
        Commands::Discover => cmd::discover::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
