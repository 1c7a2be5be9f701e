mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use sitedash_core::config::DashboardConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sitedash",
    about = "Build the school website and promote builds to preview or production",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (environment variables override it)
    #[arg(long, global = true, env = "SITEDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
        /// Open a browser once listening
        #[arg(long)]
        open: bool,
    },

    /// List recent builds, newest first
    Builds {
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Only builds started by this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Rebuild the site now, in the foreground
    Build {
        /// Description stored with the record
        #[arg(long, short = 'm', default_value = "rebuild")]
        message: String,
        #[arg(long, env = "SITEDASH_USER", default_value = "cli")]
        user: String,
        /// Link the build was started from, kept in the audit log
        #[arg(long)]
        source: Option<String>,
    },

    /// Publish a build to a slot
    Deploy {
        /// Build id
        id: u64,
        /// preview or production
        #[arg(long, default_value = "preview")]
        slot: String,
        /// Deploy password (production only)
        #[arg(long)]
        password: Option<String>,
        #[arg(long, env = "SITEDASH_USER", default_value = "cli")]
        user: String,
    },

    /// Delete artifacts beyond the retention count
    Prune {
        /// Artifacts to keep (default: configured retention)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Show the audit log, newest first
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Inspect, validate or create the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Build { .. } | Commands::Deploy { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Config {
            subcommand: ConfigSubcommand::Init { force },
        } => cmd::config::init(cli.config.as_deref(), force),
        command => settings::load_config(cli.config.as_deref())
            .and_then(|config| dispatch(config, command, cli.json)),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn dispatch(config: DashboardConfig, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Serve { port, open } => cmd::serve::run(config, port, open),
        Commands::Builds { limit, user } => {
            cmd::builds::list(&config, limit, user.as_deref(), json)
        }
        Commands::Build {
            message,
            user,
            source,
        } => cmd::builds::build(&config, message, user, source, json),
        Commands::Deploy {
            id,
            slot,
            password,
            user,
        } => cmd::deploy::run(&config, id, &slot, password.as_deref(), &user, json),
        Commands::Prune { keep } => cmd::prune::run(&config, keep, json),
        Commands::Audit { limit } => cmd::audit::run(&config, limit, json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, json),
    }
}
