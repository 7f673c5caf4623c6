use anyhow::Result;
use clap::{Parser, Subcommand};
use siteops_config::SiteConfig;
use std::path::Path;
use tracing::error;

mod commands;

/// siteops - build, run and deploy the site
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the site and the server binary
    Build {
        /// Run the server test suite after the build stages
        #[arg(long)]
        test: bool,

        /// Remove prior build artifacts before building
        #[arg(long)]
        clean: bool,
    },
    /// Build, then supervise the site watcher and the server
    Dev {
        /// Run only the site watcher
        #[arg(long)]
        jekyll_only: bool,

        /// Run only the server
        #[arg(long)]
        vapor_only: bool,
    },
    /// Build the container image and bring the deployment up
    Deploy {
        /// Deploy with ENVIRONMENT=production
        #[arg(long)]
        production: bool,

        /// Image tag to build and deploy
        #[arg(long, default_value = "latest")]
        tag: String,

        /// Show container state and recent logs instead of deploying
        #[arg(long)]
        status: bool,

        /// Tear the deployment down instead of deploying
        #[arg(long)]
        stop: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    initialize_logging(cli.debug);

    let result = run(cli).await;
    if let Err(e) = result {
        // One line per failure; the category is carried by the error itself.
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Build { test, clean } => commands::build::run(&config, test, clean).await,
        Command::Dev {
            jekyll_only,
            vapor_only,
        } => commands::dev::run(&config, jekyll_only, vapor_only).await,
        Command::Deploy {
            production,
            tag,
            status,
            stop,
        } => commands::deploy::run(&config, production, &tag, status, stop).await,
    }
}

/// An explicit --config path must exist; otherwise `siteops.yaml` is picked
/// up when present and built-in defaults apply when it is not.
fn load_config(path: Option<&str>) -> Result<SiteConfig> {
    match path {
        Some(p) => SiteConfig::load_from_file(p),
        None => {
            let default = Path::new("siteops.yaml");
            if default.exists() {
                SiteConfig::load_from_file(default)
            } else {
                Ok(SiteConfig::default())
            }
        }
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}
