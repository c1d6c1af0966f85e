use clap::{Parser, Subcommand};
use dmt::cluster::HttpCluster;
use dmt::config::{Config, ConfigOverrides};
use dmt::context::Context;
use dmt::error::{AppError, Result, render_error_line};
use dmt::migration::{self, MigrationOutcome};
use dmt::prompt;
use dmt::repository::{MigrationRunRepository, establish_connection};
use dmt::services::MigrationService;
use dmt::stage::TerminalRenderer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BANNER: &str = concat!(
    "Data Migration Tool v",
    env!("CARGO_PKG_VERSION"),
    "\n\nSelected data structures in the source cluster will be migrated to the target cluster.\n"
);

#[derive(Parser)]
#[command(name = "dmt")]
#[command(author, version, about = "Start and watch data migrations between clusters")]
struct Cli {
    /// REST gateway of the migration cluster
    #[arg(long, global = true)]
    cluster_url: Option<String>,

    /// Local database recording started migrations
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the data migration
    Start {
        /// Directory holding the migration configuration
        config_dir: PathBuf,

        /// Start the migration without confirmation
        #[arg(long)]
        yes: bool,

        /// Output directory for the migration report
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Get status of the data migration in progress
    Status {
        /// Migration to watch; defaults to the latest unfinished one
        #[arg(long)]
        migration_id: Option<String>,

        /// Output directory for the migration report
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dmt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            println!("ERROR {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("Loaded config: {:?}", config);

    match run(cli.command, config).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", render_error_line(&err));
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load(ConfigOverrides {
        cluster_url: cli.cluster_url.clone(),
        database_url: cli.database_url.clone(),
    })
}

async fn run(command: Commands, config: Config) -> Result<Vec<String>> {
    match command {
        Commands::Start {
            config_dir,
            yes,
            output_dir,
            timeout,
        } => {
            println!();
            println!("{}", BANNER);
            if !yes {
                let stdin = std::io::stdin();
                let answer =
                    prompt::yes_no(&mut stdin.lock(), &mut std::io::stdout(), "Proceed?");
                if !matches!(answer, Ok(true)) {
                    return Err(AppError::UserCancelled);
                }
            }
            println!();

            let ctx = root_context(timeout);
            let service = build_service(&config).await?;
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let outcome = service
                .start(&ctx, &config_dir, &output_dir, &TerminalRenderer::new())
                .await?;
            finish(outcome, "OK Migration completed successfully.")
        }
        Commands::Status {
            migration_id,
            output_dir,
            timeout,
        } => {
            println!();
            println!("{}", BANNER);

            let ctx = root_context(timeout);
            let service = build_service(&config).await?;
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let outcome = service
                .status(&ctx, migration_id, &output_dir, &TerminalRenderer::new())
                .await?;
            finish(outcome, "OK")
        }
    }
}

/// Root context for a command; Ctrl-C cancels it.
fn root_context(timeout: Option<u64>) -> Context {
    let ctx = match timeout {
        Some(secs) => {
            Context::with_deadline(tokio::time::Instant::now() + Duration::from_secs(secs))
        }
        None => Context::new(),
    };
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling");
            interrupt.cancel();
        }
    });
    ctx
}

async fn build_service(config: &Config) -> Result<MigrationService> {
    if let Some(path) = config.database_url.strip_prefix("sqlite:") {
        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_pool = establish_connection(&config.database_url).await?;
    tracing::debug!("Database connected: {}", config.database_url);

    let cluster = HttpCluster::new(&config.cluster_url, config.request_timeout())?;
    Ok(MigrationService::new(
        Arc::new(cluster),
        MigrationRunRepository::new(db_pool),
    ))
}

/// Warnings are shown whenever finalizing succeeded, even if the migration
/// itself failed.
fn finish(outcome: MigrationOutcome, ok_line: &str) -> Result<Vec<String>> {
    if let Ok(summary) = &outcome.finalize {
        if let Some(path) = &summary.report_path {
            println!("Migration report saved to {}", path.display());
        }
        for line in migration::warning_lines(&summary.warnings, summary.report_path.as_deref()) {
            println!("{}", line);
        }
    }
    outcome.into_result()?;
    Ok(vec![String::new(), ok_line.to_string()])
}
