//! Larder operator CLI
//!
//! Applies and inspects schema migrations and runs the availability sweep,
//! once or on an interval, optionally serving `/metrics` while it works.

use anyhow::Context;
use clap::{Parser, Subcommand};
use larder::migration::{MigrationStatus, Migrator};
use larder::{Larder, LarderConfig};
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Fridge slot reservation maintenance tool")]
#[command(version)]
struct Cli {
    /// Overrides `database.url` from config/config.toml and LARDER__DATABASE__URL
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Serve Prometheus metrics on `metrics.listen_addr` while the command runs
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate,

    /// Show applied and pending migrations
    Status,

    /// Roll back applied migrations, newest first
    Rollback {
        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// Bring slot availability back in line with bookings
    Sweep {
        /// Keep sweeping every `reservations.sweep_interval_seconds`
        #[arg(long)]
        watch: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = LarderConfig::load().context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    #[cfg(feature = "metrics")]
    if cli.metrics {
        metrics_endpoint::start(&config.metrics.listen_addr)?;
    }

    let larder = Larder::connect(config).context("connecting to the database")?;

    match cli.command {
        Commands::Migrate => {
            let applied = larder.migrate()?;
            log::info!("applied {applied} migration(s)");
        }
        Commands::Status => print_status(&larder.migration_status()?),
        Commands::Rollback { steps } => {
            let connection = larder.pool().acquire()?;
            let rolled_back = Migrator::larder().down(&*connection, Some(steps), None)?;
            log::info!("rolled back {rolled_back} migration(s)");
        }
        Commands::Sweep { watch: false } => {
            let report = larder.sweep()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Sweep { watch: true } => watch(larder)?,
    }
    Ok(())
}

/// Sweep on a coroutine every `sweep_interval_seconds` until the process is stopped.
fn watch(larder: Larder) -> anyhow::Result<()> {
    let interval = Duration::from_secs(larder.config().reservations.sweep_interval_seconds.max(1));
    log::info!("sweeping every {}s", interval.as_secs());
    let sweeper = may::go!(move || loop {
        // A failed pass is logged and retried on the next tick
        if let Err(e) = larder.sweep() {
            log::error!("sweep failed: {e}");
        }
        may::coroutine::sleep(interval);
    });
    sweeper
        .join()
        .map_err(|_| anyhow::anyhow!("sweep coroutine panicked"))
}

fn print_status(status: &MigrationStatus) {
    println!("Applied ({}):", status.applied.len());
    for record in &status.applied {
        let took = record
            .execution_time_ms
            .map_or_else(|| "n/a".to_string(), |ms| format!("{ms}ms"));
        println!(
            "  {} {} ({}, {took})",
            record.version,
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("Pending ({}):", status.pending.len());
    for pending in &status.pending {
        println!("  {} {}", pending.version, pending.name);
    }
}

#[cfg(feature = "metrics")]
mod metrics_endpoint {
    use anyhow::anyhow;
    use may_minihttp::{HttpServer, HttpService, Request, Response};
    use prometheus::Encoder;
    use std::io;

    #[derive(Clone)]
    struct MetricsService;

    impl HttpService for MetricsService {
        fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
            if req.path() != "/metrics" {
                res.status_code(404, "Not Found");
                return Ok(());
            }
            let encoder = prometheus::TextEncoder::new();
            let mut buffer = Vec::new();
            encoder
                .encode(&prometheus::gather(), &mut buffer)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            res.header("Content-Type: text/plain; version=0.0.4");
            res.body_vec(buffer);
            Ok(())
        }
    }

    /// Serve `/metrics` from a background coroutine server.
    pub fn start(listen_addr: &str) -> anyhow::Result<()> {
        // Register the instruments before the first scrape
        once_cell::sync::Lazy::force(&larder::metrics::METRICS);
        HttpServer(MetricsService)
            .start(listen_addr)
            .map_err(|e| anyhow!("failed to start metrics server on {listen_addr}: {e}"))?;
        log::info!("metrics at http://{listen_addr}/metrics");
        Ok(())
    }
}
