//! CLI surface for operators (spec §6): `rotation`, `gating`,
//! `universe`, `worker`, `status`. Grounded on `Zuytan-rustrade`'s
//! `src/bin/benchmark.rs` (`clap` `#[derive(Parser, Subcommand)]`
//! style); the teacher itself ships no CLI binary, so this augments
//! the teacher's stack with `clap`, already a direct dependency of two
//! of the five example repos.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use marketgps_core::config::Config;
use marketgps_core::core::{Core, JobResult};
use marketgps_core::domain::job::{JobMode, JobStatus};
use marketgps_core::domain::scope::MarketScope;
use marketgps_core::logging::{self, LoggingConfig};

#[derive(Parser)]
#[command(name = "marketgps", about = "Multi-market asset scoring pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one rotation pass for a scope (bar refresh + gating + scoring + publish).
    Rotation {
        #[arg(long)]
        scope: MarketScope,
        #[arg(long, default_value = "daily_full")]
        mode: JobMode,
        #[arg(long, value_delimiter = ',')]
        asset_ids: Option<Vec<String>>,
    },
    /// Run a gating-only pass for a scope.
    Gating {
        #[arg(long)]
        scope: MarketScope,
        #[arg(long, default_value = "daily_full")]
        mode: JobMode,
        #[arg(long, value_delimiter = ',')]
        asset_ids: Option<Vec<String>>,
    },
    /// Rebuild the universe for a scope from the provider's list-symbols + bulk-EOD,
    /// or from a CSV fixture with `--from-csv`.
    Universe {
        #[arg(long)]
        scope: MarketScope,
        #[arg(long)]
        from_csv: Option<PathBuf>,
    },
    /// Drain the persistent job queue, optionally restricted to one scope.
    Worker {
        #[arg(long)]
        scope: Option<MarketScope>,
        #[arg(long, default_value_t = 10)]
        max_jobs: i64,
    },
    /// Print recent job runs.
    Status {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn print_job_result(job: &str, result: &JobResult) {
    info!(
        job,
        run_id = %result.run_id,
        status = result.status.as_str(),
        processed = result.processed,
        success = result.success,
        failed = result.failed,
        duration_s = result.duration_s,
        "{job} finished"
    );
    if let Some(err) = &result.error {
        error!(job, error = %err, "run-level failure");
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = logging::init_logging(LoggingConfig::from_env()) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let core = match Core::new(config).await {
        Ok(core) => core,
        Err(e) => {
            error!(error = %e, "failed to initialize core");
            std::process::exit(1);
        }
    };

    let exit_code = run(&core, cli.command).await;
    std::process::exit(exit_code);
}

async fn run(core: &Core, command: Command) -> i32 {
    match command {
        Command::Rotation { scope, mode, asset_ids } => {
            let result = core.run_rotation(scope, mode, asset_ids).await;
            print_job_result("rotation", &result);
            exit_code_for(&result)
        }
        Command::Gating { scope, mode, asset_ids } => {
            let result = core.run_gating(scope, mode, asset_ids).await;
            print_job_result("gating", &result);
            exit_code_for(&result)
        }
        Command::Universe { scope, from_csv } => match from_csv {
            Some(path) => match core.rebuild_universe_from_csv(scope, &path).await {
                Ok(report) => {
                    info!(scope = %scope, ?report, "universe rebuilt from csv");
                    0
                }
                Err(e) => {
                    error!(scope = %scope, error = %e, "universe rebuild from csv failed");
                    1
                }
            },
            None => match core.rebuild_universe(scope).await {
                Ok(report) => {
                    info!(scope = %scope, ?report, "universe rebuilt");
                    0
                }
                Err(e) => {
                    error!(scope = %scope, error = %e, "universe rebuild failed");
                    1
                }
            },
        },
        Command::Worker { scope, max_jobs } => {
            info!(?scope, max_jobs, "worker: draining job queue until interrupted (ctrl-c)");
            let mut shutdown = Box::pin(tokio::signal::ctrl_c());
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("worker: shutdown signal received");
                        return 0;
                    }
                    result = core.drain_queue_once(scope, max_jobs) => {
                        match result {
                            Ok(0) => tokio::time::sleep(std::time::Duration::from_secs(2)).await,
                            Ok(n) => info!(claimed = n, "worker: drained queue items"),
                            Err(e) => {
                                error!(error = %e, "worker: tick failed");
                                return 1;
                            }
                        }
                    }
                }
            }
        }
        Command::Status { limit } => match core.recent_jobs(limit).await {
            Ok(runs) => {
                for run in &runs {
                    info!(
                        run_id = %run.run_id,
                        scope = %run.market_scope,
                        job_type = %run.job_type,
                        mode = %run.mode,
                        status = %run.status,
                        processed = run.assets_processed,
                        success = run.assets_success,
                        failed = run.assets_failed,
                        "job run"
                    );
                }
                if runs.iter().any(|r| r.status() == JobStatus::Failed) {
                    1
                } else {
                    0
                }
            }
            Err(e) => {
                error!(error = %e, "failed to fetch recent jobs");
                1
            }
        },
    }
}

fn exit_code_for(result: &JobResult) -> i32 {
    if result.error.is_some() || result.failed > 0 {
        1
    } else {
        0
    }
}
