//! robo-console binary entry point.
//!
//! Runs a stand-in host process: a shared namespace, a heartbeat task that
//! keeps updating it, and the console server, until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use robo_console::{cli, config::Config, logging, server, NamespaceEvaluator, SharedContext};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Bound on blocking evaluator threads still running at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'robo-console --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_filter(config.log_filter()).ok();
    info!("robo-console v{}", env!("CARGO_PKG_VERSION"));

    let console_config = match config.to_console_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(console_config));
    // A timed-out evaluation may still occupy a blocking thread.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "console server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(console_config: robo_console::ConsoleConfig) -> robo_console::Result<()> {
    let context = SharedContext::new();
    context.set("pid", std::process::id());
    context.set("version", env!("CARGO_PKG_VERSION"));
    context.set("ticks", 0);

    let stop = CancellationToken::new();
    let heartbeat = tokio::spawn(heartbeat(context.clone(), stop.clone()));

    let console = server::start(
        console_config,
        context.clone(),
        Arc::new(NamespaceEvaluator::new()),
    )
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    let result = console.shutdown().await;
    stop.cancel();
    let _ = heartbeat.await;

    info!(ticks = %context.get("ticks").unwrap_or(json!(0)), "host stopped");
    result
}

/// Stand-in for the control loop: mutates the namespace alongside the
/// console sessions.
async fn heartbeat(context: SharedContext, stop: CancellationToken) {
    let mut interval = tokio::time::interval(HEARTBEAT_PERIOD);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                context.update("ticks", |v| *v = json!(v.as_u64().unwrap_or(0) + 1));
            }
        }
    }
}
