//! `ledgerbridge` command line: inspect and call the service tree.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use ledgerbridge_core::{ServiceError, ServiceParams, ServicePath, ServiceResult};
use ledgerbridge_server::service::{build_service_tree, DispatchConfig, Dispatcher};
use ledgerbridge_server::storage::{
    DataStoreConfig, DataStoreRegistry, MaintenanceWorker, StoreSweeper, WorkerConfig,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Inspect and call the LedgerBridge service tree
#[derive(Parser)]
#[command(name = "ledgerbridge")]
#[command(about = "ledgerbridge - dispatch calls into the service tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, env = "LEDGERBRIDGE_LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArgs {
    /// Deadline per call in milliseconds
    #[arg(long, env = "LEDGERBRIDGE_TIMEOUT_MS", default_value_t = 30_000, global = true)]
    timeout_ms: u64,

    /// Interval between store sweeps in milliseconds
    #[arg(long, env = "LEDGERBRIDGE_SWEEP_INTERVAL_MS", default_value_t = 60_000, global = true)]
    sweep_interval_ms: u64,

    /// Artifact store slot count
    #[arg(long, env = "LEDGERBRIDGE_ARTIFACT_MAX_LENGTH", default_value_t = 10, global = true)]
    artifact_max_length: usize,

    /// Artifact store weight per slot, in bytes
    #[arg(
        long,
        env = "LEDGERBRIDGE_ARTIFACT_MAX_SIZE",
        default_value_t = 10_000_000,
        global = true
    )]
    artifact_max_size: u64,

    /// Artifact store turnover period in seconds
    #[arg(
        long,
        env = "LEDGERBRIDGE_ARTIFACT_MAX_DURATION_SECS",
        default_value_t = 6_000,
        global = true
    )]
    artifact_max_duration_secs: u64,
}

impl From<&ConfigArgs> for DispatchConfig {
    fn from(args: &ConfigArgs) -> Self {
        Self {
            default_timeout_ms: args.timeout_ms,
            sweep_interval_ms: args.sweep_interval_ms,
            artifact_store: DataStoreConfig {
                max_length: args.artifact_max_length,
                max_size: args.artifact_max_size,
                max_duration: Duration::from_secs(args.artifact_max_duration_secs),
            },
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List every addressable path
    Routes,

    /// Describe the node at a path (the whole tree when omitted)
    Info {
        /// Route (`/g/s/op`) or dotted (`g.s.op`) path
        path: Option<String>,
    },

    /// Invoke the node at a path
    Call {
        /// Route (`/g/s/op`) or dotted (`g.s.op`) path
        path: String,

        /// Parameter document: `{"parameters": [...], "parameterskv": {...}}`
        #[arg(short, long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Read one JSON request per line from stdin, answer on stdout
    Serve,
}

/// One line of `serve` input.
#[derive(Debug, Deserialize)]
struct LineRequest {
    path: String,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    describe: bool,
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print(result: &ServiceResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

async fn handle_line(dispatcher: &Dispatcher, line: &str) -> ServiceResult {
    let request: LineRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return ServiceResult::from_error(&ServiceError::param(format!(
                "could not decode request line: {err}"
            )))
        }
    };
    let path = ServicePath::parse(&request.path);
    if request.describe {
        return dispatcher.describe(&path).await;
    }
    let params = request.params.unwrap_or_else(|| Value::Object(Map::new()));
    match ServiceParams::from_value(params) {
        Ok(params) => dispatcher.call(&path, params).await,
        Err(err) => ServiceResult::from_error(&err),
    }
}

async fn serve(
    dispatcher: &Dispatcher,
    registry: Arc<DataStoreRegistry>,
    config: &DispatchConfig,
) -> anyhow::Result<()> {
    let mut sweeper = MaintenanceWorker::spawn(
        StoreSweeper::new(registry),
        WorkerConfig::every(Duration::from_millis(config.sweep_interval_ms)),
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!(routes = dispatcher.routes().len(), "serving requests from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let result = handle_line(dispatcher, &line).await;
                let mut encoded = serde_json::to_vec(&result)?;
                encoded.push(b'\n');
                stdout.write_all(&encoded).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    sweeper.stop().await;
    let stats = dispatcher.stats();
    tracing::info!(
        requests = stats.requests(),
        ok = stats.ok,
        total_ms = stats.total_ms,
        "dispatcher stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = DispatchConfig::from(&cli.config);
    let registry = Arc::new(DataStoreRegistry::new());
    let root = Arc::new(build_service_tree(&registry, &config));
    let dispatcher = Dispatcher::new(root, &config);

    match cli.command {
        Command::Routes => {
            for route in dispatcher.routes() {
                println!("{route}");
            }
        }
        Command::Info { path } => {
            let path = path.as_deref().map(ServicePath::parse).unwrap_or_default();
            print(&dispatcher.describe(&path).await)?;
        }
        Command::Call { path, params } => {
            let result = dispatcher
                .call_json(&ServicePath::parse(&path), params.as_deref().unwrap_or_default())
                .await;
            print(&result)?;
            if result.is_err() {
                std::process::exit(1);
            }
        }
        Command::Serve => serve(&dispatcher, registry.clone(), &config).await?,
    }

    registry.clear();
    Ok(())
}
