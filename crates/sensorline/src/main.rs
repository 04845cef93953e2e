mod client;
mod output;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensorline_core::config::Config;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::time::{now_ms, parse_duration_str};
use sensorline_ingest::http::{HttpState, serve};
use sensorline_ingest::{IngestionConfig, IngestionHandle, IngestionLoop, LiveHub, RandomSource};
use sensorline_live::{LiveMergeWindow, WindowCommand, WindowSession, WindowView};
use sensorline_store::{DuckDbBackend, RangeQueryService, SeriesStore};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::client::ApiClient;
use crate::output::{
    print_current_human, print_series_human, print_status_human, print_view_human,
};
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "sensorline")]
#[command(about = "Sample, store and live-chart sensor series")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Address of a running `sensorline run`")]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the sampler, store and HTTP API")]
    Run {
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long = "sample", help = "Entity to sample in the background (repeatable)")]
        sample: Vec<String>,
    },
    #[command(about = "Fetch stored points for a time window")]
    Series {
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = "6h")]
        since: String,
        #[arg(long, default_value = "0s")]
        until: String,
    },
    #[command(about = "Take one reading now, store and publish it")]
    Current {
        #[arg(long)]
        key: Option<String>,
    },
    #[command(about = "Follow a live window: history plus streamed samples")]
    Watch {
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = "1h")]
        range: String,
    },
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            db_path,
            http_addr,
            sample,
        } => run_server(db_path, http_addr, sample).await,
        Commands::Series { key, since, until } => {
            init_cli_tracing();
            let client = ApiClient::new(&resolve_addr(cli.addr));
            let resp = client.series(key.as_deref(), &since, &until).await?;
            print_output(&resp, cli.json, print_series_human)
        }
        Commands::Current { key } => {
            init_cli_tracing();
            let client = ApiClient::new(&resolve_addr(cli.addr));
            let reading = client.current(key.as_deref()).await?;
            print_output(&reading, cli.json, print_current_human)
        }
        Commands::Watch { key, range } => {
            init_cli_tracing();
            let client = ApiClient::new(&resolve_addr(cli.addr));
            run_watch(client, key, &range, cli.json).await
        }
        Commands::Status => {
            init_cli_tracing();
            let client = ApiClient::new(&resolve_addr(cli.addr));
            let status = client.status().await?;
            print_output(&status, cli.json, print_status_human)
        }
    }
}

fn resolve_addr(addr: Option<String>) -> String {
    addr.or_else(|| std::env::var("SENSORLINE_HTTP_ADDR").ok())
        .unwrap_or_else(|| Config::default().http_addr)
}

fn print_output<T: Serialize>(value: &T, json: bool, human: fn(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

async fn run_server(
    db_path: Option<PathBuf>,
    http_addr: Option<String>,
    sample: Vec<String>,
) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = db_path {
        cfg.db_path = v;
    }
    if let Some(v) = http_addr {
        cfg.http_addr = v;
    }
    if !sample.is_empty() {
        cfg.sample_entities = sample;
    }

    init_run_tracing();

    let backend = Arc::new(DuckDbBackend::open(&cfg.db_path)?);
    let store = SeriesStore::from_config(backend, &cfg);
    let ingestion = IngestionLoop::new(
        store.clone(),
        Arc::new(RandomSource::default()),
        LiveHub::new(cfg.broadcast_capacity),
        IngestionConfig::from(&cfg),
    );
    let queries = RangeQueryService::new(store.clone(), cfg.default_entity.clone());

    eprintln!("sensorline run");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  http: {}", cfg.http_addr);
    eprintln!(
        "  tick: {} (read timeout {})",
        humantime::format_duration(cfg.tick_interval),
        humantime::format_duration(cfg.read_timeout)
    );
    eprintln!("  retention: {}", humantime::format_duration(cfg.retention));
    if !cfg.sample_entities.is_empty() {
        eprintln!("  sampling: {}", cfg.sample_entities.join(", "));
    }

    let handles = cfg
        .sample_entities
        .iter()
        .map(|entity| SeriesKey::parse(entity).map(|key| ingestion.spawn(key)))
        .collect::<Result<Vec<IngestionHandle>, _>>()?;

    let http_task = tokio::spawn(serve(
        HttpState {
            queries,
            ingestion: ingestion.clone(),
        },
        cfg.http_addr.parse().context("parse http addr")?,
    ));

    let retention_task = tokio::spawn({
        let store = store.clone();
        let every = cfg.retention_sweep_interval;
        async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match store.prune_expired(now_ms()) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "retention sweep"),
                    Err(err) => tracing::warn!(error = %err, "retention sweep failed"),
                }
            }
        }
    });

    let outcome = tokio::select! {
        res = http_task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::from(err).context("http server")),
            Err(err) => Err(anyhow::Error::from(err).context("http task")),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    };
    if let Err(err) = &outcome {
        tracing::error!(error = %format!("{err:#}"), "shutting down after failure");
    }

    for handle in handles {
        handle.stop().await;
    }
    retention_task.abort();
    shutdown_tracing();
    outcome
}

async fn run_watch(
    client: ApiClient,
    key: Option<String>,
    range: &str,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = Config::load().context("load config")?;
    let key = SeriesKey::parse(key.as_deref().unwrap_or(&cfg.default_entity))?;
    let range = parse_duration_str(range)?;

    let window = LiveMergeWindow::new(key, range, cfg.live_capacity);
    let session = WindowSession::new(window, Arc::new(client.clone()), Arc::new(client));
    let mut views = session.subscribe();
    let (commands, rx) = mpsc::channel(8);
    let session_task = tokio::spawn(session.run(rx));

    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_watch_input(&line) {
                Ok(Some(cmd)) => {
                    if commands.send(cmd).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => eprintln!("{err}"),
            }
        }
    });

    if !json {
        eprintln!("commands: <range e.g. 1h|6h|24h>, key <name>, r (refresh), ctrl-c to quit");
    }

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if json {
                    println!("{}", serde_json::to_string(&WatchLine::from(&view))?);
                } else {
                    print_view_human(&view);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    input_task.abort();
    session_task.abort();
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchLine<'a> {
    key: &'a SeriesKey,
    range_ms: i64,
    now_ms: i64,
    points: &'a [Sample],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a WindowView> for WatchLine<'a> {
    fn from(view: &'a WindowView) -> Self {
        Self {
            key: &view.key,
            range_ms: view.range_ms,
            now_ms: view.now_ms,
            points: &view.points,
            error: view.error.as_deref(),
        }
    }
}

fn parse_watch_input(line: &str) -> anyhow::Result<Option<WindowCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if matches!(line, "r" | "refresh") {
        return Ok(Some(WindowCommand::Refresh));
    }
    if let Some(rest) = line.strip_prefix("key ") {
        return Ok(Some(WindowCommand::SelectKey(SeriesKey::parse(rest)?)));
    }
    let range = parse_duration_str(line)
        .with_context(|| format!("unrecognized command `{line}`"))?;
    if range.is_zero() {
        anyhow::bail!("range must be positive");
    }
    Ok(Some(WindowCommand::SelectRange(range)))
}
