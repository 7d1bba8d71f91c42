//! Signal agent: run the decision engine over candle files
//!
//! Usage:
//!   signal-agent --asset EURUSD [--dir data] [--timeframe 1m]
//!   signal-agent --candles data/EURUSD.json data/GBPUSD.json [--top 3]
//!
//! Common options:
//!   --db <url>           SQLite trade journal (default: in-memory)
//!   --model <path>       Load a fitted model artifact
//!   --save-model <path>  Write the serving model after any retrain
//!   --retrain            Refit from the journal before analysing, if due
//!
//! Decisions are printed to stdout as JSON; logs go to stderr.

use std::path::Path;

use analysis_core::{Candle, Timeframe, TradeHistory};
use anyhow::{bail, Context, Result};
use decision_engine::{Analysis, EngineConfig, SignalEngine};
use trade_journal::{InMemoryTradeJournal, SqliteTradeJournal};
use win_probability::ModelArtifact;

mod feed;

use feed::FileCandleSource;

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Every value following `flag` up to the next `--option`.
fn arg_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .map(|i| {
            args[i + 1..]
                .iter()
                .take_while(|a| !a.starts_with("--"))
                .map(String::as_str)
                .collect()
        })
        .unwrap_or_default()
}

fn asset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| path.display().to_string())
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

fn print_analysis(analysis: &Analysis) -> Result<()> {
    let out = serde_json::json!({
        "asset": analysis.asset,
        "decision": analysis.decision,
        "probability": analysis.probability,
        "traps": analysis.traps,
        "behaviour": {
            "discipline": analysis.behaviour.discipline,
            "pause_trading": analysis.behaviour.pause_trading,
            "recommendations": analysis.behaviour.recommendations,
        },
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let config = EngineConfig::from_env().context("Invalid MARKETSENSE_* configuration")?;

    let engine = match arg_value(&args, "--model") {
        Some(path) => {
            let artifact = ModelArtifact::load(path)?;
            tracing::info!(path, samples = artifact.sample_size, "model loaded");
            SignalEngine::with_artifact(config, artifact)?
        }
        None => SignalEngine::new(config)?,
    }
    .with_retrain_worker();

    let history: Box<dyn TradeHistory> = match arg_value(&args, "--db") {
        Some(url) => Box::new(SqliteTradeJournal::connect(url).await?),
        None => Box::new(InMemoryTradeJournal::new()),
    };

    tracing::info!(
        state = %engine.registry().state(),
        closed = history.closed_count().await?,
        "signal agent ready"
    );

    if args.iter().any(|a| a == "--retrain") {
        match engine.maybe_retrain(history.as_ref()).await? {
            Some(rx) => match rx.await.context("retrain worker stopped")? {
                Ok(report) => tracing::info!(
                    samples = report.sample_size,
                    from = %report.previous_state,
                    to = %report.new_state,
                    accuracy = report.metrics.accuracy,
                    "model retrained"
                ),
                Err(e) => tracing::warn!(error = %e, "retrain rejected"),
            },
            None => tracing::info!("no retrain due"),
        }
    }

    if let Some(path) = arg_value(&args, "--save-model") {
        match engine.registry().current() {
            Some(artifact) => {
                artifact.save(path)?;
                tracing::info!(path, samples = artifact.sample_size, "model saved");
            }
            None => tracing::warn!(path, "no fitted model to save"),
        }
    }

    let files = arg_values(&args, "--candles");
    if !files.is_empty() {
        let mut inputs: Vec<(String, Vec<Candle>)> = Vec::with_capacity(files.len());
        for file in files {
            let path = Path::new(file);
            let candles = FileCandleSource::read_file(path, usize::MAX).await?;
            inputs.push((asset_name(path), candles));
        }

        let activity = history
            .recent_activity(engine.config().activity_limit)
            .await?;
        let mut analyses = Vec::new();
        for (asset, result) in engine.analyze_batch(inputs, &activity) {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => tracing::warn!(asset = %asset, error = %e, "analysis failed"),
            }
        }

        let top: usize = match arg_value(&args, "--top") {
            Some(raw) => raw.parse().with_context(|| format!("Invalid --top '{raw}'"))?,
            None => analyses.len(),
        };
        let best = SignalEngine::best_opportunities(&analyses, top);
        tracing::info!(
            analysed = analyses.len(),
            actionable = best.len(),
            "batch complete"
        );
        for analysis in best {
            print_analysis(analysis)?;
        }
        return Ok(());
    }

    let Some(asset) = arg_value(&args, "--asset") else {
        bail!("Pass --asset <PAIR> or --candles <file>...");
    };
    let timeframe = match arg_value(&args, "--timeframe") {
        Some(raw) => Timeframe::parse(raw).with_context(|| format!("Unknown timeframe '{raw}'"))?,
        None => Timeframe::Minute1,
    };
    let source = FileCandleSource::new(arg_value(&args, "--dir").unwrap_or("."));

    match engine
        .fetch_and_analyze(&source, asset, timeframe, history.as_ref())
        .await?
    {
        Some(analysis) => print_analysis(&analysis)?,
        None => bail!("No candle file for {asset} at {}", source.path_for(asset).display()),
    }

    Ok(())
}
