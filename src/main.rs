use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use medsift::judge::RemoteJudge;
use medsift::remote::RemoteClient;
use medsift::report::{self, EvidenceDigest};
use medsift::source::RemoteSource;
use medsift::synthesis::{Handoff, Synthesizer};
use medsift::{Judge, LoopConfig, LoopError, Registry, ResearchLoop, SourceAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const API_KEY_ENV: &str = "MEDSIFT_API_KEY";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Evidence, per-pass log and source errors
    Markdown,
    /// The full outcome as JSON
    Json,
    /// Hand the final pool to the built-in synthesizer
    Digest,
}

#[derive(Debug, Parser)]
#[command(name = "medsift", version, about = "Iterative biomedical evidence search")]
struct Cli {
    /// The research question
    question: String,

    /// Search endpoint as NAME=URL. Repeat for more sources; order sets dedup priority.
    #[arg(long = "source", value_name = "NAME=URL", value_parser = parse_source, required = true)]
    sources: Vec<(String, String)>,

    /// Sufficiency judge endpoint
    #[arg(long, value_name = "URL")]
    judge_url: String,

    /// JSON config file (durations in seconds). Defaults come from MEDSIFT_* variables.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long)]
    max_iterations: Option<u32>,

    #[arg(long)]
    token_budget: Option<u64>,

    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,
}

fn parse_source(raw: &str) -> Result<(String, String), String> {
    let (name, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL, got '{raw}'"))?;
    let (name, url) = (name.trim(), url.trim());
    if name.is_empty() || url.is_empty() {
        return Err(format!("expected NAME=URL, got '{raw}'"));
    }
    url::Url::parse(url).map_err(|e| format!("invalid URL for source '{name}': {e}"))?;
    Ok((name.to_string(), url.to_string()))
}

/// File or defaults, then `MEDSIFT_*` values from `lookup`, then CLI flags.
fn load_config(
    cli: &Cli,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LoopConfig, Box<dyn std::error::Error>> {
    let base = match &cli.config {
        Some(path) => LoopConfig::from_json_file(path)?,
        None => LoopConfig::default(),
    };
    let mut config = base.with_overrides(lookup)?;
    if let Some(n) = cli.max_iterations {
        config.max_iterations = n;
    }
    if let Some(n) = cli.token_budget {
        config.token_budget = n;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medsift=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli, |key| std::env::var(key).ok())?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
    let client = |endpoint: &str| RemoteClient::new(http.clone(), endpoint).with_api_key(&api_key);

    let mut registry: Registry<dyn SourceAdapter> = Registry::new();
    for (name, url) in &cli.sources {
        registry.register(name.clone(), Arc::new(RemoteSource::new(name.clone(), client(url.as_str()))))?;
    }
    let judge: Arc<dyn Judge> = Arc::new(RemoteJudge::new(client(&cli.judge_url)));

    let research = ResearchLoop::new(config, &registry, judge)?;
    info!(
        sources = ?research.source_names().collect::<Vec<_>>(),
        max_iterations = research.config().max_iterations,
        "starting research"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping at the next state boundary");
                cancel.cancel();
            }
        }
    });

    let outcome = match research.run_until_cancelled(&cli.question, &cancel).await {
        Ok(outcome) => outcome,
        Err(LoopError::AllSourcesFailed {
            iteration,
            source,
            pool,
        }) => {
            error!(iteration, kept = pool.len(), "search aborted: {source}");
            println!("{}", report::render_aborted(&cli.question, &pool, &source));
            return Err(format!("iteration {iteration}: {source}").into());
        }
        Err(e) => return Err(e.into()),
    };

    let text = match cli.format {
        Format::Markdown => report::render_markdown(&outcome),
        Format::Json => report::render_json(&outcome)?,
        Format::Digest => {
            EvidenceDigest
                .synthesize(&Handoff::from(outcome))
                .await?
                .text
        }
    };
    println!("{text}");
    Ok(())
}
