//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use funnelport_core::{
    CachedTextGenerator, CachedTranscriptSource, CloneRequest, Collaborators, FullRequest,
    HttpTranscriptSource, MarketRequest, OpenRouterClient, Orchestrator, ProgressReporter,
    ResearchRequest, RunOutcome, TextGenerator, TranscriptSource,
};
use funnelport_discovery::YouTubeSearch;
use funnelport_funnel::HttpPageSource;
use funnelport_shared::{
    AppConfig, LocaleTable, ProductDocument, RunConfig, RunState, Stage, init_config,
    load_config, read_api_key,
};
use funnelport_storage::Storage;

const CACHE_DB: &str = "cache.db";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// funnelport: research, clone and localize digital-product funnels.
#[derive(Parser)]
#[command(
    name = "funnelport",
    version,
    about = "Research a niche, recreate a sales funnel for it and localize both for a new market.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research a niche, generate a product, clone a funnel and localize both.
    Full {
        /// Niche or topic to research.
        #[arg(long)]
        niche: String,

        /// Sales page to clone.
        #[arg(long)]
        funnel_url: String,

        /// Use these videos instead of searching.
        #[arg(long, num_args = 1..)]
        youtube_videos: Vec<String>,

        /// Target language (defaults to `defaults.target_language`).
        #[arg(long)]
        target_market: Option<String>,

        /// Dialect within the target language.
        #[arg(long)]
        dialect: Option<String>,

        /// Number of videos to research.
        #[arg(long)]
        count: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Recreate a funnel for a topic and localize it.
    Clone {
        /// Sales page to clone.
        #[arg(long)]
        funnel_url: String,

        /// Topic the new copy is written for.
        #[arg(long)]
        topic: String,

        /// Product document (JSON) to translate alongside the funnel.
        #[arg(long)]
        product: Option<PathBuf>,

        /// Target language (defaults to `defaults.target_language`).
        #[arg(long)]
        target_market: Option<String>,

        /// Dialect within the target language.
        #[arg(long)]
        dialect: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Discover videos, fetch transcripts and generate a product.
    Research {
        /// Topic to research.
        #[arg(long)]
        topic: String,

        /// Use these videos instead of searching.
        #[arg(long, num_args = 1..)]
        youtube_videos: Vec<String>,

        /// Number of videos to research.
        #[arg(long)]
        count: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Score market opportunities for a niche.
    Market {
        /// Niche to analyze; omitted, the best niches for the market are listed.
        #[arg(long)]
        niche: Option<String>,

        /// Language market (defaults to `defaults.target_language`).
        #[arg(long)]
        target_market: Option<String>,

        /// Compare every non-English market.
        #[arg(long, requires = "niche")]
        compare: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List recent runs.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, default_value = "20")]
        limit: u32,

        /// Output root the runs were written to.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List locale profiles.
    Locales {
        /// Only show dialects of this language.
        #[arg(long)]
        language: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct OutputArgs {
    /// Output root (defaults to `defaults.output_dir`).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Bypass the transcript and completion cache.
    #[arg(long)]
    no_cache: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "funnelport=info",
        1 => "funnelport=debug",
        _ => "funnelport=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Full {
            niche,
            funnel_url,
            youtube_videos,
            target_market,
            dialect,
            count,
            output,
        } => {
            let config = load_config()?;
            check_url(&funnel_url)?;
            let req = FullRequest {
                niche,
                funnel_url,
                target_language: target_market
                    .unwrap_or_else(|| config.defaults.target_language.clone()),
                dialect,
                desired_count: count,
                youtube_videos,
            };
            let needs = Needs {
                search: req.youtube_videos.is_empty(),
                text: true,
            };
            let orchestrator = build(&config, &output, needs).await?;
            let cancel = cancel_on_ctrl_c();
            let outcome = orchestrator.run_full(&req, &cancel, chrono::Utc::now()).await?;
            finish(&outcome)
        }
        Command::Clone {
            funnel_url,
            topic,
            product,
            target_market,
            dialect,
            output,
        } => {
            let config = load_config()?;
            check_url(&funnel_url)?;
            let product = product.as_deref().map(read_product).transpose()?;
            let req = CloneRequest {
                funnel_url,
                topic,
                product,
                target_language: target_market
                    .unwrap_or_else(|| config.defaults.target_language.clone()),
                dialect,
            };
            let needs = Needs {
                search: false,
                text: true,
            };
            let orchestrator = build(&config, &output, needs).await?;
            let cancel = cancel_on_ctrl_c();
            let outcome = orchestrator.run_clone(&req, &cancel, chrono::Utc::now()).await?;
            finish(&outcome)
        }
        Command::Research {
            topic,
            youtube_videos,
            count,
            output,
        } => {
            let config = load_config()?;
            let req = ResearchRequest {
                topic,
                desired_count: count,
                youtube_videos,
            };
            let needs = Needs {
                search: req.youtube_videos.is_empty(),
                text: true,
            };
            let orchestrator = build(&config, &output, needs).await?;
            let cancel = cancel_on_ctrl_c();
            let outcome = orchestrator
                .run_research(&req, &cancel, chrono::Utc::now())
                .await?;
            finish(&outcome)
        }
        Command::Market {
            niche,
            target_market,
            compare,
            output,
        } => {
            let config = load_config()?;
            let req = MarketRequest {
                niche,
                target_language: target_market
                    .unwrap_or_else(|| config.defaults.target_language.clone()),
                compare,
            };
            let needs = Needs {
                search: false,
                text: false,
            };
            let orchestrator = build(&config, &output, needs).await?;
            let outcome = orchestrator
                .run_market(&req, &CancellationToken::new(), chrono::Utc::now())
                .await?;
            for a in &outcome.record.market {
                println!(
                    "  {:<12} {:<16} {:>2}/10  {}",
                    a.language,
                    a.niche,
                    a.opportunity_score,
                    a.saturation.as_str()
                );
            }
            finish(&outcome)
        }
        Command::Runs { limit, out } => cmd_runs(limit, out).await,
        Command::Locales { language } => cmd_locales(language.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Which collaborators the workflow will actually call.
#[derive(Clone, Copy)]
struct Needs {
    search: bool,
    text: bool,
}

/// Read a key, tolerating its absence when the collaborator goes unused.
fn api_key(var: &str, service: &str, required: bool) -> Result<String> {
    match read_api_key(var, service) {
        Ok(key) => Ok(key),
        Err(e) if required => Err(e.into()),
        Err(_) => Ok(String::new()),
    }
}

async fn build(
    config: &AppConfig,
    output: &OutputArgs,
    needs: Needs,
) -> Result<Orchestrator> {
    let mut run_config = RunConfig::try_from(config)?;
    if let Some(out) = &output.out {
        run_config.output_dir = out.clone();
    }
    let run_config = Arc::new(run_config);

    let or = &config.openrouter;
    let openrouter = OpenRouterClient::new(
        api_key(&or.api_key_env, "OpenRouter", needs.text)?,
        &or.base_url,
        or.default_model.clone(),
        Duration::from_secs(or.timeout_secs),
    )?;
    let model = openrouter.model().to_string();
    let search = YouTubeSearch::new(
        api_key(&config.search.api_key_env, "YouTube Data", needs.search)?,
        &config.search.base_url,
        Duration::from_secs(config.search.variant_timeout_secs),
    )?;
    let tr = &config.transcripts;
    let transcripts = HttpTranscriptSource::new(
        &tr.base_url,
        &tr.languages,
        Duration::from_secs(tr.timeout_secs),
    )?;
    let pages = HttpPageSource::new(
        Duration::from_secs(config.scrape.timeout_secs),
        config.scrape.allow_private_hosts,
    )?;

    let mut text: Arc<dyn TextGenerator> = Arc::new(openrouter);
    let mut transcripts: Arc<dyn TranscriptSource> = Arc::new(transcripts);
    let storage = if config.defaults.cache && !output.no_cache {
        let path = run_config.output_dir.join(CACHE_DB);
        let storage = Arc::new(Storage::open(&path).await?);
        text = Arc::new(CachedTextGenerator::new(text, Arc::clone(&storage), model));
        transcripts = Arc::new(CachedTranscriptSource::new(transcripts, Arc::clone(&storage)));
        info!(path = %path.display(), "collaborator cache enabled");
        Some(storage)
    } else {
        None
    };

    let mut orchestrator = Orchestrator::new(
        Arc::clone(&run_config),
        Collaborators {
            search: Arc::new(search),
            transcripts,
            text,
            pages: Arc::new(pages),
        },
    )
    .with_progress(Arc::new(CliProgress::new()));
    if let Some(storage) = storage {
        orchestrator = orchestrator.with_storage(storage);
    }
    Ok(orchestrator)
}

fn check_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| eyre!("invalid funnel URL '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(eyre!("funnel URL must be http or https: {raw}"));
    }
    Ok(())
}

fn read_product(path: &std::path::Path) -> Result<ProductDocument> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read product '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid product document '{}': {e}", path.display()))
}

/// Cancel the run between stages on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            trigger.cancel();
        }
    });
    cancel
}

/// Print the run summary; a run that did not finish is an error exit.
fn finish(outcome: &RunOutcome) -> Result<()> {
    let record = &outcome.record;
    println!();
    println!("  Run:    {}", record.id);
    println!("  State:  {}", record.state.label());
    println!("  Path:   {}", outcome.run_dir.display());
    println!("  Report: {}", outcome.report_path.display());
    if let Some(failure) = &record.failure {
        println!("  Cause:  {}", failure.cause.message);
    }
    println!();

    if outcome.succeeded() {
        Ok(())
    } else {
        Err(eyre!("run ended {}", record.state.label()))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage) {
        self.spinner.set_message(format!("{stage}..."));
    }

    fn stage_finished(&self, stage: Stage, ok: bool, elapsed: Duration) {
        let mark = if ok { "✓" } else { "✗" };
        self.spinner
            .println(format!("  {mark} {stage} ({:.1}s)", elapsed.as_secs_f64()));
    }

    fn message(&self, text: &str) {
        self.spinner.println(format!("    {text}"));
    }

    fn done(&self, _state: RunState) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Inspection commands
// ---------------------------------------------------------------------------

async fn cmd_runs(limit: u32, out: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let root = match out {
        Some(p) => p,
        None => RunConfig::try_from(&config)?.output_dir,
    };
    let path = root.join(CACHE_DB);
    if !path.exists() {
        println!("No runs recorded under {}", root.display());
        return Ok(());
    }

    let storage = Storage::open_readonly(&path).await?;
    let runs = storage.list_runs(limit).await?;
    for run in &runs {
        println!(
            "{}  {:<8} {:<20} {:<26} {}",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.workflow,
            run.state,
            run.topic.as_deref().unwrap_or("-"),
            run.path
        );
    }
    info!(count = runs.len(), "listed runs");
    Ok(())
}

fn cmd_locales(language: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let table = LocaleTable::with_overrides(&config.locales)?;
    let language = language.map(|l| l.trim().to_lowercase());
    for p in table.profiles() {
        if language.as_deref().is_some_and(|l| l != p.language) {
            continue;
        }
        println!(
            "{:<32} {:<26} {} x{}{}",
            p.tag(),
            p.display_name,
            p.currency,
            p.price_multiplier,
            if p.is_default { "  (default)" } else { "" }
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
