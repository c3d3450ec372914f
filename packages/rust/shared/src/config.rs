//! Application configuration for funnelport.
//!
//! User config lives at `~/.funnelport/funnelport.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FunnelError, Result};
use crate::locale::{LocaleOverride, LocaleTable};
use crate::types::Stage;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "funnelport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".funnelport";

// ---------------------------------------------------------------------------
// Config structs (matching funnelport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter (generative text) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Video search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Transcript service settings.
    #[serde(default)]
    pub transcripts: TranscriptsConfig,

    /// Landing-page scrape settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Quality-score thresholds and weights.
    #[serde(default)]
    pub scoring: ScoringSection,

    /// Product generation settings.
    #[serde(default)]
    pub generation: GenerationSection,

    /// Per-stage timeout and retry budgets.
    #[serde(default)]
    pub stages: StagesConfig,

    /// Locale profile overrides and additions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locales: Vec<LocaleOverride>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for run output trees.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of source videos to keep after ranking.
    #[serde(default = "default_desired_count")]
    pub desired_count: usize,

    /// Concurrent remote calls within one stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Target market language when none is given on the command line.
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Whether remote responses are cached in `<output_dir>/cache.db`.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            desired_count: default_desired_count(),
            concurrency: default_concurrency(),
            target_language: default_target_language(),
            cache: true,
        }
    }
}

fn default_output_dir() -> String {
    "~/funnelport-runs".into()
}
fn default_desired_count() -> usize {
    4
}
fn default_concurrency() -> usize {
    4
}
fn default_target_language() -> String {
    "french".into()
}
fn default_true() -> bool {
    true
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for generation and translation.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL.
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_url(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_completion_timeout() -> u64 {
    180
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the YouTube Data API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// YouTube Data API base URL.
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Number of query variants issued per topic.
    #[serde(default = "default_query_variants")]
    pub query_variants: usize,

    /// Results requested per query variant.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Timeout for one query variant, in seconds.
    #[serde(default = "default_variant_timeout")]
    pub variant_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_url(),
            query_variants: default_query_variants(),
            results_per_query: default_results_per_query(),
            variant_timeout_secs: default_variant_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_search_url() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}
fn default_query_variants() -> usize {
    4
}
fn default_results_per_query() -> usize {
    10
}
fn default_variant_timeout() -> u64 {
    20
}

/// `[transcripts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptsConfig {
    /// Transcript service base URL (`GET {base_url}/transcripts/{video_id}`).
    #[serde(default = "default_transcripts_url")]
    pub base_url: String,

    /// Preferred transcript languages, in order.
    #[serde(default = "default_transcript_languages")]
    pub languages: Vec<String>,

    /// Timeout for one transcript fetch, in seconds.
    #[serde(default = "default_item_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscriptsConfig {
    fn default() -> Self {
        Self {
            base_url: default_transcripts_url(),
            languages: default_transcript_languages(),
            timeout_secs: default_item_timeout(),
        }
    }
}

fn default_transcripts_url() -> String {
    "http://127.0.0.1:8765".into()
}
fn default_transcript_languages() -> Vec<String> {
    vec!["en".into()]
}
fn default_item_timeout() -> u64 {
    30
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Page fetch timeout, in seconds.
    #[serde(default = "default_item_timeout")]
    pub timeout_secs: u64,

    /// Allow scraping private or loopback hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_item_timeout(),
            allow_private_hosts: false,
        }
    }
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSection {
    /// Views below this contribute nothing.
    #[serde(default = "default_min_views")]
    pub min_views: u64,

    /// The view term reaches 1.0 at `min_views * view_saturation_factor`.
    #[serde(default = "default_saturation_factor")]
    pub view_saturation_factor: f64,

    /// Videos younger than this get the full recency term.
    #[serde(default = "default_recency_full_days")]
    pub recency_full_days: i64,

    /// Recency term reaches 0 at this age.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    /// Lower bound of the duration sweet spot, in minutes.
    #[serde(default = "default_sweet_min")]
    pub sweet_spot_min_minutes: f64,

    /// Upper bound of the duration sweet spot, in minutes.
    #[serde(default = "default_sweet_max")]
    pub sweet_spot_max_minutes: f64,

    /// Distance outside the sweet spot over which the duration term falls to 0.
    #[serde(default = "default_duration_decay")]
    pub duration_decay_minutes: f64,

    /// Term weights.
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Words marking an authority source in a title or channel name.
    #[serde(default = "default_expert_lexicon")]
    pub expert_lexicon: Vec<String>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            min_views: default_min_views(),
            view_saturation_factor: default_saturation_factor(),
            recency_full_days: default_recency_full_days(),
            max_age_days: default_max_age_days(),
            sweet_spot_min_minutes: default_sweet_min(),
            sweet_spot_max_minutes: default_sweet_max(),
            duration_decay_minutes: default_duration_decay(),
            weights: ScoringWeights::default(),
            expert_lexicon: default_expert_lexicon(),
        }
    }
}

fn default_min_views() -> u64 {
    100_000
}
fn default_saturation_factor() -> f64 {
    10.0
}
fn default_recency_full_days() -> i64 {
    730
}
fn default_max_age_days() -> i64 {
    1825
}
fn default_sweet_min() -> f64 {
    10.0
}
fn default_sweet_max() -> f64 {
    60.0
}
fn default_duration_decay() -> f64 {
    30.0
}
fn default_expert_lexicon() -> Vec<String> {
    [
        "dr",
        "doctor",
        "phd",
        "md",
        "professor",
        "expert",
        "scientist",
        "researcher",
        "clinic",
        "university",
        "certified",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[scoring.weights]` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_w_views")]
    pub views: f64,
    #[serde(default = "default_w_expert")]
    pub expert: f64,
    #[serde(default = "default_w_recency")]
    pub recency: f64,
    #[serde(default = "default_w_duration")]
    pub duration: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            views: default_w_views(),
            expert: default_w_expert(),
            recency: default_w_recency(),
            duration: default_w_duration(),
        }
    }
}

fn default_w_views() -> f64 {
    0.4
}
fn default_w_expert() -> f64 {
    0.25
}
fn default_w_recency() -> f64 {
    0.15
}
fn default_w_duration() -> f64 {
    0.2
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    /// Product format tag.
    #[serde(default = "default_format")]
    pub format: String,

    /// Writing tone.
    #[serde(default = "default_tone")]
    pub tone: String,

    /// Target number of sections (pages) in the product.
    #[serde(default = "default_pages")]
    pub pages: u32,

    /// Maximum transcript excerpts embedded in the prompt.
    #[serde(default = "default_max_excerpts")]
    pub max_excerpts: usize,

    /// Character budget per excerpt.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Completion budget for the product document.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Delay before the generator's single extra attempt.
    #[serde(default = "default_generator_backoff")]
    pub retry_backoff_ms: u64,

    /// Testimonials generated for a localized funnel (0 disables).
    #[serde(default = "default_testimonials")]
    pub testimonials: usize,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            format: default_format(),
            tone: default_tone(),
            pages: default_pages(),
            max_excerpts: default_max_excerpts(),
            excerpt_chars: default_excerpt_chars(),
            max_tokens: default_max_tokens(),
            retry_backoff_ms: default_generator_backoff(),
            testimonials: default_testimonials(),
        }
    }
}

fn default_format() -> String {
    "7-day protocol".into()
}
fn default_tone() -> String {
    "casual".into()
}
fn default_pages() -> u32 {
    12
}
fn default_max_excerpts() -> usize {
    5
}
fn default_excerpt_chars() -> usize {
    3000
}
fn default_max_tokens() -> u32 {
    8000
}
fn default_generator_backoff() -> u64 {
    2000
}
fn default_testimonials() -> usize {
    5
}

/// `[stages]` section: one budget per pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default = "default_discover_budget")]
    pub discover: StageBudget,
    #[serde(default = "default_fetch_budget")]
    pub fetch: StageBudget,
    #[serde(default = "default_generate_budget")]
    pub generate: StageBudget,
    #[serde(default = "default_extract_budget")]
    pub extract: StageBudget,
    #[serde(default = "default_translate_budget")]
    pub translate: StageBudget,
    #[serde(default = "default_assemble_budget")]
    pub assemble: StageBudget,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            discover: default_discover_budget(),
            fetch: default_fetch_budget(),
            generate: default_generate_budget(),
            extract: default_extract_budget(),
            translate: default_translate_budget(),
            assemble: default_assemble_budget(),
        }
    }
}

/// Timeout and retry budget for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudget {
    pub timeout_secs: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_stage_backoff")]
    pub backoff_ms: u64,
}

fn default_stage_backoff() -> u64 {
    1000
}
fn budget(timeout_secs: u64, retries: u32) -> StageBudget {
    StageBudget {
        timeout_secs,
        retries,
        backoff_ms: default_stage_backoff(),
    }
}
fn default_discover_budget() -> StageBudget {
    budget(120, 1)
}
fn default_fetch_budget() -> StageBudget {
    budget(300, 0)
}
fn default_generate_budget() -> StageBudget {
    budget(600, 1)
}
fn default_extract_budget() -> StageBudget {
    budget(300, 2)
}
fn default_translate_budget() -> StageBudget {
    budget(1200, 1)
}
fn default_assemble_budget() -> StageBudget {
    budget(60, 0)
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig + CLI flags)
// ---------------------------------------------------------------------------

/// Inputs to the pure quality-score function.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub min_views: u64,
    pub view_saturation_factor: f64,
    pub recency_full_days: i64,
    pub max_age_days: i64,
    pub sweet_spot_minutes: (f64, f64),
    pub duration_decay_minutes: f64,
    pub weights: ScoringWeights,
    pub expert_lexicon: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScoringConfig {
    fn from(config: &AppConfig) -> Self {
        let s = &config.scoring;
        Self {
            min_views: s.min_views,
            view_saturation_factor: s.view_saturation_factor,
            recency_full_days: s.recency_full_days,
            max_age_days: s.max_age_days,
            sweet_spot_minutes: (s.sweet_spot_min_minutes, s.sweet_spot_max_minutes),
            duration_decay_minutes: s.duration_decay_minutes,
            weights: s.weights,
            expert_lexicon: s.expert_lexicon.clone(),
        }
    }
}

/// Multi-query discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub desired_count: usize,
    pub query_variants: usize,
    pub results_per_query: usize,
    pub concurrency: usize,
    pub variant_timeout: Duration,
}

impl From<&AppConfig> for DiscoveryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            desired_count: config.defaults.desired_count,
            query_variants: config.search.query_variants,
            results_per_query: config.search.results_per_query,
            concurrency: config.defaults.concurrency,
            variant_timeout: Duration::from_secs(config.search.variant_timeout_secs),
        }
    }
}

/// Transcript fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub concurrency: usize,
    pub item_timeout: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency,
            item_timeout: Duration::from_secs(config.transcripts.timeout_secs),
        }
    }
}

/// Content generator settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub format: String,
    pub tone: String,
    pub pages: u32,
    pub max_excerpts: usize,
    pub excerpt_chars: usize,
    pub max_tokens: u32,
    pub retry_backoff: Duration,
    pub testimonials: usize,
}

impl From<&AppConfig> for GenerationConfig {
    fn from(config: &AppConfig) -> Self {
        let g = &config.generation;
        Self {
            format: g.format.clone(),
            tone: g.tone.clone(),
            pages: g.pages,
            max_excerpts: g.max_excerpts,
            excerpt_chars: g.excerpt_chars,
            max_tokens: g.max_tokens,
            retry_backoff: Duration::from_millis(g.retry_backoff_ms),
            testimonials: g.testimonials,
        }
    }
}

/// Resolved stage-execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl From<StageBudget> for StagePolicy {
    fn from(b: StageBudget) -> Self {
        Self {
            timeout: Duration::from_secs(b.timeout_secs),
            retries: b.retries,
            backoff: Duration::from_millis(b.backoff_ms),
        }
    }
}

/// Per-stage policies keyed by stage.
#[derive(Debug, Clone)]
pub struct StagePolicies {
    pub discover: StagePolicy,
    pub fetch: StagePolicy,
    pub generate: StagePolicy,
    pub extract: StagePolicy,
    pub translate: StagePolicy,
    pub assemble: StagePolicy,
}

impl From<&StagesConfig> for StagePolicies {
    fn from(s: &StagesConfig) -> Self {
        Self {
            discover: s.discover.into(),
            fetch: s.fetch.into(),
            generate: s.generate.into(),
            extract: s.extract.into(),
            translate: s.translate.into(),
            assemble: s.assemble.into(),
        }
    }
}

impl StagePolicies {
    pub fn for_stage(&self, stage: Stage) -> StagePolicy {
        match stage {
            Stage::Discover => self.discover,
            Stage::Fetch => self.fetch,
            Stage::Generate => self.generate,
            Stage::Extract => self.extract,
            Stage::Translate => self.translate,
            Stage::Assemble => self.assemble,
        }
    }
}

/// Everything a pipeline run needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub scoring: ScoringConfig,
    pub discovery: DiscoveryConfig,
    pub fetch: FetchConfig,
    pub generation: GenerationConfig,
    pub stages: StagePolicies,
    pub locales: LocaleTable,
}

impl TryFrom<&AppConfig> for RunConfig {
    type Error = FunnelError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        validate_config(config)?;
        Ok(Self {
            output_dir: expand_home(&config.defaults.output_dir),
            scoring: ScoringConfig::from(config),
            discovery: DiscoveryConfig::from(config),
            fetch: FetchConfig::from(config),
            generation: GenerationConfig::from(config),
            stages: StagePolicies::from(&config.stages),
            locales: LocaleTable::with_overrides(&config.locales)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject thresholds and weights that would make scoring meaningless.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let s = &config.scoring;
    let w = &s.weights;
    if [w.views, w.expert, w.recency, w.duration]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
    {
        return Err(FunnelError::config("scoring weights must be non-negative"));
    }
    if w.views + w.expert + w.recency + w.duration <= 0.0 {
        return Err(FunnelError::config("scoring weights must not all be zero"));
    }
    if s.view_saturation_factor < 1.0 {
        return Err(FunnelError::config(
            "scoring.view_saturation_factor must be >= 1",
        ));
    }
    if s.recency_full_days < 0 || s.max_age_days < s.recency_full_days {
        return Err(FunnelError::config(format!(
            "scoring.max_age_days ({}) must be >= recency_full_days ({})",
            s.max_age_days, s.recency_full_days
        )));
    }
    if s.sweet_spot_min_minutes < 0.0 || s.sweet_spot_max_minutes < s.sweet_spot_min_minutes {
        return Err(FunnelError::config(
            "scoring sweet spot bounds must satisfy 0 <= min <= max",
        ));
    }
    if config.defaults.desired_count == 0 {
        return Err(FunnelError::config("defaults.desired_count must be >= 1"));
    }
    if config.defaults.concurrency == 0 {
        return Err(FunnelError::config("defaults.concurrency must be >= 1"));
    }
    if config.search.query_variants == 0 {
        return Err(FunnelError::config("search.query_variants must be >= 1"));
    }
    Ok(())
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.funnelport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FunnelError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.funnelport/funnelport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FunnelError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FunnelError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FunnelError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FunnelError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FunnelError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the env var named in config.
pub fn read_api_key(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(FunnelError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}
