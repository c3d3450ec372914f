//! Pipeline orchestrator: drives one run record through a workflow's stages.
//!
//! `INIT → DISCOVER → FETCH → GENERATE → EXTRACT → TRANSLATE → ASSEMBLE → DONE`,
//! with `FAILED(stage)` absorbing any stage error and `CANCELLED` when the
//! token fires. An error outside any stage ends the run `ABORTED`. Each
//! workflow runs the subset of stages it plans. `run.json`
//! is rewritten after every stage and `report.md` is always written.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use funnelport_artifacts::{
    render_market_table, render_page_brief, render_product_markdown, render_report,
};
use funnelport_discovery::{Discoverer, SearchSource, manual_candidates};
use funnelport_funnel::{PageSource, extract};
use funnelport_markdown::page_to_markdown;
use funnelport_shared::{
    FailureReport, FunnelBlueprint, FunnelError, LocaleProfile, ProductDocument, RankedCandidate,
    ResearchCorpus, Result, RunConfig, RunId, RunRecord, RunState, Stage, StageError, StageStatus,
    Workflow,
};
use funnelport_storage::{RunIndexEntry, Storage};

use crate::assembler::{REPORT_FILE, RunDir};
use crate::collaborators::{TextGenerator, TranscriptSource};
use crate::fetch::Fetcher;
use crate::generator::ContentGenerator;
use crate::market::{analyze_gap, compare_markets, suggest_niches};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::recreate::Recreator;
use crate::retry::run_stage;
use crate::translator::Translator;

const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Niches analyzed by `market` when none is given.
const SUGGESTED_NICHES: usize = 5;

/// Remote collaborators a run talks to.
pub struct Collaborators {
    pub search: Arc<dyn SearchSource>,
    pub transcripts: Arc<dyn TranscriptSource>,
    pub text: Arc<dyn TextGenerator>,
    pub pages: Arc<dyn PageSource>,
}

/// `full`: research a niche, clone a funnel for it, localize both.
#[derive(Debug, Clone)]
pub struct FullRequest {
    pub niche: String,
    pub funnel_url: String,
    /// Explicit videos; when non-empty, search is skipped.
    pub youtube_videos: Vec<String>,
    pub target_language: String,
    pub dialect: Option<String>,
    pub desired_count: Option<usize>,
}

/// `clone`: recreate and localize a funnel, optionally with a prebuilt product.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub funnel_url: String,
    pub topic: String,
    pub product: Option<ProductDocument>,
    pub target_language: String,
    pub dialect: Option<String>,
}

/// `research`: discover, fetch and generate only.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub topic: String,
    pub youtube_videos: Vec<String>,
    pub desired_count: Option<usize>,
}

/// `market`: gap analysis without remote calls.
#[derive(Debug, Clone)]
pub struct MarketRequest {
    pub niche: Option<String>,
    pub target_language: String,
    /// Compare every non-English market instead of one.
    pub compare: bool,
}

/// Final state of a run and where its files are.
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.record.state == RunState::Done
    }
}

/// Mutable state of one in-flight run.
struct Run<'a> {
    dir: RunDir,
    record: RunRecord,
    cancel: &'a CancellationToken,
}

impl Run<'_> {
    fn save_json<T: serde::Serialize>(&mut self, rel_path: &str, data: &T) -> Result<()> {
        let entry = self.dir.write_json(rel_path, data)?;
        self.record.record_artifact(entry);
        Ok(())
    }

    fn save_text(&mut self, rel_path: &str, text: &str) -> Result<()> {
        let entry = self.dir.write_artifact(rel_path, text.as_bytes())?;
        self.record.record_artifact(entry);
        Ok(())
    }

    fn save_product(&mut self, doc: &ProductDocument, lang: &str) -> Result<()> {
        self.save_json(&format!("product/product.{lang}.json"), doc)?;
        self.save_text(
            &format!("product/product.{lang}.md"),
            &render_product_markdown(doc),
        )
    }

    fn checkpoint(&self) -> Result<()> {
        self.dir.persist_record(&self.record)
    }
}

pub struct Orchestrator {
    config: Arc<RunConfig>,
    discoverer: Discoverer,
    fetcher: Fetcher,
    generator: ContentGenerator,
    recreator: Recreator,
    translator: Translator,
    pages: Arc<dyn PageSource>,
    storage: Option<Arc<Storage>>,
    progress: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    pub fn new(config: Arc<RunConfig>, collaborators: Collaborators) -> Self {
        Self {
            discoverer: Discoverer::new(
                collaborators.search,
                config.discovery.clone(),
                config.scoring.clone(),
            ),
            fetcher: Fetcher::new(collaborators.transcripts, config.fetch.clone()),
            generator: ContentGenerator::new(
                Arc::clone(&collaborators.text),
                config.generation.clone(),
            ),
            recreator: Recreator::new(Arc::clone(&collaborators.text)),
            translator: Translator::new(collaborators.text, config.locales.clone()),
            pages: collaborators.pages,
            storage: None,
            progress: Arc::new(SilentProgress),
            config,
        }
    }

    /// Record every run in the storage run index.
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(niche = %req.niche, funnel = %req.funnel_url))]
    pub async fn run_full(
        &self,
        req: &FullRequest,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let profile = self
            .config
            .locales
            .resolve(&req.target_language, req.dialect.as_deref())?;

        let mut run = self.start(Workflow::Full, cancel, now).await?;
        run.record.topic = Some(req.niche.clone());
        run.record.funnel_url = Some(req.funnel_url.clone());
        run.record.target = Some(profile.tag());
        run.record.market = vec![analyze_gap(&req.niche, &profile.language)];

        let result = async {
            run.checkpoint()?;
            let product = self
                .research(&mut run, &req.niche, &req.youtube_videos, req.desired_count, now)
                .await?;
            let adapted = self.extract_stage(&mut run, &req.funnel_url, &req.niche).await?;
            let (localized, blueprint) = self
                .translate_stage(&mut run, Some(&product), &adapted, profile, &req.niche)
                .await?;
            self.assemble_stage(&mut run, &blueprint, localized.as_ref(), profile)
                .await
        }
        .await;
        self.finish(run, result).await
    }

    #[instrument(skip_all, fields(topic = %req.topic, funnel = %req.funnel_url))]
    pub async fn run_clone(
        &self,
        req: &CloneRequest,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let profile = self
            .config
            .locales
            .resolve(&req.target_language, req.dialect.as_deref())?;
        if let Some(product) = &req.product {
            product.check_complete()?;
        }

        let mut run = self.start(Workflow::Clone, cancel, now).await?;
        run.record.topic = Some(req.topic.clone());
        run.record.funnel_url = Some(req.funnel_url.clone());
        run.record.target = Some(profile.tag());
        run.record.product = req.product.clone();

        let result = async {
            if let Some(product) = &req.product {
                run.save_product(product, "en")?;
            }
            run.checkpoint()?;
            let adapted = self.extract_stage(&mut run, &req.funnel_url, &req.topic).await?;
            let (localized, blueprint) = self
                .translate_stage(&mut run, req.product.as_ref(), &adapted, profile, &req.topic)
                .await?;
            self.assemble_stage(&mut run, &blueprint, localized.as_ref(), profile)
                .await
        }
        .await;
        self.finish(run, result).await
    }

    #[instrument(skip_all, fields(topic = %req.topic))]
    pub async fn run_research(
        &self,
        req: &ResearchRequest,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let mut run = self.start(Workflow::Research, cancel, now).await?;
        run.record.topic = Some(req.topic.clone());

        let result = async {
            run.checkpoint()?;
            self.research(&mut run, &req.topic, &req.youtube_videos, req.desired_count, now)
                .await
                .map(|_| ())
        }
        .await;
        self.finish(run, result).await
    }

    #[instrument(skip_all, fields(market = %req.target_language, compare = req.compare))]
    pub async fn run_market(
        &self,
        req: &MarketRequest,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let language = req.target_language.trim().to_lowercase();
        let analyses = match (&req.niche, req.compare) {
            (Some(niche), true) => compare_markets(niche),
            (Some(niche), false) => vec![analyze_gap(niche, &language)],
            (None, _) => suggest_niches(&language)
                .into_iter()
                .take(SUGGESTED_NICHES)
                .map(|(niche, _)| analyze_gap(&niche, &language))
                .collect(),
        };

        let mut run = self.start(Workflow::Market, cancel, now).await?;
        run.record.topic = req.niche.clone();
        run.record.target = (!req.compare).then(|| language.clone());

        let result = (|| -> Result<()> {
            run.save_json("market/analysis.json", &analyses)?;
            run.save_text("market/market.md", &render_market_table(&analyses))?;
            run.record.market = analyses;
            Ok(())
        })();
        self.finish(run, result).await
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn research(
        &self,
        run: &mut Run<'_>,
        topic: &str,
        videos: &[String],
        desired_count: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<ProductDocument> {
        let candidates = self.discover_stage(run, topic, videos, desired_count, now).await?;
        let corpus = self.fetch_stage(run, &candidates).await?;
        self.generate_stage(run, topic, &corpus).await
    }

    async fn discover_stage(
        &self,
        run: &mut Run<'_>,
        topic: &str,
        videos: &[String],
        desired_count: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedCandidate>> {
        let desired = desired_count.unwrap_or(self.config.discovery.desired_count);
        let discoverer = &self.discoverer;

        let candidates = if videos.is_empty() {
            self.stage(run, Stage::Discover, move || async move {
                discoverer.find(topic, desired, now).await
            })
            .await?
        } else {
            self.stage(run, Stage::Discover, move || async move {
                manual_candidates(videos)
            })
            .await?
        };

        run.save_json("research/candidates.json", &candidates)?;
        run.record.candidates = Some(candidates.clone());
        run.checkpoint()?;
        Ok(candidates)
    }

    async fn fetch_stage(
        &self,
        run: &mut Run<'_>,
        candidates: &[RankedCandidate],
    ) -> Result<ResearchCorpus> {
        let fetcher = &self.fetcher;
        let corpus = self
            .stage(run, Stage::Fetch, move || async move {
                fetcher.build_corpus(candidates).await
            })
            .await?;

        if corpus.absent_count() > 0 {
            self.progress.message(&format!(
                "{} of {} transcripts unavailable",
                corpus.absent_count(),
                corpus.entries.len()
            ));
        }
        run.save_json("research/corpus.json", &corpus)?;
        run.record.corpus = Some(corpus.clone());
        run.checkpoint()?;
        Ok(corpus)
    }

    async fn generate_stage(
        &self,
        run: &mut Run<'_>,
        topic: &str,
        corpus: &ResearchCorpus,
    ) -> Result<ProductDocument> {
        let generator = &self.generator;
        let format = self.config.generation.format.as_str();
        let tone = self.config.generation.tone.as_str();
        let product = self
            .stage(run, Stage::Generate, move || async move {
                generator.generate(topic, corpus, format, tone).await
            })
            .await?;

        run.save_product(&product, "en")?;
        run.record.product = Some(product.clone());
        run.checkpoint()?;
        Ok(product)
    }

    /// Scrape, extract and recreate the funnel copy for `topic`.
    async fn extract_stage(
        &self,
        run: &mut Run<'_>,
        url: &str,
        topic: &str,
    ) -> Result<FunnelBlueprint> {
        let pages = &self.pages;
        let recreator = &self.recreator;
        let (html, source, adapted) = self
            .stage(run, Stage::Extract, move || async move {
                let html = pages.scrape(url).await?;
                let source = extract(&html, url)?;
                let adapted = recreator.recreate_blueprint(&source, topic).await?;
                Ok::<_, FunnelError>((html, source, adapted))
            })
            .await?;

        match page_to_markdown(&html, url) {
            Ok(copy) => run.save_text("funnel/source.md", &copy.markdown)?,
            Err(e) => warn!(error = %e, "source page copy skipped"),
        }
        run.save_json("funnel/blueprint.source.json", &source)?;
        run.save_json("funnel/blueprint.en.json", &adapted)?;
        run.record.source_blueprint = Some(source);
        run.record.adapted_blueprint = Some(adapted.clone());
        run.checkpoint()?;
        Ok(adapted)
    }

    /// Localize the blueprint and, when present, the product. The product is
    /// sold at the funnel's price unless it already carries one.
    async fn translate_stage(
        &self,
        run: &mut Run<'_>,
        product: Option<&ProductDocument>,
        blueprint: &FunnelBlueprint,
        profile: &LocaleProfile,
        topic: &str,
    ) -> Result<(Option<ProductDocument>, FunnelBlueprint)> {
        let testimonial_count = self.config.generation.testimonials;
        let priced = product.map(|p| {
            let mut p = p.clone();
            if p.price.is_none() {
                p.price = Some(blueprint.price.clone());
            }
            p
        });
        let mut source = blueprint.clone();
        if testimonial_count > 0 {
            source.testimonials.clear();
        }

        let translator = &self.translator;
        let generator = &self.generator;
        let priced = priced.as_ref();
        let source = &source;
        let (localized, mut translated, testimonials) = self
            .stage(run, Stage::Translate, move || async move {
                let localized = match priced {
                    Some(doc) => Some(translator.translate_document_to(doc, profile).await?),
                    None => None,
                };
                let translated = translator.translate_blueprint_to(source, profile).await?;
                let testimonials = generator
                    .generate_testimonials(topic, &profile.display_name, testimonial_count)
                    .await?;
                Ok::<_, FunnelError>((localized, translated, testimonials))
            })
            .await?;

        if testimonial_count > 0 {
            translated.testimonials = testimonials.clone();
        }
        let tag = profile.tag();
        if let Some(doc) = &localized {
            run.save_product(doc, &tag)?;
            run.record.localized_products = vec![doc.clone()];
        }
        run.save_json(&format!("funnel/blueprint.{tag}.json"), &translated)?;
        run.record.localized_blueprint = Some(translated.clone());
        run.record.testimonials = testimonials;
        run.checkpoint()?;
        Ok((localized, translated))
    }

    async fn assemble_stage(
        &self,
        run: &mut Run<'_>,
        blueprint: &FunnelBlueprint,
        product: Option<&ProductDocument>,
        profile: &LocaleProfile,
    ) -> Result<()> {
        let brief = self
            .stage(run, Stage::Assemble, move || async move {
                Ok::<_, FunnelError>(render_page_brief(blueprint, product, profile))
            })
            .await?;
        run.save_text("funnel/page_brief.md", &brief)?;
        run.checkpoint()
    }

    // -----------------------------------------------------------------------
    // Machinery
    // -----------------------------------------------------------------------

    async fn start<'a>(
        &self,
        workflow: Workflow,
        cancel: &'a CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<Run<'a>> {
        let id = RunId::new();
        let dir = RunDir::create(&self.config.output_dir, &id)?;
        let record = RunRecord::new(id, workflow, now);
        info!(run_id = %record.id, %workflow, path = %dir.path().display(), "run started");
        let run = Run { dir, record, cancel };
        self.index(&run).await;
        Ok(run)
    }

    /// Run one stage under its policy, racing the cancellation token.
    async fn stage<T, F, Fut>(&self, run: &mut Run<'_>, stage: Stage, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if run.cancel.is_cancelled() {
            return Err(FunnelError::Cancelled);
        }
        run.record.state = RunState::Running(stage);
        self.progress.stage_started(stage);
        info!(%stage, "stage started");

        let policy = self.config.stages.for_stage(stage);
        let cancel = run.cancel;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%stage, "cancelled during stage");
                return Err(FunnelError::Cancelled);
            }
            outcome = run_stage(stage, &policy, op) => outcome,
        };

        if let Some(entry) = run.record.stage_mut(stage) {
            entry.attempts = outcome.attempts;
            entry.elapsed_ms = outcome.elapsed.as_millis() as u64;
            match &outcome.result {
                Ok(_) => {
                    entry.status = StageStatus::Done;
                    entry.error = None;
                }
                Err(e) => {
                    entry.status = StageStatus::Failed;
                    entry.error = Some(StageError::from(e));
                }
            }
        }
        let ok = outcome.result.is_ok();
        self.progress.stage_finished(stage, ok, outcome.elapsed);
        if ok {
            info!(%stage, attempts = outcome.attempts, elapsed_ms = outcome.elapsed.as_millis() as u64, "stage done");
        }
        outcome.result
    }

    /// Settle the terminal state, write the report and the final record.
    async fn finish(&self, mut run: Run<'_>, result: Result<()>) -> Result<RunOutcome> {
        match result {
            Ok(()) => run.record.state = RunState::Done,
            Err(err) => {
                let stage = match run.record.state {
                    RunState::Running(stage) => Some(stage),
                    _ => None,
                };
                let state = match (&err, stage) {
                    (FunnelError::Cancelled, _) => RunState::Cancelled,
                    (_, Some(stage)) => RunState::Failed(stage),
                    (_, None) => RunState::Aborted,
                };

                if let RunState::Failed(s) = state {
                    if let Some(entry) = run.record.stage_mut(s) {
                        if entry.status != StageStatus::Failed {
                            entry.status = StageStatus::Failed;
                            entry.error = Some(StageError::from(&err));
                        }
                    }
                }

                warn!(state = %state.label(), error = %err, "run did not complete");
                run.record.state = state;
                run.record.failure = Some(FailureReport {
                    stage,
                    cause: StageError::from(&err),
                    usable_artifacts: run.record.artifact_paths(),
                });
            }
        }

        run.record.finished_at = Some(Utc::now());
        let report = render_report(&run.record, TOOL_VERSION);
        run.save_text(REPORT_FILE, &report)?;
        run.checkpoint()?;
        self.index(&run).await;
        self.progress.done(run.record.state);

        info!(run_id = %run.record.id, state = %run.record.state.label(), "run finished");
        Ok(RunOutcome {
            report_path: run.dir.path().join(REPORT_FILE),
            run_dir: run.dir.path().to_path_buf(),
            record: run.record,
        })
    }

    async fn index(&self, run: &Run<'_>) {
        let Some(storage) = &self.storage else {
            return;
        };
        let record = &run.record;
        let entry = RunIndexEntry {
            id: record.id.to_string(),
            workflow: record.workflow.to_string(),
            topic: record.topic.clone(),
            target: record.target.clone(),
            state: record.state.label(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            path: run.dir.path().display().to_string(),
        };
        if let Err(e) = storage.upsert_run(&entry).await {
            warn!(error = %e, "failed to update run index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{load_record, verify_artifacts};
    use crate::testing::{
        BlankTranslations, EchoGenerator, PRODUCT_MD, SALES_PAGE, ScriptedGenerator,
        ScriptedTranscripts, StaticPage, StaticSearch, UNPRICED_PAGE, product, video_id,
    };
    use funnelport_discovery::watch_url;
    use funnelport_shared::AppConfig;
    use std::path::Path;
    use std::time::Duration;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("fp-orchestrator-{}", Uuid::now_v7()))
    }

    fn config(root: &Path) -> Arc<RunConfig> {
        let mut c = RunConfig::try_from(&AppConfig::default()).unwrap();
        c.output_dir = root.to_path_buf();
        c.generation.retry_backoff = Duration::ZERO;
        for policy in [
            &mut c.stages.discover,
            &mut c.stages.fetch,
            &mut c.stages.generate,
            &mut c.stages.extract,
            &mut c.stages.translate,
            &mut c.stages.assemble,
        ] {
            policy.backoff = Duration::ZERO;
        }
        Arc::new(c)
    }

    fn transcripts(n: usize) -> ScriptedTranscripts {
        (1..=n).fold(ScriptedTranscripts::default(), |t, i| {
            t.with(&video_id(i), &format!("transcript number {i}"))
        })
    }

    fn orchestrator(
        root: &Path,
        search: StaticSearch,
        transcripts: ScriptedTranscripts,
        text: Arc<dyn TextGenerator>,
    ) -> Orchestrator {
        orchestrator_on(root, SALES_PAGE, search, transcripts, text)
    }

    fn orchestrator_on(
        root: &Path,
        page: &str,
        search: StaticSearch,
        transcripts: ScriptedTranscripts,
        text: Arc<dyn TextGenerator>,
    ) -> Orchestrator {
        Orchestrator::new(
            config(root),
            Collaborators {
                search: Arc::new(search),
                transcripts: Arc::new(transcripts),
                text,
                pages: Arc::new(StaticPage(page.into())),
            },
        )
    }

    fn full_request(target: &str) -> FullRequest {
        FullRequest {
            niche: "sleep".into(),
            funnel_url: "https://sleep.example/offer".into(),
            youtube_videos: Vec::new(),
            target_language: target.into(),
            dialect: None,
            desired_count: Some(3),
        }
    }

    const RESEARCH_OUTPUTS: [&str; 4] = [
        "research/candidates.json",
        "research/corpus.json",
        "product/product.en.json",
        "product/product.en.md",
    ];

    fn research(topic: &str) -> ResearchRequest {
        ResearchRequest {
            topic: topic.into(),
            youtube_videos: Vec::new(),
            desired_count: Some(4),
        }
    }

    fn clone_request() -> CloneRequest {
        CloneRequest {
            funnel_url: "https://sleep.example/offer".into(),
            topic: "focus".into(),
            product: None,
            target_language: "portuguese".into(),
            dialect: Some("brazilian".into()),
        }
    }

    #[tokio::test]
    async fn one_missing_transcript_still_generates() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(4),
            transcripts(4).failing(&video_id(3)),
            Arc::new(EchoGenerator::new("en", PRODUCT_MD)),
        );

        let outcome = orch
            .run_research(&research("sleep"), &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert!(outcome.succeeded(), "state: {:?}", outcome.record.state);
        let corpus = outcome.record.corpus.as_ref().unwrap();
        assert_eq!(corpus.entries.len(), 4);
        assert_eq!(corpus.usable_count(), 3);
        assert_eq!(
            outcome.record.stage(Stage::Generate).unwrap().status,
            StageStatus::Done
        );
        assert_eq!(outcome.record.product.as_ref().unwrap().title, "Deep Sleep Protocol");

        let paths = outcome.record.artifact_paths();
        for expected in [
            "product/product.en.json",
            "product/product.en.md",
            "report.md",
            "research/candidates.json",
            "research/corpus.json",
        ] {
            assert!(paths.contains(&expected.to_string()), "missing {expected}");
        }
        let on_disk = load_record(&outcome.run_dir).unwrap();
        assert_eq!(on_disk.state, RunState::Done);
        verify_artifacts(&outcome.run_dir, &on_disk).unwrap();
    }

    #[tokio::test]
    async fn untitled_product_fails_generate_and_keeps_research() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(3),
            transcripts(3),
            Arc::new(ScriptedGenerator::new(vec![Ok("## Only a section\nbody".into())])),
        );

        let outcome = orch
            .run_research(&research("sleep"), &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(outcome.record.state, RunState::Failed(Stage::Generate));
        let generate = outcome.record.stage(Stage::Generate).unwrap();
        assert_eq!(generate.status, StageStatus::Failed);
        assert_eq!(
            generate.error.as_ref().unwrap().kind,
            "content_generation_failed"
        );
        assert_eq!(outcome.record.stage(Stage::Discover).unwrap().status, StageStatus::Done);
        assert_eq!(outcome.record.stage(Stage::Fetch).unwrap().status, StageStatus::Done);

        let on_disk = load_record(&outcome.run_dir).unwrap();
        assert_eq!(on_disk.candidates.as_ref().unwrap().len(), 3);
        assert_eq!(on_disk.corpus.as_ref().unwrap().usable_count(), 3);
        assert!(on_disk.product.is_none());

        let failure = on_disk.failure.unwrap();
        assert_eq!(failure.stage, Some(Stage::Generate));
        assert_eq!(
            failure.usable_artifacts,
            vec!["research/candidates.json", "research/corpus.json"]
        );
        let report = std::fs::read_to_string(&outcome.report_path).unwrap();
        assert!(report.contains("FAILED(GENERATE)"));
        assert!(report.contains("research/corpus.json"));
    }

    #[tokio::test]
    async fn failing_search_fails_discover() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            Arc::new(EchoGenerator::new("en", PRODUCT_MD)),
        );

        let outcome = orch
            .run_research(&research("sleep"), &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.record.state, RunState::Failed(Stage::Discover));
        let failure = outcome.record.failure.as_ref().unwrap();
        assert_eq!(failure.cause.kind, "discovery_unavailable");
        assert!(outcome.record.candidates.is_none());
        assert_eq!(outcome.record.stage(Stage::Fetch).unwrap().status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn manual_videos_skip_search() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(2),
            Arc::new(EchoGenerator::new("en", PRODUCT_MD)),
        );
        let req = ResearchRequest {
            topic: "sleep".into(),
            youtube_videos: vec![watch_url(&video_id(2)), watch_url(&video_id(1))],
            desired_count: None,
        };

        let outcome = orch
            .run_research(&req, &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert!(outcome.succeeded());
        let candidates = outcome.record.candidates.as_ref().unwrap();
        assert_eq!(candidates[0].resource.video_id.as_deref(), Some("vid00000002"));
        assert!(candidates.iter().all(|c| c.manual && c.score == 1.0));
    }

    #[tokio::test]
    async fn clone_twice_is_byte_identical() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            Arc::new(EchoGenerator::new("pt", PRODUCT_MD)),
        );
        let mut req = clone_request();
        req.product = Some(product());

        let first = orch.run_clone(&req, &CancellationToken::new(), Utc::now()).await.unwrap();
        let second = orch.run_clone(&req, &CancellationToken::new(), Utc::now()).await.unwrap();
        assert!(first.succeeded() && second.succeeded());
        assert_ne!(first.run_dir, second.run_dir);

        for rel in [
            "funnel/blueprint.source.json",
            "funnel/blueprint.en.json",
            "funnel/blueprint.portuguese-brazilian.json",
            "product/product.portuguese-brazilian.json",
            "funnel/page_brief.md",
        ] {
            let a = std::fs::read(first.run_dir.join(rel)).unwrap();
            let b = std::fs::read(second.run_dir.join(rel)).unwrap();
            assert_eq!(a, b, "{rel} differs");
        }

        let bp = first.record.localized_blueprint.as_ref().unwrap();
        assert_eq!(bp.language, "portuguese-brazilian");
        assert_eq!(bp.price.to_string(), "10.8 BRL");
        assert_eq!(bp.testimonials, vec!["Loved it.", "Worked in a week."]);
        assert!(bp.headline.starts_with("[pt] [pt] "));
        let doc = &first.record.localized_products[0];
        assert_eq!(doc.price.as_ref().unwrap().to_string(), "10.8 BRL");
        assert!(first.record.stages.iter().all(|s| s.status == StageStatus::Done));
    }

    #[tokio::test]
    async fn full_run_writes_every_artifact_and_indexes() {
        let root = temp_root();
        let storage = Arc::new(Storage::open(&root.join("cache.db")).await.unwrap());
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(4),
            transcripts(4),
            Arc::new(EchoGenerator::new("es", PRODUCT_MD)),
        )
        .with_storage(Arc::clone(&storage));
        let req = full_request("spanish");

        let outcome = orch.run_full(&req, &CancellationToken::new(), Utc::now()).await.unwrap();
        assert!(outcome.succeeded(), "state: {:?}", outcome.record.failure);
        assert_eq!(outcome.record.candidates.as_ref().unwrap().len(), 3);
        assert_eq!(outcome.record.market.len(), 1);
        assert_eq!(outcome.record.market[0].language, "spanish");

        let tag = outcome.record.target.clone().unwrap();
        let paths = outcome.record.artifact_paths();
        for expected in [
            "funnel/blueprint.en.json".to_string(),
            "funnel/blueprint.source.json".to_string(),
            "funnel/source.md".to_string(),
            format!("funnel/blueprint.{tag}.json"),
            "funnel/page_brief.md".to_string(),
            format!("product/product.{tag}.json"),
            format!("product/product.{tag}.md"),
            "product/product.en.json".to_string(),
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
        let brief = std::fs::read_to_string(outcome.run_dir.join("funnel/page_brief.md")).unwrap();
        assert!(brief.contains("[es] "));

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, "DONE");
        assert_eq!(runs[0].workflow, "full");
        assert_eq!(runs[0].topic.as_deref(), Some("sleep"));
    }

    #[tokio::test]
    async fn unpriced_page_fails_extract_and_keeps_research() {
        let root = temp_root();
        let orch = orchestrator_on(
            &root,
            UNPRICED_PAGE,
            StaticSearch::with_videos(4),
            transcripts(4),
            Arc::new(EchoGenerator::new("es", PRODUCT_MD)),
        );

        let outcome = orch
            .run_full(&full_request("spanish"), &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.record.state, RunState::Failed(Stage::Extract));
        let failure = outcome.record.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Some(Stage::Extract));
        assert_eq!(failure.cause.kind, "blueprint_incomplete");
        assert!(failure.cause.message.contains("price"));
        for rel in RESEARCH_OUTPUTS {
            assert!(failure.usable_artifacts.contains(&rel.to_string()), "missing {rel}");
            assert!(outcome.run_dir.join(rel).exists(), "{rel} not on disk");
        }
        assert!(!outcome.run_dir.join("funnel").exists());
        assert_eq!(outcome.record.stage(Stage::Translate).unwrap().status, StageStatus::Pending);

        let on_disk = load_record(&outcome.run_dir).unwrap();
        assert_eq!(on_disk.product.as_ref().unwrap().title, "Deep Sleep Protocol");
        assert!(on_disk.source_blueprint.is_none());
        verify_artifacts(&outcome.run_dir, &on_disk).unwrap();
        let report = std::fs::read_to_string(&outcome.report_path).unwrap();
        assert!(report.contains("FAILED(EXTRACT)"));
    }

    #[tokio::test]
    async fn empty_translation_fails_translate_and_keeps_funnel() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(4),
            transcripts(4),
            Arc::new(BlankTranslations(EchoGenerator::new("es", PRODUCT_MD))),
        );

        let outcome = orch
            .run_full(&full_request("spanish"), &CancellationToken::new(), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.record.state, RunState::Failed(Stage::Translate));
        let translate = outcome.record.stage(Stage::Translate).unwrap();
        assert_eq!(translate.status, StageStatus::Failed);
        assert_eq!(
            translate.error.as_ref().unwrap().kind,
            "content_generation_failed"
        );
        assert_eq!(outcome.record.stage(Stage::Extract).unwrap().status, StageStatus::Done);

        let failure = outcome.record.failure.as_ref().unwrap();
        let expected = RESEARCH_OUTPUTS
            .iter()
            .chain(&["funnel/blueprint.source.json", "funnel/blueprint.en.json"]);
        for rel in expected {
            assert!(failure.usable_artifacts.contains(&rel.to_string()), "missing {rel}");
            assert!(outcome.run_dir.join(rel).exists(), "{rel} not on disk");
        }
        assert!(outcome.record.localized_blueprint.is_none());
        assert!(outcome.record.localized_products.is_empty());
        let tag = outcome.record.target.clone().unwrap();
        assert!(!outcome.run_dir.join(format!("funnel/blueprint.{tag}.json")).exists());
    }

    #[tokio::test]
    async fn incomplete_supplied_product_is_rejected_up_front() {
        let root = temp_root();
        let text = Arc::new(ScriptedGenerator::new(Vec::new()));
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            text.clone(),
        );
        let mut req = clone_request();
        let mut empty = product();
        empty.title.clear();
        empty.sections.clear();
        req.product = Some(empty);

        let err = orch.run_clone(&req, &CancellationToken::new(), Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(text.calls(), 0);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn failure_outside_a_stage_still_writes_the_report() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            Arc::new(ScriptedGenerator::new(Vec::new())),
        );
        let cancel = CancellationToken::new();
        let run = orch.start(Workflow::Market, &cancel, Utc::now()).await.unwrap();

        let outcome = orch
            .finish(run, Err(FunnelError::validation("disk full")))
            .await
            .unwrap();

        assert_eq!(outcome.record.state, RunState::Aborted);
        let failure = outcome.record.failure.as_ref().unwrap();
        assert_eq!(failure.stage, None);
        assert_eq!(failure.cause.kind, "validation_error");
        assert!(outcome.report_path.exists());
        let on_disk = load_record(&outcome.run_dir).unwrap();
        assert_eq!(on_disk.state, RunState::Aborted);
        assert!(on_disk.finished_at.is_some());
    }

    #[tokio::test]
    async fn unknown_target_market_is_rejected_up_front() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            Arc::new(EchoGenerator::new("x", PRODUCT_MD)),
        );
        let mut req = clone_request();
        req.target_language = "klingon".into();
        let err = orch.run_clone(&req, &CancellationToken::new(), Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_stage() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(2),
            transcripts(2),
            Arc::new(EchoGenerator::new("en", PRODUCT_MD)),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orch.run_research(&research("sleep"), &cancel, Utc::now()).await.unwrap();
        assert_eq!(outcome.record.state, RunState::Cancelled);
        assert!(outcome.record.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert!(outcome.report_path.exists());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_stage() {
        let root = temp_root();
        let slow = (1..=2).fold(transcripts(2), |t, i| {
            t.delayed(&video_id(i), Duration::from_secs(20))
        });
        let orch = orchestrator(
            &root,
            StaticSearch::with_videos(2),
            slow,
            Arc::new(EchoGenerator::new("en", PRODUCT_MD)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            orch.run_research(&research("sleep"), &cancel, Utc::now()),
        )
        .await
        .expect("cancellation should end the run promptly")
        .unwrap();

        assert_eq!(outcome.record.state, RunState::Cancelled);
        assert_eq!(outcome.record.stage(Stage::Discover).unwrap().status, StageStatus::Done);
        let failure = outcome.record.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Some(Stage::Fetch));
        assert_eq!(failure.cause.kind, "cancelled");
        assert!(outcome.record.corpus.is_none());
    }

    #[tokio::test]
    async fn market_comparison_is_recorded() {
        let root = temp_root();
        let orch = orchestrator(
            &root,
            StaticSearch::failing(),
            transcripts(0),
            Arc::new(ScriptedGenerator::new(vec![])),
        );
        let req = MarketRequest {
            niche: Some("sleep".into()),
            target_language: "english".into(),
            compare: true,
        };

        let outcome = orch.run_market(&req, &CancellationToken::new(), Utc::now()).await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.record.market.len(), 5);
        assert_eq!(outcome.record.market[0].language, "italian");
        let table = std::fs::read_to_string(outcome.run_dir.join("market/market.md")).unwrap();
        assert!(table.contains("portuguese"));
    }
}
