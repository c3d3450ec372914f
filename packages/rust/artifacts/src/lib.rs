//! Pure renderers for the human-facing files of a run directory.
//!
//! - [`render_product_markdown`]: a Product Document as Markdown
//! - [`render_page_brief`]: the brief handed to the page-builder
//! - [`render_report`]: the final `report.md`
//!
//! Nothing here touches the filesystem; the core assembler writes the output.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use funnelport_shared::{
    FunnelBlueprint, FunnelStructure, LocaleProfile, MarketAnalysis, Price, ProductDocument,
    RunRecord, StageStatus,
};

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Price with the locale's symbol and fixed minor-unit digits, e.g. `R$ 10.80`.
pub fn format_price(price: &Price, profile: &LocaleProfile) -> String {
    let symbol = if price.currency == profile.currency {
        profile.currency_symbol.as_str()
    } else {
        price.currency.as_str()
    };
    let digits = profile.minor_units as usize;
    format!("{symbol} {:.digits$}", price.amount.round_dp(profile.minor_units))
}

fn footer(out: &mut String, tool_version: &str) {
    let _ = write!(out, "\n---\n\n_Generated by funnelport v{tool_version}_\n");
}

// ---------------------------------------------------------------------------
// Product document
// ---------------------------------------------------------------------------

pub fn render_product_markdown(doc: &ProductDocument) -> String {
    let mut out = format!("# {}\n\n", doc.title);
    if let Some(summary) = &doc.summary {
        let _ = writeln!(out, "> {summary}\n");
    }
    let _ = writeln!(
        out,
        "_{} · {} · {}_\n",
        doc.format, doc.tone, doc.language
    );
    for section in &doc.sections {
        let _ = writeln!(out, "## {}\n", section.title);
        let body = section.body.trim();
        if !body.is_empty() {
            let _ = writeln!(out, "{body}\n");
        }
    }
    if let Some(price) = &doc.price {
        let _ = writeln!(out, "**Price:** {price}");
    }
    format!("{}\n", out.trim_end())
}

// ---------------------------------------------------------------------------
// Page brief
// ---------------------------------------------------------------------------

fn layout_guidance(structure: FunnelStructure) -> &'static str {
    match structure {
        FunnelStructure::LongFormSalesPage => {
            "Long-form sales page: hero, problem story, benefit list, social proof wall, \
             offer stack, guarantee, FAQ, repeated call to action."
        }
        FunnelStructure::ShortFormSalesPage => {
            "Short-form sales page: hero with the offer above the fold, short benefit list, \
             one call to action."
        }
        FunnelStructure::StandardSalesPage => {
            "Standard sales page: hero, benefit list, offer, FAQ, call to action."
        }
    }
}

/// Instructions for the page-builder collaborator, in the blueprint's language.
pub fn render_page_brief(
    blueprint: &FunnelBlueprint,
    product: Option<&ProductDocument>,
    profile: &LocaleProfile,
) -> String {
    let mut out = String::from("# Landing page brief\n\n");
    let _ = writeln!(out, "- Market: {} (`{}`)", profile.display_name, profile.tag());
    let _ = writeln!(out, "- Structure: {}", blueprint.structure.as_str());
    let _ = writeln!(out, "- Price: {}", format_price(&blueprint.price, profile));
    let _ = writeln!(out, "- Register: {}", profile.formality.instruction());
    let _ = writeln!(out, "- Source page: {}\n", blueprint.source_url);

    let _ = writeln!(out, "## Layout\n\n{}\n", layout_guidance(blueprint.structure));

    let _ = writeln!(out, "## Copy\n");
    let _ = writeln!(out, "### Headline\n\n{}\n", blueprint.headline);
    if !blueprint.subheadline.is_empty() {
        let _ = writeln!(out, "### Subheadline\n\n{}\n", blueprint.subheadline);
    }
    if !blueprint.bullets.is_empty() {
        let _ = writeln!(out, "### Benefits\n");
        for bullet in &blueprint.bullets {
            let _ = writeln!(out, "- {bullet}");
        }
        out.push('\n');
    }
    if !blueprint.cta.is_empty() {
        let _ = writeln!(out, "### Call to action\n\n{}\n", blueprint.cta);
    }
    if !blueprint.testimonials.is_empty() {
        let _ = writeln!(out, "### Testimonials\n");
        for t in &blueprint.testimonials {
            let _ = writeln!(out, "> {t}\n");
        }
    }
    if !blueprint.faq.is_empty() {
        let _ = writeln!(out, "### FAQ\n");
        for entry in &blueprint.faq {
            let _ = writeln!(out, "**{}**\n\n{}\n", entry.question, entry.answer);
        }
    }

    if let Some(doc) = product {
        let _ = writeln!(out, "## Product\n");
        let _ = writeln!(out, "**{}** ({})\n", doc.title, doc.format);
        for (i, section) in doc.sections.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, section.title);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Style notes\n\n{}", profile.notes);
    format!("{}\n", out.trim_end())
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Done => "done",
        StageStatus::Failed => "failed",
    }
}

/// Markdown table of market analyses, highest opportunity first as given.
pub fn render_market_table(analyses: &[MarketAnalysis]) -> String {
    let mut out = String::from("| Market | Niche | Saturation | Score | Countries |\n");
    out.push_str("| --- | --- | --- | --- | --- |\n");
    for a in analyses {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {}/10 | {} |",
            a.language,
            a.niche,
            a.saturation.as_str(),
            a.opportunity_score,
            a.countries.join(", ")
        );
    }
    out
}

/// The final human report: state, stages, failure cause, usable artifacts.
pub fn render_report(record: &RunRecord, tool_version: &str) -> String {
    let mut out = format!("# Run {}\n\n", record.id);
    let _ = writeln!(out, "- Workflow: {}", record.workflow);
    if let Some(topic) = &record.topic {
        let _ = writeln!(out, "- Topic: {topic}");
    }
    if let Some(url) = &record.funnel_url {
        let _ = writeln!(out, "- Funnel: {url}");
    }
    if let Some(target) = &record.target {
        let _ = writeln!(out, "- Target market: {target}");
    }
    let _ = writeln!(out, "- State: **{}**", record.state.label());
    let _ = writeln!(out, "- Started: {}", record.started_at.to_rfc3339());
    if let Some(finished) = record.finished_at {
        let _ = writeln!(out, "- Finished: {}", finished.to_rfc3339());
    }
    out.push('\n');

    if !record.stages.is_empty() {
        out.push_str("## Stages\n\n| Stage | Status | Attempts | Elapsed |\n| --- | --- | --- | --- |\n");
        for entry in &record.stages {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} ms |",
                entry.stage,
                status_label(entry.status),
                entry.attempts,
                entry.elapsed_ms
            );
        }
        out.push('\n');
    }

    if let Some(failure) = &record.failure {
        out.push_str("## Failure\n\n");
        if let Some(stage) = failure.stage {
            let _ = writeln!(out, "- Failed stage: {stage}");
        }
        let _ = writeln!(out, "- Cause: `{}`: {}", failure.cause.kind, failure.cause.message);
        if failure.usable_artifacts.is_empty() {
            out.push_str("- No artifacts were produced before the failure.\n");
        } else {
            out.push_str("- Still usable:\n");
            for path in &failure.usable_artifacts {
                let _ = writeln!(out, "  - `{path}`");
            }
        }
        out.push('\n');
    }

    if let Some(candidates) = &record.candidates {
        let _ = writeln!(out, "## Research\n\n{} candidates selected.\n", candidates.len());
        for c in candidates {
            let _ = writeln!(
                out,
                "- {:.3} {} ({})",
                c.score, c.resource.title, c.resource.url
            );
        }
        if let Some(corpus) = &record.corpus {
            let _ = writeln!(
                out,
                "\nTranscripts: {} usable, {} unavailable.",
                corpus.usable_count(),
                corpus.absent_count()
            );
        }
        out.push('\n');
    }

    if !record.market.is_empty() {
        out.push_str("## Market\n\n");
        out.push_str(&render_market_table(&record.market));
        out.push('\n');
    }

    if !record.artifacts.is_empty() {
        out.push_str("## Artifacts\n\n");
        for a in &record.artifacts {
            let _ = writeln!(out, "- `{}` ({})", a.path, &a.sha256[..a.sha256.len().min(12)]);
        }
    }

    footer(&mut out, tool_version);
    out
}
