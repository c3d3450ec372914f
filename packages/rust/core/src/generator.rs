//! GENERATE stage: product content from the research corpus.
//!
//! The model is asked for Markdown with a `# Title`, an optional `> summary`
//! and `## Section` headings. The response is parsed strictly; anything
//! without a title or a titled section is rejected.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, instrument, warn};

use funnelport_shared::{
    FunnelError, GenerationConfig, ProductDocument, ResearchCorpus, Result, Section,
};

use crate::collaborators::TextGenerator;

pub struct ContentGenerator {
    text: Arc<dyn TextGenerator>,
    config: GenerationConfig,
}

impl ContentGenerator {
    pub fn new(text: Arc<dyn TextGenerator>, config: GenerationConfig) -> Self {
        Self { text, config }
    }

    /// One completion, with a single extra attempt after `retry_backoff`
    /// when the collaborator is unavailable.
    pub(crate) async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        match self.text.complete(prompt, max_tokens).await {
            Err(e) if e.is_retryable() => {
                warn!(
                    error = %e,
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "generation failed, retrying once"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                self.text.complete(prompt, max_tokens).await
            }
            other => other,
        }
    }

    /// Write a product on `topic` from the usable corpus entries.
    #[instrument(skip_all, fields(%topic, %format, %tone, usable = corpus.usable_count()))]
    pub async fn generate(
        &self,
        topic: &str,
        corpus: &ResearchCorpus,
        format: &str,
        tone: &str,
    ) -> Result<ProductDocument> {
        if corpus.usable_count() == 0 {
            return Err(FunnelError::InsufficientResearch {
                requested: corpus.entries.len(),
            });
        }

        let prompt = build_product_prompt(topic, corpus, format, tone, &self.config);
        let response = self.complete(&prompt, self.config.max_tokens).await?;
        let parsed = parse_product_markdown(&response)?;

        info!(
            title = %parsed.title,
            sections = parsed.sections.len(),
            "product generated"
        );
        Ok(ProductDocument {
            topic: topic.to_string(),
            format: format.to_string(),
            tone: tone.to_string(),
            language: "english".into(),
            title: parsed.title,
            summary: parsed.summary,
            sections: parsed.sections,
            price: None,
        })
    }

    /// Up to `n` short customer testimonials in `language`.
    #[instrument(skip(self))]
    pub async fn generate_testimonials(&self, topic: &str, language: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let prompt = format!(
            "Generate {n} realistic customer testimonials for a product about {topic} in {language}.\n\n\
             Requirements:\n\
             - Make them feel authentic and varied\n\
             - Include specific results or outcomes\n\
             - Vary the length and the customer persona\n\
             - Focus on the transformation\n\n\
             Format as a numbered list, one testimonial per line, nothing else."
        );
        let response = self.complete(&prompt, 2000).await?;
        Ok(parse_list(&response, n))
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

fn build_product_prompt(
    topic: &str,
    corpus: &ResearchCorpus,
    format: &str,
    tone: &str,
    config: &GenerationConfig,
) -> String {
    let excerpts = corpus
        .usable()
        .take(config.max_excerpts)
        .enumerate()
        .map(|(i, (candidate, text))| {
            let title = if candidate.resource.title.is_empty() {
                candidate.resource.url.as_str()
            } else {
                candidate.resource.title.as_str()
            };
            format!(
                "### Source {}: {title}\n\n{}",
                i + 1,
                truncate_chars(text, config.excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are an expert content creator specializing in {topic}.\n\n\
         Create a {format} on {topic} based on this research.\n\n\
         RESEARCH DATA:\n\n{excerpts}\n\n\
         REQUIREMENTS:\n\
         - Format: {format}\n\
         - Tone: {tone}\n\
         - Target length: ~{pages} pages\n\
         - Make it actionable and structured, with checklists and step-by-step instructions\n\
         - Make it feel like a system, not a course\n\n\
         OUTPUT FORMAT (Markdown, nothing before or after):\n\
         # <product title>\n\
         > <one-sentence summary>\n\n\
         ## <section title>\n\
         <section body>\n\n\
         Repeat `## ` sections as needed.",
        pages = config.pages
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub(crate) struct ParsedProduct {
    pub title: String,
    pub summary: Option<String>,
    pub sections: Vec<Section>,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the generator's Markdown response.
pub(crate) fn parse_product_markdown(text: &str) -> Result<ParsedProduct> {
    let mut title: Option<String> = None;
    let mut summary: Vec<String> = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut body: Vec<&str> = Vec::new();

    let flush = |sections: &mut Vec<Section>, body: &mut Vec<&str>| {
        if let Some(last) = sections.last_mut() {
            last.body = body.join("\n").trim().to_string();
        }
        body.clear();
    };

    for line in strip_code_fence(text).lines() {
        if let Some(h) = line.strip_prefix("## ") {
            flush(&mut sections, &mut body);
            let section_title = h.trim();
            if section_title.is_empty() {
                return Err(FunnelError::generation("section without a title"));
            }
            sections.push(Section {
                title: section_title.to_string(),
                body: String::new(),
            });
        } else if let Some(h) = line.strip_prefix("# ") {
            if title.is_none() && sections.is_empty() {
                title = Some(h.trim().to_string());
            } else if !sections.is_empty() {
                body.push(line);
            }
        } else if sections.is_empty() {
            if let (Some(_), Some(quote)) = (&title, line.strip_prefix('>')) {
                summary.push(quote.trim().to_string());
            }
        } else {
            body.push(line);
        }
    }
    flush(&mut sections, &mut body);

    let title = title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FunnelError::generation("response has no `# ` title"))?;
    if sections.is_empty() {
        return Err(FunnelError::generation("response has no `## ` sections"));
    }

    let summary = summary.join(" ").trim().to_string();
    Ok(ParsedProduct {
        title,
        summary: (!summary.is_empty()).then_some(summary),
        sections,
    })
}

/// Non-empty list items with numbering and bullets stripped, at most `n`.
pub(crate) fn parse_list(text: &str, n: usize) -> Vec<String> {
    static MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").expect("valid regex"));
    text.lines()
        .map(|line| MARKER_RE.replace(line, "").trim().to_string())
        .filter(|line| line.chars().any(char::is_alphabetic))
        .take(n)
        .collect()
}
