//! Text normalization for research and reference copy.
//!
//! - [`page_to_markdown`] turns a scraped landing page into clean Markdown copy,
//!   used as reference material when recreating a funnel for a new topic.
//! - [`clean_transcript`] strips caption noise from fetched transcripts.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use funnelport_shared::{FunnelError, Result};

// ---------------------------------------------------------------------------
// Page copy
// ---------------------------------------------------------------------------

/// Result of converting a landing page to Markdown copy.
#[derive(Debug, Clone)]
pub struct PageCopy {
    pub markdown: String,
    /// First H1 of the copy, if any.
    pub title: Option<String>,
    pub word_count: usize,
}

/// Tags whose content never belongs in reading copy.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "iframe", "noscript", "svg", "form", "head",
];

/// Convert landing-page HTML into cleaned Markdown copy.
#[instrument(skip(html), fields(url = %source_url))]
pub fn page_to_markdown(html: &str, source_url: &str) -> Result<PageCopy> {
    let content_html = extract_content_html(html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let raw = converter
        .convert(&content_html)
        .map_err(|e| FunnelError::validation(format!("html conversion failed: {e}")))?;

    let markdown = cleanup::run_pipeline(&raw);
    let title = extract_title_from_markdown(&markdown);
    let word_count = markdown.split_whitespace().filter(|w| *w != "#" && *w != "##").count();

    debug!(word_count, len = markdown.len(), "page converted");
    Ok(PageCopy {
        markdown,
        title,
        word_count,
    })
}

/// The main content container, or `<body>` when the page has none.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    for sel_str in ["main", "[role=\"main\"]", "article", "#content", "body"] {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }
    html.to_string()
}

/// Rewrite `<table>` elements as Markdown tables (pricing and comparison grids).
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };

    let mut result = html.to_string();
    for table in doc.select(&table_sel) {
        let md = table_to_markdown(&table);
        result = result.replacen(&table.html(), &md, 1);
    }
    result
}

fn table_to_markdown(table: &scraper::ElementRef<'_>) -> String {
    let (Ok(tr_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return String::new();
    };

    let mut rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|c| {
                    c.text()
                        .collect::<String>()
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
        })
        .filter(|r| !r.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let line = |cells: &[String]| format!("| {} |\n", cells.join(" | "));
    let mut md = String::from("\n\n");
    md.push_str(&line(&rows[0]));
    md.push_str(&line(&vec!["---".to_string(); width]));
    for row in &rows[1..] {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}

fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));
    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

/// Remove caption artifacts (`[Music]`, `>>` speaker marks, timestamps) and
/// collapse whitespace. Returns an empty string for caption-only input.
pub fn clean_transcript(raw: &str) -> String {
    static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\[(?:music|applause|laughter|inaudible|silence|foreign)\]|\(\s*(?:music|applause|laughs)\s*\)|>>")
            .expect("valid regex")
    });
    static TIMESTAMP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(?:\d{1,2}:)?\d{1,2}:\d{2}(?:\.\d+)?\b").expect("valid regex"));

    let text = NOISE_RE.replace_all(raw, " ");
    let text = TIMESTAMP_RE.replace_all(&text, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
