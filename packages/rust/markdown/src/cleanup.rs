//! Post-conversion cleanup for landing-page copy.
//!
//! Each pass is a function `&str -> String` applied in sequence. The output is
//! reading copy for prompts and briefs, so images and link targets are dropped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// A line repeated more often than this (CTA buttons, "Add to cart") is dropped after.
const MAX_LINE_REPEATS: usize = 2;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_images(&result);
    result = unlink(&result);
    result = strip_leftover_html(&result);
    result = normalize_headings(&result);
    result = collapse_repeated_lines(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Images and links
// ---------------------------------------------------------------------------

fn strip_images(md: &str) -> String {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    IMG_RE.replace_all(md, "").to_string()
}

/// `[Buy now](https://...)` becomes `Buy now`.
fn unlink(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
    LINK_RE.replace_all(md, "$1").to_string()
}

fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^>]*)?/?>").expect("valid regex"));
    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// Keep a single H1; later H1s become H2.
fn normalize_headings(md: &str) -> String {
    static H_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    md.lines()
        .map(|line| match H_RE.captures(line) {
            Some(caps) if &caps[1] == "#" => {
                if seen_h1 {
                    format!("## {}", &caps[2])
                } else {
                    seen_h1 = true;
                    line.to_string()
                }
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_repeated_lines(md: &str) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    md.lines()
        .filter(|line| {
            let key = line.trim().to_lowercase();
            if key.is_empty() {
                return true;
            }
            let n = counts.entry(key).or_insert(0);
            *n += 1;
            *n <= MAX_LINE_REPEATS
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of blank lines into one.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    MULTI_BLANK_RE
        .replace_all(md.trim_start_matches('\n'), "\n\n")
        .to_string()
}

fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}
