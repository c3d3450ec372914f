//! Structured extraction of a sales page.
//!
//! Each field is tried against an ordered selector list; the first non-empty
//! match wins. Headline and price are required, everything else defaults
//! to empty.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use funnelport_shared::{FaqEntry, FunnelBlueprint, FunnelError, FunnelStructure, Result};

use crate::price::parse_price;

/// Upper bound on extracted bullets.
const MAX_BULLETS: usize = 20;

/// Upper bound on extracted testimonials.
const MAX_TESTIMONIALS: usize = 20;

/// Bullet text outside this length range is navigation or body copy.
const BULLET_CHARS: std::ops::RangeInclusive<usize> = 3..=300;

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
}

static HEADLINE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "h1",
        ".headline",
        "#headline",
        "[class*=hero] h2",
        "title",
    ])
});

static SUBHEADLINE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".subheadline",
        ".sub-headline",
        ".subtitle",
        "h1 + p",
        "h2",
    ])
});

static BULLETS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").expect("li"));

static PRICE: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".price", "[class*=price]", "[id*=price]"]));

static CTA: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".cta",
        "[class*=cta]",
        "a[class*=btn]",
        "a[class*=button]",
        "button",
    ])
});

static SUBMIT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[type=submit]").expect("submit"));

static TESTIMONIALS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".testimonial",
        "[class*=testimonial-item]",
        "[class*=review-item]",
        "blockquote",
    ])
});

static FAQ_DETAILS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("details").expect("details"));
static FAQ_SUMMARY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("summary").expect("summary"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("body"));

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Visible text of an element with whitespace collapsed, skipping script/style.
fn text_of(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn within_chrome(el: ElementRef<'_>) -> bool {
    el.ancestors().any(|a| {
        a.value()
            .as_element()
            .is_some_and(|e| matches!(e.name(), "nav" | "footer"))
    })
}

fn first_text(doc: &Html, list: &[Selector], skip: Option<&str>) -> Option<String> {
    list.iter().find_map(|sel| {
        doc.select(sel)
            .map(text_of)
            .find(|t| !t.is_empty() && Some(t.as_str()) != skip)
    })
}

fn push_unique(out: &mut Vec<String>, text: String) {
    if !out.iter().any(|existing| existing == &text) {
        out.push(text);
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Parse a scraped landing page into a blueprint.
///
/// Fails with [`FunnelError::BlueprintIncomplete`] when the headline or price
/// cannot be found.
#[instrument(skip(html), fields(url = %source_url))]
pub fn extract(html: &str, source_url: &str) -> Result<FunnelBlueprint> {
    let doc = Html::parse_document(html);

    let headline =
        first_text(&doc, &HEADLINE, None).ok_or_else(|| FunnelError::incomplete("headline"))?;
    let subheadline = first_text(&doc, &SUBHEADLINE, Some(&headline)).unwrap_or_default();

    let mut bullets = Vec::new();
    for li in doc.select(&BULLETS) {
        if bullets.len() == MAX_BULLETS {
            break;
        }
        if within_chrome(li) {
            continue;
        }
        let text = text_of(li);
        if BULLET_CHARS.contains(&text.chars().count()) {
            push_unique(&mut bullets, text);
        }
    }

    let price = PRICE
        .iter()
        .flat_map(|sel| doc.select(sel))
        .find_map(|el| parse_price(&text_of(el)))
        .or_else(|| doc.select(&BODY).next().and_then(|b| parse_price(&text_of(b))))
        .ok_or_else(|| FunnelError::incomplete("price"))?;

    let cta = CTA
        .iter()
        .flat_map(|sel| doc.select(sel))
        .filter(|el| !within_chrome(*el))
        .map(text_of)
        .find(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&SUBMIT)
                .find_map(|el| el.value().attr("value"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or_default();

    let mut testimonials = Vec::new();
    for sel in TESTIMONIALS.iter() {
        for el in doc.select(sel).take(MAX_TESTIMONIALS) {
            let text = text_of(el);
            if !text.is_empty() {
                push_unique(&mut testimonials, text);
            }
        }
        if !testimonials.is_empty() {
            break;
        }
    }

    let faq = doc
        .select(&FAQ_DETAILS)
        .filter_map(|details| {
            let summary = details.select(&FAQ_SUMMARY).next()?;
            let question = text_of(summary);
            let full = text_of(details);
            let answer = full
                .strip_prefix(question.as_str())
                .unwrap_or(&full)
                .trim()
                .to_string();
            (!question.is_empty()).then_some(FaqEntry { question, answer })
        })
        .collect::<Vec<_>>();

    let structure = FunnelStructure::classify(bullets.len(), !testimonials.is_empty());

    debug!(
        bullets = bullets.len(),
        testimonials = testimonials.len(),
        faq = faq.len(),
        structure = structure.as_str(),
        price = %price,
        "blueprint extracted"
    );

    Ok(FunnelBlueprint {
        source_url: source_url.to_string(),
        language: "english".into(),
        topic: None,
        headline,
        subheadline,
        bullets,
        price,
        cta,
        testimonials,
        faq,
        structure,
    })
}
