//! Query-string expansion for one topic.

/// Phrase templates applied after the bare topic. `{}` is the topic.
const TEMPLATES: &[&str] = &[
    "{} naturally",
    "{} protocol",
    "{} guide",
    "how to {}",
    "{} explained",
    "{} tips",
    "fix {}",
];

/// The bare topic followed by up to `count - 1` templated variants.
///
/// Variants are deduplicated case-insensitively; order is fixed.
pub fn query_variants(topic: &str, count: usize) -> Vec<String> {
    let topic = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    if topic.is_empty() || count == 0 {
        return Vec::new();
    }

    let mut out: Vec<String> = Vec::with_capacity(count);
    let candidates =
        std::iter::once(topic.clone()).chain(TEMPLATES.iter().map(|t| t.replace("{}", &topic)));
    for q in candidates {
        if out.len() == count {
            break;
        }
        if !out.iter().any(|existing| existing.eq_ignore_ascii_case(&q)) {
            out.push(q);
        }
    }
    out
}
