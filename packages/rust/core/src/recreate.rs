//! Copy recreation: rewrite a scraped blueprint's copy for a new topic.

use std::sync::Arc;

use tracing::{info, instrument};

use funnelport_shared::{FunnelBlueprint, FunnelError, Result};

use crate::collaborators::TextGenerator;

const FIELD_TOKENS: u32 = 500;

pub struct Recreator {
    text: Arc<dyn TextGenerator>,
}

/// Single-field reply with surrounding whitespace and quotes removed.
pub(crate) fn clean_reply(reply: &str) -> String {
    let trimmed = reply.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

impl Recreator {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    async fn rewrite(&self, kind: &str, topic: &str, original: &str) -> Result<String> {
        let prompt = format!(
            "Rewrite this sales-page {kind} for a product about \"{topic}\".\n\n\
             Keep the same structure, hook and length. Keep it in English.\n\
             Return ONLY the rewritten {kind}, nothing else.\n\n\
             TEXT:\n{original}"
        );
        let rewritten = clean_reply(&self.text.complete(&prompt, FIELD_TOKENS).await?);
        if rewritten.is_empty() {
            return Err(FunnelError::generation(format!("empty rewrite of {kind}")));
        }
        Ok(rewritten)
    }

    /// New blueprint with headline, subheadline, bullets and CTA rewritten
    /// for `topic`. Price, structure, testimonials and FAQ carry over.
    #[instrument(skip_all, fields(%topic, bullets = source.bullets.len()))]
    pub async fn recreate_blueprint(&self, source: &FunnelBlueprint, topic: &str) -> Result<FunnelBlueprint> {
        let headline = self.rewrite("headline", topic, &source.headline).await?;
        let subheadline = if source.subheadline.is_empty() {
            String::new()
        } else {
            self.rewrite("subheadline", topic, &source.subheadline).await?
        };

        let mut bullets = Vec::with_capacity(source.bullets.len());
        for bullet in &source.bullets {
            bullets.push(self.rewrite("bullet point", topic, bullet).await?);
        }

        let cta = if source.cta.is_empty() {
            String::new()
        } else {
            self.rewrite("call to action", topic, &source.cta).await?
        };

        info!(%headline, "blueprint recreated");
        Ok(FunnelBlueprint {
            source_url: source.source_url.clone(),
            language: source.language.clone(),
            topic: Some(topic.to_string()),
            headline,
            subheadline,
            bullets,
            price: source.price.clone(),
            cta,
            testimonials: source.testimonials.clone(),
            faq: source.faq.clone(),
            structure: source.structure,
        })
    }
}
