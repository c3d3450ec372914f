//! TRANSLATE stage: dialect-aware translation of documents and blueprints.
//!
//! Every text field is sent on its own so counts and order survive the
//! round trip. Prices are converted locally, never by the model.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use funnelport_shared::{
    FaqEntry, FunnelBlueprint, FunnelError, LocaleProfile, LocaleTable, ProductDocument, Result,
    Section,
};

use crate::collaborators::TextGenerator;
use crate::recreate::clean_reply;

const FIELD_TOKENS: u32 = 1000;
const BODY_TOKENS: u32 = 4000;

pub struct Translator {
    text: Arc<dyn TextGenerator>,
    locales: LocaleTable,
}

fn translation_prompt(kind: &str, text: &str, profile: &LocaleProfile) -> String {
    let mut prompt = format!(
        "Translate the following {kind} from English to {}.\n\n",
        profile.display_name
    );
    if !profile.notes.is_empty() {
        prompt.push_str(&format!("Dialect notes: {}\n", profile.notes));
    }
    prompt.push_str(profile.formality.instruction());
    prompt.push_str(
        "\n\nRules:\n\
         - Keep the same emotional intensity and persuasive power\n\
         - Adapt idioms and cultural references for native readers\n\
         - Keep Markdown formatting, numbers and line breaks\n\
         - Return ONLY the translation, no explanations\n\n",
    );
    prompt.push_str("TEXT:\n");
    prompt.push_str(text);
    prompt
}

impl Translator {
    pub fn new(text: Arc<dyn TextGenerator>, locales: LocaleTable) -> Self {
        Self { text, locales }
    }

    pub fn resolve(&self, language: &str, dialect: Option<&str>) -> Result<&LocaleProfile> {
        self.locales.resolve(language, dialect)
    }

    async fn field(&self, kind: &str, text: &str, profile: &LocaleProfile, max_tokens: u32) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let prompt = translation_prompt(kind, text, profile);
        let translated = clean_reply(&self.text.complete(&prompt, max_tokens).await?);
        if translated.is_empty() {
            return Err(FunnelError::generation(format!(
                "empty {} translation of {kind}",
                profile.tag()
            )));
        }
        debug!(kind, chars = translated.chars().count(), "field translated");
        Ok(translated)
    }

    /// Translate `doc` into the resolved locale.
    pub async fn translate_document(
        &self,
        doc: &ProductDocument,
        language: &str,
        dialect: Option<&str>,
    ) -> Result<ProductDocument> {
        let profile = self.resolve(language, dialect)?;
        self.translate_document_to(doc, profile).await
    }

    /// Translate `bp` into the resolved locale.
    pub async fn translate_blueprint(
        &self,
        bp: &FunnelBlueprint,
        language: &str,
        dialect: Option<&str>,
    ) -> Result<FunnelBlueprint> {
        let profile = self.resolve(language, dialect)?;
        self.translate_blueprint_to(bp, profile).await
    }

    #[instrument(skip_all, fields(locale = %profile.tag(), sections = doc.sections.len()))]
    pub async fn translate_document_to(
        &self,
        doc: &ProductDocument,
        profile: &LocaleProfile,
    ) -> Result<ProductDocument> {
        doc.check_complete()?;
        let title = self.field("product title", &doc.title, profile, FIELD_TOKENS).await?;
        let summary = match &doc.summary {
            Some(s) => Some(self.field("product summary", s, profile, FIELD_TOKENS).await?),
            None => None,
        };

        let mut sections = Vec::with_capacity(doc.sections.len());
        for section in &doc.sections {
            sections.push(Section {
                title: self.field("section title", &section.title, profile, FIELD_TOKENS).await?,
                body: self.field("section body", &section.body, profile, BODY_TOKENS).await?,
            });
        }

        info!(title = %title, "document translated");
        Ok(ProductDocument {
            topic: doc.topic.clone(),
            format: doc.format.clone(),
            tone: doc.tone.clone(),
            language: profile.tag(),
            title,
            summary,
            sections,
            price: doc.price.as_ref().map(|p| profile.convert_price(p)),
        })
    }

    #[instrument(skip_all, fields(locale = %profile.tag(), bullets = bp.bullets.len()))]
    pub async fn translate_blueprint_to(
        &self,
        bp: &FunnelBlueprint,
        profile: &LocaleProfile,
    ) -> Result<FunnelBlueprint> {
        let headline = self.field("sales-page headline", &bp.headline, profile, FIELD_TOKENS).await?;
        let subheadline = self.field("sales-page subheadline", &bp.subheadline, profile, FIELD_TOKENS).await?;

        let mut bullets = Vec::with_capacity(bp.bullets.len());
        for bullet in &bp.bullets {
            bullets.push(self.field("bullet point", bullet, profile, FIELD_TOKENS).await?);
        }

        let cta = self.field("call to action", &bp.cta, profile, FIELD_TOKENS).await?;

        let mut testimonials = Vec::with_capacity(bp.testimonials.len());
        for testimonial in &bp.testimonials {
            testimonials.push(self.field("customer testimonial", testimonial, profile, FIELD_TOKENS).await?);
        }

        let mut faq = Vec::with_capacity(bp.faq.len());
        for entry in &bp.faq {
            faq.push(FaqEntry {
                question: self.field("FAQ question", &entry.question, profile, FIELD_TOKENS).await?,
                answer: self.field("FAQ answer", &entry.answer, profile, FIELD_TOKENS).await?,
            });
        }

        Ok(FunnelBlueprint {
            source_url: bp.source_url.clone(),
            language: profile.tag(),
            topic: bp.topic.clone(),
            headline,
            subheadline,
            bullets,
            price: profile.convert_price(&bp.price),
            cta,
            testimonials,
            faq,
            structure: bp.structure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoGenerator, SALES_PAGE, ScriptedGenerator};
    use funnelport_shared::Price;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn translator(text: Arc<dyn TextGenerator>) -> Translator {
        Translator::new(text, LocaleTable::default())
    }

    fn doc() -> ProductDocument {
        ProductDocument {
            topic: "sleep".into(),
            format: "guide".into(),
            tone: "casual".into(),
            language: "english".into(),
            title: "Deep Sleep".into(),
            summary: None,
            sections: vec![
                Section {
                    title: "Night 1".into(),
                    body: "Dim the lights.".into(),
                },
                Section {
                    title: "Night 2".into(),
                    body: "Cut caffeine.".into(),
                },
            ],
            price: Some(Price {
                amount: Decimal::from(27),
                currency: "USD".into(),
            }),
        }
    }

    #[tokio::test]
    async fn document_keeps_sections_and_converts_price() {
        let t = translator(Arc::new(EchoGenerator::new("pt", "")));
        let source = doc();
        let out = t.translate_document(&source, "portuguese", Some("brazilian")).await.unwrap();

        assert_eq!(out.language, "portuguese-brazilian");
        assert_eq!(out.title, "[pt] Deep Sleep");
        let titles: Vec<_> = out.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["[pt] Night 1", "[pt] Night 2"]);
        assert_eq!(out.sections[1].body, "[pt] Cut caffeine.");
        let price = out.price.unwrap();
        assert_eq!(price.amount, Decimal::from_str("10.8").unwrap());
        assert_eq!(price.currency, "BRL");
        assert_eq!(source, doc());
    }

    #[tokio::test]
    async fn prompts_carry_dialect_instructions() {
        let text = Arc::new(ScriptedGenerator::new(
            (0..5).map(|i| Ok(format!("t{i}"))).collect(),
        ));
        let t = translator(text.clone());
        t.translate_document(&doc(), "portuguese", None).await.unwrap();

        assert_eq!(text.calls(), 5);
        let profile = LocaleTable::default().resolve("portuguese", None).unwrap().clone();
        let first = &text.prompts()[0];
        assert!(first.contains(&format!("to {}", profile.display_name)));
        assert!(first.contains(profile.formality.instruction()));
        assert!(first.ends_with("TEXT:\nDeep Sleep"));
    }

    #[tokio::test]
    async fn blueprint_translates_every_field() {
        let t = translator(Arc::new(EchoGenerator::new("es", "")));
        let source = funnelport_funnel::extract(SALES_PAGE, "https://sleep.example/").unwrap();
        let out = t.translate_blueprint(&source, "spanish", None).await.unwrap();

        assert_eq!(out.bullets.len(), source.bullets.len());
        assert!(out.bullets.iter().all(|b| b.starts_with("[es] ")));
        assert_eq!(out.testimonials.len(), source.testimonials.len());
        assert_eq!(out.faq.len(), source.faq.len());
        assert!(out.faq[0].question.starts_with("[es] "));
        assert!(out.cta.starts_with("[es] "));
        let profile = LocaleTable::default().resolve("spanish", None).unwrap().clone();
        assert_eq!(out.price, profile.convert_price(&source.price));
        assert_eq!(out.language, profile.tag());
        assert_eq!(out.structure, source.structure);
        assert_eq!(source.language, "english");
    }

    #[tokio::test]
    async fn incomplete_document_is_rejected_before_any_call() {
        let text = Arc::new(ScriptedGenerator::new(Vec::new()));
        let t = translator(text.clone());
        let mut source = doc();
        source.sections.clear();

        let err = t.translate_document(&source, "spanish", None).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_locale_is_configuration_error() {
        let t = translator(Arc::new(EchoGenerator::new("x", "")));
        let err = t.translate_document(&doc(), "klingon", None).await.unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        let err = t.translate_document(&doc(), "portuguese", Some("martian")).await.unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }
}
