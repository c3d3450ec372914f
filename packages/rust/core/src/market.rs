//! Market gap analysis over a fixed table of language markets.
//!
//! Everything here is pure: no collaborator calls, no clock.

use funnelport_shared::{MarketAnalysis, Saturation};

/// One language market.
#[derive(Debug, Clone, Copy)]
pub struct Market {
    pub language: &'static str,
    pub code: &'static str,
    pub countries: &'static [&'static str],
    pub saturation: Saturation,
}

pub const MARKETS: &[Market] = &[
    Market {
        language: "english",
        code: "en",
        countries: &["US", "UK", "CA", "AU"],
        saturation: Saturation::High,
    },
    Market {
        language: "french",
        code: "fr",
        countries: &["FR", "BE", "CH", "CA"],
        saturation: Saturation::Medium,
    },
    Market {
        language: "german",
        code: "de",
        countries: &["DE", "AT", "CH"],
        saturation: Saturation::Medium,
    },
    Market {
        language: "spanish",
        code: "es",
        countries: &["ES", "MX", "AR", "CO"],
        saturation: Saturation::Medium,
    },
    Market {
        language: "italian",
        code: "it",
        countries: &["IT"],
        saturation: Saturation::Low,
    },
    Market {
        language: "portuguese",
        code: "pt",
        countries: &["PT", "BR"],
        saturation: Saturation::Low,
    },
];

/// Niches considered by [`suggest_niches`].
pub const NICHES: &[&str] = &[
    "sleep",
    "productivity",
    "fitness",
    "weight loss",
    "relationships",
    "dating",
    "money",
    "investing",
    "business",
    "side hustle",
    "mental health",
    "anxiety",
    "confidence",
    "communication",
    "parenting",
];

const HIGH_DEMAND: &[&str] = &["sleep", "productivity", "fitness", "money", "anxiety"];

pub fn find_market(language: &str) -> Option<&'static Market> {
    let language = language.trim().to_lowercase();
    MARKETS.iter().find(|m| m.language == language)
}

fn base_score(saturation: Saturation) -> u8 {
    match saturation {
        Saturation::Low => 8,
        Saturation::Medium => 7,
        Saturation::High | Saturation::Unknown => 5,
    }
}

/// Opportunity score in 1..=10.
pub fn opportunity_score(niche: &str, saturation: Saturation) -> u8 {
    let niche = niche.trim().to_lowercase();
    let bonus = u8::from(HIGH_DEMAND.contains(&niche.as_str()));
    (base_score(saturation) + bonus).clamp(1, 10)
}

/// Assess `niche` in the `language` market.
///
/// Markets outside the built-in table are scored as unknown saturation.
pub fn analyze_gap(niche: &str, language: &str) -> MarketAnalysis {
    let niche = niche.trim().to_string();
    let language = language.trim().to_lowercase();
    let market = find_market(&language);
    let saturation = market.map_or(Saturation::Unknown, |m| m.saturation);
    let countries: Vec<String> = market
        .map(|m| m.countries.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();

    let google = match market {
        Some(m) => format!("Search Google.{} for '{niche}' in {language}", m.code),
        None => format!("Search Google for '{niche}' in {language}"),
    };
    let ad_library = if countries.is_empty() {
        "Check Facebook Ad Library for active ads in the target countries".to_string()
    } else {
        format!("Check Facebook Ad Library for {}", countries.join(", "))
    };

    MarketAnalysis {
        opportunity_score: opportunity_score(&niche, saturation),
        research_steps: vec![
            google,
            ad_library,
            format!("Search Gumroad and Etsy for '{niche}' products in {language}"),
            "Analyze the top 3 competitors' offers and funnels".into(),
            "Check pricing in the local currency".into(),
        ],
        tools: vec![
            match market {
                Some(m) => format!("Google Search ({})", m.code),
                None => "Google Search".into(),
            },
            "Facebook Ad Library".into(),
            "Gumroad".into(),
            "Etsy".into(),
        ],
        code: market.map(|m| m.code.to_string()),
        niche,
        language,
        countries,
        saturation,
    }
}

/// Every non-English built-in market for `niche`, best opportunity first.
pub fn compare_markets(niche: &str) -> Vec<MarketAnalysis> {
    let mut analyses: Vec<_> = MARKETS
        .iter()
        .filter(|m| m.language != "english")
        .map(|m| analyze_gap(niche, m.language))
        .collect();
    analyses.sort_by(|a, b| {
        b.opportunity_score
            .cmp(&a.opportunity_score)
            .then_with(|| a.language.cmp(&b.language))
    });
    analyses
}

/// Built-in niches scored for `language`, best first, ties by name.
pub fn suggest_niches(language: &str) -> Vec<(String, u8)> {
    let saturation = find_market(language).map_or(Saturation::Unknown, |m| m.saturation);
    let mut scored: Vec<_> = NICHES
        .iter()
        .map(|n| (n.to_string(), opportunity_score(n, saturation)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
}
