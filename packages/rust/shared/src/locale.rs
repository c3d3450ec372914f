//! Locale profiles: language, dialect, currency and price policy.
//!
//! Lookup is keyed by `(language, dialect)`. Every dialect tag belongs to
//! exactly one language, and every language has exactly one default dialect.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FunnelError, Result};
use crate::types::Price;

/// One localized market variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleProfile {
    pub language: String,
    pub dialect: String,
    /// Human name used in prompts, e.g. "Brazilian Portuguese".
    pub display_name: String,
    pub currency: String,
    pub currency_symbol: String,
    /// Applied to source prices after translation.
    pub price_multiplier: Decimal,
    /// Decimal places of the currency's minor unit.
    pub minor_units: u32,
    /// Idiom and vocabulary guidance for the translator.
    pub notes: String,
    pub formality: Formality,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Informal,
    Neutral,
    Formal,
}

impl Formality {
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Informal => "Address the reader informally, as a friend would.",
            Self::Neutral => "Keep the register neutral and warm.",
            Self::Formal => "Address the reader formally and respectfully.",
        }
    }
}

/// Currency that locale price multipliers are expressed against.
pub const PRICE_BASE_CURRENCY: &str = "USD";

impl LocaleProfile {
    /// Stable tag used in file names, e.g. `portuguese-brazilian`.
    pub fn tag(&self) -> String {
        format!("{}-{}", self.language, self.dialect)
    }

    /// Convert a source price into this locale's currency.
    ///
    /// `price_multiplier` is relative to [`PRICE_BASE_CURRENCY`]; a source
    /// price in any other currency is still multiplied as if it were USD, with
    /// a warning. Rounds half away from zero to the currency's minor unit.
    pub fn convert_price(&self, price: &Price) -> Price {
        if price.currency != PRICE_BASE_CURRENCY {
            warn!(
                source = %price,
                locale = %self.tag(),
                "source price is not in {PRICE_BASE_CURRENCY}; multiplier applied unchanged"
            );
        }
        let amount = (price.amount * self.price_multiplier).round_dp_with_strategy(
            self.minor_units,
            RoundingStrategy::MidpointAwayFromZero,
        );
        Price {
            amount: amount.normalize(),
            currency: self.currency.clone(),
        }
    }
}

/// `[[locales]]` entry: overrides a built-in profile or adds a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleOverride {
    pub language: String,
    pub dialect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_multiplier: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor_units: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formality: Option<Formality>,
    #[serde(default)]
    pub default: bool,
}

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn profile(
    language: &str,
    dialect: &str,
    display_name: &str,
    currency: &str,
    symbol: &str,
    multiplier: Decimal,
    notes: &str,
    formality: Formality,
    is_default: bool,
) -> LocaleProfile {
    LocaleProfile {
        language: language.into(),
        dialect: dialect.into(),
        display_name: display_name.into(),
        currency: currency.into(),
        currency_symbol: symbol.into(),
        price_multiplier: multiplier,
        minor_units: 2,
        notes: notes.into(),
        formality,
        is_default,
    }
}

fn builtin_profiles() -> Vec<LocaleProfile> {
    use Formality::*;
    vec![
        profile(
            "portuguese",
            "brazilian",
            "Brazilian Portuguese",
            "BRL",
            "R$",
            Decimal::new(4, 1),
            "Use Brazilian expressions and vocabulary: 'você', 'celular', 'ônibus'. \
             Warm, enthusiastic, close to the reader.",
            Informal,
            true,
        ),
        profile(
            "portuguese",
            "european",
            "European Portuguese",
            "EUR",
            "€",
            Decimal::new(65, 2),
            "Use Portugal vocabulary: 'tu', 'telemóvel', 'autocarro'. More reserved than Brazilian copy.",
            Neutral,
            false,
        ),
        profile(
            "spanish",
            "latin_american",
            "Latin American Spanish",
            "USD",
            "$",
            Decimal::new(5, 1),
            "Neutral Latin American Spanish: 'ustedes', 'computadora', 'celular'. Avoid Spain-only slang.",
            Neutral,
            true,
        ),
        profile(
            "spanish",
            "european_spanish",
            "European Spanish",
            "EUR",
            "€",
            Decimal::new(7, 1),
            "Spain vocabulary: 'vosotros', 'ordenador', 'móvil'.",
            Informal,
            false,
        ),
        profile(
            "spanish",
            "mexican",
            "Mexican Spanish",
            "MXN",
            "$",
            Decimal::new(45, 2),
            "Mexican expressions where natural: 'platicar', 'padre' (cool), 'celular'.",
            Informal,
            false,
        ),
        profile(
            "french",
            "european_french",
            "European French",
            "EUR",
            "€",
            Decimal::new(9, 1),
            "France French, 'vous' by default in sales copy, no anglicisms where a French word exists.",
            Formal,
            true,
        ),
        profile(
            "french",
            "canadian",
            "Canadian French",
            "CAD",
            "$",
            Decimal::new(75, 2),
            "Québécois vocabulary: 'courriel', 'magasiner', 'char'. Friendlier register.",
            Neutral,
            false,
        ),
        profile(
            "german",
            "germany",
            "German (Germany)",
            "EUR",
            "€",
            Decimal::new(85, 2),
            "Standard High German. Direct, precise claims; use 'Sie' in sales copy.",
            Formal,
            true,
        ),
        profile(
            "german",
            "swiss",
            "Swiss German (written)",
            "CHF",
            "CHF",
            Decimal::new(11, 1),
            "Swiss Standard German spelling: 'ss' instead of 'ß', Swiss vocabulary such as 'Velo'.",
            Formal,
            false,
        ),
        profile(
            "italian",
            "italy",
            "Italian",
            "EUR",
            "€",
            Decimal::new(8, 1),
            "Standard Italian. Warm and expressive, 'tu' is acceptable in lifestyle products.",
            Informal,
            true,
        ),
        profile(
            "english",
            "us",
            "American English",
            "USD",
            "$",
            Decimal::ONE,
            "American spelling and idiom.",
            Informal,
            true,
        ),
        profile(
            "english",
            "uk",
            "British English",
            "GBP",
            "£",
            Decimal::new(8, 1),
            "British spelling ('colour', 'optimise') and understated tone.",
            Neutral,
            false,
        ),
    ]
}

// ---------------------------------------------------------------------------
// LocaleTable
// ---------------------------------------------------------------------------

/// Validated, immutable set of locale profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct LocaleTable {
    profiles: Vec<LocaleProfile>,
}

impl Default for LocaleTable {
    fn default() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }
}

impl LocaleTable {
    /// Build from explicit profiles, checking the table invariants.
    pub fn new(profiles: Vec<LocaleProfile>) -> Result<Self> {
        let table = Self { profiles };
        table.check()?;
        Ok(table)
    }

    /// Built-ins with `[[locales]]` entries applied on top.
    pub fn with_overrides(overrides: &[LocaleOverride]) -> Result<Self> {
        let mut profiles = builtin_profiles();
        for o in overrides {
            let language = o.language.trim().to_lowercase();
            let dialect = o.dialect.trim().to_lowercase();
            let idx = match profiles
                .iter()
                .position(|p| p.language == language && p.dialect == dialect)
            {
                Some(idx) => idx,
                None => {
                    let currency = o.currency.clone().ok_or_else(|| {
                        FunnelError::config(format!(
                            "new locale {language}/{dialect} needs a currency"
                        ))
                    })?;
                    let multiplier = o.price_multiplier.ok_or_else(|| {
                        FunnelError::config(format!(
                            "new locale {language}/{dialect} needs a price_multiplier"
                        ))
                    })?;
                    profiles.push(LocaleProfile {
                        display_name: format!("{language} ({dialect})"),
                        currency_symbol: currency.clone(),
                        language: language.clone(),
                        dialect: dialect.clone(),
                        currency,
                        price_multiplier: multiplier,
                        minor_units: 2,
                        notes: String::new(),
                        formality: Formality::Neutral,
                        is_default: false,
                    });
                    profiles.len() - 1
                }
            };

            if o.default {
                for p in profiles.iter_mut().filter(|p| p.language == language) {
                    p.is_default = false;
                }
            }
            let p = &mut profiles[idx];
            if let Some(v) = &o.display_name {
                p.display_name = v.clone();
            }
            if let Some(v) = &o.currency {
                p.currency = v.clone();
            }
            if let Some(v) = &o.currency_symbol {
                p.currency_symbol = v.clone();
            }
            if let Some(v) = o.price_multiplier {
                p.price_multiplier = v;
            }
            if let Some(v) = o.minor_units {
                p.minor_units = v;
            }
            if let Some(v) = &o.notes {
                p.notes = v.clone();
            }
            if let Some(v) = o.formality {
                p.formality = v;
            }
            if o.default {
                p.is_default = true;
            }
        }
        Self::new(profiles)
    }

    fn check(&self) -> Result<()> {
        for (i, p) in self.profiles.iter().enumerate() {
            if p.price_multiplier <= Decimal::ZERO {
                return Err(FunnelError::config(format!(
                    "locale {} has a non-positive price multiplier",
                    p.tag()
                )));
            }
            if let Some(other) = self.profiles[..i].iter().find(|q| q.dialect == p.dialect) {
                return Err(FunnelError::config(format!(
                    "dialect '{}' is declared for both {} and {}",
                    p.dialect, other.language, p.language
                )));
            }
        }
        for language in self.languages() {
            let defaults = self
                .profiles
                .iter()
                .filter(|p| p.language == language && p.is_default)
                .count();
            if defaults != 1 {
                return Err(FunnelError::config(format!(
                    "language '{language}' must have exactly one default dialect, found {defaults}"
                )));
            }
        }
        Ok(())
    }

    /// Distinct languages in table order.
    pub fn languages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for p in &self.profiles {
            if !out.contains(&p.language.as_str()) {
                out.push(&p.language);
            }
        }
        out
    }

    pub fn profiles(&self) -> &[LocaleProfile] {
        &self.profiles
    }

    /// Find the profile for `language`, using its default dialect when none is given.
    pub fn resolve(&self, language: &str, dialect: Option<&str>) -> Result<&LocaleProfile> {
        let language = language.trim().to_lowercase();
        if !self.profiles.iter().any(|p| p.language == language) {
            return Err(FunnelError::config(format!(
                "unknown language '{language}' (known: {})",
                self.languages().join(", ")
            )));
        }
        match dialect.map(|d| d.trim().to_lowercase()) {
            Some(dialect) if !dialect.is_empty() => self
                .profiles
                .iter()
                .find(|p| p.language == language && p.dialect == dialect)
                .ok_or_else(|| {
                    FunnelError::config(format!(
                        "unknown dialect '{dialect}' for {language}"
                    ))
                }),
            _ => self
                .profiles
                .iter()
                .find(|p| p.language == language && p.is_default)
                .ok_or_else(|| {
                    FunnelError::config(format!("no default dialect for {language}"))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_consistent() {
        let table = LocaleTable::new(builtin_profiles()).expect("valid built-ins");
        assert_eq!(
            table.languages(),
            vec!["portuguese", "spanish", "french", "german", "italian", "english"]
        );
    }

    #[test]
    fn resolves_default_and_explicit_dialects() {
        let table = LocaleTable::default();
        let pt = table.resolve("portuguese", None).unwrap();
        assert_eq!(pt.dialect, "brazilian");
        assert_eq!(pt.currency, "BRL");

        let ca = table.resolve("French", Some("canadian")).unwrap();
        assert_eq!(ca.currency, "CAD");
        assert_eq!(ca.tag(), "french-canadian");
    }

    #[test]
    fn unknown_language_or_dialect_is_config_error() {
        let table = LocaleTable::default();
        assert!(matches!(
            table.resolve("klingon", None),
            Err(FunnelError::Config { .. })
        ));
        // Dialect exists, but under another language.
        assert!(matches!(
            table.resolve("portuguese", Some("mexican")),
            Err(FunnelError::Config { .. })
        ));
    }

    #[test]
    fn brazilian_price_conversion() {
        let table = LocaleTable::default();
        let br = table.resolve("portuguese", Some("brazilian")).unwrap();
        let price = Price {
            amount: Decimal::from(27),
            currency: "USD".into(),
        };
        let local = br.convert_price(&price);
        assert_eq!(local.amount, Decimal::new(108, 1));
        assert_eq!(local.currency, "BRL");
        assert_eq!(local.amount.to_string(), "10.8");
    }

    #[test]
    fn non_base_currency_is_multiplied_unchanged() {
        let table = LocaleTable::default();
        let br = table.resolve("portuguese", Some("brazilian")).unwrap();
        let euros = Price {
            amount: Decimal::new(1999, 2),
            currency: "EUR".into(),
        };
        let local = br.convert_price(&euros);
        // 19.99 * 0.4 = 7.996
        assert_eq!(local.amount, Decimal::new(8, 0));
        assert_eq!(local.currency, "BRL");
    }

    #[test]
    fn conversion_rounds_to_minor_units() {
        let table = LocaleTable::default();
        let mx = table.resolve("spanish", Some("mexican")).unwrap();
        let price = Price {
            amount: Decimal::new(1999, 2),
            currency: "USD".into(),
        };
        // 19.99 * 0.45 = 8.9955
        assert_eq!(mx.convert_price(&price).amount, Decimal::new(9, 0));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let overrides = vec![
            LocaleOverride {
                language: "portuguese".into(),
                dialect: "european".into(),
                display_name: None,
                currency: None,
                currency_symbol: None,
                price_multiplier: Some(Decimal::new(7, 1)),
                minor_units: None,
                notes: None,
                formality: None,
                default: true,
            },
            LocaleOverride {
                language: "dutch".into(),
                dialect: "netherlands".into(),
                display_name: Some("Dutch".into()),
                currency: Some("EUR".into()),
                currency_symbol: Some("€".into()),
                price_multiplier: Some(Decimal::new(9, 1)),
                minor_units: None,
                notes: None,
                formality: None,
                default: true,
            },
        ];
        let table = LocaleTable::with_overrides(&overrides).expect("valid overrides");
        let pt = table.resolve("portuguese", None).unwrap();
        assert_eq!(pt.dialect, "european");
        assert_eq!(pt.price_multiplier, Decimal::new(7, 1));
        assert_eq!(table.resolve("dutch", None).unwrap().display_name, "Dutch");
    }

    #[test]
    fn dialect_shared_across_languages_is_rejected() {
        let mut profiles = builtin_profiles();
        let mut clash = profiles[0].clone();
        clash.language = "galician".into();
        profiles.push(clash);
        assert!(LocaleTable::new(profiles).is_err());
    }

    #[test]
    fn new_locale_without_currency_is_rejected() {
        let overrides = vec![LocaleOverride {
            language: "dutch".into(),
            dialect: "flemish".into(),
            display_name: None,
            currency: None,
            currency_symbol: None,
            price_multiplier: Some(Decimal::ONE),
            minor_units: None,
            notes: None,
            formality: None,
            default: true,
        }];
        assert!(LocaleTable::with_overrides(&overrides).is_err());
    }
}
