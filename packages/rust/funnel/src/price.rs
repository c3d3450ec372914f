//! Currency amount recognition in free page text.

use std::str::FromStr;
use std::sync::LazyLock;

use funnelport_shared::Price;
use regex::Regex;
use rust_decimal::Decimal;

/// Symbol/code before the amount (`$27`, `R$ 97,90`, `USD 27`) or after it (`27,00 €`).
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<pre>R\$|US\$|C\$|\$|€|£|\b(?:USD|EUR|GBP|BRL|CAD|MXN|CHF)\b)\s?(?P<a1>\d[\d.,]*\d|\d)
        |
        (?P<a2>\d[\d.,]*\d|\d)\s?(?P<post>€|£|\$|\b(?:USD|EUR|GBP|BRL|CAD|MXN|CHF)\b)
        ",
    )
    .expect("price regex")
});

fn currency_code(token: &str) -> &'static str {
    match token.to_ascii_uppercase().as_str() {
        "R$" | "BRL" => "BRL",
        "C$" | "CAD" => "CAD",
        "€" | "EUR" => "EUR",
        "£" | "GBP" => "GBP",
        "MXN" => "MXN",
        "CHF" => "CHF",
        _ => "USD",
    }
}

/// Normalize `1.299,00` / `1,299.00` / `27,00` style numbers to `1299.00`.
fn normalize_amount(raw: &str) -> Option<Decimal> {
    let last_dot = raw.rfind('.');
    let last_comma = raw.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(i), None) | (None, Some(i)) => {
            let sep = raw[i..].chars().next()?;
            let digits_after = raw.len() - i - 1;
            let occurrences = raw.matches(sep).count();
            // A lone separator followed by exactly three digits groups thousands.
            if occurrences == 1 && digits_after != 3 {
                Some(sep)
            } else {
                None
            }
        }
        (None, None) => None,
    };

    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            c if Some(c) == decimal_sep => Some('.'),
            _ => None,
        })
        .collect();
    Decimal::from_str(&cleaned).ok().map(|d| d.normalize())
}

/// First currency amount found in `text`.
pub fn parse_price(text: &str) -> Option<Price> {
    PRICE_RE.captures_iter(text).find_map(|caps| {
        let (amount, token) = match (caps.name("a1"), caps.name("pre")) {
            (Some(a), Some(p)) => (a.as_str(), p.as_str()),
            _ => (caps.name("a2")?.as_str(), caps.name("post")?.as_str()),
        };
        let amount = normalize_amount(amount)?;
        Some(Price {
            amount,
            currency: currency_code(token).to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Option<(String, String)> {
        parse_price(text).map(|p| (p.amount.to_string(), p.currency))
    }

    #[test]
    fn symbol_before_amount() {
        assert_eq!(p("Only $27 today"), Some(("27".into(), "USD".into())));
        assert_eq!(p("€19.99"), Some(("19.99".into(), "EUR".into())));
        assert_eq!(p("R$ 97,90"), Some(("97.9".into(), "BRL".into())));
        assert_eq!(p("USD 27"), Some(("27".into(), "USD".into())));
    }

    #[test]
    fn symbol_after_amount() {
        assert_eq!(p("Prix: 27,00 €"), Some(("27".into(), "EUR".into())));
        assert_eq!(p("1.299,00 €"), Some(("1299".into(), "EUR".into())));
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(p("$1,299.00"), Some(("1299".into(), "USD".into())));
        assert_eq!(p("$1,299"), Some(("1299".into(), "USD".into())));
        assert_eq!(p("£2.50"), Some(("2.5".into(), "GBP".into())));
    }

    #[test]
    fn no_price() {
        assert_eq!(p("Join 10,000 happy sleepers"), None);
        assert_eq!(p(""), None);
    }
}
