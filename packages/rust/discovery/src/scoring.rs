//! Quality score for candidate videos.
//!
//! Four terms, each in `[0, 1]`, combined as a weighted mean:
//! view count, authority source, recency, and duration fit.
//! Missing metadata scores the minimum for its term.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use funnelport_shared::{CandidateResource, RankedCandidate, ScoringConfig};

/// Compute the quality score. Pure: depends only on its arguments.
pub fn score(candidate: &CandidateResource, config: &ScoringConfig, now: DateTime<Utc>) -> f64 {
    let w = &config.weights;
    let total = w.views + w.expert + w.recency + w.duration;
    if total <= 0.0 {
        return 0.0;
    }

    let expert = if is_expert(&candidate.title, candidate.channel.as_deref(), &config.expert_lexicon)
    {
        1.0
    } else {
        0.0
    };

    let sum = w.views * view_term(candidate.view_count, config)
        + w.expert * expert
        + w.recency * recency_term(candidate.published_at, config, now)
        + w.duration * duration_term(candidate.duration_secs, config);

    sum / total
}

fn view_term(views: Option<u64>, config: &ScoringConfig) -> f64 {
    let Some(views) = views else { return 0.0 };
    if views < config.min_views {
        return 0.0;
    }
    let saturation = (config.min_views as f64 * config.view_saturation_factor).max(1.0);
    (views as f64 / saturation).min(1.0)
}

fn recency_term(
    published: Option<DateTime<Utc>>,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> f64 {
    let Some(published) = published else { return 0.0 };
    let age = (now - published).num_days();
    if age <= config.recency_full_days {
        return 1.0;
    }
    if age >= config.max_age_days {
        return 0.0;
    }
    let span = (config.max_age_days - config.recency_full_days) as f64;
    1.0 - (age - config.recency_full_days) as f64 / span
}

fn duration_term(duration_secs: Option<u64>, config: &ScoringConfig) -> f64 {
    let Some(secs) = duration_secs else { return 0.0 };
    let minutes = secs as f64 / 60.0;
    let (lo, hi) = config.sweet_spot_minutes;
    let distance = if minutes < lo {
        lo - minutes
    } else if minutes > hi {
        minutes - hi
    } else {
        return 1.0;
    };
    if config.duration_decay_minutes <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / config.duration_decay_minutes).max(0.0)
}

/// Whether the title or channel contains a lexicon word (whole-word, case-insensitive).
///
/// Multi-word lexicon entries match as consecutive words.
pub fn is_expert(title: &str, channel: Option<&str>, lexicon: &[String]) -> bool {
    let words = |s: &str| -> String {
        let joined = s
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        format!(" {joined} ")
    };
    let haystack = format!("{}{}", words(title), words(channel.unwrap_or_default()));
    lexicon.iter().any(|entry| {
        let needle = words(entry);
        !needle.trim().is_empty() && haystack.contains(&needle)
    })
}

/// Total order: score desc, views desc, publish date desc, url asc.
pub fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.resource.view_count.cmp(&a.resource.view_count))
        .then_with(|| b.resource.published_at.cmp(&a.resource.published_at))
        .then_with(|| a.resource.url.cmp(&b.resource.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn candidate(views: Option<u64>, age_days: Option<i64>, minutes: Option<u64>) -> CandidateResource {
        CandidateResource {
            url: "https://www.youtube.com/watch?v=abc".into(),
            video_id: Some("abc".into()),
            title: "Sleep better tonight".into(),
            view_count: views,
            published_at: age_days.map(|d| now() - Duration::days(d)),
            duration_secs: minutes.map(|m| m * 60),
            channel: Some("Sleep Channel".into()),
            is_expert_source: false,
        }
    }

    #[test]
    fn score_is_deterministic() {
        let config = ScoringConfig::default();
        let c = candidate(Some(450_000), Some(400), Some(25));
        let first = score(&c, &config, now());
        for _ in 0..10 {
            assert_eq!(score(&c, &config, now()).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn views_below_threshold_contribute_nothing() {
        let config = ScoringConfig::default();
        assert_eq!(view_term(Some(99_999), &config), 0.0);
        assert!((view_term(Some(100_000), &config) - 0.1).abs() < 1e-9);
        assert_eq!(view_term(Some(5_000_000), &config), 1.0);
        assert_eq!(view_term(None, &config), 0.0);
    }

    #[test]
    fn recency_decays_linearly_after_two_years() {
        let config = ScoringConfig::default();
        let at = |days| recency_term(Some(now() - Duration::days(days)), &config, now());
        assert_eq!(at(10), 1.0);
        assert_eq!(at(730), 1.0);
        assert!((at(1277) - 0.5).abs() < 0.01);
        assert_eq!(at(1825), 0.0);
        assert_eq!(at(4000), 0.0);
        // Published "in the future" relative to the reference date.
        assert_eq!(at(-3), 1.0);
        assert_eq!(recency_term(None, &config, now()), 0.0);
    }

    #[test]
    fn duration_sweet_spot_and_decay() {
        let config = ScoringConfig::default();
        assert_eq!(duration_term(Some(10 * 60), &config), 1.0);
        assert_eq!(duration_term(Some(60 * 60), &config), 1.0);
        assert!((duration_term(Some(75 * 60), &config) - 0.5).abs() < 1e-9);
        assert_eq!(duration_term(Some(120 * 60), &config), 0.0);
        assert!((duration_term(Some(4 * 60), &config) - 0.8).abs() < 1e-9);
        assert_eq!(duration_term(None, &config), 0.0);
    }

    #[test]
    fn expert_lexicon_matches_whole_words() {
        let lexicon = ScoringConfig::default().expert_lexicon;
        assert!(is_expert("Dr. Walker on sleep", None, &lexicon));
        assert!(is_expert("Sleep science", Some("Stanford University"), &lexicon));
        assert!(is_expert("Ask a PhD", None, &lexicon));
        // "dr" inside another word is not a marker.
        assert!(!is_expert("Drink more water", Some("Hydration Hub"), &lexicon));
        assert!(!is_expert("Mdma myths", None, &lexicon));
    }

    #[test]
    fn missing_metadata_is_not_fatal() {
        let config = ScoringConfig::default();
        let mut c = candidate(None, None, None);
        c.channel = None;
        c.title = String::new();
        assert_eq!(score(&c, &config, now()), 0.0);
    }

    #[test]
    fn reweighting_changes_score_not_semantics() {
        let mut config = ScoringConfig::default();
        let c = candidate(Some(2_000_000), Some(100), Some(90));
        let default_score = score(&c, &config, now());
        config.weights.duration = 0.0;
        let reweighted = score(&c, &config, now());
        assert!(reweighted > default_score);
        assert!(reweighted <= 1.0);
    }

    #[test]
    fn ties_break_on_views_then_date() {
        let ranked = |views, age| RankedCandidate {
            resource: CandidateResource {
                url: format!("https://youtu.be/{views}-{age}"),
                ..candidate(Some(views), Some(age), Some(20))
            },
            score: 0.5,
            manual: false,
        };
        let mut list = vec![ranked(100, 50), ranked(300, 900), ranked(300, 10)];
        list.sort_by(rank_order);
        let order: Vec<_> = list
            .iter()
            .map(|c| (c.resource.view_count.unwrap(), c.resource.published_at))
            .collect();
        assert_eq!(order[0], (300, Some(now() - Duration::days(10))));
        assert_eq!(order[1], (300, Some(now() - Duration::days(900))));
        assert_eq!(order[2].0, 100);
    }
}
