//! Human-likeness heuristics for ranking paraphrase candidates.
//!
//! The score is a pure function of the text. Four capped sub-scores are
//! summed and the total is capped at the scorer's ceiling:
//!
//! | Component            | Rule                                             | Cap |
//! |----------------------|--------------------------------------------------|-----|
//! | vocabulary diversity | `round(distinct_words / words * 20)`             | 20  |
//! | sentence variance    | 15 if population variance of words/sentence > 4 | 15  |
//! | transition words     | 5 per occurrence                                 | 15  |
//! | natural patterns     | 3 per occurrence                                 | 10  |
//!
//! Sentences are split on `.` only. Phrase matching is case-insensitive,
//! counts non-overlapping substring occurrences, and treats `’` as `'`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Canonical ceiling for the total score.
pub const DEFAULT_CEILING: u32 = 50;

const DIVERSITY_WEIGHT: f64 = 20.0;
const DIVERSITY_CAP: u32 = 20;
const VARIANCE_THRESHOLD: f64 = 4.0;
const VARIANCE_BONUS: u32 = 15;
const TRANSITION_POINTS: u32 = 5;
const TRANSITION_CAP: u32 = 15;
const PATTERN_POINTS: u32 = 3;
const PATTERN_CAP: u32 = 10;

pub const TRANSITION_WORDS: &[&str] = &[
    "however",
    "therefore",
    "moreover",
    "furthermore",
    "consequently",
    "meanwhile",
    "additionally",
    "in fact",
    "as a result",
    "on the other hand",
];

pub const NATURAL_PATTERNS: &[&str] = &[
    "it's", "don't", "you're", "won't", "can't", "i'm", "that's", "there's",
];

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}'’]+").expect("Invalid word regex"));

/// Breakdown of a human-likeness score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct HumanScore {
    /// Sum of the components, capped at the scorer's ceiling.
    pub total: u32,
    pub vocabulary_diversity: u32,
    pub sentence_variance: u32,
    pub transition_words: u32,
    pub natural_patterns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scorer {
    ceiling: u32,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
        }
    }
}

impl Scorer {
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn score(&self, text: &str) -> HumanScore {
        let words = word_tokens(text);
        let sentences = sentence_word_counts(text);
        if words.is_empty() || sentences.is_empty() {
            return HumanScore::default();
        }

        let lowered = text.to_lowercase().replace('’', "'");

        let vocabulary_diversity = diversity_score(&words);
        let sentence_variance = if population_variance(&sentences) > VARIANCE_THRESHOLD {
            VARIANCE_BONUS
        } else {
            0
        };
        let transition_words = count_phrases(&lowered, TRANSITION_WORDS)
            .saturating_mul(TRANSITION_POINTS)
            .min(TRANSITION_CAP);
        let natural_patterns = count_phrases(&lowered, NATURAL_PATTERNS)
            .saturating_mul(PATTERN_POINTS)
            .min(PATTERN_CAP);

        let total = (vocabulary_diversity + sentence_variance + transition_words + natural_patterns)
            .min(self.ceiling);

        HumanScore {
            total,
            vocabulary_diversity,
            sentence_variance,
            transition_words,
            natural_patterns,
        }
    }
}

/// Score with the canonical ceiling.
pub fn score(text: &str) -> HumanScore {
    Scorer::default().score(text)
}

fn word_tokens(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '’').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn sentence_word_counts(text: &str) -> Vec<usize> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.split_whitespace().count())
        .collect()
}

fn diversity_score(words: &[String]) -> u32 {
    let distinct: HashSet<&str> = words.iter().map(String::as_str).collect();
    let ratio = distinct.len() as f64 / words.len() as f64;
    ((ratio * DIVERSITY_WEIGHT).round() as u32).min(DIVERSITY_CAP)
}

fn population_variance(counts: &[usize]) -> f64 {
    if counts.len() < 2 {
        return 0.0;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

fn count_phrases(lowered: &str, phrases: &[&str]) -> u32 {
    phrases
        .iter()
        .map(|p| lowered.matches(p).count() as u32)
        .sum()
}
