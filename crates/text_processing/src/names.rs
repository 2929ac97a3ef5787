//! Name normalization and similarity scoring
//!
//! Best-effort transliteration for Portuguese name variants, not a general
//! phonetic algorithm. The substitution table is configuration: rules are
//! applied in order to the diacritic-folded, lowercased name.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, TextProcessingError};

/// Score for identical normalized names
pub const EXACT_SCORE: f32 = 1.0;
/// Score when one normalized name contains the other
pub const CONTAINMENT_SCORE: f32 = 0.9;

/// One ordered regex substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    /// Regex matched against the folded name
    pub pattern: String,
    /// Replacement; may reference capture groups (`$1`)
    pub replacement: String,
}

impl SubstitutionRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// `ph→f`, `th+vowel→t+vowel`, `y→i`, `w→v`
    pub fn defaults() -> Vec<SubstitutionRule> {
        vec![
            SubstitutionRule::new("ph", "f"),
            SubstitutionRule::new("th([aeiou])", "t$1"),
            SubstitutionRule::new("y", "i"),
            SubstitutionRule::new("w", "v"),
        ]
    }
}

/// Candidate ranked against a query name
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion<T> {
    pub item: T,
    pub score: f32,
}

/// Lowercase, strip diacritics and punctuation, collapse whitespace.
///
/// Hyphens and underscores become spaces; other punctuation is dropped.
pub fn fold(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Name normalizer with a compiled substitution table
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    rules: Vec<(Regex, String)>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        // Default patterns are literals known to compile
        let rules = SubstitutionRule::defaults()
            .into_iter()
            .filter_map(|rule| {
                Regex::new(&rule.pattern)
                    .ok()
                    .map(|re| (re, rule.replacement))
            })
            .collect();
        Self { rules }
    }
}

impl NameNormalizer {
    /// Compile an ordered substitution table
    pub fn new(rules: &[SubstitutionRule]) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|source| {
                        tracing::warn!(
                            pattern = %rule.pattern,
                            error = %source,
                            "Rejected name substitution rule"
                        );
                        TextProcessingError::InvalidPattern {
                            pattern: rule.pattern.clone(),
                            source,
                        }
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(rules = compiled.len(), "Name substitution table compiled");
        Ok(Self { rules: compiled })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Normalize a name for comparison
    pub fn normalize(&self, name: &str) -> String {
        let mut normalized = fold(name);
        for (pattern, replacement) in &self.rules {
            normalized = pattern
                .replace_all(&normalized, replacement.as_str())
                .into_owned();
        }
        normalized.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Similarity in [0, 1].
    ///
    /// 1.0 for equal normalized forms, 0.9 for containment, otherwise
    /// `1 - levenshtein / max_len` over chars. Empty normalized input
    /// scores 0.0.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        let na = self.normalize(a);
        let nb = self.normalize(b);
        score_normalized(&na, &nb)
    }

    /// Check if two names are the same after normalization
    pub fn same_name(&self, a: &str, b: &str) -> bool {
        let na = self.normalize(a);
        !na.is_empty() && na == self.normalize(b)
    }

    /// Best-scoring candidate at or above `threshold`
    pub fn best_match<T, I>(&self, query: &str, candidates: I, threshold: f32) -> Option<Suggestion<T>>
    where
        I: IntoIterator<Item = (T, String)>,
    {
        let nq = self.normalize(query);
        if nq.is_empty() {
            return None;
        }
        candidates
            .into_iter()
            .map(|(item, name)| Suggestion {
                score: score_normalized(&nq, &self.normalize(&name)),
                item,
            })
            .filter(|s| s.score >= threshold)
            .fold(None, |best: Option<Suggestion<T>>, s| match best {
                Some(b) if b.score >= s.score => Some(b),
                _ => Some(s),
            })
    }

    /// "Did you mean" candidates: score ≥ `threshold`, exact matches
    /// excluded, best first, at most `limit`
    pub fn suggestions<T, I>(
        &self,
        query: &str,
        candidates: I,
        threshold: f32,
        limit: usize,
    ) -> Vec<Suggestion<T>>
    where
        I: IntoIterator<Item = (T, String)>,
    {
        let nq = self.normalize(query);
        if nq.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut ranked: Vec<Suggestion<T>> = candidates
            .into_iter()
            .map(|(item, name)| Suggestion {
                score: score_normalized(&nq, &self.normalize(&name)),
                item,
            })
            .filter(|s| s.score >= threshold && s.score < EXACT_SCORE)
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

fn score_normalized(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return EXACT_SCORE;
    }
    if a.contains(b) || b.contains(a) {
        return CONTAINMENT_SCORE;
    }
    let max_len = a.chars().count().max(b.chars().count());
    let distance = strsim::levenshtein(a, b);
    (1.0 - distance as f32 / max_len as f32).clamp(0.0, 1.0)
}
