//! Phone canonicalization
//!
//! Canonical form is `<country><area><subscriber>` with no separators, e.g.
//! `5521987654321`. The area code is two digits and the subscriber number is
//! 8 digits (landline / legacy mobile) or 9 digits (mobile with the `9`
//! infix). Invalid input never errors: callers get `None` or an empty list and
//! fall back to name-based matching.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TextProcessingError};

const AREA_CODE_LEN: usize = 2;
const SHORT_SUBSCRIBER_LEN: usize = 8;
const LONG_SUBSCRIBER_LEN: usize = 9;
const MOBILE_INFIX: char = '9';

/// Phone-like runs in free text: optional `+`, digits with common separators
static PHONE_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d\s().\-]{7,20}\d").expect("valid phone regex"));

/// Phone normalizer bound to a default country code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self {
            country_code: "55".to_string(),
        }
    }
}

impl PhoneNormalizer {
    /// Create a normalizer for `country_code` (1-3 digits, no `+`)
    pub fn new(country_code: impl Into<String>) -> Result<Self> {
        let country_code = country_code.into();
        let valid = (1..=3).contains(&country_code.len())
            && country_code.chars().all(|c| c.is_ascii_digit());
        if !valid {
            tracing::warn!(country_code = %country_code, "Rejected default country code");
            return Err(TextProcessingError::InvalidCountryCode(country_code));
        }
        Ok(Self { country_code })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    fn local_lengths(&self) -> (usize, usize) {
        (
            AREA_CODE_LEN + SHORT_SUBSCRIBER_LEN,
            AREA_CODE_LEN + LONG_SUBSCRIBER_LEN,
        )
    }

    /// Canonicalize a raw phone string.
    ///
    /// Strips non-digits and leading zeros (trunk or international prefix),
    /// prepends the country code to 10/11-digit local numbers, and rejects
    /// anything that does not end up as country code + area + 8/9 digits.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return None;
        }

        let (short_local, long_local) = self.local_lengths();
        let cc_len = self.country_code.len();

        let canonical = if digits.len() == short_local || digits.len() == long_local {
            format!("{}{}", self.country_code, digits)
        } else if (digits.len() == cc_len + short_local || digits.len() == cc_len + long_local)
            && digits.starts_with(&self.country_code)
        {
            digits.to_string()
        } else {
            return None;
        };

        Some(canonical)
    }

    /// Canonical forms with and without the mobile `9` infix.
    ///
    /// The first entry is always the input's own canonical form. Invalid
    /// input yields an empty list.
    pub fn variants(&self, raw: &str) -> Vec<String> {
        let canonical = match self.normalize(raw) {
            Some(c) => c,
            None => return Vec::new(),
        };

        let infix_at = self.country_code.len() + AREA_CODE_LEN;
        let subscriber_len = canonical.len() - infix_at;
        let mut variants = vec![canonical.clone()];

        if subscriber_len == LONG_SUBSCRIBER_LEN {
            if canonical[infix_at..].starts_with(MOBILE_INFIX) {
                let mut without = canonical.clone();
                without.remove(infix_at);
                variants.push(without);
            }
        } else if subscriber_len == SHORT_SUBSCRIBER_LEN {
            let mut with = canonical;
            with.insert(infix_at, MOBILE_INFIX);
            variants.push(with);
        }

        variants
    }

    /// Check whether two raw numbers share any variant
    pub fn same_number(&self, a: &str, b: &str) -> bool {
        let left = self.variants(a);
        if left.is_empty() {
            return false;
        }
        self.variants(b).iter().any(|v| left.contains(v))
    }

    /// Canonical phones found in free text, in order of appearance, deduplicated
    pub fn find_in_text(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for m in PHONE_IN_TEXT.find_iter(text) {
            if let Some(canonical) = self.normalize(m.as_str()) {
                if !found.contains(&canonical) {
                    found.push(canonical);
                }
            }
        }
        found
    }

    /// Human-readable rendering, e.g. `+55 (21) 98765-4321`.
    ///
    /// Input that does not normalize is returned unchanged.
    pub fn format_display(&self, raw: &str) -> String {
        let canonical = match self.normalize(raw) {
            Some(c) => c,
            None => return raw.to_string(),
        };
        let cc_len = self.country_code.len();
        let area = &canonical[cc_len..cc_len + AREA_CODE_LEN];
        let subscriber = &canonical[cc_len + AREA_CODE_LEN..];
        let split = subscriber.len() - 4;
        format!(
            "+{} ({}) {}-{}",
            self.country_code,
            area,
            &subscriber[..split],
            &subscriber[split..]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phones() -> PhoneNormalizer {
        PhoneNormalizer::default()
    }

    #[test]
    fn test_local_mobile_gets_country_code() {
        assert_eq!(phones().normalize("21987654321").as_deref(), Some("5521987654321"));
        assert_eq!(
            phones().normalize("(21) 98765-4321").as_deref(),
            Some("5521987654321")
        );
    }

    #[test]
    fn test_legacy_eight_digit_number() {
        let p = phones();
        assert_eq!(p.normalize("+55 21 8765-4321").as_deref(), Some("552187654321"));
        let variants = p.variants("+55 21 8765-4321");
        assert!(variants.contains(&"552187654321".to_string()));
        assert!(variants.contains(&"5521987654321".to_string()));
    }

    #[test]
    fn test_trunk_and_international_prefixes() {
        let p = phones();
        assert_eq!(p.normalize("021987654321").as_deref(), Some("5521987654321"));
        assert_eq!(p.normalize("005521987654321").as_deref(), Some("5521987654321"));
    }

    #[test]
    fn test_rejects_invalid() {
        let p = phones();
        assert_eq!(p.normalize(""), None);
        assert_eq!(p.normalize("abc"), None);
        assert_eq!(p.normalize("12345"), None);
        assert_eq!(p.normalize("0000"), None);
        // 13 digits with a foreign country code
        assert_eq!(p.normalize("4421987654321"), None);
        assert_eq!(p.normalize("55219876543210000"), None);
        assert!(p.variants("12345").is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let p = phones();
        for raw in [
            "21987654321",
            "2187654321",
            "+55 (11) 91234-5678",
            "552187654321",
            "0 21 8765 4321",
        ] {
            let once = p.normalize(raw).unwrap();
            assert_eq!(p.normalize(&once).as_deref(), Some(once.as_str()), "{}", raw);
        }
    }

    #[test]
    fn test_variants_both_directions() {
        let p = phones();
        let from_long = p.variants("5521987654321");
        assert_eq!(from_long, vec!["5521987654321", "552187654321"]);

        let from_short = p.variants("552187654321");
        assert_eq!(from_short, vec!["552187654321", "5521987654321"]);
    }

    #[test]
    fn test_nine_digit_without_mobile_infix_has_single_variant() {
        let p = phones();
        assert_eq!(p.variants("5521387654321"), vec!["5521387654321"]);
    }

    #[test]
    fn test_same_number() {
        let p = phones();
        assert!(p.same_number("21 98765-4321", "+55 21 8765-4321"));
        assert!(!p.same_number("21 98765-4321", "21 98765-0000"));
        assert!(!p.same_number("garbage", "garbage"));
    }

    #[test]
    fn test_find_in_text() {
        let p = phones();
        let text = "João Silva, advogado na XYZ, 21999998888. Outro: +55 (11) 3456-7890";
        assert_eq!(p.find_in_text(text), vec!["5521999998888", "551134567890"]);
        assert!(p.find_in_text("sem telefone aqui").is_empty());
    }

    #[test]
    fn test_format_display() {
        let p = phones();
        assert_eq!(p.format_display("5521987654321"), "+55 (21) 98765-4321");
        assert_eq!(p.format_display("552187654321"), "+55 (21) 8765-4321");
        assert_eq!(p.format_display("n/a"), "n/a");
    }

    #[test]
    fn test_custom_country_code() {
        let p = PhoneNormalizer::new("351").unwrap();
        assert_eq!(p.normalize("2198765432").as_deref(), Some("3512198765432"));
        assert!(PhoneNormalizer::new("+55").is_err());
        assert!(PhoneNormalizer::new("").is_err());
    }
}
