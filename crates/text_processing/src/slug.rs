use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tag slug: lowercase, no diacritics, runs of anything non-alphanumeric
/// collapsed to a single hyphen, no leading or trailing hyphen.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_hyphen = false;

    for c in label
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
    {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Investidor Anjo"), "investidor-anjo");
        assert_eq!(slugify("  São Paulo  "), "sao-paulo");
        assert_eq!(slugify("Tech / SaaS!!"), "tech-saas");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("Educação"), "educacao");
    }
}
