//! The fixed tag registry (§3 TagRegistry, §4.9 Categorizer).
//!
//! 82 tags across 11 categories. Each tag is addressed as `category:value`.
//! Reproduced verbatim from the categorization source this service replaces.

use std::collections::HashMap;
use std::sync::OnceLock;

pub const TAG_MIN: usize = 1;
pub const TAG_MAX: usize = 2;
pub const TAG_PREFERRED: usize = 1;

/// (category, values) pairs, in the fixed registry order.
const REGISTRY: &[(&str, &[&str])] = &[
    (
        "niche",
        &[
            "cosplay", "gaming", "anime", "fitness", "yoga", "outdoors", "bdsm", "amateur",
            "verified", "sellers", "cnc", "voyeur", "rating", "general",
        ],
    ),
    (
        "focus",
        &[
            "breasts", "ass", "pussy", "legs", "thighs", "feet", "face", "belly", "curves",
            "full_body",
        ],
    ),
    (
        "body",
        &[
            "petite", "slim", "athletic", "average", "curvy", "thick", "slim_thick", "bbw",
            "ssbbw",
        ],
    ),
    ("ass", &["small", "bubble", "big", "jiggly"]),
    (
        "breasts",
        &["small", "medium", "large", "huge", "natural", "enhanced", "perky"],
    ),
    ("age", &["college", "adult", "milf", "mature", "gilf"]),
    (
        "ethnicity",
        &["asian", "latina", "ebony", "white", "indian", "middle_eastern", "mixed"],
    ),
    (
        "style",
        &[
            "alt", "goth", "egirl", "tattooed", "pierced", "natural", "bimbo", "tomboy",
            "femdom", "submissive", "lingerie", "uniform",
        ],
    ),
    ("hair", &["blonde", "redhead", "brunette", "colored"]),
    (
        "special",
        &[
            "hairy", "flexible", "tall", "short", "breeding", "slutty", "clothed", "bent_over",
        ],
    ),
    ("content", &["oc", "professional"]),
];

/// A validated `category:value` tag.
pub type Tag = String;

fn tag_set() -> &'static std::collections::HashSet<String> {
    static SET: OnceLock<std::collections::HashSet<String>> = OnceLock::new();
    SET.get_or_init(|| {
        REGISTRY
            .iter()
            .flat_map(|(category, values)| {
                values.iter().map(move |v| format!("{}:{}", category, v))
            })
            .collect()
    })
}

fn category_index() -> &'static HashMap<&'static str, usize> {
    static IDX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    IDX.get_or_init(|| {
        REGISTRY
            .iter()
            .enumerate()
            .map(|(i, (category, _))| (*category, i))
            .collect()
    })
}

/// Total number of tags in the registry. Expected to be 82.
pub fn registry_size() -> usize {
    REGISTRY.iter().map(|(_, values)| values.len()).sum()
}

/// All valid `category:value` tags.
pub fn all_tags() -> impl Iterator<Item = String> {
    tag_set().clone().into_iter()
}

/// True if `tag` is a known `category:value` identifier.
pub fn is_valid_tag(tag: &str) -> bool {
    tag_set().contains(tag)
}

/// Splits `category:value` into its parts. `None` if the separator is absent.
pub fn extract_category(tag: &str) -> Option<&str> {
    tag.split_once(':').map(|(category, _)| category)
}

pub fn extract_value(tag: &str) -> Option<&str> {
    tag.split_once(':').map(|(_, value)| value)
}

/// Filters `tags` down to the ones present in the registry (string match,
/// case-sensitive), preserving input order and removing duplicates.
pub fn validate_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .filter(|t| is_valid_tag(t))
        .filter(|t| seen.insert((*t).clone()))
        .cloned()
        .collect()
}

/// Derives `primary_category` from a tag set: the category of the first tag,
/// by registry order (not input order), per §4.9.
pub fn primary_category_from_tags(tags: &[String]) -> Option<String> {
    let idx = category_index();
    tags.iter()
        .filter_map(|t| extract_category(t))
        .filter_map(|c| idx.get(c).map(|i| (*i, c)))
        .min_by_key(|(i, _)| *i)
        .map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_82_tags_in_11_categories() {
        assert_eq!(REGISTRY.len(), 11);
        assert_eq!(registry_size(), 82);
        assert_eq!(tag_set().len(), 82);
    }

    #[test]
    fn valid_tags_round_trip() {
        assert!(is_valid_tag("style:lingerie"));
        assert!(is_valid_tag("breasts:small"));
        assert!(!is_valid_tag("style:nonexistent"));
        assert!(!is_valid_tag("nocolon"));
    }

    #[test]
    fn extract_category_and_value() {
        assert_eq!(extract_category("focus:ass"), Some("focus"));
        assert_eq!(extract_value("focus:ass"), Some("ass"));
        assert_eq!(extract_category("garbage"), None);
    }

    #[test]
    fn validate_tags_drops_unknown_and_dupes() {
        let input = vec![
            "style:lingerie".to_string(),
            "style:lingerie".to_string(),
            "not:real".to_string(),
        ];
        assert_eq!(validate_tags(&input), vec!["style:lingerie".to_string()]);
    }

    #[test]
    fn primary_category_picks_first_by_registry_order() {
        let tags = vec!["hair:blonde".to_string(), "niche:cosplay".to_string()];
        assert_eq!(primary_category_from_tags(&tags), Some("niche".to_string()));
    }

    #[test]
    fn primary_category_empty_tags_is_none() {
        assert_eq!(primary_category_from_tags(&[]), None);
    }
}
