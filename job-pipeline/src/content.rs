//! Listing copy and the marketplace limits it has to respect.

use std::collections::HashSet;

use common::utils::sanitize::sanitize_text;
use serde::{Deserialize, Serialize};

/// Every bounded list carries exactly this many entries.
pub const LIST_LEN: usize = 13;
pub const MAX_TAG_CHARS: usize = 20;
pub const MAX_MATERIAL_CHARS: usize = 20;
pub const MAX_FEATURE_CHARS: usize = 200;
pub const MAX_TITLE_CHARS: usize = 140;
pub const MAX_DESCRIPTION_CHARS: usize = 5_000;

const TAG_POOL: [&str; 16] = [
    "gift idea",
    "custom design",
    "unique gift",
    "birthday gift",
    "graphic design",
    "trendy style",
    "original art",
    "everyday wear",
    "cute present",
    "fun design",
    "holiday gift",
    "statement piece",
    "made to order",
    "modern look",
    "minimalist",
    "for friends",
];

const FEATURE_POOL: [&str; 15] = [
    "Printed on demand just for you",
    "Vibrant, long-lasting print",
    "Designed to be gifted",
    "Comfortable for everyday use",
    "High quality materials",
    "Crisp detailed artwork",
    "Easy care",
    "Fade resistant colors",
    "Made to order",
    "Unique original design",
    "Great for any occasion",
    "Ships from trusted print partners",
    "Carefully quality checked",
    "Modern fit and finish",
    "Eco-conscious production",
];

const MATERIAL_POOL: [&str; 16] = [
    "cotton",
    "polyester",
    "ceramic",
    "paper",
    "canvas",
    "ink",
    "vinyl",
    "fabric",
    "ring-spun cotton",
    "poly blend",
    "matte finish",
    "gloss finish",
    "eco ink",
    "jersey knit",
    "fleece",
    "recycled fibers",
];

/// Unvalidated copy as the content generator returned it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
}

/// Copy that satisfies the marketplace limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductContent {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub key_features: Vec<String>,
    pub materials: Vec<String>,
}

impl ProductContent {
    /// Applies the limits: titles capped, lists cut or padded to
    /// [`LIST_LEN`] distinct entries, tags and materials capped in length.
    /// `fallback_title` is used when the raw title is blank.
    pub fn normalize(raw: RawContent, fallback_title: &str) -> Self {
        let mut title = sanitize_text(&raw.title, MAX_TITLE_CHARS);
        if title.is_empty() {
            title = sanitize_text(fallback_title, MAX_TITLE_CHARS);
        }
        if title.is_empty() {
            title = "Custom Design".to_string();
        }

        let description = clean_description(&raw.description);
        let description = if description.is_empty() {
            title.clone()
        } else {
            description
        };

        Self {
            title,
            description,
            tags: bounded_list(&raw.tags, MAX_TAG_CHARS, &TAG_POOL, "tag"),
            key_features: bounded_list(
                &raw.key_features,
                MAX_FEATURE_CHARS,
                &FEATURE_POOL,
                "Feature",
            ),
            materials: bounded_list(&raw.materials, MAX_MATERIAL_CHARS, &MATERIAL_POOL, "material"),
        }
    }
}

/// Keeps paragraph breaks but strips other control characters.
fn clean_description(description: &str) -> String {
    description
        .lines()
        .map(|line| sanitize_text(line, MAX_DESCRIPTION_CHARS))
        .collect::<Vec<_>>()
        .join("\n")
        .chars()
        .take(MAX_DESCRIPTION_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

fn bounded_list(values: &[String], max_chars: usize, pool: &[&str], filler: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(LIST_LEN);

    let mut push = |candidate: String, out: &mut Vec<String>| {
        if out.len() < LIST_LEN && !candidate.is_empty() && seen.insert(candidate.to_lowercase()) {
            out.push(candidate);
        }
    };

    for value in values {
        push(sanitize_text(value, max_chars), &mut out);
    }
    for value in pool {
        push(sanitize_text(value, max_chars), &mut out);
    }
    let mut n = 1_usize;
    while out.len() < LIST_LEN {
        push(sanitize_text(&format!("{filler} {n}"), max_chars), &mut out);
        n = n.saturating_add(1);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn assert_limits(content: &ProductContent) {
        for list in [&content.tags, &content.key_features, &content.materials] {
            assert_eq!(list.len(), LIST_LEN, "list {list:?}");
            let unique: HashSet<String> = list.iter().map(|s| s.to_lowercase()).collect();
            assert_eq!(unique.len(), LIST_LEN, "duplicates in {list:?}");
            assert!(list.iter().all(|s| !s.trim().is_empty()));
        }
        assert!(content.tags.iter().all(|t| t.chars().count() <= MAX_TAG_CHARS));
        assert!(content.materials.iter().all(|m| m.chars().count() <= MAX_MATERIAL_CHARS));
        assert!(content.title.chars().count() <= MAX_TITLE_CHARS);
        assert!(!content.title.is_empty());
        assert!(!content.description.is_empty());
    }

    /// Small deterministic generator so failures are reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            self.0 >> 33
        }

        fn below(&mut self, bound: u64) -> usize {
            usize::try_from(self.next() % bound).unwrap_or(0)
        }

        fn text(&mut self) -> String {
            const ALPHABET: [&str; 12] = [
                "a", "Z", " ", "\t", "\n", "\u{7}", "é", "日", "🙂", "-", "x", "  ",
            ];
            let len = match self.below(6) {
                0 => 0,
                1 => 1,
                2 => 19,
                3 => 20,
                4 => 21,
                _ => 300,
            };
            (0..len).map(|_| ALPHABET[self.below(12)]).collect()
        }

        fn list(&mut self) -> Vec<String> {
            let len = [0, 1, 12, 13, 14, 40][self.below(6)];
            let mut items: Vec<String> = (0..len).map(|_| self.text()).collect();
            if self.below(2) == 0 && !items.is_empty() {
                let dup = items[0].clone();
                items.extend(std::iter::repeat(dup.to_uppercase()).take(5));
                items.push(dup);
            }
            items
        }
    }

    #[test]
    fn normalized_content_always_respects_limits() {
        let mut rng = Lcg(7);
        for _ in 0..500 {
            let raw = RawContent {
                title: rng.text(),
                description: rng.text(),
                tags: rng.list(),
                key_features: rng.list(),
                materials: rng.list(),
            };
            let fallback = rng.text();
            let content = ProductContent::normalize(raw, &fallback);
            assert_limits(&content);
            let again = ProductContent::normalize(
                RawContent {
                    title: content.title.clone(),
                    description: content.description.clone(),
                    tags: content.tags.clone(),
                    key_features: content.key_features.clone(),
                    materials: content.materials.clone(),
                },
                &fallback,
            );
            assert_eq!(again, content, "normalisation must be stable");
        }
    }

    #[test]
    fn keeps_upstream_order_and_truncates() {
        let raw = RawContent {
            title: "Retro Sunset Mountain Tee".into(),
            description: "Line one.\n\nLine two.".into(),
            tags: strings(&["retro", "Retro", "a very long tag that exceeds twenty", "sunset"]),
            key_features: strings(&["soft"]),
            materials: strings(&["100% organic ring-spun cotton"]),
        };
        let content = ProductContent::normalize(raw, "fallback");
        assert_limits(&content);
        assert_eq!(content.title, "Retro Sunset Mountain Tee");
        assert_eq!(content.description, "Line one.\n\nLine two.");
        assert_eq!(content.tags.first().map(String::as_str), Some("retro"));
        assert_eq!(content.tags.get(1).map(String::as_str), Some("a very long tag that"));
        assert_eq!(content.tags.get(2).map(String::as_str), Some("sunset"));
        assert_eq!(content.key_features.first().map(String::as_str), Some("soft"));
        assert_eq!(content.materials.first().map(String::as_str), Some("100% organic ring-sp"));
    }

    #[test]
    fn blank_title_uses_fallback() {
        let content = ProductContent::normalize(RawContent::default(), "Unisex Hoodie");
        assert_eq!(content.title, "Unisex Hoodie");
        assert_eq!(content.description, "Unisex Hoodie");

        let content = ProductContent::normalize(RawContent::default(), "  ");
        assert_eq!(content.title, "Custom Design");
        assert_limits(&content);
    }

    #[test]
    fn long_title_is_capped() {
        let raw = RawContent {
            title: "x".repeat(500),
            ..RawContent::default()
        };
        let content = ProductContent::normalize(raw, "fallback");
        assert_eq!(content.title.chars().count(), MAX_TITLE_CHARS);
    }
}
