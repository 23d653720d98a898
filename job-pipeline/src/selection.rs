//! Deterministic catalog choices. Nothing here performs I/O.

use common::error::AppError;

use crate::types::catalog::{Blueprint, PrintArea, Provider};

pub const NO_BLUEPRINT: &str = "no suitable blueprint found";
pub const NO_PROVIDER: &str = "no provider available";
pub const NO_PRINT_AREA: &str = "no print areas available";

/// Added to a print area's score when its position matches the prompt.
/// Larger than any realistic `width * height`.
pub const POSITION_MATCH_BONUS: u64 = 1 << 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    TShirt,
    Hoodie,
    Mug,
    Poster,
    PhoneCase,
    Sticker,
    Tote,
    Pillow,
}

impl ProductType {
    const ALL: [ProductType; 8] = [
        ProductType::TShirt,
        ProductType::Hoodie,
        ProductType::Mug,
        ProductType::Poster,
        ProductType::PhoneCase,
        ProductType::Sticker,
        ProductType::Tote,
        ProductType::Pillow,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            ProductType::TShirt => &["t-shirt", "t shirt", "tshirt", "tee", "shirt"],
            ProductType::Hoodie => &["hoodie", "hooded", "sweatshirt", "pullover"],
            ProductType::Mug => &["mug", "cup", "coffee"],
            ProductType::Poster => &["poster", "wall art", "canvas"],
            ProductType::PhoneCase => &["phone case", "iphone", "case"],
            ProductType::Sticker => &["sticker", "decal"],
            ProductType::Tote => &["tote", "bag"],
            ProductType::Pillow => &["pillow", "cushion"],
        }
    }

    /// Coarse product type named by free text. Most keyword hits wins; ties
    /// go to the earlier type.
    pub fn classify(text: &str) -> Option<ProductType> {
        let text = text.to_lowercase();
        let mut best: Option<(ProductType, usize)> = None;
        for candidate in Self::ALL {
            let hits = candidate
                .keywords()
                .iter()
                .filter(|keyword| contains_keyword(&text, keyword))
                .count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((candidate, hits));
            }
        }
        best.map(|(product_type, _)| product_type)
    }
}

/// Phrases match as substrings; single words must match a whole word,
/// optionally pluralised.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.contains([' ', '-']) {
        return haystack.contains(keyword);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword || word.strip_suffix('s') == Some(keyword))
}

fn blueprint_score(blueprint: &Blueprint, product_type: Option<ProductType>) -> usize {
    let Some(product_type) = product_type else {
        return 0;
    };
    let title = blueprint.title.to_lowercase();
    let text = blueprint.search_text();
    product_type
        .keywords()
        .iter()
        .map(|keyword| {
            let in_title = usize::from(contains_keyword(&title, keyword));
            let anywhere = usize::from(contains_keyword(&text, keyword));
            in_title.saturating_mul(2).saturating_add(anywhere)
        })
        .fold(0, usize::saturating_add)
}

/// First element with the strictly highest score.
fn first_best<T>(items: &[T], score: impl Fn(&T) -> u64) -> Option<&T> {
    let (first, rest) = items.split_first()?;
    let mut best = first;
    let mut best_score = score(first);
    for item in rest {
        let candidate = score(item);
        if candidate > best_score {
            best = item;
            best_score = candidate;
        }
    }
    Some(best)
}

pub fn choose_blueprint<'a>(
    blueprints: &'a [Blueprint],
    prompt: &str,
    override_id: Option<u64>,
) -> Result<&'a Blueprint, AppError> {
    if let Some(chosen) = override_id.and_then(|id| blueprints.iter().find(|b| b.id == id)) {
        return Ok(chosen);
    }

    let product_type = ProductType::classify(prompt);
    first_best(blueprints, |b| {
        u64::try_from(blueprint_score(b, product_type)).unwrap_or(u64::MAX)
    })
    .ok_or_else(|| AppError::Selection(NO_BLUEPRINT.into()))
}

pub fn choose_provider<'a>(
    providers: &'a [Provider],
    preference_hint: Option<&str>,
    override_id: Option<u64>,
) -> Result<&'a Provider, AppError> {
    if let Some(chosen) = override_id.and_then(|id| providers.iter().find(|p| p.id == id)) {
        return Ok(chosen);
    }

    let hint = preference_hint
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty());
    if let Some(hint) = hint {
        let matched = providers.iter().find(|p| {
            p.title.to_lowercase().contains(&hint)
                || p.location
                    .as_deref()
                    .is_some_and(|l| l.to_lowercase().contains(&hint))
        });
        if let Some(chosen) = matched {
            return Ok(chosen);
        }
    }

    providers
        .first()
        .ok_or_else(|| AppError::Selection(NO_PROVIDER.into()))
}

/// Placement named by the prompt, `front` when it names none.
pub fn preferred_position(prompt: &str) -> &'static str {
    let text = prompt.to_lowercase().replace('_', " ");
    if text.contains("left chest") {
        "left_chest"
    } else if text.contains("right chest") {
        "right_chest"
    } else if contains_keyword(&text, "back") {
        "back"
    } else if contains_keyword(&text, "sleeve") {
        "sleeve"
    } else if contains_keyword(&text, "chest") {
        "chest"
    } else {
        "front"
    }
}

fn position_matches(area: &PrintArea, preferred: &str) -> bool {
    area.position.to_lowercase().contains(preferred)
}

pub fn choose_print_area<'a>(
    areas: &'a [PrintArea],
    prompt: &str,
    override_positions: Option<&[String]>,
) -> Result<&'a PrintArea, AppError> {
    if let Some(positions) = override_positions {
        for wanted in positions {
            if let Some(area) = areas
                .iter()
                .find(|a| a.position.eq_ignore_ascii_case(wanted.trim()))
            {
                return Ok(area);
            }
        }
    }

    let preferred = preferred_position(prompt);
    first_best(areas, |area| {
        let bonus = if position_matches(area, preferred) {
            POSITION_MATCH_BONUS
        } else {
            0
        };
        bonus.saturating_add(area.pixel_area())
    })
    .ok_or_else(|| AppError::Selection(NO_PRINT_AREA.into()))
}
