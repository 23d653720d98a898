use serde::{Deserialize, Serialize};

/// Catalog template for a product type, independent of who prints it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blueprint {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
}

impl Blueprint {
    /// Lowercased text the product-type classifier matches against.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title.to_lowercase(),
            self.model.to_lowercase(),
            self.description.to_lowercase()
        )
    }
}

/// Fulfilment partner able to produce a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Named placement region with pixel dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintArea {
    pub position: String,
    pub width: u32,
    pub height: u32,
}

impl PrintArea {
    pub fn pixel_area(&self) -> u64 {
        u64::from(self.width).saturating_mul(u64::from(self.height))
    }
}
