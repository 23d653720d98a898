use serde::{Deserialize, Serialize};

use crate::content::ProductContent;

/// Input for the image producer. Exactly one of `prompt` and
/// `source_image_url` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSpec {
    pub prompt: Option<String>,
    pub source_image_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub transparent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProducedImage {
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedImage {
    pub external_image_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentSpec {
    pub prompt: String,
    pub product_type: String,
    pub style_hint: Option<String>,
    pub audience_hint: Option<String>,
    pub color_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductSpec {
    pub blueprint_id: u64,
    pub provider_id: u64,
    pub print_position: String,
    pub image_id: String,
    pub content: ProductContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedProduct {
    pub product_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishOutcome {
    pub published: bool,
}
