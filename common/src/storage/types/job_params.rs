use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    #[default]
    Generate,
    Upload,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    #[default]
    Draft,
    Publish,
}

/// Explicit picks for a single item. Anything left empty falls back to the
/// selection policies.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemOverride {
    #[serde(default)]
    pub blueprint_id: Option<u64>,
    #[serde(default)]
    pub provider_id: Option<u64>,
    #[serde(default)]
    pub print_positions: Option<Vec<String>>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Immutable input of a bulk product-creation job.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobParams {
    pub prompt: String,
    #[serde(default)]
    pub items: Vec<ItemOverride>,
    #[serde(default)]
    pub image_mode: ImageMode,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub transparent_background: bool,
    #[serde(default)]
    pub style_hint: Option<String>,
    #[serde(default)]
    pub audience_hint: Option<String>,
    #[serde(default)]
    pub color_hint: Option<String>,
    #[serde(default)]
    pub provider_hint: Option<String>,
    #[serde(default)]
    pub markup_percent: u32,
    #[serde(default)]
    pub publish_mode: PublishMode,
}

impl JobParams {
    /// Override for a zero-based item position, if one was supplied.
    pub fn item_override(&self, position: u32) -> Option<&ItemOverride> {
        self.items.get(usize::try_from(position).ok()?)
    }

    /// Prompt for a zero-based item position: the item's own prompt when it
    /// has a non-blank one, the job prompt otherwise.
    pub fn item_prompt(&self, position: u32) -> &str {
        self.item_override(position)
            .and_then(|o| o.prompt.as_deref())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.prompt)
    }

    /// Source image for a zero-based item position in upload mode, picked
    /// round-robin over the supplied URLs.
    pub fn source_image(&self, position: u32) -> Option<&str> {
        if self.image_urls.is_empty() {
            return None;
        }
        let position = usize::try_from(position).ok()?;
        self.image_urls
            .get(position % self.image_urls.len())
            .map(String::as_str)
    }

    pub fn publishes(&self) -> bool {
        self.publish_mode == PublishMode::Publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParams {
        JobParams {
            prompt: "retro sunset cat".into(),
            items: vec![
                ItemOverride {
                    prompt: Some("neon dog".into()),
                    ..ItemOverride::default()
                },
                ItemOverride {
                    prompt: Some("   ".into()),
                    ..ItemOverride::default()
                },
            ],
            image_urls: vec!["https://a.example/1.png".into(), "https://a.example/2.png".into()],
            ..JobParams::default()
        }
    }

    #[test]
    fn item_prompt_prefers_non_blank_override() {
        let params = params();
        assert_eq!(params.item_prompt(0), "neon dog");
        assert_eq!(params.item_prompt(1), "retro sunset cat");
        assert_eq!(params.item_prompt(7), "retro sunset cat");
    }

    #[test]
    fn source_image_round_robins() {
        let params = params();
        assert_eq!(params.source_image(0), Some("https://a.example/1.png"));
        assert_eq!(params.source_image(1), Some("https://a.example/2.png"));
        assert_eq!(params.source_image(2), Some("https://a.example/1.png"));
        assert_eq!(JobParams::default().source_image(0), None);
    }

    #[test]
    fn modes_deserialize_from_snake_case() {
        let parsed: JobParams = serde_json::from_str(
            r#"{"prompt":"x","image_mode":"upload","publish_mode":"publish"}"#,
        )
        .expect("params");
        assert_eq!(parsed.image_mode, ImageMode::Upload);
        assert!(parsed.publishes());
        assert_eq!(parsed.markup_percent, 0);
    }
}
