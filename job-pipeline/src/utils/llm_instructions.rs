use serde_json::json;

use crate::types::requests::ContentSpec;

pub static LISTING_COPY_SYSTEM_MESSAGE: &str = "You write marketplace listings for print-on-demand products. \
Answer with JSON only. Write a catchy title of at most 140 characters, a description of two or three short \
paragraphs, exactly 13 search tags of at most 20 characters each, exactly 13 short key features and \
exactly 13 materials of at most 20 characters each. Never repeat a tag. Do not mention brands or \
trademarks you were not given.";

pub fn listing_copy_user_message(spec: &ContentSpec) -> String {
    let mut message = format!(
        "Product type: {}\nDesign prompt: {}\n",
        spec.product_type, spec.prompt
    );
    if let Some(style) = &spec.style_hint {
        message.push_str(&format!("Style: {style}\n"));
    }
    if let Some(audience) = &spec.audience_hint {
        message.push_str(&format!("Audience: {audience}\n"));
    }
    if let Some(colors) = &spec.color_hint {
        message.push_str(&format!("Colors: {colors}\n"));
    }
    message
}

pub fn get_listing_copy_schema() -> serde_json::Value {
    // Strict mode ignores length bounds; the caller normalises list sizes.
    let bounded_list = json!({
        "type": "array",
        "items": { "type": "string" }
    });

    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "description": { "type": "string" },
            "tags": bounded_list,
            "key_features": bounded_list,
            "materials": bounded_list
        },
        "required": ["title", "description", "tags", "key_features", "materials"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_only_lists_given_hints() {
        let spec = ContentSpec {
            prompt: "a fox in the snow".into(),
            product_type: "Unisex Hoodie".into(),
            style_hint: Some("line art".into()),
            ..ContentSpec::default()
        };
        let message = listing_copy_user_message(&spec);
        assert!(message.contains("Product type: Unisex Hoodie"));
        assert!(message.contains("Style: line art"));
        assert!(!message.contains("Audience"));
    }

    #[test]
    fn schema_requires_every_field() {
        let schema = get_listing_copy_schema();
        let required = schema["required"].as_array().map(Vec::len);
        assert_eq!(required, Some(5));
        assert_eq!(schema["properties"]["tags"]["type"], json!("array"));
    }
}
