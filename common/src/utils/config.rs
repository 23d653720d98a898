use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_content_model")]
    pub content_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    pub printify_api_token: String,
    pub printify_shop_id: String,
    #[serde(default = "default_printify_base_url")]
    pub printify_base_url: String,
    /// Endpoint that accepts `{ "image_url": ... }` and answers with a
    /// transparent-background copy. Upload-mode items skip background removal
    /// when unset.
    #[serde(default)]
    pub background_removal_url: Option<String>,
    #[serde(default = "default_max_items_per_job")]
    pub max_items_per_job: u32,
    #[serde(default = "default_external_call_timeout_secs")]
    pub external_call_timeout_secs: u64,
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: i64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_content_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_printify_base_url() -> String {
    "https://api.printify.com/v1".to_string()
}

fn default_max_items_per_job() -> u32 {
    50
}

fn default_external_call_timeout_secs() -> u64 {
    60
}

fn default_item_timeout_secs() -> u64 {
    240
}

fn default_job_lease_secs() -> i64 {
    300
}

fn default_retry_delay_ms() -> u64 {
    1_500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "storefront".to_string(),
            surrealdb_database: "storefront".to_string(),
            http_port: 3000,
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            content_model: default_content_model(),
            image_model: default_image_model(),
            printify_api_token: String::new(),
            printify_shop_id: String::new(),
            printify_base_url: default_printify_base_url(),
            background_removal_url: None,
            max_items_per_job: default_max_items_per_job(),
            external_call_timeout_secs: default_external_call_timeout_secs(),
            item_timeout_secs: default_item_timeout_secs(),
            job_lease_secs: default_job_lease_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_item_budget_inside_lease() {
        let config = AppConfig::default();
        let lease = u64::try_from(config.job_lease_secs).unwrap_or(0);
        assert!(config.item_timeout_secs < lease);
        assert!(config.external_call_timeout_secs <= config.item_timeout_secs);
    }

    #[test]
    fn deserializes_with_optional_fields_defaulted() {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .and_then(|b| b.set_override("surrealdb_username", "root"))
            .and_then(|b| b.set_override("surrealdb_password", "root"))
            .and_then(|b| b.set_override("surrealdb_namespace", "ns"))
            .and_then(|b| b.set_override("surrealdb_database", "db"))
            .and_then(|b| b.set_override("http_port", 8080))
            .and_then(|b| b.set_override("openai_api_key", "sk-test"))
            .and_then(|b| b.set_override("printify_api_token", "token"))
            .and_then(|b| b.set_override("printify_shop_id", "123"))
            .expect("overrides")
            .build()
            .expect("build config");

        let parsed: AppConfig = config.try_deserialize().expect("deserialize");
        assert_eq!(parsed.http_port, 8080);
        assert_eq!(parsed.content_model, "gpt-4o-mini");
        assert_eq!(parsed.printify_base_url, "https://api.printify.com/v1");
        assert_eq!(parsed.max_items_per_job, 50);
        assert!(parsed.background_removal_url.is_none());
    }
}
