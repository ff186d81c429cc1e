use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::{RuleTemplate, default_catalog};

pub const DEFAULT_USER_AGENT: &str = "ga4tool/0.2";
pub const DEFAULT_CHANNEL_GROUP: &str = "Custom Channel Group";
pub const DEFAULT_ADMIN_ENDPOINT: &str = "https://analyticsadmin.googleapis.com/v1alpha";
pub const DEFAULT_DATA_ENDPOINT: &str = "https://analyticsdata.googleapis.com/v1beta";
pub const DEFAULT_CONFIG_FILE: &str = "ga4tool.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub analytics: AnalyticsSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub catalog: CatalogSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AnalyticsSection {
    pub property: Option<String>,
    pub channel_group: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub admin_endpoint: Option<String>,
    pub data_endpoint: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CatalogSection {
    #[serde(default)]
    pub rules: Vec<CatalogRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CatalogRule {
    pub display_name: String,
    #[serde(default = "default_rule_field")]
    pub field_name: String,
    #[serde(default = "default_rule_match")]
    pub match_type: String,
    pub value: String,
}

fn default_rule_field() -> String {
    "source".to_string()
}

fn default_rule_match() -> String {
    "CONTAINS".to_string()
}

impl ToolConfig {
    /// Resolve the GA4 property: env GA4_PROPERTY_ID > config > None.
    pub fn property(&self) -> Option<String> {
        if let Ok(value) = env::var("GA4_PROPERTY_ID") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        self.analytics.property.clone()
    }

    /// Resolve the target channel group: env GA4_CHANNEL_GROUP > config > DEFAULT_CHANNEL_GROUP.
    pub fn channel_group(&self) -> String {
        if let Ok(value) = env::var("GA4_CHANNEL_GROUP") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.analytics
            .channel_group
            .clone()
            .unwrap_or_else(|| DEFAULT_CHANNEL_GROUP.to_string())
    }

    /// Resolve the Admin API endpoint: env GA_ADMIN_ENDPOINT > config > DEFAULT_ADMIN_ENDPOINT.
    pub fn admin_endpoint(&self) -> String {
        if let Ok(value) = env::var("GA_ADMIN_ENDPOINT") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.trim_end_matches('/').to_string();
            }
        }
        self.http
            .admin_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ADMIN_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the Data API endpoint: env GA_DATA_ENDPOINT > config > DEFAULT_DATA_ENDPOINT.
    pub fn data_endpoint(&self) -> String {
        if let Ok(value) = env::var("GA_DATA_ENDPOINT") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.trim_end_matches('/').to_string();
            }
        }
        self.http
            .data_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_DATA_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve user agent: env GA4_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("GA4_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.http
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Catalog used by the channel merge: configured rules when present,
    /// the built-in catalog otherwise.
    pub fn rule_catalog(&self) -> Vec<RuleTemplate> {
        if self.catalog.rules.is_empty() {
            return default_catalog();
        }
        self.catalog
            .rules
            .iter()
            .map(|rule| RuleTemplate {
                display_name: rule.display_name.clone(),
                field_name: rule.field_name.clone(),
                match_type: rule.match_type.clone(),
                value: rule.value.clone(),
            })
            .collect()
    }
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Resolve the config file path: explicit flag > env GA4TOOL_CONFIG > ./ga4tool.toml.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(value) = env::var("GA4TOOL_CONFIG") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Validate a GA4 property identifier of the form `properties/<id>`.
pub fn ensure_property_id(property: &str) -> Result<()> {
    match property.strip_prefix("properties/") {
        Some(id) if !id.is_empty() => Ok(()),
        _ => bail!("GA4 property id must look like 'properties/123456789', got: {property}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_overrides() {
        let config = ToolConfig::default();
        assert!(config.analytics.property.is_none());
        assert!(config.analytics.channel_group.is_none());
        assert!(config.http.admin_endpoint.is_none());
        assert!(config.catalog.rules.is_empty());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/ga4tool.toml")).expect("load config");
        assert!(config.analytics.property.is_none());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ga4tool.toml");
        fs::write(
            &config_path,
            r#"
[analytics]
property = "properties/123456789"
channel_group = "Acquisition Channels"

[http]
admin_endpoint = "https://admin.example.test/v1alpha"
data_endpoint = "https://data.example.test/v1beta"
user_agent = "test-agent/1.0"

[[catalog.rules]]
display_name = "Docs - Internal"
field_name = "pagePath"
match_type = "EXACT"
value = "/docs"

[[catalog.rules]]
display_name = "Grok - AI"
value = "grok"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.analytics.property.as_deref(),
            Some("properties/123456789")
        );
        assert_eq!(
            config.analytics.channel_group.as_deref(),
            Some("Acquisition Channels")
        );
        assert_eq!(
            config.http.admin_endpoint.as_deref(),
            Some("https://admin.example.test/v1alpha")
        );
        assert_eq!(config.catalog.rules.len(), 2);
        assert_eq!(config.catalog.rules[0].field_name, "pagePath");
        assert_eq!(config.catalog.rules[0].match_type, "EXACT");
        // Omitted rule fields fall back to the source/CONTAINS defaults.
        assert_eq!(config.catalog.rules[1].field_name, "source");
        assert_eq!(config.catalog.rules[1].match_type, "CONTAINS");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ga4tool.toml");
        fs::write(&config_path, "[analytics]\nproperty = \"properties/42\"\n")
            .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.analytics.property.as_deref(), Some("properties/42"));
        assert!(config.http.user_agent.is_none());
        assert!(config.catalog.rules.is_empty());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ga4tool.toml");
        fs::write(&config_path, "[analytics\nproperty = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn default_channel_group() {
        let config = ToolConfig::default();
        assert_eq!(config.channel_group(), "Custom Channel Group");
    }

    #[test]
    fn default_endpoints_point_at_google() {
        let config = ToolConfig::default();
        assert_eq!(
            config.admin_endpoint(),
            "https://analyticsadmin.googleapis.com/v1alpha"
        );
        assert_eq!(
            config.data_endpoint(),
            "https://analyticsdata.googleapis.com/v1beta"
        );
    }

    #[test]
    fn endpoints_drop_trailing_slashes() {
        let mut config = ToolConfig::default();
        config.http.admin_endpoint = Some("https://admin.example.test/v1alpha/".to_string());
        assert_eq!(config.admin_endpoint(), "https://admin.example.test/v1alpha");
    }

    #[test]
    fn rule_catalog_defaults_to_builtin_rules() {
        let config = ToolConfig::default();
        let catalog = config.rule_catalog();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog[0].display_name, "ChatGPT - AI");
    }

    #[test]
    fn rule_catalog_prefers_configured_rules() {
        let mut config = ToolConfig::default();
        config.catalog.rules.push(CatalogRule {
            display_name: "Grok - AI".to_string(),
            field_name: "source".to_string(),
            match_type: "CONTAINS".to_string(),
            value: "grok".to_string(),
        });

        let catalog = config.rule_catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].display_name, "Grok - AI");
        assert_eq!(catalog[0].value, "grok");
    }

    #[test]
    fn ensure_property_id_accepts_canonical_form() {
        assert!(ensure_property_id("properties/123456789").is_ok());
    }

    #[test]
    fn ensure_property_id_rejects_other_shapes() {
        assert!(ensure_property_id("123456789").is_err());
        assert!(ensure_property_id("properties/").is_err());
        assert!(ensure_property_id("").is_err());
    }

    #[test]
    fn resolve_config_path_prefers_explicit_path() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(resolved, PathBuf::from("/tmp/custom.toml"));
    }
}
