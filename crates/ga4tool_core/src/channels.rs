use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{RuleTemplate, build_grouping_rule};
use crate::client::GaApiClient;
use crate::config::ToolConfig;

/// A channel group as returned by the Admin API. Existing grouping rules are
/// kept as raw JSON so an update round-trips them byte-for-byte; only the
/// rule display name is ever interpreted locally.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelGroup {
    pub name: String,
    pub display_name: String,
    pub system_defined: bool,
    pub grouping_rule: Vec<Value>,
}

pub trait ChannelAdminApi {
    fn list_channel_groups(&mut self, property: &str) -> Result<Vec<ChannelGroup>>;
    fn update_grouping_rule(&mut self, group_name: &str, rules: &[Value]) -> Result<ChannelGroup>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub group_name: String,
    pub group_display_name: String,
    pub added: Vec<String>,
    pub updated: bool,
    pub request_count: usize,
}

pub fn merge_channel_rules(
    config: &ToolConfig,
    property: &str,
    group_display_name: &str,
    catalog: &[RuleTemplate],
) -> Result<MergeReport> {
    let mut client = GaApiClient::from_config(config)?;
    merge_channel_rules_with_api(&mut client, property, group_display_name, catalog)
}

fn merge_channel_rules_with_api<A: ChannelAdminApi>(
    api: &mut A,
    property: &str,
    group_display_name: &str,
    catalog: &[RuleTemplate],
) -> Result<MergeReport> {
    let target_name = group_display_name.trim();

    let groups = api.list_channel_groups(property)?;
    let target = groups.into_iter().find(|group| {
        !group.system_defined && group.display_name.to_lowercase() == target_name.to_lowercase()
    });
    let Some(target) = target else {
        bail!("channel group \"{target_name}\" not found (or system-defined) on {property}");
    };

    let missing: Vec<&RuleTemplate> = catalog
        .iter()
        .filter(|template| !has_rule_named(&target.grouping_rule, &template.display_name))
        .collect();

    if missing.is_empty() {
        return Ok(MergeReport {
            group_name: target.name,
            group_display_name: target.display_name,
            added: Vec::new(),
            updated: false,
            request_count: api.request_count(),
        });
    }

    let mut merged = target.grouping_rule.clone();
    let mut added = Vec::with_capacity(missing.len());
    for template in missing {
        merged.push(build_grouping_rule(template));
        added.push(template.display_name.clone());
    }

    let updated_group = api.update_grouping_rule(&target.name, &merged)?;
    Ok(MergeReport {
        group_name: updated_group.name,
        group_display_name: updated_group.display_name,
        added,
        updated: true,
        request_count: api.request_count(),
    })
}

fn has_rule_named(rules: &[Value], display_name: &str) -> bool {
    let needle = display_name.to_lowercase();
    rules.iter().any(|rule| {
        rule.get("displayName")
            .and_then(Value::as_str)
            .is_some_and(|name| name.to_lowercase() == needle)
    })
}
