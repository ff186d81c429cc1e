use serde_json::{Value, json};

// String match operator codes understood by the Admin API filter schema.
const MATCH_TYPE_EXACT: u64 = 1;
const MATCH_TYPE_CONTAINS: u64 = 4;

/// One classification-rule template: the local description of a grouping
/// rule before it is expanded into the Admin API expression shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTemplate {
    pub display_name: String,
    pub field_name: String,
    pub match_type: String,
    pub value: String,
}

/// Built-in catalog of AI traffic sources appended by `channels`.
pub fn default_catalog() -> Vec<RuleTemplate> {
    [
        ("ChatGPT - AI", "chatgpt"),
        ("Perplexity - AI", "perplexity"),
        ("Gemini - AI", "gemini"),
        ("Copilot.microsoft - AI", "copilot.microsoft"),
        ("Claude - AI", "claude"),
        ("Meta - AI", "meta"),
    ]
    .into_iter()
    .map(|(display_name, value)| RuleTemplate {
        display_name: display_name.to_string(),
        field_name: "source".to_string(),
        match_type: "CONTAINS".to_string(),
        value: value.to_string(),
    })
    .collect()
}

/// Expand a template into the grouping-rule JSON the Admin API expects.
/// The AND group wrapping a single OR group wrapping a single filter leaf is
/// structural boilerplate required by the remote schema.
pub fn build_grouping_rule(template: &RuleTemplate) -> Value {
    let field_name = if template.field_name == "source" {
        "eachScopeSource"
    } else {
        template.field_name.as_str()
    };
    let match_type = if template.match_type == "CONTAINS" {
        MATCH_TYPE_CONTAINS
    } else {
        MATCH_TYPE_EXACT
    };

    json!({
        "displayName": template.display_name,
        "expression": {
            "andGroup": {
                "filterExpressions": [
                    {
                        "orGroup": {
                            "filterExpressions": [
                                {
                                    "filter": {
                                        "fieldName": field_name,
                                        "stringFilter": {
                                            "matchType": match_type,
                                            "value": template.value,
                                            "caseSensitive": false,
                                        },
                                    },
                                },
                            ],
                        },
                    },
                ],
            },
        },
    })
}
