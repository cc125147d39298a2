//! Redirect rules that keep blocklisted hosts out of the main frame.

use serde::{Deserialize, Serialize};

pub const BLOCKED_PAGE_PATH: &str = "/blocked.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Redirect { redirect: Redirect },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<String>,
}

/// One redirect rule per blocklist entry, ids starting at 1.
/// With focus mode off blocking is paused and no rules are produced.
pub fn compile_rules<S: AsRef<str>>(blocklist: &[S], focus_mode: bool) -> Vec<BlockingRule> {
    if !focus_mode {
        return Vec::new();
    }

    blocklist
        .iter()
        .enumerate()
        .map(|(index, host)| BlockingRule {
            id: u32::try_from(index + 1).unwrap_or(u32::MAX),
            priority: 1,
            action: RuleAction::Redirect {
                redirect: Redirect {
                    extension_path: BLOCKED_PAGE_PATH.to_string(),
                },
            },
            condition: RuleCondition {
                url_filter: format!("*://*{}/*", host.as_ref()),
                resource_types: vec!["main_frame".to_string()],
            },
        })
        .collect()
}
