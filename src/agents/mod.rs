//! Agent kinds and the per-kind view of a configuration document.
//!
//! Browser (RUM) agents run on untrusted clients and only understand a small
//! set of settings, so their route narrows every document to an allow-list.
//! Backend agents receive the whole document.

use crate::store::{ConfigDocument, Settings};

/// Settings a RUM agent may receive.
pub const RUM_ALLOWED_SETTINGS: &[&str] = &["transaction_sample_rate"];

/// Agent names registered by browser agents.
pub const RUM_AGENT_NAMES: &[&str] = &["rum-js", "js-base"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Rum,
    Backend,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Rum => "rum",
            AgentKind::Backend => "backend",
        }
    }
}

/// Whether a document registered for `agent_name` applies to `kind`.
/// Documents without an agent name apply to every agent.
fn applies_to(agent_name: Option<&str>, kind: AgentKind) -> bool {
    match (kind, agent_name) {
        (AgentKind::Backend, _) | (AgentKind::Rum, None) => true,
        (AgentKind::Rum, Some(name)) => RUM_AGENT_NAMES.contains(&name),
    }
}

/// The settings of `document` visible to an agent of `kind`.
pub fn filter_for_agent_kind(document: &ConfigDocument, kind: AgentKind) -> Settings {
    match kind {
        AgentKind::Backend => document.settings.clone(),
        AgentKind::Rum if !applies_to(document.agent_name.as_deref(), kind) => Settings::new(),
        AgentKind::Rum => document
            .settings
            .iter()
            .filter(|(k, _)| RUM_ALLOWED_SETTINGS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}
