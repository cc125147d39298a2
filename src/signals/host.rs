use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::settings::SettingsStore;

use super::{IdleState, Signal, TabId};

/// Window id the browser reports when none of its windows hold input focus.
pub const WINDOW_ID_NONE: i64 = -1;

/// Raw browser events as forwarded by the extension.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    TabActivated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TabUpdated { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    /// `permission_denied` is set when the extension cannot observe window
    /// focus at all.
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged {
        window_id: Option<i64>,
        #[serde(default)]
        permission_denied: bool,
    },
    IdleStateChanged { state: IdleState },
    #[serde(rename_all = "camelCase")]
    ConfigChanged { key: String, new_value: Value },
}

/// Asynchronous lookup of a tab's current URL.
#[async_trait]
pub trait TabResolver: Send + Sync {
    async fn resolve_url(&self, tab_id: TabId) -> Option<String>;
}

/// Last known URL per tab, fed by `tabActivated`/`tabUpdated` events.
#[derive(Default)]
pub struct TabRegistry {
    urls: RwLock<HashMap<TabId, String>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tab_id: TabId, url: String) {
        let mut guard = self.urls.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(tab_id, url);
    }

    pub fn forget(&self, tab_id: TabId) {
        let mut guard = self.urls.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(&tab_id);
    }

    pub fn url_for(&self, tab_id: TabId) -> Option<String> {
        let guard = self.urls.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(&tab_id).cloned()
    }
}

#[async_trait]
impl TabResolver for TabRegistry {
    async fn resolve_url(&self, tab_id: TabId) -> Option<String> {
        self.url_for(tab_id)
    }
}

/// Turns [`HostEvent`]s into engine [`Signal`]s, updating the tab registry and
/// the settings store on the way.
#[derive(Clone)]
pub struct SignalAdapter {
    registry: Arc<TabRegistry>,
    settings: Arc<SettingsStore>,
}

impl SignalAdapter {
    pub fn new(registry: Arc<TabRegistry>, settings: Arc<SettingsStore>) -> Self {
        Self { registry, settings }
    }

    pub fn tabs(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn normalize(&self, event: HostEvent) -> Option<Signal> {
        match event {
            HostEvent::TabActivated { tab_id, url } => {
                if let Some(url) = url {
                    self.registry.record(tab_id, url);
                }
                Some(Signal::TabSwitch(tab_id))
            }
            HostEvent::TabUpdated { tab_id, url } => {
                self.registry.record(tab_id, url);
                None
            }
            HostEvent::TabRemoved { tab_id } => {
                self.registry.forget(tab_id);
                None
            }
            HostEvent::WindowFocusChanged {
                window_id,
                permission_denied,
            } => {
                if permission_denied {
                    debug!("window focus unavailable; assuming browser is active");
                    return Some(Signal::WindowFocus { focused: true });
                }
                let focused = !matches!(window_id, None | Some(WINDOW_ID_NONE));
                Some(Signal::WindowFocus { focused })
            }
            HostEvent::IdleStateChanged { state } => Some(Signal::Idle(state)),
            HostEvent::ConfigChanged { key, new_value } => {
                match self.settings.apply_change(&key, new_value) {
                    Ok(change) => change.map(Signal::ConfigChange),
                    Err(err) => {
                        warn!("ignoring config change for {key}: {err:#}");
                        None
                    }
                }
            }
        }
    }
}
