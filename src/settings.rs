use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{focus::BinduStyle, signals::ConfigChange};

pub const DEFAULT_REMINDER_INTERVAL_MINUTES: u32 = 10;

/// Keys of the sync settings area, as the extension names them.
pub mod keys {
    pub const BLOCKED_URLS: &str = "blockedUrls";
    pub const REMINDER_INTERVAL: &str = "reminderInterval";
    pub const FOCUS_MODE: &str = "focusMode";
    pub const FOCUS_RING_ENABLED: &str = "focusRingEnabled";
    pub const BINDU_STYLE: &str = "binduStyle";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub blocked_urls: Vec<String>,
    pub reminder_interval: u32,
    pub focus_mode: bool,
    pub focus_ring_enabled: bool,
    pub bindu_style: BinduStyle,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            blocked_urls: Vec::new(),
            reminder_interval: DEFAULT_REMINDER_INTERVAL_MINUTES,
            focus_mode: true,
            focus_ring_enabled: true,
            bindu_style: BinduStyle::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn blocklist(&self) -> Vec<String> {
        self.read().blocked_urls.clone()
    }

    pub fn reminder_interval(&self) -> u32 {
        self.read().reminder_interval.max(1)
    }

    pub fn focus_mode(&self) -> bool {
        self.read().focus_mode
    }

    pub fn focus_ring_enabled(&self) -> bool {
        self.read().focus_ring_enabled
    }

    pub fn bindu_style(&self) -> BinduStyle {
        self.read().bindu_style.clone()
    }

    /// Stores `value` under `key` and reports what changed.
    ///
    /// Returns `Ok(None)` for unknown keys and for writes that leave the value
    /// as it was, mirroring how the browser only fires change events on an
    /// actual difference. The in-memory value only changes once the file
    /// write succeeded, so a failed write can be retried with the same value.
    pub fn apply_change(&self, key: &str, value: Value) -> Result<Option<ConfigChange>> {
        let mut guard = self.write();
        let mut next = guard.clone();
        let change = match key {
            keys::BLOCKED_URLS => {
                let urls: Vec<String> = serde_json::from_value(value)
                    .with_context(|| format!("{key} must be a list of strings"))?;
                if next.blocked_urls == urls {
                    return Ok(None);
                }
                next.blocked_urls = urls.clone();
                ConfigChange::Blocklist(urls)
            }
            keys::REMINDER_INTERVAL => {
                let Some(minutes) = value.as_u64() else {
                    bail!("{key} must be a positive number of minutes");
                };
                let minutes = u32::try_from(minutes.max(1)).unwrap_or(u32::MAX);
                if next.reminder_interval == minutes {
                    return Ok(None);
                }
                next.reminder_interval = minutes;
                ConfigChange::ReminderInterval(minutes)
            }
            keys::FOCUS_MODE => {
                let enabled = expect_bool(key, &value)?;
                if next.focus_mode == enabled {
                    return Ok(None);
                }
                next.focus_mode = enabled;
                ConfigChange::FocusMode(enabled)
            }
            keys::FOCUS_RING_ENABLED => {
                let enabled = expect_bool(key, &value)?;
                if next.focus_ring_enabled == enabled {
                    return Ok(None);
                }
                next.focus_ring_enabled = enabled;
                ConfigChange::RingEnabled(enabled)
            }
            keys::BINDU_STYLE => {
                let Some(tag) = value.as_str() else {
                    bail!("{key} must be a string");
                };
                let style = BinduStyle::from_tag(tag);
                if next.bindu_style == style {
                    return Ok(None);
                }
                next.bindu_style = style.clone();
                ConfigChange::DisplayStyle(style)
            }
            other => {
                debug!("ignoring change to unrelated settings key {other}");
                return Ok(None);
            }
        };

        self.persist(&next)?;
        *guard = next;
        info!("Setting {key} updated");
        Ok(Some(change))
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    match value.as_bool() {
        Some(flag) => Ok(flag),
        None => bail!("{key} must be a boolean"),
    }
}
