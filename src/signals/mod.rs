//! Abstract signals consumed by the focus engine.
//!
//! Native browser events arrive through [`host`] and are normalized into the
//! closed [`Signal`] set before they reach [`crate::focus::FocusController`].

pub mod host;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::focus::BinduStyle;

pub use host::{HostEvent, SignalAdapter, TabRegistry, TabResolver};

/// Browser tab identifier. Opaque to the engine apart from equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform idle state. The platform samples it coarsely (~10s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

impl IdleState {
    /// Locked screens count as idle.
    pub fn is_idle(self) -> bool {
        matches!(self, IdleState::Idle | IdleState::Locked)
    }
}

/// A settings key that changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Blocklist(Vec<String>),
    DisplayStyle(BinduStyle),
    RingEnabled(bool),
    FocusMode(bool),
    ReminderInterval(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    TabSwitch(TabId),
    WindowFocus { focused: bool },
    Idle(IdleState),
    Distraction,
    ConfigChange(ConfigChange),
}

impl From<ConfigChange> for Signal {
    fn from(change: ConfigChange) -> Self {
        Signal::ConfigChange(change)
    }
}
