use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{db::Database, focus::FocusSnapshot};

pub const FOCUS_LEVEL_KEY: &str = "focusLevel";
pub const IS_BROWSER_FOCUSED_KEY: &str = "isBrowserFocused";
pub const IS_IDLE_KEY: &str = "isIdle";
pub const CURRENT_URL_KEY: &str = "currentUrl";

/// The focus fields observers can read back from local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusMirror {
    pub focus_level: u8,
    pub is_browser_focused: bool,
    pub is_idle: bool,
    pub current_url: String,
}

impl From<&FocusSnapshot> for FocusMirror {
    fn from(snapshot: &FocusSnapshot) -> Self {
        Self {
            focus_level: snapshot.focus_level,
            is_browser_focused: snapshot.is_browser_focused,
            is_idle: snapshot.is_idle,
            current_url: snapshot.current_url.clone(),
        }
    }
}

impl Database {
    pub async fn write_focus_mirror(&self, snapshot: &FocusSnapshot) -> Result<()> {
        self.set_items(vec![
            (FOCUS_LEVEL_KEY, Value::from(snapshot.focus_level)),
            (IS_BROWSER_FOCUSED_KEY, Value::from(snapshot.is_browser_focused)),
            (IS_IDLE_KEY, Value::from(snapshot.is_idle)),
            (CURRENT_URL_KEY, Value::from(snapshot.current_url.clone())),
        ])
        .await
    }

    /// `None` until the first broadcast has been mirrored.
    pub async fn read_focus_mirror(&self) -> Result<Option<FocusMirror>> {
        let mut items = self
            .get_items(&[
                FOCUS_LEVEL_KEY,
                IS_BROWSER_FOCUSED_KEY,
                IS_IDLE_KEY,
                CURRENT_URL_KEY,
            ])
            .await?;

        let (Some(level), Some(focused), Some(idle), Some(url)) = (
            items.remove(FOCUS_LEVEL_KEY),
            items.remove(IS_BROWSER_FOCUSED_KEY),
            items.remove(IS_IDLE_KEY),
            items.remove(CURRENT_URL_KEY),
        ) else {
            return Ok(None);
        };

        Ok(Some(FocusMirror {
            focus_level: serde_json::from_value(level)?,
            is_browser_focused: serde_json::from_value(focused)?,
            is_idle: serde_json::from_value(idle)?,
            current_url: serde_json::from_value(url)?,
        }))
    }
}
