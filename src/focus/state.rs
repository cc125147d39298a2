use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::signals::TabId;

pub const BASELINE_FOCUS_LEVEL: u8 = 50;
pub const MAX_FOCUS_LEVEL: u8 = 100;

/// Calibration table for focus adjustments. Negative deltas are decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusConfig {
    pub tab_switch_penalty: i32,
    pub distraction_penalty: i32,
    pub idle_penalty: i32,
    pub window_blur_penalty: i32,
    pub continuous_focus_gain: i32,
    pub idle_tick_penalty: i32,
    pub decay_penalty: i32,
    pub focus_mode_on_boost: i32,
    pub focus_mode_off_penalty: i32,

    /// Dwell time on one tab before the reward tick starts paying out.
    pub focus_threshold: Duration,
    pub reward_interval: Duration,
    pub decay_interval: Duration,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            tab_switch_penalty: -20,
            distraction_penalty: -30,
            idle_penalty: -5,
            window_blur_penalty: -5,
            continuous_focus_gain: 2,
            idle_tick_penalty: -1,
            decay_penalty: -2,
            focus_mode_on_boost: 15,
            focus_mode_off_penalty: -10,
            focus_threshold: Duration::from_secs(30),
            reward_interval: Duration::from_secs(5),
            decay_interval: Duration::from_secs(10),
        }
    }
}

/// Display style of the focus indicator. Carried through to observers only,
/// so tags this host doesn't know are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BinduStyle {
    #[default]
    Glow,
    Ripple,
    Minimal,
    Other(String),
}

impl BinduStyle {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "glow" => BinduStyle::Glow,
            "ripple" => BinduStyle::Ripple,
            "minimal" => BinduStyle::Minimal,
            other => {
                debug!("passing through unknown bindu style {other:?}");
                BinduStyle::Other(other.to_string())
            }
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            BinduStyle::Glow => "glow",
            BinduStyle::Ripple => "ripple",
            BinduStyle::Minimal => "minimal",
            BinduStyle::Other(tag) => tag,
        }
    }
}

impl From<String> for BinduStyle {
    fn from(tag: String) -> Self {
        BinduStyle::from_tag(&tag)
    }
}

impl From<BinduStyle> for String {
    fn from(style: BinduStyle) -> Self {
        style.as_tag().to_string()
    }
}

/// The externally visible part of [`FocusState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSnapshot {
    pub focus_level: u8,
    pub is_browser_focused: bool,
    pub is_idle: bool,
    pub current_url: String,
    pub bindu_style: BinduStyle,
}

#[derive(Debug, Clone)]
pub struct FocusState {
    pub focus_level: u8,
    pub current_tab_id: Option<TabId>,
    pub current_url: String,
    pub is_idle: bool,
    pub is_browser_focused: bool,
    pub last_activity_time: Instant,
    /// Start of the current unbroken dwell on the active tab.
    pub continuous_focus_start: Instant,
    pub focus_ring_enabled: bool,
    pub bindu_style: BinduStyle,
    config: FocusConfig,
}

impl FocusState {
    pub fn new(config: FocusConfig, now: Instant) -> Self {
        Self {
            focus_level: BASELINE_FOCUS_LEVEL,
            current_tab_id: None,
            current_url: String::new(),
            is_idle: false,
            is_browser_focused: true,
            last_activity_time: now,
            continuous_focus_start: now,
            focus_ring_enabled: true,
            bindu_style: BinduStyle::default(),
            config,
        }
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    /// Adds `delta` and clamps to `0..=100`. Returns the new level.
    pub fn apply_adjustment(&mut self, delta: i32) -> u8 {
        let previous = self.focus_level;
        let next = (i32::from(previous) + delta).clamp(0, i32::from(MAX_FOCUS_LEVEL));
        self.focus_level = next as u8;
        if delta >= 0 {
            debug!("Focus increased to {} ({:+})", self.focus_level, delta);
        } else {
            debug!("Focus decreased to {} ({:+})", self.focus_level, delta);
        }
        self.focus_level
    }

    /// Makes `tab_id` the active tab without any penalty.
    pub fn seed_active_tab(&mut self, tab_id: TabId, url: Option<String>, now: Instant) {
        self.current_tab_id = Some(tab_id);
        self.current_url = url.unwrap_or_default();
        self.continuous_focus_start = now;
    }

    /// Returns `false` when `tab_id` already is the active tab.
    pub fn switch_tab(&mut self, tab_id: TabId, now: Instant) -> bool {
        if self.current_tab_id == Some(tab_id) {
            return false;
        }

        self.apply_adjustment(self.config.tab_switch_penalty);
        self.current_tab_id = Some(tab_id);
        self.last_activity_time = now;
        self.continuous_focus_start = now;
        true
    }

    /// Stores a resolved URL if `tab_id` is still the active tab.
    pub fn set_resolved_url(&mut self, tab_id: TabId, url: String) -> bool {
        if self.current_tab_id != Some(tab_id) {
            return false;
        }
        self.current_url = url;
        true
    }

    /// The blur penalty only applies on a focused -> unfocused edge.
    pub fn window_focus_changed(&mut self, has_focus: bool, now: Instant) -> bool {
        if has_focus {
            self.is_browser_focused = true;
            self.last_activity_time = now;
            return true;
        }

        if !self.is_browser_focused {
            return false;
        }
        self.is_browser_focused = false;
        self.apply_adjustment(self.config.window_blur_penalty);
        true
    }

    /// Edge-triggered: repeated reports of the same state are no-ops.
    pub fn idle_changed(&mut self, idle: bool, now: Instant) -> bool {
        match (self.is_idle, idle) {
            (false, true) => {
                self.is_idle = true;
                self.apply_adjustment(self.config.idle_penalty);
                true
            }
            (true, false) => {
                self.is_idle = false;
                self.last_activity_time = now;
                true
            }
            _ => false,
        }
    }

    pub fn distraction_detected(&mut self) -> u8 {
        self.apply_adjustment(self.config.distraction_penalty)
    }

    pub fn focus_mode_toggled(&mut self, enabled: bool) -> u8 {
        let delta = if enabled {
            self.config.focus_mode_on_boost
        } else {
            self.config.focus_mode_off_penalty
        };
        self.apply_adjustment(delta)
    }

    /// Continuous-focus reward or idle penalty. The reward is paid on every
    /// tick once the dwell passes the threshold, not once per dwell.
    pub fn tick_reward(&mut self, now: Instant) -> bool {
        if self.is_browser_focused && !self.is_idle {
            let time_on_tab = now.saturating_duration_since(self.continuous_focus_start);
            if time_on_tab > self.config.focus_threshold {
                self.apply_adjustment(self.config.continuous_focus_gain);
                return true;
            }
            false
        } else if self.is_idle {
            self.apply_adjustment(self.config.idle_tick_penalty);
            true
        } else {
            false
        }
    }

    pub fn tick_decay(&mut self) -> bool {
        if !self.is_browser_focused || self.is_idle {
            self.apply_adjustment(self.config.decay_penalty);
            return true;
        }
        false
    }

    pub fn reset(&mut self, now: Instant) {
        self.focus_level = BASELINE_FOCUS_LEVEL;
        self.continuous_focus_start = now;
    }

    pub fn snapshot(&self) -> FocusSnapshot {
        FocusSnapshot {
            focus_level: self.focus_level,
            is_browser_focused: self.is_browser_focused,
            is_idle: self.is_idle,
            current_url: self.current_url.clone(),
            bindu_style: self.bindu_style.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state() -> (FocusState, Instant) {
        let now = Instant::now();
        (FocusState::new(FocusConfig::default(), now), now)
    }

    #[test]
    fn starts_at_baseline() {
        let (state, _) = state();
        assert_eq!(state.focus_level, 50);
        assert!(state.is_browser_focused);
        assert!(!state.is_idle);
        assert_eq!(state.current_tab_id, None);
    }

    #[test]
    fn tab_switch_then_distraction_clamps_at_zero() {
        let (mut state, now) = state();
        assert!(state.switch_tab(TabId(2), now));
        assert_eq!(state.focus_level, 30);

        assert_eq!(state.distraction_detected(), 0);
    }

    #[test]
    fn switching_to_the_active_tab_is_free() {
        let (mut state, now) = state();
        state.seed_active_tab(TabId(1), Some("https://a.dev".into()), now);
        assert!(!state.switch_tab(TabId(1), now + Duration::from_secs(1)));
        assert_eq!(state.focus_level, 50);
    }

    #[test]
    fn tab_switch_restarts_dwell() {
        let (mut state, now) = state();
        let later = now + Duration::from_secs(40);
        state.switch_tab(TabId(9), later);
        assert_eq!(state.continuous_focus_start, later);
        assert_eq!(state.last_activity_time, later);
    }

    #[test]
    fn stale_url_is_ignored() {
        let (mut state, now) = state();
        state.switch_tab(TabId(1), now);
        state.switch_tab(TabId(2), now);
        assert!(!state.set_resolved_url(TabId(1), "https://old.example".into()));
        assert!(state.set_resolved_url(TabId(2), "https://new.example".into()));
        assert_eq!(state.current_url, "https://new.example");
    }

    #[test]
    fn blur_then_two_decays() {
        let (mut state, now) = state();
        state.window_focus_changed(false, now);
        assert_eq!(state.focus_level, 45);

        state.tick_decay();
        state.tick_decay();
        assert_eq!(state.focus_level, 41);
    }

    #[test]
    fn repeated_blur_is_penalized_once() {
        let (mut state, now) = state();
        assert!(state.window_focus_changed(false, now));
        assert!(!state.window_focus_changed(false, now));
        assert_eq!(state.focus_level, 45);
    }

    #[test]
    fn regaining_focus_records_activity() {
        let (mut state, now) = state();
        state.window_focus_changed(false, now);
        let later = now + Duration::from_secs(3);
        state.window_focus_changed(true, later);
        assert!(state.is_browser_focused);
        assert_eq!(state.last_activity_time, later);
        assert_eq!(state.focus_level, 45);
    }

    #[test]
    fn idle_penalty_is_edge_triggered() {
        let (mut state, now) = state();
        assert!(state.idle_changed(true, now));
        assert!(!state.idle_changed(true, now));
        assert!(!state.idle_changed(true, now));
        assert_eq!(state.focus_level, 45);

        let later = now + Duration::from_secs(10);
        assert!(state.idle_changed(false, later));
        assert_eq!(state.last_activity_time, later);
        assert_eq!(state.focus_level, 45);
    }

    #[test]
    fn reward_only_after_threshold() {
        let (mut state, start) = state();
        for secs in (5..=30).step_by(5) {
            assert!(!state.tick_reward(start + Duration::from_secs(secs)));
        }
        assert_eq!(state.focus_level, 50);

        assert!(state.tick_reward(start + Duration::from_secs(35)));
        assert_eq!(state.focus_level, 52);

        // Keeps paying while the dwell continues.
        state.tick_reward(start + Duration::from_secs(40));
        assert_eq!(state.focus_level, 54);
    }

    #[test]
    fn idle_tick_penalty_ignores_window_focus() {
        let (mut state, now) = state();
        state.idle_changed(true, now);
        state.window_focus_changed(false, now);
        assert_eq!(state.focus_level, 40);

        state.tick_reward(now + Duration::from_secs(60));
        assert_eq!(state.focus_level, 39);
    }

    #[test]
    fn unfocused_without_idle_earns_nothing() {
        let (mut state, now) = state();
        state.window_focus_changed(false, now);
        assert!(!state.tick_reward(now + Duration::from_secs(60)));
        assert_eq!(state.focus_level, 45);
    }

    #[test]
    fn decay_skips_engaged_user() {
        let (mut state, _) = state();
        assert!(!state.tick_decay());
        assert_eq!(state.focus_level, 50);
    }

    #[test]
    fn focus_mode_off_then_on() {
        let (mut state, _) = state();
        assert_eq!(state.focus_mode_toggled(false), 40);
        assert_eq!(state.focus_mode_toggled(true), 55);
    }

    #[test]
    fn reset_restores_baseline_and_dwell() {
        let (mut state, now) = state();
        state.apply_adjustment(-50);
        let later = now + Duration::from_secs(90);
        state.reset(later);
        assert_eq!(state.focus_level, 50);
        assert_eq!(state.continuous_focus_start, later);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let (mut state, _) = state();
        state.current_url = "https://docs.rs".into();
        state.bindu_style = BinduStyle::Ripple;

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "focusLevel": 50,
                "isBrowserFocused": true,
                "isIdle": false,
                "currentUrl": "https://docs.rs",
                "binduStyle": "ripple",
            })
        );
    }

    #[test]
    fn unknown_style_tags_pass_through_verbatim() {
        assert_eq!(BinduStyle::from_tag("ripple"), BinduStyle::Ripple);

        let custom = BinduStyle::from_tag("Sparkle");
        assert_eq!(custom, BinduStyle::Other("Sparkle".to_string()));
        assert_eq!(serde_json::to_value(&custom).unwrap(), serde_json::json!("Sparkle"));

        let parsed: BinduStyle = serde_json::from_str("\"minimal\"").unwrap();
        assert_eq!(parsed, BinduStyle::Minimal);
    }

    proptest! {
        #[test]
        fn level_stays_in_bounds(deltas in proptest::collection::vec(-250i32..250, 0..64)) {
            let (mut state, _) = state();
            for delta in deltas {
                let level = state.apply_adjustment(delta);
                prop_assert!(level <= MAX_FOCUS_LEVEL);
                prop_assert_eq!(level, state.focus_level);
            }
        }

        #[test]
        fn reset_always_returns_to_baseline(deltas in proptest::collection::vec(-100i32..100, 0..32)) {
            let (mut state, now) = state();
            for delta in deltas {
                state.apply_adjustment(delta);
            }
            state.reset(now);
            prop_assert_eq!(state.focus_level, BASELINE_FOCUS_LEVEL);
        }
    }
}
