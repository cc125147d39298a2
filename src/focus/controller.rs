use std::sync::Arc;

use log::{debug, info};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    settings::SettingsStore,
    signals::{ConfigChange, Signal, TabId, TabResolver},
};

use super::{classify, FocusConfig, FocusSnapshot, FocusState, StateBroadcaster};

#[derive(Debug, Clone, Copy)]
enum TickKind {
    Reward,
    Decay,
}

struct Tickers {
    cancel_token: CancellationToken,
    reward: JoinHandle<()>,
    decay: JoinHandle<()>,
}

/// Sole owner of the process-wide [`FocusState`].
///
/// Every mutation goes through the one mutex; the lock is never held across
/// URL resolution or publication.
#[derive(Clone)]
pub struct FocusController {
    state: Arc<Mutex<FocusState>>,
    settings: Arc<SettingsStore>,
    broadcaster: StateBroadcaster,
    resolver: Arc<dyn TabResolver>,
    tickers: Arc<Mutex<Option<Tickers>>>,
}

impl FocusController {
    pub fn new(
        config: FocusConfig,
        settings: Arc<SettingsStore>,
        broadcaster: StateBroadcaster,
        resolver: Arc<dyn TabResolver>,
    ) -> Self {
        let mut state = FocusState::new(config, Instant::now());
        state.focus_ring_enabled = settings.focus_ring_enabled();
        state.bindu_style = settings.bindu_style();

        Self {
            state: Arc::new(Mutex::new(state)),
            settings,
            broadcaster,
            resolver,
            tickers: Arc::new(Mutex::new(None)),
        }
    }

    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    pub async fn snapshot(&self) -> FocusSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn focus_ring_enabled(&self) -> bool {
        self.state.lock().await.focus_ring_enabled
    }

    /// Routes a normalized signal to its handler. The returned handle, if
    /// any, tracks a pending URL resolution and may be dropped.
    pub async fn dispatch(&self, signal: Signal) -> Option<JoinHandle<()>> {
        match signal {
            Signal::TabSwitch(tab_id) => return self.on_tab_switch(tab_id).await,
            Signal::WindowFocus { focused } => self.on_window_focus_changed(focused).await,
            Signal::Idle(idle_state) => self.on_idle_state_changed(idle_state.is_idle()).await,
            Signal::Distraction => self.on_distraction_detected().await,
            Signal::ConfigChange(change) => self.on_config_changed(change).await,
        }
        None
    }

    pub async fn apply_adjustment(&self, delta: i32) -> u8 {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.apply_adjustment(delta);
            state.snapshot()
        };
        let level = snapshot.focus_level;
        self.broadcaster.publish(snapshot).await;
        level
    }

    /// Records the tab that was active when tracking started.
    pub async fn seed_active_tab(&self, tab_id: TabId) {
        let url = self.resolver.resolve_url(tab_id).await;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.seed_active_tab(tab_id, url, Instant::now());
            state.snapshot()
        };
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn on_tab_switch(&self, tab_id: TabId) -> Option<JoinHandle<()>> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let previous = state.current_tab_id;
            if !state.switch_tab(tab_id, Instant::now()) {
                return None;
            }
            info!(
                "Tab switched from {} to {tab_id}",
                previous.map_or_else(|| "none".to_string(), |id| id.to_string())
            );
            state.snapshot()
        };
        self.broadcaster.publish(snapshot).await;

        let controller = self.clone();
        Some(tokio::spawn(async move {
            controller.resolve_active_url(tab_id).await;
        }))
    }

    async fn resolve_active_url(&self, tab_id: TabId) {
        let Some(url) = self.resolver.resolve_url(tab_id).await else {
            debug!("no url known for tab {tab_id}; skipping distraction check");
            return;
        };

        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.set_resolved_url(tab_id, url.clone()) {
                debug!("tab {tab_id} is no longer active; dropping resolved url");
                return;
            }
            state.snapshot()
        };

        if classify(&url, &self.settings.blocklist()) {
            info!("Distraction site detected: {url}");
            self.on_distraction_detected().await;
        } else {
            self.broadcaster.publish(snapshot).await;
        }
    }

    pub async fn on_window_focus_changed(&self, has_focus: bool) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.window_focus_changed(has_focus, Instant::now()) {
                return;
            }
            state.snapshot()
        };
        if has_focus {
            info!("Browser regained focus");
        } else {
            info!("Browser lost focus");
        }
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn on_idle_state_changed(&self, idle: bool) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.idle_changed(idle, Instant::now()) {
                return;
            }
            state.snapshot()
        };
        if idle {
            info!("User went idle");
        } else {
            info!("User became active again");
        }
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn on_distraction_detected(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.distraction_detected();
            state.snapshot()
        };
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn on_focus_mode_toggled(&self, enabled: bool) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.focus_mode_toggled(enabled);
            state.snapshot()
        };
        info!(
            "Focus mode turned {}; focus level now {}",
            if enabled { "on" } else { "off" },
            snapshot.focus_level
        );
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn on_config_changed(&self, change: ConfigChange) {
        let snapshot = match change {
            ConfigChange::FocusMode(enabled) => {
                self.on_focus_mode_toggled(enabled).await;
                return;
            }
            ConfigChange::DisplayStyle(style) => {
                info!("Bindu style changed to {style:?}");
                let mut state = self.state.lock().await;
                state.bindu_style = style;
                state.snapshot()
            }
            ConfigChange::RingEnabled(enabled) => {
                info!("Focus ring enabled: {enabled}");
                let mut state = self.state.lock().await;
                state.focus_ring_enabled = enabled;
                state.snapshot()
            }
            // Classification reads the blocklist from settings on every check.
            ConfigChange::Blocklist(urls) => {
                debug!("blocklist now has {} entries", urls.len());
                return;
            }
            ConfigChange::ReminderInterval(_) => return,
        };
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn tick_reward(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.tick_reward(Instant::now());
            state.snapshot()
        };
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn tick_decay(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.tick_decay() {
                return;
            }
            state.snapshot()
        };
        self.broadcaster.publish(snapshot).await;
    }

    pub async fn reset(&self) -> FocusSnapshot {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.reset(Instant::now());
            state.snapshot()
        };
        info!("Focus reset to baseline");
        self.broadcaster.publish(snapshot.clone()).await;
        snapshot
    }

    /// Spawns the reward and decay tickers. They keep separate cadences and
    /// run until [`FocusController::stop_tickers`].
    pub async fn start_tickers(&self) {
        let mut guard = self.tickers.lock().await;
        if guard.is_some() {
            return;
        }

        let (reward_interval, decay_interval) = {
            let state = self.state.lock().await;
            (state.config().reward_interval, state.config().decay_interval)
        };

        let cancel_token = CancellationToken::new();
        let reward = tokio::spawn(ticker_loop(
            self.clone(),
            TickKind::Reward,
            reward_interval,
            cancel_token.clone(),
        ));
        let decay = tokio::spawn(ticker_loop(
            self.clone(),
            TickKind::Decay,
            decay_interval,
            cancel_token.clone(),
        ));

        info!(
            "Focus tickers started (reward every {:?}, decay every {:?})",
            reward_interval, decay_interval
        );
        *guard = Some(Tickers {
            cancel_token,
            reward,
            decay,
        });
    }

    pub async fn stop_tickers(&self) {
        let Some(tickers) = self.tickers.lock().await.take() else {
            return;
        };
        tickers.cancel_token.cancel();
        let _ = tickers.reward.await;
        let _ = tickers.decay.await;
    }
}

async fn ticker_loop(
    controller: FocusController,
    kind: TickKind,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => match kind {
                TickKind::Reward => controller.tick_reward().await,
                TickKind::Decay => controller.tick_decay().await,
            },
            _ = cancel_token.cancelled() => {
                debug!("{kind:?} ticker shutting down");
                break;
            }
        }
    }
}
