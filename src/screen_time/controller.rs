use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{db::Database, focus::FocusController, settings::SettingsStore};

use super::{loop_worker::screen_time_loop, reminder_for, Reminder};

/// Everything the screen-time loop reads from or reports to.
#[derive(Clone)]
pub struct ScreenTimeContext {
    pub db: Database,
    pub focus: FocusController,
    pub settings: Arc<SettingsStore>,
    pub reminders: mpsc::UnboundedSender<Reminder>,
}

impl ScreenTimeContext {
    /// Window focus doubles as the activity probe; when focus can't be
    /// observed the engine keeps reporting focused, so time keeps counting.
    pub async fn browser_active(&self) -> bool {
        self.focus.snapshot().await.is_browser_focused
    }

    pub async fn record_minute(&self) -> Result<u64> {
        let active = self.browser_active().await;
        self.db.record_screen_time_tick(active, Utc::now()).await
    }

    /// Sends a reminder if one is due. Returns whether one was sent.
    pub async fn remind(&self) -> bool {
        let active = self.browser_active().await;
        let Some(reminder) = reminder_for(
            self.settings.focus_mode(),
            active,
            self.settings.reminder_interval(),
        ) else {
            return false;
        };
        // The receiver only goes away during shutdown.
        self.reminders.send(reminder).is_ok()
    }

    pub async fn reset_daily(&self) -> Result<()> {
        self.db.reset_screen_time(Utc::now()).await
    }
}

pub struct ScreenTimeController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    interval_tx: Option<watch::Sender<u32>>,
}

impl ScreenTimeController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            interval_tx: None,
        }
    }

    pub async fn start(&mut self, ctx: ScreenTimeContext) -> Result<()> {
        if self.handle.is_some() {
            bail!("screen time tracking already active");
        }

        ctx.db
            .ensure_screen_time_keys(Utc::now())
            .await
            .context("failed to initialize screen time keys")?;

        let cancel_token = CancellationToken::new();
        let (interval_tx, interval_rx) = watch::channel(ctx.settings.reminder_interval());

        let handle = tokio::spawn(screen_time_loop(ctx, interval_rx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.interval_tx = Some(interval_tx);
        info!("Screen time tracking started");
        Ok(())
    }

    /// Re-arms the reminder timer; the minute tick and daily reset keep
    /// their schedule.
    pub fn update_reminder_interval(&self, minutes: u32) {
        if let Some(tx) = &self.interval_tx {
            let _ = tx.send(minutes.max(1));
            info!("Reminder interval set to {} minutes", minutes.max(1));
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.interval_tx = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("screen time loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for ScreenTimeController {
    fn default() -> Self {
        Self::new()
    }
}
