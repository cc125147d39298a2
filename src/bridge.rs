//! Newline-delimited JSON protocol between the extension and the host.
//!
//! Every inbound line is one message tagged by `type`, optionally carrying an
//! `id` that is echoed back on the matching `RESPONSE`. Outbound lines are
//! produced by a single writer task so that focus updates, responses,
//! reminders and blocking rules never interleave mid-line.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    blocking::{compile_rules, BlockingRule},
    focus::{
        commands::handle_request, Ack, FocusController, FocusRequest, FocusResponse,
        FocusSnapshot,
    },
    screen_time::{Reminder, ScreenTimeController},
    settings::{keys, SettingsStore},
    signals::{ConfigChange, HostEvent, Signal, SignalAdapter, TabId},
};

/// Host-directed commands that are not browser events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeCommand {
    /// The tab that was already active when the extension connected.
    #[serde(rename = "initialTab", rename_all = "camelCase")]
    InitialTab {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename = "updateReminderInterval")]
    UpdateReminderInterval { interval: u32 },
    #[serde(rename = "updateRules")]
    UpdateRules,
    #[serde(rename = "GET_FOCUS_STATE")]
    GetFocusState,
    #[serde(rename = "RESET_FOCUS")]
    ResetFocus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Command(BridgeCommand),
    Event(HostEvent),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "FOCUS_UPDATE")]
    FocusUpdate(FocusSnapshot),
    #[serde(rename = "RESPONSE")]
    Response {
        id: Option<Value>,
        payload: FocusResponse,
    },
    #[serde(rename = "focus_reminder")]
    FocusReminder(Reminder),
    #[serde(rename = "BLOCKING_RULES")]
    BlockingRules { rules: Vec<BlockingRule> },
}

/// Splits a line into its correlation id and message.
pub fn parse_line(line: &str) -> Result<(Option<Value>, InboundMessage)> {
    let value: Value = serde_json::from_str(line).context("line is not valid JSON")?;
    let id = value.get("id").cloned();
    let message = InboundMessage::deserialize(value).context("unrecognized message")?;
    Ok((id, message))
}

pub struct Bridge<'a> {
    focus: FocusController,
    adapter: SignalAdapter,
    settings: Arc<SettingsStore>,
    screen_time: &'a ScreenTimeController,
}

impl<'a> Bridge<'a> {
    pub fn new(
        focus: FocusController,
        adapter: SignalAdapter,
        settings: Arc<SettingsStore>,
        screen_time: &'a ScreenTimeController,
    ) -> Self {
        Self {
            focus,
            adapter,
            settings,
            screen_time,
        }
    }

    /// Serves the protocol until `reader` hits end of input.
    pub async fn run<R, W>(
        &self,
        reader: R,
        writer: W,
        reminders: mpsc::UnboundedReceiver<Reminder>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, out_rx));

        let cancel_token = CancellationToken::new();
        let forwarder = spawn_forwarder(
            self.focus.broadcaster().subscribe(),
            reminders,
            out_tx.clone(),
            cancel_token.clone(),
        );

        self.emit_rules(&out_tx);
        let _ = out_tx.send(OutboundMessage::FocusUpdate(self.focus.snapshot().await));

        let mut lines = reader.lines();
        let read_result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.handle_line(&line, &out_tx).await,
                Ok(None) => {
                    info!("Extension closed the channel");
                    break Ok(());
                }
                Err(err) => break Err::<(), _>(err).context("failed to read from extension"),
            }
        };

        cancel_token.cancel();
        if let Err(err) = forwarder.await {
            warn!("bridge forwarder failed to join: {err}");
        }
        drop(out_tx);

        let write_result = writer_task
            .await
            .context("bridge writer task failed to join")?;
        read_result.and(write_result)
    }

    pub async fn handle_line(&self, line: &str, out: &mpsc::UnboundedSender<OutboundMessage>) {
        if line.trim().is_empty() {
            return;
        }

        let (id, message) = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("skipping inbound line: {err:#}");
                return;
            }
        };

        match message {
            InboundMessage::Command(command) => self.handle_command(id, command, out).await,
            InboundMessage::Event(event) => {
                let Some(signal) = self.adapter.normalize(event) else {
                    return;
                };
                let rules_changed = matches!(
                    signal,
                    Signal::ConfigChange(ConfigChange::Blocklist(_) | ConfigChange::FocusMode(_))
                );
                if let Signal::ConfigChange(ConfigChange::ReminderInterval(minutes)) = signal {
                    self.screen_time.update_reminder_interval(minutes);
                }

                // URL resolution finishes on its own; nothing waits on it.
                let _ = self.focus.dispatch(signal).await;

                if rules_changed {
                    self.emit_rules(out);
                }
            }
        }
    }

    async fn handle_command(
        &self,
        id: Option<Value>,
        command: BridgeCommand,
        out: &mpsc::UnboundedSender<OutboundMessage>,
    ) {
        match command {
            BridgeCommand::InitialTab { tab_id, url } => {
                if let Some(url) = url {
                    self.adapter.tabs().record(tab_id, url);
                }
                self.focus.seed_active_tab(tab_id).await;
            }
            BridgeCommand::UpdateReminderInterval { interval } => {
                if let Err(err) = self
                    .settings
                    .apply_change(keys::REMINDER_INTERVAL, json!(interval))
                {
                    warn!("failed to persist reminder interval: {err:#}");
                }
                self.screen_time.update_reminder_interval(interval);
                let _ = out.send(OutboundMessage::Response {
                    id,
                    payload: FocusResponse::Ack(Ack { success: true }),
                });
            }
            BridgeCommand::UpdateRules => self.emit_rules(out),
            BridgeCommand::GetFocusState => {
                let payload = handle_request(&self.focus, FocusRequest::GetFocusState).await;
                let _ = out.send(OutboundMessage::Response { id, payload });
            }
            BridgeCommand::ResetFocus => {
                let payload = handle_request(&self.focus, FocusRequest::ResetFocus).await;
                let _ = out.send(OutboundMessage::Response { id, payload });
            }
        }
    }

    fn emit_rules(&self, out: &mpsc::UnboundedSender<OutboundMessage>) {
        let rules = compile_rules(&self.settings.blocklist(), self.settings.focus_mode());
        debug!("emitting {} blocking rules", rules.len());
        let _ = out.send(OutboundMessage::BlockingRules { rules });
    }
}

fn spawn_forwarder(
    mut updates: broadcast::Receiver<FocusSnapshot>,
    mut reminders: mpsc::UnboundedReceiver<Reminder>,
    out: mpsc::UnboundedSender<OutboundMessage>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reminders_open = true;
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(snapshot) => {
                        let _ = out.send(OutboundMessage::FocusUpdate(snapshot));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("bridge fell behind by {skipped} focus updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reminder = reminders.recv(), if reminders_open => match reminder {
                    Some(reminder) => {
                        let _ = out.send(OutboundMessage::FocusReminder(reminder));
                    }
                    None => reminders_open = false,
                },
                _ = cancel_token.cancelled() => {
                    // Whatever was published before shutdown still goes out.
                    while let Ok(snapshot) = updates.try_recv() {
                        let _ = out.send(OutboundMessage::FocusUpdate(snapshot));
                    }
                    while let Ok(reminder) = reminders.try_recv() {
                        let _ = out.send(OutboundMessage::FocusReminder(reminder));
                    }
                    break;
                }
            }
        }
    })
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<OutboundMessage>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message).context("failed to encode outbound message")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("failed to write to extension")?;
        writer.flush().await.context("failed to flush to extension")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        focus::{FocusConfig, StateBroadcaster},
        signals::{IdleState, TabRegistry},
    };
    use tokio::io::AsyncReadExt;

    struct Fixture {
        focus: FocusController,
        adapter: SignalAdapter,
        settings: Arc<SettingsStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let registry = Arc::new(TabRegistry::new());
        let focus = FocusController::new(
            FocusConfig::default(),
            settings.clone(),
            StateBroadcaster::new(None),
            registry.clone(),
        );
        Fixture {
            focus,
            adapter: SignalAdapter::new(registry, settings.clone()),
            settings,
            _dir: dir,
        }
    }

    fn outbound_lines(raw: &str) -> Vec<Value> {
        raw.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn parses_commands_and_events() {
        let (id, message) = parse_line(r#"{"type":"GET_FOCUS_STATE","id":"abc"}"#).unwrap();
        assert_eq!(id, Some(json!("abc")));
        assert_eq!(message, InboundMessage::Command(BridgeCommand::GetFocusState));

        let (id, message) =
            parse_line(r#"{"type":"updateReminderInterval","interval":25}"#).unwrap();
        assert_eq!(id, None);
        assert_eq!(
            message,
            InboundMessage::Command(BridgeCommand::UpdateReminderInterval { interval: 25 })
        );

        let (_, message) = parse_line(r#"{"type":"idleStateChanged","state":"locked"}"#).unwrap();
        assert_eq!(
            message,
            InboundMessage::Event(HostEvent::IdleStateChanged {
                state: IdleState::Locked
            })
        );

        let (_, message) = parse_line(r#"{"type":"tabRemoved","tabId":4}"#).unwrap();
        assert_eq!(
            message,
            InboundMessage::Event(HostEvent::TabRemoved { tab_id: TabId(4) })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"type":"somethingElse"}"#).is_err());
        assert!(parse_line(r#"{"tabId":1}"#).is_err());
    }

    #[test]
    fn outbound_wire_shapes() {
        let response = OutboundMessage::Response {
            id: Some(json!(7)),
            payload: FocusResponse::Ack(Ack { success: true }),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "type": "RESPONSE", "id": 7, "payload": { "success": true } })
        );

        let reminder = OutboundMessage::FocusReminder(Reminder::after_minutes(10));
        let value = serde_json::to_value(&reminder).unwrap();
        assert_eq!(value["type"], "focus_reminder");
        assert_eq!(value["title"], "Focus Reminder");
    }

    #[tokio::test]
    async fn serves_requests_until_end_of_input() {
        let fx = fixture();
        let screen_time = ScreenTimeController::new();
        let bridge = Bridge::new(
            fx.focus.clone(),
            fx.adapter.clone(),
            fx.settings.clone(),
            &screen_time,
        );

        let input = concat!(
            "{\"type\":\"GET_FOCUS_STATE\",\"id\":\"1\"}\n",
            "this is not json\n",
            "\n",
            "{\"type\":\"configChanged\",\"key\":\"blockedUrls\",\"newValue\":[\"reddit.com\"],\"oldValue\":[]}\n",
            "{\"type\":\"RESET_FOCUS\",\"id\":7}\n",
        );
        let (host_side, mut extension_side) = tokio::io::duplex(64 * 1024);
        let (_reminder_tx, reminder_rx) = mpsc::unbounded_channel();

        bridge
            .run(input.as_bytes(), host_side, reminder_rx)
            .await
            .unwrap();

        let mut raw = String::new();
        extension_side.read_to_string(&mut raw).await.unwrap();
        let lines = outbound_lines(&raw);

        let responses: Vec<&Value> = lines.iter().filter(|m| m["type"] == "RESPONSE").collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], "1");
        assert_eq!(responses[0]["payload"]["focusLevel"], 50);
        assert_eq!(responses[1]["id"], 7);
        assert_eq!(responses[1]["payload"]["success"], true);

        let rules: Vec<&Value> = lines
            .iter()
            .filter(|m| m["type"] == "BLOCKING_RULES")
            .collect();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["rules"], json!([]));
        assert_eq!(
            rules[1]["rules"][0]["condition"]["urlFilter"],
            "*://*reddit.com/*"
        );

        assert_eq!(fx.settings.blocklist(), vec!["reddit.com".to_string()]);
    }

    #[tokio::test]
    async fn turning_focus_mode_off_clears_rules() {
        let fx = fixture();
        fx.settings
            .apply_change(keys::BLOCKED_URLS, json!(["x.com"]))
            .unwrap();
        let screen_time = ScreenTimeController::new();
        let bridge = Bridge::new(
            fx.focus.clone(),
            fx.adapter.clone(),
            fx.settings.clone(),
            &screen_time,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge
            .handle_line(
                r#"{"type":"configChanged","key":"focusMode","newValue":false}"#,
                &tx,
            )
            .await;

        let mut saw_empty_rules = false;
        while let Ok(message) = rx.try_recv() {
            if let OutboundMessage::BlockingRules { rules } = message {
                saw_empty_rules = rules.is_empty();
            }
        }
        assert!(saw_empty_rules);
        // Focus mode off costs 10 points.
        assert_eq!(fx.focus.snapshot().await.focus_level, 40);
    }

    #[tokio::test]
    async fn initial_tab_is_seeded_without_penalty() {
        let fx = fixture();
        let screen_time = ScreenTimeController::new();
        let bridge = Bridge::new(
            fx.focus.clone(),
            fx.adapter.clone(),
            fx.settings.clone(),
            &screen_time,
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        bridge
            .handle_line(
                r#"{"type":"initialTab","tabId":12,"url":"https://docs.rs"}"#,
                &tx,
            )
            .await;
        let snapshot = fx.focus.snapshot().await;
        assert_eq!(snapshot.focus_level, 50);
        assert_eq!(snapshot.current_url, "https://docs.rs");

        // Re-activating the seeded tab is not a switch.
        bridge
            .handle_line(r#"{"type":"tabActivated","tabId":12}"#, &tx)
            .await;
        assert_eq!(fx.focus.snapshot().await.focus_level, 50);
    }

    #[tokio::test]
    async fn reminder_interval_updates_are_persisted() {
        let fx = fixture();
        let screen_time = ScreenTimeController::new();
        let bridge = Bridge::new(
            fx.focus.clone(),
            fx.adapter.clone(),
            fx.settings.clone(),
            &screen_time,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge
            .handle_line(
                r#"{"type":"updateReminderInterval","interval":15,"id":"ri"}"#,
                &tx,
            )
            .await;

        assert_eq!(fx.settings.reminder_interval(), 15);
        let Ok(OutboundMessage::Response { id, payload }) = rx.try_recv() else {
            panic!("expected an acknowledgment");
        };
        assert_eq!(id, Some(json!("ri")));
        assert_eq!(payload, FocusResponse::Ack(Ack { success: true }));
    }

    #[tokio::test]
    async fn updates_published_before_end_of_input_are_written() {
        let fx = fixture();
        fx.focus.apply_adjustment(-35).await;
        let screen_time = ScreenTimeController::new();
        let bridge = Bridge::new(
            fx.focus.clone(),
            fx.adapter.clone(),
            fx.settings.clone(),
            &screen_time,
        );

        let (host_side, mut extension_side) = tokio::io::duplex(64 * 1024);
        let (_reminder_tx, reminder_rx) = mpsc::unbounded_channel();
        bridge
            .run(
                "{\"type\":\"RESET_FOCUS\",\"id\":1}\n".as_bytes(),
                host_side,
                reminder_rx,
            )
            .await
            .unwrap();

        let mut raw = String::new();
        extension_side.read_to_string(&mut raw).await.unwrap();
        let levels: Vec<Value> = outbound_lines(&raw)
            .into_iter()
            .filter(|m| m["type"] == "FOCUS_UPDATE")
            .map(|m| m["focusLevel"].clone())
            .collect();
        // The connect-time snapshot, then the one published by the reset.
        assert_eq!(levels, vec![json!(15), json!(50)]);
    }
}
