use log::debug;
use tokio::sync::broadcast;

use crate::db::Database;

use super::FocusSnapshot;

const BROADCAST_CAPACITY: usize = 64;

/// Fans focus snapshots out to whoever is listening and mirrors them into
/// local storage for observers that start later.
#[derive(Clone)]
pub struct StateBroadcaster {
    tx: broadcast::Sender<FocusSnapshot>,
    mirror: Option<Database>,
}

impl StateBroadcaster {
    pub fn new(mirror: Option<Database>) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx, mirror }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FocusSnapshot> {
        self.tx.subscribe()
    }

    pub async fn publish(&self, snapshot: FocusSnapshot) {
        // An error here only means no observer is subscribed right now.
        let _ = self.tx.send(snapshot.clone());

        if let Some(db) = &self.mirror {
            if let Err(err) = db.write_focus_mirror(&snapshot).await {
                debug!("focus mirror write skipped: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::BinduStyle;

    fn snapshot(level: u8) -> FocusSnapshot {
        FocusSnapshot {
            focus_level: level,
            is_browser_focused: true,
            is_idle: false,
            current_url: String::new(),
            bindu_style: BinduStyle::Glow,
        }
    }

    #[tokio::test]
    async fn publishing_without_listeners_is_fine() {
        let broadcaster = StateBroadcaster::new(None);
        broadcaster.publish(snapshot(50)).await;
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_snapshot() {
        let broadcaster = StateBroadcaster::new(None);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish(snapshot(61)).await;

        assert_eq!(first.recv().await.unwrap().focus_level, 61);
        assert_eq!(second.recv().await.unwrap().focus_level, 61);
    }

    #[tokio::test]
    async fn late_observers_read_the_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("local.sqlite3")).unwrap();
        let broadcaster = StateBroadcaster::new(Some(db.clone()));

        broadcaster.publish(snapshot(33)).await;

        let mirror = db.read_focus_mirror().await.unwrap().unwrap();
        assert_eq!(mirror.focus_level, 33);
    }
}
