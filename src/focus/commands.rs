use serde::{Deserialize, Serialize};

use super::{FocusController, FocusSnapshot};

/// Pull-style requests observers can make against the focus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusRequest {
    #[serde(rename = "GET_FOCUS_STATE")]
    GetFocusState,
    #[serde(rename = "RESET_FOCUS")]
    ResetFocus,
}

/// `{ "success": true }` reply for commands that carry no data back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FocusResponse {
    State(FocusSnapshot),
    Ack(Ack),
}

pub async fn get_focus_state(controller: &FocusController) -> FocusSnapshot {
    controller.snapshot().await
}

pub async fn reset_focus(controller: &FocusController) -> Ack {
    controller.reset().await;
    Ack { success: true }
}

pub async fn handle_request(controller: &FocusController, request: FocusRequest) -> FocusResponse {
    match request {
        FocusRequest::GetFocusState => FocusResponse::State(get_focus_state(controller).await),
        FocusRequest::ResetFocus => FocusResponse::Ack(reset_focus(controller).await),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        focus::{FocusConfig, StateBroadcaster},
        settings::SettingsStore,
        signals::TabRegistry,
    };

    fn controller(dir: &tempfile::TempDir) -> FocusController {
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        FocusController::new(
            FocusConfig::default(),
            settings,
            StateBroadcaster::new(None),
            Arc::new(TabRegistry::new()),
        )
    }

    #[tokio::test]
    async fn reset_acknowledges_and_restores_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(&dir);
        controller.apply_adjustment(-42).await;

        let response = handle_request(&controller, FocusRequest::ResetFocus).await;
        assert_eq!(response, FocusResponse::Ack(Ack { success: true }));

        let FocusResponse::State(snapshot) =
            handle_request(&controller, FocusRequest::GetFocusState).await
        else {
            panic!("expected a state response");
        };
        assert_eq!(snapshot.focus_level, 50);
    }

    #[tokio::test]
    async fn concurrent_requests_see_whole_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(&dir);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    controller.apply_adjustment(-7).await;
                    handle_request(&controller, FocusRequest::GetFocusState).await
                } else {
                    handle_request(&controller, FocusRequest::ResetFocus).await
                }
            }));
        }

        for task in tasks {
            match task.await.unwrap() {
                FocusResponse::State(snapshot) => assert!(snapshot.focus_level <= 100),
                FocusResponse::Ack(ack) => assert!(ack.success),
            }
        }
    }

    #[test]
    fn wire_shapes() {
        let request: FocusRequest = serde_json::from_str("\"RESET_FOCUS\"").unwrap();
        assert_eq!(request, FocusRequest::ResetFocus);

        let ack = serde_json::to_value(FocusResponse::Ack(Ack { success: true })).unwrap();
        assert_eq!(ack, serde_json::json!({ "success": true }));
    }
}
