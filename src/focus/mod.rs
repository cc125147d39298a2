pub mod broadcaster;
pub mod classifier;
pub mod commands;
pub mod controller;
pub mod state;

pub use broadcaster::StateBroadcaster;
pub use classifier::classify;
pub use commands::{FocusRequest, FocusResponse, Ack};
pub use controller::FocusController;
pub use state::{BinduStyle, FocusConfig, FocusSnapshot, FocusState, BASELINE_FOCUS_LEVEL};
