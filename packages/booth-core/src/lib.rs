pub mod camera;
pub mod channel;
pub mod command;
pub mod engine;
pub mod machine;
pub mod print;
pub mod registry;
pub mod session;

use serde::{Deserialize, Serialize};

pub use machine::{BoothMachine, MachineCommand, MachineCommandSender};

/// Default port for the touchscreen command socket
pub const DEFAULT_COMMAND_PORT: u16 = 12345;

/// Default port for the presentation notification stream
pub const DEFAULT_UI_PORT: u16 = 12346;

// ============================================
// Outbound Notification Types
// ============================================

/// The notification kinds a screen may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Free-form status line shown by the presentation layer
    Status,
    /// Live filter preview thumbnail update
    FilterPreview,
    /// Border/highlight indicator selection
    BorderImage,
    /// Copy count echo
    Copies,
}

/// A single outbound notification before it is resolved against the active
/// screen's subscription table.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Status(String),
    FilterPreview { index: usize, path: String },
    BorderImage { index: u32 },
    Copies { count: u8 },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Status(_) => NotificationKind::Status,
            Notification::FilterPreview { .. } => NotificationKind::FilterPreview,
            Notification::BorderImage { .. } => NotificationKind::BorderImage,
            Notification::Copies { .. } => NotificationKind::Copies,
        }
    }

    /// Wire payload for the presentation layer.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Notification::Status(text) => serde_json::json!({ "text": text }),
            Notification::FilterPreview { index, path } => {
                serde_json::json!({ "index": index, "path": path })
            }
            Notification::BorderImage { index } => serde_json::json!({ "index": index }),
            Notification::Copies { count } => serde_json::json!({ "count": count }),
        }
    }
}

/// Message pushed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiMessage {
    /// Named notification delivered under the active screen's wire name
    #[serde(rename = "event")]
    Event {
        name: String,
        payload: serde_json::Value,
    },
    /// Display resource switch accompanying a screen transition
    #[serde(rename = "screen")]
    Screen { url: String },
}

/// Trait for pushing updates to the presentation layer (adapter pattern).
///
/// Implementations must never block the control loop; delivery is
/// fire-and-forget.
pub trait UiEmitter: Send + Sync {
    fn emit(&self, msg: UiMessage);
}
