use serde::{Deserialize, Serialize};

/// When the hub opens its streaming connection on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartPolicy {
    /// Registering a message subscriber starts the connection.
    #[default]
    OnMessageSubscribe,
    /// Only an explicit `start()` opens the connection.
    Manual,
}

impl StartPolicy {
    pub fn starts_on_message_subscribe(self) -> bool {
        matches!(self, StartPolicy::OnMessageSubscribe)
    }
}
