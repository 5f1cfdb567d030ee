use std::env;

/// Room hub configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the hub's own mailbox
    pub mailbox_capacity: usize,

    /// Outbound buffer per connection; a full buffer drops the connection
    pub connection_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            connection_buffer: 64,
        }
    }
}

impl HubConfig {
    /// Read `HUB_MAILBOX_CAPACITY` and `HUB_CONNECTION_BUFFER`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Self {
            mailbox_capacity: read("HUB_MAILBOX_CAPACITY", defaults.mailbox_capacity),
            connection_buffer: read("HUB_CONNECTION_BUFFER", defaults.connection_buffer),
        }
    }
}
