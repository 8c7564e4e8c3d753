use serde::Serialize;

/// Lifecycle state of one call.
///
/// ```text
/// Connecting -> Active <-> ToolPending
///      |           |           |
///      +-------> Closing <-----+
///                  |
///                Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the backend connection
    Connecting,
    /// Relaying audio in both directions
    Active,
    /// Relaying audio while one tool call awaits its result
    ToolPending,
    /// Draining in-flight frames and releasing resources
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Closing)
                | (Active, ToolPending)
                | (ToolPending, Active)
                | (Active, Closing)
                | (ToolPending, Closing)
                | (Closing, Closed)
        )
    }

    /// True while the session still accepts frames and events.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connecting | Self::Active | Self::ToolPending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::ToolPending => "tool_pending",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
