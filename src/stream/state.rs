use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle of a [`StreamingSession`](super::StreamingSession).
///
/// ```text
/// idle -> connecting -> streaming -> closed
///              \            \
///               -> errored   -> errored
/// ```
///
/// Any non-terminal state moves straight to `closed` on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Closed,
    Errored,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeouts applied to a session. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamPolicy {
    /// Limit on the connection handshake.
    pub handshake_timeout: Option<Duration>,
    /// Limit on silence between two events.
    pub idle_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Errored.is_terminal());
    }

    #[test]
    fn test_display_matches_serde() {
        for state in [
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::Streaming,
            SessionState::Closed,
            SessionState::Errored,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
