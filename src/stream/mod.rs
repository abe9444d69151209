//! Streaming sessions: one live event connection per outgoing message.
//!
//! A [`StreamingSession`] echoes the user's message into the
//! [`MessageLog`](crate::conversation::MessageLog), opens the reply stream,
//! and appends every message of every event batch to its owner thread until
//! the stream ends, fails, or is cancelled.
//!
//! Failures never escape a session. They show up only as the terminal
//! [`SessionState::Errored`] and a log record.

mod session;
mod state;

pub use session::StreamingSession;
pub use state::{SessionState, StreamPolicy};
