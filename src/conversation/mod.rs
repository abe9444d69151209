//! Threads and their message logs.
//!
//! # Architecture
//!
//! - [`MessageLog`]: append-only, order-preserving store of every thread's messages
//! - [`ThreadRegistry`]: known threads and the active pointer
//! - [`HistoryLoader`]: lazy fetch of persisted history
//!
//! # Example
//!
//! ```rust
//! use agent_chat_client::conversation::{Message, MessageLog, ThreadId};
//!
//! let log = MessageLog::new();
//! let thread = ThreadId::from("1");
//! log.append(&thread, Message::user("Hello!"));
//!
//! assert_eq!(log.snapshot(&thread).len(), 1);
//! ```

mod history;
mod log;
mod message;
mod registry;

pub use history::HistoryLoader;
pub use log::{LogEvent, MessageLog, ThreadUpdate};
pub use message::{Message, Role, ThreadId};
pub use registry::{RegistrySnapshot, ThreadRegistry};
