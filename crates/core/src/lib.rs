//! Parla Core
//!
//! The pieces of a conversation that outlive any single live session: the
//! stored message history and the system instruction rebuilt from it when a
//! learner reconnects.

pub mod history;
pub mod store;

pub use history::{MessageRole, StoredMessage, compose_instruction};
pub use store::{ConversationStore, InMemoryStore, load_instruction};
