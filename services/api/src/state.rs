//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! connection shares: the live session registry and the conversation store.

use crate::config::Config;
use gemini_realtime::SessionRegistry;
use parla_core::ConversationStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn ConversationStore>,
    pub system_prompt: Arc<String>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ConversationStore>, system_prompt: String) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            store,
            system_prompt: Arc::new(system_prompt),
            config: Arc::new(config),
        }
    }
}
