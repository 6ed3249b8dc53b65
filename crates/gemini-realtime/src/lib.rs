//! Gemini Realtime
//!
//! A client for the Gemini Live bidirectional API. A [`LiveSession`] keeps one
//! conversation with the service: it negotiates the session, streams user
//! text and audio up, and turns the model's streamed output into text deltas,
//! finished turns and audio handed straight to an output pipeline.
//!
//! - `protocol`: the [`Frame`] model and its JSON codec.
//! - `transport`: one WebSocket connection and its lifecycle.
//! - `turn`: reassembly of streamed content into turns.
//! - `session`: the facade hosts talk to.
//! - `registry`: many sessions in one process, keyed by id.
//! - `config`: per-session settings.

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod turn;

pub use config::LiveConfig;
pub use error::LiveError;
pub use protocol::{Frame, FunctionCall, FunctionDeclaration, FunctionResponse, Modality};
pub use registry::SessionRegistry;
pub use session::{LiveSession, SessionEvent};
pub use transport::{Transport, TransportEvent, TransportState};
pub use turn::{Turn, TurnAggregator, TurnOutput};
