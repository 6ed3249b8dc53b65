//! WebSocket Bridge
//!
//! Each browser socket drives one live session:
//!
//! - `protocol`: the JSON messages exchanged with the browser.
//! - `sink`: the audio sink that paces model audio out to the browser.
//! - `session`: the connection lifecycle, from `init` to teardown.

pub mod protocol;
pub mod session;
pub mod sink;

pub use session::ws_handler;
