#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use gemini_realtime::{LiveConfig, SessionEvent};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::{
    WebSocketStream, accept_async, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
    },
};

pub type ServerSocket = WebSocketStream<TcpStream>;

pub const WAIT: Duration = Duration::from_secs(2);

/// A listener standing in for the live service.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("local addr should be available");
    (listener, format!("ws://{address}/live"))
}

pub async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client should connect")
        .expect("server should accept");
    accept_async(stream).await.expect("handshake should succeed")
}

/// Accepts a connection and returns the query string it was opened with.
pub async fn accept_with_query(listener: &TcpListener) -> (ServerSocket, String) {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client should connect")
        .expect("server should accept");
    let query = Arc::new(Mutex::new(String::new()));
    let capture = Arc::clone(&query);
    let ws = accept_hdr_async(stream, move |req: &Request, response: Response| {
        *capture.lock().expect("query lock should not poison") =
            req.uri().query().unwrap_or_default().to_string();
        Ok(response)
    })
    .await
    .expect("handshake should succeed");
    let query = query.lock().expect("query lock should not poison").clone();
    (ws, query)
}

/// Next text or binary message as JSON, skipping control frames.
pub async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("message should arrive in time")
            .expect("stream should stay open")
            .expect("message should be readable");
        match message {
            Message::Text(text) => {
                return serde_json::from_str(&text.to_string()).expect("client sends JSON");
            }
            Message::Binary(bytes) => {
                return serde_json::from_slice(&bytes.to_vec()).expect("client sends JSON");
            }
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => {}
        }
    }
}

/// Waits for the client's close frame; returns its code.
pub async fn next_close_code(ws: &mut ServerSocket) -> Option<u16> {
    loop {
        match timeout(WAIT, ws.next()).await.expect("close should arrive in time") {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

/// Counts data frames the client sends until its connection goes away.
pub async fn frames_until_disconnect(ws: &mut ServerSocket) -> usize {
    let mut frames = 0;
    loop {
        match timeout(WAIT, ws.next()).await {
            Ok(Some(Ok(Message::Text(_) | Message::Binary(_)))) => frames += 1,
            Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) | Err(_) => return frames,
            Ok(Some(Ok(_))) => {}
        }
    }
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server send should succeed");
}

/// Reads the setup frame and acknowledges it.
pub async fn complete_setup(ws: &mut ServerSocket) -> Value {
    let setup = next_json(ws).await;
    assert!(setup.get("setup").is_some(), "first frame must be setup: {setup}");
    send_json(ws, json!({"setupComplete": {}})).await;
    setup
}

pub fn text_frame(text: &str) -> Value {
    json!({"serverContent": {"modelTurn": {"parts": [{"text": text}]}}})
}

pub fn audio_frame(pcm: &[u8]) -> Value {
    use base64::Engine;
    let data = base64::engine::general_purpose::STANDARD.encode(pcm);
    json!({"serverContent": {"modelTurn": {"parts": [
        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": data}}
    ]}}})
}

pub fn config_for(url: &str) -> LiveConfig {
    LiveConfig::new("test-key")
        .with_endpoint(url)
        .with_handshake_timeout(WAIT)
}

/// Receives events until one matches, failing after [`WAIT`].
pub async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut matches: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("expected event should arrive in time")
}

/// Everything received until (and including) the first matching event.
pub async fn collect_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut last: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = wait_for(events, |_| true).await;
        let done = last(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}
