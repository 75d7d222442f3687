//! [`LiveTransport`] over the Gemini Live websocket API.
//!
//! The session opens with a `setup` message and is usable once the service
//! answers `setupComplete`. Microphone audio goes up as base64 PCM in
//! `realtimeInput` messages; replies come down as `serverContent` messages
//! carrying inline audio, an `interrupted` flag or `turnComplete`.
use std::collections::VecDeque;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine};
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::{LiveEvent, LiveTransport, INPUT_SAMPLE_RATE};
use crate::{DeskError, GatewayConfig, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn session_error(context: &str, e: impl std::fmt::Display) -> DeskError {
    DeskError::SessionError {
        message: format!("{}: {}", context, e),
    }
}

pub struct GeminiLiveTransport {
    url: String,
    model: String,
    voice: String,
    socket: Option<Socket>,
    /// Events decoded from a frame but not yet handed out
    pending: VecDeque<LiveEvent>,
}

impl GeminiLiveTransport {
    pub fn new(config: &GatewayConfig, voice: impl Into<String>) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self {
            url: format!("{}?key={}", config.live_endpoint.trim_end_matches('/'), api_key),
            model: config.live_model.clone(),
            voice: voice.into(),
            socket: None,
            pending: VecDeque::new(),
        })
    }

    fn socket(&mut self) -> Result<&mut Socket> {
        self.socket.as_mut().ok_or_else(|| DeskError::SessionError {
            message: "live transport is not connected".to_string(),
        })
    }
}

/// First message of a session: picks the model and asks for spoken replies.
pub fn build_setup_message(model: &str, voice: &str) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            }
        }
    })
}

/// Wraps one chunk of 16-bit mono microphone PCM.
pub fn build_audio_message(chunk: &[u8]) -> Value {
    json!({
        "realtimeInput": {
            "audio": {
                "mimeType": format!("audio/pcm;rate={}", INPUT_SAMPLE_RATE),
                "data": BASE64_ENGINE.encode(chunk),
            }
        }
    })
}

/// Events carried by one server message, in the order they should be
/// acted on.
pub fn parse_live_message(message: &Value) -> Vec<LiveEvent> {
    let mut events = Vec::new();

    if message.get("goAway").is_some() {
        info!("Live service is about to end the session");
        events.push(LiveEvent::Closed);
        return events;
    }

    let Some(content) = message.get("serverContent") else {
        trace!("Ignoring live message without content");
        return events;
    };

    if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
        events.push(LiveEvent::Interrupted);
    }

    let parts = content
        .pointer("/modelTurn/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for part in parts {
        let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) else {
            continue;
        };
        match BASE64_ENGINE.decode(data) {
            Ok(bytes) => events.push(LiveEvent::Audio(bytes)),
            Err(e) => warn!("Dropping undecodable audio chunk: {}", e),
        }
    }

    if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
        events.push(LiveEvent::TurnComplete);
    }
    events
}

/// JSON payload of a data frame. Control frames and malformed payloads
/// yield `None`.
fn frame_json(message: Message) -> Option<Value> {
    let raw = match message {
        Message::Text(text) => text.into_bytes(),
        Message::Binary(bytes) => bytes,
        _ => return None,
    };
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed live message: {}", e);
            None
        }
    }
}

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(&mut self) -> Result<()> {
        debug!("Connecting live session with model {}", self.model);
        let (mut socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| session_error("failed to reach the live service", e))?;

        let setup = build_setup_message(&self.model, &self.voice).to_string();
        socket
            .send(Message::Text(setup))
            .await
            .map_err(|e| session_error("failed to send setup", e))?;

        loop {
            let message = match socket.next().await {
                Some(Ok(Message::Close(frame))) => {
                    return Err(DeskError::SessionError {
                        message: format!("service closed the session during setup: {:?}", frame),
                    })
                }
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(session_error("setup failed", e)),
                None => {
                    return Err(DeskError::SessionError {
                        message: "connection ended during setup".to_string(),
                    })
                }
            };
            let Some(value) = frame_json(message) else {
                continue;
            };
            if value.get("setupComplete").is_some() {
                break;
            }
            self.pending.extend(parse_live_message(&value));
        }

        info!("Live session set up with model {}", self.model);
        self.socket = Some(socket);
        Ok(())
    }

    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<()> {
        let message = build_audio_message(&chunk).to_string();
        self.socket()?
            .send(Message::Text(message))
            .await
            .map_err(|e| session_error("failed to send audio", e))
    }

    async fn next_event(&mut self) -> Result<LiveEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            // Decoded events land in `pending` before the next await, so a
            // cancelled call loses nothing
            let message = match self.socket()?.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(LiveEvent::Closed),
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(session_error("live connection failed", e)),
            };
            if let Some(value) = frame_json(message) {
                self.pending.extend(parse_live_message(&value));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };
        match socket.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(session_error("failed to close live connection", e)),
        }
    }
}
