//! Client for the Gemini Live bidirectional audio API.
//!
//! One WebSocket per voice session: a setup message, then a continuous
//! stream of base64 PCM frames up, and server content (audio parts,
//! interruption and turn markers) down.

use crate::config::Config;
use crate::errors::AppError;
use crate::models::ProviderKind;
use crate::pcm::INPUT_MIME_TYPE;
use crate::prompts::LIVE_SYSTEM_INSTRUCTION;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Prebuilt voice used for responses.
pub const LIVE_VOICE: &str = "Zephyr";

type LiveSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub system_instruction: String,
    pub voice: String,
}

impl LiveConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.gemini_live_url.clone(),
            model: config.gemini_live_model.clone(),
            api_key: config.gemini_api_key.clone(),
            system_instruction: LIVE_SYSTEM_INSTRUCTION.to_string(),
            voice: LIVE_VOICE.to_string(),
        }
    }
}

/// What the provider told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    SetupComplete,
    /// Base64 PCM16 mono audio at 24 kHz.
    Audio(String),
    /// The user spoke over the model; queued audio must be dropped.
    Interrupted,
    TurnComplete,
}

// ============ Wire messages ============

/// First message on the socket.
pub fn setup_message(config: &LiveConfig) -> Value {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.voice } }
                }
            },
            "systemInstruction": { "parts": [{ "text": config.system_instruction }] }
        }
    })
}

/// One outbound microphone frame.
pub fn audio_input_message(data_b64: &str) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{ "mimeType": INPUT_MIME_TYPE, "data": data_b64 }]
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<TurnPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: Option<String>,
}

/// Parses one server message into events, audio first.
///
/// Messages we do not care about (tool calls, usage, go-away) yield no
/// events.
pub fn parse_server_message(text: &str) -> Result<Vec<LiveEvent>, serde_json::Error> {
    let message: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(LiveEvent::SetupComplete);
    }

    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|p| p.inline_data.and_then(|d| d.data))
                    .filter(|d| !d.is_empty())
                    .map(LiveEvent::Audio),
            );
        }
        if content.interrupted {
            events.push(LiveEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(LiveEvent::TurnComplete);
        }
    }

    Ok(events)
}

// ============ Session ============

fn live_error(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::classify(ProviderKind::Gemini, None, &format!("{}: {}", context, err))
}

/// An open live session, before being split into its two directions.
pub struct LiveSession {
    socket: LiveSocket,
}

impl LiveSession {
    /// Opens the socket and sends the setup message.
    pub async fn connect(config: &LiveConfig) -> Result<Self, AppError> {
        let url = format!("{}?key={}", config.url, config.api_key);
        tracing::info!("Opening live session on {} ({})", config.url, config.model);

        let (mut socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| live_error("Live connection failed", e))?;

        socket
            .send(WsMessage::Text(setup_message(config).to_string()))
            .await
            .map_err(|e| live_error("Live setup failed", e))?;

        Ok(Self { socket })
    }

    pub fn split(self) -> (LiveSender, LiveReceiver) {
        let (sink, stream) = self.socket.split();
        (
            LiveSender { sink },
            LiveReceiver {
                stream,
                pending: VecDeque::new(),
            },
        )
    }
}

/// Outbound half: microphone frames.
pub struct LiveSender {
    sink: SplitSink<LiveSocket, WsMessage>,
}

impl LiveSender {
    pub async fn send_audio(&mut self, data_b64: &str) -> Result<(), AppError> {
        self.sink
            .send(WsMessage::Text(audio_input_message(data_b64).to_string()))
            .await
            .map_err(|e| live_error("Live send failed", e))
    }

    pub async fn close(&mut self) -> Result<(), AppError> {
        self.sink
            .close()
            .await
            .map_err(|e| live_error("Live close failed", e))
    }
}

/// Inbound half: provider events.
pub struct LiveReceiver {
    stream: SplitStream<LiveSocket>,
    pending: VecDeque<LiveEvent>,
}

impl LiveReceiver {
    /// Next provider event; `Ok(None)` once the provider closed the session.
    ///
    /// Cancel-safe: events are buffered before any await point.
    pub async fn next_event(&mut self) -> Result<Option<LiveEvent>, AppError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(live_error("Live receive failed", e)),
                None => return Ok(None),
            };

            let text = match message {
                WsMessage::Text(text) => text,
                WsMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                WsMessage::Close(frame) => {
                    if let Some(frame) = frame {
                        tracing::info!("Live session closed by provider: {}", frame.reason);
                        if frame.code != CloseCode::Normal {
                            return Err(live_error("Live session closed", frame.reason));
                        }
                    }
                    return Ok(None);
                }
                _ => continue,
            };

            match parse_server_message(&text) {
                Ok(events) => self.pending.extend(events),
                Err(e) => tracing::warn!("Ignoring unparsable live message: {}", e),
            }
        }
    }
}
