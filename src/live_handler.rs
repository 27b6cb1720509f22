use crate::errors::AppError;
use crate::handlers::AppState;
use crate::live::{LiveConfig, LiveEvent, LiveSender, LiveSession};
use crate::pcm::{
    decode_pcm16_base64, duration_secs, encode_pcm16_base64, f32_le_bytes_to_samples,
    stereo_to_mono, FrameChunker, StreamResampler, FRAME_SAMPLES, INPUT_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE,
};
use crate::playback::PlaybackScheduler;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;
/// Typical capture rate of a browser audio context.
const DEFAULT_CLIENT_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    /// Rate of the little-endian f32 samples the client sends.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Interleaved channel count of those samples.
    #[serde(default = "default_channels")]
    pub channels: u16,
}

/// Input format of one relay, fixed at upgrade time.
#[derive(Debug, Clone, Copy)]
struct InputFormat {
    sample_rate: u32,
    channels: u16,
}

/// Microphone path of one relay: downmix, resample and frame. Resampler
/// phase and partial frames carry over between client messages.
#[derive(Debug)]
struct MicrophoneUplink {
    channels: u16,
    resampler: StreamResampler,
    chunker: FrameChunker,
}

impl MicrophoneUplink {
    fn new(input: InputFormat) -> Self {
        Self {
            channels: input.channels,
            resampler: StreamResampler::new(input.sample_rate, INPUT_SAMPLE_RATE),
            chunker: FrameChunker::new(FRAME_SAMPLES),
        }
    }

    /// Complete 16 kHz frames now available after `bytes` of client audio.
    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<f32>> {
        let mono = stereo_to_mono(&f32_le_bytes_to_samples(bytes), self.channels);
        let resampled = self.resampler.process(&mono);
        self.chunker.push(&resampled)
    }
}

fn default_sample_rate() -> u32 {
    DEFAULT_CLIENT_SAMPLE_RATE
}

fn default_channels() -> u16 {
    1
}

/// Control messages the client may send as text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientControl {
    /// A scheduled source finished playing early on the client.
    Ended { id: u64 },
    /// The user pressed stop.
    Stop,
}

/// GET /api/v1/live
///
/// Upgrades to a WebSocket and relays a voice conversation with the
/// provider. Binary client frames carry microphone samples; the server
/// answers with JSON `ready`, `audio`, `interrupted`, `turn_complete` and
/// `error` messages.
pub async fn live_socket(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LiveParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&params.sample_rate) {
        return Err(AppError::BadRequest(format!(
            "sample_rate must be between {} and {}",
            MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }
    if !(1..=8).contains(&params.channels) {
        return Err(AppError::BadRequest(
            "channels must be between 1 and 8".to_string(),
        ));
    }

    let live_config = LiveConfig::from_config(&state.config);
    let input = InputFormat {
        sample_rate: params.sample_rate,
        channels: params.channels,
    };
    tracing::info!(
        "Live voice session requested ({} Hz, {} ch input)",
        input.sample_rate,
        input.channels
    );

    Ok(ws.on_upgrade(move |socket| relay(socket, live_config, input)))
}

async fn send_json(client: &mut SplitSink<WebSocket, Message>, value: Value) -> bool {
    client.send(Message::Text(value.to_string())).await.is_ok()
}

/// Runs one voice session until either side closes it.
async fn relay(socket: WebSocket, live_config: LiveConfig, input: InputFormat) {
    let (mut client_tx, mut client_rx) = socket.split();

    let (mut upstream_tx, mut upstream_rx) = match LiveSession::connect(&live_config).await {
        Ok(session) => session.split(),
        Err(e) => {
            tracing::error!("Failed to start live session: {}", e);
            let _ = send_json(
                &mut client_tx,
                json!({ "type": "error", "kind": e.kind(), "message": e.user_message() }),
            )
            .await;
            let _ = client_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let clock = Instant::now();
    let mut scheduler = PlaybackScheduler::new();
    let mut uplink = MicrophoneUplink::new(input);

    loop {
        tokio::select! {
            incoming = client_rx.next() => {
                let keep_going = match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        forward_microphone(&mut upstream_tx, &mut uplink, &bytes).await
                    }
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientControl>(&text) {
                        Ok(ClientControl::Ended { id }) => {
                            scheduler.mark_ended(id);
                            true
                        }
                        Ok(ClientControl::Stop) => false,
                        Err(_) => {
                            tracing::debug!("Ignoring unknown live control message");
                            true
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => false,
                    Some(Err(e)) => {
                        tracing::warn!("Live client socket error: {}", e);
                        false
                    }
                    Some(Ok(_)) => true,
                };
                if !keep_going {
                    tracing::info!("Live session closed by client");
                    break;
                }
            }
            event = upstream_rx.next_event() => {
                let now = clock.elapsed().as_secs_f64();
                if !handle_provider_event(event, &mut client_tx, &mut scheduler, now).await {
                    break;
                }
            }
        }
    }

    scheduler.close();
    if let Err(e) = upstream_tx.close().await {
        tracing::debug!("Upstream close: {}", e);
    }
    let _ = client_tx.send(Message::Close(None)).await;
    tracing::info!("Live session ended after {:.1}s", clock.elapsed().as_secs_f64());
}

/// Downmixes, resamples, frames and forwards client audio. Returns `false`
/// when the upstream socket is gone.
async fn forward_microphone(
    upstream: &mut LiveSender,
    uplink: &mut MicrophoneUplink,
    bytes: &[u8],
) -> bool {
    for frame in uplink.push(bytes) {
        if let Err(e) = upstream.send_audio(&encode_pcm16_base64(&frame)).await {
            tracing::warn!("Dropping live session: {}", e);
            return false;
        }
    }
    true
}

/// Schedules provider audio and relays control events. Returns `false` when
/// the session should end.
async fn handle_provider_event(
    event: Result<Option<LiveEvent>, AppError>,
    client: &mut SplitSink<WebSocket, Message>,
    scheduler: &mut PlaybackScheduler,
    now: f64,
) -> bool {
    match event {
        Ok(Some(LiveEvent::SetupComplete)) => send_json(client, json!({ "type": "ready" })).await,
        Ok(Some(LiveEvent::Audio(data))) => {
            let samples = match decode_pcm16_base64(&data) {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!("Skipping undecodable audio chunk: {}", e);
                    return true;
                }
            };
            let source = scheduler.schedule(duration_secs(samples.len(), OUTPUT_SAMPLE_RATE), now);
            send_json(
                client,
                json!({
                    "type": "audio",
                    "id": source.id,
                    "startAt": source.start_at,
                    "duration": source.duration,
                    "sampleRate": OUTPUT_SAMPLE_RATE,
                    "data": data,
                }),
            )
            .await
        }
        Ok(Some(LiveEvent::Interrupted)) => {
            let stopped = scheduler.interrupt(now);
            tracing::debug!("Live turn interrupted, stopping {} sources", stopped.len());
            send_json(client, json!({ "type": "interrupted", "stopped": stopped })).await
        }
        Ok(Some(LiveEvent::TurnComplete)) => {
            send_json(client, json!({ "type": "turn_complete" })).await
        }
        Ok(None) => {
            tracing::info!("Live session closed by provider");
            false
        }
        Err(e) => {
            tracing::error!("Live session error: {}", e);
            let _ = send_json(
                client,
                json!({ "type": "error", "kind": e.kind(), "message": e.user_message() }),
            )
            .await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_default_to_browser_mono() {
        let params: LiveParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.sample_rate, 48_000);
        assert_eq!(params.channels, 1);
    }

    #[test]
    fn test_client_control_messages() {
        assert!(matches!(
            serde_json::from_str::<ClientControl>(r#"{"type":"ended","id":7}"#).unwrap(),
            ClientControl::Ended { id: 7 }
        ));
        assert!(matches!(
            serde_json::from_str::<ClientControl>(r#"{"type":"stop"}"#).unwrap(),
            ClientControl::Stop
        ));
        assert!(serde_json::from_str::<ClientControl>(r#"{"type":"dance"}"#).is_err());
    }

    fn f32_bytes(samples: impl Iterator<Item = f32>) -> Vec<u8> {
        samples.flat_map(f32::to_le_bytes).collect()
    }

    #[test]
    fn test_uplink_keeps_16k_over_small_messages() {
        // 2 s of 48 kHz stereo in 128-frame messages
        let mut uplink = MicrophoneUplink::new(InputFormat {
            sample_rate: 48_000,
            channels: 2,
        });
        let mut emitted = 0;
        for _ in 0..(96_000 / 128) {
            for frame in uplink.push(&f32_bytes(std::iter::repeat(0.25).take(256))) {
                assert_eq!(frame.len(), FRAME_SAMPLES);
                emitted += frame.len();
            }
        }

        assert_eq!(emitted + uplink.chunker.pending_len(), 32_000);
    }
}
