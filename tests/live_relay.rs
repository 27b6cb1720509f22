/// Live relay tests: the axum server runs on a local port and a local
/// WebSocket server stands in for Gemini Live.
use futures_util::{SinkExt, StreamExt};
use lombardy_energy_leads::accumulator::SessionStore;
use lombardy_energy_leads::config::Config;
use lombardy_energy_leads::handlers::AppState;
use lombardy_energy_leads::pcm::decode_pcm16_base64;
use lombardy_energy_leads::provider_store::ProviderStore;
use lombardy_energy_leads::routes::create_router;
use lombardy_energy_leads::services::InferenceService;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_secs(5);

/// Half a second of silence at 24 kHz, as the provider would send it.
fn half_second_b64() -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; 24_000])
}

fn audio_message(data: &str) -> Message {
    Message::Text(
        json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": data } }
                ]}
            }
        })
        .to_string(),
    )
}

fn text_message(value: Value) -> Message {
    Message::Text(value.to_string())
}

/// Accepts one upstream connection, checks the setup message, sends
/// `script`, optionally closes, and returns every text message received
/// until the relay closes its side.
async fn start_upstream(script: Vec<Message>, close_after: bool) -> (String, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let setup = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("expected setup message, got {:?}", other),
        };
        assert!(setup["setup"]["model"].as_str().unwrap().starts_with("models/"));

        for message in script {
            ws.send(message).await.unwrap();
        }
        if close_after {
            let _ = ws.close(None).await;
        }

        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => received.push(serde_json::from_str(&text).unwrap()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    (format!("ws://{}/live", addr), handle)
}

async fn start_app(live_url: String) -> (SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        gemini_api_key: "server-gemini-key".to_string(),
        gemini_live_url: live_url,
        provider_config_dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    let state = Arc::new(AppState {
        inference: InferenceService::new(&config).unwrap(),
        providers: ProviderStore::open(dir.path()).await,
        sessions: SessionStore::new(Duration::from_secs(60), 10),
        config,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    (addr, dir)
}

async fn connect_client(addr: SocketAddr, query: &str) -> ClientSocket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/v1/live?{}", addr, query))
        .await
        .unwrap();
    socket
}

/// Next JSON message from the relay, or `None` once it closed the socket.
async fn next_json(client: &mut ClientSocket) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(STEP, client.next())
            .await
            .expect("relay went quiet");
        match message {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn test_provider_audio_is_scheduled_and_interrupted() {
    let audio = half_second_b64();
    let (live_url, upstream) = start_upstream(
        vec![
            text_message(json!({ "setupComplete": {} })),
            audio_message(&audio),
            audio_message(&audio),
            text_message(json!({ "serverContent": { "interrupted": true } })),
            audio_message(&audio),
            text_message(json!({ "serverContent": { "turnComplete": true } })),
        ],
        true,
    )
    .await;
    let (addr, _dir) = start_app(live_url).await;
    let mut client = connect_client(addr, "sample_rate=16000").await;

    assert_eq!(next_json(&mut client).await.unwrap(), json!({ "type": "ready" }));

    let first = next_json(&mut client).await.unwrap();
    assert_eq!(first["type"], "audio");
    assert_eq!(first["id"], 0);
    assert_eq!(first["duration"], 0.5);
    assert_eq!(first["sampleRate"], 24_000);
    assert_eq!(first["data"], audio.as_str());
    let first_start = first["startAt"].as_f64().unwrap();
    assert!(first_start >= 0.0);

    // queued back to back
    let second = next_json(&mut client).await.unwrap();
    assert_eq!(second["id"], 1);
    assert!((second["startAt"].as_f64().unwrap() - (first_start + 0.5)).abs() < 1e-9);

    let interrupted = next_json(&mut client).await.unwrap();
    assert_eq!(interrupted, json!({ "type": "interrupted", "stopped": [0, 1] }));

    // the cursor was reset, so the next buffer starts at the clock again
    let third = next_json(&mut client).await.unwrap();
    assert_eq!(third["id"], 2);
    assert!(third["startAt"].as_f64().unwrap() < first_start + 1.0);

    assert_eq!(next_json(&mut client).await.unwrap(), json!({ "type": "turn_complete" }));

    // the provider hung up, so the client socket is closed too
    assert!(next_json(&mut client).await.is_none());
    let received = tokio::time::timeout(STEP, upstream).await.unwrap().unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_microphone_frames_forwarded_and_stop_closes_upstream() {
    let (live_url, upstream) =
        start_upstream(vec![text_message(json!({ "setupComplete": {} }))], false).await;
    let (addr, _dir) = start_app(live_url).await;
    let mut client = connect_client(addr, "sample_rate=16000&channels=1").await;
    assert_eq!(next_json(&mut client).await.unwrap()["type"], "ready");

    // one full frame plus a partial one that stays buffered
    let samples: Vec<u8> = (0..4096 + 100)
        .flat_map(|i| (if i % 2 == 0 { 0.5f32 } else { -0.5 }).to_le_bytes())
        .collect();
    client.send(Message::Binary(samples)).await.unwrap();
    client
        .send(Message::Text(json!({ "type": "stop" }).to_string()))
        .await
        .unwrap();

    assert!(next_json(&mut client).await.is_none());

    let received = tokio::time::timeout(STEP, upstream).await.unwrap().unwrap();
    assert_eq!(received.len(), 1);
    let chunk = &received[0]["realtimeInput"]["mediaChunks"][0];
    assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");

    let frame = decode_pcm16_base64(chunk["data"].as_str().unwrap()).unwrap();
    assert_eq!(frame.len(), 4096);
    assert_eq!(frame[0], 0.5);
    assert_eq!(frame[1], -0.5);
}

#[tokio::test]
async fn test_client_hangup_closes_upstream() {
    let (live_url, upstream) =
        start_upstream(vec![text_message(json!({ "setupComplete": {} }))], false).await;
    let (addr, _dir) = start_app(live_url).await;
    let mut client = connect_client(addr, "").await;
    assert_eq!(next_json(&mut client).await.unwrap()["type"], "ready");

    client.close(None).await.unwrap();

    let received = tokio::time::timeout(STEP, upstream).await.unwrap().unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_unreachable_provider_reports_error_and_closes() {
    // reserve a port, then free it so nothing is listening there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("ws://{}/live", listener.local_addr().unwrap());
    drop(listener);

    let (addr, _dir) = start_app(dead_url).await;
    let mut client = connect_client(addr, "").await;

    let error = next_json(&mut client).await.unwrap();
    assert_eq!(error["type"], "error");
    assert!(error["kind"].is_string());
    assert!(!error["message"].as_str().unwrap().contains("server-gemini-key"));
    assert!(next_json(&mut client).await.is_none());
}

#[tokio::test]
async fn test_invalid_input_format_is_rejected_before_upgrade() {
    let (addr, _dir) = start_app("ws://127.0.0.1:9/live".to_string()).await;

    for query in ["sample_rate=100", "channels=0", "channels=9"] {
        let err = tokio_tungstenite::connect_async(format!("ws://{}/api/v1/live?{}", addr, query))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => {
                assert_eq!(response.status(), 400, "{}", query);
            }
            other => panic!("expected HTTP 400 for {}, got {:?}", query, other),
        }
    }
}
