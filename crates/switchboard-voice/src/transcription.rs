//! Streaming speech-to-text.
//!
//! A [`Transcriber`] opens one bidirectional session per call: raw audio
//! goes in through the [`AudioSink`], [`TranscriptEvent`]s come back on a
//! channel in the order the service produced them.

use crate::config::TranscriptionConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Buffered transcript events per session.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Opened,
    Transcript { text: String, is_final: bool },
    Error(String),
    Closed,
}

/// Write half of a transcription session.
#[async_trait]
pub trait AudioSink: Send {
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), VoiceError>;

    /// Asks the service to flush pending results and finish.
    async fn close(&mut self) -> Result<(), VoiceError>;
}

pub struct TranscriptionStream {
    pub sink: Box<dyn AudioSink>,
    pub events: mpsc::Receiver<TranscriptEvent>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Opens a session. `call_sid` only tags log lines.
    async fn open(&self, call_sid: &str) -> Result<TranscriptionStream, VoiceError>;
}

type ListenSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Deepgram live transcription over WebSocket.
#[derive(Debug, Clone)]
pub struct DeepgramTranscriber {
    config: TranscriptionConfig,
}

impl DeepgramTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn open(&self, call_sid: &str) -> Result<TranscriptionStream, VoiceError> {
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config(
                "transcription api key is not set".to_string(),
            ));
        }

        let mut request = self.config.listen_url().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| VoiceError::Config(format!("invalid transcription api key: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _response) = connect_async(request).await?;
        let (write, read) = socket.split();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        // The receiver may already be gone; a dropped session just ends.
        let _ = tx.send(TranscriptEvent::Opened).await;
        tokio::spawn(read_transcripts(read, tx, call_sid.to_string()));

        Ok(TranscriptionStream {
            sink: Box::new(DeepgramSink { write }),
            events: rx,
        })
    }
}

struct DeepgramSink {
    write: SplitSink<ListenSocket, Message>,
}

#[async_trait]
impl AudioSink for DeepgramSink {
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), VoiceError> {
        self.write.send(Message::Binary(audio.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VoiceError> {
        self.write
            .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
            .await?;
        Ok(())
    }
}

async fn read_transcripts(
    mut read: SplitStream<ListenSocket>,
    tx: mpsc::Sender<TranscriptEvent>,
    call_sid: String,
) {
    while let Some(frame) = read.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => match parse_listen_message(text.as_str()) {
                Some(event) => event,
                None => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(call_sid = %call_sid, "transcription socket error: {}", e);
                let _ = tx.send(TranscriptEvent::Error(e.to_string())).await;
                break;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }

    let _ = tx.send(TranscriptEvent::Closed).await;
}

#[derive(Deserialize)]
struct ListenMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Option<ListenChannel>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

/// Maps one service message to an event. Metadata and speech markers
/// produce nothing.
fn parse_listen_message(text: &str) -> Option<TranscriptEvent> {
    let message: ListenMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("unparseable transcription message: {}", e);
            return None;
        }
    };

    match message.kind.as_str() {
        "Results" => {
            let text = message
                .channel
                .and_then(|c| c.alternatives.into_iter().next())
                .map(|a| a.transcript)
                .unwrap_or_default();
            Some(TranscriptEvent::Transcript {
                text,
                is_final: message.is_final,
            })
        }
        "Error" => Some(TranscriptEvent::Error(
            message
                .description
                .unwrap_or_else(|| "unspecified transcription error".to_string()),
        )),
        _ => None,
    }
}
