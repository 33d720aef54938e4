#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchboard_conference::{
    ConferenceError, ConferenceRegistry, RegistrySettings, TelephonyBackend,
};
use switchboard_intents::{ContactBook, ContactDirectory, IntentResolver, Region};
use switchboard_server::AppState;
use switchboard_voice::{AudioSink, TranscriptEvent, Transcriber, TranscriptionStream, VoiceError};
use tokio::sync::mpsc;

pub const TOKEN: &str = "test-bearer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Place { from: String, to: String, twiml: String },
    Complete(String),
    Hangup(String),
}

#[derive(Default)]
pub struct RecordingBackend {
    ops: Mutex<Vec<Op>>,
    placed: AtomicUsize,
    pub fail_place: AtomicBool,
}

impl RecordingBackend {
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelephonyBackend for RecordingBackend {
    async fn place_call(&self, from: &str, to: &str, twiml: &str) -> Result<String, ConferenceError> {
        if self.fail_place.load(Ordering::SeqCst) {
            return Err(ConferenceError::Telephony("HTTP 400: invalid To number".to_string()));
        }
        self.ops.lock().unwrap().push(Op::Place {
            from: from.to_string(),
            to: to.to_string(),
            twiml: twiml.to_string(),
        });
        let n = self.placed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("CAout{}", n))
    }

    async fn complete_conference(&self, conference_sid: &str) -> Result<(), ConferenceError> {
        self.ops
            .lock()
            .unwrap()
            .push(Op::Complete(conference_sid.to_string()));
        Ok(())
    }

    async fn hangup_call(&self, call_sid: &str) -> Result<(), ConferenceError> {
        self.ops.lock().unwrap().push(Op::Hangup(call_sid.to_string()));
        Ok(())
    }
}

type SharedSender = Arc<Mutex<Option<mpsc::Sender<TranscriptEvent>>>>;

/// Transcriber whose transcripts are pushed by the test.
#[derive(Default)]
pub struct ChannelTranscriber {
    sender: SharedSender,
    pub audio: Arc<Mutex<Vec<Vec<u8>>>>,
    pub closed: Arc<AtomicBool>,
}

impl ChannelTranscriber {
    /// Waits until a session has been opened.
    pub async fn opened(&self) {
        for _ in 0..200 {
            if self.sender.lock().unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transcription session was never opened");
    }

    pub async fn say(&self, text: &str) {
        let tx = self.sender.lock().unwrap().clone().expect("session is open");
        tx.send(TranscriptEvent::Transcript {
            text: text.to_string(),
            is_final: true,
        })
        .await
        .unwrap();
    }
}

struct ChannelSink {
    sender: SharedSender,
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl AudioSink for ChannelSink {
    async fn send_audio(&mut self, audio: Vec<u8>) -> Result<(), VoiceError> {
        self.audio.lock().unwrap().push(audio);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VoiceError> {
        self.closed.store(true, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
        Ok(())
    }
}

#[async_trait]
impl Transcriber for ChannelTranscriber {
    async fn open(&self, _call_sid: &str) -> Result<TranscriptionStream, VoiceError> {
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock().unwrap() = Some(tx);
        Ok(TranscriptionStream {
            sink: Box::new(ChannelSink {
                sender: self.sender.clone(),
                audio: self.audio.clone(),
                closed: self.closed.clone(),
            }),
            events: rx,
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub backend: Arc<RecordingBackend>,
    pub transcriber: Arc<ChannelTranscriber>,
}

pub fn test_app() -> TestApp {
    test_app_with(Arc::new(ContactBook::in_memory(Region::US)), TOKEN)
}

pub fn test_app_with(contacts: Arc<ContactBook>, token: &str) -> TestApp {
    let backend = Arc::new(RecordingBackend::default());
    let registry = ConferenceRegistry::new(
        backend.clone(),
        RegistrySettings {
            default_from: "+15550001111".to_string(),
            status_callback_url: Some("https://agent.example/conference/events".to_string()),
            ..RegistrySettings::default()
        },
    );
    let resolver = IntentResolver::new(contacts.clone() as Arc<dyn ContactDirectory>, Region::US);
    let transcriber = Arc::new(ChannelTranscriber::default());

    let state = AppState {
        registry,
        resolver: Arc::new(resolver),
        contacts,
        transcriber: transcriber.clone(),
        media_stream_url: "wss://agent.example/media-stream".to_string(),
        status_callback_url: "https://agent.example/conference/events".to_string(),
        api_bearer_token: token.to_string(),
    };

    TestApp {
        state,
        backend,
        transcriber,
    }
}

/// Polls `check` until it holds, failing the test after about two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
