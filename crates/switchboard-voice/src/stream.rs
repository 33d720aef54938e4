//! Per-connection media stream handling.
//!
//! One [`MediaStream`] lives for each `/media-stream` WebSocket. It moves
//! `Idle -> Streaming -> Terminated`; once terminated every further event is
//! ignored. Finalized transcripts are resolved and dispatched by a
//! per-connection worker, strictly in arrival order, so a slow completion
//! request never holds up audio forwarding.

use crate::transcription::{AudioSink, TranscriptEvent, Transcriber};
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use switchboard_conference::ConferenceRegistry;
use switchboard_intents::IntentResolver;
use switchboard_types::{
    conference_name_for_call, IntentKind, MediaChunk, MediaStreamEvent, ParsedIntent, StreamStart,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long termination waits for queued transcripts to be processed.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a stream needs to act on what the caller says.
#[derive(Clone)]
pub struct StreamContext {
    pub transcriber: Arc<dyn Transcriber>,
    pub resolver: Arc<IntentResolver>,
    pub registry: ConferenceRegistry,
}

/// Identity of the call behind a stream, captured from the `start` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub stream_sid: Option<String>,
    pub call_sid: String,
    pub conference_name: String,
    pub caller: Option<String>,
}

impl StreamSession {
    fn from_start(stream_sid: Option<String>, start: &StreamStart) -> Self {
        let call_sid = start
            .call_sid
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| start.parameter("callSid").map(str::to_string))
            .unwrap_or_default();
        let conference_name = start
            .parameter("conferenceName")
            .map(str::to_string)
            .unwrap_or_else(|| conference_name_for_call(&call_sid));

        Self {
            stream_sid: stream_sid.or_else(|| start.stream_sid.clone()),
            caller: start.parameter("caller").map(str::to_string),
            call_sid,
            conference_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Terminated,
}

struct Active {
    session: StreamSession,
    sink: Option<Box<dyn AudioSink>>,
    worker: Option<JoinHandle<()>>,
}

enum State {
    Idle,
    Streaming(Active),
    Terminated,
}

pub struct MediaStream {
    ctx: StreamContext,
    state: State,
    drain_timeout: Duration,
}

impl MediaStream {
    pub fn new(ctx: StreamContext) -> Self {
        Self {
            ctx,
            state: State::Idle,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn state(&self) -> StreamState {
        match self.state {
            State::Idle => StreamState::Idle,
            State::Streaming(_) => StreamState::Streaming,
            State::Terminated => StreamState::Terminated,
        }
    }

    pub fn session(&self) -> Option<&StreamSession> {
        match &self.state {
            State::Streaming(active) => Some(&active.session),
            _ => None,
        }
    }

    /// Whether audio is currently being forwarded for transcription.
    pub fn is_transcribing(&self) -> bool {
        matches!(&self.state, State::Streaming(active) if active.sink.is_some())
    }

    /// Handles one text frame from the socket.
    pub async fn handle_text(&mut self, text: &str) {
        match MediaStreamEvent::parse(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => tracing::warn!("unparseable media stream message: {}", e),
        }
    }

    pub async fn handle_event(&mut self, event: MediaStreamEvent) {
        if matches!(self.state, State::Terminated) {
            return;
        }

        tracing::trace!(event = event.name(), "media stream event");
        match event {
            MediaStreamEvent::Connected => tracing::debug!("media stream connected"),
            MediaStreamEvent::Start { stream_sid, start } => self.start(stream_sid, &start).await,
            MediaStreamEvent::Media { media } => self.forward_audio(media).await,
            MediaStreamEvent::Stop => {
                if let Some(session) = self.session() {
                    tracing::info!(
                        call_sid = %session.call_sid,
                        conference_name = %session.conference_name,
                        event = "stream-stop",
                        "media stream stopped"
                    );
                }
                self.terminate().await;
            }
            MediaStreamEvent::Unknown => tracing::debug!("ignoring media stream event"),
        }
    }

    /// Connection closed by either side.
    pub async fn close(&mut self) {
        if let Some(session) = self.session() {
            tracing::info!(
                call_sid = %session.call_sid,
                event = "ws-disconnect",
                "media stream connection closed"
            );
        }
        self.terminate().await;
    }

    async fn start(&mut self, stream_sid: Option<String>, start: &StreamStart) {
        if !matches!(self.state, State::Idle) {
            tracing::warn!("duplicate media stream start ignored");
            return;
        }

        let session = StreamSession::from_start(stream_sid, start);
        tracing::info!(
            stream_sid = session.stream_sid.as_deref().unwrap_or(""),
            call_sid = %session.call_sid,
            conference_name = %session.conference_name,
            event = "stream-start",
            "media stream started"
        );

        let (sink, worker) = match self.ctx.transcriber.open(&session.call_sid).await {
            Ok(stream) => {
                let worker = tokio::spawn(process_transcripts(
                    self.ctx.clone(),
                    session.clone(),
                    stream.events,
                ));
                (Some(stream.sink), Some(worker))
            }
            Err(e) => {
                tracing::error!(
                    call_sid = %session.call_sid,
                    "failed to open transcription session: {}",
                    e
                );
                (None, None)
            }
        };

        self.state = State::Streaming(Active {
            session,
            sink,
            worker,
        });
    }

    async fn forward_audio(&mut self, media: MediaChunk) {
        let State::Streaming(active) = &mut self.state else {
            tracing::debug!("media before start ignored");
            return;
        };
        let Some(sink) = active.sink.as_mut() else {
            return;
        };
        if media.payload.is_empty() {
            return;
        }

        let audio = match base64::engine::general_purpose::STANDARD.decode(&media.payload) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(
                    call_sid = %active.session.call_sid,
                    "invalid media payload: {}",
                    e
                );
                return;
            }
        };

        let sent = sink.send_audio(audio).await;
        if let Err(e) = sent {
            tracing::error!(
                call_sid = %active.session.call_sid,
                "failed to forward audio, stopping transcription: {}",
                e
            );
            active.sink = None;
        }
    }

    async fn terminate(&mut self) {
        let State::Streaming(mut active) = std::mem::replace(&mut self.state, State::Terminated)
        else {
            return;
        };

        if let Some(mut sink) = active.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::warn!(
                    call_sid = %active.session.call_sid,
                    "failed to close transcription session: {}",
                    e
                );
            }
        }

        if let Some(mut worker) = active.worker.take() {
            if tokio::time::timeout(self.drain_timeout, &mut worker)
                .await
                .is_err()
            {
                tracing::warn!(
                    call_sid = %active.session.call_sid,
                    "transcript worker did not drain in time, aborting"
                );
                worker.abort();
            }
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if let State::Streaming(active) = &mut self.state {
            if let Some(worker) = active.worker.take() {
                worker.abort();
            }
        }
    }
}

async fn process_transcripts(
    ctx: StreamContext,
    session: StreamSession,
    mut events: mpsc::Receiver<TranscriptEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TranscriptEvent::Opened => {
                tracing::debug!(call_sid = %session.call_sid, "transcription session opened")
            }
            TranscriptEvent::Transcript { text, is_final } => {
                let text = text.trim();
                if !is_final || text.is_empty() {
                    continue;
                }
                tracing::info!(
                    call_sid = %session.call_sid,
                    transcript = %text,
                    event = "transcript",
                    "transcript received"
                );

                let intent = ctx.resolver.resolve(text, Some(&session.call_sid)).await;
                if intent.kind != IntentKind::None {
                    dispatch(&ctx.registry, &session, &intent).await;
                }
            }
            TranscriptEvent::Error(message) => {
                tracing::error!(
                    call_sid = %session.call_sid,
                    "transcription service error: {}",
                    message
                )
            }
            TranscriptEvent::Closed => {
                tracing::debug!(call_sid = %session.call_sid, "transcription session closed")
            }
        }
    }
}

/// Executes an actionable intent against the caller's conference.
pub async fn dispatch(registry: &ConferenceRegistry, session: &StreamSession, intent: &ParsedIntent) {
    let conference_name = session.conference_name.as_str();
    tracing::info!(
        call_sid = %session.call_sid,
        intent = intent.kind.as_str(),
        target = intent.target_label().unwrap_or(""),
        "intent detected"
    );

    let target = intent.target_number.as_deref();
    if intent.kind.needs_target() && target.is_none() {
        tracing::warn!(
            call_sid = %session.call_sid,
            intent = intent.kind.as_str(),
            target_name = intent.target_name.as_deref().unwrap_or(""),
            "intent has no target number, skipping"
        );
        return;
    }

    let result = match (intent.kind, target) {
        (IntentKind::End, _) => registry.end_conference(conference_name).await.map(|()| None),
        (IntentKind::Add, Some(number)) => registry
            .add_participant(conference_name, number, None)
            .await
            .map(Some),
        (IntentKind::Forward, Some(number)) => registry
            .forward_call(conference_name, number, false, None)
            .await
            .map(Some),
        _ => return,
    };

    match result {
        Ok(call_sid) => tracing::info!(
            call_sid = %session.call_sid,
            conference_name = %conference_name,
            intent = intent.kind.as_str(),
            new_call_sid = call_sid.as_deref().unwrap_or(""),
            "intent executed"
        ),
        Err(e) => tracing::error!(
            call_sid = %session.call_sid,
            conference_name = %conference_name,
            intent = intent.kind.as_str(),
            "intent execution failed: {}",
            e
        ),
    }
}
