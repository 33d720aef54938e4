//! Real-time voice handling for the switchboard agent.
//!
//! Bridges a caller's media stream to a streaming transcription service and
//! turns what the caller says into conference actions.

pub mod config;
pub mod error;
pub mod stream;
pub mod transcription;

pub use config::TranscriptionConfig;
pub use error::VoiceError;
pub use stream::{
    dispatch, MediaStream, StreamContext, StreamSession, StreamState, DEFAULT_DRAIN_TIMEOUT,
};
pub use transcription::{
    AudioSink, DeepgramTranscriber, TranscriptEvent, Transcriber, TranscriptionStream,
};
