//! Conference management for the switchboard agent.
//!
//! Tracks active conferences reported by the telephony backend, enforces
//! the auto-hangup lifetime cap, and performs the outbound actions spoken
//! commands trigger: dialing a participant in, forwarding, and ending the
//! conference.

pub mod error;
pub mod registry;
pub mod telephony;
pub mod twiml;

pub use error::ConferenceError;
pub use registry::{
    CleanupCause, ConferenceRegistry, RegistrySettings, SessionSnapshot, DEFAULT_AGENT_LABEL,
    DEFAULT_AUTO_HANGUP,
};
pub use telephony::{TelephonyBackend, TwilioClient, TwilioConfig};
