//! In-process record of active conferences.
//!
//! The registry is keyed by conference name (the handle callers and the
//! media stream use) with a secondary index from the backend's conference
//! sid (the handle webhooks carry). Each session owns an auto-hangup timer.
//!
//! The session map sits behind a synchronous mutex that is never held across
//! an `.await`; only calls into the [`TelephonyBackend`] suspend.

use crate::error::ConferenceError;
use crate::telephony::TelephonyBackend;
use crate::twiml;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Hard lifetime cap for a conference.
pub const DEFAULT_AUTO_HANGUP: Duration = Duration::from_secs(20 * 60);

/// Participant label that marks the agent's own leg.
pub const DEFAULT_AGENT_LABEL: &str = "agent";

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub auto_hangup: Duration,
    /// Caller id used when an operation does not supply one.
    pub default_from: String,
    /// Where outbound legs report conference events.
    pub status_callback_url: Option<String>,
    pub agent_label: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            auto_hangup: DEFAULT_AUTO_HANGUP,
            default_from: String::new(),
            status_callback_url: None,
            agent_label: DEFAULT_AGENT_LABEL.to_string(),
        }
    }
}

/// Why a session was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupCause {
    LastParticipantLeft,
    ConferenceEnded,
    EndRequested,
    Expired,
    Shutdown,
}

impl CleanupCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastParticipantLeft => "last-participant-left",
            Self::ConferenceEnded => "conference-end",
            Self::EndRequested => "end-requested",
            Self::Expired => "auto-hangup",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Read-only copy of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub sid: String,
    pub name: String,
    /// Joined call legs and the participant label each joined with.
    pub participants: BTreeMap<String, Option<String>>,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

struct Session {
    sid: String,
    name: String,
    participants: HashMap<String, Option<String>>,
    started_at: DateTime<Utc>,
    generation: u64,
    timer: Option<AbortHandle>,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            sid: self.sid.clone(),
            name: self.name.clone(),
            participants: self
                .participants
                .iter()
                .map(|(leg, label)| (leg.clone(), label.clone()))
                .collect(),
            started_at: self.started_at,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Sessions {
    by_name: HashMap<String, Session>,
    name_by_sid: HashMap<String, String>,
    next_generation: u64,
}

impl Sessions {
    fn get_by_sid(&mut self, sid: &str) -> Option<&mut Session> {
        let name = self.name_by_sid.get(sid)?;
        self.by_name.get_mut(name)
    }

    /// Removes the session under `name` and its sid index entry, cancelling
    /// its timer.
    fn remove(&mut self, name: &str) -> Option<Session> {
        let mut session = self.by_name.remove(name)?;
        if self.name_by_sid.get(&session.sid).map(String::as_str) == Some(name) {
            self.name_by_sid.remove(&session.sid);
        }
        session.cancel_timer();
        Some(session)
    }
}

struct Inner {
    sessions: Mutex<Sessions>,
    backend: Arc<dyn TelephonyBackend>,
    settings: RegistrySettings,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|poisoned| {
            tracing::error!("conference registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Shared handle to the conference registry. Cloning is cheap; all clones
/// see the same sessions.
#[derive(Clone)]
pub struct ConferenceRegistry {
    inner: Arc<Inner>,
}

impl ConferenceRegistry {
    pub fn new(backend: Arc<dyn TelephonyBackend>, settings: RegistrySettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(Sessions::default()),
                backend,
                settings,
            }),
        }
    }

    /// Records a new conference and arms its auto-hangup timer.
    ///
    /// Must be called from within a Tokio runtime. A second start for the
    /// same name replaces the earlier session and cancels its timer.
    pub fn start(&self, sid: &str, name: &str) {
        let mut sessions = self.inner.lock();

        if let Some(replaced) = sessions.remove(name) {
            tracing::warn!(
                conference_name = %name,
                replaced_sid = %replaced.sid,
                conference_sid = %sid,
                "conference name reused, replacing earlier session"
            );
        }
        if let Some(stale_name) = sessions.name_by_sid.get(sid).cloned() {
            sessions.remove(&stale_name);
            tracing::warn!(
                conference_sid = %sid,
                stale_name = %stale_name,
                "conference sid re-registered under a new name"
            );
        }

        sessions.next_generation += 1;
        let generation = sessions.next_generation;
        let timer = self.arm_timer(name.to_string(), generation);

        sessions.name_by_sid.insert(sid.to_string(), name.to_string());
        sessions.by_name.insert(
            name.to_string(),
            Session {
                sid: sid.to_string(),
                name: name.to_string(),
                participants: HashMap::new(),
                started_at: Utc::now(),
                generation,
                timer: Some(timer),
            },
        );

        tracing::info!(
            conference_sid = %sid,
            conference_name = %name,
            auto_hangup_secs = self.inner.settings.auto_hangup.as_secs(),
            event = "conference-start",
            "conference started"
        );
    }

    /// Adds a call leg to the conference identified by `sid`.
    pub fn join(&self, sid: &str, call_leg_id: &str, label: Option<&str>) {
        let mut sessions = self.inner.lock();
        let Some(session) = sessions.get_by_sid(sid) else {
            tracing::debug!(
                conference_sid = %sid,
                call_sid = %call_leg_id,
                "join for unknown conference ignored"
            );
            return;
        };

        session
            .participants
            .insert(call_leg_id.to_string(), label.map(str::to_string));
        tracing::info!(
            conference_sid = %sid,
            conference_name = %session.name,
            call_sid = %call_leg_id,
            participant_label = label.unwrap_or(""),
            participant_count = session.participants.len(),
            event = "participant-join",
            "participant joined conference"
        );
    }

    /// Removes a call leg. The conference is cleaned up once nobody is left.
    pub fn leave(&self, sid: &str, call_leg_id: &str) {
        let mut sessions = self.inner.lock();
        let Some(session) = sessions.get_by_sid(sid) else {
            tracing::debug!(
                conference_sid = %sid,
                call_sid = %call_leg_id,
                "leave for unknown conference ignored"
            );
            return;
        };

        session.participants.remove(call_leg_id);
        let remaining = session.participants.len();
        let name = session.name.clone();
        tracing::info!(
            conference_sid = %sid,
            conference_name = %name,
            call_sid = %call_leg_id,
            participant_count = remaining,
            event = "participant-leave",
            "participant left conference"
        );

        if remaining == 0 {
            Self::cleanup(&mut sessions, &name, CleanupCause::LastParticipantLeft);
        }
    }

    /// Handles the backend's conference-end notification.
    pub fn end(&self, sid: &str) {
        let mut sessions = self.inner.lock();
        let Some(name) = sessions.name_by_sid.get(sid).cloned() else {
            tracing::debug!(conference_sid = %sid, "end for unknown conference ignored");
            return;
        };
        tracing::info!(
            conference_sid = %sid,
            conference_name = %name,
            event = "conference-end",
            "conference ended"
        );
        Self::cleanup(&mut sessions, &name, CleanupCause::ConferenceEnded);
    }

    /// Dials `target_number` into the named conference.
    ///
    /// Returns the new call leg id.
    pub async fn add_participant(
        &self,
        conference_name: &str,
        target_number: &str,
        from_number: Option<&str>,
    ) -> Result<String, ConferenceError> {
        let sid = self.sid_for(conference_name)?;
        let call_sid = self
            .dial_into(conference_name, target_number, from_number)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    conference_name = %conference_name,
                    target_number = %target_number,
                    "failed to add participant: {}",
                    e
                );
            })?;

        tracing::info!(
            conference_sid = %sid,
            conference_name = %conference_name,
            target_number = %target_number,
            call_sid = %call_sid,
            intent = "add",
            "added participant to conference"
        );
        Ok(call_sid)
    }

    /// Dials `target_number` into the named conference as the forward
    /// destination, optionally hanging up the agent's labelled leg(s).
    ///
    /// Only legs that joined with the configured agent label are dropped.
    /// Returns the new call leg id.
    pub async fn forward_call(
        &self,
        conference_name: &str,
        target_number: &str,
        drop_agent_leg: bool,
        from_number: Option<&str>,
    ) -> Result<String, ConferenceError> {
        let sid = self.sid_for(conference_name)?;
        let call_sid = self
            .dial_into(conference_name, target_number, from_number)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    conference_name = %conference_name,
                    target_number = %target_number,
                    "failed to forward call: {}",
                    e
                );
            })?;

        tracing::info!(
            conference_sid = %sid,
            conference_name = %conference_name,
            target_number = %target_number,
            call_sid = %call_sid,
            drop_agent_leg,
            intent = "forward",
            "forwarded call"
        );

        if drop_agent_leg {
            self.drop_agent_legs(conference_name).await;
        }
        Ok(call_sid)
    }

    /// Terminates the named conference.
    ///
    /// Local state is cleaned up whether or not the backend accepted the
    /// request; a backend failure is still returned.
    pub async fn end_conference(&self, conference_name: &str) -> Result<(), ConferenceError> {
        let (sid, generation) = {
            let sessions = self.inner.lock();
            let session = sessions
                .by_name
                .get(conference_name)
                .ok_or_else(|| ConferenceError::NotFound(conference_name.to_string()))?;
            (session.sid.clone(), session.generation)
        };

        let result = self.inner.backend.complete_conference(&sid).await;
        match &result {
            Ok(()) => tracing::info!(
                conference_sid = %sid,
                conference_name = %conference_name,
                intent = "end",
                "conference ended via request"
            ),
            Err(e) => tracing::error!(
                conference_sid = %sid,
                conference_name = %conference_name,
                "failed to end conference: {}",
                e
            ),
        }

        self.cleanup_generation(conference_name, generation, CleanupCause::EndRequested);
        result
    }

    /// Cancels every armed timer and forgets all sessions.
    pub fn shutdown(&self) {
        let mut sessions = self.inner.lock();
        let names: Vec<String> = sessions.by_name.keys().cloned().collect();
        for name in names {
            Self::cleanup(&mut sessions, &name, CleanupCause::Shutdown);
        }
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<SessionSnapshot> {
        self.inner.lock().by_name.get(name).map(Session::snapshot)
    }

    pub fn lookup_by_sid(&self, sid: &str) -> Option<SessionSnapshot> {
        self.inner.lock().get_by_sid(sid).map(|s| s.snapshot())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all active conferences, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    fn sid_for(&self, conference_name: &str) -> Result<String, ConferenceError> {
        self.inner
            .lock()
            .by_name
            .get(conference_name)
            .map(|s| s.sid.clone())
            .ok_or_else(|| ConferenceError::NotFound(conference_name.to_string()))
    }

    async fn dial_into(
        &self,
        conference_name: &str,
        target_number: &str,
        from_number: Option<&str>,
    ) -> Result<String, ConferenceError> {
        let settings = &self.inner.settings;
        let from = from_number
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(settings.default_from.as_str());
        let markup =
            twiml::conference_join(conference_name, settings.status_callback_url.as_deref(), None)?;
        self.inner
            .backend
            .place_call(from, target_number, &markup)
            .await
    }

    async fn drop_agent_legs(&self, conference_name: &str) {
        let agent_label = &self.inner.settings.agent_label;
        let legs: Vec<String> = {
            let sessions = self.inner.lock();
            sessions
                .by_name
                .get(conference_name)
                .map(|s| {
                    s.participants
                        .iter()
                        .filter(|(_, label)| label.as_deref() == Some(agent_label.as_str()))
                        .map(|(leg, _)| leg.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        if legs.is_empty() {
            tracing::warn!(
                conference_name = %conference_name,
                agent_label = %agent_label,
                "agent leg drop requested but no participant carries the agent label"
            );
            return;
        }

        for leg in legs {
            match self.inner.backend.hangup_call(&leg).await {
                Ok(()) => tracing::info!(
                    conference_name = %conference_name,
                    call_sid = %leg,
                    "dropped agent leg"
                ),
                Err(e) => tracing::error!(
                    conference_name = %conference_name,
                    call_sid = %leg,
                    "failed to drop agent leg: {}",
                    e
                ),
            }
        }
    }

    fn arm_timer(&self, name: String, generation: u64) -> AbortHandle {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.settings.auto_hangup;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                ConferenceRegistry { inner }.expire(&name, generation).await;
            }
        })
        .abort_handle()
    }

    /// Timer body: terminate remotely, then clean up if the session is still
    /// the one this timer was armed for.
    async fn expire(&self, name: &str, generation: u64) {
        let sid = {
            let mut sessions = self.inner.lock();
            match sessions.by_name.get_mut(name) {
                Some(session) if session.generation == generation => {
                    // Detach so a concurrent cleanup cannot abort this task
                    // while the backend request is in flight.
                    session.timer = None;
                    session.sid.clone()
                }
                _ => return,
            }
        };

        tracing::info!(
            conference_sid = %sid,
            conference_name = %name,
            "auto-hangup timer fired"
        );
        if let Err(e) = self.inner.backend.complete_conference(&sid).await {
            tracing::error!(
                conference_sid = %sid,
                conference_name = %name,
                "auto-hangup failed to end conference: {}",
                e
            );
        }

        self.cleanup_generation(name, generation, CleanupCause::Expired);
    }

    fn cleanup_generation(&self, name: &str, generation: u64, cause: CleanupCause) {
        let mut sessions = self.inner.lock();
        if sessions.by_name.get(name).map(|s| s.generation) == Some(generation) {
            Self::cleanup(&mut sessions, name, cause);
        }
    }

    fn cleanup(sessions: &mut Sessions, name: &str, cause: CleanupCause) {
        if let Some(session) = sessions.remove(name) {
            tracing::info!(
                conference_sid = %session.sid,
                conference_name = %name,
                cause = cause.as_str(),
                "conference cleaned up"
            );
        }
    }
}
