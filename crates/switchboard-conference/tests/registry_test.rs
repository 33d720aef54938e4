//! Registry lifecycle tests against a recording telephony backend, with the
//! Tokio clock paused so auto-hangup timers can be driven deterministically.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchboard_conference::{
    ConferenceError, ConferenceRegistry, RegistrySettings, TelephonyBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Place { from: String, to: String, twiml: String },
    Complete(String),
    Hangup(String),
}

#[derive(Default)]
struct RecordingBackend {
    ops: Mutex<Vec<Op>>,
    placed: AtomicUsize,
    fail_complete: AtomicBool,
    fail_place: AtomicBool,
}

impl RecordingBackend {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn completions(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Complete(sid) => Some(sid),
                _ => None,
            })
            .collect()
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
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(ConferenceError::Telephony("HTTP 404: not found".to_string()));
        }
        Ok(())
    }

    async fn hangup_call(&self, call_sid: &str) -> Result<(), ConferenceError> {
        self.ops.lock().unwrap().push(Op::Hangup(call_sid.to_string()));
        Ok(())
    }
}

fn setup() -> (ConferenceRegistry, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::default());
    let settings = RegistrySettings {
        default_from: "+15550001111".to_string(),
        status_callback_url: Some("https://agent.example/conference/events".to_string()),
        ..RegistrySettings::default()
    };
    (ConferenceRegistry::new(backend.clone(), settings), backend)
}

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn auto_hangup_fires_after_twenty_minutes() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.join("CF1", "CA1", None);

    tokio::time::sleep(19 * MINUTE + Duration::from_secs(59)).await;
    assert!(registry.lookup_by_name("confA").is_some());
    assert!(backend.ops().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.completions(), vec!["CF1".to_string()]);
    assert!(registry.lookup_by_name("confA").is_none());
    assert!(registry.lookup_by_sid("CF1").is_none());
}

#[tokio::test(start_paused = true)]
async fn auto_hangup_cleans_up_even_when_backend_fails() {
    let (registry, backend) = setup();
    backend.fail_complete.store(true, Ordering::SeqCst);
    registry.start("CF1", "confA");

    tokio::time::sleep(21 * MINUTE).await;
    assert_eq!(backend.completions(), vec!["CF1".to_string()]);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn last_leave_cancels_timer() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.join("CF1", "CA1", None);
    registry.leave("CF1", "CA1");
    assert!(registry.is_empty());

    tokio::time::sleep(30 * MINUTE).await;
    assert!(backend.ops().is_empty(), "no callback may fire after cleanup");
}

#[tokio::test(start_paused = true)]
async fn conference_end_removes_and_cancels() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.join("CF1", "CA1", None);
    registry.join("CF1", "CA2", None);

    registry.end("CF1");
    assert!(registry.lookup_by_name("confA").is_none());
    assert!(registry.lookup_by_sid("CF1").is_none());

    // A late leave for the ended conference is a no-op.
    registry.leave("CF1", "CA1");

    tokio::time::sleep(30 * MINUTE).await;
    assert!(backend.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn end_conference_cleans_up_despite_backend_failure() {
    let (registry, backend) = setup();
    backend.fail_complete.store(true, Ordering::SeqCst);
    registry.start("CF1", "confA");

    let err = registry.end_conference("confA").await.unwrap_err();
    assert!(matches!(err, ConferenceError::Telephony(_)));
    assert!(registry.lookup_by_name("confA").is_none());

    tokio::time::sleep(30 * MINUTE).await;
    assert_eq!(backend.completions(), vec!["CF1".to_string()], "timer must not fire again");
}

#[tokio::test]
async fn operations_on_unknown_conference_fail() {
    let (registry, backend) = setup();

    assert_eq!(
        registry.end_conference("ghost").await,
        Err(ConferenceError::NotFound("ghost".to_string()))
    );
    assert!(matches!(
        registry.add_participant("ghost", "+12015550123", None).await,
        Err(ConferenceError::NotFound(_))
    ));
    assert!(matches!(
        registry.forward_call("ghost", "+12015550123", false, None).await,
        Err(ConferenceError::NotFound(_))
    ));
    assert!(backend.ops().is_empty());
}

#[tokio::test]
async fn add_participant_dials_into_named_conference() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");

    let call_sid = registry
        .add_participant("confA", "+12015550123", None)
        .await
        .unwrap();
    assert_eq!(call_sid, "CAout1");

    let ops = backend.ops();
    let [Op::Place { from, to, twiml }] = ops.as_slice() else {
        panic!("expected a single placed call, got {:?}", ops);
    };
    assert_eq!(from, "+15550001111");
    assert_eq!(to, "+12015550123");
    assert!(twiml.contains(">confA</Conference>"));
    assert!(twiml.contains(r#"statusCallback="https://agent.example/conference/events""#));

    registry
        .add_participant("confA", "+12015550188", Some("+12015550177"))
        .await
        .unwrap();
    assert!(matches!(
        backend.ops().last(),
        Some(Op::Place { from, .. }) if from == "+12015550177"
    ));
}

#[tokio::test]
async fn add_participant_surfaces_backend_failure() {
    let (registry, backend) = setup();
    backend.fail_place.store(true, Ordering::SeqCst);
    registry.start("CF1", "confA");

    let err = registry
        .add_participant("confA", "+12015550123", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ConferenceError::Telephony("HTTP 400: invalid To number".to_string())
    );
    assert!(registry.lookup_by_name("confA").is_some());
}

#[tokio::test]
async fn forward_drops_only_labelled_agent_leg() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.join("CF1", "CAcaller", Some("caller"));
    registry.join("CF1", "CAagent", Some("agent"));

    registry
        .forward_call("confA", "+12015550123", true, None)
        .await
        .unwrap();

    let hangups: Vec<Op> = backend
        .ops()
        .into_iter()
        .filter(|op| matches!(op, Op::Hangup(_)))
        .collect();
    assert_eq!(hangups, vec![Op::Hangup("CAagent".to_string())]);
}

#[tokio::test]
async fn forward_without_agent_label_drops_nothing() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.join("CF1", "CAcaller", Some("caller"));
    registry.join("CF1", "CAother", None);

    registry
        .forward_call("confA", "+12015550123", true, None)
        .await
        .unwrap();
    registry
        .forward_call("confA", "+12015550188", false, None)
        .await
        .unwrap();

    assert!(!backend.ops().iter().any(|op| matches!(op, Op::Hangup(_))));
    assert_eq!(registry.lookup_by_name("confA").unwrap().participant_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn replaced_session_timer_is_cancelled() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");

    tokio::time::sleep(10 * MINUTE).await;
    registry.start("CF2", "confA");

    // The first timer would have fired at minute 20.
    tokio::time::sleep(11 * MINUTE).await;
    assert!(backend.ops().is_empty());
    assert_eq!(registry.lookup_by_name("confA").unwrap().sid, "CF2");

    // The replacement fires at minute 30.
    tokio::time::sleep(10 * MINUTE).await;
    assert_eq!(backend.completions(), vec!["CF2".to_string()]);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_all_timers() {
    let (registry, backend) = setup();
    registry.start("CF1", "confA");
    registry.start("CF2", "confB");

    registry.shutdown();
    tokio::time::sleep(30 * MINUTE).await;
    assert!(backend.ops().is_empty());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn three_way_call_lifecycle() {
    let (registry, backend) = setup();

    registry.start("CF1", "confA");
    registry.join("CF1", "CA-A", Some("caller"));
    registry.join("CF1", "CA-B", None);

    let added = registry
        .add_participant("confA", "+12015550123", None)
        .await
        .unwrap();
    registry.join("CF1", &added, None);
    assert_eq!(registry.lookup_by_name("confA").unwrap().participant_count(), 3);

    registry.leave("CF1", &added);
    registry.leave("CF1", "CA-A");
    assert!(registry.lookup_by_name("confA").is_some());
    registry.leave("CF1", "CA-B");
    assert!(registry.lookup_by_name("confA").is_none());
    assert!(registry.lookup_by_sid("CF1").is_none());

    tokio::time::sleep(25 * MINUTE).await;
    assert!(backend.completions().is_empty());
    assert_eq!(backend.ops().len(), 1);
}
