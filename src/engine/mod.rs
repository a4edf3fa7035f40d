//! The publish engine.
//!
//! [`PublishEngine`] owns every piece of state that decides whether a PUBLISH
//! is sent: the three request slots, the publish state machine, the retry
//! timer, the readiness flags and the capability inputs. It is a plain
//! synchronous struct; callers serialize access to it (the
//! [`PublisherActor`](crate::actor::PublisherActor) does so through its
//! mailbox) and pass the current time into every entry point.
//!
//! Timers are not run here. Scheduling and cancelling produce
//! [`TimerCommand`]s that the caller drains with
//! [`PublishEngine::take_timer_commands`].

mod coalesce;
mod response;
mod router;

pub use router::Trigger;

use std::sync::Arc;

use log::info;
use tokio::time::Instant;

use crate::{
    capability::{self, AvailabilityFlags, CapabilityInputs, PublishContent, RadioState},
    config::PublisherConfig,
    error::ConfigError,
    request::{PublishRequest, PublishSlots, RequestId},
    retry::{ResponseClassifier, RetryHandle, RetryTimer},
    scheduler::TimerCommand,
    settings::{SettingsProvider, SettingsReader, TtyMode},
    state_machine::{PublishState, PublishStateMachine, StateChangeHandler},
    transport::PresenceTransport,
};

/// Inputs to capability evaluation that the engine tracks itself.
#[derive(Debug, Clone, Copy, Default)]
struct CapabilitySource {
    radio: RadioState,
    availability: AvailabilityFlags,
    vt_enabled: bool,
    data_enabled: bool,
    tty_mode: TtyMode,
}

/// Flags that gate whether a trigger may create a request at all.
#[derive(Debug, Clone, Copy, Default)]
struct Readiness {
    /// The IMS stack has sent at least one publish trigger.
    got_trigger_from_stack: bool,
    /// A trigger arrived while publishing was not possible; replay it on the
    /// next readiness event.
    has_cached_trigger: bool,
    sim_loaded: bool,
    ims_registered: bool,
}

/// Point-in-time view of the engine, for callers and tests.
#[derive(Debug, Clone)]
pub struct PublisherSnapshot {
    pub state: PublishState,
    pub blocked: bool,
    pub has_cached_trigger: bool,
    pub ims_registered: bool,
    pub pending: Option<PublishRequest>,
    pub in_flight: Option<PublishRequest>,
    pub last_published: Option<PublishRequest>,
    pub retry: Option<RetryHandle>,
    pub availability: AvailabilityFlags,
}

pub struct PublishEngine {
    config: PublisherConfig,
    classifier: ResponseClassifier,
    settings: SettingsReader,
    transport: Arc<dyn PresenceTransport>,
    handler: Arc<dyn StateChangeHandler>,
    source: CapabilitySource,
    readiness: Readiness,
    slots: PublishSlots,
    state: PublishStateMachine,
    retry: RetryTimer,
    next_request_id: RequestId,
    timer_commands: Vec<TimerCommand>,
}

impl PublishEngine {
    pub fn new(
        config: PublisherConfig,
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn PresenceTransport>,
        handler: Arc<dyn StateChangeHandler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = ResponseClassifier::from_config(&config)?;
        let settings = SettingsReader::new(settings);
        let source = CapabilitySource {
            vt_enabled: settings.is_vt_enabled_by_user(),
            data_enabled: settings.is_mobile_data_enabled(),
            tty_mode: settings.tty_mode(),
            ..CapabilitySource::default()
        };
        info!(
            "[PublishEngine::new] vt_enabled={} data_enabled={} tty_mode={:?}",
            source.vt_enabled, source.data_enabled, source.tty_mode
        );

        Ok(Self {
            config,
            classifier,
            settings,
            transport,
            handler,
            source,
            readiness: Readiness::default(),
            slots: PublishSlots::default(),
            state: PublishStateMachine::new(),
            retry: RetryTimer::default(),
            next_request_id: 0,
            timer_commands: Vec::new(),
        })
    }

    pub fn current_state(&self) -> PublishState {
        self.state.current_state()
    }

    pub fn is_blocked(&self) -> bool {
        self.state.is_blocked()
    }

    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            state: self.state.current_state(),
            blocked: self.state.is_blocked(),
            has_cached_trigger: self.readiness.has_cached_trigger,
            ims_registered: self.readiness.ims_registered,
            pending: self.slots.pending.clone(),
            in_flight: self.slots.in_flight.clone(),
            last_published: self.slots.last_published.clone(),
            retry: self.retry.pending(),
            availability: self.source.availability,
        }
    }

    /// Timer work produced since the last call.
    pub fn take_timer_commands(&mut self) -> Vec<TimerCommand> {
        std::mem::take(&mut self.timer_commands)
    }

    /// Evaluate the capabilities against the current inputs.
    pub fn evaluate(&self) -> PublishContent {
        let inputs = CapabilityInputs {
            network: self
                .source
                .radio
                .network_class(self.settings.has_data_network()),
            availability: self.source.availability,
            platform: self.settings.platform(),
            provisioning: self.settings.provisioning(),
            vt_enabled_by_user: self.source.vt_enabled,
            tty_enabled: self.source.tty_mode.is_enabled(),
            mobile_data_enabled: self.source.data_enabled,
        };
        capability::evaluate(&inputs)
    }

    /// A request for the current capabilities, with the next request id.
    fn new_request(&mut self, force: bool, now: Instant) -> PublishRequest {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        PublishRequest::new(self.next_request_id, force, now, self.evaluate())
    }

    /// Move to `state`, notifying the handler on change.
    fn set_state(&mut self, state: PublishState) {
        if self.state.transition(state) {
            self.handler.on_state_changed(state);
        }
    }

    /// Drop every request and availability flag and go back to
    /// `NotPublished`. The sticky block survives.
    fn reset(&mut self) {
        info!("[reset] Clearing publish slots and availability");
        self.source.availability = AvailabilityFlags::default();
        self.slots.clear();
        if self.state.reset() {
            self.handler.on_state_changed(PublishState::NotPublished);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use tokio::time::Duration;

    use super::*;
    use crate::{
        capability::{ImsTransport, NetworkTechnology},
        error::{SettingsError, SubmitError},
        request::LocalTrigger,
        scheduler::Timer,
        settings::{
            PlatformSettings, ProvisionedCapability, ProvisioningKey, StaticSettings,
        },
        transport::{Accepted, Submission},
    };

    #[derive(Default)]
    struct RecordingTransport {
        submissions: Mutex<Vec<Submission>>,
        failure: Mutex<Option<SubmitError>>,
    }

    impl RecordingTransport {
        fn count(&self) -> usize {
            self.submissions.lock().unwrap().len()
        }

        fn last(&self) -> Option<Submission> {
            self.submissions.lock().unwrap().last().copied()
        }

        fn fail_with(&self, error: Option<SubmitError>) {
            *self.failure.lock().unwrap() = error;
        }
    }

    impl PresenceTransport for RecordingTransport {
        fn submit(&self, submission: &Submission) -> Result<Accepted, SubmitError> {
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
            self.submissions.lock().unwrap().push(*submission);
            Ok(Accepted)
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        states: Mutex<Vec<PublishState>>,
        refreshes: AtomicUsize,
    }

    impl StateChangeHandler for RecordingHandler {
        fn on_state_changed(&self, state: PublishState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_availability_refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Settings that tests can change while the engine runs.
    #[derive(Default)]
    struct SharedSettings {
        inner: Mutex<StaticSettings>,
        unavailable: AtomicBool,
    }

    impl SharedSettings {
        fn update(&self, f: impl FnOnce(&mut StaticSettings)) {
            f(&mut *self.inner.lock().unwrap());
        }

        fn get(&self) -> Result<StaticSettings, SettingsError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(SettingsError::Unavailable("test".to_string()));
            }
            Ok(self.inner.lock().unwrap().clone())
        }
    }

    impl SettingsProvider for SharedSettings {
        fn provisioning_int(&self, key: ProvisioningKey) -> Result<i32, SettingsError> {
            self.get()?.provisioning_int(key)
        }

        fn is_provisioned(&self, capability: ProvisionedCapability) -> Result<bool, SettingsError> {
            self.get()?.is_provisioned(capability)
        }

        fn platform(&self) -> Result<PlatformSettings, SettingsError> {
            self.get()?.platform()
        }

        fn is_mobile_data_enabled(&self) -> Result<bool, SettingsError> {
            self.get()?.is_mobile_data_enabled()
        }

        fn is_airplane_mode_on(&self) -> Result<bool, SettingsError> {
            self.get()?.is_airplane_mode_on()
        }

        fn tty_mode(&self) -> Result<TtyMode, SettingsError> {
            self.get()?.tty_mode()
        }

        fn is_vt_enabled_by_user(&self) -> Result<bool, SettingsError> {
            self.get()?.is_vt_enabled_by_user()
        }
    }

    struct Harness {
        engine: PublishEngine,
        settings: Arc<SharedSettings>,
        transport: Arc<RecordingTransport>,
        handler: Arc<RecordingHandler>,
    }

    impl Harness {
        fn new(config: PublisherConfig) -> Self {
            let settings = Arc::new(SharedSettings::default());
            let transport = Arc::new(RecordingTransport::default());
            let handler = Arc::new(RecordingHandler::default());
            let engine = PublishEngine::new(
                config,
                settings.clone(),
                transport.clone(),
                handler.clone(),
            )
            .expect("Failed to create engine");
            Self {
                engine,
                settings,
                transport,
                handler,
            }
        }

        /// SIM loaded, a stack trigger seen and IMS registered on LTE, with
        /// nothing pending.
        fn idle_on_lte(now: Instant) -> Self {
            Self::idle_on_lte_with(PublisherConfig::default(), now)
        }

        fn idle_on_lte_with(config: PublisherConfig, now: Instant) -> Self {
            let mut harness = Self::new(config);
            harness.engine.on_sim_ready(now);
            harness
                .engine
                .on_network_technology_changed(NetworkTechnology::LteVopsEnabled, now);
            harness.engine.on_disconnected();
            harness.engine.on_registered();
            harness.engine.take_timer_commands();
            harness
        }

        /// Fire every debounce timer scheduled so far at `now`.
        fn fire_debounce(&mut self, now: Instant) {
            for command in self.engine.take_timer_commands() {
                if let TimerCommand::Schedule {
                    timer: timer @ Timer::Debounce(_),
                    ..
                } = command
                {
                    self.engine.on_timer(timer, now);
                }
            }
        }

        /// Idle on LTE, then one published request answered with 200 at `t0 + 2s`.
        fn published(t0: Instant) -> Self {
            let mut harness = Self::idle_on_lte(t0);
            harness.engine.submit_local_trigger(LocalTrigger::CachedTrigger, t0);
            harness.fire_debounce(t0 + Duration::from_secs(2));
            harness
                .engine
                .on_response(200, "OK", t0 + Duration::from_millis(2100));
            harness
        }
    }

    #[test]
    fn test_stack_trigger_before_sim_is_cached() {
        let now = Instant::now();
        let mut harness = Harness::new(PublisherConfig::default());

        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::LteVopsEnabled, now);
        let snapshot = harness.engine.snapshot();
        assert!(snapshot.has_cached_trigger);
        assert!(snapshot.pending.is_none());
        assert!(snapshot.ims_registered);

        harness.engine.on_sim_ready(now);
        let snapshot = harness.engine.snapshot();
        assert!(!snapshot.has_cached_trigger);
        let pending = snapshot.pending.expect("cached trigger should be replayed");
        assert!(pending.force);

        harness.fire_debounce(now + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 1);
        assert_eq!(
            harness.transport.last().map(|s| s.content.voice_capable),
            Some(true)
        );
    }

    #[test]
    fn test_local_trigger_without_stack_trigger_is_discarded() {
        let now = Instant::now();
        let mut harness = Harness::new(PublisherConfig::default());
        harness.engine.on_sim_ready(now);

        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, now);
        let snapshot = harness.engine.snapshot();
        assert!(snapshot.pending.is_none());
        assert!(!snapshot.has_cached_trigger);
        assert!(harness.engine.take_timer_commands().is_empty());
    }

    #[test]
    fn test_local_trigger_cached_without_presence_provisioning() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);
        harness.settings.update(|s| s.eab_provisioned = false);

        harness.engine.on_mobile_data_changed(false, now);
        assert!(harness.engine.snapshot().has_cached_trigger);
        assert!(harness.engine.snapshot().pending.is_none());

        // provisioning confirmed, cached trigger replayed
        harness.settings.update(|s| s.eab_provisioned = true);
        harness.engine.on_provisioning_changed(now);
        let snapshot = harness.engine.snapshot();
        assert!(!snapshot.has_cached_trigger);
        assert!(snapshot.pending.is_some_and(|p| p.force));
    }

    #[test]
    fn test_burst_merges_and_ors_force() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);

        harness
            .engine
            .submit_local_trigger(LocalTrigger::DataChanged, t0);
        let first = harness.engine.snapshot().pending.expect("pending request");
        assert!(!first.force);

        let t1 = t0 + Duration::from_millis(800);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        let merged = harness.engine.snapshot().pending.expect("pending request");
        assert_eq!(merged.id, first.id);
        assert!(merged.force);
        assert_eq!(merged.created_at, t1);

        // a single promotion was scheduled
        let commands = harness.engine.take_timer_commands();
        assert_eq!(
            commands,
            vec![TimerCommand::Schedule {
                timer: Timer::Debounce(first.id),
                delay: Duration::from_secs(2),
            }]
        );
    }

    #[test]
    fn test_old_pending_is_replaced() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);

        harness
            .engine
            .submit_local_trigger(LocalTrigger::DataChanged, t0);
        let first = harness.engine.snapshot().pending.expect("pending request");
        harness.engine.take_timer_commands();

        harness
            .engine
            .submit_local_trigger(LocalTrigger::DataChanged, t0 + Duration::from_secs(3));
        let second = harness.engine.snapshot().pending.expect("pending request");
        assert_ne!(second.id, first.id);

        let commands = harness.engine.take_timer_commands();
        assert_eq!(commands[0], TimerCommand::Cancel(Timer::Debounce(first.id)));

        // the superseded timer firing is ignored
        harness.engine.on_timer(Timer::Debounce(first.id), t0 + Duration::from_secs(3));
        assert_eq!(harness.transport.count(), 0);
        assert!(harness.engine.snapshot().pending.is_some());
    }

    #[test]
    fn test_response_200_round_trip() {
        let t0 = Instant::now();
        let harness = Harness::published(t0);

        let snapshot = harness.engine.snapshot();
        assert_eq!(snapshot.state, PublishState::Ok200);
        assert!(snapshot.in_flight.is_none());
        let last = snapshot.last_published.expect("last published request");
        assert_eq!(last.created_at, t0 + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 1);
        assert_eq!(
            *harness.handler.states.lock().unwrap(),
            vec![PublishState::Ok200]
        );
        assert_eq!(harness.handler.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_content_is_suppressed() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);

        let t1 = t0 + Duration::from_secs(90);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::DataChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 1);
        assert!(harness.engine.snapshot().retry.is_none());
    }

    #[test]
    fn test_changed_content_waits_for_throttle() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);

        // video drops without mobile data
        let t1 = t0 + Duration::from_secs(10);
        harness.engine.on_mobile_data_changed(false, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 1);

        // 60s throttle measured from the submission at t0 + 2s
        let retry = harness.engine.snapshot().retry.expect("retry scheduled");
        assert_eq!(retry.fire_at, t0 + Duration::from_secs(62));
        assert_eq!(
            harness.engine.take_timer_commands(),
            vec![TimerCommand::Schedule {
                timer: Timer::Retry(retry.id),
                delay: Duration::from_secs(50),
            }]
        );

        harness.engine.on_timer(Timer::Retry(retry.id), retry.fire_at);
        assert!(harness.engine.snapshot().pending.is_some_and(|p| p.force));
        harness.fire_debounce(retry.fire_at + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 2);
        let submission = harness.transport.last().expect("submission");
        assert!(submission.content.voice_capable);
        assert!(!submission.content.video_capable);
    }

    #[test]
    fn test_throttle_delay_is_capped() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);
        harness.settings.update(|s| s.publish_throttle_ms = 600_000);

        let t1 = t0 + Duration::from_secs(10);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::TtyStatusChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        let retry = harness.engine.snapshot().retry.expect("retry scheduled");
        assert_eq!(
            retry.fire_at,
            t1 + Duration::from_secs(2) + Duration::from_secs(120)
        );
    }

    #[test]
    fn test_implicit_unpublish_when_voice_disabled() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);
        harness.settings.update(|s| {
            s.platform.volte_enabled_by_user = false;
            s.platform.wfc_enabled_by_user = false;
        });

        let t1 = t0 + Duration::from_secs(90);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 1);
        let snapshot = harness.engine.snapshot();
        assert_eq!(snapshot.state, PublishState::NotPublished);
        assert!(snapshot.last_published.is_none());
        assert_eq!(
            *harness.handler.states.lock().unwrap(),
            vec![PublishState::Ok200, PublishState::NotPublished]
        );

        // from NotPublished the (voice-less) announcement goes out
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1 + Duration::from_secs(5));
        harness.fire_debounce(t1 + Duration::from_secs(7));
        assert_eq!(harness.transport.count(), 2);
        assert_eq!(
            harness.transport.last().map(|s| s.content.voice_capable),
            Some(false)
        );
    }

    #[test]
    fn test_no_publish_while_unregistered() {
        let now = Instant::now();
        let mut harness = Harness::new(PublisherConfig::default());
        harness.engine.on_sim_ready(now);

        // legacy radio does not imply registration
        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::Umts, now);
        assert!(harness.engine.snapshot().pending.is_some());
        harness.fire_debounce(now + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 0);

        harness.engine.on_registered();
        harness.engine.on_etag_expired(now + Duration::from_secs(3));
        harness.fire_debounce(now + Duration::from_secs(5));
        assert_eq!(harness.transport.count(), 1);
    }

    #[test]
    fn test_service_unavailable_caches_trigger() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);
        harness
            .transport
            .fail_with(Some(SubmitError::ServiceUnavailable));

        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, now);
        harness.fire_debounce(now + Duration::from_secs(2));
        let snapshot = harness.engine.snapshot();
        assert!(snapshot.has_cached_trigger);
        assert!(snapshot.in_flight.is_none());

        harness.transport.fail_with(None);
        harness.engine.on_stack_available(now + Duration::from_secs(3));
        harness.fire_debounce(now + Duration::from_secs(5));
        assert_eq!(harness.transport.count(), 1);
        assert!(!harness.engine.snapshot().has_cached_trigger);
    }

    #[test]
    fn test_rejected_submission_clears_cached_trigger() {
        let now = Instant::now();
        let mut harness = Harness::new(PublisherConfig::default());
        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::LteVopsEnabled, now);
        assert!(harness.engine.snapshot().has_cached_trigger);
        harness
            .transport
            .fail_with(Some(SubmitError::Rejected("bad request".to_string())));

        harness.engine.on_sim_ready(now);
        harness.fire_debounce(now + Duration::from_secs(2));
        assert!(!harness.engine.snapshot().has_cached_trigger);
        assert_eq!(harness.transport.count(), 0);
    }

    #[test]
    fn test_provision_error_blocks_until_restart() {
        let config = PublisherConfig {
            volte_provision_errors: vec!["403 not authorized".to_string()],
            ..PublisherConfig::default()
        };
        let now = Instant::now();
        let mut harness = Harness::new(config);
        harness.engine.on_sim_ready(now);
        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::LteVopsEnabled, now);
        harness.fire_debounce(now + Duration::from_secs(2));
        harness
            .engine
            .on_response(403, "Not Authorized", now + Duration::from_secs(3));

        assert!(harness.engine.is_blocked());
        assert_eq!(
            harness.engine.current_state(),
            PublishState::VolteProvisionError
        );

        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::LteVopsEnabled, now);
        harness.engine.on_etag_expired(now);
        assert!(harness.engine.snapshot().pending.is_none());
        assert!(!harness.engine.snapshot().has_cached_trigger);

        harness.engine.on_restart();
        assert!(!harness.engine.is_blocked());
        harness.engine.on_etag_expired(now + Duration::from_secs(4));
        assert!(harness.engine.snapshot().pending.is_some());
    }

    #[test]
    fn test_responses_update_state() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);

        harness.engine.on_response(408, "Request Timeout", now);
        assert_eq!(harness.engine.current_state(), PublishState::RequestTimeout);
        harness.engine.on_response(503, "Service Unavailable", now);
        assert_eq!(harness.engine.current_state(), PublishState::OtherError);
        harness.engine.on_response(999, "", now);
        assert_eq!(harness.engine.current_state(), PublishState::OtherError);
        harness.engine.on_response(42, "", now);
        assert_eq!(harness.engine.current_state(), PublishState::OtherError);
        assert!(harness.engine.snapshot().retry.is_none());
    }

    #[test]
    fn test_stray_response_clears_last_published() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);
        assert!(harness.engine.snapshot().last_published.is_some());

        harness
            .engine
            .on_response(200, "OK", t0 + Duration::from_secs(5));
        assert!(harness.engine.snapshot().last_published.is_none());
        // unchanged state, no second notification
        assert_eq!(harness.handler.states.lock().unwrap().len(), 1);

        // no baseline left, so a change goes out straight away
        let t1 = t0 + Duration::from_secs(10);
        harness.engine.on_mobile_data_changed(false, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 2);
    }

    #[test]
    fn test_throttle_applies_after_error_response() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::CachedTrigger, t0);
        harness.fire_debounce(t0 + Duration::from_secs(2));
        harness
            .engine
            .on_response(408, "Request Timeout", t0 + Duration::from_secs(3));
        assert_eq!(harness.engine.current_state(), PublishState::RequestTimeout);

        let t1 = t0 + Duration::from_secs(5);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 1);
        let retry = harness.engine.snapshot().retry.expect("retry scheduled");
        assert_eq!(retry.fire_at, t0 + Duration::from_secs(62));
    }

    #[test]
    fn test_unanswered_request_is_not_overwritten() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::CachedTrigger, t0);
        harness.fire_debounce(t0 + Duration::from_secs(2));
        let first = harness.engine.snapshot().in_flight.expect("in flight");

        // past the throttle, still no response
        let t1 = t0 + Duration::from_secs(70);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 1);
        let snapshot = harness.engine.snapshot();
        assert_eq!(snapshot.in_flight.map(|r| r.id), Some(first.id));
        // deferred until the 180s in-flight timeout
        let retry = snapshot.retry.expect("retry scheduled");
        assert_eq!(retry.fire_at, t0 + Duration::from_secs(182));

        // the late answer completes the first request
        harness
            .engine
            .on_response(200, "OK", t0 + Duration::from_secs(100));
        let snapshot = harness.engine.snapshot();
        assert_eq!(snapshot.last_published.map(|r| r.id), Some(first.id));
        assert_eq!(snapshot.state, PublishState::Ok200);

        harness.engine.on_timer(Timer::Retry(retry.id), retry.fire_at);
        harness.fire_debounce(retry.fire_at + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 2);
        assert_ne!(harness.transport.last().map(|s| s.request_id), Some(first.id));
    }

    #[test]
    fn test_unanswered_request_holds_without_throttle() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);
        harness.settings.update(|s| s.publish_throttle_ms = 0);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::CachedTrigger, t0);
        harness.fire_debounce(t0 + Duration::from_secs(2));

        let t1 = t0 + Duration::from_secs(3);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 1);
        let retry = harness.engine.snapshot().retry.expect("retry scheduled");
        // capped at the maximum throttle delay
        assert_eq!(retry.fire_at, t1 + Duration::from_secs(122));
    }

    #[test]
    fn test_lost_request_dropped_after_timeout() {
        let config = PublisherConfig {
            in_flight_timeout_ms: 90_000,
            ..PublisherConfig::default()
        };
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte_with(config, t0);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::CachedTrigger, t0);
        harness.fire_debounce(t0 + Duration::from_secs(2));
        let first = harness.engine.snapshot().in_flight.expect("in flight");

        let t1 = t0 + Duration::from_secs(100);
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, t1);
        harness.fire_debounce(t1 + Duration::from_secs(2));

        assert_eq!(harness.transport.count(), 2);
        let snapshot = harness.engine.snapshot();
        assert_ne!(snapshot.in_flight.map(|r| r.id), Some(first.id));
        assert!(snapshot.last_published.is_none());
        assert!(snapshot.retry.is_none());
    }

    #[test]
    fn test_request_ids_increase() {
        let t0 = Instant::now();
        let mut harness = Harness::idle_on_lte(t0);

        let mut ids = Vec::new();
        for step in 0..3 {
            let now = t0 + Duration::from_secs(3 * step);
            harness
                .engine
                .submit_local_trigger(LocalTrigger::DataChanged, now);
            let pending = harness.engine.snapshot().pending.expect("pending request");
            ids.push(pending.id);
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_feature_availability_on_iwlan() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);

        // cellular reports do not trigger a publish on their own
        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wwan, true, true, now);
        assert!(harness.engine.snapshot().pending.is_none());
        assert!(harness.engine.snapshot().availability.volte);

        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::Iwlan, now);
        harness.fire_debounce(now + Duration::from_secs(2));
        assert_eq!(harness.transport.count(), 1);

        let t1 = now + Duration::from_secs(3);
        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wlan, true, false, t1);
        let pending = harness.engine.snapshot().pending.expect("pending request");
        assert!(!pending.force);
        let availability = harness.engine.snapshot().availability;
        assert!(availability.vowifi);
        assert!(!availability.volte);

        // repeated report is not a change
        harness.engine.take_timer_commands();
        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wlan, true, false, t1);
        assert!(harness.engine.take_timer_commands().is_empty());
    }

    #[test]
    fn test_feature_availability_in_airplane_mode() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);
        harness
            .engine
            .on_network_technology_changed(NetworkTechnology::Iwlan, now);
        harness.engine.take_timer_commands();
        harness.engine.on_disconnected();
        harness.engine.on_registered();
        harness.settings.update(|s| s.airplane_mode_on = true);

        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wwan, true, false, now);
        assert!(harness.engine.snapshot().pending.is_none());

        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wlan, true, false, now);
        assert!(harness.engine.snapshot().pending.is_some());
    }

    #[test]
    fn test_feature_availability_before_stack_trigger_is_cached() {
        let now = Instant::now();
        let mut harness = Harness::new(PublisherConfig::default());
        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wlan, true, true, now);
        assert!(harness.engine.snapshot().has_cached_trigger);
    }

    #[test]
    fn test_toggle_triggers_only_on_flip() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);

        // defaults: data on, vt on, tty off
        harness.engine.on_mobile_data_changed(true, now);
        harness.engine.on_vt_setting_changed(true, now);
        harness.engine.on_tty_mode_changed(TtyMode::Off, now);
        assert!(harness.engine.snapshot().pending.is_none());

        harness.engine.on_tty_mode_changed(TtyMode::Full, now);
        assert!(harness.engine.snapshot().pending.is_some_and(|p| p.force));
        assert!(!harness.engine.evaluate().video_capable);

        harness.engine.take_timer_commands();
        // still enabled, no new request
        harness
            .engine
            .on_tty_mode_changed(TtyMode::Hco, now + Duration::from_secs(5));
        assert!(harness.engine.take_timer_commands().is_empty());
    }

    #[test]
    fn test_reset_keeps_block_and_clears_slots() {
        let t0 = Instant::now();
        let mut harness = Harness::published(t0);
        harness
            .engine
            .on_feature_availability_changed(ImsTransport::Wwan, true, true, t0);
        harness.engine.on_response(404, "", t0);
        harness.engine.state.transition(PublishState::RcsProvisionError);

        harness.engine.on_airplane_mode_changed(true);
        let snapshot = harness.engine.snapshot();
        assert_eq!(snapshot.state, PublishState::NotPublished);
        assert!(snapshot.blocked);
        assert!(snapshot.last_published.is_none());
        assert_eq!(snapshot.availability, AvailabilityFlags::default());

        // sim reload lifts the block
        harness.engine.on_sim_absent();
        assert!(harness.engine.is_blocked());
        harness.engine.on_sim_ready(t0);
        assert!(!harness.engine.is_blocked());
    }

    #[test]
    fn test_settings_unavailable_uses_defaults() {
        let now = Instant::now();
        let mut harness = Harness::idle_on_lte(now);
        harness.settings.unavailable.store(true, Ordering::SeqCst);

        // presence provisioning defaults to false, so the trigger is cached
        harness
            .engine
            .submit_local_trigger(LocalTrigger::VtCallChanged, now);
        assert!(harness.engine.snapshot().has_cached_trigger);
        assert_eq!(harness.engine.evaluate(), PublishContent::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PublisherConfig {
            rcs_provision_errors: vec!["not a code".to_string()],
            ..PublisherConfig::default()
        };
        let result = PublishEngine::new(
            config,
            Arc::new(StaticSettings::default()),
            Arc::new(RecordingTransport::default()),
            Arc::new(crate::state_machine::NoopStateChangeHandler),
        );
        assert!(matches!(result, Err(ConfigError::InvalidPattern(_))));
    }
}
