//! Debounce, suppression, throttling and submission.

use log::{debug, info, warn};
use tokio::time::{Duration, Instant};

use super::PublishEngine;
use crate::{
    error::SubmitError,
    request::{LocalTrigger, PublishRequest, RequestId},
    scheduler::{Timer, TimerCommand},
    state_machine::PublishState,
    transport::Submission,
};

impl PublishEngine {
    /// Request a publish for a local state change.
    pub fn submit_local_trigger(&mut self, kind: LocalTrigger, now: Instant) {
        if !self.readiness.got_trigger_from_stack {
            debug!("[submit_local_trigger] {kind} discarded, no stack trigger yet");
            return;
        }
        if self.state.is_blocked() {
            warn!("[submit_local_trigger] {kind} dropped, blocked until restart");
            return;
        }
        if !self.is_ready() {
            debug!("[submit_local_trigger] {kind} cached, SIM or presence provisioning not ready");
            self.readiness.has_cached_trigger = true;
            return;
        }

        let request = self.new_request(kind.forces_network(), now);
        info!("[submit_local_trigger] {kind}: {request}");
        self.enqueue(request, now);
    }

    pub(super) fn is_ready(&self) -> bool {
        self.readiness.sim_loaded && self.settings.is_eab_provisioned()
    }

    /// Merge `request` into a young pending request, or make it the pending
    /// request and schedule its promotion.
    pub(super) fn enqueue(&mut self, request: PublishRequest, now: Instant) {
        let window = self.config.debounce_window();
        if let Some(pending) = self.slots.pending.as_mut() {
            if pending.age(now) <= window {
                pending.force |= request.force;
                pending.created_at = request.created_at;
                debug!("[enqueue] Merged into pending request {pending}");
                return;
            }
        }

        let id = request.id;
        if let Some(stale) = self.slots.pending.replace(request) {
            self.timer_commands
                .push(TimerCommand::Cancel(Timer::Debounce(stale.id)));
        }
        self.timer_commands.push(TimerCommand::Schedule {
            timer: Timer::Debounce(id),
            delay: window,
        });
    }

    pub(super) fn on_debounce_expired(&mut self, id: RequestId, now: Instant) {
        match self.slots.take_pending(id) {
            Some(request) => self.do_publish(request, now),
            None => warn!("[on_debounce_expired] Request {id} is no longer pending"),
        }
    }

    fn do_publish(&mut self, request: PublishRequest, now: Instant) {
        if !self.readiness.ims_registered {
            debug!("[do_publish] IMS not registered, skipping");
            return;
        }
        if self.state.is_blocked() {
            warn!("[do_publish] Blocked until restart, dropping {request}");
            return;
        }

        // capabilities may have moved during the debounce window
        let request = PublishRequest {
            content: self.evaluate(),
            ..request
        };
        let state = self.state.current_state();

        if !request.force && state != PublishState::NotPublished {
            let reference = self
                .slots
                .in_flight
                .as_ref()
                .or(self.slots.last_published.as_ref());
            if request.has_same_content(reference) {
                debug!("[do_publish] Same content already published, suppressing {request}");
                return;
            }
        }

        if !self.await_in_flight(now) {
            return;
        }

        let remaining = self.throttle_remaining(now);
        if !remaining.is_zero() {
            if self.retry.is_pending() {
                debug!("[do_publish] Throttled, retry already scheduled for {request}");
                return;
            }
            info!("[do_publish] Throttled, retrying in {remaining:?}");
            self.schedule_retry(remaining, now);
            return;
        }

        if self.settings.platform().voice_gate_closed() && state != PublishState::NotPublished {
            info!("[do_publish] Voice disabled by user or platform, unpublishing");
            self.reset();
            return;
        }

        self.submit(request, now);
    }

    /// Returns `true` when nothing is waiting for a response. An unanswered
    /// request defers the caller through the retry timer until it is answered
    /// or older than the in-flight timeout, after which it is dropped.
    fn await_in_flight(&mut self, now: Instant) -> bool {
        let Some((id, age)) = self
            .slots
            .in_flight
            .as_ref()
            .map(|request| (request.id, request.age(now)))
        else {
            return true;
        };

        let outstanding = self.config.in_flight_timeout().saturating_sub(age);
        if outstanding.is_zero() {
            warn!("[await_in_flight] No response to request {id} after {age:?}, dropping it");
            self.slots.in_flight = None;
            return true;
        }

        if self.retry.is_pending() {
            debug!("[await_in_flight] Request {id} in flight, retry already scheduled");
            return false;
        }
        let delay = match self.throttle_remaining(now) {
            remaining if !remaining.is_zero() => remaining,
            _ => outstanding.min(self.config.max_throttle_delay()),
        };
        info!("[await_in_flight] Request {id} in flight, retrying in {delay:?}");
        self.schedule_retry(delay, now);
        false
    }

    /// Time left before the throttle allows another request, capped at the
    /// configured maximum.
    fn throttle_remaining(&self, now: Instant) -> Duration {
        let Some(baseline) = self.slots.throttle_baseline() else {
            return Duration::ZERO;
        };
        let elapsed = now.saturating_duration_since(baseline);
        self.settings
            .publish_throttle()
            .saturating_sub(elapsed)
            .min(self.config.max_throttle_delay())
    }

    fn submit(&mut self, request: PublishRequest, now: Instant) {
        if let Some(handle) = self.retry.cancel() {
            self.timer_commands
                .push(TimerCommand::Cancel(Timer::Retry(handle.id)));
        }

        let request = PublishRequest {
            created_at: now,
            ..request
        };
        let submission = Submission {
            request_id: request.id,
            content: request.content,
        };
        info!("[submit] Publishing {request}");
        self.slots.in_flight = Some(request);

        match self.transport.submit(&submission) {
            Ok(_) => self.readiness.has_cached_trigger = false,
            Err(SubmitError::ServiceUnavailable) => {
                warn!("[submit] Transport unavailable, caching trigger");
                self.slots.in_flight = None;
                self.readiness.has_cached_trigger = true;
            }
            Err(e) => {
                warn!("[submit] {e}");
                self.slots.in_flight = None;
                self.readiness.has_cached_trigger = false;
            }
        }
    }
}
