//! PUBLISH responses and the retry timer.

use log::{info, warn};
use tokio::time::{Duration, Instant};

use super::PublishEngine;
use crate::{
    request::LocalTrigger,
    retry::ResponseOutcome,
    scheduler::{Timer, TimerCommand},
    state_machine::PublishState,
};

impl PublishEngine {
    pub fn on_response(&mut self, code: i32, reason: &str, now: Instant) {
        info!("[on_response] code={code} reason={reason:?}");
        self.slots.complete();

        match self.classifier.classify(code, reason) {
            ResponseOutcome::VolteProvisionError => {
                self.set_state(PublishState::VolteProvisionError)
            }
            ResponseOutcome::RcsProvisionError => self.set_state(PublishState::RcsProvisionError),
            ResponseOutcome::NoChange => {}
            ResponseOutcome::Ok => {
                self.set_state(PublishState::Ok200);
                self.handler.on_availability_refresh();
            }
            ResponseOutcome::RequestTimeout => self.set_state(PublishState::RequestTimeout),
            ResponseOutcome::TemporaryError => {
                self.schedule_retry(self.config.temporary_error_retry(), now)
            }
            ResponseOutcome::Ignored => warn!("[on_response] Ignoring code {code}"),
            ResponseOutcome::Failed => self.set_state(PublishState::OtherError),
        }
    }

    /// No-op while a retry is already outstanding.
    pub(super) fn schedule_retry(&mut self, delay: Duration, now: Instant) {
        if let Some(handle) = self.retry.schedule(now, delay) {
            info!("[schedule_retry] Retry {} in {delay:?}", handle.id);
            self.timer_commands.push(TimerCommand::Schedule {
                timer: Timer::Retry(handle.id),
                delay,
            });
        }
    }

    pub(super) fn on_retry_expired(&mut self, id: u64, now: Instant) {
        if !self.retry.fire(id) {
            warn!("[on_retry_expired] Retry {id} was cancelled");
            return;
        }
        self.submit_local_trigger(LocalTrigger::Retry, now);
    }
}
