//! Entry points for external events.
//!
//! Stack triggers (technology changes, ETag expiry) request a forced publish.
//! Local state changes become [`LocalTrigger`]s. Lifecycle events reset state,
//! lift the sticky block or replay a cached trigger.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::PublishEngine;
use crate::{
    capability::{AvailabilityFlags, ImsTransport, NetworkTechnology},
    request::LocalTrigger,
    scheduler::Timer,
    settings::TtyMode,
};

/// Every event the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    NetworkTechnologyChanged {
        tech: NetworkTechnology,
    },
    EtagExpired,
    FeatureAvailabilityChanged {
        transport: ImsTransport,
        voice: bool,
        video: bool,
    },
    MobileDataChanged {
        enabled: bool,
    },
    VtSettingChanged {
        enabled: bool,
    },
    TtyModeChanged {
        mode: TtyMode,
    },
    Registered,
    Disconnected,
    SimReady,
    SimAbsent,
    AirplaneModeChanged {
        on: bool,
    },
    ProvisioningChanged,
    StackAvailable,
    Restart,
    Response {
        code: i32,
        #[serde(default)]
        reason: String,
    },
}

impl PublishEngine {
    pub fn handle(&mut self, trigger: Trigger, now: Instant) {
        match trigger {
            Trigger::NetworkTechnologyChanged { tech } => {
                self.on_network_technology_changed(tech, now)
            }
            Trigger::EtagExpired => self.on_etag_expired(now),
            Trigger::FeatureAvailabilityChanged {
                transport,
                voice,
                video,
            } => self.on_feature_availability_changed(transport, voice, video, now),
            Trigger::MobileDataChanged { enabled } => self.on_mobile_data_changed(enabled, now),
            Trigger::VtSettingChanged { enabled } => self.on_vt_setting_changed(enabled, now),
            Trigger::TtyModeChanged { mode } => self.on_tty_mode_changed(mode, now),
            Trigger::Registered => self.on_registered(),
            Trigger::Disconnected => self.on_disconnected(),
            Trigger::SimReady => self.on_sim_ready(now),
            Trigger::SimAbsent => self.on_sim_absent(),
            Trigger::AirplaneModeChanged { on } => self.on_airplane_mode_changed(on),
            Trigger::ProvisioningChanged => self.on_provisioning_changed(now),
            Trigger::StackAvailable => self.on_stack_available(now),
            Trigger::Restart => self.on_restart(),
            Trigger::Response { code, reason } => self.on_response(code, &reason, now),
        }
    }

    /// A timer scheduled through a [`TimerCommand`](crate::scheduler::TimerCommand)
    /// has elapsed.
    pub fn on_timer(&mut self, timer: Timer, now: Instant) {
        match timer {
            Timer::Debounce(id) => self.on_debounce_expired(id, now),
            Timer::Retry(id) => self.on_retry_expired(id, now),
        }
    }

    pub fn on_network_technology_changed(&mut self, tech: NetworkTechnology, now: Instant) {
        info!("[on_network_technology_changed] {tech:?}");
        self.source.radio.apply(tech);
        if tech.implies_ims_registered() {
            self.readiness.ims_registered = true;
        }
        self.request_stack_publish(now);
    }

    pub fn on_etag_expired(&mut self, now: Instant) {
        info!("[on_etag_expired] Republishing");
        self.request_stack_publish(now);
    }

    pub fn on_feature_availability_changed(
        &mut self,
        transport: ImsTransport,
        voice: bool,
        video: bool,
        now: Instant,
    ) {
        let availability = AvailabilityFlags::from_report(transport, voice, video);
        if availability == self.source.availability {
            debug!("[on_feature_availability_changed] No change");
            return;
        }
        info!(
            "[on_feature_availability_changed] {:?} -> {:?}",
            self.source.availability, availability
        );
        self.source.availability = availability;

        if !self.readiness.got_trigger_from_stack {
            debug!("[on_feature_availability_changed] No stack trigger yet, caching");
            self.readiness.has_cached_trigger = true;
            return;
        }
        if self.settings.is_airplane_mode_on() && !availability.vowifi && !availability.viwifi {
            debug!("[on_feature_availability_changed] Airplane mode without Wi-Fi, ignoring");
            return;
        }
        // the stack reports technology changes for cellular itself
        if self.source.radio.on_iwlan {
            self.submit_local_trigger(LocalTrigger::FeatureAvailabilityChanged, now);
        }
    }

    pub fn on_mobile_data_changed(&mut self, enabled: bool, now: Instant) {
        if self.source.data_enabled == enabled {
            return;
        }
        info!("[on_mobile_data_changed] enabled={enabled}");
        self.source.data_enabled = enabled;
        self.submit_local_trigger(LocalTrigger::DataChanged, now);
    }

    pub fn on_vt_setting_changed(&mut self, enabled: bool, now: Instant) {
        if self.source.vt_enabled == enabled {
            return;
        }
        info!("[on_vt_setting_changed] enabled={enabled}");
        self.source.vt_enabled = enabled;
        self.submit_local_trigger(LocalTrigger::VtCallChanged, now);
    }

    pub fn on_tty_mode_changed(&mut self, mode: TtyMode, now: Instant) {
        let was_enabled = self.source.tty_mode.is_enabled();
        self.source.tty_mode = mode;
        if was_enabled != mode.is_enabled() {
            info!("[on_tty_mode_changed] {mode:?}");
            self.submit_local_trigger(LocalTrigger::TtyStatusChanged, now);
        }
    }

    pub fn on_registered(&mut self) {
        info!("[on_registered] IMS registered");
        self.readiness.ims_registered = true;
    }

    pub fn on_disconnected(&mut self) {
        info!("[on_disconnected] IMS disconnected");
        self.readiness.ims_registered = false;
        self.reset();
    }

    pub fn on_sim_ready(&mut self, now: Instant) {
        info!("[on_sim_ready] SIM loaded");
        self.readiness.sim_loaded = true;
        // a hot-swapped SIM is treated like a power cycle
        self.state.clear_block();
        self.replay_cached_trigger(now);
    }

    pub fn on_sim_absent(&mut self) {
        info!("[on_sim_absent] SIM removed");
        self.readiness.sim_loaded = false;
        self.reset();
    }

    pub fn on_airplane_mode_changed(&mut self, on: bool) {
        if on {
            self.on_airplane_mode_on();
        }
    }

    pub fn on_airplane_mode_on(&mut self) {
        info!("[on_airplane_mode_on] Resetting");
        self.reset();
    }

    pub fn on_provisioning_changed(&mut self, now: Instant) {
        if !self.settings.is_eab_provisioned() {
            debug!("[on_provisioning_changed] Presence still not provisioned");
            return;
        }
        info!("[on_provisioning_changed] Presence provisioned");
        self.state.clear_block();
        self.replay_cached_trigger(now);
    }

    pub fn on_stack_available(&mut self, now: Instant) {
        self.replay_cached_trigger(now);
    }

    pub fn on_restart(&mut self) {
        info!("[on_restart] Restart signalled");
        self.state.clear_block();
    }

    /// Forced publish requested by the IMS stack.
    fn request_stack_publish(&mut self, now: Instant) {
        self.readiness.got_trigger_from_stack = true;
        if self.state.is_blocked() {
            warn!("[request_stack_publish] Blocked until restart");
            return;
        }
        if !self.is_ready() {
            debug!("[request_stack_publish] Not ready, caching trigger");
            self.readiness.has_cached_trigger = true;
            return;
        }
        let request = self.new_request(true, now);
        self.enqueue(request, now);
    }

    fn replay_cached_trigger(&mut self, now: Instant) {
        if !self.readiness.has_cached_trigger {
            return;
        }
        info!("[replay_cached_trigger] Replaying cached trigger");
        self.readiness.has_cached_trigger = false;
        self.submit_local_trigger(LocalTrigger::CachedTrigger, now);
    }
}
