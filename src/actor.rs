//! Actor runtime around [`PublishEngine`].
//!
//! Every trigger, response and timer firing goes through the actor's mailbox,
//! so the engine never sees two events at once. Timer commands produced by a
//! message are applied before the next message is taken.

use kameo::{
    actor::ActorRef,
    message::{Context, Message},
    Actor,
};
use log::warn;
use tokio::time::Instant;

use crate::{
    capability::{ImsTransport, NetworkTechnology},
    engine::{PublishEngine, PublisherSnapshot, Trigger},
    error::PublisherError,
    scheduler::{Timer, TimerSet, TimerSink},
    settings::TtyMode,
};

#[derive(Actor)]
pub struct PublisherActor {
    engine: PublishEngine,
    timers: TimerSet,
}

impl PublisherActor {
    pub fn new(engine: PublishEngine) -> Self {
        Self {
            engine,
            timers: TimerSet::new(),
        }
    }

    fn flush_timers(&mut self, actor_ref: &ActorRef<Self>) {
        for command in self.engine.take_timer_commands() {
            self.timers.apply(command, actor_ref);
        }
    }
}

/// A debounce or retry timer has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired(pub Timer);

/// Request a [`PublisherSnapshot`].
#[derive(Debug, Clone, Copy)]
pub struct Snapshot;

impl Message<Trigger> for PublisherActor {
    type Reply = Result<(), PublisherError>;

    async fn handle(
        &mut self,
        msg: Trigger,
        ctx: Context<'_, Self, Self::Reply>,
    ) -> Self::Reply {
        let actor_ref: ActorRef<Self> = ctx.actor_ref().clone();
        self.engine.handle(msg, Instant::now());
        self.flush_timers(&actor_ref);
        Ok(())
    }
}

impl Message<TimerFired> for PublisherActor {
    type Reply = Result<(), PublisherError>;

    async fn handle(
        &mut self,
        msg: TimerFired,
        ctx: Context<'_, Self, Self::Reply>,
    ) -> Self::Reply {
        let actor_ref: ActorRef<Self> = ctx.actor_ref().clone();
        self.timers.fired(msg.0);
        self.engine.on_timer(msg.0, Instant::now());
        self.flush_timers(&actor_ref);
        Ok(())
    }
}

impl Message<Snapshot> for PublisherActor {
    type Reply = Result<PublisherSnapshot, PublisherError>;

    async fn handle(
        &mut self,
        _msg: Snapshot,
        _ctx: Context<'_, Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.engine.snapshot())
    }
}

impl TimerSink for ActorRef<PublisherActor> {
    async fn fire(self, timer: Timer) {
        if self.ask(TimerFired(timer)).await.is_err() {
            warn!("[TimerSink::fire] Publisher stopped, dropping {timer:?}");
        }
    }
}

/// Cloneable front end of a running [`PublisherActor`].
#[derive(Clone)]
pub struct PublisherHandle {
    actor: ActorRef<PublisherActor>,
}

impl PublisherHandle {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(engine: PublishEngine) -> Self {
        let actor = kameo::spawn(PublisherActor::new(engine));
        Self { actor }
    }

    pub async fn send(&self, trigger: Trigger) -> Result<(), PublisherError> {
        self.actor
            .ask(trigger)
            .await
            .map_err(|_| PublisherError::ActorUnavailable)
    }

    pub async fn snapshot(&self) -> Result<PublisherSnapshot, PublisherError> {
        self.actor
            .ask(Snapshot)
            .await
            .map_err(|_| PublisherError::ActorUnavailable)
    }

    pub async fn on_network_technology_changed(
        &self,
        tech: NetworkTechnology,
    ) -> Result<(), PublisherError> {
        self.send(Trigger::NetworkTechnologyChanged { tech }).await
    }

    pub async fn on_etag_expired(&self) -> Result<(), PublisherError> {
        self.send(Trigger::EtagExpired).await
    }

    pub async fn on_feature_availability_changed(
        &self,
        transport: ImsTransport,
        voice: bool,
        video: bool,
    ) -> Result<(), PublisherError> {
        self.send(Trigger::FeatureAvailabilityChanged {
            transport,
            voice,
            video,
        })
        .await
    }

    pub async fn on_mobile_data_changed(&self, enabled: bool) -> Result<(), PublisherError> {
        self.send(Trigger::MobileDataChanged { enabled }).await
    }

    pub async fn on_vt_setting_changed(&self, enabled: bool) -> Result<(), PublisherError> {
        self.send(Trigger::VtSettingChanged { enabled }).await
    }

    pub async fn on_tty_mode_changed(&self, mode: TtyMode) -> Result<(), PublisherError> {
        self.send(Trigger::TtyModeChanged { mode }).await
    }

    pub async fn on_registered(&self) -> Result<(), PublisherError> {
        self.send(Trigger::Registered).await
    }

    pub async fn on_disconnected(&self) -> Result<(), PublisherError> {
        self.send(Trigger::Disconnected).await
    }

    pub async fn on_sim_ready(&self) -> Result<(), PublisherError> {
        self.send(Trigger::SimReady).await
    }

    pub async fn on_sim_absent(&self) -> Result<(), PublisherError> {
        self.send(Trigger::SimAbsent).await
    }

    pub async fn on_airplane_mode_on(&self) -> Result<(), PublisherError> {
        self.send(Trigger::AirplaneModeChanged { on: true }).await
    }

    pub async fn on_provisioning_changed(&self) -> Result<(), PublisherError> {
        self.send(Trigger::ProvisioningChanged).await
    }

    pub async fn on_stack_available(&self) -> Result<(), PublisherError> {
        self.send(Trigger::StackAvailable).await
    }

    pub async fn on_restart(&self) -> Result<(), PublisherError> {
        self.send(Trigger::Restart).await
    }

    pub async fn on_response(
        &self,
        code: i32,
        reason: impl Into<String>,
    ) -> Result<(), PublisherError> {
        self.send(Trigger::Response {
            code,
            reason: reason.into(),
        })
        .await
    }
}
