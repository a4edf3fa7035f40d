//! Scripted runs against a simulated network.
//!
//! A scenario is a JSON list of steps, each a [`Trigger`] sent after a delay.
//! The [`SimulatedTransport`] accepts every submission and a responder task
//! answers it with a fixed response after a fixed latency.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;

use crate::{
    actor::PublisherHandle,
    engine::Trigger,
    error::{PublisherError, SubmitError},
    settings::StaticSettings,
    transport::{Accepted, PresenceTransport, Submission},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Wait before sending the trigger.
    #[serde(default)]
    pub delay_ms: u64,
    pub trigger: Trigger,
}

pub fn parse_scenario(json: &str) -> anyhow::Result<Vec<ScenarioStep>> {
    serde_json::from_str(json).context("Invalid scenario document")
}

pub fn load_scenario(path: impl AsRef<Path>) -> anyhow::Result<Vec<ScenarioStep>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    parse_scenario(&raw)
}

pub fn load_settings(path: impl AsRef<Path>) -> anyhow::Result<StaticSettings> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid settings {}", path.display()))
}

/// Send every step to the publisher, in order.
pub async fn replay(
    handle: &PublisherHandle,
    steps: &[ScenarioStep],
) -> Result<(), PublisherError> {
    for step in steps {
        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }
        info!("[replay] {:?}", step.trigger);
        handle.send(step.trigger.clone()).await?;
    }
    Ok(())
}

/// Response the simulated network gives to every PUBLISH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePlan {
    pub code: i32,
    pub reason: String,
    pub latency: Duration,
}

/// Transport that hands submissions to a responder task.
pub struct SimulatedTransport {
    outbound: mpsc::UnboundedSender<Submission>,
    submitted: Arc<AtomicUsize>,
}

impl SimulatedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Submission>) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let transport = Self {
            outbound,
            submitted: Arc::new(AtomicUsize::new(0)),
        };
        (transport, inbound)
    }

    /// Shared count of accepted submissions.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.submitted.clone()
    }
}

impl PresenceTransport for SimulatedTransport {
    fn submit(&self, submission: &Submission) -> Result<Accepted, SubmitError> {
        self.outbound
            .send(*submission)
            .map_err(|_| SubmitError::ServiceUnavailable)?;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(Accepted)
    }
}

/// Answer each submission with `plan` until `cancel` fires or the transport
/// is dropped.
pub fn spawn_responder(
    handle: PublisherHandle,
    mut inbound: mpsc::UnboundedReceiver<Submission>,
    plan: ResponsePlan,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let submission = tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = inbound.recv() => match maybe {
                    Some(submission) => submission,
                    None => break,
                },
            };
            info!(
                "[spawn_responder] Request {} voice={} video={}",
                submission.request_id,
                submission.content.voice_capable,
                submission.content.video_capable
            );
            sleep(plan.latency).await;
            if let Err(e) = handle.on_response(plan.code, plan.reason.clone()).await {
                warn!("[spawn_responder] {e}");
                break;
            }
        }
    })
}
