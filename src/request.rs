//! Publish requests and the three slots they move through.

use std::fmt::Display;

use log::info;
use tokio::time::{Duration, Instant};

use crate::capability::PublishContent;

/// Identifier carried by a request from creation to submission.
pub type RequestId = u32;

/// Triggers raised by local state changes rather than by the IMS stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTrigger {
    DataChanged,
    VtCallChanged,
    CachedTrigger,
    TtyStatusChanged,
    Retry,
    FeatureAvailabilityChanged,
}

impl LocalTrigger {
    /// Whether the resulting PUBLISH must reach the network even if the
    /// capability content did not change.
    pub fn forces_network(self) -> bool {
        match self {
            LocalTrigger::DataChanged | LocalTrigger::FeatureAvailabilityChanged => false,
            // feature-capability changes are not always reported for VT calls
            LocalTrigger::VtCallChanged => true,
            LocalTrigger::TtyStatusChanged => true,
            LocalTrigger::CachedTrigger | LocalTrigger::Retry => true,
        }
    }
}

impl Display for LocalTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let trigger = match self {
            LocalTrigger::DataChanged => "DataChanged",
            LocalTrigger::VtCallChanged => "VtCallChanged",
            LocalTrigger::CachedTrigger => "CachedTrigger",
            LocalTrigger::TtyStatusChanged => "TtyStatusChanged",
            LocalTrigger::Retry => "Retry",
            LocalTrigger::FeatureAvailabilityChanged => "FeatureAvailabilityChanged",
        };
        write!(f, "{trigger}")
    }
}

/// A proposed capability announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub id: RequestId,
    pub force: bool,
    pub created_at: Instant,
    pub content: PublishContent,
}

impl PublishRequest {
    pub fn new(id: RequestId, force: bool, created_at: Instant, content: PublishContent) -> Self {
        Self {
            id,
            force,
            created_at,
            content,
        }
    }

    /// Content comparison used for suppression. A missing request never
    /// matches.
    pub fn has_same_content(&self, other: Option<&PublishRequest>) -> bool {
        other.is_some_and(|other| self.content == other.content)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

impl Display for PublishRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "id={} force={} voice={} video={}",
            self.id, self.force, self.content.voice_capable, self.content.video_capable
        )
    }
}

/// Pending, in-flight and last-published requests.
#[derive(Debug, Clone, Default)]
pub struct PublishSlots {
    /// Waiting for the debounce window to elapse.
    pub pending: Option<PublishRequest>,
    /// Submitted, waiting for a response.
    pub in_flight: Option<PublishRequest>,
    /// Most recent request that received a response.
    pub last_published: Option<PublishRequest>,
}

impl PublishSlots {
    /// Take the pending request if it is the one with `id`.
    pub fn take_pending(&mut self, id: RequestId) -> Option<PublishRequest> {
        if self.pending.as_ref().is_some_and(|pending| pending.id == id) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Move the in-flight request into last-published. With nothing in
    /// flight, last-published is cleared.
    pub fn complete(&mut self) -> bool {
        self.last_published = self.in_flight.take();
        match &self.last_published {
            Some(request) => {
                info!("[complete] Request {} completed", request.id);
                true
            }
            None => false,
        }
    }

    /// Timestamp of the request the throttle is measured from.
    pub fn throttle_baseline(&self) -> Option<Instant> {
        self.in_flight
            .as_ref()
            .or(self.last_published.as_ref())
            .map(|request| request.created_at)
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.in_flight = None;
        self.last_published = None;
    }
}
