//! Outbound side of the PUBLISH exchange.
//!
//! The transport builds and sends the actual request. Submission is
//! fire-and-forget: the response comes back later as a
//! [`Trigger::Response`](crate::engine::Trigger::Response).

use crate::{capability::PublishContent, error::SubmitError, request::RequestId};

/// What is handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub request_id: RequestId,
    pub content: PublishContent,
}

/// The transport took the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted;

pub trait PresenceTransport: Send + Sync {
    /// Hand a PUBLISH to the network. Must not block on the network exchange.
    fn submit(&self, submission: &Submission) -> Result<Accepted, SubmitError>;
}
