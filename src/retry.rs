//! Response classification and the single retry timer.

use std::str::FromStr;

use log::debug;
use tokio::time::{Duration, Instant};

use crate::{config::PublisherConfig, error::ConfigError};

/// SIP response code of an accepted PUBLISH.
pub const SIP_OK: i32 = 200;
/// SIP request timeout.
pub const SIP_REQUEST_TIMEOUT: i32 = 408;
/// Stack sentinel: temporary error, the PUBLISH may be retried.
pub const STACK_TEMPORARY_ERROR: i32 = 888;
/// Stack sentinel: nothing was sent because the capabilities did not change.
pub const STACK_NO_CHANGE: i32 = 999;

/// A configured response meaning "not provisioned".
///
/// Written as `"<code>"` or `"<code> <reason fragment>"`. A response matches
/// when the code is equal and, if a fragment is given, the reason phrase
/// contains it (ignoring case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionErrorPattern {
    pub code: i32,
    pub reason: Option<String>,
}

impl FromStr for ProvisionErrorPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (code, reason) = s.split_at(split);
        let code = code
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidPattern(s.to_string()))?;
        let reason = reason.trim();
        Ok(Self {
            code,
            reason: (!reason.is_empty()).then(|| reason.to_lowercase()),
        })
    }
}

impl ProvisionErrorPattern {
    pub fn matches(&self, code: i32, reason: &str) -> bool {
        if self.code != code {
            return false;
        }
        match &self.reason {
            None => true,
            Some(fragment) => reason.to_lowercase().contains(fragment.as_str()),
        }
    }
}

/// What the engine should do with a PUBLISH response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    VolteProvisionError,
    RcsProvisionError,
    /// `999`: nothing to do.
    NoChange,
    Ok,
    RequestTimeout,
    /// `888`: retry later.
    TemporaryError,
    /// Other out-of-range code.
    Ignored,
    /// Any other SIP failure.
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseClassifier {
    volte_provision_errors: Vec<ProvisionErrorPattern>,
    rcs_provision_errors: Vec<ProvisionErrorPattern>,
}

impl ResponseClassifier {
    pub fn new(
        volte_provision_errors: Vec<ProvisionErrorPattern>,
        rcs_provision_errors: Vec<ProvisionErrorPattern>,
    ) -> Self {
        Self {
            volte_provision_errors,
            rcs_provision_errors,
        }
    }

    pub fn from_config(config: &PublisherConfig) -> Result<Self, ConfigError> {
        let parse = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| p.parse::<ProvisionErrorPattern>())
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self::new(
            parse(&config.volte_provision_errors)?,
            parse(&config.rcs_provision_errors)?,
        ))
    }

    /// Provision patterns are checked before the numeric code, so a
    /// configured `200 <reason>` is still an error.
    pub fn classify(&self, code: i32, reason: &str) -> ResponseOutcome {
        if self
            .volte_provision_errors
            .iter()
            .any(|p| p.matches(code, reason))
        {
            return ResponseOutcome::VolteProvisionError;
        }
        if self
            .rcs_provision_errors
            .iter()
            .any(|p| p.matches(code, reason))
        {
            return ResponseOutcome::RcsProvisionError;
        }

        match code {
            STACK_NO_CHANGE => ResponseOutcome::NoChange,
            SIP_OK => ResponseOutcome::Ok,
            SIP_REQUEST_TIMEOUT => ResponseOutcome::RequestTimeout,
            STACK_TEMPORARY_ERROR => ResponseOutcome::TemporaryError,
            code if !(100..=699).contains(&code) => ResponseOutcome::Ignored,
            _ => ResponseOutcome::Failed,
        }
    }
}

/// The outstanding retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryHandle {
    pub id: u64,
    pub fire_at: Instant,
}

/// Holds at most one scheduled retry.
#[derive(Debug, Clone, Default)]
pub struct RetryTimer {
    pending: Option<RetryHandle>,
    next_id: u64,
}

impl RetryTimer {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<RetryHandle> {
        self.pending
    }

    /// Schedule a retry `delay` from `now`. Returns `None` when a retry is
    /// already pending; the existing one is left as is.
    pub fn schedule(&mut self, now: Instant, delay: Duration) -> Option<RetryHandle> {
        if let Some(existing) = self.pending {
            debug!(
                "[schedule] Retry {} already pending, ignoring new request",
                existing.id
            );
            return None;
        }
        self.next_id += 1;
        let handle = RetryHandle {
            id: self.next_id,
            fire_at: now + delay,
        };
        self.pending = Some(handle);
        Some(handle)
    }

    /// Cancel the pending retry, if any.
    pub fn cancel(&mut self) -> Option<RetryHandle> {
        self.pending.take()
    }

    /// Consume a firing timer. Returns `false` for a retry that was cancelled
    /// or replaced in the meantime.
    pub fn fire(&mut self, id: u64) -> bool {
        match self.pending {
            Some(handle) if handle.id == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
