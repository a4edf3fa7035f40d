//! Deferred callbacks for the debounce window and the retry timer.
//!
//! The engine never sleeps. It emits [`TimerCommand`]s, and the runtime turns
//! them into tokio tasks through a [`TimerSet`]. A firing timer is delivered
//! back through a [`TimerSink`], which for the actor means the actor's own
//! mailbox.

use std::{collections::HashMap, future::Future};

use log::debug;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::request::RequestId;

/// A timer owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Promotion of the pending request with this id.
    Debounce(RequestId),
    /// Scheduled retry with this id.
    Retry(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Schedule { timer: Timer, delay: Duration },
    Cancel(Timer),
}

/// Destination of fired timers.
pub trait TimerSink: Clone + Send + 'static {
    fn fire(self, timer: Timer) -> impl Future<Output = ()> + Send;
}

/// Running timer tasks, cancellable by [`Timer`].
#[derive(Default)]
pub struct TimerSet {
    tokens: HashMap<Timer, CancellationToken>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<S: TimerSink>(&mut self, command: TimerCommand, sink: &S) {
        match command {
            TimerCommand::Schedule { timer, delay } => {
                let token = CancellationToken::new();
                if let Some(previous) = self.tokens.insert(timer, token.clone()) {
                    previous.cancel();
                }
                let sink = sink.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("[TimerSet::apply] {timer:?} cancelled");
                        }
                        _ = tokio::time::sleep(delay) => {
                            sink.fire(timer).await;
                        }
                    }
                });
            }
            TimerCommand::Cancel(timer) => {
                if let Some(token) = self.tokens.remove(&timer) {
                    token.cancel();
                }
            }
        }
    }

    /// Forget a timer that has fired.
    pub fn fired(&mut self, timer: Timer) {
        self.tokens.remove(&timer);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn cancel_all(&mut self) {
        for (_, token) in self.tokens.drain() {
            token.cancel();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
