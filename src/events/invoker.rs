//! Failure-isolating multicast invocation.
//!
//! [`invoke_safely`] calls every subscriber of a snapshot in order. Each call is
//! wrapped individually: an `Err` or a panic is caught, logged with
//! `tracing::error!`, recorded in the [`DispatchOutcome`], and the next subscriber
//! runs. Nothing a subscriber does can unwind into the host method.
//!
//! Reentrant dispatch of one event kind on one thread is allowed up to
//! [`DispatchConfig::max_reentrancy`] nested levels. A dispatch beyond that is skipped
//! with a warning and leaves the event value untouched.

use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    time::Instant,
};

use tracing::{debug, error, warn};

use crate::{
    config::DispatchConfig,
    events::{args::EventArgs, registry::Subscription, schema::EventKind},
};

thread_local! {
    static ACTIVE: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
}

/// Marks one active dispatch of a kind on this thread for as long as it lives.
struct ReentrancyGuard {
    kind: String,
}

impl ReentrancyGuard {
    fn enter(kind: &EventKind, limit: usize) -> Option<Self> {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            let depth = active.entry(kind.id().to_string()).or_insert(0);
            if *depth >= limit {
                None
            } else {
                *depth += 1;
                Some(Self {
                    kind: kind.id().to_string(),
                })
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(depth) = active.get_mut(&self.kind) {
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    active.remove(&self.kind);
                }
            }
        });
    }
}

/// Number of dispatches of `kind` currently active on this thread.
#[must_use]
pub fn active_depth(kind: &EventKind) -> usize {
    ACTIVE.with(|active| active.borrow().get(kind.id()).copied().unwrap_or(0))
}

/// One subscriber that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    /// Subscriber name given at subscription time
    pub subscriber: String,
    /// Rendered error or panic message
    pub message: String,
    /// `true` if the subscriber panicked rather than returning `Err`
    pub panicked: bool,
}

impl fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = if self.panicked { "panicked" } else { "failed" };
        write!(f, "subscriber '{}' {how}: {}", self.subscriber, self.message)
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscribers called, failing ones included
    pub invoked: usize,
    /// Subscribers that failed, in call order
    pub failures: Vec<SubscriberFailure>,
    /// `true` if the reentrancy limit suppressed this dispatch
    pub skipped: bool,
    /// Value of the cancellation flag after the dispatch
    pub allowed: bool,
}

impl DispatchOutcome {
    fn skipped(allowed: bool) -> Self {
        Self {
            invoked: 0,
            failures: Vec::new(),
            skipped: true,
            allowed,
        }
    }

    /// Returns `true` if the dispatch ran and no subscriber failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Calls each subscriber in `subscribers` with `args`, isolating failures.
///
/// The slice is the snapshot taken when the dispatch started; subscriptions added or
/// removed meanwhile take effect from the next dispatch.
pub fn invoke_safely(
    kind: &EventKind,
    subscribers: &[Subscription],
    args: &mut EventArgs,
    config: &DispatchConfig,
) -> DispatchOutcome {
    let Some(_guard) = ReentrancyGuard::enter(kind, config.max_reentrancy) else {
        warn!(
            event = %kind,
            depth = active_depth(kind),
            limit = config.max_reentrancy,
            "reentrant dispatch skipped"
        );
        return DispatchOutcome::skipped(args.is_allowed());
    };

    debug!(event = %kind, subscribers = subscribers.len(), "dispatching");

    let mut failures = Vec::new();
    for subscription in subscribers {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| (subscription.callback())(args)));
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let message = format!("{e:#}");
                error!(
                    event = %kind,
                    subscriber = subscription.name(),
                    error = %message,
                    "subscriber failed"
                );
                failures.push(SubscriberFailure {
                    subscriber: subscription.name().to_string(),
                    message,
                    panicked: false,
                });
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    event = %kind,
                    subscriber = subscription.name(),
                    panic = %message,
                    "subscriber panicked"
                );
                failures.push(SubscriberFailure {
                    subscriber: subscription.name().to_string(),
                    message,
                    panicked: true,
                });
            }
        }

        if let Some(threshold) = config.slow_subscriber_threshold {
            if elapsed > threshold {
                warn!(
                    event = %kind,
                    subscriber = subscription.name(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
                    "slow subscriber"
                );
            }
        }
    }

    DispatchOutcome {
        invoked: subscribers.len(),
        failures,
        skipped: false,
        allowed: args.is_allowed(),
    }
}
