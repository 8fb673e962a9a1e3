//! Per-kind subscription lists.
//!
//! The registry is the only state mutated after load: plugins subscribe and
//! unsubscribe whenever they like, including from inside a running dispatch. Each
//! list is an `Arc<Vec<Subscription>>` that mutations replace copy-on-write, so a
//! dispatch enumerates the snapshot it started with and structural changes show up on
//! the next dispatch.
//!
//! # Thread Safety
//!
//! [`HandlerRegistry`] is `Send + Sync`. No shard lock is held while subscribers run,
//! so a subscriber may call back into the registry.
//!
//! # Examples
//!
//! ```rust
//! use ilweave::{
//!     assembly::TypeSig,
//!     events::{EventArgs, EventKind, EventSchema, HandlerRegistry},
//! };
//!
//! let kind = EventKind::new(EventSchema::new("Opening").field("Door", TypeSig::Object).cancellable())?;
//! let registry = HandlerRegistry::new();
//!
//! let id = registry.subscribe(&kind, "lockdown", |args: &mut EventArgs| {
//!     args.deny()?;
//!     Ok(())
//! });
//!
//! let mut args = EventArgs::with_defaults(kind.clone());
//! let outcome = registry.invoke(&kind, &mut args);
//! assert_eq!(outcome.invoked, 1);
//! assert!(!args.is_allowed());
//!
//! assert!(registry.unsubscribe(&kind, id));
//! assert_eq!(registry.subscriber_count(&kind), 0);
//! # Ok::<(), ilweave::Error>(())
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use dashmap::DashMap;
use tracing::warn;

use crate::{
    config::DispatchConfig,
    events::{
        args::EventArgs,
        invoker::{invoke_safely, DispatchOutcome},
        schema::EventKind,
    },
};

/// Subscriber callback type.
pub type Callback = dyn Fn(&mut EventArgs) -> anyhow::Result<()> + Send + Sync;

/// Identifier returned by [`HandlerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// One registered subscriber.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    name: Arc<str>,
    callback: Arc<Callback>,
}

impl Subscription {
    /// Creates a subscription.
    pub fn new<F>(id: SubscriptionId, name: &str, callback: F) -> Self
    where
        F: Fn(&mut EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id,
            name: Arc::from(name),
            callback: Arc::new(callback),
        }
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name given at subscription time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The callback.
    #[must_use]
    pub fn callback(&self) -> &Callback {
        self.callback.as_ref()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Per-kind dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Dispatches that ran
    pub dispatches: u64,
    /// Dispatches suppressed by the reentrancy limit
    pub skipped: u64,
    /// Subscriber calls that failed
    pub failures: u64,
    /// Dispatches that ended with the operation cancelled
    pub cancelled: u64,
}

/// Subscription lists for every event kind.
pub struct HandlerRegistry {
    lists: DashMap<EventKind, Arc<Vec<Subscription>>>,
    stats: DashMap<EventKind, RegistryStats>,
    next_id: AtomicU64,
    config: DispatchConfig,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry with the default [`DispatchConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    /// Creates an empty registry.
    #[must_use]
    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            lists: DashMap::new(),
            stats: DashMap::new(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// The process-wide registry used by [`crate::runtime::Runtime::new`].
    pub fn global() -> Arc<HandlerRegistry> {
        static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(HandlerRegistry::new())))
    }

    /// Dispatch configuration.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Appends a subscriber to `kind`'s list. Notification order is subscription order.
    pub fn subscribe<F>(&self, kind: &EventKind, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&mut EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription::new(id, name, callback);
        let mut list = self.lists.entry(kind.clone()).or_default();
        Arc::make_mut(list.value_mut()).push(subscription);
        id
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed to `kind`.
    pub fn unsubscribe(&self, kind: &EventKind, id: SubscriptionId) -> bool {
        let Some(mut list) = self.lists.get_mut(kind) else {
            return false;
        };
        let Some(position) = list.iter().position(|s| s.id == id) else {
            return false;
        };
        Arc::make_mut(list.value_mut()).remove(position);
        true
    }

    /// Removes every subscriber of `kind`.
    pub fn clear(&self, kind: &EventKind) {
        self.lists.remove(kind);
    }

    /// The current list of `kind`. Later mutations do not affect the returned snapshot.
    #[must_use]
    pub fn snapshot(&self, kind: &EventKind) -> Arc<Vec<Subscription>> {
        self.lists
            .get(kind)
            .map(|list| Arc::clone(list.value()))
            .unwrap_or_default()
    }

    /// Number of subscribers of `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.lists.get(kind).map_or(0, |list| list.len())
    }

    /// Dispatches `args` to the current subscribers of `kind`.
    ///
    /// `args` must be a value of `kind`; anything else is skipped with a warning.
    pub fn invoke(&self, kind: &EventKind, args: &mut EventArgs) -> DispatchOutcome {
        if args.kind() != kind {
            warn!(event = %kind, args = %args.kind(), "event value of another kind, dispatch skipped");
            self.stats.entry(kind.clone()).or_default().skipped += 1;
            return DispatchOutcome {
                invoked: 0,
                failures: Vec::new(),
                skipped: true,
                allowed: args.is_allowed(),
            };
        }

        let subscribers = self.snapshot(kind);
        let outcome = invoke_safely(kind, &subscribers, args, &self.config);

        let mut stats = self.stats.entry(kind.clone()).or_default();
        if outcome.skipped {
            stats.skipped += 1;
        } else {
            stats.dispatches += 1;
            stats.failures += outcome.failures.len() as u64;
            if !outcome.allowed {
                stats.cancelled += 1;
            }
        }
        outcome
    }

    /// Counters of `kind`.
    #[must_use]
    pub fn stats(&self, kind: &EventKind) -> RegistryStats {
        self.stats
            .get(kind)
            .map(|stats| *stats.value())
            .unwrap_or_default()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.lists {
            map.entry(&entry.key().id(), &entry.value().len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::TypeSig, events::EventSchema};
    use std::sync::Mutex;

    fn kind(id: &str) -> EventKind {
        EventKind::new(EventSchema::new(id).mutable_field("N", TypeSig::I32).cancellable()).unwrap()
    }

    #[test]
    fn test_subscribe_order_and_unsubscribe() {
        let registry = HandlerRegistry::new();
        let k = kind("A");
        let log = Arc::new(Mutex::new(Vec::new()));
        let ids: Vec<_> = (0..3)
            .map(|i| {
                let log = Arc::clone(&log);
                registry.subscribe(&k, &format!("s{i}"), move |_| {
                    log.lock().unwrap().push(i);
                    Ok(())
                })
            })
            .collect();
        assert!(registry.unsubscribe(&k, ids[1]));
        assert!(!registry.unsubscribe(&k, ids[1]));
        assert!(!registry.unsubscribe(&kind("B"), ids[0]));

        registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        assert_eq!(*log.lock().unwrap(), vec![0, 2]);
        assert_eq!(registry.stats(&k).dispatches, 1);
    }

    #[test]
    fn test_mutation_during_dispatch_uses_snapshot() {
        let registry = Arc::new(HandlerRegistry::new());
        let k = kind("A");
        let calls = Arc::new(AtomicU64::new(0));

        let (r, kk, c) = (Arc::clone(&registry), k.clone(), Arc::clone(&calls));
        registry.subscribe(&k, "adder", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = Arc::clone(&c);
            r.subscribe(&kk, "late", move |_| {
                c2.fetch_add(100, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        let outcome = registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        assert_eq!(outcome.invoked, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(&k), 2);

        registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 102);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_uses_snapshot() {
        let registry = Arc::new(HandlerRegistry::new());
        let k = kind("A");
        let log = Arc::new(Mutex::new(Vec::new()));
        let ids: Arc<OnceLock<Vec<SubscriptionId>>> = Arc::new(OnceLock::new());

        // "first" removes "last" and itself; both still run in the current dispatch.
        let subscribed: Vec<SubscriptionId> = ["first", "middle", "last"]
            .into_iter()
            .map(|name| {
                let (r, kk, log, ids) = (Arc::clone(&registry), k.clone(), Arc::clone(&log), Arc::clone(&ids));
                registry.subscribe(&k, name, move |_| {
                    log.lock().unwrap().push(name);
                    if name == "first" {
                        let ids = ids.get().unwrap();
                        assert!(r.unsubscribe(&kk, ids[2]));
                        assert!(r.unsubscribe(&kk, ids[0]));
                    }
                    Ok(())
                })
            })
            .collect();
        ids.set(subscribed).unwrap();

        let outcome = registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        assert_eq!(outcome.invoked, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "middle", "last"]);
        assert_eq!(registry.subscriber_count(&k), 1);

        registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        assert_eq!(*log.lock().unwrap(), vec!["first", "middle", "last", "middle"]);
    }

    #[test]
    fn test_same_id_other_layout_has_own_subscribers() {
        let registry = HandlerRegistry::new();
        let door = EventKind::new(EventSchema::new("Opening").field("Door", TypeSig::I32)).unwrap();
        let cost = EventKind::new(
            EventSchema::new("Opening").field("Cost", TypeSig::F64).cancellable(),
        )
        .unwrap();
        registry.subscribe(&door, "door", |args| {
            args.get("Door")?;
            Ok(())
        });

        let outcome = registry.invoke(&cost, &mut EventArgs::with_defaults(cost.clone()));
        assert_eq!(outcome.invoked, 0);
        assert!(outcome.failures.is_empty());
        assert_eq!(registry.subscriber_count(&door), 1);
        assert_eq!(registry.subscriber_count(&cost), 0);

        let outcome = registry.invoke(&door, &mut EventArgs::with_defaults(cost));
        assert!(outcome.skipped);
    }

    #[test]
    fn test_wrong_kind_is_skipped() {
        let registry = HandlerRegistry::new();
        let a = kind("A");
        let b = kind("B");
        let outcome = registry.invoke(&a, &mut EventArgs::with_defaults(b));
        assert!(outcome.skipped);
        assert_eq!(registry.stats(&a).skipped, 1);
    }

    #[test]
    fn test_stats_count_failures_and_cancellations() {
        let registry = HandlerRegistry::new();
        let k = kind("A");
        registry.subscribe(&k, "fails", |_| anyhow::bail!("no"));
        registry.subscribe(&k, "cancels", |args| {
            args.deny()?;
            Ok(())
        });
        registry.invoke(&k, &mut EventArgs::with_defaults(k.clone()));
        let stats = registry.stats(&k);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.cancelled, 1);
    }
}
