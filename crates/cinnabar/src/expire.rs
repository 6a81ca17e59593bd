//! Item expiry: built-in age expirers and the background sweep ticker.

use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cinnabar_core::Stats;

use crate::store::Core;

/// Sweep interval used when none is configured within the grace period.
/// Deliberately non-round so many stores started together do not sweep in
/// lockstep.
pub(crate) const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_millis(23_300);

/// How long the ticker waits for an explicit interval before falling back
/// to the default.
pub(crate) const EXPIRE_CONFIG_GRACE: Duration = Duration::from_millis(100);

/// Decides whether an item is stale given the current time and its stats.
pub trait Expirer<T>: Send + Sync {
    fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool;
}

impl<T, F> Expirer<T> for F
where
    F: Fn(&T, DateTime<Utc>, &Stats) -> bool + Send + Sync,
{
    fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool {
        self(item, now, stats)
    }
}

/// Ternary verdict returned by an expiry predicate. `Null` abstains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expire {
    True,
    False,
    Null,
}

/// An expiry predicate consulted alongside the age thresholds.
pub type ExpireFn<T> = Arc<dyn Fn(&T, DateTime<Utc>, &Stats) -> Expire + Send + Sync>;

fn older_than(now: DateTime<Utc>, at: Option<DateTime<Utc>>, threshold: Option<Duration>) -> bool {
    match (at, threshold.and_then(|d| chrono::Duration::from_std(d).ok())) {
        (Some(at), Some(threshold)) => now.signed_duration_since(at) > threshold,
        _ => false,
    }
}

/// Expires items by time since creation / last modification / last access,
/// with an optional ordered list of predicates checked first.
///
/// Predicates are evaluated in order and the first non-[`Expire::Null`]
/// verdict decides. Otherwise the item expires as soon as *any* configured
/// threshold is exceeded. A never-modified item falls back to its creation
/// time, a never-accessed item to its modification time.
pub struct AgeExpirer<T> {
    c_time: Option<Duration>,
    m_time: Option<Duration>,
    a_time: Option<Duration>,
    predicates: Vec<ExpireFn<T>>,
}

impl<T> AgeExpirer<T> {
    pub fn new(
        c_time: Option<Duration>,
        m_time: Option<Duration>,
        a_time: Option<Duration>,
    ) -> Self {
        Self {
            c_time,
            m_time,
            a_time,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: ExpireFn<T>) -> Self {
        self.predicates.push(predicate);
        self
    }
}

impl<T: Send + Sync> Expirer<T> for AgeExpirer<T> {
    fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool {
        for predicate in &self.predicates {
            match predicate(item, now, stats) {
                Expire::Null => continue,
                verdict => return verdict == Expire::True,
            }
        }
        older_than(now, stats.created, self.c_time)
            || older_than(now, stats.effective_modified(), self.m_time)
            || older_than(now, stats.effective_accessed(), self.a_time)
    }
}

/// Like [`AgeExpirer`] but the item expires only when *all* configured
/// thresholds agree. Predicates run last: a `False` verdict clears the
/// decision, a `True` verdict sets it even when a time check disagreed,
/// and `Null` abstains.
pub struct AgeExpirerRequireAll<T> {
    c_time: Option<Duration>,
    m_time: Option<Duration>,
    a_time: Option<Duration>,
    predicates: Vec<ExpireFn<T>>,
}

impl<T> AgeExpirerRequireAll<T> {
    pub fn new(
        c_time: Option<Duration>,
        m_time: Option<Duration>,
        a_time: Option<Duration>,
    ) -> Self {
        Self {
            c_time,
            m_time,
            a_time,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: ExpireFn<T>) -> Self {
        self.predicates.push(predicate);
        self
    }
}

impl<T: Send + Sync> Expirer<T> for AgeExpirerRequireAll<T> {
    fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool {
        let mut expired = true;
        if self.c_time.is_some() && !older_than(now, stats.created, self.c_time) {
            expired = false;
        }
        if self.m_time.is_some() && !older_than(now, stats.effective_modified(), self.m_time) {
            expired = false;
        }
        if self.a_time.is_some() && !older_than(now, stats.effective_accessed(), self.a_time) {
            expired = false;
        }
        for predicate in &self.predicates {
            match predicate(item, now, stats) {
                Expire::False => expired = false,
                Expire::True => expired = true,
                Expire::Null => {}
            }
        }
        expired
    }
}

/// Spawn the background sweep ticker for a store.
///
/// The ticker waits a short grace period for an explicit interval, then
/// sweeps on every tick until the store is dropped. Reconfiguration
/// arrives over the channel.
pub(crate) fn spawn_expiry_ticker<T>(core: Weak<Core<T>>, intervals: Receiver<Duration>)
where
    T: Send + Sync + fmt::Debug + 'static,
{
    thread::Builder::new()
        .name("cinnabar-expiry".into())
        .spawn(move || {
            let mut interval = match intervals.recv_timeout(EXPIRE_CONFIG_GRACE) {
                Ok(configured) => configured,
                Err(RecvTimeoutError::Timeout) => DEFAULT_EXPIRE_INTERVAL,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            loop {
                match intervals.recv_timeout(interval) {
                    Ok(configured) => {
                        interval = configured;
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let Some(core) = core.upgrade() else { return };
                let expired = core.expire();
                if expired > 0 {
                    tracing::debug!(expired, "expiry sweep removed items");
                }
            }
        })
        .expect("failed to spawn expiry ticker");
}
