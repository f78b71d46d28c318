//! TTL-bounded, sharded conversation store.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::turn::History;

/// Default time-to-live of a session after its last write (5 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Default period of the background sweep (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct SessionEntry {
    history: History,
    expires_at: Instant,
}

impl SessionEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe store mapping session identifiers to conversation history.
///
/// Entries are sharded, so operations on different sessions do not contend on
/// a single lock, while operations on one session are linearizable. An entry
/// is invisible to readers as soon as its expiry passes; the background
/// sweeper only reclaims the memory.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    entries: DashMap<String, SessionEntry>,
    ttl: Duration,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL)
    }
}

impl SessionStore {
    /// Create an empty store.
    ///
    /// `ttl` is applied by writers that do not pick their own; `sweep_interval`
    /// is the period used by [`SessionStore::start_sweeper`].
    #[must_use]
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                entries: DashMap::new(),
                ttl,
                sweep_interval,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Get the history of an unexpired session.
    ///
    /// Reading never extends the entry's lifetime.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<History> {
        let now = Instant::now();
        self.inner
            .entries
            .get(id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.history.clone())
    }

    /// Insert or replace a session, expiring `ttl` from now.
    pub fn put(&self, id: impl Into<String>, history: History, ttl: Duration) {
        let entry = SessionEntry {
            history,
            expires_at: Instant::now() + ttl,
        };
        self.inner.entries.insert(id.into(), entry);
    }

    /// Atomically replace a session's history with `f(current)`.
    ///
    /// `current` is `None` when the session is absent or expired. The result is
    /// stored with a fresh expiry of `ttl` from now. `f` runs while the shard
    /// holding `id` is write-locked and must not block.
    pub fn update<F>(&self, id: impl Into<String>, ttl: Duration, f: F)
    where
        F: FnOnce(Option<History>) -> History,
    {
        let now = Instant::now();
        match self.inner.entries.entry(id.into()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                let live = current.is_live(now).then(|| std::mem::take(&mut current.history));
                current.history = f(live);
                current.expires_at = now + ttl;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SessionEntry {
                    history: f(None),
                    expires_at: now + ttl,
                });
            }
        }
    }

    /// Remove a session, returning its history if it was still live.
    pub fn remove(&self, id: &str) -> Option<History> {
        let now = Instant::now();
        self.inner
            .entries
            .remove(id)
            .and_then(|(_, entry)| entry.is_live(now).then_some(entry.history))
    }

    /// Number of physically stored entries, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every expired entry. Returns the number removed.
    ///
    /// Shards are locked one at a time, so readers and writers of other shards
    /// proceed while the sweep runs.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.inner.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// The task runs until [`SessionStore::shutdown`] is called.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        tracing::debug!(
                            name: "session.sweep",
                            removed,
                            remaining = store.len(),
                            "Swept expired sessions"
                        );
                    }
                }
            }

            tracing::debug!(name: "session.sweeper.stopped", "Session sweeper stopped");
        })
    }

    /// Stop the background sweeper. Stored sessions stay readable.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}
