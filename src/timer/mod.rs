// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed deferred callbacks.
//!
//! [`TimerService`] keeps at most one pending timer per key. Scheduling under a
//! key that already has a timer aborts the old one. Every schedule returns a
//! fresh [`TimerToken`]; a callback receives its own token and can ask the
//! service (or its owner) whether it is still the current timer for the key.
//!
//! Aborting a tokio task only takes effect at an await point, so a callback
//! that already started runs to completion. Owners must therefore compare the
//! token against the current one before acting, under the same lock that
//! guards `schedule` and `cancel`.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    /// Returns the raw token value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

struct Pending {
    token: TimerToken,
    task: JoinHandle<()>,
}

/// Schedules one deferred callback per key on a tokio runtime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use noodle_hub::timer::TimerService;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let timers = TimerService::new(tokio::runtime::Handle::current());
///
/// let first = timers.schedule("prusa1", Duration::from_secs(60), |_| {});
/// let second = timers.schedule("prusa1", Duration::from_secs(60), |_| {});
///
/// assert_ne!(first, second);
/// assert_eq!(timers.pending_count(), 1);
/// assert!(timers.cancel(&"prusa1"));
/// # }
/// ```
pub struct TimerService<K> {
    runtime: Handle,
    next_token: AtomicU64,
    pending: Mutex<HashMap<K, Pending>>,
}

impl<K> TimerService<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    /// Creates a timer service spawning on the given runtime.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_token: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules `callback` to run after `delay`, replacing any timer under `key`.
    ///
    /// The callback receives the token returned here.
    pub fn schedule<F>(&self, key: K, delay: Duration, callback: F) -> TimerToken
    where
        F: FnOnce(TimerToken) + Send + 'static,
    {
        let token = TimerToken(self.next_token.fetch_add(1, Ordering::Relaxed));

        // Spawn while holding the map so a zero-delay callback cannot observe
        // the map before its own entry is in place.
        let mut pending = self.pending.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback(token);
        });

        if let Some(previous) = pending.insert(key.clone(), Pending { token, task }) {
            previous.task.abort();
            tracing::debug!(?key, replaced = %previous.token, %token, "Replaced timer");
        } else {
            tracing::debug!(?key, %token, delay_secs = delay.as_secs(), "Scheduled timer");
        }
        token
    }

    /// Cancels the timer under `key`.
    ///
    /// Returns `true` if a timer was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(previous) => {
                previous.task.abort();
                tracing::debug!(?key, token = %previous.token, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Retires the timer under `key` if `token` is still the current one.
    ///
    /// Called from a firing callback. Returns `false` if the timer was
    /// replaced or cancelled in the meantime.
    pub fn complete(&self, key: &K, token: TimerToken) -> bool {
        let mut pending = self.pending.lock();
        if pending.get(key).is_some_and(|p| p.token == token) {
            pending.remove(key);
            true
        } else {
            false
        }
    }

    /// Returns `true` if `token` is the current timer for `key`.
    #[must_use]
    pub fn is_current(&self, key: &K, token: TimerToken) -> bool {
        self.pending.lock().get(key).is_some_and(|p| p.token == token)
    }

    /// Returns `true` if a timer is pending under `key`.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Returns the number of pending timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&self) {
        for (_, previous) in self.pending.lock().drain() {
            previous.task.abort();
        }
    }
}

impl<K> Drop for TimerService<K> {
    fn drop(&mut self) {
        for (_, previous) in self.pending.get_mut().drain() {
            previous.task.abort();
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for TimerService<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("TimerService")
            .field("pending", &pending.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
