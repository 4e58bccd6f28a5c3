//! Single-flight coordination of access-token refreshes.
//!
//! When several requests see an expired access token at once, exactly one
//! refresh call is made and every request waits on its outcome. The
//! coordinator only holds the `refreshing` flag and the parked waiters; the
//! refresh call itself and the write-back live in [`crate::dispatcher`].

use std::mem;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::context::Generation;
use crate::errors::FatalSession;

/// New access token and the generation it was written under
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Renewed {
    pub access_token: String,
    pub generation: Generation,
}

pub(crate) type RefreshOutcome = Result<Renewed, FatalSession>;

pub(crate) type Waiter = oneshot::Receiver<RefreshOutcome>;

/// What a request that saw a 401 should do next
#[derive(Debug)]
pub(crate) enum Admission {
    /// The token it was sent with has already been replaced; retry with this one
    Current(Renewed),
    /// No refresh in flight: the caller starts one for the session of this
    /// generation and waits like everyone else
    Lead(Waiter, Generation),
    /// A refresh is in flight: wait for its outcome
    Wait(Waiter),
    /// The credential disappeared while the request was in flight
    Ended,
    /// Nothing was stored before or after: there is no session to recover
    SignedOut,
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how a request rejected with 401 proceeds.
    ///
    /// `sent_with` is the access token the rejected attempt carried and
    /// `current` reads the store's access token with its generation. Both
    /// reads and the state transition happen under the coordinator lock.
    pub fn admit(
        &self,
        sent_with: Option<&str>,
        current: impl FnOnce() -> (Option<String>, Generation),
    ) -> Admission {
        let mut state = self.lock();

        if state.refreshing {
            return Admission::Wait(Self::park(&mut state));
        }

        let (current, generation) = current();
        match (sent_with, current) {
            (Some(sent), Some(current)) if sent != current => Admission::Current(Renewed {
                access_token: current,
                generation,
            }),
            (None, Some(current)) => Admission::Current(Renewed {
                access_token: current,
                generation,
            }),
            (Some(_), None) => Admission::Ended,
            (None, None) => Admission::SignedOut,
            (Some(_), Some(_)) => {
                state.refreshing = true;
                Admission::Lead(Self::park(&mut state), generation)
            }
        }
    }

    /// Resolve or reject every parked waiter and return to idle.
    ///
    /// The queue is taken and the flag cleared in one critical section, so
    /// an arrival after this point starts from a clean state instead of
    /// joining a queue that is being drained. Returns how many waiters were
    /// woken.
    pub fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.refreshing = false;
            mem::take(&mut state.waiters)
        };

        let woken = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped
            let _ = waiter.send(outcome.clone());
        }
        woken
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    fn park(state: &mut RefreshState) -> Waiter {
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        rx
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Settles the episode when the refresh task ends, whatever way it ends.
///
/// If the task is dropped or panics before calling [`SettleGuard::settle`],
/// the waiters are rejected with [`FatalSession::Abandoned`] and the flag is
/// cleared, so the coordinator can never stay stuck in the refreshing state.
pub(crate) struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl<'a> SettleGuard<'a> {
    pub fn new(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            armed: true,
        }
    }

    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.armed = false;
        self.coordinator.settle(outcome)
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Refresh ended without settling, rejecting waiters");
            self.coordinator.settle(Err(FatalSession::Abandoned));
        }
    }
}
