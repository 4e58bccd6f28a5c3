//! Forced sign-out after a quiet period without user activity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::context::{SessionContext, TeardownReason};

const SIGNAL_BUFFER: usize = 64;

/// A qualifying user-activity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerMove,
    KeyPress,
    Scroll,
    Other,
}

/// Tears the session down once no activity was reported for `quiet_period`
#[derive(Debug)]
pub struct IdleMonitor {
    ctx: Arc<SessionContext>,
    quiet_period: Duration,
}

impl IdleMonitor {
    pub fn new(ctx: Arc<SessionContext>, quiet_period: Duration) -> Self {
        Self { ctx, quiet_period }
    }

    pub fn from_config(ctx: Arc<SessionContext>, config: &SessionConfig) -> Self {
        Self::new(ctx, config.idle_timeout)
    }

    /// Arm the deadline. Monitoring lasts until the returned handle is
    /// cancelled or dropped, or until the deadline fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> IdleHandle {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        debug!(quiet_period = ?self.quiet_period, "Idle monitor started");
        let task = tokio::spawn(self.run(rx));
        IdleHandle {
            signals: tx,
            task: Some(task),
        }
    }

    async fn run(self, mut signals: mpsc::Receiver<ActivitySignal>) {
        let deadline = time::sleep(self.quiet_period);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => break,
                // Disabled once every sender is gone; the deadline still runs
                Some(_) = signals.recv() => {
                    deadline.as_mut().reset(Instant::now() + self.quiet_period);
                }
            }
        }

        info!(quiet_period = ?self.quiet_period, "No activity, signing out");
        self.ctx.teardown(TeardownReason::IdleTimeout);
    }
}

/// Handle of a running [`IdleMonitor`].
///
/// Cancelling consumes the handle, so it happens at most once. Dropping the
/// handle cancels as well.
#[derive(Debug)]
pub struct IdleHandle {
    signals: mpsc::Sender<ActivitySignal>,
    task: Option<JoinHandle<()>>,
}

impl IdleHandle {
    /// A listener to attach to an input source
    pub fn listener(&self) -> ActivityListener {
        ActivityListener {
            signals: self.signals.clone(),
        }
    }

    /// Whether the deadline already fired or the monitor was stopped
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop monitoring: the pending deadline is dropped and every listener
    /// handed out becomes inert.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Idle monitor cancelled");
        }
    }
}

impl Drop for IdleHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reports activity to an [`IdleMonitor`]
#[derive(Debug, Clone)]
pub struct ActivityListener {
    signals: mpsc::Sender<ActivitySignal>,
}

impl ActivityListener {
    /// Reset the idle deadline. Returns false once the monitor has stopped.
    pub fn record(&self, signal: ActivitySignal) -> bool {
        match self.signals.try_send(signal) {
            Ok(()) => true,
            // A full buffer already holds a pending reset
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionEvent;
    use crate::credential::Credential;

    const QUIET: Duration = Duration::from_secs(30 * 60);

    fn signed_in() -> Arc<SessionContext> {
        let ctx = Arc::new(SessionContext::in_memory());
        ctx.sign_in(Credential::new("access", Some("refresh".to_string())));
        ctx
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_quiet_period() {
        let ctx = signed_in();
        let mut events = ctx.subscribe();
        let handle = IdleMonitor::new(Arc::clone(&ctx), QUIET).start();

        time::sleep(QUIET - Duration::from_secs(1)).await;
        assert!(ctx.credentials().get().is_some());

        time::sleep(Duration::from_secs(2)).await;
        assert!(ctx.credentials().get().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Ended(TeardownReason::IdleTimeout)
        );
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_the_deadline() {
        let ctx = signed_in();
        let handle = IdleMonitor::new(Arc::clone(&ctx), QUIET).start();
        let listener = handle.listener();

        for signal in [
            ActivitySignal::PointerMove,
            ActivitySignal::KeyPress,
            ActivitySignal::Scroll,
        ] {
            time::sleep(QUIET - Duration::from_secs(60)).await;
            assert!(listener.record(signal));
        }
        time::sleep(QUIET - Duration::from_secs(60)).await;
        assert!(ctx.credentials().get().is_some());

        time::sleep(Duration::from_secs(61)).await;
        assert!(ctx.credentials().get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_deadline_and_detaches_listeners() {
        let ctx = signed_in();
        let handle = IdleMonitor::new(Arc::clone(&ctx), QUIET).start();
        let listener = handle.listener();

        handle.cancel();
        time::sleep(QUIET * 2).await;

        assert!(ctx.credentials().get().is_some());
        assert!(!listener.record(ActivitySignal::Other));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let ctx = signed_in();
        drop(IdleMonitor::new(Arc::clone(&ctx), QUIET).start());

        time::sleep(QUIET * 2).await;
        assert!(ctx.credentials().get().is_some());
    }
}
