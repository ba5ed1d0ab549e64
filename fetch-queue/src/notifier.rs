//! Waking the dispatcher when new work arrives.
//!
//! A wake stores at most one permit, so any number of enqueues made while nobody is listening
//! collapse into a single wake.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    wake: Notify,
    dispatcher_running: AtomicBool,
}

impl Notifier {
    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    /// Resolves on the next wake, or at once if a wake arrived since the last call.
    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }

    /// Reserve the single dispatcher slot, `None` if a dispatcher already holds it.
    ///
    /// The slot is released when the returned guard is dropped.
    pub(crate) fn claim_dispatcher(self: &Arc<Self>) -> Option<DispatcherGuard> {
        self.dispatcher_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DispatcherGuard(self.clone()))
    }
}

#[derive(Debug)]
pub(crate) struct DispatcherGuard(Arc<Notifier>);

impl DispatcherGuard {
    pub(crate) fn notifier(&self) -> Arc<Notifier> {
        self.0.clone()
    }
}

impl Drop for DispatcherGuard {
    fn drop(&mut self) {
        self.0.dispatcher_running.store(false, Ordering::Release);
    }
}
