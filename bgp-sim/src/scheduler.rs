//! Defers an outbound send by a fixed offset to model link latency and to
//! avoid lock-step races between routers that would otherwise all react to
//! the same tick synchronously. Each entry fires exactly once.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

/// Schedules work at an offset from "now", delivering it back through a
/// router's own inbox channel so the eventual send is still serialised by
/// the owning router's event loop rather than racing it.
#[derive(Debug, Clone)]
pub struct DelayScheduler<M> {
    tx: UnboundedSender<M>,
}

impl<M: Send + 'static> DelayScheduler<M> {
    pub fn new(tx: UnboundedSender<M>) -> Self {
        Self { tx }
    }

    /// Enqueues `msg` to arrive on the owning router's inbox `offset_ms`
    /// milliseconds from now.
    pub fn schedule(&self, offset_ms: u64, msg: M) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if offset_ms > 0 {
                tokio::time::sleep(Duration::from_millis(offset_ms)).await;
            }
            let _ = tx.send(msg);
        });
    }

    /// Runs `make_msg` after the delay instead of sending a precomputed
    /// value, for callers that need to capture state by the time the delay
    /// elapses rather than at schedule time.
    pub fn schedule_with<F, Fut>(&self, offset_ms: u64, make_msg: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = M> + Send,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if offset_ms > 0 {
                tokio::time::sleep(Duration::from_millis(offset_ms)).await;
            }
            let msg = make_msg().await;
            let _ = tx.send(msg);
        });
    }
}

/// Standard delays used across the router's dispatcher and link model.
pub mod offsets {
    pub const LINK_DELAY_MS: u64 = 200;
    pub const OPENCONFIRM_KEEPALIVE_MS: u64 = 10_000;
    pub const ESTABLISHED_KEEPALIVE_MS: u64 = 15_000;
    pub const TRUSTRATE_CADENCE_MS: u64 = 15_000;
}
