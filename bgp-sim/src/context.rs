//! A `Timer` wrapper: a router owns one per peer for its retry/hold/
//! keepalive clocks, and drops it on leaving the state that started it.
//! Reader and send futures (`router.rs`'s `spawn_reader`/`send_packet`) are
//! each bounded by the TCP connection they read or write and complete on
//! their own, so they run as bare `tokio::spawn` tasks with no owner to hold
//! an abort handle.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug)]
enum TimerMessage {
    Refresh,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum TimerKind {
    Once,
    Repeat,
}

/// A 1 Hz-resolution countdown/repeat timer. Timers must never go negative
/// and reassignment must be atomic with respect to the tick; both fall out
/// of this being a single background task driven by
/// `tokio::time::interval` plus a refresh channel rather than wall-clock
/// subtraction.
#[derive(Debug)]
pub struct Timer {
    tx: UnboundedSender<TimerMessage>,
}

impl Timer {
    fn new<F, Fut>(duration: Duration, kind: TimerKind, mut cb: F) -> Timer
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(duration);
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        (cb)().await;
                        if kind == TimerKind::Once {
                            break;
                        }
                    }
                    message = rx.recv() => {
                        match message {
                            Some(TimerMessage::Refresh) => {
                                interval = tokio::time::interval(duration);
                                let _ = interval.tick().await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });
        Timer { tx }
    }

    /// Fires `cb` exactly once, `secs` seconds from now.
    pub fn once<F, Fut>(secs: u64, cb: F) -> Timer
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Timer::new(Duration::from_secs(secs.max(1)), TimerKind::Once, cb)
    }

    /// Fires `cb` every `secs` seconds until dropped.
    pub fn repeat<F, Fut>(secs: u64, cb: F) -> Timer
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Timer::new(Duration::from_secs(secs.max(1)), TimerKind::Repeat, cb)
    }

    /// Resets the countdown to its original duration, without changing
    /// which event it will eventually fire. Used on `KeepAliveMsg` /
    /// `UpdateMsg` receipt to refresh the hold timer.
    pub fn refresh(&self) {
        let _ = self.tx.send(TimerMessage::Refresh);
    }
}
