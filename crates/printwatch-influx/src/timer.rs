// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellable repeating timer.
//!
//! [`RepeatingTimer::start`] spawns a thread that waits on a stop channel
//! with a timeout of one interval and runs the callback on each timeout.
//! Dropping or cancelling the [`TimerHandle`] closes the channel.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Callback run on every tick.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Owner handle of a running timer. Cancels on drop.
pub struct TimerHandle {
    /// Dropping this disconnects the channel and stops the loop.
    stop_tx: Option<mpsc::Sender<()>>,
    interval: Duration,
}

impl TimerHandle {
    /// Stop the timer.
    ///
    /// Never joins: the tick running right now may be the caller, or may be
    /// waiting on a lock the caller holds. The thread exits at its next wait
    /// and no further tick fires.
    pub fn cancel(&mut self) {
        drop(self.stop_tx.take());
    }

    pub fn is_active(&self) -> bool {
        self.stop_tx.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Factory for repeating timers.
pub struct RepeatingTimer;

impl RepeatingTimer {
    /// Run `tick` every `interval` until the returned handle is cancelled.
    ///
    /// The first tick fires one interval after start.
    pub fn start(name: &str, interval: Duration, tick: TickFn) -> std::io::Result<TimerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => tick(),
                }
            })?;

        Ok(TimerHandle {
            stop_tx: Some(stop_tx),
            interval,
        })
    }
}
