//! Refresh timer - a single re-armable timeout on its own thread
//!
//! The callback runs on the timer thread and decides whether the timer is
//! armed again. Arming replaces any pending deadline; there is never more than
//! one pending fire per timer.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, select, unbounded, Receiver, Sender};
use tracing::{debug, error};

/// What to do after the callback ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    After(Duration),
    Stop,
}

enum TimerCommand {
    Arm { delay: Duration, generation: u64 },
    Clear,
    Shutdown,
}

pub struct RefreshTimer {
    name: &'static str,
    tx: Option<Sender<TimerCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    /// Spawn the timer thread; nothing fires until [`RefreshTimer::arm`]
    ///
    /// The callback receives the generation the timer was armed with.
    pub fn spawn<F>(name: &'static str, on_fire: F) -> Self
    where
        F: FnMut(u64) -> Reschedule + Send + 'static,
    {
        let (tx, rx) = unbounded::<TimerCommand>();

        let handle = thread::Builder::new()
            .name(format!("timer-{}", name))
            .spawn(move || timer_thread(name, rx, on_fire));

        let thread_handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(timer = name, error = %e, "[timer] Failed to spawn thread");
                None
            }
        };

        Self {
            name,
            tx: thread_handle.as_ref().map(|_| tx),
            thread_handle,
        }
    }

    /// Fire once after `delay`, replacing any pending deadline
    pub fn arm(&self, delay: Duration, generation: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(TimerCommand::Arm { delay, generation });
        }
    }

    /// Cancel the pending deadline, keep the thread
    pub fn clear(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(TimerCommand::Clear);
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Cancel the pending deadline and stop the thread; idempotent
    ///
    /// Waits for a callback that is already running to return.
    pub fn destroy(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TimerCommand::Shutdown);
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Destroyed from inside its own callback: the loop exits on
                // the shutdown command once the callback returns.
                return;
            }
            let _ = handle.join();
            debug!(timer = self.name, "[timer] Stopped");
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn timer_thread<F>(name: &'static str, rx: Receiver<TimerCommand>, mut on_fire: F)
where
    F: FnMut(u64) -> Reschedule,
{
    let mut pending: Option<(Instant, u64)> = None;

    loop {
        let deadline = match pending {
            Some((at, _)) => after(at.saturating_duration_since(Instant::now())),
            None => never(),
        };

        select! {
            recv(rx) -> cmd => match cmd {
                Ok(TimerCommand::Arm { delay, generation }) => {
                    pending = Some((Instant::now() + delay, generation));
                }
                Ok(TimerCommand::Clear) => pending = None,
                Ok(TimerCommand::Shutdown) | Err(_) => break,
            },
            recv(deadline) -> _ => {
                if let Some((_, generation)) = pending.take() {
                    if let Reschedule::After(delay) = on_fire(generation) {
                        pending = Some((Instant::now() + delay, generation));
                    }
                }
            }
        }
    }

    debug!(timer = name, "[timer] Thread exiting");
}
