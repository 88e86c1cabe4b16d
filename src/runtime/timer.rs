//! One-shot timers for delayed play.
//!
//! A timer never touches runtime state directly. When it fires it enqueues a
//! [`RuntimeCommand::ResumeChannel`], which the runtime applies at the start of
//! its next tick like any other command.

use crate::runtime::command::{CommandSender, RuntimeCommand};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Trait for scheduling a command after a delay.
pub trait DelayScheduler: Send {
    fn schedule(&self, delay: Duration, sender: CommandSender, command: RuntimeCommand);
}

/// Scheduler that sleeps on a short-lived thread per timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl DelayScheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, sender: CommandSender, command: RuntimeCommand) {
        thread::spawn(move || {
            thread::sleep(delay);
            if let Err(e) = sender.send(command) {
                tracing::debug!(error = %e, "Dropped delayed command");
            }
        });
    }
}

struct Pending {
    delay: Duration,
    sender: CommandSender,
    command: RuntimeCommand,
}

/// Scheduler that holds timers until told to fire them (useful for testing).
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Pending>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Delays of the timers still waiting, in scheduling order.
    pub fn delays(&self) -> Vec<Duration> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.delay)
            .collect()
    }

    /// Fire every pending timer now. Returns how many fired.
    pub fn fire_all(&self) -> usize {
        let fired: Vec<Pending> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let count = fired.len();
        for p in fired {
            if let Err(e) = p.sender.send(p.command) {
                tracing::debug!(error = %e, "Dropped delayed command");
            }
        }
        count
    }
}

impl DelayScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, sender: CommandSender, command: RuntimeCommand) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Pending {
                delay,
                sender,
                command,
            });
    }
}

impl<S: DelayScheduler + Sync> DelayScheduler for std::sync::Arc<S> {
    fn schedule(&self, delay: Duration, sender: CommandSender, command: RuntimeCommand) {
        (**self).schedule(delay, sender, command);
    }
}
