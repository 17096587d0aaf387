//! Per-invocation scheduler state.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::{LoomError, Result};

/// State of one scheduler run, created when the queue starts and discarded on stop.
///
/// Stopping is cooperative: [`stop`](TaskRun::stop) only sets a flag that the loop checks
/// before each task and each attempt. An attempt already in flight runs to completion but
/// its result is not counted.
#[derive(Debug)]
pub struct TaskRun {
    stopped: AtomicBool,
    /// Successful attempts left before the next session throttle pause
    delay_count: AtomicU32,
    last_ip: Mutex<Option<String>>,
}

impl TaskRun {
    pub fn new(delay_count: u32) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            delay_count: AtomicU32::new(delay_count),
            last_ip: Mutex::new(None),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn delay_count(&self) -> u32 {
        self.delay_count.load(Ordering::SeqCst)
    }

    /// Count one success. Returns true when the throttle threshold is reached.
    pub fn count_success(&self) -> bool {
        let previous = self
            .delay_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous <= 1
    }

    pub fn reset_delay_count(&self, delay_count: u32) {
        self.delay_count.store(delay_count, Ordering::SeqCst);
    }

    pub fn last_ip(&self) -> Option<String> {
        self.last_ip.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Compare the caller's current external IP with the one first seen in this run.
    ///
    /// The first observation is recorded. A different later address replaces the record and,
    /// when `enforce` is set, fails with [`LoomError::IpChanged`]. An unknown address (`None`,
    /// probe failed) is ignored.
    pub fn observe_ip(&self, ip: Option<&str>, enforce: bool) -> Result<()> {
        let Some(ip) = ip else {
            return Ok(());
        };
        let mut last = self.last_ip.lock().unwrap_or_else(|e| e.into_inner());
        match last.replace(ip.to_string()) {
            Some(previous) if previous != ip && enforce => Err(LoomError::IpChanged {
                previous,
                current: ip.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
