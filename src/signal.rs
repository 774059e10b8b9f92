//! Signal plumbing.
//!
//! Two paths feed the execution thread:
//! - [`PendingSignals`] sets a flag per trapped signal; the executor drains
//!   the flags between commands and runs the trap actions.
//! - [`ChildReaper`] is woken by SIGCHLD on a listener thread and reaps the
//!   background pids it was asked to watch, recording `(pid, status)` pairs.
//!   Job bookkeeping happens later, on the execution thread.

use anyhow::Result;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Signals a `trap` may name, besides the `EXIT` pseudo-signal.
pub const TRAPPABLE: &[(&str, i32)] = &[
    ("HUP", SIGHUP),
    ("INT", SIGINT),
    ("QUIT", SIGQUIT),
    ("USR1", SIGUSR1),
    ("USR2", SIGUSR2),
    ("TERM", SIGTERM),
];

/// Accepts `INT`, `SIGINT`, `int` or `2`.
pub fn signal_number(spec: &str) -> Option<i32> {
    if let Ok(n) = spec.parse::<i32>() {
        return TRAPPABLE.iter().any(|(_, num)| *num == n).then_some(n);
    }
    let upper = spec.to_ascii_uppercase();
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    TRAPPABLE.iter().find(|(n, _)| *n == name).map(|(_, num)| *num)
}

pub fn signal_name(number: i32) -> Option<&'static str> {
    TRAPPABLE.iter().find(|(_, n)| *n == number).map(|(name, _)| *name)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-signal "arrived" flags, registered lazily as traps are set.
#[derive(Debug, Clone, Default)]
pub struct PendingSignals {
    flags: Arc<Mutex<HashMap<i32, Arc<AtomicBool>>>>,
}

impl PendingSignals {
    /// Start recording `signal`. Safe to call more than once.
    pub fn watch(&self, signal: i32) -> Result<()> {
        let mut flags = lock(&self.flags);
        if flags.contains_key(&signal) {
            return Ok(());
        }
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal, Arc::clone(&flag))?;
        tracing::debug!(signal, "watching signal");
        flags.insert(signal, flag);
        Ok(())
    }

    pub fn is_watched(&self, signal: i32) -> bool {
        lock(&self.flags).contains_key(&signal)
    }

    /// Signals that arrived since the last call, lowest number first.
    pub fn take(&self) -> Vec<i32> {
        let flags = lock(&self.flags);
        let mut arrived: Vec<i32> = flags
            .iter()
            .filter(|(_, flag)| flag.swap(false, Ordering::SeqCst))
            .map(|(signal, _)| *signal)
            .collect();
        arrived.sort_unstable();
        arrived
    }

    #[cfg(test)]
    fn raise_for_test(&self, signal: i32) {
        if let Some(flag) = lock(&self.flags).get(&signal) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct ReaperState {
    watched: HashSet<i32>,
    events: Vec<(i32, WaitStatus)>,
}

/// Reaps watched background children and queues their state changes.
#[derive(Debug, Clone, Default)]
pub struct ChildReaper {
    state: Arc<Mutex<ReaperState>>,
}

impl ChildReaper {
    pub fn watch(&self, pid: i32) {
        lock(&self.state).watched.insert(pid);
    }

    pub fn unwatch(&self, pid: i32) {
        lock(&self.state).watched.remove(&pid);
    }

    /// Poll every watched pid without blocking. The lock is held across
    /// `waitpid` so a status is never collected by two callers.
    pub fn reap(&self) {
        let mut state = lock(&self.state);
        let pids: Vec<i32> = state.watched.iter().copied().collect();
        for pid in pids {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match waitpid(Pid::from_raw(pid), Some(flags)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(status) => {
                    if matches!(status, WaitStatus::Exited(..) | WaitStatus::Signaled(..)) {
                        state.watched.remove(&pid);
                    }
                    state.events.push((pid, status));
                }
                Err(nix::errno::Errno::ECHILD) => {
                    // collected elsewhere; report a plain exit
                    state.watched.remove(&pid);
                    state.events.push((pid, WaitStatus::Exited(Pid::from_raw(pid), 0)));
                }
                Err(_) => {}
            }
        }
    }

    /// Take the queued state changes.
    pub fn drain(&self) -> Vec<(i32, WaitStatus)> {
        std::mem::take(&mut lock(&self.state).events)
    }

    /// Reap on every SIGCHLD from a background thread.
    pub fn spawn_listener(&self) -> Result<()> {
        let mut signals = Signals::new([SIGCHLD])?;
        let reaper = self.clone();
        thread::Builder::new()
            .name("marsh-sigchld".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    reaper.reap();
                }
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_signal_number_forms() {
        assert_eq!(signal_number("INT"), Some(SIGINT));
        assert_eq!(signal_number("sigterm"), Some(SIGTERM));
        assert_eq!(signal_number("1"), Some(SIGHUP));
        assert_eq!(signal_number("KILL"), None);
        assert_eq!(signal_name(SIGUSR1), Some("USR1"));
    }

    #[test]
    fn test_pending_signals_take_clears() {
        let pending = PendingSignals::default();
        pending.watch(SIGUSR2).unwrap();
        assert!(pending.is_watched(SIGUSR2));
        pending.raise_for_test(SIGUSR2);
        assert_eq!(pending.take(), vec![SIGUSR2]);
        assert!(pending.take().is_empty());
    }

    #[test]
    fn test_reaper_collects_watched_child() {
        let child = Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        let reaper = ChildReaper::default();
        reaper.watch(pid);
        let mut events = Vec::new();
        for _ in 0..200 {
            reaper.reap();
            events.extend(reaper.drain());
            if !events.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(matches!(events.as_slice(), [(p, WaitStatus::Exited(_, 0))] if *p == pid));
    }
}
