//! Controlling-terminal ownership for job control.

use anyhow::{anyhow, Result};
use nix::libc;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{getpgrp, getpid, setpgid, Pid};
use std::os::unix::io::RawFd;

/// Signals an interactive shell ignores while it owns the terminal.
const JOB_CONTROL_SIGNALS: &[Signal] = &[
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGQUIT,
];

#[derive(Debug, Clone)]
pub struct TerminalControl {
    shell_pgid: Pid,
    terminal_fd: RawFd,
    enabled: bool,
}

impl Default for TerminalControl {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TerminalControl {
    /// No terminal handoff; used for scripts and subshells.
    pub fn disabled() -> Self {
        Self {
            shell_pgid: getpgrp(),
            terminal_fd: libc::STDIN_FILENO,
            enabled: false,
        }
    }

    /// Put the shell in its own process group and take the terminal.
    /// Falls back to a disabled controller when stdin is not a terminal.
    pub fn acquire() -> Result<Self> {
        let terminal_fd = libc::STDIN_FILENO;
        if unsafe { libc::isatty(terminal_fd) } != 1 {
            return Ok(Self::disabled());
        }

        // wait until we are in the foreground
        loop {
            let foreground = tcgetpgrp_raw(terminal_fd)?;
            let own = getpgrp();
            if foreground == own.as_raw() {
                break;
            }
            nix::sys::signal::kill(Pid::from_raw(-own.as_raw()), Signal::SIGTTIN)?;
        }

        for sig in JOB_CONTROL_SIGNALS {
            unsafe { signal(*sig, SigHandler::SigIgn) }?;
        }

        let pid = getpid();
        if getpgrp() != pid {
            setpgid(pid, pid).map_err(|e| anyhow!("could not create process group: {}", e))?;
        }
        tcsetpgrp_raw(terminal_fd, pid.as_raw())?;
        tracing::debug!(pgid = pid.as_raw(), "terminal acquired");

        Ok(Self {
            shell_pgid: pid,
            terminal_fd,
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    /// Make `pgid` the terminal's foreground group.
    pub fn give_to(&self, pgid: i32) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        tcsetpgrp_raw(self.terminal_fd, pgid)
            .map_err(|e| anyhow!("could not give terminal to process group {}: {}", pgid, e))
    }

    /// Take the terminal back after a foreground job stops or finishes.
    pub fn reclaim(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        tcsetpgrp_raw(self.terminal_fd, self.shell_pgid.as_raw())
            .map_err(|e| anyhow!("could not reclaim terminal: {}", e))
    }

    /// Restore the dispositions the shell ignores in a freshly forked child.
    /// Handled signals are reset by `exec` itself.
    pub fn reset_child_signals() {
        let mut all = JOB_CONTROL_SIGNALS.to_vec();
        all.push(Signal::SIGPIPE);
        for sig in all {
            let _ = unsafe { signal(sig, SigHandler::SigDfl) };
        }
    }
}

fn tcgetpgrp_raw(fd: RawFd) -> Result<i32> {
    let pgid = unsafe { libc::tcgetpgrp(fd) };
    if pgid < 0 {
        Err(anyhow!("tcgetpgrp failed: {}", std::io::Error::last_os_error()))
    } else {
        Ok(pgid)
    }
}

fn tcsetpgrp_raw(fd: RawFd, pgid: i32) -> Result<()> {
    if unsafe { libc::tcsetpgrp(fd, pgid) } != 0 {
        Err(anyhow!("tcsetpgrp failed: {}", std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_controller_is_a_no_op() {
        let terminal = TerminalControl::disabled();
        assert!(!terminal.is_enabled());
        assert!(terminal.give_to(1).is_ok());
        assert!(terminal.reclaim().is_ok());
    }

    #[test]
    fn test_disabled_reports_own_group() {
        let terminal = TerminalControl::default();
        assert_eq!(terminal.shell_pgid(), getpgrp());
    }
}
