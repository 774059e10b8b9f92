//! Forking, `execve` and waiting.
//!
//! Everything here works on raw descriptors: the shell never buffers its own
//! output, so a fork can never duplicate pending writes.

use super::Executor;
use crate::error::ShellError;
use crate::jobs::JobTable;
use crate::terminal::TerminalControl;
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execve, fork, getpid, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Write all of `data` to `fd`, retrying on `EINTR`.
pub fn write_fd(fd: i32, data: &[u8]) -> std::io::Result<()> {
    let mut written = 0;
    while written < data.len() {
        let rest = &data[written..];
        let n = unsafe { libc::write(fd, rest.as_ptr() as *const libc::c_void, rest.len()) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        written += n as usize;
    }
    Ok(())
}

/// Read `fd` until end of file.
pub fn read_to_end(fd: i32) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Locate `name` on `path`. Names containing `/` are used as given.
pub fn find_in_path(name: &str, path: Option<&str>) -> Option<PathBuf> {
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }
    path.unwrap_or(DEFAULT_PATH)
        .split(':')
        .map(|dir| Path::new(if dir.is_empty() { "." } else { dir }).join(name))
        .find(|candidate| is_executable(candidate))
}

/// Why `execve` returned.
#[derive(Debug)]
pub enum ExecFailure {
    NotFound(String),
    /// Not executable, or the kernel rejected it; status 126.
    Denied(String, String),
    /// No interpreter line: the file is run as a marsh script.
    NotBinary(PathBuf),
}

fn cstring(text: &str) -> Result<CString, ExecFailure> {
    CString::new(text).map_err(|_| {
        ExecFailure::Denied(text.to_string(), "argument contains a NUL byte".to_string())
    })
}

/// Replace the current process with `argv[0]`. Only returns on failure.
pub fn exec_program(argv: &[String], env: &[(String, String)], path: Option<&str>) -> ExecFailure {
    let name = &argv[0];
    let Some(program) = find_in_path(name, path) else {
        return ExecFailure::NotFound(name.clone());
    };
    let args: Result<Vec<CString>, ExecFailure> = argv.iter().map(|a| cstring(a)).collect();
    let envp: Result<Vec<CString>, ExecFailure> =
        env.iter().map(|(k, v)| cstring(&format!("{}={}", k, v))).collect();
    let (args, envp) = match (args, envp) {
        (Ok(args), Ok(envp)) => (args, envp),
        (Err(err), _) | (_, Err(err)) => return err,
    };
    let program_c = match cstring(&program.to_string_lossy()) {
        Ok(p) => p,
        Err(err) => return err,
    };
    match execve(&program_c, &args, &envp) {
        Err(Errno::ENOEXEC) => ExecFailure::NotBinary(program),
        Err(Errno::ENOENT) => ExecFailure::NotFound(name.clone()),
        Err(err) => ExecFailure::Denied(name.clone(), err.desc().to_string()),
        Ok(never) => match never {},
    }
}

fn status_of(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

impl Executor {
    /// Job control is on: pipelines get their own process groups.
    pub(crate) fn job_control(&self) -> bool {
        self.runtime.options.monitor && self.terminal.is_enabled()
    }

    /// Fork a copy of the shell that runs `body` and exits with its status.
    /// `pgid` is the group to join, `None` to lead a new one; groups are
    /// only used under job control.
    pub(crate) fn fork_child<F>(
        &mut self,
        pgid: Option<i32>,
        foreground: bool,
        body: F,
    ) -> Result<i32, ShellError>
    where
        F: FnOnce(&mut Executor) -> i32,
    {
        let job_control = self.job_control();
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                if job_control {
                    let pid = getpid();
                    let group = pgid.map(Pid::from_raw).unwrap_or(pid);
                    let _ = setpgid(pid, group);
                    if foreground {
                        let _ = self.terminal.give_to(group.as_raw());
                    }
                }
                self.enter_child();
                let status = body(self);
                self.exit_child(status)
            }
            Ok(ForkResult::Parent { child }) => {
                if job_control {
                    let group = pgid.map(Pid::from_raw).unwrap_or(child);
                    let _ = setpgid(child, group);
                }
                tracing::trace!(pid = child.as_raw(), ?pgid, "forked");
                Ok(child.as_raw())
            }
            Err(err) => Err(ShellError::exec("fork", err.desc(), 1)),
        }
    }

    fn enter_child(&mut self) {
        TerminalControl::reset_child_signals();
        self.terminal = TerminalControl::disabled();
        self.runtime.options.monitor = false;
        self.runtime.interactive = false;
        self.runtime.jobs = JobTable::new();
        // ignored signals stay ignored in subshells
        self.runtime.traps.retain(|_, action| action.is_empty());
        self.forked = true;
    }

    /// Leave a forked child without running any Rust destructors.
    pub(crate) fn exit_child(&mut self, status: i32) -> ! {
        let status = self.run_exit_trap(status);
        unsafe { libc::_exit(status & 0xff) }
    }

    /// Background children without job control must not see keyboard
    /// interrupts meant for the foreground.
    pub(crate) fn ignore_interrupts() {
        for sig in [Signal::SIGINT, Signal::SIGQUIT] {
            let _ = unsafe { signal(sig, SigHandler::SigIgn) };
        }
    }

    /// Exec `argv` in this (already forked) process. Returns the failure
    /// status when the program could not be started.
    pub(crate) fn exec_in_child(&mut self, argv: &[String], env: &[(String, String)]) -> i32 {
        let path = self.runtime.get("PATH");
        match exec_program(argv, env, path.as_deref()) {
            ExecFailure::NotFound(name) => {
                self.report(&ShellError::exec(name, "command not found", 127));
                127
            }
            ExecFailure::Denied(name, message) => {
                self.report(&ShellError::exec(name, message, 126));
                126
            }
            ExecFailure::NotBinary(program) => {
                tracing::debug!(program = %program.display(), "running file as a script");
                let args = argv[1..].to_vec();
                self.run_script_file(&program, &argv[0], args)
            }
        }
    }

    /// Block until every pid in a foreground pipeline finishes or stops.
    /// A stopped pipeline becomes a job.
    pub(crate) fn wait_foreground(
        &mut self,
        pgid: i32,
        pids: &[i32],
        description: &str,
    ) -> Vec<i32> {
        let mut statuses = Vec::with_capacity(pids.len());
        let mut stopped = Vec::new();
        for &pid in pids {
            let status = loop {
                match waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WUNTRACED)) {
                    Ok(WaitStatus::Stopped(_, sig)) => {
                        stopped.push((pid, sig));
                        break 128 + sig as i32;
                    }
                    Ok(status) => {
                        if let Some(code) = status_of(status) {
                            if matches!(status, WaitStatus::Signaled(_, Signal::SIGINT, _))
                                && self.runtime.interactive
                            {
                                let _ = write_fd(2, b"\n");
                            }
                            break code;
                        }
                    }
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) => {
                        break self.runtime.jobs.take_reaped_status(pid).unwrap_or(0)
                    }
                    Err(err) => {
                        tracing::warn!(pid, error = %err, "waitpid failed");
                        break 1;
                    }
                }
            };
            statuses.push(status);
        }

        if let Err(err) = self.terminal.reclaim() {
            tracing::warn!(error = %err, "terminal reclaim failed");
        }

        if !stopped.is_empty() {
            let id = self
                .runtime
                .jobs
                .add(pgid, pids, description.to_string(), self.job_control());
            for (pid, status) in pids.iter().zip(&statuses) {
                let state = match stopped.iter().find(|(p, _)| p == pid) {
                    Some((_, sig)) => WaitStatus::Stopped(Pid::from_raw(*pid), *sig),
                    None => WaitStatus::Exited(Pid::from_raw(*pid), *status),
                };
                self.runtime.jobs.apply(*pid, state);
            }
            let marker = self.runtime.jobs.marker(id);
            let line = format!("\n[{}]{}  Stopped                 {}\n", id, marker, description);
            let _ = write_fd(2, line.as_bytes());
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, "").unwrap();

        let path = format!("/nonexistent:{}", dir.path().display());
        assert_eq!(find_in_path("tool", Some(&path)), Some(tool));
        assert_eq!(find_in_path("plain", Some(&path)), None);
        assert_eq!(find_in_path("./x/y", Some(&path)), Some(PathBuf::from("./x/y")));
    }

    #[test]
    fn test_exec_failure_not_found() {
        let argv = vec!["marsh-no-such-command".to_string()];
        match exec_program(&argv, &[], Some("/nonexistent")) {
            ExecFailure::NotFound(name) => assert_eq!(name, "marsh-no-such-command"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_write_and_read_pipe() {
        let (reader, writer) = os_pipe::pipe().unwrap();
        use std::os::unix::io::AsRawFd;
        write_fd(writer.as_raw_fd(), b"hello").unwrap();
        drop(writer);
        assert_eq!(read_to_end(reader.as_raw_fd()).unwrap(), b"hello");
    }
}
