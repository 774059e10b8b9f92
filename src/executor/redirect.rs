//! Redirections.
//!
//! [`RedirectGuard`] records the descriptors it replaces and puts them back
//! when dropped, so a redirected builtin, function or compound command
//! leaves the shell's own descriptors as they were on every exit path.

use super::Executor;
use crate::error::ShellError;
use crate::expansion;
use crate::parser::ast::{Redirect, RedirectKind};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::IntoRawFd;

/// Saved copies are placed at or above this descriptor.
const SAVE_FD_BASE: i32 = 10;

#[derive(Debug, Default)]
pub struct RedirectGuard {
    /// Original descriptor and its saved copy; `None` when it was closed.
    saved: Vec<(i32, Option<i32>)>,
}

impl RedirectGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn save(&mut self, fd: i32) {
        if self.saved.iter().any(|(saved, _)| *saved == fd) {
            return;
        }
        let copy = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, SAVE_FD_BASE) };
        self.saved.push((fd, (copy >= 0).then_some(copy)));
    }

    /// Make `fd` refer to what `source` refers to.
    pub fn dup_to(&mut self, source: i32, fd: i32) -> std::io::Result<()> {
        if source == fd {
            // make sure it is open
            if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
                return Err(std::io::Error::last_os_error());
            }
            self.save(fd);
            return Ok(());
        }
        self.save(fd);
        if unsafe { libc::dup2(source, fd) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Install an owned descriptor at `fd`, closing the original.
    pub fn install(&mut self, owned: i32, fd: i32) -> std::io::Result<()> {
        let result = self.dup_to(owned, fd);
        if owned != fd {
            unsafe { libc::close(owned) };
        }
        result
    }

    pub fn close(&mut self, fd: i32) {
        self.save(fd);
        unsafe { libc::close(fd) };
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        for (fd, copy) in self.saved.drain(..).rev() {
            unsafe {
                match copy {
                    Some(copy) => {
                        libc::dup2(copy, fd);
                        libc::close(copy);
                    }
                    None => {
                        libc::close(fd);
                    }
                }
            }
        }
    }
}

fn open_file(path: &str, kind: RedirectKind, noclobber: bool) -> std::io::Result<i32> {
    let mut options = OpenOptions::new();
    options.mode(0o666);
    match kind {
        RedirectKind::Input => {
            options.read(true);
        }
        RedirectKind::Output | RedirectKind::OutputBoth if noclobber => {
            if std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "cannot overwrite existing file",
                ));
            }
            options.write(true).create(true).truncate(true);
        }
        RedirectKind::Output
        | RedirectKind::Clobber
        | RedirectKind::OutputBoth
        | RedirectKind::DupOutput => {
            options.write(true).create(true).truncate(true);
        }
        RedirectKind::Append | RedirectKind::AppendBoth => {
            options.append(true).create(true);
        }
        RedirectKind::ReadWrite => {
            options.read(true).write(true).create(true);
        }
        RedirectKind::HereDoc | RedirectKind::HereString | RedirectKind::DupInput => {
            options.read(true);
        }
    }
    Ok(options.open(path)?.into_raw_fd())
}

/// A descriptor holding `content`, positioned at its start.
fn here_document(content: &str) -> std::io::Result<i32> {
    let mut file = tempfile::tempfile()?;
    file.write_all(content.as_bytes())?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file.into_raw_fd())
}

pub(crate) fn describe(err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
        std::io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        std::io::ErrorKind::AlreadyExists => "cannot overwrite existing file".to_string(),
        _ => match err.raw_os_error() {
            Some(libc::EBADF) => "Bad file descriptor".to_string(),
            Some(libc::EISDIR) => "Is a directory".to_string(),
            _ => err.to_string(),
        },
    }
}

impl Executor {
    /// Apply `redirects` in order. On failure the descriptors already
    /// changed are restored before the error is returned.
    pub fn apply_redirects(&mut self, redirects: &[Redirect]) -> Result<RedirectGuard, ShellError> {
        let mut guard = RedirectGuard::new();
        for redirect in redirects {
            self.apply_redirect(redirect, &mut guard)?;
        }
        Ok(guard)
    }

    fn apply_redirect(
        &mut self,
        redirect: &Redirect,
        guard: &mut RedirectGuard,
    ) -> Result<(), ShellError> {
        let fd = redirect.fd();
        let target = expansion::expand_string(self, &redirect.target)?;
        let fail = |err: std::io::Error| {
            tracing::debug!(target = %target, fd, error = %err, "redirection failed");
            ShellError::Redirect {
                target: target.clone(),
                message: describe(&err),
            }
        };
        let noclobber = self.runtime.options.noclobber;

        match redirect.kind {
            RedirectKind::HereDoc => {
                let owned = here_document(&target).map_err(fail)?;
                guard.install(owned, fd).map_err(fail)
            }
            RedirectKind::HereString => {
                let owned = here_document(&format!("{}\n", target)).map_err(fail)?;
                guard.install(owned, fd).map_err(fail)
            }
            RedirectKind::DupOutput | RedirectKind::DupInput => {
                if target == "-" {
                    guard.close(fd);
                    return Ok(());
                }
                let (digits, close_source) = match target.strip_suffix('-') {
                    Some(digits) => (digits, true),
                    None => (target.as_str(), false),
                };
                match digits.parse::<i32>() {
                    Ok(source) => {
                        guard.dup_to(source, fd).map_err(fail)?;
                        if close_source && source != fd {
                            guard.close(source);
                        }
                        Ok(())
                    }
                    // `>& file` is `&> file`
                    Err(_) if redirect.kind == RedirectKind::DupOutput && redirect.fd.is_none() => {
                        let owned =
                            open_file(&target, RedirectKind::Output, noclobber).map_err(fail)?;
                        guard.install(owned, 1).map_err(fail)?;
                        guard.dup_to(1, 2).map_err(fail)
                    }
                    Err(_) => Err(ShellError::Redirect {
                        target: target.clone(),
                        message: "ambiguous redirect".to_string(),
                    }),
                }
            }
            RedirectKind::OutputBoth | RedirectKind::AppendBoth => {
                let owned = open_file(&target, redirect.kind, noclobber).map_err(fail)?;
                guard.install(owned, 1).map_err(fail)?;
                guard.dup_to(1, 2).map_err(fail)
            }
            kind => {
                let owned = open_file(&target, kind, noclobber).map_err(fail)?;
                guard.install(owned, fd).map_err(fail)
            }
        }
    }
}
