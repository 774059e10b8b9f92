use crate::error::{ExecResult, ShellError};
use crate::executor::pipeline::pipeline_status;
use crate::executor::Executor;
use crate::jobs::JobStatus;
use nix::sys::signal::Signal;

/// Resolve a job argument, defaulting to the current job.
fn resolve(exec: &mut Executor, builtin: &str, spec: Option<&String>) -> Result<usize, ShellError> {
    exec.runtime.jobs.refresh();
    let found = match spec {
        None => exec
            .runtime
            .jobs
            .current()
            .ok_or_else(|| "no current job".to_string()),
        Some(spec) => exec.runtime.jobs.parse_spec(spec),
    };
    found.map_err(|message| ShellError::exec(builtin, message, 1))
}

/// List background jobs
///
/// Usage:
/// - `jobs` - One line per job: number, marker, state and command
/// - `jobs -l` - Include process ids
/// - `jobs -p` - Process group leaders only
/// - `jobs -r` / `jobs -s` - Running or stopped jobs only
/// - `jobs %spec...` - Only the named jobs
pub fn builtin_jobs(exec: &mut Executor, args: &[String]) -> ExecResult {
    let mut show_pids = false;
    let mut pids_only = false;
    let mut filter: Option<fn(&JobStatus) -> bool> = None;
    let mut specs = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-l" => show_pids = true,
            "-p" => pids_only = true,
            "-r" => filter = Some(|s| *s == JobStatus::Running),
            "-s" => filter = Some(|s| *s == JobStatus::Stopped),
            flag if flag.starts_with('-') => {
                return Err(ShellError::exec("jobs", format!("{}: invalid option", flag), 2).into());
            }
            _ => specs.push(arg),
        }
    }

    exec.runtime.jobs.refresh();
    let ids: Vec<usize> = if specs.is_empty() {
        exec.runtime.jobs.list().iter().map(|job| job.id).collect()
    } else {
        let mut ids = Vec::new();
        for spec in specs {
            ids.push(resolve(exec, "jobs", Some(spec))?);
        }
        ids
    };

    let mut output = String::new();
    for id in ids {
        let Some(job) = exec.runtime.jobs.get(id) else {
            continue;
        };
        let status = job.status();
        if filter.is_some_and(|keep| !keep(&status)) {
            continue;
        }
        if pids_only {
            output.push_str(&format!("{}\n", job.pgid));
            continue;
        }
        let marker = exec.runtime.jobs.marker(id);
        let suffix = if status == JobStatus::Running { " &" } else { "" };
        if show_pids {
            let pids: Vec<String> = job.pids().iter().map(|p| p.to_string()).collect();
            output.push_str(&format!(
                "[{}]{} {} {:<22}{}{}\n",
                id,
                marker,
                pids.join(" "),
                status.describe(),
                job.command,
                suffix
            ));
        } else {
            output.push_str(&format!(
                "[{}]{}  {:<24}{}{}\n",
                id,
                marker,
                status.describe(),
                job.command,
                suffix
            ));
        }
    }
    exec.print(&output)?;

    // listing reports finished jobs, so they can be forgotten
    exec.runtime.jobs.take_finished();
    Ok(0)
}

/// Bring a job to the foreground and wait for it
///
/// The job is continued with SIGCONT and, under job control, given the
/// terminal. If it stops again it goes back into the job table.
pub fn builtin_fg(exec: &mut Executor, args: &[String]) -> ExecResult {
    let id = resolve(exec, "fg", args.first())?;
    let Some(job) = exec.runtime.jobs.remove(id) else {
        return Err(ShellError::exec("fg", format!("%{}: no such job", id), 1).into());
    };
    exec.print(&format!("{}\n", job.command))?;

    let pids = job.pids();
    tracing::debug!(job = id, pgid = job.pgid, "foreground");
    if exec.job_control() && job.own_group {
        if let Err(err) = exec.terminal().give_to(job.pgid) {
            tracing::warn!(error = %err, "could not hand over terminal");
        }
    }
    if !job.is_finished() {
        if let Err(err) = job.signal(Signal::SIGCONT) {
            tracing::debug!(error = %err, "SIGCONT failed");
        }
    }

    let statuses = exec.wait_foreground(job.pgid, &pids, &job.command);
    Ok(pipeline_status(&statuses, exec.runtime.options.pipefail))
}

/// Resume stopped jobs in the background
pub fn builtin_bg(exec: &mut Executor, args: &[String]) -> ExecResult {
    let specs: Vec<Option<&String>> = if args.is_empty() {
        vec![None]
    } else {
        args.iter().map(Some).collect()
    };

    let mut status = 0;
    for spec in specs {
        let id = match resolve(exec, "bg", spec) {
            Ok(id) => id,
            Err(err) => {
                exec.report(&err);
                status = 1;
                continue;
            }
        };
        let marker = exec.runtime.jobs.marker(id);
        let Some(job) = exec.runtime.jobs.get_mut(id) else {
            continue;
        };
        if let Err(err) = job.signal(Signal::SIGCONT) {
            let err = ShellError::exec("bg", format!("%{}: {}", id, err.desc()), 1);
            exec.report(&err);
            status = 1;
            continue;
        }
        job.mark_running();
        let line = format!("[{}]{} {} &\n", id, marker, job.command);
        exec.print(&line)?;
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Executor {
        let mut exec = Executor::default();
        exec.runtime.assign("PATH", "/usr/bin:/bin".to_string()).unwrap();
        exec
    }

    #[test]
    fn test_fg_waits_for_background_job() {
        let mut exec = shell();
        assert_eq!(exec.run_string("(exit 3) &\nfg %1 >/dev/null").unwrap(), 3);
        assert!(exec.runtime.jobs.is_empty());
    }

    #[test]
    fn test_fg_without_jobs() {
        let mut exec = shell();
        assert_eq!(exec.run_string("fg").unwrap(), 1);
        assert_eq!(exec.run_string("fg %4").unwrap(), 1);
    }

    #[test]
    fn test_jobs_forgets_finished_jobs() {
        let mut exec = shell();
        exec.run_string("true &\nwait $!").unwrap();
        exec.run_string("jobs >/dev/null").unwrap();
        assert!(exec.runtime.jobs.is_empty());
    }

    #[test]
    fn test_jobs_rejects_bad_option() {
        let mut exec = shell();
        assert_eq!(exec.run_string("jobs -z").unwrap(), 2);
    }

    #[test]
    fn test_bg_running_job() {
        let mut exec = shell();
        exec.run_string("sleep 5 &").unwrap();
        assert_eq!(exec.run_string("bg >/dev/null").unwrap(), 0);
        exec.run_string("kill %1; wait").unwrap();
    }
}
