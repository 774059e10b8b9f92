use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::jobs::{JobStatus, ProcessState};
use std::time::Duration;

/// Poll interval while background children run.
const POLL: Duration = Duration::from_millis(5);

/// What a `wait` operand refers to.
#[derive(Clone, Copy)]
enum Target {
    Job(usize),
    Pid(i32),
}

/// Wait for background jobs to complete
///
/// Usage:
///   wait           - wait for all background jobs, status 0
///   wait %1        - wait for job 1
///   wait 1234      - wait for PID 1234
///   wait %1 %2     - wait for multiple jobs
///
/// Returns the exit status of the last operand. A pid the shell never
/// started, or already forgot, gives 127. Traps still run while waiting.
pub fn builtin_wait(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        poll_until(exec, |exec| {
            exec.runtime
                .jobs
                .list()
                .iter()
                .all(|job| job.is_finished() || job.status() == JobStatus::Stopped)
        })?;
        exec.runtime.jobs.take_finished();
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        let target = if arg.starts_with('%') {
            exec.runtime.jobs.refresh();
            match exec.runtime.jobs.parse_spec(arg) {
                Ok(id) => Target::Job(id),
                Err(message) => {
                    exec.report(&ShellError::exec("wait", message, 127));
                    status = 127;
                    continue;
                }
            }
        } else {
            match arg.parse::<i32>() {
                Ok(pid) => Target::Pid(pid),
                Err(_) => {
                    let message = format!("`{}': not a pid or valid job spec", arg);
                    exec.report(&ShellError::exec("wait", message, 2));
                    status = 2;
                    continue;
                }
            }
        };
        status = wait_for(exec, target)?;
    }
    Ok(status)
}

fn wait_for(exec: &mut Executor, target: Target) -> ExecResult {
    let id = match target {
        Target::Job(id) => id,
        Target::Pid(pid) => match exec.runtime.jobs.job_for_pid(pid) {
            Some(id) => id,
            None => {
                exec.runtime.jobs.refresh();
                let known = exec.runtime.jobs.job_for_pid(pid);
                match known {
                    Some(id) => id,
                    None => return Ok(exec.runtime.jobs.take_reaped_status(pid).unwrap_or(127)),
                }
            }
        },
    };

    poll_until(exec, |exec| {
        exec.runtime
            .jobs
            .get(id)
            .map_or(true, |job| job.is_finished() || job.status() == JobStatus::Stopped)
    })?;

    let Some(job) = exec.runtime.jobs.get(id) else {
        return Ok(127);
    };
    let status = match target {
        Target::Pid(pid) => job
            .processes
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| match p.state {
                ProcessState::Exited(code) => code,
                ProcessState::Signaled(sig) => 128 + sig,
                ProcessState::Stopped => 128 + libc::SIGTSTP,
                ProcessState::Running => 0,
            })
            .unwrap_or(127),
        Target::Job(_) => job.exit_status(),
    };
    if job.is_finished() {
        exec.runtime.jobs.remove(id);
    }
    tracing::debug!(job = id, status, "wait finished");
    Ok(status)
}

/// Refresh the job table until `done` holds, running pending traps on
/// every round.
fn poll_until<F>(exec: &mut Executor, done: F) -> Result<(), crate::error::Unwind>
where
    F: Fn(&Executor) -> bool,
{
    loop {
        exec.runtime.jobs.refresh();
        if done(exec) {
            return Ok(());
        }
        exec.run_pending_traps()?;
        std::thread::sleep(POLL);
    }
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
    fn test_wait_no_jobs() {
        let mut exec = shell();
        assert_eq!(builtin_wait(&mut exec, &[]).unwrap(), 0);
    }

    #[test]
    fn test_wait_for_pid_status() {
        let mut exec = shell();
        assert_eq!(exec.run_string("(exit 7) &\nwait $!").unwrap(), 7);
        assert!(exec.runtime.jobs.is_empty());
    }

    #[test]
    fn test_wait_all_returns_zero() {
        let mut exec = shell();
        assert_eq!(exec.run_string("(exit 3) &\n(exit 4) &\nwait").unwrap(), 0);
        assert!(exec.runtime.jobs.is_empty());
    }

    #[test]
    fn test_wait_job_spec() {
        let mut exec = shell();
        assert_eq!(exec.run_string("sleep 0.05 &\nwait %1").unwrap(), 0);
    }

    #[test]
    fn test_wait_unknown_targets() {
        let mut exec = shell();
        assert_eq!(builtin_wait(&mut exec, &["99999999".to_string()]).unwrap(), 127);
        assert_eq!(builtin_wait(&mut exec, &["%5".to_string()]).unwrap(), 127);
        assert_eq!(builtin_wait(&mut exec, &["abc".to_string()]).unwrap(), 2);
    }

    #[test]
    fn test_wait_after_job_was_reported() {
        let mut exec = shell();
        exec.run_string("(exit 5) &").unwrap();
        let pid = exec.runtime.last_background.unwrap();
        assert_eq!(exec.run_string("wait").unwrap(), 0);
        assert_eq!(builtin_wait(&mut exec, &[pid.to_string()]).unwrap(), 5);
    }
}
