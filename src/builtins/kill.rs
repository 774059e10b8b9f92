use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::str::FromStr;

/// Parse a signal name or number. `Ok(None)` is signal 0, which only
/// checks that the target exists.
fn parse_signal(spec: &str) -> Result<Option<Signal>, ShellError> {
    let invalid = || ShellError::exec("kill", format!("{}: invalid signal specification", spec), 1);
    if let Ok(number) = spec.parse::<i32>() {
        if number == 0 {
            return Ok(None);
        }
        return Signal::try_from(number).map(Some).map_err(|_| invalid());
    }
    let upper = spec.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") { upper } else { format!("SIG{}", upper) };
    Signal::from_str(&name).map(Some).map_err(|_| invalid())
}

fn short_name(signal: Signal) -> &'static str {
    let name = signal.as_str();
    name.strip_prefix("SIG").unwrap_or(name)
}

/// `kill -l [status|signal]`
fn list_signals(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        let names: Vec<String> = Signal::iterator()
            .map(|sig| format!("{:>2}) {}", sig as i32, short_name(sig)))
            .collect();
        exec.print(&format!("{}\n", names.join("\n")))?;
        return Ok(0);
    }
    let mut status = 0;
    for arg in args {
        let line = match arg.parse::<i32>() {
            // an exit status above 128 names the signal that ended a process
            Ok(n) => Signal::try_from(if n > 128 { n - 128 } else { n })
                .map(|sig| short_name(sig).to_string())
                .ok(),
            Err(_) => parse_signal(arg).ok().flatten().map(|sig| (sig as i32).to_string()),
        };
        match line {
            Some(line) => exec.print(&format!("{}\n", line))?,
            None => {
                let message = format!("{}: invalid signal specification", arg);
                exec.report(&ShellError::exec("kill", message, 1));
                status = 1;
            }
        }
    }
    Ok(status)
}

/// Implement the `kill` builtin command
///
/// Usage:
/// - `kill PID...` - Send SIGTERM to PIDs
/// - `kill -SIGNAL PID...`, `kill -s SIGNAL PID...` - Send the named signal
/// - `kill -N PID...`, `kill -n N PID...` - Send signal number N
/// - `kill %job` - Signal every process of a job
/// - `kill -l` - List signal names
///
/// Examples:
/// - `kill -9 1234` - sends SIGKILL to PID 1234
/// - `kill -INT %1` - sends SIGINT to job 1
pub fn builtin_kill(exec: &mut Executor, args: &[String]) -> ExecResult {
    let usage = || {
        ShellError::exec(
            "kill",
            "usage: kill [-s sigspec | -n signum | -sigspec] pid | jobspec ... or kill -l [sigspec]",
            2,
        )
    };
    let mut signal = Some(Signal::SIGTERM);
    let mut rest = args;
    match rest.first().map(String::as_str) {
        None => return Err(usage().into()),
        Some("-l") | Some("-L") => return list_signals(exec, &rest[1..]),
        Some("-s") | Some("-n") => {
            let spec = rest.get(1).ok_or_else(usage)?;
            signal = parse_signal(spec)?;
            rest = &rest[2..];
        }
        Some("--") => rest = &rest[1..],
        Some(first) if first.len() > 1 && first.starts_with('-') => {
            signal = parse_signal(&first[1..])?;
            rest = &rest[1..];
        }
        _ => {}
    }
    if rest.first().map(String::as_str) == Some("--") {
        rest = &rest[1..];
    }
    if rest.is_empty() {
        return Err(usage().into());
    }

    let mut status = 0;
    for target in rest {
        if let Err(err) = send(exec, target, signal) {
            exec.report(&err);
            status = 1;
        }
    }
    Ok(status)
}

fn send(exec: &mut Executor, target: &str, signal: Option<Signal>) -> Result<(), ShellError> {
    let failed = |err: nix::errno::Errno| {
        ShellError::exec("kill", format!("({}) - {}", target, err.desc()), 1)
    };
    if target.starts_with('%') {
        exec.runtime.jobs.refresh();
        let id = exec
            .runtime
            .jobs
            .parse_spec(target)
            .map_err(|message| ShellError::exec("kill", message, 1))?;
        let Some(job) = exec.runtime.jobs.get(id) else {
            return Ok(());
        };
        tracing::debug!(job = id, ?signal, "signalling job");
        return match signal {
            Some(sig) => {
                job.signal(sig).map_err(failed)?;
                // a stopped job must be continued to see the signal
                if matches!(sig, Signal::SIGTERM | Signal::SIGHUP) {
                    let _ = job.signal(Signal::SIGCONT);
                }
                Ok(())
            }
            None => signal::kill(Pid::from_raw(job.pgid), None).map_err(failed),
        };
    }

    let pid = target.parse::<i32>().map_err(|_| {
        let message = format!("{}: arguments must be process or job IDs", target);
        ShellError::exec("kill", message, 1)
    })?;
    tracing::debug!(pid, ?signal, "signalling process");
    signal::kill(Pid::from_raw(pid), signal).map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_signal_forms() {
        assert_eq!(parse_signal("TERM").unwrap(), Some(Signal::SIGTERM));
        assert_eq!(parse_signal("sigint").unwrap(), Some(Signal::SIGINT));
        assert_eq!(parse_signal("9").unwrap(), Some(Signal::SIGKILL));
        assert_eq!(parse_signal("0").unwrap(), None);
        assert!(parse_signal("NOTASIGNAL").is_err());
        assert!(parse_signal("999").is_err());
    }

    #[test]
    fn test_kill_process() {
        let mut child = Command::new("sleep").arg("10").spawn().unwrap();
        let pid = child.id().to_string();
        let mut exec = Executor::default();
        assert_eq!(builtin_kill(&mut exec, &args(&["-0", &pid])).unwrap(), 0);
        assert_eq!(builtin_kill(&mut exec, &args(&["-s", "KILL", &pid])).unwrap(), 0);
        let status = child.wait().unwrap();
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn test_kill_errors() {
        let mut exec = Executor::default();
        assert!(builtin_kill(&mut exec, &[]).is_err());
        assert!(builtin_kill(&mut exec, &args(&["-BOGUS", "1"])).is_err());
        assert_eq!(builtin_kill(&mut exec, &args(&["notapid"])).unwrap(), 1);
        assert_eq!(builtin_kill(&mut exec, &args(&["%3"])).unwrap(), 1);
    }

    #[test]
    fn test_kill_job() {
        let mut exec = Executor::default();
        exec.runtime.assign("PATH", "/usr/bin:/bin".to_string()).unwrap();
        let status = exec.run_string("sleep 10 &\nkill %1\nwait %1").unwrap();
        assert_eq!(status, 128 + libc::SIGTERM);
    }

    #[test]
    fn test_kill_list_names_status() {
        let mut exec = Executor::default();
        assert_eq!(builtin_kill(&mut exec, &args(&["-l", "143", "INT"])).unwrap(), 0);
        assert_eq!(builtin_kill(&mut exec, &args(&["-l", "nosuch"])).unwrap(), 1);
    }
}
