use super::single_quote;
use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::signal::{signal_name, signal_number, TRAPPABLE};

/// The trap table key for a condition: `EXIT` or a signal name.
fn condition_key(spec: &str) -> Option<String> {
    let upper = spec.to_ascii_uppercase();
    if upper == "EXIT" || upper == "SIGEXIT" || spec == "0" {
        return Some("EXIT".to_string());
    }
    signal_number(spec).and_then(signal_name).map(str::to_string)
}

fn invalid(spec: &str) -> ShellError {
    ShellError::exec("trap", format!("{}: invalid signal specification", spec), 1)
}

/// Implement the `trap` builtin command
///
/// Usage:
/// - `trap 'commands' SIG...` - Run commands when a signal arrives
/// - `trap '' SIG...` - Ignore the signals
/// - `trap - SIG...` or `trap SIG` - Restore the default action
/// - `trap` or `trap -p [SIG...]` - Print the traps as re-runnable commands
/// - `trap -l` - List the signals that may be trapped
///
/// `EXIT` (or `0`) names the shell's own exit. Trap actions run between
/// commands, never inside a builtin or a foreground wait.
pub fn builtin_trap(exec: &mut Executor, args: &[String]) -> ExecResult {
    match args.first().map(String::as_str) {
        None => return print_traps(exec, &[]),
        Some("-p") => return print_traps(exec, &args[1..]),
        Some("-l") => {
            let names: String = TRAPPABLE
                .iter()
                .map(|(name, number)| format!("{:>2}) SIG{}\n", number, name))
                .collect();
            exec.print(&names)?;
            return Ok(0);
        }
        _ => {}
    }

    let args = match args.first().map(String::as_str) {
        Some("--") => &args[1..],
        _ => args,
    };
    let (action, conditions) = match args {
        [] => return print_traps(exec, &[]),
        [single] => (None, std::slice::from_ref(single)),
        [first, rest @ ..] if first == "-" => (None, rest),
        [first, rest @ ..] => (Some(first.clone()), rest),
    };

    let mut status = 0;
    for spec in conditions {
        let Some(key) = condition_key(spec) else {
            exec.report(&invalid(spec));
            status = 1;
            continue;
        };
        match &action {
            None => {
                tracing::debug!(condition = %key, "trap reset");
                exec.runtime.traps.remove(&key);
            }
            Some(action) => {
                if key != "EXIT" {
                    if let Some(number) = signal_number(&key) {
                        if let Err(err) = exec.runtime.pending_signals.watch(number) {
                            let err = ShellError::exec("trap", format!("{}: {}", key, err), 1);
                            exec.report(&err);
                            status = 1;
                            continue;
                        }
                    }
                }
                tracing::debug!(condition = %key, "trap set");
                exec.runtime.traps.insert(key, action.clone());
            }
        }
    }
    Ok(status)
}

fn print_traps(exec: &mut Executor, specs: &[String]) -> ExecResult {
    let mut keys = Vec::new();
    let mut status = 0;
    if specs.is_empty() {
        keys.extend(exec.runtime.traps.keys().cloned());
    } else {
        for spec in specs {
            match condition_key(spec) {
                Some(key) => keys.push(key),
                None => {
                    exec.report(&invalid(spec));
                    status = 1;
                }
            }
        }
    }

    let mut output = String::new();
    for key in keys {
        if let Some(action) = exec.runtime.traps.get(&key) {
            output.push_str(&format!("trap -- {} {}\n", single_quote(action), key));
        }
    }
    exec.print(&output)?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_condition_keys() {
        assert_eq!(condition_key("EXIT").as_deref(), Some("EXIT"));
        assert_eq!(condition_key("0").as_deref(), Some("EXIT"));
        assert_eq!(condition_key("SIGTERM").as_deref(), Some("TERM"));
        assert_eq!(condition_key("2").as_deref(), Some("INT"));
        assert_eq!(condition_key("KILL"), None);
    }

    #[test]
    fn test_trap_set_and_reset() {
        let mut exec = Executor::default();
        assert_eq!(builtin_trap(&mut exec, &args(&["echo bye", "EXIT", "HUP"])).unwrap(), 0);
        assert_eq!(exec.runtime.traps.get("EXIT").map(String::as_str), Some("echo bye"));
        assert_eq!(exec.runtime.traps.get("HUP").map(String::as_str), Some("echo bye"));
        assert!(exec.runtime.pending_signals.is_watched(libc::SIGHUP));

        builtin_trap(&mut exec, &args(&["-", "HUP"])).unwrap();
        assert!(!exec.runtime.traps.contains_key("HUP"));
        builtin_trap(&mut exec, &args(&["EXIT"])).unwrap();
        assert!(exec.runtime.traps.is_empty());
    }

    #[test]
    fn test_trap_ignore_is_empty_action() {
        let mut exec = Executor::default();
        builtin_trap(&mut exec, &args(&["", "QUIT"])).unwrap();
        assert_eq!(exec.runtime.traps.get("QUIT").map(String::as_str), Some(""));
    }

    #[test]
    fn test_trap_invalid_signal() {
        let mut exec = Executor::default();
        assert_eq!(builtin_trap(&mut exec, &args(&["echo", "NOPE", "EXIT"])).unwrap(), 1);
        assert!(exec.runtime.traps.contains_key("EXIT"));
    }

    #[test]
    fn test_trap_runs_on_signal() {
        let mut exec = Executor::default();
        let source = "trap 'hit=yes' USR1\nkill -USR1 $$\ni=0\n\
                      while [ -z \"$hit\" ] && [ $i -lt 100000 ]; do i=$((i+1)); done\n";
        exec.run_string(source).unwrap();
        assert_eq!(exec.runtime.get("hit").as_deref(), Some("yes"));
    }
}
