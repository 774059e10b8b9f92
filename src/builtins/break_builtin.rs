use crate::error::{ExecResult, ShellError, Unwind};
use crate::executor::Executor;

/// Parse the loop count of `break` and `continue`. `None` when there is no
/// enclosing loop, which makes the command a no-op.
pub(super) fn loop_count(
    exec: &Executor,
    builtin: &str,
    args: &[String],
) -> Result<Option<usize>, ShellError> {
    let levels = match args {
        [] => 1,
        [arg] => match arg.parse::<i64>() {
            Ok(n) if n >= 1 => n as usize,
            Ok(_) => {
                let message = format!("{}: loop count out of range", arg);
                return Err(ShellError::exec(builtin, message, 1));
            }
            Err(_) => {
                let message = format!("{}: numeric argument required", arg);
                return Err(ShellError::exec(builtin, message, 2));
            }
        },
        _ => return Err(ShellError::exec(builtin, "too many arguments", 1)),
    };
    let depth = exec.runtime.loop_depth;
    if depth == 0 {
        return Ok(None);
    }
    // a count past the outermost loop leaves all of them
    Ok(Some(levels.min(depth)))
}

/// Implementation of the `break` builtin
///
/// Usage:
///   break [N]
///
/// Exit from N enclosing for/while/until/select loops (default 1). Outside
/// a loop it does nothing.
pub fn builtin_break(exec: &mut Executor, args: &[String]) -> ExecResult {
    match loop_count(exec, "break", args)? {
        Some(levels) => Err(Unwind::Break(levels)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_outside_loop_is_noop() {
        let mut exec = Executor::default();
        assert!(matches!(builtin_break(&mut exec, &[]), Ok(0)));
    }

    #[test]
    fn test_break_levels_are_clamped() {
        let mut exec = Executor::default();
        exec.runtime.loop_depth = 2;
        assert!(matches!(builtin_break(&mut exec, &[]), Err(Unwind::Break(1))));
        assert!(matches!(builtin_break(&mut exec, &["2".to_string()]), Err(Unwind::Break(2))));
        assert!(matches!(builtin_break(&mut exec, &["9".to_string()]), Err(Unwind::Break(2))));
    }

    #[test]
    fn test_break_bad_arguments() {
        let mut exec = Executor::default();
        exec.runtime.loop_depth = 1;
        for bad in [vec!["0"], vec!["x"], vec!["1", "2"]] {
            let args: Vec<String> = bad.iter().map(|s| s.to_string()).collect();
            assert!(matches!(builtin_break(&mut exec, &args), Err(Unwind::Error(_))));
        }
    }
}
