use super::numeric_arg;
use crate::error::{ExecResult, ShellError, Unwind};
use crate::executor::Executor;

/// Implementation of the `exit` builtin
///
/// Usage:
///   exit [N]
///
/// Leave the shell, or the subshell it runs in, with status N (default:
/// the status of the last command). Only the low eight bits are kept.
pub fn builtin_exit(exec: &mut Executor, args: &[String]) -> ExecResult {
    let code = status_arg(exec, "exit", args)?;
    tracing::debug!(code, "exit");
    Err(Unwind::Exit(code))
}

/// Implementation of the `return` builtin
///
/// Usage:
///   return [N]
///
/// Leave the current function or sourced file with status N (default: the
/// status of the last command).
pub fn builtin_return(exec: &mut Executor, args: &[String]) -> ExecResult {
    if exec.runtime.call_stack.is_empty() && !exec.is_sourcing() {
        return Err(ShellError::exec(
            "return",
            "can only `return' from a function or sourced script",
            1,
        )
        .into());
    }
    let code = status_arg(exec, "return", args)?;
    Err(Unwind::Return(code))
}

fn status_arg(exec: &Executor, builtin: &str, args: &[String]) -> Result<i32, ShellError> {
    match args {
        [] => Ok(exec.runtime.last_status),
        [arg] => Ok((numeric_arg(builtin, arg)? & 0xff) as i32),
        _ => Err(ShellError::exec(builtin, "too many arguments", 1)),
    }
}
