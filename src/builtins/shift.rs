use super::numeric_arg;
use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;

/// Implement the `shift` builtin command
///
/// Usage:
/// - `shift` - Shift positional parameters left by 1 (remove $1)
/// - `shift N` - Shift positional parameters left by N
///
/// Status 1, with the parameters unchanged, when fewer than N are set.
pub fn builtin_shift(exec: &mut Executor, args: &[String]) -> ExecResult {
    let count = match args {
        [] => 1,
        [arg] => numeric_arg("shift", arg)?,
        _ => return Err(ShellError::exec("shift", "too many arguments", 1).into()),
    };
    if count < 0 {
        let message = format!("{}: shift count out of range", count);
        return Err(ShellError::exec("shift", message, 1).into());
    }
    Ok(if exec.runtime.shift(count as usize) { 0 } else { 1 })
}
