use crate::error::ExecResult;
use crate::executor::Executor;

/// The eval builtin command
///
/// Joins its arguments with spaces and runs the result as shell source in
/// the current shell, so assignments and definitions persist.
pub fn builtin_eval(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        return Ok(0);
    }
    let source = args.join(" ");
    tracing::trace!(source = %source, "eval");
    exec.run_string(&source)
}
