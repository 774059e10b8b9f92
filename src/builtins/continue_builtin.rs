use super::break_builtin::loop_count;
use crate::error::{ExecResult, Unwind};
use crate::executor::Executor;

/// Implementation of the `continue` builtin
///
/// Usage:
///   continue [N]
///
/// Resume the next iteration of the Nth enclosing loop (default 1).
/// Outside a loop it does nothing.
pub fn builtin_continue(exec: &mut Executor, args: &[String]) -> ExecResult {
    match loop_count(exec, "continue", args)? {
        Some(levels) => Err(Unwind::Continue(levels)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_in_nested_loops() {
        let mut exec = Executor::default();
        let source =
            "out=; for i in 1 2; do for j in a b; do continue 2; out=bad; done; out=${out}$i; done";
        exec.run_string(source).unwrap();
        assert_eq!(exec.runtime.get("out").as_deref(), Some(""));

        let source = "out=; for i in 1 2 3; do [ $i = 2 ] && continue; out=${out}$i; done";
        exec.run_string(source).unwrap();
        assert_eq!(exec.runtime.get("out").as_deref(), Some("13"));
    }

    #[test]
    fn test_continue_outside_loop() {
        let mut exec = Executor::default();
        assert!(matches!(builtin_continue(&mut exec, &[]), Ok(0)));
    }
}
