use super::local::{declare_operands, print_variables, AttributeFlags, DeclareOptions};
use crate::error::ExecResult;
use crate::executor::Executor;

/// Implement the `readonly` builtin command
///
/// Usage:
/// - `readonly VAR=value` - Create readonly variable with value
/// - `readonly VAR` - Mark existing variable as readonly
/// - `readonly -a arr=(...)` / `readonly -A map=(...)` - Readonly arrays
/// - `readonly` or `readonly -p` - Print all readonly variables
///
/// A readonly variable can be neither assigned nor unset for the rest of
/// the shell's life. Readonly names are always global.
pub fn builtin_readonly(exec: &mut Executor, args: &[String]) -> ExecResult {
    let opts = DeclareOptions::parse("readonly", args)?;
    if opts.print || opts.operands.is_empty() {
        return print_variables(exec, "readonly", &[], |var| var.attrs.readonly);
    }
    let flags = AttributeFlags {
        readonly: Some(true),
        ..opts.flags
    };
    declare_operands(exec, "readonly", flags, &opts.operands, false)
}
