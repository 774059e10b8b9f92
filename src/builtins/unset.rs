use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::runtime::Subscript;

/// Implement the `unset` builtin command
///
/// Usage:
/// - `unset var` - Remove variable, or the function of that name when no
///   variable is set
/// - `unset -v var` - Remove variable only
/// - `unset -f func` - Remove function
/// - `unset 'arr[i]'` - Remove one array element
pub fn builtin_unset(exec: &mut Executor, args: &[String]) -> ExecResult {
    let mut functions_only = false;
    let mut variables_only = false;
    let mut names = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-f" => functions_only = true,
            "-v" => variables_only = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                let message = format!("{}: invalid option", flag);
                return Err(ShellError::exec("unset", message, 2).into());
            }
            _ => names.push(arg.as_str()),
        }
    }

    let mut status = 0;
    for name in names {
        if functions_only {
            exec.runtime.remove_function(name);
            continue;
        }
        let result = match name.split_once('[') {
            Some((base, rest)) if rest.ends_with(']') => {
                let raw = &rest[..rest.len() - 1];
                if raw == "@" || raw == "*" {
                    exec.runtime.unset(base)
                } else {
                    let subscript = if exec.runtime.is_assoc(base) {
                        Subscript::Key(raw.to_string())
                    } else {
                        Subscript::Index(crate::expansion::expand_arith(exec, raw)?)
                    };
                    exec.runtime.unset_element(base, &subscript)
                }
            }
            _ if !variables_only
                && !exec.runtime.is_set(name)
                && exec.runtime.function(name).is_some() =>
            {
                exec.runtime.remove_function(name);
                Ok(())
            }
            _ => exec.runtime.unset(name),
        };
        if let Err(err) = result {
            exec.report(&err);
            status = 1;
        }
    }
    Ok(status)
}
