use super::single_quote;
use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;

fn describe(name: &str, value: &str) -> String {
    format!("alias {}={}\n", name, single_quote(value))
}

/// Implement the `alias` builtin command
///
/// Usage:
/// - `alias` - List all aliases
/// - `alias name=value` - Create an alias
/// - `alias name` - Show one alias
///
/// New aliases take effect from the next line of input.
pub fn builtin_alias(exec: &mut Executor, args: &[String]) -> ExecResult {
    let args: Vec<&String> = args.iter().filter(|a| *a != "-p").collect();
    if args.is_empty() {
        let mut aliases: Vec<(&String, &String)> = exec.runtime.aliases().iter().collect();
        aliases.sort();
        let output: String = aliases.iter().map(|(name, value)| describe(name, value)).collect();
        exec.print(&output)?;
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                let invalid = |c: char| c.is_whitespace() || "/$`'\"".contains(c);
                if name.is_empty() || name.contains(invalid) {
                    let message = format!("`{}': invalid alias name", name);
                    exec.report(&ShellError::exec("alias", message, 1));
                    status = 1;
                    continue;
                }
                tracing::trace!(name, value, "alias defined");
                exec.runtime.set_alias(name.to_string(), value.to_string());
            }
            None => match exec.runtime.get_alias(arg) {
                Some(value) => {
                    let line = describe(arg, value);
                    exec.print(&line)?;
                }
                None => {
                    exec.report(&ShellError::exec("alias", format!("{}: not found", arg), 1));
                    status = 1;
                }
            },
        }
    }
    Ok(status)
}

/// Implement the `unalias` builtin command
///
/// Usage:
/// - `unalias name` - Remove an alias
/// - `unalias -a` - Remove all aliases
pub fn builtin_unalias(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        return Err(ShellError::exec("unalias", "usage: unalias [-a] name [name ...]", 2).into());
    }
    if args.iter().any(|a| a == "-a") {
        exec.runtime.clear_aliases();
        return Ok(0);
    }

    let mut status = 0;
    for name in args {
        if !exec.runtime.remove_alias(name) {
            exec.report(&ShellError::exec("unalias", format!("{}: not found", name), 1));
            status = 1;
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_alias_create_and_query() {
        let mut exec = Executor::default();
        assert_eq!(builtin_alias(&mut exec, &args(&["ll=ls -l", "la=ls -a"])).unwrap(), 0);
        assert_eq!(exec.runtime.get_alias("ll").map(String::as_str), Some("ls -l"));
        assert_eq!(builtin_alias(&mut exec, &args(&["nothere"])).unwrap(), 1);
    }

    #[test]
    fn test_alias_invalid_name() {
        let mut exec = Executor::default();
        assert_eq!(builtin_alias(&mut exec, &args(&["=x"])).unwrap(), 1);
        assert_eq!(builtin_alias(&mut exec, &args(&["a b=x"])).unwrap(), 1);
        assert!(exec.runtime.aliases().is_empty());
    }

    #[test]
    fn test_unalias() {
        let mut exec = Executor::default();
        builtin_alias(&mut exec, &args(&["a=1", "b=2", "c=3"])).unwrap();
        assert_eq!(builtin_unalias(&mut exec, &args(&["a"])).unwrap(), 0);
        assert!(exec.runtime.get_alias("a").is_none());
        assert_eq!(builtin_unalias(&mut exec, &args(&["a"])).unwrap(), 1);
        assert_eq!(builtin_unalias(&mut exec, &args(&["-a"])).unwrap(), 0);
        assert!(exec.runtime.aliases().is_empty());
        assert!(builtin_unalias(&mut exec, &[]).is_err());
    }

    #[test]
    fn test_describe_quotes_value() {
        assert_eq!(describe("say", "echo 'hi'"), "alias say='echo '\\''hi'\\'''\n");
    }
}
