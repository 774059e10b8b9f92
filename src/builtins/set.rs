use super::single_quote;
use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::runtime::Value;

/// Implement the `set` builtin command
///
/// Usage:
/// - `set` - List every variable as `name=value`
/// - `set -e`, `set +e` - Turn single-letter options on or off (`-euxfCm`)
/// - `set -o name`, `set +o name` - Turn a named option on or off
/// - `set -o` / `set +o` - Show option states, readable or re-runnable
/// - `set -- args...` - Replace the positional parameters
/// - `set -x a b` - Options first, then the first operand starts the
///   new positional parameters
pub fn builtin_set(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        return list_variables(exec);
    }

    let mut i = 0;
    let mut positional = None;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--" || arg == "-" {
            positional = Some(args[i + 1..].to_vec());
            break;
        }
        let (on, letters) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
            (Some(letters), _) => (true, letters),
            (_, Some(letters)) => (false, letters),
            _ => {
                positional = Some(args[i..].to_vec());
                break;
            }
        };

        if letters == "o" {
            match args.get(i + 1) {
                Some(name) => {
                    if !exec.runtime.options.set_by_name(name, on) {
                        return Err(invalid(format!("{}: invalid option name", name)));
                    }
                    i += 2;
                    continue;
                }
                None => return show_options(exec, on),
            }
        }
        for letter in letters.chars() {
            if !exec.runtime.options.set_by_letter(letter, on) {
                let sign = if on { '-' } else { '+' };
                return Err(invalid(format!("{}{}: invalid option", sign, letter)));
            }
        }
        i += 1;
    }

    tracing::debug!(flags = %exec.runtime.options.flags(), "options changed");
    if let Some(params) = positional {
        exec.runtime.set_positional(params);
    }
    Ok(0)
}

fn invalid(message: String) -> crate::error::Unwind {
    ShellError::exec("set", message, 2).into()
}

fn show_options(exec: &mut Executor, readable: bool) -> ExecResult {
    let mut output = String::new();
    for (name, on) in exec.runtime.options.listing() {
        if readable {
            output.push_str(&format!("{:<15}\t{}\n", name, if on { "on" } else { "off" }));
        } else {
            output.push_str(&format!("set {}o {}\n", if on { '-' } else { '+' }, name));
        }
    }
    exec.print(&output)?;
    Ok(0)
}

fn list_variables(exec: &mut Executor) -> ExecResult {
    let mut names = exec.runtime.scopes.names();
    names.sort();
    let mut output = String::new();
    for name in names {
        let Some(value) = exec.runtime.scopes.lookup(&name).and_then(|v| v.value.as_ref()) else {
            continue;
        };
        let rendered = match value {
            Value::Scalar(s) => single_quote(s),
            Value::Indexed(map) => {
                let items: Vec<String> =
                    map.iter().map(|(k, v)| format!("[{}]={}", k, single_quote(v))).collect();
                format!("({})", items.join(" "))
            }
            Value::Assoc(map) => {
                let items: Vec<String> =
                    map.iter().map(|(k, v)| format!("[{}]={}", k, single_quote(v))).collect();
                format!("({})", items.join(" "))
            }
        };
        output.push_str(&format!("{}={}\n", name, rendered));
    }
    exec.print(&output)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_letters_on_and_off() {
        let mut exec = Executor::default();
        builtin_set(&mut exec, &args(&["-eu"])).unwrap();
        assert!(exec.runtime.options.errexit);
        assert!(exec.runtime.options.nounset);
        builtin_set(&mut exec, &args(&["+e", "-f"])).unwrap();
        assert!(!exec.runtime.options.errexit);
        assert!(exec.runtime.options.noglob);
    }

    #[test]
    fn test_set_named_options() {
        let mut exec = Executor::default();
        builtin_set(&mut exec, &args(&["-o", "pipefail", "-o", "noclobber"])).unwrap();
        assert!(exec.runtime.options.pipefail);
        assert!(exec.runtime.options.noclobber);
        builtin_set(&mut exec, &args(&["+o", "pipefail"])).unwrap();
        assert!(!exec.runtime.options.pipefail);
    }

    #[test]
    fn test_set_invalid_option() {
        let mut exec = Executor::default();
        assert!(builtin_set(&mut exec, &args(&["-Q"])).is_err());
        assert!(builtin_set(&mut exec, &args(&["-o", "nosuchoption"])).is_err());
        assert_eq!(exec.run_string("set -o bogus").unwrap(), 2);
    }

    #[test]
    fn test_set_positional_parameters() {
        let mut exec = Executor::default();
        builtin_set(&mut exec, &args(&["--", "a", "b"])).unwrap();
        assert_eq!(exec.runtime.positional(), &["a".to_string(), "b".to_string()]);
        builtin_set(&mut exec, &args(&["-x", "one"])).unwrap();
        assert!(exec.runtime.options.xtrace);
        assert_eq!(exec.runtime.positional(), &["one".to_string()]);
        builtin_set(&mut exec, &args(&["--"])).unwrap();
        assert!(exec.runtime.positional().is_empty());
    }

    #[test]
    fn test_dollar_dash_reflects_options() {
        let mut exec = Executor::default();
        exec.run_string("set -e -u; flags=$-").unwrap();
        let flags = exec.runtime.get("flags").unwrap();
        assert!(flags.contains('e') && flags.contains('u'));
    }
}
