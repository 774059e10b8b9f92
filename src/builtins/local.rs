use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::lexer::assignment_split;
use crate::parser::is_name;
use crate::runtime::{Attributes, Value, Variable};

/// Attribute changes requested by `declare` flags. `Some(true)` sets an
/// attribute (`-x`), `Some(false)` clears it (`+x`).
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(super) struct AttributeFlags {
    pub indexed: bool,
    pub assoc: bool,
    pub exported: Option<bool>,
    pub readonly: Option<bool>,
    pub integer: Option<bool>,
    pub upper: Option<bool>,
    pub lower: Option<bool>,
    pub nameref: Option<bool>,
}

impl AttributeFlags {
    fn apply(&self, attrs: &mut Attributes) {
        if let Some(on) = self.exported {
            attrs.exported = on;
        }
        if let Some(on) = self.integer {
            attrs.integer = on;
        }
        if let Some(on) = self.upper {
            attrs.upper = on;
            if on {
                attrs.lower = false;
            }
        }
        if let Some(on) = self.lower {
            attrs.lower = on;
            if on {
                attrs.upper = false;
            }
        }
        if let Some(on) = self.nameref {
            attrs.nameref = on;
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct DeclareOptions {
    pub flags: AttributeFlags,
    pub print: bool,
    pub global: bool,
    pub functions: bool,
    pub operands: Vec<String>,
}

impl DeclareOptions {
    pub fn parse(builtin: &str, args: &[String]) -> Result<Self, ShellError> {
        let mut opts = DeclareOptions::default();
        let mut iter = args.iter();
        for arg in iter.by_ref() {
            if arg == "--" {
                break;
            }
            let (on, letters) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
                (Some(letters), _) if !letters.is_empty() => (true, letters),
                (_, Some(letters)) if !letters.is_empty() => (false, letters),
                _ => {
                    opts.operands.push(arg.clone());
                    continue;
                }
            };
            for letter in letters.chars() {
                let flags = &mut opts.flags;
                match letter {
                    'a' => flags.indexed = on,
                    'A' => flags.assoc = on,
                    'x' => flags.exported = Some(on),
                    'r' => flags.readonly = Some(on),
                    'i' => flags.integer = Some(on),
                    'u' => flags.upper = Some(on),
                    'l' => flags.lower = Some(on),
                    'n' => flags.nameref = Some(on),
                    'p' => opts.print = true,
                    'g' => opts.global = true,
                    'f' | 'F' => opts.functions = true,
                    _ => {
                        let message = format!("-{}: invalid option", letter);
                        return Err(ShellError::exec(builtin, message, 2));
                    }
                }
            }
        }
        opts.operands.extend(iter.cloned());
        Ok(opts)
    }
}

/// Quote a value the way `declare -p` prints it.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// One `declare -p` line for a variable.
pub(super) fn describe_variable(name: &str, var: &Variable) -> String {
    let flags = var.attrs.flags(var.value.as_ref());
    let flags = if flags.is_empty() { "--".to_string() } else { format!("-{}", flags) };
    match &var.value {
        None => format!("declare {} {}", flags, name),
        Some(Value::Scalar(s)) => format!("declare {} {}={}", flags, name, quote(s)),
        Some(Value::Indexed(map)) => {
            let items: Vec<String> =
                map.iter().map(|(k, v)| format!("[{}]={}", k, quote(v))).collect();
            format!("declare {} {}=({})", flags, name, items.join(" "))
        }
        Some(Value::Assoc(map)) => {
            let items: Vec<String> =
                map.iter().map(|(k, v)| format!("[{}]={}", k, quote(v))).collect();
            format!("declare {} {}=({})", flags, name, items.join(" "))
        }
    }
}

/// Print the variables selected by `filter`, or the named ones.
pub(super) fn print_variables<F>(
    exec: &mut Executor,
    builtin: &str,
    names: &[String],
    filter: F,
) -> ExecResult
where
    F: Fn(&Variable) -> bool,
{
    let mut output = String::new();
    let mut status = 0;
    let listed: Vec<String> = if names.is_empty() {
        exec.runtime.scopes.names()
    } else {
        names.to_vec()
    };
    for name in &listed {
        match exec.runtime.scopes.lookup(name) {
            Some(var) if names.is_empty() && !filter(var) => {}
            Some(var) => {
                output.push_str(&describe_variable(name, var));
                output.push('\n');
            }
            None => {
                exec.eprint(&format!("marsh: {}: {}: not found\n", builtin, name));
                status = 1;
            }
        }
    }
    exec.print(&output)?;
    Ok(status)
}

/// Declare each operand with the requested attributes, assigning values
/// given as `name=value`. `local` binds in the current function's frame.
pub(super) fn declare_operands(
    exec: &mut Executor,
    builtin: &str,
    flags: AttributeFlags,
    operands: &[String],
    local: bool,
) -> ExecResult {
    let mut status = 0;
    for operand in operands {
        if let Err(err) = declare_one(exec, builtin, flags, operand, local) {
            match err {
                ShellError::Exec { .. } | ShellError::Readonly(_) => {
                    exec.report(&err);
                    status = 1;
                }
                other => return Err(other.into()),
            }
        }
    }
    Ok(status)
}

fn declare_one(
    exec: &mut Executor,
    builtin: &str,
    flags: AttributeFlags,
    operand: &str,
    local: bool,
) -> Result<(), ShellError> {
    let name = match assignment_split(operand) {
        Some((target, _)) => target.trim_end_matches('+').split('[').next().unwrap_or(target),
        None => operand,
    };
    if !is_name(name) {
        return Err(ShellError::exec(builtin, format!("`{}': not a valid identifier", operand), 1));
    }
    let name = name.to_string();

    let existing = exec.runtime.attributes(&name);
    if existing.readonly && (flags.readonly == Some(false) || local) {
        return Err(ShellError::Readonly(name));
    }

    let fresh_local = local && !exec.runtime.scopes.has_local(&name);
    {
        let var = if local {
            exec.runtime.scopes.local_entry(&name)
        } else {
            exec.runtime.scopes.entry(&name)
        };
        if fresh_local {
            var.attrs.integer = existing.integer;
        }
        flags.apply(&mut var.attrs);
        if flags.indexed && var.value.is_none() {
            var.value = Some(Value::Indexed(Default::default()));
        }
    }
    if flags.assoc {
        exec.runtime.make_assoc(&name, local)?;
    }

    if assignment_split(operand).is_some() {
        exec.declare_assignment(operand, local)?;
    }

    if flags.readonly == Some(true) {
        let var = if local {
            exec.runtime.scopes.local_entry(&name)
        } else {
            exec.runtime.scopes.entry(&name)
        };
        var.attrs.readonly = true;
    }
    Ok(())
}

/// Implement the `declare` and `typeset` builtin commands
///
/// Usage:
/// - `declare [-aAilnrux] [-g] name[=value] ...` - set attributes and values
/// - `declare -p [name ...]` - print variables in reusable form
/// - `declare -F` - list function names
///
/// Inside a function, names are local unless `-g` is given.
pub fn builtin_declare(exec: &mut Executor, args: &[String]) -> ExecResult {
    let opts = DeclareOptions::parse("declare", args)?;
    if opts.functions {
        let mut output = String::new();
        for name in exec.runtime.function_names() {
            if opts.operands.is_empty() || opts.operands.contains(&name) {
                output.push_str(&format!("declare -f {}\n", name));
            }
        }
        exec.print(&output)?;
        return Ok(0);
    }
    if opts.print || opts.operands.is_empty() {
        let flags = opts.flags;
        return print_variables(exec, "declare", &opts.operands, |var| {
            (flags.exported != Some(true) || var.attrs.exported)
                && (flags.readonly != Some(true) || var.attrs.readonly)
        });
    }
    let local = !opts.global && !exec.runtime.call_stack.is_empty();
    declare_operands(exec, "declare", opts.flags, &opts.operands, local)
}

/// Implement the `local` builtin command
///
/// Usage:
/// - `local var=value` - Create a function-scoped variable with assignment
/// - `local var` - Declare a function-scoped variable without a value
/// - `local -i n=1` - With attributes, as `declare` takes them
///
/// Local variables shadow outer ones until the function returns.
pub fn builtin_local(exec: &mut Executor, args: &[String]) -> ExecResult {
    if exec.runtime.call_stack.is_empty() {
        return Err(ShellError::exec("local", "can only be used in a function", 1).into());
    }
    let opts = DeclareOptions::parse("local", args)?;
    if opts.operands.is_empty() {
        return Ok(0);
    }
    declare_operands(exec, "local", opts.flags, &opts.operands, true)
}

/// Implement the `export` builtin command
///
/// Usage:
/// - `export name[=value] ...` - mark for the environment of child processes
/// - `export -n name` - remove the export attribute
/// - `export` or `export -p` - list exported variables
pub fn builtin_export(exec: &mut Executor, args: &[String]) -> ExecResult {
    let mut unexport = false;
    let mut print = false;
    let mut operands = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-n" => unexport = true,
            "-p" => print = true,
            "--" => {}
            flag if flag.starts_with('-') && flag.len() > 1 => {
                let message = format!("{}: invalid option", flag);
                return Err(ShellError::exec("export", message, 2).into());
            }
            _ => operands.push(arg.clone()),
        }
    }
    if print || operands.is_empty() {
        return print_variables(exec, "export", &[], |var| var.attrs.exported);
    }
    let flags = AttributeFlags {
        exported: Some(!unexport),
        ..AttributeFlags::default()
    };
    declare_operands(exec, "export", flags, &operands, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(exec: &mut Executor, source: &str) -> i32 {
        exec.run_string(source).unwrap_or(-1)
    }

    #[test]
    fn test_local_requires_function_scope() {
        let mut exec = Executor::default();
        let result = builtin_local(&mut exec, &["x=1".to_string()]);
        assert!(result.is_err());
        assert!(exec.runtime.get("x").is_none());
    }

    #[test]
    fn test_local_shadows_and_restores() {
        let mut exec = Executor::default();
        run(&mut exec, "x=outer; f() { local x; inner=${x-unset}; x=changed; }; f");
        assert_eq!(exec.runtime.get("inner").as_deref(), Some("unset"));
        assert_eq!(exec.runtime.get("x").as_deref(), Some("outer"));
    }

    #[test]
    fn test_local_cannot_shadow_readonly() {
        let mut exec = Executor::default();
        run(&mut exec, "readonly R=1; f() { local R=2; s=$?; seen=$R; }; f");
        assert_eq!(exec.runtime.get("s").as_deref(), Some("1"));
        assert_eq!(exec.runtime.get("seen").as_deref(), Some("1"));
        assert_eq!(exec.runtime.get("R").as_deref(), Some("1"));

        run(&mut exec, "g() { declare R; t=$?; }; g; R=3 g; u=$?");
        assert_eq!(exec.runtime.get("t").as_deref(), Some("1"));
        assert_eq!(exec.runtime.get("u").as_deref(), Some("1"));
    }

    #[test]
    fn test_dynamic_scoping() {
        let mut exec = Executor::default();
        run(&mut exec, "g() { seen=$v; v=from_g; }; f() { local v=from_f; g; after=$v; }; f");
        assert_eq!(exec.runtime.get("seen").as_deref(), Some("from_f"));
        assert_eq!(exec.runtime.get("after").as_deref(), Some("from_g"));
        assert!(exec.runtime.get("v").is_none());
    }

    #[test]
    fn test_declare_in_function_is_local_unless_global() {
        let mut exec = Executor::default();
        run(&mut exec, "f() { declare a=1; declare -g b=2; typeset c=3; }; f");
        assert!(exec.runtime.get("a").is_none());
        assert_eq!(exec.runtime.get("b").as_deref(), Some("2"));
        assert!(exec.runtime.get("c").is_none());
    }

    #[test]
    fn test_declare_attributes() {
        let mut exec = Executor::default();
        run(
            &mut exec,
            "declare -i n=4*2; declare -l low=MiXeD; declare -x exported=yes; declare -r fixed=1",
        );
        assert_eq!(exec.runtime.get("n").as_deref(), Some("8"));
        assert_eq!(exec.runtime.get("low").as_deref(), Some("mixed"));
        assert!(exec.runtime.attributes("exported").exported);
        assert!(exec.runtime.attributes("fixed").readonly);
        assert_ne!(run(&mut exec, "fixed=2"), 0);
        assert_eq!(exec.runtime.get("fixed").as_deref(), Some("1"));
    }

    #[test]
    fn test_declare_arrays() {
        let mut exec = Executor::default();
        run(&mut exec, "declare -a list=(x y z); declare -A map=([one]=1 [two]=2)");
        assert_eq!(exec.runtime.get_all("list"), vec!["x", "y", "z"]);
        assert!(exec.runtime.is_assoc("map"));
        assert_eq!(exec.runtime.get_keys("map"), vec!["one", "two"]);
    }

    #[test]
    fn test_nameref() {
        let mut exec = Executor::default();
        run(&mut exec, "target=old; declare -n ref=target; ref=new; seen=$ref");
        assert_eq!(exec.runtime.get("target").as_deref(), Some("new"));
        assert_eq!(exec.runtime.get("seen").as_deref(), Some("new"));
    }

    #[test]
    fn test_export_and_unexport() {
        let mut exec = Executor::default();
        run(&mut exec, "export A=1 B; B=2");
        let env = exec.runtime.exported();
        assert!(env.contains(&("A".to_string(), "1".to_string())));
        assert!(env.contains(&("B".to_string(), "2".to_string())));
        run(&mut exec, "export -n A");
        assert!(!exec.runtime.attributes("A").exported);
    }

    #[test]
    fn test_invalid_identifier() {
        let mut exec = Executor::default();
        assert_eq!(run(&mut exec, "export 1abc=2"), 1);
        assert_eq!(run(&mut exec, "declare -q x"), 2);
    }

    #[test]
    fn test_describe_variable() {
        let mut var = Variable::scalar("a \"b\" $c");
        var.attrs.exported = true;
        assert_eq!(describe_variable("v", &var), r#"declare -x v="a \"b\" \$c""#);
        let list = Variable {
            value: Some(Value::Indexed(
                [(0, "x".to_string()), (2, "y".to_string())].into_iter().collect(),
            )),
            attrs: Attributes::default(),
        };
        assert_eq!(describe_variable("l", &list), r#"declare -a l=([0]="x" [2]="y")"#);
    }
}
