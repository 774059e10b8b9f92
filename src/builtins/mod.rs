//! The builtin command table.
//!
//! A builtin receives the executor and its arguments (without the command
//! name) and returns an exit status. Output is written straight to the
//! current descriptors, so redirections and pipes apply to builtins the
//! same way they do to external programs.

use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

mod alias;
mod break_builtin;
mod continue_builtin;
mod eval;
mod exit_builtin;
mod jobs;
mod kill;
mod local;
pub mod read;
mod readonly;
mod set;
mod shift;
mod trap;
mod unset;
mod wait;

pub type BuiltinFn = fn(&mut Executor, &[String]) -> ExecResult;

#[derive(Clone)]
pub struct Builtins {
    commands: HashMap<&'static str, BuiltinFn>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, BuiltinFn> = HashMap::new();

        commands.insert(":", builtin_true);
        commands.insert("true", builtin_true);
        commands.insert("false", builtin_false);
        commands.insert("echo", builtin_echo);
        commands.insert("cd", builtin_cd);
        commands.insert("pwd", builtin_pwd);
        commands.insert("source", builtin_source);
        commands.insert(".", builtin_source);
        commands.insert("let", builtin_let);
        commands.insert("exit", exit_builtin::builtin_exit);
        commands.insert("return", exit_builtin::builtin_return);
        commands.insert("break", break_builtin::builtin_break);
        commands.insert("continue", continue_builtin::builtin_continue);
        commands.insert("eval", eval::builtin_eval);
        commands.insert("export", local::builtin_export);
        commands.insert("local", local::builtin_local);
        commands.insert("declare", local::builtin_declare);
        commands.insert("typeset", local::builtin_declare);
        commands.insert("readonly", readonly::builtin_readonly);
        commands.insert("unset", unset::builtin_unset);
        commands.insert("set", set::builtin_set);
        commands.insert("shift", shift::builtin_shift);
        commands.insert("read", read::builtin_read);
        commands.insert("test", test::builtin_test);
        commands.insert("[", test::builtin_bracket);
        commands.insert("wait", wait::builtin_wait);
        commands.insert("jobs", jobs::builtin_jobs);
        commands.insert("fg", jobs::builtin_fg);
        commands.insert("bg", jobs::builtin_bg);
        commands.insert("kill", kill::builtin_kill);
        commands.insert("trap", trap::builtin_trap);
        commands.insert("alias", alias::builtin_alias);
        commands.insert("unalias", alias::builtin_unalias);

        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.commands.get(name).copied()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Parse a numeric builtin argument the way `exit`, `return` and `shift` do.
pub(crate) fn numeric_arg(builtin: &str, arg: &str) -> Result<i64, ShellError> {
    arg.trim()
        .parse::<i64>()
        .map_err(|_| ShellError::exec(builtin, format!("{}: numeric argument required", arg), 2))
}

/// Quote `value` in single quotes so it reads back as one word.
pub(crate) fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn builtin_true(_exec: &mut Executor, _args: &[String]) -> ExecResult {
    Ok(0)
}

fn builtin_false(_exec: &mut Executor, _args: &[String]) -> ExecResult {
    Ok(1)
}

/// `echo [-neE] [arg ...]`
fn builtin_echo(exec: &mut Executor, args: &[String]) -> ExecResult {
    let mut newline = true;
    let mut escapes = false;
    let mut start = 0;
    for arg in args {
        let flags = match arg.strip_prefix('-') {
            Some(flags) if !flags.is_empty() && flags.chars().all(|c| "neE".contains(c)) => flags,
            _ => break,
        };
        for flag in flags.chars() {
            match flag {
                'n' => newline = false,
                'e' => escapes = true,
                _ => escapes = false,
            }
        }
        start += 1;
    }

    let mut output = String::new();
    for (i, arg) in args[start..].iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        if escapes {
            let (text, stop) = echo_escapes(arg);
            output.push_str(&text);
            if stop {
                exec.print(&output)?;
                return Ok(0);
            }
        } else {
            output.push_str(arg);
        }
    }
    if newline {
        output.push('\n');
    }
    exec.print(&output)?;
    Ok(0)
}

/// Interpret `echo -e` escapes. The flag is set when `\c` ends the output.
fn echo_escapes(text: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('e') | Some('E') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('c') => return (out, true),
            Some('0') => {
                let mut value = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            Some('x') => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match chars.peek().and_then(|d| d.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            chars.next();
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    out.push_str("\\x");
                } else {
                    out.extend(char::from_u32(value));
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    (out, false)
}

/// Lexically resolve `.` and `..` in an absolute path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            _ => {}
        }
    }
    out
}

/// `cd [dir]`. `cd -` changes to `$OLDPWD` and prints it.
fn builtin_cd(exec: &mut Executor, args: &[String]) -> ExecResult {
    let args: Vec<&String> = args.iter().filter(|a| *a != "-L" && *a != "--").collect();
    if args.len() > 1 {
        return Err(ShellError::exec("cd", "too many arguments", 1).into());
    }
    let mut print_target = false;
    let target = match args.first().map(|s| s.as_str()) {
        None | Some("~") => exec
            .runtime
            .get("HOME")
            .or_else(|| dirs::home_dir().map(|p| p.to_string_lossy().into_owned()))
            .ok_or_else(|| ShellError::exec("cd", "HOME not set", 1))?,
        Some("-") => {
            print_target = true;
            exec.runtime
                .get("OLDPWD")
                .ok_or_else(|| ShellError::exec("cd", "OLDPWD not set", 1))?
        }
        Some(dir) => dir.to_string(),
    };

    let current = exec
        .runtime
        .get("PWD")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"));
    let logical = normalize(&current.join(&target));

    if let Err(err) = std::env::set_current_dir(&logical) {
        tracing::debug!(target = %logical.display(), error = %err, "cd failed");
        let message = format!("{}: {}", target, crate::executor::redirect::describe(&err));
        return Err(ShellError::exec("cd", message, 1).into());
    }
    exec.runtime.assign("OLDPWD", current.to_string_lossy().into_owned())?;
    exec.runtime.assign("PWD", logical.to_string_lossy().into_owned())?;
    if print_target {
        exec.print(&format!("{}\n", logical.display()))?;
    }
    Ok(0)
}

/// `pwd [-LP]`
fn builtin_pwd(exec: &mut Executor, args: &[String]) -> ExecResult {
    let physical = args.iter().any(|a| a == "-P");
    let logical = exec
        .runtime
        .get("PWD")
        .filter(|p| !physical && Path::new(p).is_absolute());
    let dir = match logical {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|err| ShellError::exec("pwd", err.to_string(), 1))?
            .to_string_lossy()
            .into_owned(),
    };
    exec.print(&format!("{}\n", dir))?;
    Ok(0)
}

/// `source file [args]` and `. file [args]`. Names without a slash are
/// looked up on `$PATH` first, then in the current directory.
fn builtin_source(exec: &mut Executor, args: &[String]) -> ExecResult {
    let Some(file) = args.first() else {
        return Err(ShellError::exec("source", "filename argument required", 2).into());
    };
    let path = if file.contains('/') {
        PathBuf::from(file)
    } else {
        exec.runtime
            .get("PATH")
            .unwrap_or_default()
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join(file))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(file))
    };

    if args.len() > 1 {
        let saved = exec.runtime.set_positional(args[1..].to_vec());
        let result = exec.source_file(&path);
        exec.runtime.set_positional(saved);
        result
    } else {
        exec.source_file(&path)
    }
}

/// `let expr ...`: status 0 when the last expression is non-zero.
fn builtin_let(exec: &mut Executor, args: &[String]) -> ExecResult {
    if args.is_empty() {
        return Err(ShellError::exec("let", "expression expected", 2).into());
    }
    let mut last = 0;
    for arg in args {
        last = exec.runtime.eval_arith(arg).map_err(ShellError::from)?;
    }
    Ok(if last != 0 { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(exec: &mut Executor, source: &str) -> i32 {
        exec.run_string(source).unwrap_or(-1)
    }

    #[test]
    fn test_table_contains_every_builtin() {
        let builtins = Builtins::new();
        for name in [
            ":", "true", "false", "echo", "cd", "pwd", "exit", "return", "break", "continue",
            "export", "readonly", "local", "declare", "typeset", "unset", "set", "shift", "eval",
            "source", ".", "read", "test", "[", "let", "wait", "jobs", "fg", "bg", "kill", "trap",
            "alias", "unalias",
        ] {
            assert!(builtins.is_builtin(name), "missing {}", name);
        }
        assert!(!builtins.is_builtin("ls"));
        assert_eq!(builtins.names().first(), Some(&"."));
    }

    #[test]
    fn test_echo_escapes() {
        assert_eq!(echo_escapes(r"a\tb\n"), ("a\tb\n".to_string(), false));
        assert_eq!(echo_escapes(r"stop\cignored"), ("stop".to_string(), true));
        assert_eq!(echo_escapes(r"\x41\0102"), ("AB".to_string(), false));
        assert_eq!(echo_escapes(r"keep\q"), (r"keep\q".to_string(), false));
    }

    #[test]
    fn test_single_quote() {
        assert_eq!(single_quote("plain"), "'plain'");
        assert_eq!(single_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_let() {
        let mut exec = Executor::default();
        assert_eq!(run(&mut exec, "let x=3 'y = x * 2'"), 0);
        assert_eq!(exec.runtime.get("y").as_deref(), Some("6"));
        assert_eq!(run(&mut exec, "let 0"), 1);
    }

    #[test]
    fn test_cd_updates_pwd() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        let start = std::env::current_dir().unwrap();

        let mut exec = Executor::default();
        let root = dir.path().canonicalize().unwrap();
        exec.runtime.assign("PWD", root.display().to_string()).unwrap();
        assert_eq!(run(&mut exec, "cd inner"), 0);
        assert_eq!(exec.runtime.get("PWD"), Some(root.join("inner").display().to_string()));
        assert_eq!(exec.runtime.get("OLDPWD"), Some(root.display().to_string()));
        assert_eq!(run(&mut exec, "cd .."), 0);
        assert_eq!(exec.runtime.get("PWD"), Some(root.display().to_string()));
        assert_eq!(run(&mut exec, "cd /nonexistent/marsh"), 1);

        std::env::set_current_dir(start).unwrap();
    }

    #[test]
    fn test_source_with_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("lib.sh");
        std::fs::write(&script, "first=$1\ncount=$#\n").unwrap();
        let mut exec = Executor::default();
        exec.runtime.set_positional(vec!["outer".to_string()]);
        let source = format!(". {} a b", script.display());
        assert_eq!(run(&mut exec, &source), 0);
        assert_eq!(exec.runtime.get("first").as_deref(), Some("a"));
        assert_eq!(exec.runtime.get("count").as_deref(), Some("2"));
        assert_eq!(exec.runtime.positional(), &["outer".to_string()]);
    }
}
