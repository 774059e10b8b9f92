//! Shell configuration.
//!
//! Settings come from the environment first:
//! - `MARSH_PIPEFAIL` - any of `1`, `true`, `on`, `yes` turns on pipefail
//! - `MARSH_MAX_SUBST_DEPTH` - command substitution nesting limit (default 64)
//! - `MARSH_MAX_FUNC_DEPTH` - function call nesting limit (default 1000)
//! - `MARSH_ERROR_FORMAT` - `text` (default) or `json`
//! - `MARSH_LOG` - tracing filter directives, logging is off when unset
//!
//! Command-line flags are applied on top by [`Invocation::parse`].

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub pipefail: bool,
    pub max_subst_depth: usize,
    pub max_func_depth: usize,
    pub error_format: ErrorFormat,
    pub log_filter: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            pipefail: false,
            max_subst_depth: 64,
            max_func_depth: 1000,
            error_format: ErrorFormat::Text,
            log_filter: None,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

impl ShellConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup("MARSH_PIPEFAIL") {
            config.pipefail = truthy(&value);
        }
        if let Some(value) = lookup("MARSH_MAX_SUBST_DEPTH") {
            config.max_subst_depth = parse_limit("MARSH_MAX_SUBST_DEPTH", &value)?;
        }
        if let Some(value) = lookup("MARSH_MAX_FUNC_DEPTH") {
            config.max_func_depth = parse_limit("MARSH_MAX_FUNC_DEPTH", &value)?;
        }
        if let Some(value) = lookup("MARSH_ERROR_FORMAT") {
            config.error_format = match value.trim() {
                "json" => ErrorFormat::Json,
                "text" | "" => ErrorFormat::Text,
                other => bail!("MARSH_ERROR_FORMAT: unknown format '{}'", other),
            };
        }
        config.log_filter = lookup("MARSH_LOG").filter(|v| !v.trim().is_empty());
        Ok(config)
    }

    pub fn json_errors(&self) -> bool {
        self.error_format == ErrorFormat::Json
    }
}

fn parse_limit(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(anyhow!("{}: expected a positive integer, got '{}'", key, value)),
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Command(String),
    Script(PathBuf),
    /// Read a script from standard input.
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub mode: Mode,
    /// `$0` for `-c`, otherwise unused.
    pub name: Option<String>,
    pub args: Vec<String>,
    /// Options in command-line order: (`set -o` name, enabled).
    pub options: Vec<(String, bool)>,
    pub dump_ast: bool,
}

const USAGE: &str =
    "usage: marsh [-c STRING] [-eufx] [-o OPTION] [--pipefail] [--dump-ast] [script [args...]]";

impl Invocation {
    /// Parse arguments after the program name.
    pub fn parse(args: &[String], stdin_is_tty: bool) -> Result<Self> {
        let mut command = None;
        let mut options = Vec::new();
        let mut dump_ast = false;
        let mut i = 0;

        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "-c" => {
                    let text = args
                        .get(i + 1)
                        .ok_or_else(|| anyhow!("-c: option requires an argument"))?;
                    command = Some(text.clone());
                    i += 2;
                    continue;
                }
                "-o" | "+o" => {
                    let name = args
                        .get(i + 1)
                        .ok_or_else(|| anyhow!("{}: option requires an argument", arg))?;
                    options.push((name.clone(), arg == "-o"));
                    i += 2;
                    continue;
                }
                "--pipefail" => options.push(("pipefail".to_string(), true)),
                "--dump-ast" => dump_ast = true,
                "-h" | "--help" => bail!("{}", USAGE),
                "--" => {
                    i += 1;
                    break;
                }
                _ if (arg.starts_with('-') || arg.starts_with('+')) && arg.len() > 1 => {
                    let enable = arg.starts_with('-');
                    for letter in arg[1..].chars() {
                        let name = match letter {
                            'e' => "errexit",
                            'u' => "nounset",
                            'x' => "xtrace",
                            'f' => "noglob",
                            'C' => "noclobber",
                            'm' => "monitor",
                            _ => bail!("-{}: invalid option\n{}", letter, USAGE),
                        };
                        options.push((name.to_string(), enable));
                    }
                }
                _ => break,
            }
            i += 1;
        }

        let rest = &args[i..];
        let (mode, name, args) = match command {
            Some(text) => (
                Mode::Command(text),
                rest.first().cloned(),
                rest.iter().skip(1).cloned().collect(),
            ),
            None => match rest.split_first() {
                Some((script, args)) => (Mode::Script(PathBuf::from(script)), None, args.to_vec()),
                None if stdin_is_tty => (Mode::Interactive, None, Vec::new()),
                None => (Mode::Stdin, None, Vec::new()),
            },
        };

        Ok(Self {
            mode,
            name,
            args,
            options,
            dump_ast,
        })
    }
}
