use anyhow::{bail, Context, Result};
use marsh::config::{Invocation, Mode, ShellConfig};
use marsh::error::Unwind;
use marsh::executor::Executor;
use marsh::lexer::{LexMode, Lexer};
use marsh::parser::Parser;
use marsh::terminal::TerminalControl;
use reedline::{
    Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal,
};
use std::borrow::Cow;
use std::env;
use std::io::Read;
use std::path::Path;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Deep recursion in scripts is bounded by the configured limits, not by
/// the host stack, so the interpreter gets a generous one.
const INTERPRETER_STACK: usize = 256 * 1024 * 1024;

fn main() {
    let config = match ShellConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("marsh: {:#}", err);
            std::process::exit(2);
        }
    };
    init_logging(&config);

    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = match Invocation::parse(&args, atty::is(atty::Stream::Stdin)) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("marsh: {}", err);
            std::process::exit(2);
        }
    };

    let worker = thread::Builder::new()
        .name("marsh".to_string())
        .stack_size(INTERPRETER_STACK)
        .spawn(move || run(config, invocation));
    let status = match worker.map(|handle| handle.join()) {
        Ok(Ok(Ok(status))) => status,
        Ok(Ok(Err(err))) => {
            eprintln!("marsh: {:#}", err);
            2
        }
        Ok(Err(_)) => {
            eprintln!("marsh: interpreter thread panicked");
            70
        }
        Err(err) => {
            eprintln!("marsh: could not start interpreter: {}", err);
            70
        }
    };
    std::process::exit(status & 0xff);
}

/// Logs go to stderr, filtered by `MARSH_LOG`; nothing is logged when it is
/// unset.
fn init_logging(config: &ShellConfig) {
    let Some(directives) = config.log_filter.as_deref() else {
        return;
    };
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("marsh: MARSH_LOG: {}", err);
        EnvFilter::new("warn")
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(config: ShellConfig, invocation: Invocation) -> Result<i32> {
    let mut exec = Executor::from_env(config);
    for (name, enabled) in &invocation.options {
        if !exec.runtime.options.set_by_name(name, *enabled) {
            bail!("{}: invalid option name", name);
        }
    }
    seed_shell_variables(&mut exec);
    tracing::debug!(mode = ?invocation.mode, "starting");

    if invocation.dump_ast {
        return dump_ast(&invocation.mode);
    }

    match invocation.mode {
        Mode::Command(text) => {
            exec.runtime.script_name = invocation.name.unwrap_or_else(|| "marsh".to_string());
            exec.runtime.set_positional(invocation.args);
            Ok(exec.run_main(&text))
        }
        Mode::Script(path) => {
            let name = path.display().to_string();
            Ok(exec.run_script_file(&path, &name, invocation.args))
        }
        Mode::Stdin => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading script from standard input")?;
            Ok(exec.run_main(&text))
        }
        Mode::Interactive => interactive(exec),
    }
}

/// Variables every shell starts with, on top of the environment.
fn seed_shell_variables(exec: &mut Executor) {
    let level = exec
        .runtime
        .get("SHLVL")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0)
        + 1;
    let _ = exec.runtime.assign("SHLVL", level.to_string());
    let _ = exec.runtime.assign("PPID", std::os::unix::process::parent_id().to_string());
    if !exec.runtime.is_set("IFS") {
        let _ = exec.runtime.assign("IFS", " \t\n".to_string());
    }
    if !exec.runtime.is_set("PS3") {
        let _ = exec.runtime.assign("PS3", "#? ".to_string());
    }
}

/// `--dump-ast`: print the parsed program as JSON instead of running it.
fn dump_ast(mode: &Mode) -> Result<i32> {
    let source = match mode {
        Mode::Command(text) => text.clone(),
        Mode::Script(path) => read_script(path)?,
        Mode::Stdin | Mode::Interactive => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    let stream = Lexer::tokenize(&source, LexMode::Strict)?;
    let program = Parser::new(stream.tokens).parse_program()?;
    println!("{}", serde_json::to_string_pretty(&program)?);
    Ok(0)
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("{}", path.display()))
}

/// Prompt showing `$PS1` (or the working directory), and `$PS2` while a
/// command is unfinished.
struct MarshPrompt {
    left: String,
}

impl MarshPrompt {
    fn new(exec: &Executor, continuation: bool) -> Self {
        let left = if continuation {
            exec.runtime.get("PS2").unwrap_or_else(|| "> ".to_string())
        } else {
            exec.runtime.get("PS1").unwrap_or_else(default_prompt)
        };
        Self { left }
    }
}

fn default_prompt() -> String {
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(_) => return "marsh$ ".to_string(),
    };
    let relative = dirs::home_dir()
        .and_then(|home| cwd.strip_prefix(&home).ok().map(Path::to_path_buf));
    let shown = match relative {
        Some(suffix) if suffix.as_os_str().is_empty() => "~".to_string(),
        Some(suffix) => format!("~/{}", suffix.display()),
        None => cwd.display().to_string(),
    };
    format!("{}$ ", shown)
}

impl Prompt for MarshPrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        Cow::Borrowed(&self.left)
    }

    fn render_prompt_right(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse-search: {}) ", prefix, history_search.term))
    }
}

fn interactive(mut exec: Executor) -> Result<i32> {
    exec.runtime.interactive = true;
    match TerminalControl::acquire() {
        Ok(terminal) => {
            exec.runtime.options.monitor = terminal.is_enabled();
            exec.set_terminal(terminal);
        }
        Err(err) => tracing::warn!(error = %err, "job control unavailable"),
    }
    // the shell itself survives ^C; the flag is turned into an interruption
    // between commands
    exec.runtime
        .pending_signals
        .watch(libc::SIGINT)
        .context("installing SIGINT handler")?;
    exec.runtime
        .jobs
        .reaper()
        .spawn_listener()
        .context("starting SIGCHLD listener")?;

    let mut editor = Reedline::create();
    let mut pending = String::new();
    let mut line = 1;
    let mut start_line = 1;

    loop {
        exec.notify_jobs();
        let prompt = MarshPrompt::new(&exec, !pending.is_empty());
        match editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                if pending.is_empty() {
                    start_line = line;
                }
                line += buffer.matches('\n').count() + 1;
                pending.push_str(&buffer);
                pending.push('\n');

                let parsed = exec.parse_chunk(&pending, start_line);
                let list = match parsed {
                    Ok(None) => continue,
                    Ok(Some(list)) => list,
                    Err(err) => {
                        pending.clear();
                        exec.report(&err);
                        exec.runtime.last_status = err.status();
                        continue;
                    }
                };
                pending.clear();
                // a ^C typed at the prompt is not an interruption of this command
                let _ = exec.runtime.pending_signals.take();

                let status = match exec.execute_list(&list) {
                    Ok(status) => status,
                    Err(Unwind::Exit(status)) => return Ok(exec.run_exit_trap(status)),
                    Err(unwind) => exec.unwind_status(unwind),
                };
                exec.runtime.last_status = status;
            }
            Ok(Signal::CtrlC) => {
                pending.clear();
                let _ = exec.runtime.pending_signals.take();
            }
            Ok(Signal::CtrlD) => break,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading input"),
        }
    }

    let status = exec.runtime.last_status;
    Ok(exec.run_exit_trap(status))
}
