//! The execution engine: walks the AST, owning the interpreter context.

mod cond;
pub mod pipeline;
pub mod process;
pub mod redirect;
pub mod session;

use crate::builtins::Builtins;
use crate::config::ShellConfig;
use crate::error::{ExecResult, ShellError, SourceLocation, Unwind};
use crate::expansion;
use crate::expansion::pattern::ShellPattern;
use crate::lexer::{assignment_split, SourcePos};
use crate::parser::ast::*;
use crate::parser::word::parse_word;
use crate::parser::{is_name, parse_assignment};
use crate::runtime::{Runtime, Subscript};
use crate::signal::signal_name;
use crate::terminal::TerminalControl;
use process::{find_in_path, write_fd};
use std::os::unix::io::AsRawFd;
use std::rc::Rc;

/// Builtins whose `name=value` arguments are expanded like assignments.
const DECLARATION_BUILTINS: &[&str] = &["declare", "typeset", "local", "export", "readonly"];

/// How a loop body finished.
enum Flow {
    Normal(i32),
    Continue,
    Break,
}

pub struct Executor {
    pub runtime: Runtime,
    builtins: Builtins,
    terminal: TerminalControl,
    config: ShellConfig,
    /// Nesting of `if`/`while` conditions and `&&`/`||` left sides, where
    /// `set -e` does not apply.
    condition_depth: usize,
    /// This process is a forked copy of the shell.
    forked: bool,
    /// Status of the last command substitution in the current command.
    subst_status: Option<i32>,
    exit_trap_ran: bool,
    /// Nesting of `source` files, so `return` may leave them.
    source_depth: usize,
    /// Script name for diagnostics.
    source_name: Option<String>,
    /// Line of the command being run.
    line: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

impl Executor {
    /// An executor with an empty environment.
    pub fn new(config: ShellConfig) -> Self {
        let mut runtime = Runtime::new();
        runtime.apply_config(&config);
        Self::with_runtime(runtime, config)
    }

    /// An executor seeded from the process environment.
    pub fn from_env(config: ShellConfig) -> Self {
        let runtime = Runtime::from_env(&config);
        Self::with_runtime(runtime, config)
    }

    fn with_runtime(runtime: Runtime, config: ShellConfig) -> Self {
        Self {
            runtime,
            builtins: Builtins::new(),
            terminal: TerminalControl::disabled(),
            config,
            condition_depth: 0,
            forked: false,
            subst_status: None,
            exit_trap_ran: false,
            source_depth: 0,
            source_name: None,
            line: 0,
        }
    }

    pub fn set_terminal(&mut self, terminal: TerminalControl) {
        self.terminal = terminal;
    }

    pub(crate) fn terminal(&self) -> &TerminalControl {
        &self.terminal
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn set_source_name(&mut self, name: Option<String>) {
        self.source_name = name;
    }

    pub fn is_sourcing(&self) -> bool {
        self.source_depth > 0
    }

    /// Write to standard output.
    pub fn print(&self, text: &str) -> Result<(), ShellError> {
        write_fd(1, text.as_bytes()).map_err(ShellError::Io)
    }

    /// Write to standard error, ignoring failures.
    pub fn eprint(&self, text: &str) {
        let _ = write_fd(2, text.as_bytes());
    }

    /// Print a diagnostic for `err` on the error channel.
    pub fn report(&self, err: &ShellError) {
        let mut diagnostic = err.to_diagnostic();
        if diagnostic.location.is_none() && self.source_name.is_some() && self.line > 0 {
            diagnostic = diagnostic.with_location(SourceLocation::new(self.line, 1));
        }
        if !self.runtime.call_stack.is_empty() {
            let name = match err {
                ShellError::Exec { name, .. } => name.clone(),
                _ => self.runtime.call_stack.current_function().unwrap_or_default().to_string(),
            };
            let context = self.runtime.call_stack.create_context(name);
            diagnostic = diagnostic.with_command_context(context);
        }
        let text = diagnostic
            .in_file(self.source_name.as_deref())
            .render(self.config.json_errors());
        self.eprint(&format!("{}\n", text));
    }

    /// The exit status an unwinding error leaves behind at the top of a
    /// process.
    pub fn unwind_status(&mut self, unwind: Unwind) -> i32 {
        match unwind {
            Unwind::Exit(status) | Unwind::Return(status) => status,
            Unwind::Break(_) | Unwind::Continue(_) => self.runtime.last_status,
            Unwind::Error(err) => {
                self.report(&err);
                err.status()
            }
        }
    }

    fn in_condition<F>(&mut self, f: F) -> ExecResult
    where
        F: FnOnce(&mut Self) -> ExecResult,
    {
        self.condition_depth += 1;
        let result = f(self);
        self.condition_depth -= 1;
        result
    }

    pub fn execute_list(&mut self, list: &List) -> ExecResult {
        let mut status = 0;
        for item in &list.items {
            status = if item.background {
                self.spawn_background(&item.and_or)?;
                self.runtime.last_status = 0;
                0
            } else {
                self.execute_and_or(&item.and_or)?
            };
            self.run_pending_traps()?;
        }
        Ok(status)
    }

    pub fn execute_and_or(&mut self, and_or: &AndOr) -> ExecResult {
        let last = and_or.rest.len();
        let mut status = self.run_and_or_step(&and_or.first, last == 0)?;
        for (i, (connector, pipeline)) in and_or.rest.iter().enumerate() {
            let run = match connector {
                Connector::And => status == 0,
                Connector::Or => status != 0,
            };
            if run {
                status = self.run_and_or_step(pipeline, i + 1 == last)?;
            }
        }
        Ok(status)
    }

    fn run_and_or_step(&mut self, pipeline: &Pipeline, last: bool) -> ExecResult {
        let status = if last {
            self.execute_pipeline(pipeline)?
        } else {
            self.in_condition(|exec| exec.execute_pipeline(pipeline))?
        };
        self.runtime.last_status = status;
        if last
            && status != 0
            && !pipeline.negate
            && self.runtime.options.errexit
            && self.condition_depth == 0
        {
            tracing::debug!(status, "errexit");
            return Err(Unwind::Exit(status));
        }
        Ok(status)
    }

    /// Run one command. Errors that are not fatal are reported here and
    /// become the command's exit status.
    pub fn execute_command(&mut self, command: &Command, tail: bool) -> ExecResult {
        let result = match command {
            Command::Simple(simple) => self.execute_simple(simple, tail),
            Command::Compound(compound, redirects) => {
                match self.apply_redirects(redirects) {
                    Ok(_guard) => self.execute_compound(compound, tail),
                    Err(err) => Err(err.into()),
                }
            }
            Command::FunctionDef(def) => {
                self.runtime.define_function(&def.name, (*def.body).clone());
                Ok(0)
            }
        };
        match result {
            // the nesting limit abandons the whole call chain
            Err(Unwind::Error(err @ ShellError::RecursionLimit { .. }))
                if !self.runtime.call_stack.is_empty() =>
            {
                Err(Unwind::Error(err))
            }
            Err(Unwind::Error(err)) if !err.is_fatal() => {
                self.report(&err);
                Ok(err.status())
            }
            other => other,
        }
    }

    fn execute_compound(&mut self, compound: &CompoundCommand, tail: bool) -> ExecResult {
        match compound {
            CompoundCommand::BraceGroup(list) => self.execute_list(list),
            CompoundCommand::Subshell(list) => {
                if tail {
                    return self.execute_list(list);
                }
                let pid = self.fork_child(None, true, |exec| match exec.execute_list(list) {
                    Ok(status) => status,
                    Err(unwind) => exec.unwind_status(unwind),
                })?;
                if self.job_control() {
                    let _ = self.terminal.give_to(pid);
                }
                Ok(self.wait_foreground(pid, &[pid], "( ... )")[0])
            }
            CompoundCommand::If {
                branches,
                else_branch,
            } => {
                for (condition, body) in branches {
                    if self.in_condition(|exec| exec.execute_list(condition))? == 0 {
                        return self.execute_list(body);
                    }
                }
                match else_branch {
                    Some(body) => self.execute_list(body),
                    None => Ok(0),
                }
            }
            CompoundCommand::While {
                condition,
                body,
                until,
            } => self.with_loop(|exec| {
                let mut status = 0;
                loop {
                    let passed = exec.in_condition(|e| e.execute_list(condition))? == 0;
                    if passed == *until {
                        break;
                    }
                    match exec.loop_body(body)? {
                        Flow::Normal(s) => status = s,
                        Flow::Continue => continue,
                        Flow::Break => break,
                    }
                }
                Ok(status)
            }),
            CompoundCommand::For { var, words, body } => {
                let items = match words {
                    Some(words) => expansion::expand_words(self, words)?,
                    None => self.runtime.positional().to_vec(),
                };
                self.with_loop(|exec| {
                    let mut status = 0;
                    for item in items {
                        exec.runtime.assign(var, item)?;
                        match exec.loop_body(body)? {
                            Flow::Normal(s) => status = s,
                            Flow::Continue => continue,
                            Flow::Break => break,
                        }
                    }
                    Ok(status)
                })
            }
            CompoundCommand::CFor {
                init,
                condition,
                update,
                body,
            } => self.with_loop(|exec| {
                let mut status = 0;
                if !init.trim().is_empty() {
                    expansion::expand_arith(exec, init)?;
                }
                loop {
                    if !condition.trim().is_empty()
                        && expansion::expand_arith(exec, condition)? == 0
                    {
                        break;
                    }
                    match exec.loop_body(body)? {
                        Flow::Normal(s) => status = s,
                        Flow::Continue => {}
                        Flow::Break => break,
                    }
                    if !update.trim().is_empty() {
                        expansion::expand_arith(exec, update)?;
                    }
                }
                Ok(status)
            }),
            CompoundCommand::Case { subject, arms } => self.execute_case(subject, arms),
            CompoundCommand::Select { var, words, body } => {
                self.execute_select(var, words.as_deref(), body)
            }
            CompoundCommand::Arith(source) => {
                let value = expansion::expand_arith(self, source)?;
                Ok(if value != 0 { 0 } else { 1 })
            }
            CompoundCommand::Cond(expr) => Ok(self.execute_cond(expr)?),
        }
    }

    fn with_loop<F>(&mut self, f: F) -> ExecResult
    where
        F: FnOnce(&mut Self) -> ExecResult,
    {
        self.runtime.loop_depth += 1;
        let result = f(self);
        self.runtime.loop_depth -= 1;
        result
    }

    fn loop_body(&mut self, body: &List) -> Result<Flow, Unwind> {
        match self.execute_list(body) {
            Ok(status) => Ok(Flow::Normal(status)),
            Err(Unwind::Break(n)) if n > 1 => Err(Unwind::Break(n - 1)),
            Err(Unwind::Break(_)) => Ok(Flow::Break),
            Err(Unwind::Continue(n)) if n > 1 => Err(Unwind::Continue(n - 1)),
            Err(Unwind::Continue(_)) => Ok(Flow::Continue),
            Err(other) => Err(other),
        }
    }

    fn execute_case(&mut self, subject: &Word, arms: &[CaseArm]) -> ExecResult {
        let subject = expansion::expand_string(self, subject)?;
        let mut status = 0;
        let mut fall_through = false;
        for arm in arms {
            if !fall_through && !self.case_matches(&subject, &arm.patterns)? {
                continue;
            }
            status = self.execute_list(&arm.body)?;
            match arm.terminator {
                CaseTerminator::Break => return Ok(status),
                CaseTerminator::FallThrough => fall_through = true,
                CaseTerminator::Continue => fall_through = false,
            }
        }
        Ok(status)
    }

    fn case_matches(&mut self, subject: &str, patterns: &[Word]) -> Result<bool, ShellError> {
        for pattern in patterns {
            let source = expansion::expand_pattern(self, pattern)?;
            if ShellPattern::new(&source).matches(subject) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn execute_select(&mut self, var: &str, words: Option<&[Word]>, body: &List) -> ExecResult {
        let items = match words {
            Some(words) => expansion::expand_words(self, words)?,
            None => self.runtime.positional().to_vec(),
        };
        if items.is_empty() {
            return Ok(0);
        }
        let menu: String = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}) {}\n", i + 1, item))
            .collect();
        self.with_loop(|exec| {
            let mut status = 0;
            let mut show_menu = true;
            loop {
                if show_menu {
                    exec.eprint(&menu);
                }
                let prompt = exec.runtime.get("PS3").unwrap_or_else(|| "#? ".to_string());
                exec.eprint(&prompt);
                let Some(line) = crate::builtins::read::read_line(0, '\n')? else {
                    exec.eprint("\n");
                    return Ok(1);
                };
                exec.runtime.assign("REPLY", line.clone())?;
                show_menu = line.trim().is_empty();
                if show_menu {
                    continue;
                }
                let choice = line
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default();
                exec.runtime.assign(var, choice)?;
                match exec.loop_body(body)? {
                    Flow::Normal(s) => status = s,
                    Flow::Continue => {}
                    Flow::Break => break,
                }
            }
            Ok(status)
        })
    }

    /// Expand command words. Assignment-shaped arguments of declaration
    /// builtins are expanded as assignments: no splitting or globbing.
    fn expand_command_words(&mut self, words: &[Word]) -> Result<Vec<String>, ShellError> {
        let declaration = words
            .first()
            .and_then(Word::as_plain)
            .map(|name| DECLARATION_BUILTINS.contains(&name))
            .unwrap_or(false);
        if !declaration {
            return expansion::expand_words(self, words);
        }
        let mut argv = vec![words[0].raw.clone()];
        for word in &words[1..] {
            match assignment_split(&word.raw) {
                Some((target, value)) if value.starts_with('(') && value.ends_with(')') => {
                    argv.push(format!("{}={}", target, value));
                }
                Some((target, value)) => {
                    let value = parse_word(value)
                        .map_err(|e| ShellError::BadSubstitution(e.to_string()))?;
                    let value = expansion::expand_string(self, &value)?;
                    argv.push(format!("{}={}", target, value));
                }
                None => argv.extend(expansion::expand_words(self, std::slice::from_ref(word))?),
            }
        }
        Ok(argv)
    }

    fn execute_simple(&mut self, cmd: &SimpleCommand, tail: bool) -> ExecResult {
        self.line = cmd.pos.line;
        self.subst_status = None;
        let argv = self.expand_command_words(&cmd.words)?;

        if argv.is_empty() {
            let _guard = self.apply_redirects(&cmd.redirects)?;
            for assignment in &cmd.assignments {
                self.perform_assignment(assignment, false)?;
            }
            if self.runtime.options.xtrace && !cmd.assignments.is_empty() {
                let traced: Vec<String> = cmd
                    .assignments
                    .iter()
                    .map(|a| {
                        format!("{}={}", a.name, self.runtime.get(&a.name).unwrap_or_default())
                    })
                    .collect();
                self.trace(&traced);
            }
            return Ok(self.subst_status.unwrap_or(0));
        }

        if self.runtime.options.xtrace {
            self.trace(&argv);
        }

        let name = argv[0].as_str();
        if let Some(body) = self.runtime.function(name) {
            let _guard = self.apply_redirects(&cmd.redirects)?;
            return self.with_prefix_frame(&cmd.assignments, |exec| {
                exec.call_function(&argv[0], body, argv[1..].to_vec())
            });
        }

        if let Some(builtin) = self.builtins.get(name) {
            let _guard = self.apply_redirects(&cmd.redirects)?;
            return self.with_prefix_frame(&cmd.assignments, |exec| builtin(exec, &argv[1..]));
        }

        let path = self.runtime.get("PATH");
        if find_in_path(name, path.as_deref()).is_none() {
            let _guard = self.apply_redirects(&cmd.redirects)?;
            return Err(ShellError::exec(name, "command not found", 127).into());
        }

        let _guard = self.apply_redirects(&cmd.redirects)?;
        let env = self.child_environment(&cmd.assignments)?;
        if tail && !self.runtime.traps.contains_key("EXIT") {
            return Ok(self.exec_in_child(&argv, &env));
        }
        tracing::debug!(command = %argv[0], "spawning");
        let pid = self.fork_child(None, true, |exec| exec.exec_in_child(&argv, &env))?;
        if self.job_control() {
            let _ = self.terminal.give_to(pid);
        }
        Ok(self.wait_foreground(pid, &[pid], &argv.join(" "))[0])
    }

    fn trace(&self, words: &[String]) {
        let prefix = self.runtime.get("PS4").unwrap_or_else(|| "+ ".to_string());
        let quoted: Vec<String> = words.iter().map(|w| quote_for_trace(w)).collect();
        self.eprint(&format!("{}{}\n", prefix, quoted.join(" ")));
    }

    /// Run `f` with prefix assignments bound in a temporary frame.
    fn with_prefix_frame<F>(&mut self, assignments: &[Assignment], f: F) -> ExecResult
    where
        F: FnOnce(&mut Self) -> ExecResult,
    {
        if assignments.is_empty() {
            return f(self);
        }
        self.runtime.scopes.push_frame();
        let mut result = Ok(0);
        for assignment in assignments {
            if let Err(err) = self.perform_assignment(assignment, true) {
                result = Err(err.into());
                break;
            }
            self.runtime.scopes.local_entry(&assignment.name).attrs.exported = true;
        }
        if result.is_ok() {
            result = f(self);
        }
        self.runtime.scopes.pop_frame();
        result
    }

    /// Exported variables plus the command's prefix assignments.
    fn child_environment(
        &mut self,
        assignments: &[Assignment],
    ) -> Result<Vec<(String, String)>, ShellError> {
        let mut env = self.runtime.exported();
        for assignment in assignments {
            if let (AssignValue::Scalar(word), None) = (&assignment.value, &assignment.subscript) {
                let mut value = expansion::expand_string(self, word)?;
                if assignment.append {
                    value = self.runtime.get(&assignment.name).unwrap_or_default() + &value;
                }
                env.retain(|(name, _)| name != &assignment.name);
                env.push((assignment.name.clone(), value));
            }
        }
        Ok(env)
    }

    /// Evaluate an array subscript for `name`.
    fn subscript_for(&mut self, name: &str, raw: &str) -> Result<Subscript, ShellError> {
        if self.runtime.is_assoc(name) {
            let word = parse_word(raw).map_err(|e| ShellError::BadSubstitution(e.to_string()))?;
            Ok(Subscript::Key(expansion::expand_string(self, &word)?))
        } else {
            Ok(Subscript::Index(expansion::expand_arith(self, raw)?))
        }
    }

    fn array_elements(
        &mut self,
        name: &str,
        elements: &[ArrayElement],
    ) -> Result<Vec<(Option<Subscript>, String)>, ShellError> {
        let mut values = Vec::new();
        for element in elements {
            match &element.key {
                Some(key) => {
                    let subscript = self.subscript_for(name, key)?;
                    values.push((Some(subscript), expansion::expand_string(self, &element.value)?));
                }
                None => {
                    let words = std::slice::from_ref(&element.value);
                    for value in expansion::expand_words(self, words)? {
                        values.push((None, value));
                    }
                }
            }
        }
        Ok(values)
    }

    /// Perform one assignment; `local` binds it in the top frame.
    pub fn perform_assignment(
        &mut self,
        assignment: &Assignment,
        local: bool,
    ) -> Result<(), ShellError> {
        let name = assignment.name.as_str();
        match (&assignment.value, &assignment.subscript) {
            (AssignValue::Scalar(word), None) => {
                let value = expansion::expand_string(self, word)?;
                if assignment.append {
                    self.runtime.append(name, value)
                } else if local {
                    self.runtime.assign_local(name, value)
                } else {
                    self.runtime.assign(name, value)
                }
            }
            (AssignValue::Scalar(word), Some(raw)) => {
                let subscript = self.subscript_for(name, raw)?;
                let mut value = expansion::expand_string(self, word)?;
                if assignment.append {
                    value = self.runtime.get_element(name, &subscript).unwrap_or_default() + &value;
                }
                self.runtime.assign_element(name, subscript, value)
            }
            (AssignValue::Array(elements), _) => {
                if local && !self.runtime.scopes.has_local(name) {
                    self.runtime.scopes.local_entry(name);
                }
                let values = self.array_elements(name, elements)?;
                self.runtime.assign_array(name, values, assignment.append)
            }
        }
    }

    /// Apply an already-expanded `name=value` argument of a declaration
    /// builtin. Returns the variable name.
    pub fn declare_assignment(&mut self, text: &str, local: bool) -> Result<String, ShellError> {
        let invalid =
            || ShellError::exec("declare", format!("`{}': not a valid identifier", text), 1);
        let (target, value) = assignment_split(text).ok_or_else(invalid)?;
        let (target, append) = match target.strip_suffix('+') {
            Some(target) => (target, true),
            None => (target, false),
        };
        let name = target.split('[').next().unwrap_or(target).to_string();
        if !is_name(&name) {
            return Err(invalid());
        }
        if local && !self.runtime.scopes.has_local(&name) {
            let inherited = self.runtime.attributes(&name);
            self.runtime.scopes.local_entry(&name).attrs.integer = inherited.integer;
        }

        if target.contains('[') {
            let raw = &target[name.len() + 1..target.len() - 1];
            let subscript = self.subscript_for(&name, raw)?;
            let mut value = value.to_string();
            if append {
                value = self.runtime.get_element(&name, &subscript).unwrap_or_default() + &value;
            }
            self.runtime.assign_element(&name, subscript, value)?;
        } else if value.starts_with('(') && value.ends_with(')') {
            let parsed = parse_assignment(text, SourcePos::default())?.ok_or_else(invalid)?;
            self.perform_assignment(&parsed, false)?;
        } else if append {
            self.runtime.append(&name, value.to_string())?;
        } else {
            self.runtime.assign(&name, value.to_string())?;
        }
        Ok(name)
    }

    /// Call a shell function with `args` as its positional parameters.
    pub fn call_function(
        &mut self,
        name: &str,
        body: Rc<Command>,
        args: Vec<String>,
    ) -> ExecResult {
        self.runtime.call_stack.push(name, Some(self.line))?;
        tracing::trace!(function = name, depth = self.runtime.call_stack.depth(), "call");
        let saved_positional = self.runtime.set_positional(args);
        let saved_loops = std::mem::replace(&mut self.runtime.loop_depth, 0);
        self.runtime.scopes.push_frame();

        let result = self.execute_command(&body, false);

        self.runtime.scopes.pop_frame();
        self.runtime.loop_depth = saved_loops;
        self.runtime.set_positional(saved_positional);
        self.runtime.call_stack.pop();

        match result {
            Err(Unwind::Return(status)) => Ok(status),
            other => other,
        }
    }

    /// Run `source` in a forked copy of the shell and capture its output,
    /// trailing newlines removed.
    pub fn command_substitution(&mut self, source: &str) -> Result<String, ShellError> {
        let limit = self.runtime.limits.max_subst_depth;
        if self.runtime.subst_depth >= limit {
            tracing::warn!(limit, "command substitution nesting limit reached");
            return Err(ShellError::RecursionLimit {
                what: "command substitution",
                limit,
            });
        }
        let (reader, writer) = os_pipe::pipe()?;
        let (read_fd, write_fd_raw) = (reader.as_raw_fd(), writer.as_raw_fd());
        // stay in the shell's group so terminal reads are not stopped
        let group = self.job_control().then(|| self.terminal.shell_pgid().as_raw());
        let pid = self.fork_child(group, false, |exec| {
            unsafe {
                libc::dup2(write_fd_raw, 1);
                libc::close(write_fd_raw);
                libc::close(read_fd);
            }
            exec.runtime.subst_depth += 1;
            match exec.run_string(source) {
                Ok(status) => status,
                Err(unwind) => exec.unwind_status(unwind),
            }
        })?;
        drop(writer);
        let output = process::read_to_end(reader.as_raw_fd());
        drop(reader);
        let status = self.wait_foreground(pid, &[pid], source)[0];
        self.subst_status = Some(status);
        self.runtime.last_status = status;
        let output = output?;
        let mut text = String::from_utf8_lossy(&output).into_owned();
        while text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    /// Run the actions of signals that arrived since the last check.
    pub fn run_pending_traps(&mut self) -> Result<(), Unwind> {
        for signal in self.runtime.pending_signals.take() {
            let name = signal_name(signal).unwrap_or_default();
            match self.runtime.traps.get(name).cloned() {
                Some(action) if action.is_empty() => {}
                Some(action) => {
                    tracing::debug!(signal = name, "running trap");
                    let saved = self.runtime.last_status;
                    self.run_string(&action)?;
                    self.runtime.last_status = saved;
                }
                None if signal == libc::SIGINT && self.runtime.interactive => {
                    return Err(ShellError::Interrupted.into());
                }
                None => {
                    tracing::debug!(signal = name, "untrapped signal");
                    return Err(Unwind::Exit(128 + signal));
                }
            }
        }
        Ok(())
    }

    /// Run the EXIT trap once, returning the shell's final status.
    pub fn run_exit_trap(&mut self, status: i32) -> i32 {
        if self.exit_trap_ran {
            return status;
        }
        self.exit_trap_ran = true;
        let Some(action) = self.runtime.traps.remove("EXIT") else {
            return status;
        };
        if action.is_empty() {
            return status;
        }
        self.runtime.last_status = status;
        match self.run_string(&action) {
            Err(Unwind::Exit(code)) => code,
            Err(Unwind::Error(err)) => {
                self.report(&err);
                status
            }
            _ => status,
        }
    }

    /// Fold in background job changes. An interactive shell reports and
    /// forgets finished jobs; a script keeps them for `wait`, `fg` and `jobs`.
    pub fn notify_jobs(&mut self) {
        self.runtime.jobs.refresh();
        if !self.runtime.interactive {
            return;
        }
        for job in self.runtime.jobs.take_finished() {
            self.eprint(&format!("[{}]  {}    {}\n", job.id, job.status().describe(), job.command));
        }
    }

    pub(crate) fn is_forked(&self) -> bool {
        self.forked
    }
}

/// Quote a word for `set -x` output when it would not read back as itself.
fn quote_for_trace(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%^".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}
