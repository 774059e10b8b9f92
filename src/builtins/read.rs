use crate::error::{ExecResult, ShellError};
use crate::executor::Executor;
use crate::parser::is_name;
use crate::runtime::Subscript;
use std::io;
use std::time::{Duration, Instant};

/// Options for the read command
#[derive(Debug, Default, PartialEq)]
struct ReadOptions {
    /// Prompt string to display
    prompt: Option<String>,
    /// Silent mode (don't echo input)
    silent: bool,
    /// Timeout in seconds
    timeout: Option<f64>,
    /// Raw mode (no backslash processing)
    raw: bool,
    /// Read the fields into this indexed array
    array: Option<String>,
    /// Line delimiter
    delimiter: Option<char>,
    /// Variable names to read into
    variables: Vec<String>,
}

impl ReadOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = ReadOptions::default();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            if arg == "--" {
                opts.variables.extend(args[i + 1..].iter().cloned());
                break;
            }
            if arg.starts_with('-') && arg.len() > 1 {
                let mut flags = arg[1..].chars();
                while let Some(flag) = flags.next() {
                    match flag {
                        's' => opts.silent = true,
                        'r' => opts.raw = true,
                        'p' | 't' | 'a' | 'd' => {
                            // the value is the rest of this word, or the next word
                            let rest: String = flags.by_ref().collect();
                            let value = if !rest.is_empty() {
                                rest
                            } else {
                                i += 1;
                                args.get(i)
                                    .cloned()
                                    .ok_or_else(|| {
                                        format!("-{}: option requires an argument", flag)
                                    })?
                            };
                            match flag {
                                'p' => opts.prompt = Some(value),
                                'a' => opts.array = Some(value),
                                'd' => opts.delimiter = Some(value.chars().next().unwrap_or('\0')),
                                _ => {
                                    let secs = value
                                        .parse::<f64>()
                                        .ok()
                                        .filter(|s| *s >= 0.0)
                                        .ok_or_else(|| {
                                            format!("{}: invalid timeout specification", value)
                                        })?;
                                    opts.timeout = Some(secs);
                                }
                            }
                        }
                        _ => return Err(format!("-{}: invalid option", flag)),
                    }
                }
            } else {
                opts.variables.push(arg.clone());
            }
            i += 1;
        }

        if let Some(name) = opts.variables.iter().chain(opts.array.iter()).find(|n| !is_name(n)) {
            return Err(format!("`{}': not a valid identifier", name));
        }
        if opts.variables.is_empty() && opts.array.is_none() {
            opts.variables.push("REPLY".to_string());
        }
        Ok(opts)
    }
}

/// `read [-rs] [-a array] [-d delim] [-p prompt] [-t secs] [name ...]`
///
/// Reads one line from standard input and splits it on `$IFS`; the last
/// name receives the rest of the line. Status 1 at end of input, 142 on
/// timeout.
pub fn builtin_read(exec: &mut Executor, args: &[String]) -> ExecResult {
    let opts = ReadOptions::parse(args).map_err(|message| ShellError::exec("read", message, 2))?;

    if let Some(prompt) = &opts.prompt {
        if unsafe { libc::isatty(0) } == 1 {
            exec.eprint(prompt);
        }
    }

    let echo = if opts.silent { EchoGuard::disable(0) } else { None };
    let deadline = opts.timeout.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    let delimiter = opts.delimiter.unwrap_or('\n');

    let mut line = String::new();
    let mut complete = false;
    loop {
        let chunk = match read_until(0, delimiter, deadline) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                drop(echo);
                return Ok(142);
            }
            Err(err) => return Err(ShellError::exec("read", err.to_string(), 1).into()),
        };
        complete = chunk.terminated;
        line.push_str(&chunk.text);
        // backslash-newline continues the line unless raw
        if !opts.raw && complete && delimiter == '\n' && ends_with_odd_backslash(&line) {
            line.pop();
            continue;
        }
        break;
    }
    if opts.silent {
        exec.eprint("\n");
    }
    drop(echo);

    if line.is_empty() && !complete {
        return Ok(1);
    }

    let ifs = exec.runtime.ifs();
    let fields = if let Some(array) = &opts.array {
        let fields = split_fields(&line, &ifs, usize::MAX, opts.raw);
        let elements = fields.into_iter().map(|f| (None::<Subscript>, f)).collect();
        exec.runtime.assign_array(array, elements, false)?;
        Vec::new()
    } else {
        split_fields(&line, &ifs, opts.variables.len(), opts.raw)
    };
    for (i, name) in opts.variables.iter().enumerate() {
        let value = fields.get(i).cloned().unwrap_or_default();
        exec.runtime.assign(name, value)?;
    }

    Ok(if complete { 0 } else { 1 })
}

fn ends_with_odd_backslash(text: &str) -> bool {
    text.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

pub struct Chunk {
    pub text: String,
    /// The delimiter was seen, as opposed to end of input.
    pub terminated: bool,
}

/// Read one byte at a time so no input past the delimiter is consumed;
/// the rest belongs to whatever reads the descriptor next.
fn read_until(fd: i32, delimiter: char, deadline: Option<Instant>) -> io::Result<Option<Chunk>> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    let delimiter = delimiter as u32 as u8;
    loop {
        if let Some(deadline) = deadline {
            wait_readable(fd, deadline)?;
        }
        let n = unsafe { libc::read(fd, byte.as_mut_ptr() as *mut libc::c_void, 1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            if bytes.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Chunk {
                text: String::from_utf8_lossy(&bytes).into_owned(),
                terminated: false,
            }));
        }
        if byte[0] == delimiter {
            return Ok(Some(Chunk {
                text: String::from_utf8_lossy(&bytes).into_owned(),
                terminated: true,
            }));
        }
        bytes.push(byte[0]);
    }
}

fn wait_readable(fd: i32, deadline: Instant) -> io::Result<()> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = remaining.as_millis().min(i32::MAX as u128) as i32;
        let n = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }
        return Ok(());
    }
}

/// Read a line from `fd` without its delimiter. `None` at end of input.
pub fn read_line(fd: i32, delimiter: char) -> io::Result<Option<String>> {
    Ok(read_until(fd, delimiter, None)?.map(|chunk| chunk.text))
}

/// Turns terminal echo off until dropped.
struct EchoGuard {
    fd: i32,
    saved: libc::termios,
}

impl EchoGuard {
    fn disable(fd: i32) -> Option<Self> {
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut termios) != 0 {
                return None;
            }
            let saved = termios;
            termios.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
                return None;
            }
            Some(Self { fd, saved })
        }
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}

/// Split `line` into at most `count` fields on `ifs`. Whitespace separators
/// collapse; other separators delimit exactly one field. The last field
/// keeps the rest of the line. Without `raw`, a backslash quotes the next
/// character.
fn split_fields(line: &str, ifs: &str, count: usize, raw: bool) -> Vec<String> {
    let is_ws = |c: char| ifs.contains(c) && c.is_whitespace();
    let is_sep = |c: char| ifs.contains(c);

    // (character, escaped)
    let mut chars: Vec<(char, bool)> = Vec::with_capacity(line.len());
    let mut iter = line.chars();
    while let Some(c) = iter.next() {
        if c == '\\' && !raw {
            if let Some(next) = iter.next() {
                chars.push((next, true));
            }
        } else {
            chars.push((c, false));
        }
    }

    let mut fields = Vec::new();
    let mut i = 0;
    while i < chars.len() && !chars[i].1 && is_ws(chars[i].0) {
        i += 1;
    }
    while i < chars.len() && fields.len() < count {
        if fields.len() + 1 == count {
            // last field: rest of line minus trailing IFS whitespace
            let mut end = chars.len();
            while end > i && !chars[end - 1].1 && is_ws(chars[end - 1].0) {
                end -= 1;
            }
            fields.push(chars[i..end].iter().map(|(c, _)| *c).collect());
            break;
        }
        let mut field = String::new();
        while i < chars.len() && (chars[i].1 || !is_sep(chars[i].0)) {
            field.push(chars[i].0);
            i += 1;
        }
        fields.push(field);
        // one separator: surrounding whitespace plus at most one non-space
        while i < chars.len() && !chars[i].1 && is_ws(chars[i].0) {
            i += 1;
        }
        if i < chars.len() && !chars[i].1 && is_sep(chars[i].0) && !is_ws(chars[i].0) {
            i += 1;
            while i < chars.len() && !chars[i].1 && is_ws(chars[i].0) {
                i += 1;
            }
        }
    }
    fields
}
