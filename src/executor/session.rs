//! Running source text: strings, sourced files and scripts.
//!
//! Source is consumed one complete command at a time, so an alias defined
//! on one line applies from the next, and a syntax error discards only the
//! command it occurs in.
//!
//! Each line is lexed once. Only text inside an open quote, here-document
//! or `[[` is lexed again when the next line arrives, and the parser runs
//! only once every compound command the lines opened has been closed.

use super::Executor;
use crate::error::{ExecResult, ShellError, Unwind};
use crate::lexer::{LexError, LexMode, Lexer, Operator, Token, TokenKind};
use crate::parser::ast::List;
use crate::parser::Parser;
use std::path::Path;

/// Lines collected towards one complete command.
#[derive(Default)]
struct PendingCommand {
    tokens: Vec<Token>,
    /// Lines that do not lex to complete tokens yet.
    text: String,
    text_line: usize,
    first_line: usize,
    /// Compound commands opened minus those closed.
    depth: isize,
}

impl PendingCommand {
    /// Add a line. Returns the tokens gathered so far once they are worth
    /// handing to the parser.
    fn feed(&mut self, line: &str, number: usize) -> Result<Option<Vec<Token>>, LexError> {
        if self.is_blank() {
            self.first_line = number;
        }
        if self.text.is_empty() {
            self.text_line = number;
        }
        self.text.push_str(line);

        let stream = Lexer::new(&self.text, LexMode::Lenient)
            .starting_line(self.text_line)
            .run()?;
        if stream.incomplete || open_conditionals(&stream.tokens) > 0 {
            return Ok(None);
        }
        self.text.clear();
        self.depth += nesting_change(&stream.tokens);
        self.tokens.extend(stream.tokens);
        if self.depth > 0 {
            return Ok(None);
        }
        Ok(Some(self.tokens.clone()))
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.tokens.iter().all(|t| t.kind == TokenKind::Newline)
    }

    fn clear(&mut self) {
        *self = PendingCommand::default();
    }
}

fn open_conditionals(tokens: &[Token]) -> isize {
    tokens.iter().fold(0, |open, token| match token.kind {
        TokenKind::Operator(Operator::DBracketOpen) => open + 1,
        TokenKind::Operator(Operator::DBracketClose) => open - 1,
        _ => open,
    })
}

/// Reserved words opening and closing compound commands. Parentheses are
/// left out, since case patterns close more than they open, and an opener
/// followed by `)` or `|` is itself a case pattern.
fn nesting_change(tokens: &[Token]) -> isize {
    let mut change = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Word || !token.flags.command_start || token.flags.quoted {
            continue;
        }
        let in_pattern = tokens
            .get(i + 1)
            .map(|next| next.is_operator(Operator::RParen) || next.is_operator(Operator::Pipe))
            .unwrap_or(false);
        change += match token.text.as_str() {
            "if" | "while" | "until" | "for" | "select" | "case" | "{" if !in_pattern => 1,
            "fi" | "done" | "esac" | "}" => -1,
            _ => 0,
        };
    }
    change
}

impl Executor {
    /// Parse `text` as one or more complete commands. `Ok(None)` means the
    /// text ends inside an unfinished construct.
    pub fn parse_chunk(&self, text: &str, first_line: usize) -> Result<Option<List>, ShellError> {
        let stream = Lexer::new(text, LexMode::Lenient).starting_line(first_line).run()?;
        if stream.incomplete {
            return Ok(None);
        }
        match Parser::new(stream.tokens)
            .with_aliases(self.runtime.aliases())
            .parse_program()
        {
            Ok(list) => Ok(Some(list)),
            Err(err) if err.incomplete => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Execute `source` in the current shell.
    pub fn run_string(&mut self, source: &str) -> ExecResult {
        let mut status = 0;
        let mut pending = PendingCommand::default();

        for (index, line) in source.split_inclusive('\n').enumerate() {
            let tokens = match pending.feed(line, index + 1) {
                Ok(Some(tokens)) => tokens,
                Ok(None) => continue,
                Err(err) => {
                    status = self.discard_command(&mut pending, &err.into());
                    continue;
                }
            };
            match Parser::new(tokens).with_aliases(self.runtime.aliases()).parse_program() {
                Ok(list) => {
                    pending.clear();
                    if !list.items.is_empty() {
                        status = self.execute_list(&list)?;
                        self.notify_jobs();
                    }
                }
                Err(err) if err.incomplete => continue,
                Err(err) => status = self.discard_command(&mut pending, &err.into()),
            }
        }

        if pending.is_blank() {
            return Ok(status);
        }
        let err: ShellError = if pending.text.trim().is_empty() {
            match Parser::new(pending.tokens.clone())
                .with_aliases(self.runtime.aliases())
                .parse_program()
            {
                // an alias may close what the reserved words left open
                Ok(list) => return self.execute_list(&list),
                Err(err) => err.into(),
            }
        } else {
            let lexer = Lexer::new(&pending.text, LexMode::Strict).starting_line(pending.text_line);
            match lexer.run() {
                Err(err) => err.into(),
                Ok(_) => ShellError::exec("marsh", "unexpected end of input", 2),
            }
        };
        Ok(self.discard_command(&mut pending, &err))
    }

    /// Report a syntax error and drop the command it occurred in.
    fn discard_command(&mut self, pending: &mut PendingCommand, err: &ShellError) -> i32 {
        self.line = pending.first_line;
        pending.clear();
        self.report(err);
        self.runtime.last_status = err.status();
        err.status()
    }

    /// `source file`: run a file in the current shell. `return` leaves it.
    pub fn source_file(&mut self, path: &Path) -> ExecResult {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ShellError::exec(path.display().to_string(), super::redirect::describe(&err), 1)
        })?;
        tracing::debug!(path = %path.display(), "sourcing");
        let saved_name = self.source_name.replace(path.display().to_string());
        let saved_line = self.line;
        self.source_depth += 1;
        let result = self.run_string(&text);
        self.source_depth -= 1;
        self.source_name = saved_name;
        self.line = saved_line;
        match result {
            Err(Unwind::Return(status)) => Ok(status),
            other => other,
        }
    }

    /// Run a script file as the main program of this process.
    pub fn run_script_file(&mut self, path: &Path, name: &str, args: Vec<String>) -> i32 {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                let status = if err.kind() == std::io::ErrorKind::NotFound { 127 } else { 126 };
                self.report(&ShellError::exec(name, super::redirect::describe(&err), status));
                return status;
            }
        };
        self.runtime.script_name = name.to_string();
        self.runtime.set_positional(args);
        self.source_name = Some(name.to_string());
        // an interpreter line is just a comment
        self.run_main(&text)
    }

    /// Run `source` as a whole program and return the process exit status,
    /// the EXIT trap included.
    pub fn run_main(&mut self, source: &str) -> i32 {
        let status = match self.run_string(source) {
            Ok(status) => status,
            Err(Unwind::Exit(status)) => status,
            Err(Unwind::Error(err)) => {
                self.report(&err);
                err.status()
            }
            Err(Unwind::Return(status)) => status,
            Err(Unwind::Break(_)) | Err(Unwind::Continue(_)) => self.runtime.last_status,
        };
        self.run_exit_trap(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_multiline_constructs() {
        let mut exec = Executor::default();
        let status = exec
            .run_string("if true\nthen\n  x=1\nfi\nf() {\n  y=2\n}\nf\n")
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(exec.runtime.get("x").as_deref(), Some("1"));
        assert_eq!(exec.runtime.get("y").as_deref(), Some("2"));
    }

    #[test]
    fn test_pending_lines_are_lexed_once() {
        let mut pending = PendingCommand::default();
        assert!(pending.feed("while true; do\n", 1).unwrap().is_none());
        assert!(pending.text.is_empty());
        assert_eq!(pending.depth, 1);
        assert!(pending.feed("  echo 'open\n", 2).unwrap().is_none());
        assert_eq!(pending.text_line, 2);
        assert!(pending.feed("  quote'\n", 3).unwrap().is_none());
        assert!(pending.text.is_empty());
        let tokens = pending.feed("done\n", 4).unwrap().unwrap();
        assert_eq!(tokens.iter().filter(|t| t.text == "'open\n  quote'").count(), 1);
        assert_eq!(pending.first_line, 1);
    }

    #[test]
    fn test_nesting_ignores_case_patterns() {
        let mut exec = Executor::default();
        let source = "x=if\ncase $x in\n  if|for) r=kw ;;\n  *) r=other ;;\nesac\ny=after\n";
        exec.run_string(source).unwrap();
        assert_eq!(exec.runtime.get("r").as_deref(), Some("kw"));
        assert_eq!(exec.runtime.get("y").as_deref(), Some("after"));
    }

    #[test]
    fn test_lines_spanning_quotes_heredocs_and_conditionals() {
        let mut exec = Executor::default();
        let source = "for i in 1; do\n  read -r body <<EOF\nline one\nEOF\ndone\n\
                      [[ a == a &&\n  b == b ]] && r=yes\n";
        exec.run_string(source).unwrap();
        assert_eq!(exec.runtime.get("body").as_deref(), Some("line one"));
        assert_eq!(exec.runtime.get("r").as_deref(), Some("yes"));
    }

    #[test]
    fn test_trailing_comments_keep_status() {
        let mut exec = Executor::default();
        assert_eq!(exec.run_string("false\n\n# done\n").unwrap(), 1);
    }

    #[test]
    fn test_syntax_error_discards_one_command() {
        let mut exec = Executor::default();
        let status = exec.run_string("a=1\nfi\nb=2\n").unwrap();
        assert_eq!(status, 0);
        assert_eq!(exec.runtime.get("a").as_deref(), Some("1"));
        assert_eq!(exec.runtime.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_unfinished_input_is_an_error() {
        let mut exec = Executor::default();
        assert_eq!(exec.run_string("x=1\nif true; then\n").unwrap(), 2);
        assert_eq!(exec.runtime.get("x").as_deref(), Some("1"));
    }

    #[test]
    fn test_alias_applies_from_next_line() {
        let mut exec = Executor::default();
        exec.run_string("alias setx='x=aliased'\nsetx\n").unwrap();
        assert_eq!(exec.runtime.get("x").as_deref(), Some("aliased"));
    }

    #[test]
    fn test_parse_chunk_incomplete() {
        let exec = Executor::default();
        assert!(exec.parse_chunk("while true; do\n", 1).unwrap().is_none());
        assert!(exec.parse_chunk("echo 'open\n", 1).unwrap().is_none());
        assert!(exec.parse_chunk("echo done\n", 1).unwrap().is_some());
        assert!(exec.parse_chunk("done\n", 1).is_err());
    }

    #[test]
    fn test_source_and_return() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sourced=yes\nreturn 4\nnever=set").unwrap();
        let mut exec = Executor::default();
        let status = exec.source_file(file.path()).unwrap();
        assert_eq!(status, 4);
        assert_eq!(exec.runtime.get("sourced").as_deref(), Some("yes"));
        assert!(exec.runtime.get("never").is_none());
    }

    #[test]
    fn test_exit_trap_runs_once() {
        let mut exec = Executor::default();
        let status = exec.run_main("trap 'code=$?; exit 9' EXIT\nexit 3\n");
        assert_eq!(status, 9);
        assert_eq!(exec.runtime.get("code").as_deref(), Some("3"));
        assert_eq!(exec.run_exit_trap(5), 5);
    }
}
