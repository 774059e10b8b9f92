//! Error types for the interpreter.
//!
//! Each layer has its own `thiserror` enum; [`ShellError`] gathers them for
//! the execution engine. Errors are rendered through [`Diagnostic`], either
//! as human-readable text or as JSON.

use crate::arithmetic::ArithmeticError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    /// `${v:?}` on an unset parameter, or an unbound variable under `set -u`.
    #[error("{0}")]
    Expansion(String),
    /// A bad substitution or array operation. Only the command fails.
    #[error("{0}")]
    BadSubstitution(String),
    #[error("{0}: readonly variable")]
    Readonly(String),
    #[error("{name}: {message}")]
    Exec {
        name: String,
        message: String,
        status: i32,
    },
    #[error("{what}: maximum nesting level ({limit}) exceeded")]
    RecursionLimit { what: &'static str, limit: usize },
    #[error("{target}: {message}")]
    Redirect { target: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// SIGINT with no trap set stopped the current command.
    #[error("interrupted")]
    Interrupted,
}

impl ShellError {
    pub fn exec(name: impl Into<String>, message: impl Into<String>, status: i32) -> Self {
        ShellError::Exec {
            name: name.into(),
            message: message.into(),
            status,
        }
    }

    /// The input ended inside an unfinished construct; more text may fix it.
    pub fn is_incomplete(&self) -> bool {
        match self {
            ShellError::Lex(_) => true,
            ShellError::Parse(err) => err.incomplete,
            _ => false,
        }
    }

    /// Aborts a non-interactive shell.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShellError::Expansion(_) | ShellError::Interrupted
        )
    }

    pub fn status(&self) -> i32 {
        match self {
            ShellError::Lex(_) | ShellError::Parse(_) => 2,
            ShellError::Exec { status, .. } => *status,
            ShellError::Interrupted => 128 + libc::SIGINT,
            _ => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::Lex(_) => "LEX_ERROR",
            ShellError::Parse(_) => "PARSE_ERROR",
            ShellError::Arithmetic(_) => "ARITHMETIC_ERROR",
            ShellError::Expansion(_) | ShellError::BadSubstitution(_) => "EXPANSION_ERROR",
            ShellError::Readonly(_) => "WRITE_ERROR",
            ShellError::Exec { .. } => "EXEC_ERROR",
            ShellError::RecursionLimit { .. } => "RECURSION_LIMIT",
            ShellError::Redirect { .. } => "REDIRECT_ERROR",
            ShellError::Io(_) => "IO_ERROR",
            ShellError::Interrupted => "INTERRUPTED",
        }
    }

    fn source_pos(&self) -> Option<crate::lexer::SourcePos> {
        match self {
            ShellError::Lex(err) => Some(err.pos()),
            ShellError::Parse(err) => Some(err.pos),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic = Diagnostic::new(self.kind(), self.to_string(), self.status());
        diagnostic.incomplete = self.is_incomplete();
        if let Some(pos) = self.source_pos() {
            diagnostic.location = Some(SourceLocation::new(pos.line, pos.column));
        }
        diagnostic
    }
}

/// Source location information for errors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceLocation {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            line_content: None,
            filename: None,
        }
    }

    pub fn with_line_content(mut self, content: String) -> Self {
        self.line_content = Some(content);
        self
    }

    pub fn with_filename(mut self, filename: String) -> Self {
        self.filename = Some(filename);
        self
    }
}

/// Command context for execution errors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandContext {
    /// Name of the command or builtin that failed
    pub command_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Function call stack, outermost first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_stack: Option<Vec<String>>,
}

impl CommandContext {
    pub fn new(command_name: impl Into<String>) -> Self {
        Self {
            command_name: command_name.into(),
            args: None,
            function_stack: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_function_stack(mut self, stack: Vec<String>) -> Self {
        self.function_stack = Some(stack);
        self
    }
}

/// A rendered error report for the error channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
    pub status: i32,
    /// More input could complete the command.
    pub incomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_context: Option<CommandContext>,
}

impl Diagnostic {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, status: i32) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            status,
            incomplete: false,
            location: None,
            command_context: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_command_context(mut self, command_context: CommandContext) -> Self {
        self.command_context = Some(command_context);
        self
    }

    /// Attribute a located diagnostic to a script file.
    pub fn in_file(mut self, filename: Option<&str>) -> Self {
        if let (Some(location), Some(name)) = (self.location.as_mut(), filename) {
            location.filename = Some(name.to_string());
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"kind":"{}","message":"{}","status":{}}}"#,
                self.kind, self.message, self.status
            )
        })
    }

    /// `marsh: line 3: message`, or `script.sh: line 3: message`.
    pub fn to_text(&self) -> String {
        let program = self
            .location
            .as_ref()
            .and_then(|l| l.filename.clone())
            .unwrap_or_else(|| "marsh".to_string());
        let mut text = match &self.location {
            Some(location) => format!("{}: line {}: {}", program, location.line, self.message),
            None => format!("{}: {}", program, self.message),
        };
        if let Some(stack) = self
            .command_context
            .as_ref()
            .and_then(|c| c.function_stack.as_ref())
        {
            if !stack.is_empty() {
                text.push_str(&format!(" (in {})", stack.join(" -> ")));
            }
        }
        text
    }

    pub fn render(&self, json: bool) -> String {
        if json {
            self.to_json()
        } else {
            self.to_text()
        }
    }
}

/// Non-local exits travelling up through execution.
#[derive(Debug)]
pub enum Unwind {
    /// `break N`, with the number of loop levels still to leave.
    Break(usize),
    /// `continue N`
    Continue(usize),
    Return(i32),
    Exit(i32),
    Error(ShellError),
}

impl From<ShellError> for Unwind {
    fn from(err: ShellError) -> Self {
        Unwind::Error(err)
    }
}

impl From<ArithmeticError> for Unwind {
    fn from(err: ArithmeticError) -> Self {
        Unwind::Error(err.into())
    }
}

impl From<ParseError> for Unwind {
    fn from(err: ParseError) -> Self {
        Unwind::Error(err.into())
    }
}

impl From<LexError> for Unwind {
    fn from(err: LexError) -> Self {
        Unwind::Error(err.into())
    }
}

impl From<std::io::Error> for Unwind {
    fn from(err: std::io::Error) -> Self {
        Unwind::Error(err.into())
    }
}

/// Exit status, or a non-local exit.
pub type ExecResult = Result<i32, Unwind>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::SourcePos;

    fn parse_error(incomplete: bool) -> ShellError {
        ShellError::Parse(ParseError {
            expected: "`fi'".into(),
            found: if incomplete { "end of input".into() } else { "`done'".into() },
            pos: SourcePos {
                offset: 10,
                line: 2,
                column: 4,
            },
            incomplete,
        })
    }

    #[test]
    fn test_incomplete_classification() {
        assert!(parse_error(true).is_incomplete());
        assert!(!parse_error(false).is_incomplete());
        assert!(!ShellError::Readonly("X".into()).is_incomplete());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(parse_error(false).status(), 2);
        assert_eq!(ShellError::exec("nope", "command not found", 127).status(), 127);
        assert_eq!(ShellError::Readonly("X".into()).status(), 1);
    }

    #[test]
    fn test_only_unset_parameter_errors_are_fatal() {
        assert!(ShellError::Expansion("x: parameter null or not set".into()).is_fatal());
        assert!(!ShellError::BadSubstitution("a: bad array subscript".into()).is_fatal());
        assert!(!ShellError::RecursionLimit { what: "function", limit: 10 }.is_fatal());
        assert_eq!(ShellError::BadSubstitution("x".into()).status(), 1);
    }

    #[test]
    fn test_diagnostic_text_has_location() {
        let text = parse_error(false).to_diagnostic().to_text();
        assert_eq!(
            text,
            "marsh: line 2: syntax error: expected `fi', found `done'"
        );
    }

    #[test]
    fn test_diagnostic_filename() {
        let diagnostic = parse_error(false).to_diagnostic().in_file(Some("build.sh"));
        assert!(diagnostic.to_text().starts_with("build.sh: line 2:"));
    }

    #[test]
    fn test_diagnostic_json() {
        let diagnostic = ShellError::Readonly("X".into())
            .to_diagnostic()
            .with_command_context(CommandContext::new("X=2").with_function_stack(vec!["f".into()]));
        let value: serde_json::Value = serde_json::from_str(&diagnostic.to_json()).unwrap();
        assert_eq!(value["kind"], "WRITE_ERROR");
        assert_eq!(value["message"], "X: readonly variable");
        assert_eq!(value["incomplete"], false);
        assert_eq!(value["command_context"]["function_stack"][0], "f");
        assert!(value.get("location").is_none());
    }

    #[test]
    fn test_text_mentions_function_stack() {
        let context = CommandContext::new("x").with_function_stack(vec!["a".into(), "b".into()]);
        let diagnostic = Diagnostic::new("EXEC_ERROR", "boom", 1).with_command_context(context);
        assert_eq!(diagnostic.to_text(), "marsh: boom (in a -> b)");
    }
}
