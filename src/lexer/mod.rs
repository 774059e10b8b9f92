//! Context-sensitive tokenizer for shell source text.
//!
//! Words are kept as raw source text (quotes included); the parser later
//! decomposes them into parts. The lexer is responsible for finding word
//! boundaries, which requires tracking quote state and the nesting of
//! `${...}`, `$(...)`, `$((...))`, `((...))` and `[[...]]`, and for
//! collecting here-document bodies.

pub mod scan;
pub mod token;

pub use token::{HereDocBody, Operator, SourcePos, Token, TokenFlags, TokenKind};

/// How unterminated input is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    /// Batch input: unterminated constructs are a hard [`LexError`].
    Strict,
    /// Interactive input: unterminated constructs yield a partial result
    /// flagged `incomplete` so the caller can ask for another line.
    Lenient,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected end of input looking for the end of a {construct} started at {pos}")]
    Unterminated { construct: &'static str, pos: SourcePos },
    #[error("here-document started at {pos} is not terminated by `{delimiter}'")]
    UnterminatedHeredoc { delimiter: String, pos: SourcePos },
}

impl LexError {
    pub fn pos(&self) -> SourcePos {
        match self {
            LexError::Unterminated { pos, .. } | LexError::UnterminatedHeredoc { pos, .. } => *pos,
        }
    }
}

/// Reserved words after which the next word is again in command position.
const COMMAND_INTRODUCERS: &[&str] = &[
    "then", "do", "else", "elif", "if", "while", "until", "!", "{", "time",
];

struct PendingHeredoc {
    token: usize,
    delimiter: String,
    quoted: bool,
    strip_tabs: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line_starts: Vec<usize>,
    first_line: usize,
    mode: LexMode,
    tokens: Vec<Token>,
    command_start: bool,
    in_conditional: bool,
    heredoc_operator: Option<(usize, bool)>,
    pending_heredocs: Vec<PendingHeredoc>,
}

impl Lexer {
    pub fn new(input: &str, mode: LexMode) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            chars,
            pos: 0,
            line_starts,
            first_line: 1,
            mode,
            tokens: Vec::new(),
            command_start: true,
            in_conditional: false,
            heredoc_operator: None,
            pending_heredocs: Vec::new(),
        }
    }

    /// Number reported for the first line of the input.
    pub fn starting_line(mut self, line: usize) -> Self {
        self.first_line = line.max(1);
        self
    }

    /// Tokenize a complete buffer.
    pub fn tokenize(input: &str, mode: LexMode) -> Result<TokenStream, LexError> {
        Self::new(input, mode).run()
    }

    pub fn run(mut self) -> Result<TokenStream, LexError> {
        match self.lex_all() {
            Ok(()) => Ok(TokenStream {
                tokens: self.tokens,
                incomplete: false,
            }),
            Err(_) if self.mode == LexMode::Lenient => Ok(TokenStream {
                tokens: self.tokens,
                incomplete: true,
            }),
            Err(err) => Err(err),
        }
    }

    fn lex_all(&mut self) -> Result<(), LexError> {
        while self.pos < self.chars.len() {
            match self.chars[self.pos] {
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek(1) == Some('\n') => {
                    if self.pos + 2 >= self.chars.len() && self.mode == LexMode::Lenient {
                        return Err(self.unterminated("line continuation", self.pos));
                    }
                    self.pos += 2;
                }
                '#' => {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
                        self.pos += 1;
                    }
                }
                '\n' => {
                    let pos = self.position_of(self.pos);
                    self.push(TokenKind::Newline, "\n".to_string(), pos, false);
                    self.pos += 1;
                    self.command_start = true;
                    self.read_heredoc_bodies()?;
                }
                _ => self.lex_token()?,
            }
        }
        if let Some(pending) = self.pending_heredocs.first() {
            let pos = self.tokens[pending.token].pos;
            return Err(LexError::UnterminatedHeredoc {
                delimiter: pending.delimiter.clone(),
                pos,
            });
        }
        Ok(())
    }

    fn lex_token(&mut self) -> Result<(), LexError> {
        let start = self.pos;

        if self.in_conditional {
            return self.lex_conditional_token();
        }

        if (self.command_start || self.previous_is_reserved("for")) && self.starts_with("((") {
            match scan::arith_command(&self.chars, start) {
                Ok(end) => {
                    let text: String = self.chars[start + 2..end - 2].iter().collect();
                    let pos = self.position_of(start);
                    self.push(TokenKind::ArithCommand, text, pos, false);
                    self.pos = end;
                    self.command_start = false;
                    return Ok(());
                }
                Err(scan::NOT_ARITHMETIC) => {}
                Err(construct) => return Err(self.unterminated(construct, start)),
            }
        }

        if self.command_start && self.starts_with("[[") && self.is_boundary(start + 2) {
            let pos = self.position_of(start);
            self.push_operator(Operator::DBracketOpen, pos);
            self.pos += 2;
            self.in_conditional = true;
            self.command_start = false;
            return Ok(());
        }

        if let Some(op) = self.match_operator() {
            let pos = self.position_of(start);
            self.pos += op.as_str().chars().count();
            self.push_operator(op, pos);
            self.command_start = op.starts_command();
            if matches!(op, Operator::DLess | Operator::DLessDash) {
                self.heredoc_operator = Some((self.tokens.len() - 1, op == Operator::DLessDash));
            }
            return Ok(());
        }

        self.lex_word()
    }

    fn lex_conditional_token(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let pos = self.position_of(start);

        if self.starts_with("]]") && self.is_boundary(start + 2) {
            self.push_operator(Operator::DBracketClose, pos);
            self.pos += 2;
            self.in_conditional = false;
            self.command_start = false;
            return Ok(());
        }
        for (text, op) in [
            ("&&", Operator::AndIf),
            ("||", Operator::OrIf),
            ("(", Operator::LParen),
            (")", Operator::RParen),
        ] {
            if self.starts_with(text) {
                self.push_operator(op, pos);
                self.pos += text.len();
                return Ok(());
            }
        }
        if matches!(self.chars[start], '<' | '>') {
            self.push(TokenKind::Word, self.chars[start].to_string(), pos, false);
            self.pos += 1;
            return Ok(());
        }
        if self.previous_is_reserved("=~") {
            return self.lex_regex_word();
        }
        self.lex_word()
    }

    /// Right-hand side of `=~`: parentheses and `|` belong to the pattern.
    fn lex_regex_word(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quoted = false;
        let mut i = start;
        while i < self.chars.len() {
            match self.chars[i] {
                ' ' | '\t' | '\n' if depth == 0 => break,
                '\\' => {
                    quoted = true;
                    i += 2;
                }
                '\'' => {
                    quoted = true;
                    i = scan::single_quote(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                '"' => {
                    quoted = true;
                    i = scan::double_quote(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                '$' => i = scan::dollar(&self.chars, i).map_err(|c| self.unterminated(c, i))?,
                '(' => {
                    depth += 1;
                    i += 1;
                }
                ')' if depth > 0 => {
                    depth -= 1;
                    i += 1;
                }
                ')' => break,
                _ => i += 1,
            }
        }
        let end = i.min(self.chars.len());
        let text: String = self.chars[start..end].iter().collect();
        let pos = self.position_of(start);
        self.push(TokenKind::Word, text, pos, quoted);
        self.pos = end;
        Ok(())
    }

    fn lex_word(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut quoted = false;
        let mut i = start;
        while i < self.chars.len() {
            let c = self.chars[i];
            match c {
                ' ' | '\t' | '\n' | ';' | '&' | '|' | '<' | '>' | ')' => break,
                '(' => {
                    if is_assignment_prefix(&self.chars[start..i]) {
                        i = scan::parens(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                        continue;
                    }
                    break;
                }
                '\\' => {
                    if i + 1 >= self.chars.len() {
                        if self.mode == LexMode::Lenient {
                            return Err(self.unterminated("escape", i));
                        }
                        i += 1;
                        continue;
                    }
                    if self.chars[i + 1] == '\n'
                        && i + 2 >= self.chars.len()
                        && self.mode == LexMode::Lenient
                    {
                        return Err(self.unterminated("line continuation", i));
                    }
                    quoted = true;
                    i += 2;
                }
                '\'' => {
                    quoted = true;
                    i = scan::single_quote(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                '"' => {
                    quoted = true;
                    i = scan::double_quote(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                '`' => {
                    i = scan::backquote(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                '$' => {
                    if matches!(self.peek_from(i, 1), Some('\'') | Some('"')) {
                        quoted = true;
                    }
                    i = scan::dollar(&self.chars, i).map_err(|c| self.unterminated(c, i))?;
                }
                _ => i += 1,
            }
        }

        let end = i.min(self.chars.len());
        let raw: String = self.chars[start..end].iter().collect();
        let text = strip_line_continuations(&raw);
        let pos = self.position_of(start);
        self.pos = end;

        let next = self.chars.get(end).copied();
        let kind = if !text.is_empty()
            && text.chars().all(|c| c.is_ascii_digit())
            && matches!(next, Some('<') | Some('>'))
        {
            TokenKind::IoNumber
        } else if assignment_split(&text).is_some() {
            TokenKind::Assignment
        } else {
            TokenKind::Word
        };

        if let Some((token, strip_tabs)) = self.heredoc_operator.take() {
            self.pending_heredocs.push(PendingHeredoc {
                token,
                delimiter: unquote_delimiter(&text),
                quoted,
                strip_tabs,
            });
        }

        let was_command_start = self.command_start;
        let keeps_command_start = was_command_start
            && ((!quoted && COMMAND_INTRODUCERS.contains(&text.as_str()))
                || kind == TokenKind::Assignment);
        // the body of `function name` follows its name directly
        let names_function = self
            .tokens
            .last()
            .map(|t| t.is_reserved("function") && t.flags.command_start)
            .unwrap_or(false);
        self.push(kind, text, pos, quoted);
        self.command_start = keeps_command_start || names_function;
        Ok(())
    }

    fn read_heredoc_bodies(&mut self) -> Result<(), LexError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for (n, heredoc) in pending.iter().enumerate() {
            let mut body = String::new();
            loop {
                if self.pos >= self.chars.len() {
                    let pos = self.tokens[heredoc.token].pos;
                    // keep the unread ones for the error path in lex_all
                    self.pending_heredocs = pending.into_iter().skip(n).collect();
                    return Err(LexError::UnterminatedHeredoc {
                        delimiter: self.pending_heredocs[0].delimiter.clone(),
                        pos,
                    });
                }
                let line_end = self.chars[self.pos..]
                    .iter()
                    .position(|c| *c == '\n')
                    .map(|offset| self.pos + offset)
                    .unwrap_or(self.chars.len());
                let line: String = self.chars[self.pos..line_end].iter().collect();
                self.pos = (line_end + 1).min(self.chars.len());
                let line = if heredoc.strip_tabs {
                    line.trim_start_matches('\t').to_string()
                } else {
                    line
                };
                if line == heredoc.delimiter {
                    break;
                }
                body.push_str(&line);
                body.push('\n');
            }
            self.tokens[heredoc.token].heredoc = Some(HereDocBody {
                body,
                quoted: heredoc.quoted,
            });
        }
        Ok(())
    }

    fn match_operator(&self) -> Option<Operator> {
        if !matches!(self.chars[self.pos], '|' | '&' | ';' | '(' | ')' | '<' | '>') {
            return None;
        }
        Operator::TABLE
            .iter()
            .find(|(text, _)| self.starts_with(text))
            .map(|(_, op)| *op)
    }

    fn push_operator(&mut self, op: Operator, pos: SourcePos) {
        self.push(TokenKind::Operator(op), op.as_str().to_string(), pos, false);
    }

    fn push(&mut self, kind: TokenKind, text: String, pos: SourcePos, quoted: bool) {
        let flags = TokenFlags {
            quoted,
            command_start: self.command_start,
            in_conditional: self.in_conditional,
        };
        self.tokens.push(Token {
            kind,
            text,
            pos,
            flags,
            heredoc: None,
        });
    }

    fn previous_is_reserved(&self, word: &str) -> bool {
        self.tokens.last().map(|t| t.is_reserved(word)).unwrap_or(false)
    }

    fn starts_with(&self, text: &str) -> bool {
        let mut i = self.pos;
        for c in text.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn is_boundary(&self, index: usize) -> bool {
        matches!(
            self.chars.get(index),
            None | Some(' ') | Some('\t') | Some('\n') | Some(';') | Some('&') | Some('|')
                | Some(')')
        )
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn peek_from(&self, index: usize, ahead: usize) -> Option<char> {
        self.chars.get(index + ahead).copied()
    }

    fn position_of(&self, index: usize) -> SourcePos {
        let line_idx = self.line_starts.partition_point(|start| *start <= index);
        let line_start = self.line_starts[line_idx.saturating_sub(1)];
        SourcePos {
            offset: index,
            line: line_idx + self.first_line - 1,
            column: index - line_start + 1,
        }
    }

    fn unterminated(&self, construct: &'static str, index: usize) -> LexError {
        LexError::Unterminated {
            construct,
            pos: self.position_of(index),
        }
    }
}

/// True when `chars` is exactly `NAME=`, `NAME+=` or `NAME[...]=`.
fn is_assignment_prefix(chars: &[char]) -> bool {
    let text: String = chars.iter().collect();
    match assignment_split(&text) {
        Some((_, value)) => value.is_empty(),
        None => false,
    }
}

/// Split an assignment word into its target (`NAME`, `NAME[sub]`, with a
/// trailing `+` for appends) and the raw value text.
pub fn assignment_split(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'[' {
        let mut depth = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'+' {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'=' {
        Some((&text[..i], &text[i + 1..]))
    } else {
        None
    }
}

/// Remove backslash-newline pairs outside single quotes.
fn strip_line_continuations(raw: &str) -> String {
    if !raw.contains("\\\n") {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_single = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_single = !in_single;
                out.push(c);
            }
            '\\' if !in_single => match chars.peek() {
                Some('\n') => {
                    chars.next();
                }
                Some(_) => {
                    out.push(c);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                None => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Here-document delimiters are subject to quote removal only.
fn unquote_delimiter(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {}
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
