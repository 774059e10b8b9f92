use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a token in the source buffer (line and column are 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Pipe,          // |
    PipeAmp,       // |&
    OrIf,          // ||
    Amp,           // &
    AndIf,         // &&
    Semi,          // ;
    DSemi,         // ;;
    SemiAmp,       // ;&
    DSemiAmp,      // ;;&
    LParen,        // (
    RParen,        // )
    Less,          // <
    Great,         // >
    DGreat,        // >>
    Clobber,       // >|
    LessGreat,     // <>
    DLess,         // <<
    DLessDash,     // <<-
    TLess,         // <<<
    GreatAnd,      // >&
    LessAnd,       // <&
    AndGreat,      // &>
    AndDGreat,     // &>>
    DBracketOpen,  // [[
    DBracketClose, // ]]
}

impl Operator {
    /// Longest-first table used by the lexer.
    pub const TABLE: &'static [(&'static str, Operator)] = &[
        (";;&", Operator::DSemiAmp),
        ("<<<", Operator::TLess),
        ("<<-", Operator::DLessDash),
        ("&>>", Operator::AndDGreat),
        ("||", Operator::OrIf),
        ("|&", Operator::PipeAmp),
        ("&&", Operator::AndIf),
        (";;", Operator::DSemi),
        (";&", Operator::SemiAmp),
        (">>", Operator::DGreat),
        (">|", Operator::Clobber),
        ("<>", Operator::LessGreat),
        ("<<", Operator::DLess),
        (">&", Operator::GreatAnd),
        ("<&", Operator::LessAnd),
        ("&>", Operator::AndGreat),
        ("|", Operator::Pipe),
        ("&", Operator::Amp),
        (";", Operator::Semi),
        ("(", Operator::LParen),
        (")", Operator::RParen),
        ("<", Operator::Less),
        (">", Operator::Great),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::DBracketOpen => "[[",
            Operator::DBracketClose => "]]",
            op => Self::TABLE
                .iter()
                .find(|(_, candidate)| candidate == op)
                .map(|(text, _)| *text)
                .unwrap_or("?"),
        }
    }

    pub fn is_redirection(&self) -> bool {
        matches!(
            self,
            Operator::Less
                | Operator::Great
                | Operator::DGreat
                | Operator::Clobber
                | Operator::LessGreat
                | Operator::DLess
                | Operator::DLessDash
                | Operator::TLess
                | Operator::GreatAnd
                | Operator::LessAnd
                | Operator::AndGreat
                | Operator::AndDGreat
        )
    }

    /// Operators after which the next word is in command position.
    pub fn starts_command(&self) -> bool {
        matches!(
            self,
            Operator::Pipe
                | Operator::PipeAmp
                | Operator::OrIf
                | Operator::Amp
                | Operator::AndIf
                | Operator::Semi
                | Operator::DSemi
                | Operator::SemiAmp
                | Operator::DSemiAmp
                | Operator::LParen
                | Operator::RParen
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// A word; `text` is the raw source including quotes.
    Word,
    /// A word shaped like `NAME=...`, `NAME+=...` or `NAME[sub]=...`.
    Assignment,
    /// Digits immediately preceding a redirection operator.
    IoNumber,
    Operator(Operator),
    /// `(( ... ))`; `text` is the expression between the parentheses.
    ArithCommand,
    Newline,
}

/// Body of a here-document, attached to its `<<` / `<<-` operator token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HereDocBody {
    pub body: String,
    /// Delimiter was quoted: the body is not expanded.
    pub quoted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenFlags {
    /// The word contains quoting characters.
    pub quoted: bool,
    /// The token appeared where a command name may start.
    pub command_start: bool,
    /// The token was read inside `[[ ... ]]`.
    pub in_conditional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
    pub flags: TokenFlags,
    pub heredoc: Option<HereDocBody>,
}

impl Token {
    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == TokenKind::Operator(op)
    }

    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Assignment)
    }

    /// An unquoted word with exactly this text; how reserved words are recognised.
    pub fn is_reserved(&self, word: &str) -> bool {
        self.is_word() && !self.flags.quoted && self.text == word
    }

    /// Human-readable rendering for diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Operator(op) => format!("`{}'", op.as_str()),
            TokenKind::ArithCommand => format!("`(({}))'", self.text),
            _ => format!("`{}'", self.text),
        }
    }
}
