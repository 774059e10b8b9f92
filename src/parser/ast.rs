use crate::lexer::SourcePos;
use serde::{Deserialize, Serialize};

/// A sequence of and-or lists separated by `;`, `&` or newlines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct List {
    pub items: Vec<ListItem>,
}

impl List {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub and_or: AndOr,
    /// Terminated by `&`: run as a background job.
    pub background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndOr {
    pub first: Pipeline,
    pub rest: Vec<(Connector, Pipeline)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    /// Prefixed with `!`: the exit status is inverted.
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub command: Command,
    /// Connected to the next stage with `|&`.
    pub pipe_stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Simple(SimpleCommand),
    Compound(CompoundCommand, Vec<Redirect>),
    FunctionDef(FunctionDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCommand {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    /// Raw subscript text of `name[sub]=...`.
    pub subscript: Option<String>,
    /// `+=`
    pub append: bool,
    pub value: AssignValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignValue {
    Scalar(Word),
    Array(Vec<ArrayElement>),
}

/// One element of `(a b [k]=v)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayElement {
    pub key: Option<String>,
    pub value: Word,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub body: Box<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompoundCommand {
    /// `{ list; }` runs in the current shell.
    BraceGroup(List),
    /// `( list )` runs in a forked copy of the shell.
    Subshell(List),
    If {
        /// `if`/`elif` conditions paired with their bodies, in order.
        branches: Vec<(List, List)>,
        else_branch: Option<List>,
    },
    While {
        condition: List,
        body: List,
        /// `until`: loop while the condition fails.
        until: bool,
    },
    For {
        var: String,
        /// `None` iterates over `"$@"`.
        words: Option<Vec<Word>>,
        body: List,
    },
    /// `for ((init; cond; update))`, each part kept as arithmetic source.
    CFor {
        init: String,
        condition: String,
        update: String,
        body: List,
    },
    Case {
        subject: Word,
        arms: Vec<CaseArm>,
    },
    Select {
        var: String,
        words: Option<Vec<Word>>,
        body: List,
    },
    /// `(( expr ))`
    Arith(String),
    /// `[[ expr ]]`
    Cond(CondExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseTerminator {
    /// `;;`
    Break,
    /// `;&` runs the next body without testing its patterns.
    FallThrough,
    /// `;;&` tests the following arms.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    pub patterns: Vec<Word>,
    pub body: List,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CondExpr {
    Not(Box<CondExpr>),
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Unary(String, Word),
    Binary(Word, String, Word),
    /// A lone word: true when it expands non-empty.
    Word(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectKind {
    Input,      // <
    Output,     // >
    Append,     // >>
    Clobber,    // >|
    ReadWrite,  // <>
    HereDoc,    // << and <<-
    HereString, // <<<
    DupOutput,  // >&
    DupInput,   // <&
    OutputBoth, // &>
    AppendBoth, // &>>
}

impl RedirectKind {
    pub fn default_fd(&self) -> i32 {
        match self {
            RedirectKind::Input
            | RedirectKind::ReadWrite
            | RedirectKind::HereDoc
            | RedirectKind::HereString
            | RedirectKind::DupInput => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub fd: Option<i32>,
    pub kind: RedirectKind,
    /// File name, descriptor word, here-string, or here-document body.
    pub target: Word,
}

impl Redirect {
    pub fn fd(&self) -> i32 {
        self.fd.unwrap_or_else(|| self.kind.default_fd())
    }
}

/// A word decomposed into its quoting and expansion parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub parts: Vec<WordPart>,
    /// Source text, kept for diagnostics and declaration builtins.
    pub raw: String,
}

impl Word {
    pub fn literal(text: &str) -> Self {
        Word {
            parts: vec![WordPart::Literal(text.to_string())],
            raw: text.to_string(),
        }
    }

    /// The word's text when it contains no quoting or expansions.
    pub fn as_plain(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(text)] => Some(text),
            _ => None,
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.parts.iter().any(|part| {
            matches!(
                part,
                WordPart::SingleQuoted(_) | WordPart::DoubleQuoted(_) | WordPart::Escaped(_)
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WordPart {
    Literal(String),
    SingleQuoted(String),
    DoubleQuoted(Vec<WordPart>),
    Escaped(char),
    /// `~` or `~user` at the start of a word.
    Tilde(String),
    Param(ParamExpansion),
    /// Source text of `$(...)` or a backquoted command.
    CommandSubst(String),
    /// Source text of `$((...))`.
    Arith(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamExpansion {
    pub name: String,
    /// Raw subscript text: `@`, `*`, an index expression or a key.
    pub index: Option<String>,
    /// `${!name...}`
    pub indirect: bool,
    pub op: ParamOp,
}

impl ParamExpansion {
    pub fn simple(name: &str) -> Self {
        ParamExpansion {
            name: name.to_string(),
            index: None,
            indirect: false,
            op: ParamOp::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceMode {
    First,
    All,
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseMode {
    UpperFirst,
    UpperAll,
    LowerFirst,
    LowerAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamOp {
    None,
    /// `${#v}`
    Length,
    /// `${v:-w}` / `${v-w}`
    Default { word: Word, colon: bool },
    /// `${v:=w}` / `${v=w}`
    Assign { word: Word, colon: bool },
    /// `${v:?w}` / `${v?w}`
    Error { word: Option<Word>, colon: bool },
    /// `${v:+w}` / `${v+w}`
    Alternate { word: Word, colon: bool },
    /// `${v#p}` / `${v##p}`
    RemovePrefix { pattern: Word, longest: bool },
    /// `${v%p}` / `${v%%p}`
    RemoveSuffix { pattern: Word, longest: bool },
    Replace {
        pattern: Word,
        replacement: Option<Word>,
        mode: ReplaceMode,
    },
    /// `${v:off:len}`, operands kept as arithmetic source.
    Substring { offset: String, length: Option<String> },
    /// `${v^p}`, `${v^^p}`, `${v,p}`, `${v,,p}`
    Case { mode: CaseMode, pattern: Option<Word> },
    /// `${!prefix*}` / `${!prefix@}`
    PrefixNames { joined: bool },
    /// `${!arr[@]}` / `${!arr[*]}`
    Keys { joined: bool },
}
