//! Recursive-descent parser producing the [`ast`] from lexer tokens.

pub mod ast;
pub mod word;

use crate::lexer::{assignment_split, LexMode, Lexer, Operator, SourcePos, Token, TokenKind};
use ast::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error: expected {expected}, found {found}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub pos: SourcePos,
    /// The input ended before the construct was closed.
    pub incomplete: bool,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Reserved words that end a compound list.
const CLOSERS: &[&str] = &["then", "elif", "else", "fi", "do", "done", "esac", "}"];

const COND_UNARY: &[&str] = &[
    "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-p", "-r", "-s", "-t", "-u", "-w",
    "-x", "-G", "-L", "-N", "-O", "-S", "-z", "-n", "-o", "-v",
];

const COND_BINARY: &[&str] = &[
    "==", "=", "!=", "<", ">", "=~", "-eq", "-ne", "-lt", "-le", "-gt", "-ge", "-nt", "-ot", "-ef",
];

pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    aliases: Option<&'a HashMap<String, String>>,
    end: SourcePos,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>) -> Self {
        let end = tokens.last().map(|t| t.pos).unwrap_or_default();
        Self {
            tokens,
            position: 0,
            aliases: None,
            end,
        }
    }

    /// Expand aliases found in command position.
    pub fn with_aliases(mut self, aliases: &'a HashMap<String, String>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn parse_program(&mut self) -> Result<List> {
        let list = self.parse_compound_list()?;
        if self.peek().is_some() {
            return Err(self.error("a command"));
        }
        Ok(list)
    }

    fn parse_compound_list(&mut self) -> Result<List> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_list_end() {
                break;
            }
            let and_or = self.parse_and_or()?;
            let background = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Operator(Operator::Semi)) | Some(TokenKind::Newline) => false,
                Some(TokenKind::Operator(Operator::Amp)) => true,
                _ => {
                    items.push(ListItem {
                        and_or,
                        background: false,
                    });
                    break;
                }
            };
            self.position += 1;
            items.push(ListItem { and_or, background });
        }
        Ok(List { items })
    }

    /// A compound list that must contain at least one command.
    fn parse_body(&mut self) -> Result<List> {
        let list = self.parse_compound_list()?;
        if list.is_empty() {
            return Err(self.error("a command"));
        }
        Ok(list)
    }

    fn parse_and_or(&mut self) -> Result<AndOr> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let connector = if self.at_operator(Operator::AndIf) {
                Connector::And
            } else if self.at_operator(Operator::OrIf) {
                Connector::Or
            } else {
                break;
            };
            self.position += 1;
            self.skip_newlines();
            rest.push((connector, self.parse_pipeline()?));
        }
        Ok(AndOr { first, rest })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let mut negate = false;
        while self.at_keyword("!") {
            self.position += 1;
            negate = !negate;
        }

        let mut stages = Vec::new();
        loop {
            let command = self.parse_command()?;
            let pipe_stderr = if self.at_operator(Operator::Pipe) {
                false
            } else if self.at_operator(Operator::PipeAmp) {
                true
            } else {
                stages.push(Stage {
                    command,
                    pipe_stderr: false,
                });
                break;
            };
            self.position += 1;
            self.skip_newlines();
            stages.push(Stage {
                command,
                pipe_stderr,
            });
        }
        Ok(Pipeline { stages, negate })
    }

    fn parse_command(&mut self) -> Result<Command> {
        self.expand_aliases();

        let (kind, text, flags) = match self.peek() {
            Some(token) => (token.kind.clone(), token.text.clone(), token.flags),
            None => return Err(self.error("a command")),
        };

        match &kind {
            TokenKind::Operator(Operator::LParen) => {
                self.position += 1;
                let list = self.parse_body()?;
                self.expect_operator(Operator::RParen)?;
                self.finish_compound(CompoundCommand::Subshell(list))
            }
            TokenKind::Operator(Operator::DBracketOpen) => {
                let cond = self.parse_conditional()?;
                self.finish_compound(cond)
            }
            TokenKind::ArithCommand => {
                self.position += 1;
                self.finish_compound(CompoundCommand::Arith(text))
            }
            TokenKind::Word if flags.command_start && !flags.quoted => {
                match text.as_str() {
                    "{" => {
                        self.position += 1;
                        let list = self.parse_body()?;
                        self.expect_reserved("}")?;
                        self.finish_compound(CompoundCommand::BraceGroup(list))
                    }
                    "if" => {
                        let cmd = self.parse_if()?;
                        self.finish_compound(cmd)
                    }
                    "while" | "until" => {
                        let cmd = self.parse_while()?;
                        self.finish_compound(cmd)
                    }
                    "for" => {
                        let cmd = self.parse_for()?;
                        self.finish_compound(cmd)
                    }
                    "select" => {
                        let cmd = self.parse_select()?;
                        self.finish_compound(cmd)
                    }
                    "case" => {
                        let cmd = self.parse_case()?;
                        self.finish_compound(cmd)
                    }
                    "function" => self.parse_function_keyword(),
                    closer if CLOSERS.contains(&closer) => Err(self.error("a command")),
                    _ if self.is_function_header() => self.parse_function_parens(),
                    _ => self.parse_simple_command(),
                }
            }
            TokenKind::Word | TokenKind::Assignment | TokenKind::IoNumber => {
                if self.is_function_header() {
                    self.parse_function_parens()
                } else {
                    self.parse_simple_command()
                }
            }
            TokenKind::Operator(op) if op.is_redirection() => self.parse_simple_command(),
            _ => Err(self.error("a command")),
        }
    }

    fn finish_compound(&mut self, command: CompoundCommand) -> Result<Command> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.try_parse_redirect()? {
            redirects.push(redirect);
        }
        Ok(Command::Compound(command, redirects))
    }

    fn parse_simple_command(&mut self) -> Result<Command> {
        let pos = self.peek().map(|t| t.pos).unwrap_or(self.end);
        let mut assignments = Vec::new();
        let mut words = Vec::new();
        let mut redirects = Vec::new();

        loop {
            if let Some(redirect) = self.try_parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            let token = match self.peek() {
                Some(token) => token,
                None => break,
            };
            match token.kind {
                TokenKind::Assignment if words.is_empty() => {
                    let assignment = parse_assignment(&token.text, token.pos)?
                        .ok_or_else(|| self.error("an assignment"))?;
                    assignments.push(assignment);
                    self.position += 1;
                }
                TokenKind::Word | TokenKind::Assignment => {
                    words.push(make_word(token)?);
                    self.position += 1;
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            return Err(self.error("a command"));
        }
        Ok(Command::Simple(SimpleCommand {
            assignments,
            words,
            redirects,
            pos,
        }))
    }

    fn try_parse_redirect(&mut self) -> Result<Option<Redirect>> {
        let mut fd = None;
        let mut index = self.position;
        if let Some(token) = self.tokens.get(index) {
            if token.kind == TokenKind::IoNumber {
                fd = token.text.parse::<i32>().ok();
                index += 1;
            }
        }
        let op_token = match self.tokens.get(index) {
            Some(token) => token.clone(),
            None => return Ok(None),
        };
        let op = match op_token.kind {
            TokenKind::Operator(op) if op.is_redirection() => op,
            _ => return Ok(None),
        };
        self.position = index + 1;

        let kind = match op {
            Operator::Less => RedirectKind::Input,
            Operator::Great => RedirectKind::Output,
            Operator::DGreat => RedirectKind::Append,
            Operator::Clobber => RedirectKind::Clobber,
            Operator::LessGreat => RedirectKind::ReadWrite,
            Operator::DLess | Operator::DLessDash => RedirectKind::HereDoc,
            Operator::TLess => RedirectKind::HereString,
            Operator::GreatAnd => RedirectKind::DupOutput,
            Operator::LessAnd => RedirectKind::DupInput,
            Operator::AndGreat => RedirectKind::OutputBoth,
            _ => RedirectKind::AppendBoth,
        };

        let target_token = match self.peek() {
            Some(token) if token.is_word() => token.clone(),
            _ => return Err(self.error("a file name after the redirection")),
        };
        self.position += 1;

        let target = if kind == RedirectKind::HereDoc {
            match op_token.heredoc {
                Some(heredoc) if heredoc.quoted => Word {
                    parts: vec![WordPart::SingleQuoted(heredoc.body.clone())],
                    raw: heredoc.body,
                },
                Some(heredoc) => word::parse_heredoc(&heredoc.body)
                    .map_err(|e| bad_substitution(e, target_token.pos))?,
                None => Word {
                    parts: vec![WordPart::SingleQuoted(String::new())],
                    raw: String::new(),
                },
            }
        } else {
            make_word(&target_token)?
        };

        Ok(Some(Redirect { fd, kind, target }))
    }

    fn parse_if(&mut self) -> Result<CompoundCommand> {
        self.position += 1;
        let mut branches = Vec::new();
        let condition = self.parse_body()?;
        self.expect_reserved("then")?;
        let body = self.parse_body()?;
        branches.push((condition, body));

        let mut else_branch = None;
        loop {
            if self.at_reserved("elif") {
                self.position += 1;
                let condition = self.parse_body()?;
                self.expect_reserved("then")?;
                let body = self.parse_body()?;
                branches.push((condition, body));
                continue;
            }
            if self.at_reserved("else") {
                self.position += 1;
                else_branch = Some(self.parse_body()?);
            }
            self.expect_reserved("fi")?;
            break;
        }
        Ok(CompoundCommand::If {
            branches,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<CompoundCommand> {
        let until = self.at_reserved("until");
        self.position += 1;
        let condition = self.parse_body()?;
        let body = self.parse_do_group()?;
        Ok(CompoundCommand::While {
            condition,
            body,
            until,
        })
    }

    fn parse_do_group(&mut self) -> Result<List> {
        self.expect_reserved("do")?;
        let body = self.parse_body()?;
        self.expect_reserved("done")?;
        Ok(body)
    }

    fn parse_for(&mut self) -> Result<CompoundCommand> {
        self.position += 1;

        if let Some(token) = self.peek() {
            if token.kind == TokenKind::ArithCommand {
                let (init, condition, update) = split_for_header(&token.text)
                    .ok_or_else(|| self.error("`((init; condition; update))'"))?;
                self.position += 1;
                self.skip_separator();
                let body = self.parse_do_group()?;
                return Ok(CompoundCommand::CFor {
                    init,
                    condition,
                    update,
                    body,
                });
            }
        }

        let (var, words) = self.parse_loop_header()?;
        let body = self.parse_do_group()?;
        Ok(CompoundCommand::For { var, words, body })
    }

    fn parse_select(&mut self) -> Result<CompoundCommand> {
        self.position += 1;
        let (var, words) = self.parse_loop_header()?;
        let body = self.parse_do_group()?;
        Ok(CompoundCommand::Select { var, words, body })
    }

    /// `NAME [in WORDS...]` followed by a separator.
    fn parse_loop_header(&mut self) -> Result<(String, Option<Vec<Word>>)> {
        let var = match self.peek() {
            Some(token) if token.is_word() && is_name(&token.text) => token.text.clone(),
            _ => return Err(self.error("a variable name")),
        };
        self.position += 1;
        self.skip_newlines();

        let words = if self.at_reserved("in") {
            self.position += 1;
            let mut words = Vec::new();
            while let Some(token) = self.peek() {
                if !token.is_word() {
                    break;
                }
                words.push(make_word(token)?);
                self.position += 1;
            }
            Some(words)
        } else {
            None
        };
        self.skip_separator();
        Ok((var, words))
    }

    fn parse_case(&mut self) -> Result<CompoundCommand> {
        self.position += 1;
        let subject = match self.peek() {
            Some(token) if token.is_word() => make_word(token)?,
            _ => return Err(self.error("a word after `case'")),
        };
        self.position += 1;
        self.skip_newlines();
        self.expect_reserved("in")?;

        let mut arms = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_reserved("esac") {
                self.position += 1;
                break;
            }
            if self.at_operator(Operator::LParen) {
                self.position += 1;
            }
            let mut patterns = Vec::new();
            loop {
                match self.peek() {
                    Some(token) if token.is_word() => patterns.push(make_word(token)?),
                    _ => return Err(self.error("a pattern")),
                }
                self.position += 1;
                if self.at_operator(Operator::Pipe) {
                    self.position += 1;
                    continue;
                }
                break;
            }
            self.expect_operator(Operator::RParen)?;

            let body = self.parse_compound_list()?;
            let terminator = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Operator(Operator::DSemi)) => Some(CaseTerminator::Break),
                Some(TokenKind::Operator(Operator::SemiAmp)) => Some(CaseTerminator::FallThrough),
                Some(TokenKind::Operator(Operator::DSemiAmp)) => Some(CaseTerminator::Continue),
                _ => None,
            };
            match terminator {
                Some(terminator) => {
                    self.position += 1;
                    arms.push(CaseArm {
                        patterns,
                        body,
                        terminator,
                    });
                }
                None => {
                    arms.push(CaseArm {
                        patterns,
                        body,
                        terminator: CaseTerminator::Break,
                    });
                    self.skip_newlines();
                    self.expect_reserved("esac")?;
                    break;
                }
            }
        }
        Ok(CompoundCommand::Case { subject, arms })
    }

    fn is_function_header(&self) -> bool {
        let name_ok = self
            .peek()
            .map(|t| t.kind == TokenKind::Word && !t.flags.quoted && is_function_name(&t.text))
            .unwrap_or(false);
        name_ok
            && self.peek_at(1).map(|t| t.is_operator(Operator::LParen)).unwrap_or(false)
            && self.peek_at(2).map(|t| t.is_operator(Operator::RParen)).unwrap_or(false)
    }

    /// `name() compound-command`
    fn parse_function_parens(&mut self) -> Result<Command> {
        let name = self.peek().map(|t| t.text.clone()).unwrap_or_default();
        self.position += 3;
        self.parse_function_body(name)
    }

    /// `function name [()] compound-command`
    fn parse_function_keyword(&mut self) -> Result<Command> {
        self.position += 1;
        let name = match self.peek() {
            Some(token) if token.is_word() && is_function_name(&token.text) => token.text.clone(),
            _ => return Err(self.error("a function name")),
        };
        self.position += 1;
        if self.at_operator(Operator::LParen)
            && self.peek_at(1).map(|t| t.is_operator(Operator::RParen)).unwrap_or(false)
        {
            self.position += 2;
        }
        self.parse_function_body(name)
    }

    fn parse_function_body(&mut self, name: String) -> Result<Command> {
        self.skip_newlines();
        let start = self.position;
        let body = self.parse_command()?;
        if !matches!(body, Command::Compound(..)) {
            self.position = start;
            return Err(self.error("a function body"));
        }
        Ok(Command::FunctionDef(FunctionDef {
            name,
            body: Box::new(body),
        }))
    }

    fn parse_conditional(&mut self) -> Result<CompoundCommand> {
        self.position += 1;
        let expr = self.parse_cond_or()?;
        self.skip_newlines();
        self.expect_operator(Operator::DBracketClose)?;
        Ok(CompoundCommand::Cond(expr))
    }

    fn parse_cond_or(&mut self) -> Result<CondExpr> {
        let mut left = self.parse_cond_and()?;
        loop {
            self.skip_newlines();
            if !self.at_operator(Operator::OrIf) {
                return Ok(left);
            }
            self.position += 1;
            let right = self.parse_cond_and()?;
            left = CondExpr::Or(Box::new(left), Box::new(right));
        }
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr> {
        let mut left = self.parse_cond_not()?;
        loop {
            self.skip_newlines();
            if !self.at_operator(Operator::AndIf) {
                return Ok(left);
            }
            self.position += 1;
            let right = self.parse_cond_not()?;
            left = CondExpr::And(Box::new(left), Box::new(right));
        }
    }

    fn parse_cond_not(&mut self) -> Result<CondExpr> {
        self.skip_newlines();
        if self.at_reserved("!") {
            self.position += 1;
            return Ok(CondExpr::Not(Box::new(self.parse_cond_not()?)));
        }
        self.parse_cond_primary()
    }

    fn parse_cond_primary(&mut self) -> Result<CondExpr> {
        self.skip_newlines();
        if self.at_operator(Operator::LParen) {
            self.position += 1;
            let expr = self.parse_cond_or()?;
            self.skip_newlines();
            self.expect_operator(Operator::RParen)?;
            return Ok(expr);
        }

        let first = match self.peek() {
            Some(token) if token.is_word() => token.clone(),
            _ => return Err(self.error("a conditional expression")),
        };
        self.position += 1;

        let next_is_operand = |token: Option<&Token>| token.map(|t| t.is_word()).unwrap_or(false);

        if !first.flags.quoted
            && COND_UNARY.contains(&first.text.as_str())
            && next_is_operand(self.peek())
        {
            let operand = self.peek().cloned().map(|t| make_word(&t)).transpose()?;
            self.position += 1;
            if let Some(operand) = operand {
                return Ok(CondExpr::Unary(first.text, operand));
            }
        }

        if let Some(op_token) = self.peek() {
            if op_token.is_word()
                && !op_token.flags.quoted
                && COND_BINARY.contains(&op_token.text.as_str())
            {
                let op = op_token.text.clone();
                self.position += 1;
                let right = match self.peek() {
                    Some(token) if token.is_word() => make_word(token)?,
                    _ => return Err(self.error(format!("an operand after `{}'", op))),
                };
                self.position += 1;
                return Ok(CondExpr::Binary(make_word(&first)?, op, right));
            }
        }

        Ok(CondExpr::Word(make_word(&first)?))
    }

    /// Replace a command-position alias with its value, repeatedly, never
    /// expanding the same alias twice for one command.
    fn expand_aliases(&mut self) {
        let aliases = match self.aliases {
            Some(aliases) => aliases,
            None => return,
        };
        let mut seen = HashSet::new();
        loop {
            let token = match self.peek() {
                Some(token) => token,
                None => return,
            };
            if token.kind != TokenKind::Word || token.flags.quoted || !token.flags.command_start {
                return;
            }
            let value = match aliases.get(&token.text) {
                Some(value) => value,
                None => return,
            };
            if !seen.insert(token.text.clone()) {
                return;
            }
            let pos = token.pos;
            let stream = match Lexer::tokenize(value, LexMode::Strict) {
                Ok(stream) => stream,
                Err(_) => return,
            };
            let replacement: Vec<Token> = stream
                .tokens
                .into_iter()
                .map(|mut t| {
                    t.pos = pos;
                    t
                })
                .collect();
            tracing::trace!(alias = %self.tokens[self.position].text, "expanding alias");
            let _ = self
                .tokens
                .splice(self.position..self.position + 1, replacement);
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.position + ahead)
    }

    fn at_operator(&self, op: Operator) -> bool {
        self.peek().map(|t| t.is_operator(op)).unwrap_or(false)
    }

    fn at_reserved(&self, word: &str) -> bool {
        self.peek().map(|t| t.is_reserved(word)).unwrap_or(false)
    }

    /// A reserved word in command position.
    fn at_keyword(&self, word: &str) -> bool {
        self.peek()
            .map(|t| t.is_reserved(word) && t.flags.command_start)
            .unwrap_or(false)
    }

    fn at_list_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(token) => match &token.kind {
                TokenKind::Operator(op) => matches!(
                    op,
                    Operator::RParen
                        | Operator::DSemi
                        | Operator::SemiAmp
                        | Operator::DSemiAmp
                        | Operator::DBracketClose
                ),
                TokenKind::Word => {
                    token.flags.command_start
                        && !token.flags.quoted
                        && CLOSERS.contains(&token.text.as_str())
                }
                _ => false,
            },
        }
    }

    fn skip_newlines(&mut self) {
        while self
            .peek()
            .map(|t| t.kind == TokenKind::Newline)
            .unwrap_or(false)
        {
            self.position += 1;
        }
    }

    /// Optional `;` followed by newlines.
    fn skip_separator(&mut self) {
        if self.at_operator(Operator::Semi) {
            self.position += 1;
        }
        self.skip_newlines();
    }

    fn expect_reserved(&mut self, word: &str) -> Result<()> {
        if self.at_reserved(word) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.error(format!("`{}'", word)))
        }
    }

    fn expect_operator(&mut self, op: Operator) -> Result<()> {
        if self.at_operator(op) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.error(format!("`{}'", op.as_str())))
        }
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError {
                expected: expected.into(),
                found: token.describe(),
                pos: token.pos,
                incomplete: false,
            },
            None => ParseError {
                expected: expected.into(),
                found: "end of input".to_string(),
                pos: self.end,
                incomplete: true,
            },
        }
    }
}

fn bad_substitution(err: word::BadSubstitution, pos: SourcePos) -> ParseError {
    ParseError {
        expected: "a valid parameter expansion".to_string(),
        found: format!("`{}'", err.0),
        pos,
        incomplete: false,
    }
}

fn make_word(token: &Token) -> Result<Word> {
    word::parse_word(&token.text).map_err(|e| bad_substitution(e, token.pos))
}

pub fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn is_function_name(text: &str) -> bool {
    !text.is_empty()
        && !text.contains(['=', '$', '`', '\'', '"', '\\'])
        && !CLOSERS.contains(&text)
}

/// Parse an assignment word such as `a=1`, `a+=x`, `a[2]=v` or `a=(1 2)`.
/// Returns `Ok(None)` when `text` is not assignment-shaped.
pub fn parse_assignment(text: &str, pos: SourcePos) -> Result<Option<Assignment>> {
    let (target, value) = match assignment_split(text) {
        Some(split) => split,
        None => return Ok(None),
    };
    let (target, append) = match target.strip_suffix('+') {
        Some(target) => (target, true),
        None => (target, false),
    };
    let (name, subscript) = match target.find('[') {
        Some(open) => (
            &target[..open],
            Some(target[open + 1..target.len() - 1].to_string()),
        ),
        None => (target, None),
    };

    let value = if value.len() >= 2 && value.starts_with('(') && value.ends_with(')') {
        AssignValue::Array(parse_array_literal(&value[1..value.len() - 1], pos)?)
    } else {
        AssignValue::Scalar(word::parse_word(value).map_err(|e| bad_substitution(e, pos))?)
    };

    Ok(Some(Assignment {
        name: name.to_string(),
        subscript,
        append,
        value,
    }))
}

fn parse_array_literal(inner: &str, pos: SourcePos) -> Result<Vec<ArrayElement>> {
    let stream = Lexer::tokenize(inner, LexMode::Strict).map_err(|e| ParseError {
        expected: "a closed array element".to_string(),
        found: e.to_string(),
        pos,
        incomplete: false,
    })?;

    let mut elements = Vec::new();
    for token in stream.tokens {
        match token.kind {
            TokenKind::Newline => continue,
            TokenKind::Word | TokenKind::Assignment | TokenKind::IoNumber => {}
            _ => {
                return Err(ParseError {
                    expected: "an array element".to_string(),
                    found: token.describe(),
                    pos,
                    incomplete: false,
                })
            }
        }
        let text = token.text.as_str();
        let keyed = if text.starts_with('[') {
            text.find("]=").map(|close| (&text[1..close], &text[close + 2..]))
        } else {
            None
        };
        let element = match keyed {
            Some((key, value)) => ArrayElement {
                key: Some(key.to_string()),
                value: word::parse_word(value).map_err(|e| bad_substitution(e, pos))?,
            },
            None => ArrayElement {
                key: None,
                value: word::parse_word(text).map_err(|e| bad_substitution(e, pos))?,
            },
        };
        elements.push(element);
    }
    Ok(elements)
}

/// Split the `init; cond; update` header of a C-style for loop.
fn split_for_header(text: &str) -> Option<(String, String, String)> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ';' if depth == 0 => {
                parts.push(std::mem::take(&mut current).trim().to_string());
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    if parts.len() != 3 {
        return None;
    }
    let update = parts.pop()?;
    let condition = parts.pop()?;
    let init = parts.pop()?;
    Some((init, condition, update))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> List {
        let stream = Lexer::tokenize(input, LexMode::Strict).unwrap();
        Parser::new(stream.tokens).parse_program().unwrap()
    }

    fn parse_err(input: &str) -> ParseError {
        let stream = Lexer::tokenize(input, LexMode::Lenient).unwrap();
        Parser::new(stream.tokens).parse_program().unwrap_err()
    }

    fn first_command(list: &List) -> &Command {
        &list.items[0].and_or.first.stages[0].command
    }

    #[test]
    fn test_parse_simple_command() {
        let list = parse("FOO=1 ls -la > out.txt");
        match first_command(&list) {
            Command::Simple(cmd) => {
                assert_eq!(cmd.assignments.len(), 1);
                assert_eq!(cmd.assignments[0].name, "FOO");
                assert_eq!(cmd.words.len(), 2);
                assert_eq!(cmd.redirects[0].kind, RedirectKind::Output);
                assert_eq!(cmd.redirects[0].fd(), 1);
            }
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_and_lists() {
        let list = parse("a | b |& c && d || e; f &");
        assert_eq!(list.items.len(), 2);
        let first = &list.items[0].and_or;
        assert_eq!(first.first.stages.len(), 3);
        assert!(first.first.stages[1].pipe_stderr);
        assert_eq!(first.rest[0].0, Connector::And);
        assert_eq!(first.rest[1].0, Connector::Or);
        assert!(list.items[1].background);
    }

    #[test]
    fn test_negated_pipeline() {
        let list = parse("! false | true");
        assert!(list.items[0].and_or.first.negate);
    }

    #[test]
    fn test_keywords_only_in_command_position() {
        let list = parse("echo if then fi");
        match first_command(&list) {
            Command::Simple(cmd) => assert_eq!(cmd.words.len(), 4),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_if_elif_else() {
        let list = parse("if a; then b; elif c; then d; elif e; then f; else g; fi");
        match first_command(&list) {
            Command::Compound(CompoundCommand::If { branches, else_branch }, _) => {
                assert_eq!(branches.len(), 3);
                assert!(else_branch.is_some());
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_control_structure_as_pipeline_stage() {
        let list = parse("for i in 1 2; do echo $i; done | while read x; do echo $x; done");
        let stages = &list.items[0].and_or.first.stages;
        assert!(matches!(stages[0].command, Command::Compound(CompoundCommand::For { .. }, _)));
        assert!(matches!(stages[1].command, Command::Compound(CompoundCommand::While { .. }, _)));
    }

    #[test]
    fn test_c_style_for() {
        let list = parse("for ((i = 0; i < 3; i++)); do echo $i; done");
        match first_command(&list) {
            Command::Compound(CompoundCommand::CFor { init, condition, update, .. }, _) => {
                assert_eq!(init, "i = 0");
                assert_eq!(condition, "i < 3");
                assert_eq!(update, "i++");
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_case_terminators() {
        let list = parse("case $x in\n a|b) echo ab;&\n c) echo c;;&\n *) echo other\nesac");
        match first_command(&list) {
            Command::Compound(CompoundCommand::Case { arms, .. }, _) => {
                assert_eq!(arms.len(), 3);
                assert_eq!(arms[0].patterns.len(), 2);
                assert_eq!(arms[0].terminator, CaseTerminator::FallThrough);
                assert_eq!(arms[1].terminator, CaseTerminator::Continue);
                assert_eq!(arms[2].terminator, CaseTerminator::Break);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_function_definition_forms() {
        for src in [
            "greet() { echo hi; }",
            "function greet { echo hi; }",
            "function greet() ( echo hi )",
        ] {
            match first_command(&parse(src)) {
                Command::FunctionDef(def) => assert_eq!(def.name, "greet"),
                other => panic!("{}: {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_conditional_expression() {
        let list = parse("[[ -n $a && ( $b == x* || ! $c =~ ^[0-9]+$ ) ]]");
        match first_command(&list) {
            Command::Compound(CompoundCommand::Cond(CondExpr::And(left, right)), _) => {
                assert!(matches!(**left, CondExpr::Unary(ref op, _) if op == "-n"));
                assert!(matches!(**right, CondExpr::Or(..)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_array_assignment() {
        let list = parse("arr=(one \"two three\" [5]=five)");
        match first_command(&list) {
            Command::Simple(cmd) => match &cmd.assignments[0].value {
                AssignValue::Array(elements) => {
                    assert_eq!(elements.len(), 3);
                    assert_eq!(elements[2].key.as_deref(), Some("5"));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_heredoc_redirect() {
        let list = parse("cat <<EOF\nhi $USER\nEOF\n");
        match first_command(&list) {
            Command::Simple(cmd) => {
                assert_eq!(cmd.redirects[0].kind, RedirectKind::HereDoc);
                assert!(matches!(cmd.redirects[0].target.parts[0], WordPart::DoubleQuoted(_)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_redirect_on_compound() {
        let list = parse("{ echo a; } 2>&1 >/dev/null");
        match first_command(&list) {
            Command::Compound(CompoundCommand::BraceGroup(_), redirects) => {
                assert_eq!(redirects.len(), 2);
                assert_eq!(redirects[0].fd, Some(2));
                assert_eq!(redirects[0].kind, RedirectKind::DupOutput);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_incomplete_vs_hard_errors() {
        let err = parse_err("if true; then echo hi");
        assert!(err.incomplete);
        assert_eq!(err.expected, "`fi'");

        let err = parse_err("while true; do echo; fi");
        assert!(!err.incomplete);
        assert_eq!(err.found, "`fi'");
    }

    #[test]
    fn test_error_names_tokens() {
        let err = parse_err("echo a | ;");
        assert_eq!(err.expected, "a command");
        assert_eq!(err.found, "`;'");
    }

    #[test]
    fn test_alias_expansion() {
        let mut aliases = HashMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());
        aliases.insert("loop".to_string(), "loop again".to_string());
        let stream = Lexer::tokenize("ll /tmp; loop", LexMode::Strict).unwrap();
        let list = Parser::new(stream.tokens)
            .with_aliases(&aliases)
            .parse_program()
            .unwrap();
        match first_command(&list) {
            Command::Simple(cmd) => {
                let raw: Vec<_> = cmd.words.iter().map(|w| w.raw.as_str()).collect();
                assert_eq!(raw, vec!["ls", "-l", "/tmp"]);
            }
            other => panic!("{:?}", other),
        }
        match &list.items[1].and_or.first.stages[0].command {
            Command::Simple(cmd) => assert_eq!(cmd.words[0].raw, "loop"),
            other => panic!("{:?}", other),
        }
    }
}
