//! Arithmetic evaluation for `$(( ))`, `(( ))`, C-style `for` and array
//! subscripts.
//!
//! Expressions are tokenized with logos, parsed into a small tree and then
//! evaluated, so `&&`, `||` and `?:` only evaluate the operands they need.
//! All values are signed 64-bit integers with wrapping overflow.
//!
//! Precedence, lowest to highest:
//! `,` / assignment / `?:` / `||` / `&&` / `|` / `^` / `&` / `== !=` /
//! `< <= > >=` / `<< >>` / `+ -` / `* / %` / `**` / unary / postfix

use logos::Logos;

/// How deep variable values may refer to other variables.
const MAX_RESOLVE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("division by 0")]
    DivisionByZero,
    #[error("syntax error in expression (error token is \"{0}\")")]
    Syntax(String),
    #[error("{0}: value too great for base")]
    BadNumber(String),
    #[error("exponent less than 0")]
    NegativeExponent,
    #[error("{0}: expression recursion level exceeded")]
    Recursion(String),
    #[error("attempted assignment to non-variable")]
    NotAssignable,
    #[error("{0}: readonly variable")]
    Readonly(String),
}

type Result<T> = std::result::Result<T, ArithmeticError>;

/// Variable access for the evaluator.
pub trait ArithEnv {
    /// Raw value of `name` (or `name[index]`), `None` when unset.
    fn get_var(&mut self, name: &str, index: Option<i64>) -> Option<String>;
    fn set_var(&mut self, name: &str, index: Option<i64>, value: i64) -> Result<()>;
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[regex(r"[0-9][0-9A-Za-z_@#]*", |lex| lex.slice().to_string())]
    Number(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("**")]
    Pow,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[token("=")]
    Assign,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,
    #[token("%=")]
    RemAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("&=")]
    AndAssign,
    #[token("^=")]
    XorAssign,
    #[token("|=")]
    OrAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(i64),
    Var(String, Option<Box<Expr>>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `name op= value`; `None` is plain `=`.
    Assign(Option<BinOp>, String, Option<Box<Expr>>, Box<Expr>),
    IncDec {
        name: String,
        index: Option<Box<Expr>>,
        delta: i64,
        prefix: bool,
    },
    Comma(Box<Expr>, Box<Expr>),
}

/// Parse an expression. Empty input parses as `0`.
pub fn parse(src: &str) -> Result<Expr> {
    let mut lexer = Tok::lexer(src);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(tok) => tokens.push((tok, lexer.span().start)),
            Err(()) => {
                let rest = src[lexer.span().start..].trim().to_string();
                return Err(ArithmeticError::Syntax(rest));
            }
        }
    }
    if tokens.is_empty() {
        return Ok(Expr::Num(0));
    }
    let mut parser = ExprParser {
        src,
        tokens,
        pos: 0,
    };
    let expr = parser.comma()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.syntax_error());
    }
    Ok(expr)
}

/// Parse and evaluate `src` against `env`.
pub fn evaluate<E: ArithEnv + ?Sized>(src: &str, env: &mut E) -> Result<i64> {
    let expr = parse(src)?;
    Evaluator { env, depth: 0 }.eval(&expr)
}

/// Parse an integer constant: decimal, `0x` hex, leading-zero octal or
/// `base#digits`.
pub fn parse_number(text: &str) -> Result<i64> {
    let bad = || ArithmeticError::BadNumber(text.to_string());
    if let Some((base, digits)) = text.split_once('#') {
        let base: u32 = base.parse().map_err(|_| bad())?;
        if !(2..=64).contains(&base) || digits.is_empty() {
            return Err(bad());
        }
        let mut value: i64 = 0;
        for c in digits.chars() {
            let digit = match c {
                '0'..='9' => c as u32 - '0' as u32,
                'a'..='z' => c as u32 - 'a' as u32 + 10,
                'A'..='Z' if base <= 36 => c as u32 - 'A' as u32 + 10,
                'A'..='Z' => c as u32 - 'A' as u32 + 36,
                '@' => 62,
                '_' => 63,
                _ => return Err(bad()),
            };
            if digit >= base {
                return Err(bad());
            }
            value = value.wrapping_mul(base as i64).wrapping_add(digit as i64);
        }
        return Ok(value);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|v| v as i64).map_err(|_| bad());
    }
    if text.len() > 1 && text.starts_with('0') {
        return u64::from_str_radix(&text[1..], 8).map(|v| v as i64).map_err(|_| bad());
    }
    text.parse::<u64>().map(|v| v as i64).map_err(|_| bad())
}

struct ExprParser<'s> {
    src: &'s str,
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl<'s> ExprParser<'s> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.syntax_error())
        }
    }

    fn syntax_error(&self) -> ArithmeticError {
        let rest = match self.tokens.get(self.pos) {
            Some((_, offset)) => self.src[*offset..].trim(),
            None => self.src.trim(),
        };
        ArithmeticError::Syntax(rest.to_string())
    }

    fn comma(&mut self) -> Result<Expr> {
        let mut left = self.assignment()?;
        while self.eat(&Tok::Comma) {
            let right = self.assignment()?;
            left = Expr::Comma(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn assignment(&mut self) -> Result<Expr> {
        let start = self.pos;
        let left = self.ternary()?;
        let op = match self.peek() {
            Some(Tok::Assign) => None,
            Some(Tok::AddAssign) => Some(BinOp::Add),
            Some(Tok::SubAssign) => Some(BinOp::Sub),
            Some(Tok::MulAssign) => Some(BinOp::Mul),
            Some(Tok::DivAssign) => Some(BinOp::Div),
            Some(Tok::RemAssign) => Some(BinOp::Rem),
            Some(Tok::ShlAssign) => Some(BinOp::Shl),
            Some(Tok::ShrAssign) => Some(BinOp::Shr),
            Some(Tok::AndAssign) => Some(BinOp::BitAnd),
            Some(Tok::XorAssign) => Some(BinOp::BitXor),
            Some(Tok::OrAssign) => Some(BinOp::BitOr),
            _ => return Ok(left),
        };
        let (name, index) = match left {
            Expr::Var(name, index) => (name, index),
            _ => {
                self.pos = start;
                return Err(ArithmeticError::NotAssignable);
            }
        };
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign(op, name, index, Box::new(value)))
    }

    fn ternary(&mut self) -> Result<Expr> {
        let condition = self.binary(0)?;
        if !self.eat(&Tok::Question) {
            return Ok(condition);
        }
        let then = self.assignment()?;
        self.expect(&Tok::Colon)?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    /// Left-associative binary levels, `||` at level 0 up to `* / %`.
    fn binary(&mut self, level: usize) -> Result<Expr> {
        if level > 9 {
            return self.power();
        }
        let mut left = self.binary(level + 1)?;
        while let Some(op) = self.peek().and_then(|tok| binary_op(tok, level)) {
            self.pos += 1;
            let right = self.binary(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.unary()?;
        if self.eat(&Tok::Pow) {
            let exponent = self.power()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Tok::Minus) => UnOp::Neg,
            Some(Tok::Plus) => UnOp::Plus,
            Some(Tok::Bang) => UnOp::Not,
            Some(Tok::Tilde) => UnOp::BitNot,
            Some(Tok::Inc) | Some(Tok::Dec) => {
                let delta = if self.peek() == Some(&Tok::Inc) { 1 } else { -1 };
                self.pos += 1;
                return match self.postfix()? {
                    Expr::Var(name, index) => Ok(Expr::IncDec {
                        name,
                        index,
                        delta,
                        prefix: true,
                    }),
                    _ => Err(ArithmeticError::NotAssignable),
                };
            }
            _ => return self.postfix(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let operand = self.primary()?;
        if let Expr::Var(name, index) = &operand {
            let delta = match self.peek() {
                Some(Tok::Inc) => 1,
                Some(Tok::Dec) => -1,
                _ => return Ok(operand),
            };
            self.pos += 1;
            return Ok(Expr::IncDec {
                name: name.clone(),
                index: index.clone(),
                delta,
                prefix: false,
            });
        }
        Ok(operand)
    }

    fn primary(&mut self) -> Result<Expr> {
        let tok = match self.peek() {
            Some(tok) => tok.clone(),
            None => return Err(self.syntax_error()),
        };
        match tok {
            Tok::Number(text) => {
                self.pos += 1;
                Ok(Expr::Num(parse_number(&text)?))
            }
            Tok::Ident(name) => {
                self.pos += 1;
                let index = if self.eat(&Tok::LBracket) {
                    let index = self.comma()?;
                    self.expect(&Tok::RBracket)?;
                    Some(Box::new(index))
                } else {
                    None
                };
                Ok(Expr::Var(name, index))
            }
            Tok::LParen => {
                self.pos += 1;
                let inner = self.comma()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            _ => Err(self.syntax_error()),
        }
    }
}

fn binary_op(tok: &Tok, level: usize) -> Option<BinOp> {
    let op = match (level, tok) {
        (0, Tok::OrOr) => BinOp::Or,
        (1, Tok::AndAnd) => BinOp::And,
        (2, Tok::Pipe) => BinOp::BitOr,
        (3, Tok::Caret) => BinOp::BitXor,
        (4, Tok::Amp) => BinOp::BitAnd,
        (5, Tok::EqEq) => BinOp::Eq,
        (5, Tok::Ne) => BinOp::Ne,
        (6, Tok::Lt) => BinOp::Lt,
        (6, Tok::Le) => BinOp::Le,
        (6, Tok::Gt) => BinOp::Gt,
        (6, Tok::Ge) => BinOp::Ge,
        (7, Tok::Shl) => BinOp::Shl,
        (7, Tok::Shr) => BinOp::Shr,
        (8, Tok::Plus) => BinOp::Add,
        (8, Tok::Minus) => BinOp::Sub,
        (9, Tok::Star) => BinOp::Mul,
        (9, Tok::Slash) => BinOp::Div,
        (9, Tok::Percent) => BinOp::Rem,
        _ => return None,
    };
    Some(op)
}

struct Evaluator<'e, E: ArithEnv + ?Sized> {
    env: &'e mut E,
    depth: usize,
}

impl<'e, E: ArithEnv + ?Sized> Evaluator<'e, E> {
    fn eval(&mut self, expr: &Expr) -> Result<i64> {
        match expr {
            Expr::Num(n) => Ok(*n),
            Expr::Var(name, index) => self.value_of(name, index.as_deref()),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Plus => v,
                    UnOp::Not => (v == 0) as i64,
                    UnOp::BitNot => !v,
                })
            }
            Expr::Binary(BinOp::And, left, right) => {
                Ok((self.eval(left)? != 0 && self.eval(right)? != 0) as i64)
            }
            Expr::Binary(BinOp::Or, left, right) => {
                Ok((self.eval(left)? != 0 || self.eval(right)? != 0) as i64)
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply(*op, l, r)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if self.eval(condition)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign(op, name, index, value) => {
                let index = self.index(index.as_deref())?;
                let rhs = self.eval(value)?;
                let result = match op {
                    Some(op) => {
                        let current = self.lookup(name, index)?;
                        apply(*op, current, rhs)?
                    }
                    None => rhs,
                };
                self.env.set_var(name, index, result)?;
                Ok(result)
            }
            Expr::IncDec {
                name,
                index,
                delta,
                prefix,
            } => {
                let index = self.index(index.as_deref())?;
                let old = self.lookup(name, index)?;
                let new = old.wrapping_add(*delta);
                self.env.set_var(name, index, new)?;
                Ok(if *prefix { new } else { old })
            }
            Expr::Comma(left, right) => {
                self.eval(left)?;
                self.eval(right)
            }
        }
    }

    fn index(&mut self, index: Option<&Expr>) -> Result<Option<i64>> {
        index.map(|e| self.eval(e)).transpose()
    }

    fn value_of(&mut self, name: &str, index: Option<&Expr>) -> Result<i64> {
        let index = self.index(index)?;
        self.lookup(name, index)
    }

    /// A variable's value, itself evaluated as an expression when it is not
    /// a plain number. Unparseable values count as 0.
    fn lookup(&mut self, name: &str, index: Option<i64>) -> Result<i64> {
        let raw = match self.env.get_var(name, index) {
            Some(raw) => raw,
            None => return Ok(0),
        };
        let text = raw.trim();
        if text.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = text.parse::<i64>() {
            return Ok(n);
        }
        let expr = match parse(text) {
            Ok(expr) => expr,
            Err(_) => return Ok(0),
        };
        if self.depth >= MAX_RESOLVE_DEPTH {
            return Err(ArithmeticError::Recursion(name.to_string()));
        }
        self.depth += 1;
        let result = self.eval(&expr);
        self.depth -= 1;
        result
    }
}

fn apply(op: BinOp, l: i64, r: i64) -> Result<i64> {
    Ok(match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => {
            if r == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        BinOp::Rem => {
            if r == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
        BinOp::Pow => {
            if r < 0 {
                return Err(ArithmeticError::NegativeExponent);
            }
            let mut result: i64 = 1;
            let mut base = l;
            let mut exp = r as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        BinOp::Shl => l.wrapping_shl((r & 63) as u32),
        BinOp::Shr => l.wrapping_shr((r & 63) as u32),
        BinOp::Lt => (l < r) as i64,
        BinOp::Le => (l <= r) as i64,
        BinOp::Gt => (l > r) as i64,
        BinOp::Ge => (l >= r) as i64,
        BinOp::Eq => (l == r) as i64,
        BinOp::Ne => (l != r) as i64,
        BinOp::BitAnd => l & r,
        BinOp::BitXor => l ^ r,
        BinOp::BitOr => l | r,
        BinOp::And => (l != 0 && r != 0) as i64,
        BinOp::Or => (l != 0 || r != 0) as i64,
    })
}
