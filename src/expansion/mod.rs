//! Word expansion.
//!
//! Each word goes through brace expansion, then tilde, parameter, command
//! and arithmetic expansion in a single left-to-right pass over its parts,
//! then field splitting and pathname expansion. Quote removal falls out of
//! the part structure: quoted parts are copied without their quotes.

pub mod brace;
pub mod fields;
pub mod pattern;

use crate::error::ShellError;
use crate::executor::Executor;
use crate::parser::ast::{ParamExpansion, ParamOp, Word, WordPart};
use crate::parser::word::parse_word;
use crate::runtime::Subscript;
use fields::FieldBuilder;
use pattern::ShellPattern;

type Result<T> = std::result::Result<T, ShellError>;

/// How expansion output is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    /// One string, no splitting or globbing.
    Plain,
    /// A glob pattern with quoted text escaped.
    Pattern,
    /// A regular expression with quoted text escaped.
    Regex,
    /// Arithmetic source: command output that is not a number becomes 0.
    Arith,
}

enum Target {
    Fields(FieldBuilder),
    Text(String, Style),
}

/// Expand command words into arguments.
pub fn expand_words(exec: &mut Executor, words: &[Word]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for word in words {
        let alternatives = brace::expand(&word.raw);
        if alternatives.len() == 1 && alternatives[0] == word.raw {
            out.extend(expand_fields(exec, word)?);
            continue;
        }
        for text in alternatives {
            let word = parse_word(&text).map_err(|e| ShellError::BadSubstitution(e.to_string()))?;
            out.extend(expand_fields(exec, &word)?);
        }
    }
    Ok(out)
}

/// Expand one word into fields, without brace expansion.
pub fn expand_fields(exec: &mut Executor, word: &Word) -> Result<Vec<String>> {
    let ifs = exec.runtime.ifs();
    let mut expander = Expander::new(exec, Target::Fields(FieldBuilder::new(&ifs)));
    expander.parts(&word.parts, false)?;
    let noglob = expander.exec.runtime.options.noglob;
    match expander.target {
        Target::Fields(builder) => Ok(builder
            .finish()
            .into_iter()
            .flat_map(|field| field.pathnames(noglob))
            .collect()),
        Target::Text(text, _) => Ok(vec![text]),
    }
}

fn expand_text(exec: &mut Executor, parts: &[WordPart], style: Style) -> Result<String> {
    let mut expander = Expander::new(exec, Target::Text(String::new(), style));
    expander.parts(parts, false)?;
    match expander.target {
        Target::Text(text, _) => Ok(text),
        Target::Fields(_) => Ok(String::new()),
    }
}

/// Expand a word to a single string: assignments, redirection targets,
/// `case` subjects, here-documents.
pub fn expand_string(exec: &mut Executor, word: &Word) -> Result<String> {
    expand_text(exec, &word.parts, Style::Plain)
}

/// Expand a word into a glob pattern; quoted parts match literally.
pub fn expand_pattern(exec: &mut Executor, word: &Word) -> Result<String> {
    expand_text(exec, &word.parts, Style::Pattern)
}

/// Expand the right side of `=~`; quoted parts match literally.
pub fn expand_regex(exec: &mut Executor, word: &Word) -> Result<String> {
    expand_text(exec, &word.parts, Style::Regex)
}

/// Expand `$`-constructs in arithmetic source, then evaluate it.
pub fn expand_arith(exec: &mut Executor, source: &str) -> Result<i64> {
    let text = if source.contains(['$', '`']) {
        let word = parse_word(source).map_err(|e| ShellError::BadSubstitution(e.to_string()))?;
        expand_text(exec, &word.parts, Style::Arith)?
    } else {
        source.to_string()
    };
    Ok(exec.runtime.eval_arith(&text)?)
}

/// A parameter's value before its operator is applied.
enum ParamValue {
    Scalar(Option<String>),
    List { items: Vec<String>, joined: bool },
}

impl ParamValue {
    fn is_unset(&self, colon: bool) -> bool {
        match self {
            ParamValue::Scalar(None) => true,
            ParamValue::Scalar(Some(v)) => colon && v.is_empty(),
            ParamValue::List { items, .. } => {
                items.is_empty() || (colon && items.len() == 1 && items[0].is_empty())
            }
        }
    }

    fn map(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            ParamValue::Scalar(v) => ParamValue::Scalar(v.map(|v| f(&v))),
            ParamValue::List { items, joined } => ParamValue::List {
                items: items.iter().map(|v| f(v)).collect(),
                joined,
            },
        }
    }
}

/// `"$@"`-like parts produce no field at all when empty.
fn expands_to_list(parts: &[WordPart]) -> bool {
    parts.iter().any(|part| match part {
        WordPart::Param(p) => match &p.op {
            ParamOp::Length => false,
            ParamOp::Keys { joined } | ParamOp::PrefixNames { joined } => !joined,
            _ => (p.name == "@" && p.index.is_none()) || p.index.as_deref() == Some("@"),
        },
        _ => false,
    })
}

struct Expander<'e> {
    exec: &'e mut Executor,
    target: Target,
}

impl<'e> Expander<'e> {
    fn new(exec: &'e mut Executor, target: Target) -> Self {
        Self { exec, target }
    }

    fn push_literal(&mut self, text: &str, quoted: bool) {
        match &mut self.target {
            Target::Fields(builder) => builder.push_literal(text, quoted),
            Target::Text(out, style) => push_styled(out, *style, text, quoted),
        }
    }

    fn push_value(&mut self, text: &str, quoted: bool) {
        match &mut self.target {
            Target::Fields(builder) if quoted => builder.push_literal(text, true),
            Target::Fields(builder) => builder.push_split(text),
            Target::Text(out, style) => push_styled(out, *style, text, quoted),
        }
    }

    fn mark_quoted(&mut self) {
        if let Target::Fields(builder) = &mut self.target {
            builder.mark_quoted();
        }
    }

    fn list_break(&mut self, quoted: bool) {
        match &mut self.target {
            Target::Fields(builder) if quoted => builder.hard_break(),
            Target::Fields(builder) => builder.soft_break(),
            Target::Text(out, _) => out.push(' '),
        }
    }

    fn parts(&mut self, parts: &[WordPart], quoted: bool) -> Result<()> {
        for part in parts {
            match part {
                WordPart::Literal(text) => self.push_literal(text, quoted),
                WordPart::SingleQuoted(text) => {
                    self.mark_quoted();
                    self.push_literal(text, true);
                }
                WordPart::Escaped(c) => self.push_literal(c.encode_utf8(&mut [0; 4]), true),
                WordPart::DoubleQuoted(inner) => {
                    if !expands_to_list(inner) {
                        self.mark_quoted();
                    }
                    self.parts(inner, true)?;
                }
                WordPart::Tilde(user) => {
                    let home = self.tilde(user);
                    self.push_literal(&home, true);
                }
                WordPart::Param(param) => self.param(param, quoted)?,
                WordPart::CommandSubst(source) => {
                    let mut output = self.exec.command_substitution(source)?;
                    if let Target::Text(_, Style::Arith) = self.target {
                        output = numeric_or_zero(&output);
                    }
                    self.push_value(&output, quoted);
                }
                WordPart::Arith(source) => {
                    let value = expand_arith(self.exec, source)?;
                    self.push_value(&value.to_string(), quoted);
                }
            }
        }
        Ok(())
    }

    fn tilde(&self, user: &str) -> String {
        let runtime = &self.exec.runtime;
        let found = match user {
            "" => runtime
                .get("HOME")
                .or_else(|| dirs::home_dir().map(|p| p.to_string_lossy().into_owned())),
            "+" => runtime.get("PWD"),
            "-" => runtime.get("OLDPWD"),
            name => nix::unistd::User::from_name(name)
                .ok()
                .flatten()
                .map(|u| u.dir.to_string_lossy().into_owned()),
        };
        found.unwrap_or_else(|| format!("~{}", user))
    }

    /// Expand a sub-word (an operator operand) to one string.
    fn operand(&mut self, word: &Word) -> Result<String> {
        expand_string(self.exec, word)
    }

    fn subscript(&mut self, name: &str, index: &str) -> Result<Subscript> {
        if self.exec.runtime.is_assoc(name) {
            let word = parse_word(index).map_err(|e| ShellError::BadSubstitution(e.to_string()))?;
            Ok(Subscript::Key(expand_string(self.exec, &word)?))
        } else {
            Ok(Subscript::Index(expand_arith(self.exec, index)?))
        }
    }

    fn lookup(&mut self, name: &str, index: Option<&str>) -> Result<ParamValue> {
        let runtime = &self.exec.runtime;
        Ok(match (name, index) {
            ("@", None) => ParamValue::List {
                items: runtime.positional().to_vec(),
                joined: false,
            },
            ("*", None) => ParamValue::List {
                items: runtime.positional().to_vec(),
                joined: true,
            },
            (_, Some(all @ ("@" | "*"))) => ParamValue::List {
                items: runtime.get_all(name),
                joined: all == "*",
            },
            (_, Some(index)) => {
                let subscript = self.subscript(name, index)?;
                ParamValue::Scalar(self.exec.runtime.get_element(name, &subscript))
            }
            (_, None) => ParamValue::Scalar(runtime.get(name)),
        })
    }

    fn param(&mut self, param: &ParamExpansion, quoted: bool) -> Result<()> {
        let (name, index) = if param.indirect {
            let target = self.exec.runtime.get(&param.name).unwrap_or_default();
            match target.split_once('[') {
                Some((base, rest)) if rest.ends_with(']') => {
                    (base.to_string(), Some(rest[..rest.len() - 1].to_string()))
                }
                _ => (target, param.index.clone()),
            }
        } else {
            (param.name.clone(), param.index.clone())
        };

        let value = match &param.op {
            ParamOp::PrefixNames { joined } => ParamValue::List {
                items: self
                    .exec
                    .runtime
                    .scopes
                    .names()
                    .into_iter()
                    .filter(|n| n.starts_with(&name))
                    .collect(),
                joined: *joined,
            },
            ParamOp::Keys { joined } => ParamValue::List {
                items: self.exec.runtime.get_keys(&name),
                joined: *joined,
            },
            _ => self.lookup(&name, index.as_deref())?,
        };

        let guarded = matches!(
            param.op,
            ParamOp::Default { .. }
                | ParamOp::Assign { .. }
                | ParamOp::Error { .. }
                | ParamOp::Alternate { .. }
        );
        if !guarded
            && self.exec.runtime.options.nounset
            && matches!(value, ParamValue::Scalar(None))
        {
            return Err(ShellError::Expansion(format!("{}: unbound variable", name)));
        }

        let value = match &param.op {
            ParamOp::None | ParamOp::PrefixNames { .. } | ParamOp::Keys { .. } => value,
            ParamOp::Length => {
                let length = match value {
                    ParamValue::Scalar(v) => v.map(|v| v.chars().count()).unwrap_or(0),
                    ParamValue::List { items, .. } => items.len(),
                };
                ParamValue::Scalar(Some(length.to_string()))
            }
            ParamOp::Default { word, colon } => {
                if value.is_unset(*colon) {
                    return self.parts(&word.parts, quoted);
                }
                value
            }
            ParamOp::Alternate { word, colon } => {
                if !value.is_unset(*colon) {
                    return self.parts(&word.parts, quoted);
                }
                ParamValue::Scalar(None)
            }
            ParamOp::Assign { word, colon } => {
                if value.is_unset(*colon) {
                    if !crate::parser::is_name(&name) {
                        return Err(ShellError::BadSubstitution(format!(
                            "${}: cannot assign in this way",
                            name
                        )));
                    }
                    let assigned = self.operand(word)?;
                    self.exec.runtime.assign(&name, assigned.clone())?;
                    ParamValue::Scalar(Some(assigned))
                } else {
                    value
                }
            }
            ParamOp::Error { word, colon } => {
                if value.is_unset(*colon) {
                    let message = match word {
                        Some(word) => self.operand(word)?,
                        None => "parameter null or not set".to_string(),
                    };
                    return Err(ShellError::Expansion(format!("{}: {}", name, message)));
                }
                value
            }
            ParamOp::RemovePrefix { pattern, longest } => {
                let pattern = ShellPattern::new(&expand_pattern(self.exec, pattern)?);
                value.map(|v| pattern.remove_prefix(v, *longest))
            }
            ParamOp::RemoveSuffix { pattern, longest } => {
                let pattern = ShellPattern::new(&expand_pattern(self.exec, pattern)?);
                value.map(|v| pattern.remove_suffix(v, *longest))
            }
            ParamOp::Replace {
                pattern,
                replacement,
                mode,
            } => {
                let pattern = ShellPattern::new(&expand_pattern(self.exec, pattern)?);
                let replacement = match replacement {
                    Some(word) => self.operand(word)?,
                    None => String::new(),
                };
                value.map(|v| pattern.replace(v, &replacement, *mode))
            }
            ParamOp::Case { mode, pattern } => {
                let pattern = match pattern {
                    Some(word) => Some(ShellPattern::new(&expand_pattern(self.exec, word)?)),
                    None => None,
                };
                value.map(|v| pattern::convert_case(v, *mode, pattern.as_ref()))
            }
            ParamOp::Substring { offset, length } => {
                let offset = expand_arith(self.exec, offset)?;
                let length = match length {
                    Some(length) => Some(expand_arith(self.exec, length)?),
                    None => None,
                };
                match value {
                    ParamValue::Scalar(v) => {
                        ParamValue::Scalar(v.map(|v| {
                            let chars: Vec<char> = v.chars().collect();
                            slice(&chars, offset, length).iter().collect()
                        }))
                    }
                    ParamValue::List { items, joined } => {
                        let items = if (name == "@" || name == "*") && index.is_none() {
                            let mut all = vec![self.exec.runtime.script_name.clone()];
                            all.extend(items);
                            all
                        } else {
                            items
                        };
                        ParamValue::List {
                            items: slice(&items, offset, length).to_vec(),
                            joined,
                        }
                    }
                }
            }
        };

        self.emit(value, quoted);
        Ok(())
    }

    fn emit(&mut self, value: ParamValue, quoted: bool) {
        match value {
            ParamValue::Scalar(Some(text)) => self.push_value(&text, quoted),
            ParamValue::Scalar(None) => {}
            ParamValue::List { items, joined } if quoted && joined => {
                let sep: String = self.exec.runtime.ifs().chars().take(1).collect();
                self.push_value(&items.join(&sep), true);
            }
            ParamValue::List { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.list_break(quoted);
                    }
                    self.push_value(item, quoted);
                }
            }
        }
    }
}

fn push_styled(out: &mut String, style: Style, text: &str, quoted: bool) {
    match (style, quoted) {
        (Style::Pattern, true) => out.push_str(&pattern::escape(text)),
        (Style::Regex, true) => out.push_str(&regex::escape(text)),
        _ => out.push_str(text),
    }
}

fn numeric_or_zero(output: &str) -> String {
    let trimmed = output.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if !digits.is_empty() && crate::arithmetic::parse_number(digits).is_ok() {
        trimmed.to_string()
    } else {
        "0".to_string()
    }
}

/// `${v:offset:length}` on a sequence; negative values count from the end.
fn slice<T>(items: &[T], offset: i64, length: Option<i64>) -> &[T] {
    let len = items.len() as i64;
    let start = if offset < 0 { len + offset } else { offset };
    if start < 0 || start > len {
        return &[];
    }
    let end = match length {
        None => len,
        Some(n) if n < 0 => len + n,
        Some(n) => (start + n).min(len),
    };
    if end < start {
        return &[];
    }
    &items[start as usize..end as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice() {
        let items = ['a', 'b', 'c', 'd', 'e'];
        assert_eq!(slice(&items, 1, Some(2)), &['b', 'c']);
        assert_eq!(slice(&items, -2, None), &['d', 'e']);
        assert_eq!(slice(&items, 1, Some(-1)), &['b', 'c', 'd']);
        assert!(slice(&items, 9, None).is_empty());
        assert!(slice(&items, 3, Some(-4)).is_empty());
    }

    #[test]
    fn test_list_detection() {
        let word = parse_word("\"$@\"").unwrap();
        match &word.parts[0] {
            WordPart::DoubleQuoted(inner) => assert!(expands_to_list(inner)),
            other => panic!("unexpected part {:?}", other),
        }
        let word = parse_word("\"${#arr[@]}\"").unwrap();
        match &word.parts[0] {
            WordPart::DoubleQuoted(inner) => assert!(!expands_to_list(inner)),
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn test_numeric_or_zero() {
        assert_eq!(numeric_or_zero(" 42\n"), "42");
        assert_eq!(numeric_or_zero("-7"), "-7");
        assert_eq!(numeric_or_zero("0x1f"), "0x1f");
        assert_eq!(numeric_or_zero(""), "0");
        assert_eq!(numeric_or_zero("abc"), "0");
    }

    #[test]
    fn test_push_styled_escapes_quoted() {
        let mut out = String::new();
        push_styled(&mut out, Style::Pattern, "*", true);
        push_styled(&mut out, Style::Pattern, "*", false);
        push_styled(&mut out, Style::Regex, "a.b", true);
        assert_eq!(out, "[*]*a\\.b");
    }
}
