//! Decomposition of raw word text into [`WordPart`]s.
//!
//! The lexer has already verified that every quote and substitution in the
//! word is balanced, so the scanners here only locate boundaries.

use super::ast::{CaseMode, ParamExpansion, ParamOp, ReplaceMode, Word, WordPart};
use crate::lexer::scan;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}: bad substitution")]
pub struct BadSubstitution(pub String);

type Result<T> = std::result::Result<T, BadSubstitution>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Unquoted,
    DoubleQuoted,
    HereDoc,
}

/// Parse a word as it appears in a command.
pub fn parse_word(raw: &str) -> Result<Word> {
    let chars: Vec<char> = raw.chars().collect();
    let parts = parse_parts(&chars, Context::Unquoted, true)?;
    Ok(Word {
        parts,
        raw: raw.to_string(),
    })
}

/// Parse the body of an unquoted here-document: expansions apply, quotes
/// are literal, and the result is never split or globbed.
pub fn parse_heredoc(body: &str) -> Result<Word> {
    let chars: Vec<char> = body.chars().collect();
    let parts = parse_parts(&chars, Context::HereDoc, false)?;
    Ok(Word {
        parts: vec![WordPart::DoubleQuoted(parts)],
        raw: body.to_string(),
    })
}

fn parse_parts(chars: &[char], ctx: Context, allow_tilde: bool) -> Result<Vec<WordPart>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    if allow_tilde && ctx == Context::Unquoted && chars.first() == Some(&'~') {
        let end = chars.iter().position(|c| *c == '/').unwrap_or(chars.len());
        let user: String = chars[1..end].iter().collect();
        if user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
        {
            parts.push(WordPart::Tilde(user));
            i = end;
        }
    }

    while i < chars.len() {
        let c = chars[i];
        match (c, ctx) {
            ('\'', Context::Unquoted) => {
                let end = scan::single_quote(chars, i).map_err(bad(chars))?;
                flush(&mut literal, &mut parts);
                parts.push(WordPart::SingleQuoted(chars[i + 1..end - 1].iter().collect()));
                i = end;
            }
            ('"', Context::Unquoted) => {
                let end = scan::double_quote(chars, i).map_err(bad(chars))?;
                flush(&mut literal, &mut parts);
                let inner = parse_parts(&chars[i + 1..end - 1], Context::DoubleQuoted, false)?;
                parts.push(WordPart::DoubleQuoted(inner));
                i = end;
            }
            ('\\', _) => {
                let next = chars.get(i + 1).copied();
                match (next, ctx) {
                    (None, _) => {
                        literal.push('\\');
                        i += 1;
                    }
                    (Some('\n'), _) => i += 2,
                    (Some(n), Context::Unquoted) => {
                        flush(&mut literal, &mut parts);
                        parts.push(WordPart::Escaped(n));
                        i += 2;
                    }
                    (Some(n), _)
                        if matches!(n, '$' | '`' | '\\')
                            || (n == '"' && ctx == Context::DoubleQuoted) =>
                    {
                        flush(&mut literal, &mut parts);
                        parts.push(WordPart::Escaped(n));
                        i += 2;
                    }
                    (Some(_), _) => {
                        literal.push('\\');
                        i += 1;
                    }
                }
            }
            ('`', _) => {
                let end = scan::backquote(chars, i).map_err(bad(chars))?;
                flush(&mut literal, &mut parts);
                parts.push(WordPart::CommandSubst(unescape_backquoted(&chars[i + 1..end - 1])));
                i = end;
            }
            ('$', _) => {
                let (part, end) = parse_dollar(chars, i, ctx)?;
                match part {
                    Some(part) => {
                        flush(&mut literal, &mut parts);
                        parts.push(part);
                    }
                    None => literal.push('$'),
                }
                i = end;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut parts);
    Ok(parts)
}

fn flush(literal: &mut String, parts: &mut Vec<WordPart>) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

fn bad(chars: &[char]) -> impl Fn(&'static str) -> BadSubstitution + '_ {
    move |_| BadSubstitution(chars.iter().collect())
}

/// Inside backquotes a backslash only escapes `$`, `` ` `` and `\`.
fn unescape_backquoted(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && matches!(chars.get(i + 1), Some('$') | Some('`') | Some('\\')) {
            out.push(chars[i + 1]);
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_special(c: char) -> bool {
    matches!(c, '@' | '*' | '#' | '?' | '$' | '!' | '-' | '0')
}

/// Returns the part (or `None` for a literal `$`) and the index after it.
fn parse_dollar(chars: &[char], start: usize, ctx: Context) -> Result<(Option<WordPart>, usize)> {
    let next = chars.get(start + 1).copied();
    match next {
        Some('(') => {
            let end = scan::dollar(chars, start).map_err(bad(chars))?;
            if chars.get(start + 2) == Some(&'(') {
                let text: String = chars[start + 3..end - 2].iter().collect();
                Ok((Some(WordPart::Arith(text)), end))
            } else {
                let text: String = chars[start + 2..end - 1].iter().collect();
                Ok((Some(WordPart::CommandSubst(text)), end))
            }
        }
        Some('{') => {
            let end = scan::dollar(chars, start).map_err(bad(chars))?;
            let param = parse_braced(&chars[start + 2..end - 1])?;
            Ok((Some(WordPart::Param(param)), end))
        }
        Some('\'') if ctx == Context::Unquoted => {
            let end = scan::ansi_c_quote(chars, start + 1).map_err(bad(chars))?;
            let text = decode_ansi_c(&chars[start + 2..end - 1]);
            Ok((Some(WordPart::SingleQuoted(text)), end))
        }
        Some('"') if ctx == Context::Unquoted => {
            let end = scan::double_quote(chars, start + 1).map_err(bad(chars))?;
            let inner = parse_parts(&chars[start + 2..end - 1], Context::DoubleQuoted, false)?;
            Ok((Some(WordPart::DoubleQuoted(inner)), end))
        }
        Some(c) if is_name_start(c) => {
            let mut end = start + 1;
            while end < chars.len() && is_name_char(chars[end]) {
                end += 1;
            }
            let name: String = chars[start + 1..end].iter().collect();
            Ok((Some(WordPart::Param(ParamExpansion::simple(&name))), end))
        }
        Some(c) if c.is_ascii_digit() || is_special(c) => Ok((
            Some(WordPart::Param(ParamExpansion::simple(&c.to_string()))),
            start + 2,
        )),
        _ => Ok((None, start + 1)),
    }
}

/// Length of a parameter name at the start of `chars`.
fn name_len(chars: &[char]) -> usize {
    match chars.first() {
        Some(c) if is_name_start(*c) => chars.iter().take_while(|c| is_name_char(**c)).count(),
        Some(c) if c.is_ascii_digit() => chars.iter().take_while(|c| c.is_ascii_digit()).count(),
        Some(c) if is_special(*c) => 1,
        _ => 0,
    }
}

/// Length of a `[...]` subscript at the start of `chars`, brackets included.
fn subscript_len(chars: &[char]) -> Option<usize> {
    if chars.first() != Some(&'[') {
        return None;
    }
    let mut depth = 0;
    for (i, c) in chars.iter().enumerate() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the inside of `${...}`.
fn parse_braced(inner: &[char]) -> Result<ParamExpansion> {
    let text = || BadSubstitution(format!("${{{}}}", inner.iter().collect::<String>()));
    if inner.is_empty() {
        return Err(text());
    }

    // ${#name} and ${#arr[@]}; a bare ${#} is the parameter count
    if inner[0] == '#' && inner.len() > 1 {
        let n = name_len(&inner[1..]);
        if n > 0 {
            let after = 1 + n;
            let sub = subscript_len(&inner[after..]).unwrap_or(0);
            if after + sub == inner.len() {
                let index = (sub > 0).then(|| inner[after + 1..after + sub - 1].iter().collect());
                return Ok(ParamExpansion {
                    name: inner[1..after].iter().collect(),
                    index,
                    indirect: false,
                    op: ParamOp::Length,
                });
            }
        }
    }

    let mut i = 0;
    let mut indirect = false;
    if inner[0] == '!' && inner.len() > 1 {
        indirect = true;
        i = 1;
    }

    let n = name_len(&inner[i..]);
    if n == 0 {
        return Err(text());
    }
    let name: String = inner[i..i + n].iter().collect();
    i += n;

    let mut index = None;
    if let Some(sub) = subscript_len(&inner[i..]) {
        index = Some(inner[i + 1..i + sub - 1].iter().collect::<String>());
        i += sub;
    }

    let rest = &inner[i..];
    if indirect {
        if rest.is_empty() {
            if let Some(idx) = index.as_deref() {
                if idx == "@" || idx == "*" {
                    return Ok(ParamExpansion {
                        name,
                        index: None,
                        indirect: false,
                        op: ParamOp::Keys { joined: idx == "*" },
                    });
                }
            }
        } else if index.is_none() && (rest == ['*'] || rest == ['@']) {
            return Ok(ParamExpansion {
                name,
                index: None,
                indirect: false,
                op: ParamOp::PrefixNames {
                    joined: rest[0] == '*',
                },
            });
        }
    }

    let op = parse_op(rest).ok_or_else(text)??;
    Ok(ParamExpansion {
        name,
        index,
        indirect,
        op,
    })
}

fn operand(chars: &[char]) -> Result<Word> {
    parse_word(&chars.iter().collect::<String>())
}

fn pattern(chars: &[char]) -> Result<Word> {
    let raw: String = chars.iter().collect();
    let parts = parse_parts(chars, Context::Unquoted, false)?;
    Ok(Word { parts, raw })
}

/// `None` when `rest` is not a recognised operator.
fn parse_op(rest: &[char]) -> Option<Result<ParamOp>> {
    let starts = |prefix: &str| {
        let p: Vec<char> = prefix.chars().collect();
        rest.len() >= p.len() && rest[..p.len()] == p[..]
    };
    let tail = |n: usize| &rest[n..];

    let op = if rest.is_empty() {
        Ok(ParamOp::None)
    } else if starts(":-") || starts("-") {
        let colon = rest[0] == ':';
        operand(tail(if colon { 2 } else { 1 })).map(|word| ParamOp::Default { word, colon })
    } else if starts(":=") || starts("=") {
        let colon = rest[0] == ':';
        operand(tail(if colon { 2 } else { 1 })).map(|word| ParamOp::Assign { word, colon })
    } else if starts(":?") || starts("?") {
        let colon = rest[0] == ':';
        let body = tail(if colon { 2 } else { 1 });
        if body.is_empty() {
            Ok(ParamOp::Error { word: None, colon })
        } else {
            operand(body).map(|word| ParamOp::Error {
                word: Some(word),
                colon,
            })
        }
    } else if starts(":+") || starts("+") {
        let colon = rest[0] == ':';
        operand(tail(if colon { 2 } else { 1 })).map(|word| ParamOp::Alternate { word, colon })
    } else if starts(":") {
        let body = tail(1);
        match find_top_level(body, ':') {
            Some(split) => Ok(ParamOp::Substring {
                offset: body[..split].iter().collect(),
                length: Some(body[split + 1..].iter().collect()),
            }),
            None => Ok(ParamOp::Substring {
                offset: body.iter().collect(),
                length: None,
            }),
        }
    } else if starts("##") || starts("#") {
        let longest = starts("##");
        pattern(tail(if longest { 2 } else { 1 }))
            .map(|pattern| ParamOp::RemovePrefix { pattern, longest })
    } else if starts("%%") || starts("%") {
        let longest = starts("%%");
        pattern(tail(if longest { 2 } else { 1 }))
            .map(|pattern| ParamOp::RemoveSuffix { pattern, longest })
    } else if starts("/") {
        let (mode, skip) = if starts("//") {
            (ReplaceMode::All, 2)
        } else if starts("/#") {
            (ReplaceMode::Prefix, 2)
        } else if starts("/%") {
            (ReplaceMode::Suffix, 2)
        } else {
            (ReplaceMode::First, 1)
        };
        let body = tail(skip);
        let (pat, rep) = match find_top_level(body, '/') {
            Some(split) => (&body[..split], Some(&body[split + 1..])),
            None => (body, None),
        };
        pattern(pat).and_then(|pattern| {
            let replacement = rep.map(operand).transpose()?;
            Ok(ParamOp::Replace {
                pattern,
                replacement,
                mode,
            })
        })
    } else if starts("^") || starts(",") {
        let doubled = starts("^^") || starts(",,");
        let mode = match (rest[0], doubled) {
            ('^', false) => CaseMode::UpperFirst,
            ('^', true) => CaseMode::UpperAll,
            (_, false) => CaseMode::LowerFirst,
            (_, true) => CaseMode::LowerAll,
        };
        let body = tail(if doubled { 2 } else { 1 });
        if body.is_empty() {
            Ok(ParamOp::Case {
                mode,
                pattern: None,
            })
        } else {
            pattern(body).map(|p| ParamOp::Case {
                mode,
                pattern: Some(p),
            })
        }
    } else {
        return None;
    };
    Some(op)
}

/// Index of the first `target` outside quotes, escapes and nested
/// substitutions.
fn find_top_level(chars: &[char], target: char) -> Option<usize> {
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if c == target => return Some(i),
            '\\' => i += 2,
            '\'' => i = scan::single_quote(chars, i).ok()?,
            '"' => i = scan::double_quote(chars, i).ok()?,
            '`' => i = scan::backquote(chars, i).ok()?,
            '$' => i = scan::dollar(chars, i).ok()?,
            _ => i += 1,
        }
    }
    None
}

/// Decode the escapes of `$'...'`.
fn decode_ansi_c(chars: &[char]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let e = chars[i + 1];
        i += 2;
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' | 'E' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => {
                let digits: String = chars[i..]
                    .iter()
                    .take(2)
                    .take_while(|c| c.is_ascii_hexdigit())
                    .collect();
                i += digits.len();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => out.push_str("\\x"),
                }
            }
            '0'..='7' => {
                let mut digits = e.to_string();
                while digits.len() < 3 && i < chars.len() && ('0'..='7').contains(&chars[i]) {
                    digits.push(chars[i]);
                    i += 1;
                }
                if let Some(c) = u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(raw: &str) -> ParamExpansion {
        match parse_word(raw).unwrap().parts.as_slice() {
            [WordPart::Param(p)] => p.clone(),
            other => panic!("expected a single parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_and_quotes() {
        let word = parse_word(r#"a'b c'"d $x"\e"#).unwrap();
        assert_eq!(
            word.parts,
            vec![
                WordPart::Literal("a".into()),
                WordPart::SingleQuoted("b c".into()),
                WordPart::DoubleQuoted(vec![
                    WordPart::Literal("d ".into()),
                    WordPart::Param(ParamExpansion::simple("x")),
                ]),
                WordPart::Escaped('e'),
            ]
        );
    }

    #[test]
    fn test_tilde_prefix() {
        let word = parse_word("~/bin").unwrap();
        assert_eq!(word.parts[0], WordPart::Tilde(String::new()));
        assert_eq!(word.parts[1], WordPart::Literal("/bin".into()));
        let word = parse_word("'~'").unwrap();
        assert_eq!(word.parts, vec![WordPart::SingleQuoted("~".into())]);
    }

    #[test]
    fn test_substitutions() {
        let word = parse_word("$(echo hi)$((1+2))`date`").unwrap();
        assert_eq!(
            word.parts,
            vec![
                WordPart::CommandSubst("echo hi".into()),
                WordPart::Arith("1+2".into()),
                WordPart::CommandSubst("date".into()),
            ]
        );
    }

    #[test]
    fn test_special_parameters() {
        assert_eq!(param("$?").name, "?");
        assert_eq!(param("$1").name, "1");
        assert_eq!(param("${10}").name, "10");
        assert_eq!(param("${#}").name, "#");
    }

    #[test]
    fn test_length_and_arrays() {
        let p = param("${#arr[@]}");
        assert_eq!(p.op, ParamOp::Length);
        assert_eq!(p.index.as_deref(), Some("@"));
        let p = param("${arr[i+1]}");
        assert_eq!(p.index.as_deref(), Some("i+1"));
    }

    #[test]
    fn test_default_operators() {
        match param("${v:-fallback}").op {
            ParamOp::Default { word, colon } => {
                assert!(colon);
                assert_eq!(word.raw, "fallback");
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(param("${v-x}").op, ParamOp::Default { colon: false, .. }));
        assert!(matches!(param("${v:?}").op, ParamOp::Error { word: None, colon: true }));
    }

    #[test]
    fn test_pattern_operators() {
        assert!(matches!(param("${v##*/}").op, ParamOp::RemovePrefix { longest: true, .. }));
        assert!(matches!(param("${v%.*}").op, ParamOp::RemoveSuffix { longest: false, .. }));
        match param("${v//a/b}").op {
            ParamOp::Replace {
                mode, replacement, ..
            } => {
                assert_eq!(mode, ReplaceMode::All);
                assert_eq!(replacement.unwrap().raw, "b");
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(
            param("${v/#x}").op,
            ParamOp::Replace { mode: ReplaceMode::Prefix, replacement: None, .. }
        ));
    }

    #[test]
    fn test_substring_and_case() {
        assert_eq!(
            param("${v: -3:2}").op,
            ParamOp::Substring {
                offset: " -3".into(),
                length: Some("2".into())
            }
        );
        assert_eq!(
            param("${v^^}").op,
            ParamOp::Case {
                mode: CaseMode::UpperAll,
                pattern: None
            }
        );
    }

    #[test]
    fn test_indirection_forms() {
        let p = param("${!ref}");
        assert!(p.indirect);
        assert_eq!(param("${!pre*}").op, ParamOp::PrefixNames { joined: true });
        assert_eq!(param("${!arr[@]}").op, ParamOp::Keys { joined: false });
    }

    #[test]
    fn test_bad_substitution() {
        assert!(parse_word("${}").is_err());
        assert!(parse_word("${v~x}").is_err());
    }

    #[test]
    fn test_ansi_c_quoting() {
        let word = parse_word(r"$'a\tb\x41\n'").unwrap();
        assert_eq!(word.parts, vec![WordPart::SingleQuoted("a\tbA\n".into())]);
    }

    #[test]
    fn test_heredoc_body_keeps_quotes() {
        let word = parse_heredoc("say \"$x\" 'y'\n").unwrap();
        match &word.parts[0] {
            WordPart::DoubleQuoted(parts) => {
                assert_eq!(parts[0], WordPart::Literal("say \"".into()));
                assert_eq!(parts[1], WordPart::Param(ParamExpansion::simple("x")));
                assert_eq!(parts[2], WordPart::Literal("\" 'y'\n".into()));
            }
            other => panic!("{:?}", other),
        }
    }
}
