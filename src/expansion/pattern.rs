//! Shell pattern matching for `case`, `[[ == ]]` and the `#`, `%`, `/`
//! parameter operators.
//!
//! Patterns are glob syntax as understood by the `glob` crate, with quoted
//! text already escaped by the caller. Unlike pathname expansion, `*` and
//! `?` match `/` and leading dots here.

use crate::parser::ast::{CaseMode, ReplaceMode};
use glob::{MatchOptions, Pattern};

const MATCH_ANYTHING: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Escape text so it matches itself.
pub fn escape(text: &str) -> String {
    Pattern::escape(text)
}

/// True when `text` contains an unescaped glob metacharacter.
pub fn has_glob_chars(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

#[derive(Debug, Clone)]
pub struct ShellPattern {
    /// `None` only if even the escaped source failed to compile.
    pattern: Option<Pattern>,
    source: String,
}

impl ShellPattern {
    pub fn new(source: &str) -> Self {
        let normalized = normalize(source);
        let pattern = Pattern::new(&normalized)
            .or_else(|_| Pattern::new(&Pattern::escape(source)))
            .ok();
        Self {
            pattern,
            source: source.to_string(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches_with(text, MATCH_ANYTHING),
            None => self.source == text,
        }
    }

    /// `${v#p}` (shortest) and `${v##p}` (longest)
    pub fn remove_prefix(&self, value: &str, longest: bool) -> String {
        let mut cuts = boundaries(value);
        if longest {
            cuts.reverse();
        }
        cuts.into_iter()
            .find(|&i| self.matches(&value[..i]))
            .map(|i| value[i..].to_string())
            .unwrap_or_else(|| value.to_string())
    }

    /// `${v%p}` (shortest) and `${v%%p}` (longest)
    pub fn remove_suffix(&self, value: &str, longest: bool) -> String {
        let mut cuts = boundaries(value);
        if !longest {
            cuts.reverse();
        }
        cuts.into_iter()
            .find(|&i| self.matches(&value[i..]))
            .map(|i| value[..i].to_string())
            .unwrap_or_else(|| value.to_string())
    }

    /// Longest match starting at byte `start`, as an end offset.
    fn longest_from(&self, value: &str, start: usize) -> Option<usize> {
        boundaries(value)
            .into_iter()
            .rev()
            .filter(|&end| end >= start)
            .find(|&end| self.matches(&value[start..end]))
    }

    /// `${v/p/r}` and its `//`, `/#`, `/%` forms.
    pub fn replace(&self, value: &str, replacement: &str, mode: ReplaceMode) -> String {
        if self.source.is_empty() {
            return value.to_string();
        }
        match mode {
            ReplaceMode::Prefix => match self.longest_from(value, 0) {
                Some(end) => format!("{}{}", replacement, &value[end..]),
                None => value.to_string(),
            },
            ReplaceMode::Suffix => boundaries(value)
                .into_iter()
                .find(|&start| self.matches(&value[start..]))
                .map(|start| format!("{}{}", &value[..start], replacement))
                .unwrap_or_else(|| value.to_string()),
            ReplaceMode::First | ReplaceMode::All => {
                let mut out = String::new();
                let mut pos = 0;
                let mut replaced = false;
                while pos <= value.len() {
                    if replaced && mode == ReplaceMode::First {
                        break;
                    }
                    match self.longest_from(value, pos) {
                        Some(end) if end > pos => {
                            out.push_str(replacement);
                            pos = end;
                            replaced = true;
                        }
                        _ => match value[pos..].chars().next() {
                            Some(c) => {
                                out.push(c);
                                pos += c.len_utf8();
                            }
                            None => break,
                        },
                    }
                }
                out.push_str(&value[pos.min(value.len())..]);
                out
            }
        }
    }
}

/// `^ ^^ , ,,`, limited to characters matching `pattern` when given.
pub fn convert_case(value: &str, mode: CaseMode, pattern: Option<&ShellPattern>) -> String {
    let eligible = |c: char| {
        pattern
            .map(|p| p.matches(c.encode_utf8(&mut [0; 4])))
            .unwrap_or(true)
    };
    let convert = |c: char| -> String {
        match mode {
            CaseMode::UpperFirst | CaseMode::UpperAll => c.to_uppercase().collect(),
            CaseMode::LowerFirst | CaseMode::LowerAll => c.to_lowercase().collect(),
        }
    };
    let all = matches!(mode, CaseMode::UpperAll | CaseMode::LowerAll);
    value
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if (all || i == 0) && eligible(c) {
                convert(c)
            } else {
                c.to_string()
            }
        })
        .collect()
}

/// Every char boundary in `value`, `0` and `len` included.
fn boundaries(value: &str) -> Vec<usize> {
    value
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(value.len()))
        .collect()
}

/// Collapse runs of `*` (the `glob` crate reserves `**` for paths) and
/// accept `[^...]` for a negated class.
fn normalize(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_class = false;
    let mut prev = None;
    for c in source.chars() {
        match c {
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                prev = Some(c);
                continue;
            }
            '^' if in_class && prev == Some('[') => {
                out.push('!');
                prev = Some('!');
                continue;
            }
            ']' if in_class && prev != Some('[') && prev != Some('!') => in_class = false,
            '*' if !in_class && prev == Some('*') => continue,
            _ => {}
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> ShellPattern {
        ShellPattern::new(s)
    }

    #[test]
    fn test_matching() {
        assert!(p("*.txt").matches("notes.txt"));
        assert!(p("*").matches("a/b/.c"));
        assert!(p("a?c").matches("abc"));
        assert!(p("[!x]*").matches("yes"));
        assert!(p("[^x]*").matches("yes"));
        assert!(!p("[^x]*").matches("xyz"));
        assert!(p("a**b").matches("a-long-b"));
        assert!(p(&escape("*")).matches("*"));
        assert!(!p(&escape("*")).matches("x"));
    }

    #[test]
    fn test_prefix_suffix_removal() {
        let path = "/usr/local/bin/tool.tar.gz";
        assert_eq!(p("*/").remove_prefix(path, false), "usr/local/bin/tool.tar.gz");
        assert_eq!(p("*/").remove_prefix(path, true), "tool.tar.gz");
        assert_eq!(p(".*").remove_suffix(path, false), "/usr/local/bin/tool.tar");
        assert_eq!(p(".*").remove_suffix(path, true), "/usr/local/bin/tool");
        assert_eq!(p("zzz").remove_suffix(path, true), path);
    }

    #[test]
    fn test_replace_modes() {
        assert_eq!(p("o").replace("foo boo", "0", ReplaceMode::First), "f0o boo");
        assert_eq!(p("o").replace("foo boo", "0", ReplaceMode::All), "f00 b00");
        assert_eq!(p("f*").replace("foo", "X", ReplaceMode::Prefix), "X");
        assert_eq!(p("o").replace("foo", "X", ReplaceMode::Suffix), "foX");
        assert_eq!(p("x").replace("foo", "X", ReplaceMode::Prefix), "foo");
        assert_eq!(p("").replace("foo", "X", ReplaceMode::All), "foo");
        assert_eq!(p("o*").replace("foo bar", "_", ReplaceMode::First), "f_");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(convert_case("hello", CaseMode::UpperFirst, None), "Hello");
        assert_eq!(convert_case("hello", CaseMode::UpperAll, None), "HELLO");
        assert_eq!(convert_case("HELLO", CaseMode::LowerFirst, None), "hELLO");
        assert_eq!(convert_case("hello", CaseMode::UpperAll, Some(&p("[el]"))), "hELLo");
    }
}
