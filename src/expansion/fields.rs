//! Field splitting and pathname expansion.

use super::pattern::{escape, has_glob_chars};
use glob::MatchOptions;

/// One field under construction. `pattern` mirrors `text` with quoted
/// characters escaped, ready for pathname expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub text: String,
    pattern: String,
    globbable: bool,
}

impl Field {
    fn push(&mut self, text: &str, quoted: bool) {
        self.text.push_str(text);
        if quoted {
            self.pattern.push_str(&escape(text));
        } else {
            self.pattern.push_str(text);
            self.globbable |= has_glob_chars(text);
        }
    }

    /// Matching pathnames, sorted; the field itself when nothing matches.
    pub fn pathnames(self, noglob: bool) -> Vec<String> {
        if noglob || !self.globbable {
            return vec![self.text];
        }
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let mut matches: Vec<String> = match glob::glob_with(&self.pattern, options) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        if matches.is_empty() {
            return vec![self.text];
        }
        matches.sort();
        matches
    }
}

/// Accumulates expansion output into fields, splitting unquoted
/// expansion results on IFS.
#[derive(Debug)]
pub struct FieldBuilder {
    fields: Vec<Field>,
    current: Field,
    /// The current field exists even if empty (it holds quoted text).
    started: bool,
    /// IFS whitespace seen; the next text opens a new field.
    pending_break: bool,
    ifs_white: Vec<char>,
    ifs_other: Vec<char>,
}

impl FieldBuilder {
    pub fn new(ifs: &str) -> Self {
        let (white, other): (Vec<char>, Vec<char>) =
            ifs.chars().partition(|c| matches!(c, ' ' | '\t' | '\n'));
        Self {
            fields: Vec::new(),
            current: Field::default(),
            started: false,
            pending_break: false,
            ifs_white: white,
            ifs_other: other,
        }
    }

    fn emit(&mut self) {
        self.fields.push(std::mem::take(&mut self.current));
        self.started = false;
        self.pending_break = false;
    }

    fn settle_break(&mut self) {
        if self.pending_break {
            self.emit();
        }
    }

    /// Text that is never split: literals, quoted text, tilde results.
    pub fn push_literal(&mut self, text: &str, quoted: bool) {
        self.settle_break();
        self.current.push(text, quoted);
        self.started = true;
    }

    /// The word contains quotes, so it yields a field even when empty.
    pub fn mark_quoted(&mut self) {
        self.settle_break();
        self.started = true;
    }

    /// An unquoted expansion result, split on IFS.
    pub fn push_split(&mut self, text: &str) {
        if self.ifs_white.is_empty() && self.ifs_other.is_empty() {
            if !text.is_empty() {
                self.push_literal(text, false);
            }
            return;
        }
        let mut run = String::new();
        for c in text.chars() {
            let white = self.ifs_white.contains(&c);
            if white || self.ifs_other.contains(&c) {
                if !run.is_empty() {
                    self.push_literal(&run, false);
                    run.clear();
                }
                if white {
                    if self.started {
                        self.pending_break = true;
                    }
                } else {
                    self.emit();
                }
            } else {
                run.push(c);
            }
        }
        if !run.is_empty() {
            self.push_literal(&run, false);
        }
    }

    /// Boundary between the elements of `"$@"`.
    pub fn hard_break(&mut self) {
        self.emit();
    }

    /// Boundary between the elements of an unquoted `$@`.
    pub fn soft_break(&mut self) {
        if self.started {
            self.emit();
        }
    }

    pub fn finish(mut self) -> Vec<Field> {
        if self.started {
            self.emit();
        }
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(builder: FieldBuilder) -> Vec<String> {
        builder.finish().into_iter().map(|f| f.text).collect()
    }

    fn split(ifs: &str, text: &str) -> Vec<String> {
        let mut builder = FieldBuilder::new(ifs);
        builder.push_split(text);
        texts(builder)
    }

    #[test]
    fn test_whitespace_splitting() {
        assert_eq!(split(" \t\n", "  a  b\tc \n"), vec!["a", "b", "c"]);
        assert!(split(" \t\n", "   ").is_empty());
        assert!(split(" ", "").is_empty());
    }

    #[test]
    fn test_non_whitespace_delimiters() {
        assert_eq!(split(":", "a::b"), vec!["a", "", "b"]);
        assert_eq!(split(":", ":a"), vec!["", "a"]);
        assert_eq!(split(":", "a:"), vec!["a"]);
        assert_eq!(split(" :", "a : b"), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_ifs_disables_splitting() {
        assert_eq!(split("", "a b"), vec!["a b"]);
    }

    #[test]
    fn test_literals_join_split_pieces() {
        let mut builder = FieldBuilder::new(" ");
        builder.push_literal("x", false);
        builder.push_split("1 2");
        builder.push_literal("y", false);
        assert_eq!(texts(builder), vec!["x1", "2y"]);
    }

    #[test]
    fn test_quoted_empty_survives() {
        let mut builder = FieldBuilder::new(" ");
        builder.mark_quoted();
        assert_eq!(texts(builder), vec![""]);
    }

    #[test]
    fn test_breaks() {
        let mut builder = FieldBuilder::new(" ");
        builder.push_literal("pre", true);
        builder.push_literal("a", true);
        builder.hard_break();
        builder.push_literal("", true);
        builder.hard_break();
        builder.push_literal("c", true);
        assert_eq!(texts(builder), vec!["prea", "", "c"]);

        let mut builder = FieldBuilder::new(" ");
        builder.push_split("");
        builder.soft_break();
        builder.push_split("b");
        assert_eq!(texts(builder), vec!["b"]);
    }

    #[test]
    fn test_pathnames() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", ".hidden.txt", "c.log"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let base = dir.path().to_string_lossy().into_owned();

        let mut field = Field::default();
        field.push(&format!("{}/", base), true);
        field.push("*.txt", false);
        let found = field.pathnames(false);
        assert_eq!(found, vec![format!("{}/a.txt", base), format!("{}/b.txt", base)]);

        let mut quoted = Field::default();
        quoted.push(&format!("{}/*.txt", base), true);
        assert_eq!(quoted.pathnames(false), vec![format!("{}/*.txt", base)]);

        let mut none = Field::default();
        none.push(&format!("{}/*.md", base), false);
        assert_eq!(none.clone().pathnames(false), vec![format!("{}/*.md", base)]);
        assert_eq!(none.pathnames(true).len(), 1);
    }
}
