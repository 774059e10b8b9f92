//! Brace expansion over raw word text.
//!
//! Runs before every other expansion. Quoted text, backslash escapes and
//! `$`-constructs are skipped, so `"{a,b}"` and `${x}` stay intact.

use crate::lexer::scan;

/// Sequences longer than this are left unexpanded.
const MAX_SEQUENCE: usize = 1 << 16;

pub fn expand(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut start = 0;
    while let Some(open) = next_open(&chars, start) {
        if let Some((close, commas)) = find_close(&chars, open) {
            let prefix: String = chars[..open].iter().collect();
            let suffix: String = chars[close + 1..].iter().collect();
            let items: Option<Vec<String>> = if commas.is_empty() {
                let body: String = chars[open + 1..close].iter().collect();
                sequence(&body)
            } else {
                let mut bounds = vec![open];
                bounds.extend(&commas);
                bounds.push(close);
                Some(
                    bounds
                        .windows(2)
                        .map(|w| chars[w[0] + 1..w[1]].iter().collect())
                        .collect(),
                )
            };
            if let Some(items) = items {
                return items
                    .into_iter()
                    .flat_map(|item| expand(&format!("{}{}{}", prefix, item, suffix)))
                    .collect();
            }
        }
        start = open + 1;
    }
    vec![raw.to_string()]
}

/// Index just past a quoted or `$`-introduced construct starting at `i`,
/// or `None` when `chars[i]` opens nothing.
fn skip_construct(chars: &[char], i: usize) -> Option<usize> {
    let end = match chars[i] {
        '\\' => Ok(i + 2),
        '\'' => scan::single_quote(chars, i),
        '"' => scan::double_quote(chars, i),
        '`' => scan::backquote(chars, i),
        '$' => match chars.get(i + 1) {
            Some('\'') => scan::ansi_c_quote(chars, i + 1),
            Some('"') => scan::double_quote(chars, i + 1),
            Some('(') | Some('{') => scan::dollar(chars, i),
            _ => return None,
        },
        _ => return None,
    };
    Some(end.unwrap_or(chars.len()).min(chars.len()))
}

fn next_open(chars: &[char], mut i: usize) -> Option<usize> {
    while i < chars.len() {
        if let Some(end) = skip_construct(chars, i) {
            i = end;
            continue;
        }
        if chars[i] == '{' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Matching `}` for the brace at `open`, with the top-level comma positions.
fn find_close(chars: &[char], open: usize) -> Option<(usize, Vec<usize>)> {
    let mut depth = 0;
    let mut commas = Vec::new();
    let mut i = open + 1;
    while i < chars.len() {
        if let Some(end) = skip_construct(chars, i) {
            i = end;
            continue;
        }
        match chars[i] {
            '{' => depth += 1,
            '}' if depth == 0 => return Some((i, commas)),
            '}' => depth -= 1,
            ',' if depth == 0 => commas.push(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// `{1..5}`, `{05..10}`, `{z..a}`, `{0..20..5}`
fn sequence(body: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = body.split("..").collect();
    let (start, end, step) = match parts.as_slice() {
        [s, e] => (*s, *e, None),
        [s, e, step] => (*s, *e, Some(step.parse::<i64>().ok()?)),
        _ => return None,
    };
    let step = step.map(|s| s.unsigned_abs().max(1)).unwrap_or(1);

    if let (Ok(a), Ok(b)) = (start.parse::<i64>(), end.parse::<i64>()) {
        let padded = |s: &str| {
            let digits = s.trim_start_matches('-');
            digits.len() > 1 && digits.starts_with('0')
        };
        let width = if padded(start) || padded(end) {
            start.len().max(end.len())
        } else {
            0
        };
        let steps = a.abs_diff(b) / step;
        if steps >= MAX_SEQUENCE as u64 {
            return None;
        }
        let mut values = Vec::with_capacity(steps as usize + 1);
        for k in 0..=steps {
            // the distance between the bounds may not fit in i64
            let offset = i128::from(k) * i128::from(step);
            let v = if a <= b {
                i128::from(a) + offset
            } else {
                i128::from(a) - offset
            };
            let v = i64::try_from(v).ok()?;
            values.push(if v < 0 {
                format!("-{:0width$}", v.unsigned_abs(), width = width.saturating_sub(1))
            } else {
                format!("{:0width$}", v, width = width)
            });
        }
        return Some(values);
    }

    let single = |s: &str| {
        let mut it = s.chars();
        match (it.next(), it.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
            _ => None,
        }
    };
    let (a, b) = (single(start)? as u8, single(end)? as u8);
    let step = step as usize;
    let letters: Vec<String> = if a <= b {
        (a..=b).step_by(step).map(|c| (c as char).to_string()).collect()
    } else {
        (b..=a).rev().step_by(step).map(|c| (c as char).to_string()).collect()
    };
    Some(letters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_lists() {
        assert_eq!(expand("a{b,c}d"), vec!["abd", "acd"]);
        assert_eq!(expand("{x,y}{1,2}"), vec!["x1", "x2", "y1", "y2"]);
        assert_eq!(expand("{a,}"), vec!["a", ""]);
    }

    #[test]
    fn test_nested() {
        assert_eq!(expand("{a,b{1,2}}"), vec!["a", "b1", "b2"]);
        assert_eq!(expand("{{a,b}}"), vec!["{a}", "{b}"]);
    }

    #[test]
    fn test_sequences() {
        assert_eq!(expand("{1..4}"), vec!["1", "2", "3", "4"]);
        assert_eq!(expand("{3..1}"), vec!["3", "2", "1"]);
        assert_eq!(expand("{08..10}"), vec!["08", "09", "10"]);
        assert_eq!(expand("{0..10..5}"), vec!["0", "5", "10"]);
        assert_eq!(expand("{c..a}"), vec!["c", "b", "a"]);
        assert_eq!(expand("{-1..1}"), vec!["-1", "0", "1"]);
    }

    #[test]
    fn test_sequences_at_integer_bounds() {
        let full = "{-9223372036854775808..9223372036854775807}";
        assert_eq!(expand(full), vec![full]);
        assert_eq!(
            expand("{-9223372036854775808..-9223372036854775807}"),
            vec!["-9223372036854775808", "-9223372036854775807"]
        );
        assert_eq!(
            expand("{9223372036854775807..9223372036854775806}"),
            vec!["9223372036854775807", "9223372036854775806"]
        );
        assert_eq!(expand("{0..1..-9223372036854775808}"), vec!["0"]);
        assert_eq!(expand("{-09..-8}"), vec!["-09", "-08"]);
    }

    #[test]
    fn test_literal_braces_untouched() {
        assert_eq!(expand("{}"), vec!["{}"]);
        assert_eq!(expand("{a}"), vec!["{a}"]);
        assert_eq!(expand("{1..x}"), vec!["{1..x}"]);
        assert_eq!(expand("a{b"), vec!["a{b"]);
    }

    #[test]
    fn test_quotes_and_dollar_protect() {
        assert_eq!(expand("'{a,b}'"), vec!["'{a,b}'"]);
        assert_eq!(expand("\"{a,b}\""), vec!["\"{a,b}\""]);
        assert_eq!(expand("\\{a,b}"), vec!["\\{a,b}"]);
        assert_eq!(expand("${x}{1,2}"), vec!["${x}1", "${x}2"]);
        assert_eq!(expand("${x:-{a,b}}"), vec!["${x:-{a,b}}"]);
    }
}
