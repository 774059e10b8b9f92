//! Balanced-construct scanners shared by the lexer and the word parser.
//!
//! Each scanner takes the full character buffer and the index of the
//! opening character and returns the index one past the closing character.
//! `Err(construct)` names the construct that ran off the end of input.

pub type ScanResult = Result<usize, &'static str>;

/// Returned by [`arith_command`] when `((` turns out to open nested subshells.
pub const NOT_ARITHMETIC: &str = "nested subshell";

/// `'...'`: everything up to the next single quote is literal.
pub fn single_quote(chars: &[char], start: usize) -> ScanResult {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            return Ok(i + 1);
        }
        i += 1;
    }
    Err("single quote")
}

/// `$'...'`: like single quotes but backslash escapes the closing quote.
pub fn ansi_c_quote(chars: &[char], start: usize) -> ScanResult {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("single quote")
}

/// `"..."`: honours backslash escapes and nested substitutions.
pub fn double_quote(chars: &[char], start: usize) -> ScanResult {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Ok(i + 1),
            '$' => i = dollar(chars, i)?,
            '`' => i = backquote(chars, i)?,
            _ => i += 1,
        }
    }
    Err("double quote")
}

/// `` `...` ``
pub fn backquote(chars: &[char], start: usize) -> ScanResult {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("backquote")
}

/// Any `$` construct. A bare `$` scans as a single character.
pub fn dollar(chars: &[char], start: usize) -> ScanResult {
    match chars.get(start + 1) {
        Some('(') if chars.get(start + 2) == Some(&'(') => arithmetic(chars, start + 1),
        Some('(') => parens(chars, start + 1),
        Some('{') => brace_param(chars, start + 1),
        Some('\'') => ansi_c_quote(chars, start + 1),
        Some('"') => double_quote(chars, start + 1),
        _ => Ok(start + 1),
    }
}

/// `( ... )` with quote awareness, as used by `$(...)` and array literals.
pub fn parens(chars: &[char], start: usize) -> ScanResult {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => i = single_quote(chars, i)?,
            '"' => i = double_quote(chars, i)?,
            '`' => i = backquote(chars, i)?,
            '$' if i + 1 < chars.len() && matches!(chars[i + 1], '{' | '\'') => {
                i = dollar(chars, i)?
            }
            '#' if i > start && matches!(chars[i - 1], ' ' | '\t' | '\n') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err("command substitution")
}

/// `$(( ... ))`, starting at the first `(`.
pub fn arithmetic(chars: &[char], start: usize) -> ScanResult {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => i = single_quote(chars, i)?,
            '"' => i = double_quote(chars, i)?,
            '`' => i = backquote(chars, i)?,
            '$' if matches!(chars.get(i + 1), Some('{') | Some('(')) => i = dollar(chars, i)?,
            '(' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err("arithmetic expansion")
}

/// `${ ... }`, starting at the `{`.
pub fn brace_param(chars: &[char], start: usize) -> ScanResult {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => i = single_quote(chars, i)?,
            '"' => i = double_quote(chars, i)?,
            '`' => i = backquote(chars, i)?,
            '$' => i = dollar(chars, i)?,
            '}' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("parameter expansion")
}

/// `(( ... ))` arithmetic command body. Returns the index one past `))`.
pub fn arith_command(chars: &[char], start: usize) -> ScanResult {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\'' => i = single_quote(chars, i)?,
            '"' => i = double_quote(chars, i)?,
            '$' if matches!(chars.get(i + 1), Some('{') | Some('(')) => i = dollar(chars, i)?,
            '(' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                if depth == 2 && chars.get(i + 1) == Some(&')') {
                    return Ok(i + 2);
                }
                depth = depth.saturating_sub(1);
                i += 1;
                if depth == 0 {
                    // `((a) b)` closes at depth one: nested subshells, not arithmetic
                    return Err(NOT_ARITHMETIC);
                }
            }
            _ => i += 1,
        }
    }
    Err("arithmetic command")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_nested_command_substitution() {
        let c = chars("$(echo $(echo hi) \")\")x");
        assert_eq!(dollar(&c, 0).unwrap(), c.len() - 1);
    }

    #[test]
    fn test_brace_param_with_quoted_brace() {
        let c = chars("${v:-\"}\"}rest");
        assert_eq!(dollar(&c, 0).unwrap(), 9);
    }

    #[test]
    fn test_unterminated_reports_construct() {
        let c = chars("\"abc");
        assert_eq!(double_quote(&c, 0), Err("double quote"));
        let c = chars("$(echo");
        assert_eq!(dollar(&c, 0), Err("command substitution"));
    }

    #[test]
    fn test_arith_command() {
        let c = chars("((x = (1 + 2) * 3)) ; echo");
        assert_eq!(arith_command(&c, 0).unwrap(), 19);
    }
}
