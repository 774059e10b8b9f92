//! `[[ ... ]]` evaluation.

use super::Executor;
use crate::builtins::test::{binary_test, unary_test};
use crate::error::ShellError;
use crate::expansion::{self, pattern::ShellPattern};
use crate::parser::ast::{CondExpr, Word};
use crate::runtime::Subscript;

impl Executor {
    /// Exit status of a conditional command: 0 true, 1 false, 2 on a bad
    /// regular expression.
    pub(crate) fn execute_cond(&mut self, expr: &CondExpr) -> Result<i32, ShellError> {
        match self.eval_cond(expr) {
            Ok(true) => Ok(0),
            Ok(false) => Ok(1),
            Err(CondError::BadRegex(message)) => {
                self.report(&ShellError::exec("[[", message, 2));
                Ok(2)
            }
            Err(CondError::Shell(err)) => Err(err),
        }
    }

    fn eval_cond(&mut self, expr: &CondExpr) -> Result<bool, CondError> {
        match expr {
            CondExpr::Not(inner) => Ok(!self.eval_cond(inner)?),
            CondExpr::And(left, right) => Ok(self.eval_cond(left)? && self.eval_cond(right)?),
            CondExpr::Or(left, right) => Ok(self.eval_cond(left)? || self.eval_cond(right)?),
            CondExpr::Word(word) => Ok(!expansion::expand_string(self, word)?.is_empty()),
            CondExpr::Unary(op, word) => {
                let arg = expansion::expand_string(self, word)?;
                match op.as_str() {
                    "-v" => Ok(self.variable_is_set(&arg)?),
                    "-o" => Ok(self.runtime.options.get_by_name(&arg).unwrap_or(false)),
                    _ => Ok(unary_test(op, &arg).unwrap_or(false)),
                }
            }
            CondExpr::Binary(left, op, right) => self.eval_binary(left, op, right),
        }
    }

    fn eval_binary(&mut self, left: &Word, op: &str, right: &Word) -> Result<bool, CondError> {
        let lhs = expansion::expand_string(self, left)?;
        match op {
            "==" | "=" | "!=" => {
                let pattern = ShellPattern::new(&expansion::expand_pattern(self, right)?);
                let matched = pattern.matches(&lhs);
                Ok(if op == "!=" { !matched } else { matched })
            }
            "=~" => {
                let source = expansion::expand_regex(self, right)?;
                let regex = regex::Regex::new(&source)
                    .map_err(|e| CondError::BadRegex(e.to_string()))?;
                let captures = regex.captures(&lhs);
                let groups: Vec<(Option<Subscript>, String)> = match &captures {
                    Some(caps) => caps
                        .iter()
                        .map(|m| (None, m.map(|m| m.as_str().to_string()).unwrap_or_default()))
                        .collect(),
                    None => Vec::new(),
                };
                self.runtime.assign_array("BASH_REMATCH", groups, false)?;
                Ok(captures.is_some())
            }
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let rhs = expansion::expand_string(self, right)?;
                let l = self.runtime.eval_arith(&lhs).map_err(ShellError::from)?;
                let r = self.runtime.eval_arith(&rhs).map_err(ShellError::from)?;
                Ok(match op {
                    "-eq" => l == r,
                    "-ne" => l != r,
                    "-lt" => l < r,
                    "-le" => l <= r,
                    "-gt" => l > r,
                    _ => l >= r,
                })
            }
            _ => {
                let rhs = expansion::expand_string(self, right)?;
                match binary_test(&lhs, op, &rhs) {
                    Some(result) => {
                        result.map_err(|m| CondError::Shell(ShellError::exec("[[", m, 2)))
                    }
                    None => Ok(false),
                }
            }
        }
    }

    /// `-v name` and `-v name[sub]`
    fn variable_is_set(&mut self, arg: &str) -> Result<bool, ShellError> {
        match arg.split_once('[') {
            Some((name, rest)) if rest.ends_with(']') => {
                let index = &rest[..rest.len() - 1];
                if index == "@" || index == "*" {
                    return Ok(self.runtime.element_count(name) > 0);
                }
                let subscript = if self.runtime.is_assoc(name) {
                    Subscript::Key(index.to_string())
                } else {
                    Subscript::Index(self.runtime.eval_arith(index)?)
                };
                Ok(self.runtime.get_element(name, &subscript).is_some())
            }
            _ => Ok(self.runtime.is_set(arg)),
        }
    }
}

enum CondError {
    BadRegex(String),
    Shell(ShellError),
}

impl From<ShellError> for CondError {
    fn from(err: ShellError) -> Self {
        CondError::Shell(err)
    }
}
