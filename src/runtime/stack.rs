//! Function call stack tracking for diagnostics and the recursion limit.

use crate::error::{CommandContext, ShellError};

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    entries: Vec<CallStackEntry>,
    limit: usize,
}

#[derive(Debug, Clone)]
pub struct CallStackEntry {
    pub function_name: String,
    /// Line of the call site, when known.
    pub line: Option<usize>,
}

impl CallStack {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Enter a function, failing once the nesting limit is reached.
    pub fn push(&mut self, function_name: &str, line: Option<usize>) -> Result<(), ShellError> {
        if self.entries.len() >= self.limit {
            tracing::warn!(
                function = function_name,
                limit = self.limit,
                "function nesting limit reached"
            );
            return Err(ShellError::RecursionLimit {
                what: "function",
                limit: self.limit,
            });
        }
        self.entries.push(CallStackEntry {
            function_name: function_name.to_string(),
            line,
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<CallStackEntry> {
        self.entries.pop()
    }

    /// Function names, outermost first.
    pub fn as_vec(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.function_name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn current_function(&self) -> Option<&str> {
        self.entries.last().map(|e| e.function_name.as_str())
    }

    pub fn create_context(&self, command_name: impl Into<String>) -> CommandContext {
        let context = CommandContext::new(command_name);
        if self.is_empty() {
            context
        } else {
            context.with_function_stack(self.as_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_stack_push_pop() {
        let mut stack = CallStack::new(10);
        assert!(stack.is_empty());
        stack.push("outer", Some(3)).unwrap();
        stack.push("inner", None).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current_function(), Some("inner"));
        assert_eq!(stack.pop().unwrap().function_name, "inner");
        assert_eq!(stack.as_vec(), vec!["outer"]);
    }

    #[test]
    fn test_call_stack_limit() {
        let mut stack = CallStack::new(2);
        stack.push("a", None).unwrap();
        stack.push("b", None).unwrap();
        let err = stack.push("c", None).unwrap_err();
        assert!(matches!(err, ShellError::RecursionLimit { what: "function", limit: 2 }));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_call_stack_context() {
        let mut stack = CallStack::new(10);
        assert_eq!(stack.create_context("ls").function_stack, None);
        stack.push("deploy", None).unwrap();
        let ctx = stack.create_context("ls");
        assert_eq!(ctx.command_name, "ls");
        assert_eq!(ctx.function_stack, Some(vec!["deploy".to_string()]));
    }
}
