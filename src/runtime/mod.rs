//! Interpreter context: variables, functions, aliases, options, positional
//! parameters, traps and the job table, carried as one value.
//!
//! A forked subshell inherits a copy of this value, so nothing it changes
//! is visible to the parent.

pub mod stack;
pub mod variables;

pub use stack::CallStack;
pub use variables::{Attributes, ScopeStack, Subscript, Value, Variable};

use crate::arithmetic::{self, ArithEnv, ArithmeticError};
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::jobs::JobTable;
use crate::parser::ast::Command;
use crate::signal::PendingSignals;
use indexmap::IndexMap;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_IFS: &str = " \t\n";

/// Shell options that control execution behavior
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOptions {
    pub errexit: bool,   // set -e
    pub nounset: bool,   // set -u
    pub xtrace: bool,    // set -x
    pub noglob: bool,    // set -f
    pub noclobber: bool, // set -C
    pub monitor: bool,   // set -m
    pub pipefail: bool,  // set -o pipefail
}

/// Option names for `set -o`, with their single-letter forms.
const OPTION_NAMES: &[(&str, Option<char>)] = &[
    ("errexit", Some('e')),
    ("monitor", Some('m')),
    ("noclobber", Some('C')),
    ("noglob", Some('f')),
    ("nounset", Some('u')),
    ("pipefail", None),
    ("xtrace", Some('x')),
];

impl ShellOptions {
    fn slot(&mut self, name: &str) -> Option<&mut bool> {
        Some(match name {
            "errexit" => &mut self.errexit,
            "nounset" => &mut self.nounset,
            "xtrace" => &mut self.xtrace,
            "noglob" => &mut self.noglob,
            "noclobber" => &mut self.noclobber,
            "monitor" => &mut self.monitor,
            "pipefail" => &mut self.pipefail,
            _ => return None,
        })
    }

    /// `set -o name` / `set +o name`. Returns false for unknown names.
    pub fn set_by_name(&mut self, name: &str, value: bool) -> bool {
        match self.slot(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// `set -e` / `set +e` and friends.
    pub fn set_by_letter(&mut self, letter: char, value: bool) -> bool {
        OPTION_NAMES
            .iter()
            .find(|(_, l)| *l == Some(letter))
            .map(|(name, _)| self.set_by_name(name, value))
            .unwrap_or(false)
    }

    pub fn get_by_name(&self, name: &str) -> Option<bool> {
        Some(match name {
            "errexit" => self.errexit,
            "nounset" => self.nounset,
            "xtrace" => self.xtrace,
            "noglob" => self.noglob,
            "noclobber" => self.noclobber,
            "monitor" => self.monitor,
            "pipefail" => self.pipefail,
            _ => return None,
        })
    }

    /// Every option with its state, for `set -o`.
    pub fn listing(&self) -> Vec<(&'static str, bool)> {
        OPTION_NAMES
            .iter()
            .map(|(name, _)| (*name, self.get_by_name(name).unwrap_or(false)))
            .collect()
    }

    /// The letters shown by `$-`.
    pub fn flags(&self) -> String {
        OPTION_NAMES
            .iter()
            .filter_map(|(name, letter)| {
                let letter = (*letter)?;
                self.get_by_name(name).unwrap_or(false).then_some(letter)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_subst_depth: usize,
    pub max_func_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_subst_depth: 64,
            max_func_depth: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Runtime {
    pub scopes: ScopeStack,
    functions: HashMap<String, Rc<Command>>,
    aliases: HashMap<String, String>,
    pub options: ShellOptions,
    positional: Vec<String>,
    /// `$0`
    pub script_name: String,
    /// `$?`
    pub last_status: i32,
    /// `$!`
    pub last_background: Option<i32>,
    shell_pid: i32,
    /// Trap actions keyed by signal name (`EXIT`, `INT`, ...).
    pub traps: BTreeMap<String, String>,
    pub pending_signals: PendingSignals,
    pub jobs: JobTable,
    pub call_stack: CallStack,
    pub limits: Limits,
    /// Nesting of command substitutions in this process.
    pub subst_depth: usize,
    /// Loops enclosing the command being run, for `break`/`continue`.
    pub loop_depth: usize,
    pub interactive: bool,
    random_state: Cell<u32>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// An empty context with no inherited environment.
    pub fn new() -> Self {
        let shell_pid = std::process::id() as i32;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0)
            ^ shell_pid as u32;
        let limits = Limits::default();
        Self {
            scopes: ScopeStack::new(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            options: ShellOptions::default(),
            positional: Vec::new(),
            script_name: "marsh".to_string(),
            last_status: 0,
            last_background: None,
            shell_pid,
            traps: BTreeMap::new(),
            pending_signals: PendingSignals::default(),
            jobs: JobTable::new(),
            call_stack: CallStack::new(limits.max_func_depth),
            limits,
            subst_depth: 0,
            loop_depth: 0,
            interactive: false,
            random_state: Cell::new(seed),
        }
    }

    /// A context seeded from the process environment and configuration.
    pub fn from_env(config: &ShellConfig) -> Self {
        let mut runtime = Self::new();
        runtime.import_environment(std::env::vars());
        runtime.apply_config(config);
        if let Ok(cwd) = std::env::current_dir() {
            let _ = runtime.assign("PWD", cwd.to_string_lossy().into_owned());
        }
        runtime
    }

    pub fn apply_config(&mut self, config: &ShellConfig) {
        self.limits = Limits {
            max_subst_depth: config.max_subst_depth,
            max_func_depth: config.max_func_depth,
        };
        self.call_stack.set_limit(config.max_func_depth);
        self.options.pipefail = config.pipefail;
    }

    /// Seed the global frame with exported variables.
    pub fn import_environment(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in vars {
            if !crate::parser::is_name(&name) {
                continue;
            }
            let var = self.scopes.entry(&name);
            var.value = Some(Value::Scalar(value));
            var.attrs.exported = true;
        }
    }

    pub fn shell_pid(&self) -> i32 {
        self.shell_pid
    }

    fn next_random(&self) -> u32 {
        let next = self
            .random_state
            .get()
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12345);
        self.random_state.set(next);
        (next >> 16) & 0x7fff
    }

    pub fn ifs(&self) -> String {
        match self.scopes.lookup("IFS") {
            Some(Variable {
                value: Some(value), ..
            }) => value.as_scalar().unwrap_or_default(),
            Some(_) => String::new(),
            None => DEFAULT_IFS.to_string(),
        }
    }

    /// `$-`
    pub fn option_flags(&self) -> String {
        let mut flags = self.options.flags();
        if self.interactive {
            flags.push('i');
        }
        flags
    }

    /// Scalar value of a parameter, special parameters included.
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "?" => return Some(self.last_status.to_string()),
            "$" => return Some(self.shell_pid.to_string()),
            "!" => return self.last_background.map(|pid| pid.to_string()),
            "#" => return Some(self.positional.len().to_string()),
            "0" => return Some(self.script_name.clone()),
            "-" => return Some(self.option_flags()),
            "@" => return Some(self.positional.join(" ")),
            "*" => {
                let sep: String = self.ifs().chars().take(1).collect();
                return Some(self.positional.join(&sep));
            }
            "RANDOM" => return Some(self.next_random().to_string()),
            _ => {}
        }
        if let Ok(n) = name.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.positional.get(i).cloned());
        }
        let resolved = self.scopes.resolve_name(name);
        self.scopes
            .lookup(&resolved)
            .and_then(|var| var.value.as_ref())
            .and_then(Value::as_scalar)
    }

    pub fn is_set(&self, name: &str) -> bool {
        match name {
            "!" => self.last_background.is_some(),
            "?" | "$" | "#" | "0" | "-" | "@" | "*" | "RANDOM" => true,
            _ => self.get(name).is_some(),
        }
    }

    fn variable(&self, name: &str) -> Option<&Variable> {
        let resolved = self.scopes.resolve_name(name);
        self.scopes.lookup(&resolved)
    }

    pub fn is_assoc(&self, name: &str) -> bool {
        matches!(
            self.variable(name).and_then(|v| v.value.as_ref()),
            Some(Value::Assoc(_))
        )
    }

    pub fn is_array(&self, name: &str) -> bool {
        self.variable(name)
            .and_then(|v| v.value.as_ref())
            .map(Value::is_array)
            .unwrap_or(false)
    }

    pub fn attributes(&self, name: &str) -> Attributes {
        self.variable(name).map(|v| v.attrs).unwrap_or_default()
    }

    /// All values of `name` in order, for `${name[@]}`. `@` and `*` give
    /// the positional parameters.
    pub fn get_all(&self, name: &str) -> Vec<String> {
        if name == "@" || name == "*" {
            return self.positional.clone();
        }
        match self.variable(name).and_then(|v| v.value.as_ref()) {
            Some(Value::Scalar(s)) => vec![s.clone()],
            Some(Value::Indexed(map)) => map.values().cloned().collect(),
            Some(Value::Assoc(map)) => map.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Subscripts in use, for `${!name[@]}`.
    pub fn get_keys(&self, name: &str) -> Vec<String> {
        match self.variable(name).and_then(|v| v.value.as_ref()) {
            Some(Value::Scalar(_)) => vec!["0".to_string()],
            Some(Value::Indexed(map)) => map.keys().map(|k| k.to_string()).collect(),
            Some(Value::Assoc(map)) => map.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Map a negative index onto the element it counts back from.
    fn normalize_index(map: &BTreeMap<i64, String>, index: i64) -> Option<i64> {
        if index >= 0 {
            return Some(index);
        }
        let next = map.keys().next_back().map(|k| k + 1).unwrap_or(0);
        let resolved = next + index;
        (resolved >= 0).then_some(resolved)
    }

    pub fn get_element(&self, name: &str, subscript: &Subscript) -> Option<String> {
        match (self.variable(name)?.value.as_ref()?, subscript) {
            (Value::Scalar(s), Subscript::Index(0) | Subscript::Index(-1)) => Some(s.clone()),
            (Value::Scalar(_), _) => None,
            (Value::Indexed(map), Subscript::Index(i)) => {
                map.get(&Self::normalize_index(map, *i)?).cloned()
            }
            (Value::Indexed(map), Subscript::Key(k)) => map.get(&k.parse().ok()?).cloned(),
            (Value::Assoc(map), Subscript::Key(k)) => map.get(k).cloned(),
            (Value::Assoc(map), Subscript::Index(i)) => map.get(&i.to_string()).cloned(),
        }
    }

    /// Number of elements, for `${#name[@]}`.
    pub fn element_count(&self, name: &str) -> usize {
        if name == "@" || name == "*" {
            return self.positional.len();
        }
        match self.variable(name).and_then(|v| v.value.as_ref()) {
            Some(Value::Scalar(_)) => 1,
            Some(Value::Indexed(map)) => map.len(),
            Some(Value::Assoc(map)) => map.len(),
            None => 0,
        }
    }

    /// Apply the integer and case attributes to a value about to be stored.
    fn transform(&mut self, attrs: Attributes, value: String) -> Result<String, ShellError> {
        let value = if attrs.integer {
            arithmetic::evaluate(&value, self)?.to_string()
        } else {
            value
        };
        Ok(if attrs.upper {
            value.to_uppercase()
        } else if attrs.lower {
            value.to_lowercase()
        } else {
            value
        })
    }

    fn writable(&self, name: &str) -> Result<(String, Attributes), ShellError> {
        let resolved = self.scopes.resolve_name(name);
        let attrs = self
            .scopes
            .lookup(&resolved)
            .map(|v| v.attrs)
            .unwrap_or_default();
        if attrs.readonly {
            return Err(ShellError::Readonly(resolved));
        }
        Ok((resolved, attrs))
    }

    /// `name=value`. On an array this sets element 0.
    pub fn assign(&mut self, name: &str, value: String) -> Result<(), ShellError> {
        let (resolved, attrs) = self.writable(name)?;
        let value = self.transform(attrs, value)?;
        let var = self.scopes.entry(&resolved);
        match &mut var.value {
            Some(Value::Indexed(map)) => {
                map.insert(0, value);
            }
            Some(Value::Assoc(map)) => {
                map.insert("0".to_string(), value);
            }
            slot => *slot = Some(Value::Scalar(value)),
        }
        Ok(())
    }

    /// `name=value` in the current function's frame, as `local` does.
    pub fn assign_local(&mut self, name: &str, value: String) -> Result<(), ShellError> {
        let attrs = self
            .scopes
            .lookup(name)
            .filter(|_| self.scopes.has_local(name))
            .map(|v| v.attrs)
            .unwrap_or_default();
        // a readonly binding cannot be shadowed either
        if self.attributes(name).readonly {
            return Err(ShellError::Readonly(name.to_string()));
        }
        let value = self.transform(attrs, value)?;
        self.scopes.local_entry(name).value = Some(Value::Scalar(value));
        Ok(())
    }

    /// `name+=value`
    pub fn append(&mut self, name: &str, value: String) -> Result<(), ShellError> {
        let attrs = self.attributes(name);
        let current = self.get(name).unwrap_or_default();
        if attrs.integer {
            let expr = format!("({}) + ({})", or_zero(&current), or_zero(&value));
            let sum = arithmetic::evaluate(&expr, self)?;
            return self.assign(name, sum.to_string());
        }
        self.assign(name, current + &value)
    }

    /// `name[subscript]=value`; a scalar becomes element 0 of a new array.
    pub fn assign_element(
        &mut self,
        name: &str,
        subscript: Subscript,
        value: String,
    ) -> Result<(), ShellError> {
        let (resolved, attrs) = self.writable(name)?;
        let value = self.transform(attrs, value)?;
        let var = self.scopes.entry(&resolved);
        let array = match var.value.take() {
            Some(Value::Scalar(s)) => Value::Indexed(BTreeMap::from([(0, s)])),
            Some(array) => array,
            None => Value::Indexed(BTreeMap::new()),
        };
        let array = match (array, subscript) {
            (Value::Assoc(mut map), Subscript::Key(key)) => {
                map.insert(key, value);
                Value::Assoc(map)
            }
            (Value::Assoc(mut map), Subscript::Index(i)) => {
                map.insert(i.to_string(), value);
                Value::Assoc(map)
            }
            (Value::Indexed(mut map), subscript) => {
                let index = match subscript {
                    Subscript::Index(i) => Self::normalize_index(&map, i),
                    Subscript::Key(k) => k.parse().ok(),
                };
                let Some(index) = index else {
                    var.value = Some(Value::Indexed(map));
                    return Err(ShellError::BadSubstitution(format!(
                        "{}: bad array subscript",
                        resolved
                    )));
                };
                map.insert(index, value);
                Value::Indexed(map)
            }
            (scalar, _) => scalar,
        };
        var.value = Some(array);
        Ok(())
    }

    /// `name=(...)` or `name+=(...)`. Elements without a subscript take the
    /// next index.
    pub fn assign_array(
        &mut self,
        name: &str,
        elements: Vec<(Option<Subscript>, String)>,
        append: bool,
    ) -> Result<(), ShellError> {
        let (resolved, attrs) = self.writable(name)?;
        let mut transformed = Vec::with_capacity(elements.len());
        for (key, value) in elements {
            transformed.push((key, self.transform(attrs, value)?));
        }
        let var = self.scopes.entry(&resolved);
        let existing = if append { var.value.take() } else { None };
        let assoc =
            matches!(var.value, Some(Value::Assoc(_))) || matches!(existing, Some(Value::Assoc(_)));

        if assoc {
            let mut map = match existing {
                Some(Value::Assoc(map)) => map,
                _ => IndexMap::new(),
            };
            for (key, value) in transformed {
                let key = match key {
                    Some(Subscript::Key(k)) => k,
                    Some(Subscript::Index(i)) => i.to_string(),
                    None => {
                        var.value = Some(Value::Assoc(map));
                        return Err(ShellError::BadSubstitution(format!(
                            "{}: must use subscript when assigning associative array",
                            resolved
                        )))
                    }
                };
                map.insert(key, value);
            }
            var.value = Some(Value::Assoc(map));
            return Ok(());
        }

        let mut map = match existing {
            Some(Value::Indexed(map)) => map,
            Some(Value::Scalar(s)) => BTreeMap::from([(0, s)]),
            _ => BTreeMap::new(),
        };
        let mut next = map.keys().next_back().map(|k| k + 1).unwrap_or(0);
        for (key, value) in transformed {
            let index = match key {
                Some(Subscript::Index(i)) => i,
                Some(Subscript::Key(k)) => k.parse().unwrap_or(next),
                None => next,
            };
            map.insert(index, value);
            next = index + 1;
        }
        var.value = Some(Value::Indexed(map));
        Ok(())
    }

    /// Turn `name` into an empty associative array (`declare -A`).
    pub fn make_assoc(&mut self, name: &str, local: bool) -> Result<(), ShellError> {
        self.writable(name)?;
        let var = if local {
            self.scopes.local_entry(name)
        } else {
            self.scopes.entry(name)
        };
        if !matches!(var.value, Some(Value::Assoc(_))) {
            var.value = Some(Value::Assoc(IndexMap::new()));
        }
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Result<(), ShellError> {
        let resolved = self.scopes.resolve_name(name);
        if self.scopes.unset(&resolved) {
            Ok(())
        } else {
            Err(ShellError::Exec {
                name: "unset".to_string(),
                message: format!("{}: cannot unset: readonly variable", resolved),
                status: 1,
            })
        }
    }

    pub fn unset_element(&mut self, name: &str, subscript: &Subscript) -> Result<(), ShellError> {
        let (resolved, _) = self.writable(name)?;
        let var = self.scopes.entry(&resolved);
        match (&mut var.value, subscript) {
            (Some(Value::Indexed(map)), Subscript::Index(i)) => {
                if let Some(index) = Self::normalize_index(map, *i) {
                    map.remove(&index);
                }
            }
            (Some(Value::Assoc(map)), Subscript::Key(k)) => {
                map.shift_remove(k);
            }
            (Some(Value::Assoc(map)), Subscript::Index(i)) => {
                map.shift_remove(&i.to_string());
            }
            (value @ Some(Value::Scalar(_)), Subscript::Index(0)) => *value = None,
            _ => {}
        }
        Ok(())
    }

    /// Variables to pass to a child process.
    pub fn exported(&self) -> Vec<(String, String)> {
        self.scopes.exported()
    }

    pub fn define_function(&mut self, name: &str, body: Command) {
        self.functions.insert(name.to_string(), Rc::new(body));
    }

    pub fn function(&self, name: &str) -> Option<Rc<Command>> {
        self.functions.get(name).cloned()
    }

    pub fn remove_function(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_alias(&mut self, name: String, value: String) {
        self.aliases.insert(name, value);
    }

    pub fn get_alias(&self, name: &str) -> Option<&String> {
        self.aliases.get(name)
    }

    pub fn remove_alias(&mut self, name: &str) -> bool {
        self.aliases.remove(name).is_some()
    }

    pub fn clear_aliases(&mut self) {
        self.aliases.clear();
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Replace the positional parameters, returning the previous ones.
    pub fn set_positional(&mut self, params: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut self.positional, params)
    }

    /// `shift n`; false when fewer than `n` parameters are set.
    pub fn shift(&mut self, n: usize) -> bool {
        if n > self.positional.len() {
            return false;
        }
        self.positional.drain(..n);
        true
    }

    /// Evaluate arithmetic source against this context.
    pub fn eval_arith(&mut self, expr: &str) -> Result<i64, ArithmeticError> {
        arithmetic::evaluate(expr, self)
    }
}

fn or_zero(text: &str) -> &str {
    if text.trim().is_empty() {
        "0"
    } else {
        text
    }
}

impl ArithEnv for Runtime {
    fn get_var(&mut self, name: &str, index: Option<i64>) -> Option<String> {
        match index {
            None => self.get(name),
            Some(i) => self.get_element(name, &Subscript::Index(i)),
        }
    }

    fn set_var(
        &mut self,
        name: &str,
        index: Option<i64>,
        value: i64,
    ) -> Result<(), ArithmeticError> {
        let result = match index {
            None => self.assign(name, value.to_string()),
            Some(i) => self.assign_element(name, Subscript::Index(i), value.to_string()),
        };
        result.map_err(|err| match err {
            ShellError::Arithmetic(err) => err,
            _ => ArithmeticError::Readonly(name.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(runtime: &Runtime, name: &str) -> Option<String> {
        runtime.get(name)
    }

    #[test]
    fn test_assign_and_get() {
        let mut runtime = Runtime::new();
        runtime.assign("greeting", "hello".into()).unwrap();
        assert_eq!(scalar(&runtime, "greeting").as_deref(), Some("hello"));
        assert_eq!(scalar(&runtime, "missing"), None);
    }

    #[test]
    fn test_uppercase_attribute_reapplies() {
        let mut runtime = Runtime::new();
        runtime.scopes.entry("v").attrs.upper = true;
        runtime.assign("v", "abc".into()).unwrap();
        assert_eq!(scalar(&runtime, "v").as_deref(), Some("ABC"));
        runtime.assign("v", "later".into()).unwrap();
        assert_eq!(scalar(&runtime, "v").as_deref(), Some("LATER"));
    }

    #[test]
    fn test_integer_attribute_evaluates() {
        let mut runtime = Runtime::new();
        runtime.assign("base", "4".into()).unwrap();
        runtime.scopes.entry("n").attrs.integer = true;
        runtime.assign("n", "base * 2 + 1".into()).unwrap();
        assert_eq!(scalar(&runtime, "n").as_deref(), Some("9"));
        runtime.append("n", "1".into()).unwrap();
        assert_eq!(scalar(&runtime, "n").as_deref(), Some("10"));
    }

    #[test]
    fn test_readonly_rejects_assignment() {
        let mut runtime = Runtime::new();
        runtime.assign("X", "1".into()).unwrap();
        runtime.scopes.entry("X").attrs.readonly = true;
        let err = runtime.assign("X", "2".into()).unwrap_err();
        assert!(matches!(err, ShellError::Readonly(ref n) if n == "X"));
        assert_eq!(scalar(&runtime, "X").as_deref(), Some("1"));
        assert!(runtime.unset("X").is_err());
    }

    #[test]
    fn test_local_frames_return_to_baseline() {
        let mut runtime = Runtime::new();
        let baseline = runtime.scopes.depth();
        for depth in 0..50 {
            runtime.scopes.push_frame();
            runtime.assign_local("x", depth.to_string()).unwrap();
        }
        assert_eq!(scalar(&runtime, "x").as_deref(), Some("49"));
        for _ in 0..50 {
            runtime.scopes.pop_frame();
        }
        assert_eq!(runtime.scopes.depth(), baseline);
        assert_eq!(scalar(&runtime, "x"), None);
    }

    #[test]
    fn test_indexed_arrays() {
        let mut runtime = Runtime::new();
        runtime
            .assign_array(
                "a",
                vec![
                    (None, "x".into()),
                    (None, "y".into()),
                    (Some(Subscript::Index(5)), "z".into()),
                ],
                false,
            )
            .unwrap();
        assert_eq!(runtime.get_all("a"), vec!["x", "y", "z"]);
        assert_eq!(runtime.get_keys("a"), vec!["0", "1", "5"]);
        assert_eq!(runtime.get_element("a", &Subscript::Index(-1)).as_deref(), Some("z"));
        assert_eq!(scalar(&runtime, "a").as_deref(), Some("x"));
        runtime.assign_array("a", vec![(None, "w".into())], true).unwrap();
        assert_eq!(runtime.get_element("a", &Subscript::Index(6)).as_deref(), Some("w"));
        runtime.unset_element("a", &Subscript::Index(0)).unwrap();
        assert_eq!(runtime.element_count("a"), 3);
    }

    #[test]
    fn test_scalar_promoted_by_element_assignment() {
        let mut runtime = Runtime::new();
        runtime.assign("s", "first".into()).unwrap();
        runtime.assign_element("s", Subscript::Index(2), "third".into()).unwrap();
        assert_eq!(runtime.get_all("s"), vec!["first", "third"]);
        assert!(runtime.is_array("s"));
    }

    #[test]
    fn test_assoc_arrays_keep_insertion_order() {
        let mut runtime = Runtime::new();
        runtime.make_assoc("m", false).unwrap();
        runtime
            .assign_array(
                "m",
                vec![
                    (Some(Subscript::Key("zeta".into())), "1".into()),
                    (Some(Subscript::Key("alpha".into())), "2".into()),
                ],
                false,
            )
            .unwrap();
        assert_eq!(runtime.get_keys("m"), vec!["zeta", "alpha"]);
        assert!(runtime
            .assign_array("m", vec![(None, "bad".into())], false)
            .is_err());
    }

    #[test]
    fn test_special_parameters() {
        let mut runtime = Runtime::new();
        runtime.set_positional(vec!["a".into(), "b c".into()]);
        runtime.last_status = 3;
        assert_eq!(scalar(&runtime, "#").as_deref(), Some("2"));
        assert_eq!(scalar(&runtime, "2").as_deref(), Some("b c"));
        assert_eq!(scalar(&runtime, "?").as_deref(), Some("3"));
        assert_eq!(scalar(&runtime, "*").as_deref(), Some("a b c"));
        assert_eq!(scalar(&runtime, "!"), None);
        assert!(runtime.shift(1));
        assert!(!runtime.shift(5));
        assert_eq!(runtime.positional(), ["b c".to_string()]);
    }

    #[test]
    fn test_random_varies() {
        let runtime = Runtime::new();
        let a = scalar(&runtime, "RANDOM").unwrap();
        let b = scalar(&runtime, "RANDOM").unwrap();
        assert_ne!(a, b);
        assert!(a.parse::<u32>().unwrap() < 32768);
    }

    #[test]
    fn test_arith_env_round_trip() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.eval_arith("x = 6 * 7").unwrap(), 42);
        assert_eq!(scalar(&runtime, "x").as_deref(), Some("42"));
        runtime.eval_arith("arr[2] = x + 1").unwrap();
        assert_eq!(runtime.get_element("arr", &Subscript::Index(2)).as_deref(), Some("43"));
        runtime.scopes.entry("x").attrs.readonly = true;
        assert_eq!(
            runtime.eval_arith("x++"),
            Err(ArithmeticError::Readonly("x".into()))
        );
    }

    #[test]
    fn test_options() {
        let mut options = ShellOptions::default();
        assert!(options.set_by_letter('e', true));
        assert!(options.set_by_name("pipefail", true));
        assert!(!options.set_by_name("bogus", true));
        assert_eq!(options.flags(), "e");
        assert!(options.listing().contains(&("pipefail", true)));
    }

    #[test]
    fn test_ifs_default_and_empty() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.ifs(), DEFAULT_IFS);
        runtime.assign("IFS", String::new()).unwrap();
        assert_eq!(runtime.ifs(), "");
    }
}
