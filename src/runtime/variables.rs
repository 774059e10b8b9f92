//! Layered variable storage.
//!
//! Frame 0 is the global frame and is never popped. Lookups walk the frames
//! innermost-first; assignments update the innermost frame that already
//! binds the name, falling back to the global frame.

use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Indexed(BTreeMap<i64, String>),
    Assoc(IndexMap<String, String>),
}

impl Value {
    /// The value seen by `$name`: element 0 of an indexed array.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Value::Scalar(s) => Some(s.clone()),
            Value::Indexed(map) => map.get(&0).cloned(),
            Value::Assoc(map) => map.get("0").cloned(),
        }
    }

    pub fn is_array(&self) -> bool {
        !matches!(self, Value::Scalar(_))
    }
}

/// An evaluated array subscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    Index(i64),
    Key(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    pub exported: bool,
    pub readonly: bool,
    pub integer: bool,
    pub upper: bool,
    pub lower: bool,
    pub nameref: bool,
}

impl Attributes {
    /// Flag letters as `declare -p` prints them.
    pub fn flags(&self, value: Option<&Value>) -> String {
        let mut flags = String::new();
        match value {
            Some(Value::Indexed(_)) => flags.push('a'),
            Some(Value::Assoc(_)) => flags.push('A'),
            _ => {}
        }
        if self.integer {
            flags.push('i');
        }
        if self.lower {
            flags.push('l');
        }
        if self.nameref {
            flags.push('n');
        }
        if self.readonly {
            flags.push('r');
        }
        if self.upper {
            flags.push('u');
        }
        if self.exported {
            flags.push('x');
        }
        flags
    }
}

/// A binding; `value` is `None` for names declared without a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variable {
    pub value: Option<Value>,
    pub attrs: Attributes,
}

impl Variable {
    pub fn scalar(value: impl Into<String>) -> Self {
        Variable {
            value: Some(Value::Scalar(value.into())),
            attrs: Attributes::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    vars: HashMap<String, Variable>,
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Maximum chain length when following namerefs.
const MAX_NAMEREF_DEPTH: usize = 8;

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
    }

    /// Index of the innermost frame binding `name`.
    fn frame_of(&self, name: &str) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|frame| frame.vars.contains_key(name))
    }

    /// The binding an assignment to `name` updates, created in the global
    /// frame when no frame binds it yet.
    pub fn entry(&mut self, name: &str) -> &mut Variable {
        let index = self.frame_of(name).unwrap_or(0);
        self.frames[index].vars.entry(name.to_string()).or_default()
    }

    /// The binding in the current (top) frame, created if missing.
    pub fn local_entry(&mut self, name: &str) -> &mut Variable {
        let top = self.frames.len() - 1;
        self.frames[top].vars.entry(name.to_string()).or_default()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.frames
            .last()
            .map(|frame| frame.vars.contains_key(name))
            .unwrap_or(false)
    }

    /// Follow `declare -n` references to the name they point at.
    pub fn resolve_name(&self, name: &str) -> String {
        let mut current = name.to_string();
        for _ in 0..MAX_NAMEREF_DEPTH {
            match self.lookup(&current) {
                Some(Variable {
                    value: Some(Value::Scalar(target)),
                    attrs,
                }) if attrs.nameref && !target.is_empty() => current = target.clone(),
                _ => break,
            }
        }
        current
    }

    /// Remove the innermost binding of `name`. Returns false when the
    /// binding is readonly.
    pub fn unset(&mut self, name: &str) -> bool {
        if let Some(index) = self.frame_of(name) {
            if self.frames[index].vars[name].attrs.readonly {
                return false;
            }
            if index == 0 {
                self.frames[0].vars.remove(name);
            } else {
                // a local stays declared so the outer binding remains hidden
                let var = self.frames[index].vars.entry(name.to_string()).or_default();
                var.value = None;
                var.attrs = Attributes::default();
            }
        }
        true
    }

    /// All visible names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for frame in &self.frames {
            names.extend(frame.vars.keys().cloned());
        }
        names
            .into_iter()
            .filter(|name| {
                self.lookup(name)
                    .map(|v| v.value.is_some() || v.attrs != Attributes::default())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Exported scalar variables, for the environment of child processes.
    pub fn exported(&self) -> Vec<(String, String)> {
        self.names()
            .into_iter()
            .filter_map(|name| {
                let var = self.lookup(&name)?;
                if !var.attrs.exported {
                    return None;
                }
                match &var.value {
                    Some(Value::Scalar(s)) => Some((name, s.clone())),
                    _ => None,
                }
            })
            .collect()
    }
}
