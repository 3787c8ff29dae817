use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Literal value held by a block field (number box, dropdown token, text box, checkbox).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", format_num(*n)),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// One node of a visual program. A block owns its input subtrees and the rest
/// of its statement chain, so a workspace is a forest of trees.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    pub kind: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub inputs: BTreeMap<String, Block>,
    pub next: Option<Box<Block>>,
    pub extra_state: Option<Map<String, Value>>,
    pub enabled: bool,
    pub shadow: bool,
    pub position: Option<(f64, f64)>,
}

impl Block {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            fields: BTreeMap::new(),
            inputs: BTreeMap::new(),
            next: None,
            extra_state: None,
            enabled: true,
            shadow: false,
            position: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, socket: impl Into<String>, child: Block) -> Self {
        self.inputs.insert(socket.into(), child);
        self
    }

    pub fn with_next(mut self, next: Block) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field text, or `default` when the field is missing or blank.
    pub fn field_or(&self, name: &str, default: &str) -> String {
        match self.field(name) {
            Some(value) if !value.is_blank() => value.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn input(&self, socket: &str) -> Option<&Block> {
        self.inputs.get(socket)
    }

    pub fn set_input(&mut self, socket: impl Into<String>, child: Option<Block>) {
        let socket = socket.into();
        match child {
            Some(child) => {
                self.inputs.insert(socket, child);
            }
            None => {
                self.inputs.remove(&socket);
            }
        }
    }

    pub fn take_input(&mut self, socket: &str) -> Option<Block> {
        self.inputs.remove(socket)
    }

    pub fn next(&self) -> Option<&Block> {
        self.next.as_deref()
    }

    /// Appends `block` at the end of this chain.
    pub fn push_next(&mut self, block: Block) {
        match self.next.as_deref_mut() {
            Some(next) => next.push_next(block),
            None => self.next = Some(Box::new(block)),
        }
    }

    /// Iterates this block and every block after it in the chain.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            current: Some(self),
        }
    }

    /// Depth-first visit over this block, its inputs and its chain.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Block)) {
        for block in self.chain() {
            visit(block);
            for child in block.inputs.values() {
                child.walk(visit);
            }
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut Block)) {
        let mut current = Some(self);
        while let Some(block) = current {
            visit(block);
            for child in block.inputs.values_mut() {
                child.walk_mut(visit);
            }
            current = block.next.as_deref_mut();
        }
    }
}

pub struct Chain<'a> {
    current: Option<&'a Block>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;
        self.current = block.next();
        Some(block)
    }
}

/// Every top-level chain of the editor, in the order the editor enumerates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    pub top_blocks: Vec<Block>,
}

impl Workspace {
    pub fn new(top_blocks: Vec<Block>) -> Self {
        Self { top_blocks }
    }

    pub fn block_count(&self) -> usize {
        let mut count = 0usize;
        for top in &self.top_blocks {
            top.walk(&mut |_| count += 1);
        }
        count
    }
}

pub fn format_num(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
