//! Shape of the expandable `if / else if / else` block.
//!
//! The shape is the pair `(elseif_count, has_else)`. Socket `IF0`/`DO0` is always
//! present; clause `n` (1-based) owns `IFn` (condition) and `DOn` (body); the
//! optional unconditional body lives in `ELSE`. Reshaping is a pure function over
//! captured socket contents, and [`apply`] is the thin layer that moves real
//! subtrees in and out of a [`Block`].

use crate::block::Block;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::io::Cursor;
use xmltree::{Element, EmitterConfig};

pub const ELSE_SOCKET: &str = "ELSE";

/// Largest `else if` count a shape can hold. Stored counts above it are clamped.
pub const MAX_ELSEIF_COUNT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionalShape {
    pub elseif_count: usize,
    pub has_else: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Value,
    Statement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    pub name: String,
    pub kind: SocketKind,
}

/// Entries of the satellite editor, top to bottom below the fixed `if` container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause<T> {
    pub condition: Option<T>,
    pub body: Option<T>,
}

impl<T> Default for Clause<T> {
    fn default() -> Self {
        Self {
            condition: None,
            body: None,
        }
    }
}

/// Subtrees attached to the reshapeable sockets. `clauses[0]` is the first
/// `else if` (sockets `IF1`/`DO1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings<T> {
    pub clauses: Vec<Clause<T>>,
    pub else_body: Option<T>,
}

impl<T> Default for Bindings<T> {
    fn default() -> Self {
        Self {
            clauses: Vec::new(),
            else_body: None,
        }
    }
}

impl ConditionalShape {
    pub fn new(elseif_count: usize, has_else: bool) -> Self {
        Self {
            elseif_count,
            has_else,
        }
    }

    /// Same shape with the `else if` count limited to [`MAX_ELSEIF_COUNT`].
    pub fn clamped(self) -> Self {
        if self.elseif_count > MAX_ELSEIF_COUNT {
            log::warn!(
                "clamping else-if count {} to {}",
                self.elseif_count,
                MAX_ELSEIF_COUNT
            );
        }
        Self {
            elseif_count: self.elseif_count.min(MAX_ELSEIF_COUNT),
            has_else: self.has_else,
        }
    }

    pub fn condition_socket(index: usize) -> String {
        format!("IF{}", index)
    }

    pub fn body_socket(index: usize) -> String {
        format!("DO{}", index)
    }

    /// Number of (condition, body) pairs including the leading `if`.
    pub fn pair_count(&self) -> usize {
        self.elseif_count.saturating_add(1)
    }

    pub fn sockets(&self) -> Vec<Socket> {
        let mut out = Vec::with_capacity(self.pair_count() * 2 + 1);
        for i in 0..self.pair_count() {
            out.push(Socket {
                name: Self::condition_socket(i),
                kind: SocketKind::Value,
            });
            out.push(Socket {
                name: Self::body_socket(i),
                kind: SocketKind::Statement,
            });
        }
        if self.has_else {
            out.push(Socket {
                name: ELSE_SOCKET.to_string(),
                kind: SocketKind::Statement,
            });
        }
        out
    }

    /// Reads the shape stored on a block, `(0, false)` when it has none.
    pub fn of(block: &Block) -> Self {
        block
            .extra_state
            .as_ref()
            .map(Self::from_extra_state)
            .unwrap_or_default()
    }

    pub fn to_extra_state(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert("elseif".to_string(), Value::from(self.elseif_count as u64));
        state.insert("else".to_string(), Value::from(u64::from(self.has_else)));
        state
    }

    pub fn from_extra_state(state: &Map<String, Value>) -> Self {
        let elseif_count = state
            .get("elseif")
            .or_else(|| state.get("elseIfCount"))
            .and_then(count_from_value)
            .unwrap_or(0);
        let has_else = state
            .get("else")
            .or_else(|| state.get("hasElse"))
            .map(|v| match v {
                Value::Bool(b) => *b,
                other => count_from_value(other).unwrap_or(0) > 0,
            })
            .unwrap_or(false);
        Self {
            elseif_count,
            has_else,
        }
        .clamped()
    }

    /// Legacy `<mutation elseif=".." else="1"/>` form. Zero counts are omitted.
    pub fn to_mutation_xml(&self) -> Result<String> {
        let mut element = Element::new("mutation");
        if self.elseif_count > 0 {
            element
                .attributes
                .insert("elseif".to_string(), self.elseif_count.to_string());
        }
        if self.has_else {
            element
                .attributes
                .insert("else".to_string(), "1".to_string());
        }
        let mut out = Vec::new();
        element
            .write_with_config(
                &mut out,
                EmitterConfig::new().write_document_declaration(false),
            )
            .map_err(|e| anyhow!("Failed to write mutation XML: {}.", e))?;
        Ok(String::from_utf8(out)?)
    }

    pub fn from_mutation_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(Cursor::new(xml.as_bytes()))
            .map_err(|e| anyhow!("Invalid mutation XML: {}.", e))?;
        let state = mutation_attributes(&element);
        Ok(Self::from_extra_state(&state))
    }
}

/// Converts a parsed `<mutation>` element into the extra-state object form.
pub fn mutation_attributes(element: &Element) -> Map<String, Value> {
    let mut state = Map::new();
    for (name, raw) in element.attributes.iter() {
        let value = match raw.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(raw.clone()),
        };
        state.insert(name.to_string(), value);
    }
    state
}

fn count_from_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        Value::Bool(b) => Some(usize::from(*b)),
        _ => None,
    }
}

/// Reads the editor's clause list strictly top to bottom. Every `else if`
/// entry adds a clause and any `else` entry turns the else body on, wherever it
/// sits in the list; a misordered list is not rejected.
pub fn compose(clauses: &[ClauseKind]) -> ConditionalShape {
    let mut shape = ConditionalShape::default();
    for clause in clauses {
        match clause {
            ClauseKind::ElseIf => shape.elseif_count += 1,
            ClauseKind::Else => shape.has_else = true,
        }
    }
    shape
}

/// Clause list the editor shows for `shape`.
pub fn decompose(shape: ConditionalShape) -> Vec<ClauseKind> {
    let shape = shape.clamped();
    let mut out = vec![ClauseKind::ElseIf; shape.elseif_count];
    if shape.has_else {
        out.push(ClauseKind::Else);
    }
    out
}

/// Moves captured subtrees onto the sockets of `new_shape`. Clause `n` keeps
/// its content while `n <= new_shape.elseif_count`; anything else that does not
/// fit the new layout is dropped.
pub fn reshape<T>(
    old_shape: ConditionalShape,
    bindings: Bindings<T>,
    new_shape: ConditionalShape,
) -> (ConditionalShape, Bindings<T>) {
    let mut clauses = bindings
        .clauses
        .into_iter()
        .take(old_shape.elseif_count.min(new_shape.elseif_count))
        .collect::<Vec<_>>();
    clauses.resize_with(new_shape.elseif_count, Clause::default);
    let else_body = if old_shape.has_else && new_shape.has_else {
        bindings.else_body
    } else {
        None
    };
    (new_shape, Bindings { clauses, else_body })
}

/// Detaches every reshapeable socket from `block`, returning what was attached
/// to the sockets of `shape`. Stray sockets outside `shape` are discarded.
pub fn capture(block: &mut Block, shape: ConditionalShape) -> Bindings<Block> {
    let mut clauses = Vec::with_capacity(shape.elseif_count);
    for i in 1..=shape.elseif_count {
        clauses.push(Clause {
            condition: block.take_input(&ConditionalShape::condition_socket(i)),
            body: block.take_input(&ConditionalShape::body_socket(i)),
        });
    }
    let else_body = if shape.has_else {
        block.take_input(ELSE_SOCKET)
    } else {
        None
    };
    block.inputs.retain(|name, _| !is_reshapeable_socket(name));
    Bindings { clauses, else_body }
}

fn install(block: &mut Block, shape: ConditionalShape, bindings: Bindings<Block>) {
    for (offset, clause) in bindings.clauses.into_iter().enumerate() {
        let i = offset + 1;
        block.set_input(ConditionalShape::condition_socket(i), clause.condition);
        block.set_input(ConditionalShape::body_socket(i), clause.body);
    }
    block.set_input(ELSE_SOCKET, bindings.else_body);
    let mut state = block.extra_state.take().unwrap_or_default();
    state.remove("elseIfCount");
    state.remove("hasElse");
    state.extend(shape.to_extra_state());
    block.extra_state = Some(state);
}

/// Reshapes `block` in place and returns the shape it had before. The new
/// shape is clamped to [`MAX_ELSEIF_COUNT`] clauses.
pub fn apply(block: &mut Block, new_shape: ConditionalShape) -> ConditionalShape {
    let new_shape = new_shape.clamped();
    let old_shape = ConditionalShape::of(block);
    let bindings = capture(block, old_shape);
    let (shape, bindings) = reshape(old_shape, bindings, new_shape);
    log::debug!(
        "reshaped block '{}' from {:?} to {:?}",
        block.id,
        old_shape,
        shape
    );
    install(block, shape, bindings);
    old_shape
}

/// Replays the stored shape so the socket layout matches it after a load.
pub fn restore(block: &mut Block) {
    let shape = ConditionalShape::of(block);
    apply(block, shape);
}

/// Block types whose sockets follow a [`ConditionalShape`].
pub fn uses_conditional_shape(kind: &str) -> bool {
    matches!(kind, "ottobit_if_expandable" | "controls_if")
}

fn is_reshapeable_socket(name: &str) -> bool {
    if name == ELSE_SOCKET {
        return true;
    }
    let index = name
        .strip_prefix("IF")
        .or_else(|| name.strip_prefix("DO"))
        .and_then(|digits| digits.parse::<usize>().ok());
    matches!(index, Some(i) if i >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expandable_if() -> Block {
        Block::new("ottobit_if_expandable").with_id("if1")
    }

    fn compare(value: i64) -> Block {
        Block::new("ottobit_logic_compare")
            .with_field("OPERATOR", "EQ")
            .with_input("LEFT", Block::new("ottobit_bale_number"))
            .with_input("RIGHT", Block::new("ottobit_number").with_field("NUM", value))
    }

    #[test]
    fn fresh_block_has_bare_if_shape() {
        let block = expandable_if();
        let shape = ConditionalShape::of(&block);
        assert_eq!(shape, ConditionalShape::new(0, false));
        let names = shape.sockets().into_iter().map(|s| s.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["IF0", "DO0"]);
    }

    #[test]
    fn reshape_to_three_elseifs_and_else_exposes_four_pairs_and_else() {
        let mut block = expandable_if();
        apply(&mut block, ConditionalShape::new(3, true));
        let sockets = ConditionalShape::of(&block).sockets();
        let conditions = sockets.iter().filter(|s| s.kind == SocketKind::Value).count();
        let bodies = sockets
            .iter()
            .filter(|s| s.kind == SocketKind::Statement && s.name.starts_with("DO"))
            .count();
        assert_eq!(conditions, 4);
        assert_eq!(bodies, 4);
        assert!(sockets.iter().any(|s| s.name == ELSE_SOCKET));
        assert_eq!(sockets.len(), 9);
    }

    #[test]
    fn shrinking_keeps_clauses_by_position_and_drops_the_rest() {
        let mut block = expandable_if();
        apply(&mut block, ConditionalShape::new(2, false));
        block.set_input("IF1", Some(compare(1)));
        block.set_input("DO1", Some(Block::new("ottobit_led_off")));
        block.set_input("IF2", Some(compare(2)));
        block.set_input("DO2", Some(Block::new("ottobit_take_bale")));

        apply(&mut block, ConditionalShape::new(1, false));

        assert_eq!(block.input("IF1"), Some(&compare(1)));
        assert_eq!(block.input("DO1").map(|b| b.kind.as_str()), Some("ottobit_led_off"));
        assert!(block.input("IF2").is_none());
        assert!(block.input("DO2").is_none());
        let mut seen_discarded = false;
        block.walk(&mut |b| {
            if b.kind == "ottobit_take_bale" {
                seen_discarded = true;
            }
            if b.kind == "ottobit_number" && b.field("NUM").and_then(|v| v.as_f64()) == Some(2.0) {
                seen_discarded = true;
            }
        });
        assert!(!seen_discarded);
    }

    #[test]
    fn growing_again_does_not_resurrect_discarded_content() {
        let mut block = expandable_if();
        apply(&mut block, ConditionalShape::new(1, true));
        block.set_input("ELSE", Some(Block::new("ottobit_led_off")));
        apply(&mut block, ConditionalShape::new(1, false));
        apply(&mut block, ConditionalShape::new(1, true));
        assert!(block.input("ELSE").is_none());
    }

    #[test]
    fn else_body_survives_when_elseifs_change() {
        let mut block = expandable_if();
        apply(&mut block, ConditionalShape::new(0, true));
        block.set_input("ELSE", Some(Block::new("ottobit_put_bale")));
        apply(&mut block, ConditionalShape::new(2, true));
        assert_eq!(
            block.input("ELSE").map(|b| b.kind.as_str()),
            Some("ottobit_put_bale")
        );
    }

    #[test]
    fn leading_if_sockets_are_never_touched() {
        let mut block = expandable_if()
            .with_input("IF0", compare(7))
            .with_input("DO0", Block::new("ottobit_led_off"));
        apply(&mut block, ConditionalShape::new(2, true));
        apply(&mut block, ConditionalShape::new(0, false));
        assert_eq!(block.input("IF0"), Some(&compare(7)));
        assert!(block.input("DO0").is_some());
    }

    #[test]
    fn pure_reshape_pads_and_truncates() {
        let bindings = Bindings {
            clauses: vec![
                Clause {
                    condition: Some("a"),
                    body: Some("A"),
                },
                Clause {
                    condition: Some("b"),
                    body: None,
                },
            ],
            else_body: Some("E"),
        };
        let (shape, out) = reshape(
            ConditionalShape::new(2, true),
            bindings.clone(),
            ConditionalShape::new(3, true),
        );
        assert_eq!(shape, ConditionalShape::new(3, true));
        assert_eq!(out.clauses.len(), 3);
        assert_eq!(out.clauses[1].condition, Some("b"));
        assert_eq!(out.clauses[2], Clause::default());
        assert_eq!(out.else_body, Some("E"));

        let (_, out) = reshape(
            ConditionalShape::new(2, true),
            bindings,
            ConditionalShape::new(0, false),
        );
        assert!(out.clauses.is_empty());
        assert_eq!(out.else_body, None);
    }

    #[test]
    fn extra_state_round_trips() {
        for shape in [
            ConditionalShape::new(0, false),
            ConditionalShape::new(0, true),
            ConditionalShape::new(3, false),
            ConditionalShape::new(5, true),
        ] {
            let state = shape.to_extra_state();
            assert_eq!(ConditionalShape::from_extra_state(&state), shape);
        }
    }

    #[test]
    fn mutation_xml_round_trips() {
        for shape in [
            ConditionalShape::new(0, false),
            ConditionalShape::new(0, true),
            ConditionalShape::new(3, false),
            ConditionalShape::new(5, true),
        ] {
            let xml = shape.to_mutation_xml().unwrap();
            assert_eq!(ConditionalShape::from_mutation_xml(&xml).unwrap(), shape);
        }
    }

    #[test]
    fn unparseable_counts_read_as_zero() {
        let shape = ConditionalShape::from_mutation_xml(r#"<mutation elseif="many"/>"#).unwrap();
        assert_eq!(shape, ConditionalShape::new(0, false));
    }

    #[test]
    fn oversized_counts_are_clamped() {
        let state = serde_json::json!({"elseif": 100000000000000000u64, "else": 0});
        let Value::Object(state) = state else {
            unreachable!()
        };
        assert_eq!(
            ConditionalShape::from_extra_state(&state),
            ConditionalShape::new(MAX_ELSEIF_COUNT, false)
        );
        let shape = ConditionalShape::from_mutation_xml(r#"<mutation elseif="4000000000" else="1"/>"#)
            .unwrap();
        assert_eq!(shape, ConditionalShape::new(MAX_ELSEIF_COUNT, true));

        let mut block = expandable_if();
        apply(&mut block, ConditionalShape::new(usize::MAX, false));
        assert_eq!(
            ConditionalShape::of(&block),
            ConditionalShape::new(MAX_ELSEIF_COUNT, false)
        );
        assert_eq!(ConditionalShape::new(usize::MAX, false).pair_count(), usize::MAX);
    }

    #[test]
    fn compose_scans_left_to_right_without_reordering() {
        use ClauseKind::*;
        assert_eq!(compose(&[]), ConditionalShape::new(0, false));
        assert_eq!(compose(&[ElseIf, ElseIf, Else]), ConditionalShape::new(2, true));
        assert_eq!(compose(&[Else, ElseIf]), ConditionalShape::new(1, true));
        assert_eq!(compose(&[Else, Else]), ConditionalShape::new(0, true));
        assert_eq!(
            decompose(ConditionalShape::new(2, true)),
            vec![ElseIf, ElseIf, Else]
        );
    }

    #[test]
    fn restore_drops_sockets_outside_the_stored_layout() {
        let mut block = expandable_if()
            .with_input("IF1", compare(1))
            .with_input("IF4", compare(4))
            .with_input("ELSE", Block::new("ottobit_led_off"));
        block.extra_state = Some(ConditionalShape::new(1, false).to_extra_state());
        restore(&mut block);
        assert!(block.input("IF1").is_some());
        assert!(block.input("IF4").is_none());
        assert!(block.input("ELSE").is_none());
    }
}
