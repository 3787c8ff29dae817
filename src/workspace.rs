use crate::block::{Block, FieldValue, Workspace};
use crate::mutator::{self, mutation_attributes};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::io::Cursor;
use xmltree::Element;

impl Workspace {
    /// Parses the editor's JSON save format.
    pub fn from_json_str(source: &str) -> Result<Self> {
        let value = parse_json(source).context("Workspace is not valid JSON.")?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let blocks = top_block_array(value)
            .ok_or_else(|| anyhow!("Invalid workspace: missing 'blocks' array."))?;
        let variables = read_variables(value);
        let mut top_blocks = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let path = format!("blocks[{}]", index);
            top_blocks.push(read_block(block, &variables, &path)?);
        }
        Ok(Workspace { top_blocks })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "blocks": {
                "languageVersion": 0,
                "blocks": self.top_blocks.iter().map(write_block).collect::<Vec<_>>()
            }
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }
}

/// Parses JSON without a nesting limit. Each chained block nests two levels.
pub fn parse_json(source: &str) -> serde_json::Result<Value> {
    let mut de = serde_json::Deserializer::from_str(source);
    de.disable_recursion_limit();
    #[cfg(not(target_arch = "wasm32"))]
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    #[cfg(target_arch = "wasm32")]
    let value = Value::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

fn top_block_array(value: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr);
    }
    let blocks = value.get("blocks")?;
    if let Some(arr) = blocks.as_array() {
        return Some(arr);
    }
    blocks.get("blocks").and_then(Value::as_array)
}

fn read_variables(value: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(vars) = value.get("variables").and_then(Value::as_array) else {
        return out;
    };
    for var in vars {
        let id = var.get("id").and_then(Value::as_str);
        let name = var.get("name").and_then(Value::as_str);
        if let (Some(id), Some(name)) = (id, name) {
            out.insert(id.to_string(), name.to_string());
        }
    }
    out
}

/// Reads a block and the chain hanging off its `next` link.
fn read_block(value: &Value, variables: &HashMap<String, String>, path: &str) -> Result<Block> {
    let mut nodes = Vec::new();
    let mut current = Some(value);
    while let Some(value) = current {
        let node_path = match nodes.len() {
            0 => path.to_string(),
            n => format!("{}.next[{}]", path, n),
        };
        nodes.push(read_node(value, variables, &node_path)?);
        current = value
            .get("next")
            .and_then(|n| n.get("block"))
            .filter(|b| b.is_object());
    }
    let mut chain: Option<Block> = None;
    while let Some(mut block) = nodes.pop() {
        block.next = chain.take().map(Box::new);
        chain = Some(block);
    }
    chain.ok_or_else(|| anyhow!("Block at {} is empty.", path))
}

fn read_node(value: &Value, variables: &HashMap<String, String>, path: &str) -> Result<Block> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Block at {} is not an object.", path))?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Block at {} missing 'type'.", path))?;
    let mut block = Block::new(kind);
    block.id = obj
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    block.enabled = is_enabled(obj);
    if let (Some(x), Some(y)) = (
        obj.get("x").and_then(Value::as_f64),
        obj.get("y").and_then(Value::as_f64),
    ) {
        block.position = Some((x, y));
    }

    if let Some(fields) = obj.get("fields").and_then(Value::as_object) {
        for (name, raw) in fields {
            match read_field(raw, variables) {
                Some(field) => {
                    block.fields.insert(name.clone(), field);
                }
                None => log::warn!(
                    "ignoring unreadable field '{}' on block {} ({})",
                    name,
                    path,
                    kind
                ),
            }
        }
    }

    if let Some(inputs) = obj.get("inputs").and_then(Value::as_object) {
        for (name, slot) in inputs {
            let child_path = format!("{}.inputs.{}", path, name);
            if let Some(child) = slot.get("block").filter(|b| b.is_object()) {
                block
                    .inputs
                    .insert(name.clone(), read_block(child, variables, &child_path)?);
            } else if let Some(shadow) = slot.get("shadow").filter(|b| b.is_object()) {
                let mut child = read_block(shadow, variables, &child_path)?;
                child.shadow = true;
                block.inputs.insert(name.clone(), child);
            }
        }
    }

    block.extra_state = match obj.get("extraState") {
        Some(Value::Object(state)) => Some(state.clone()),
        Some(Value::String(xml)) => read_mutation_xml(xml, path),
        _ => None,
    };
    if block.extra_state.is_some() && mutator::uses_conditional_shape(&block.kind) {
        mutator::restore(&mut block);
    }
    Ok(block)
}

fn is_enabled(obj: &Map<String, Value>) -> bool {
    if obj.get("enabled").and_then(Value::as_bool) == Some(false) {
        return false;
    }
    !obj.get("disabledReasons")
        .and_then(Value::as_array)
        .is_some_and(|reasons| !reasons.is_empty())
}

fn read_field(raw: &Value, variables: &HashMap<String, String>) -> Option<FieldValue> {
    match raw {
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Object(var) => {
            if let Some(name) = var.get("name").and_then(Value::as_str) {
                return Some(FieldValue::Text(name.to_string()));
            }
            let id = var.get("id").and_then(Value::as_str)?;
            Some(FieldValue::Text(
                variables.get(id).cloned().unwrap_or_else(|| id.to_string()),
            ))
        }
        _ => None,
    }
}

fn read_mutation_xml(xml: &str, path: &str) -> Option<Map<String, Value>> {
    match Element::parse(Cursor::new(xml.as_bytes())) {
        Ok(element) => Some(mutation_attributes(&element)),
        Err(e) => {
            log::warn!("ignoring malformed mutation on block {}: {}", path, e);
            None
        }
    }
}

fn write_block(head: &Block) -> Value {
    let mut nodes = head.chain().map(write_node).collect::<Vec<_>>();
    let mut chain: Option<Value> = None;
    while let Some(mut obj) = nodes.pop() {
        if let Some(next) = chain.take() {
            obj.insert("next".to_string(), json!({ "block": next }));
        }
        chain = Some(Value::Object(obj));
    }
    chain.unwrap_or(Value::Null)
}

fn write_node(block: &Block) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(block.kind.clone()));
    if !block.id.is_empty() {
        obj.insert("id".to_string(), Value::String(block.id.clone()));
    }
    if let Some((x, y)) = block.position {
        obj.insert("x".to_string(), json!(x));
        obj.insert("y".to_string(), json!(y));
    }
    if !block.enabled {
        obj.insert("enabled".to_string(), Value::Bool(false));
    }
    if let Some(state) = &block.extra_state {
        obj.insert("extraState".to_string(), Value::Object(state.clone()));
    }
    if !block.fields.is_empty() {
        let fields = block
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<_, _>>();
        obj.insert("fields".to_string(), Value::Object(fields));
    }
    if !block.inputs.is_empty() {
        let inputs = block
            .inputs
            .iter()
            .map(|(name, child)| {
                let slot = if child.shadow { "shadow" } else { "block" };
                let mut entry = Map::new();
                entry.insert(slot.to_string(), write_block(child));
                (name.clone(), Value::Object(entry))
            })
            .collect::<Map<_, _>>();
        obj.insert("inputs".to_string(), Value::Object(inputs));
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::ConditionalShape;

    const SAMPLE: &str = r#"{
      "blocks": {
        "languageVersion": 0,
        "blocks": [
          {
            "type": "ottobit_start",
            "id": "start",
            "x": 20,
            "y": 30,
            "next": {
              "block": {
                "type": "ottobit_move_forward",
                "id": "mf",
                "fields": { "STEPS": 2 },
                "next": {
                  "block": {
                    "type": "ottobit_repeat_range",
                    "id": "rr",
                    "fields": { "VAR": { "id": "v1" } },
                    "inputs": {
                      "FROM": { "shadow": { "type": "ottobit_number", "id": "s1", "fields": { "NUM": 1 } } },
                      "TO": {
                        "shadow": { "type": "ottobit_number", "id": "s2", "fields": { "NUM": 5 } },
                        "block": { "type": "ottobit_bale_number", "id": "bn" }
                      }
                    }
                  }
                }
              }
            }
          }
        ]
      },
      "variables": [ { "name": "count", "id": "v1" } ]
    }"#;

    #[test]
    fn reads_chains_fields_and_inputs() {
        let ws = Workspace::from_json_str(SAMPLE).unwrap();
        assert_eq!(ws.top_blocks.len(), 1);
        let start = &ws.top_blocks[0];
        assert_eq!(start.position, Some((20.0, 30.0)));
        let kinds = start.chain().map(|b| b.kind.as_str()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec!["ottobit_start", "ottobit_move_forward", "ottobit_repeat_range"]
        );
        let mf = start.next().unwrap();
        assert_eq!(mf.field("STEPS"), Some(&FieldValue::Number(2.0)));
    }

    #[test]
    fn real_block_wins_over_shadow_and_variables_resolve_by_id() {
        let ws = Workspace::from_json_str(SAMPLE).unwrap();
        let rr = ws.top_blocks[0].chain().nth(2).unwrap();
        assert_eq!(rr.field_or("VAR", "i"), "count");
        let from = rr.input("FROM").unwrap();
        assert!(from.shadow);
        assert_eq!(from.kind, "ottobit_number");
        let to = rr.input("TO").unwrap();
        assert!(!to.shadow);
        assert_eq!(to.kind, "ottobit_bale_number");
    }

    #[test]
    fn missing_type_is_an_error() {
        let err = Workspace::from_json_str(r#"{"blocks":{"blocks":[{"id":"x"}]}}"#).unwrap_err();
        assert!(err.to_string().contains("missing 'type'"));
    }

    #[test]
    fn long_chains_load_and_save() {
        let links = 250;
        let mut source = String::from("[");
        for _ in 0..links {
            source.push_str(r#"{"type":"ottobit_move_forward","fields":{"STEPS":1},"next":{"block":"#);
        }
        source.push_str(r#"{"type":"ottobit_led_off"}"#);
        for _ in 0..links {
            source.push_str("}}");
        }
        source.push(']');

        let ws = Workspace::from_json_str(&source).unwrap();
        assert_eq!(ws.top_blocks.len(), 1);
        assert_eq!(ws.top_blocks[0].chain().count(), links + 1);
        let saved = ws.to_json_string().unwrap();
        assert_eq!(Workspace::from_json_str(&saved).unwrap(), ws);
    }

    #[test]
    fn errors_deep_in_a_chain_name_the_link() {
        let err = Workspace::from_json_str(
            r#"[{"type":"ottobit_start","next":{"block":{"type":"ottobit_led_off","next":{"block":{"id":"x"}}}}}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("blocks[0].next[2]"));
    }

    #[test]
    fn not_json_is_an_error() {
        assert!(Workspace::from_json_str("not json").is_err());
    }

    #[test]
    fn disabled_blocks_are_flagged() {
        let ws = Workspace::from_json_str(
            r#"[{"type":"ottobit_led_off","enabled":false},{"type":"ottobit_led_off","disabledReasons":["MANUALLY_DISABLED"]},{"type":"ottobit_led_off"}]"#,
        )
        .unwrap();
        let flags = ws.top_blocks.iter().map(|b| b.enabled).collect::<Vec<_>>();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn legacy_mutation_xml_restores_shape_and_layout() {
        let source = r#"[{
          "type": "ottobit_if_expandable",
          "extraState": "<mutation elseif=\"1\"></mutation>",
          "inputs": {
            "IF1": { "block": { "type": "ottobit_is_red" } },
            "IF2": { "block": { "type": "ottobit_is_green" } },
            "ELSE": { "block": { "type": "ottobit_led_off" } }
          }
        }]"#;
        let ws = Workspace::from_json_str(source).unwrap();
        let block = &ws.top_blocks[0];
        assert_eq!(ConditionalShape::of(block), ConditionalShape::new(1, false));
        assert!(block.input("IF1").is_some());
        assert!(block.input("IF2").is_none());
        assert!(block.input("ELSE").is_none());
    }

    #[test]
    fn save_then_load_preserves_the_graph() {
        let mut ws = Workspace::from_json_str(SAMPLE).unwrap();
        let mut cond = Block::new("ottobit_if_expandable").with_id("c");
        mutator::apply(&mut cond, ConditionalShape::new(2, true));
        cond.set_input("IF2", Some(Block::new("ottobit_is_yellow")));
        ws.top_blocks.push(cond);

        let saved = ws.to_json_string().unwrap();
        let reloaded = Workspace::from_json_str(&saved).unwrap();
        assert_eq!(reloaded, ws);
        assert_eq!(
            ConditionalShape::of(&reloaded.top_blocks[1]),
            ConditionalShape::new(2, true)
        );
    }
}
