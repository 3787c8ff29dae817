//! Splices a compiled program and its challenge into the robot firmware.
//!
//! The template carries three kinds of region: the `challengeJson = ...`
//! assignment (up to the `robot_state = ` line), the `user_route` routine (up
//! to the next unindented line) and the quoted credential placeholders. Each
//! replacement is independent; a region the template lacks is skipped.

use crate::block::{Block, Workspace};
use crate::python;
use anyhow::Result;
use regex::{Captures, Regex};
use serde_json::Value;
use std::fmt::{Display, Formatter};

pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/firmware.py");

pub const ROUTINE_SIGNATURE: &str =
    "def user_route(forward, turnLeft, turnRight, turnBack, collect, startSound, finishSound):";

const ROUTINE_INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Config,
    Routine,
    NetworkName,
    NetworkSecret,
    SessionId,
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Region::Config => "challenge configuration",
            Region::Routine => "user routine",
            Region::NetworkName => "network name",
            Region::NetworkSecret => "network password",
            Region::SessionId => "room id",
        };
        write!(f, "{}", name)
    }
}

/// Connectivity overrides. Empty values leave the template's placeholder alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub network_name: String,
    pub network_secret: String,
    pub session_id: String,
}

impl Credentials {
    fn value(&self, region: Region) -> &str {
        match region {
            Region::NetworkName => self.network_name.as_str(),
            Region::NetworkSecret => self.network_secret.as_str(),
            Region::SessionId => self.session_id.as_str(),
            Region::Config | Region::Routine => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub text: String,
    pub replaced: Vec<Region>,
    pub skipped: Vec<Region>,
}

pub struct BundleAssembler {
    template: String,
    config: Regex,
    routine: Regex,
    credentials: Vec<(Region, Regex)>,
}

impl BundleAssembler {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let config = Regex::new(r"(?ms)^challengeJson[ \t]*=.*?^(robot_state[ \t]*=)")?;
        let routine = Regex::new(r"(?m)^def[ \t]+user_route[ \t]*\([^\n]*(?:\n(?:[ \t][^\n]*)?)*")?;
        let credentials = vec![
            (
                Region::NetworkName,
                Regex::new(r#"(?m)^(WIFI_SSID[ \t]*=[ \t]*)"[^"\n]*""#)?,
            ),
            (
                Region::NetworkSecret,
                Regex::new(r#"(?m)^(WIFI_PASS(?:WORD)?[ \t]*=[ \t]*)"[^"\n]*""#)?,
            ),
            (
                Region::SessionId,
                Regex::new(r#"(?m)^((?:ACTIONS_)?ROOM_ID[ \t]*=[ \t]*)"[^"\n]*""#)?,
            ),
        ];
        Ok(Self {
            template: template.into(),
            config,
            routine,
            credentials,
        })
    }

    pub fn assemble(&self, routine: &str, config_literal: &str, credentials: &Credentials) -> Bundle {
        let mut text = self.template.clone();
        let mut replaced = Vec::new();
        let mut skipped = Vec::new();

        if self.config.is_match(&text) {
            text = self
                .config
                .replace(&text, |caps: &Captures| {
                    format!("challengeJson = {}\n\n{}", config_literal, &caps[1])
                })
                .into_owned();
            replaced.push(Region::Config);
        } else {
            skipped.push(Region::Config);
        }

        if self.routine.is_match(&text) {
            text = self
                .routine
                .replace(&text, |_: &Captures| format!("{}\n\n", routine.trim_end()))
                .into_owned();
            replaced.push(Region::Routine);
        } else {
            skipped.push(Region::Routine);
        }

        for (region, pattern) in &self.credentials {
            let value = credentials.value(*region);
            if value.is_empty() {
                continue;
            }
            if !pattern.is_match(&text) {
                skipped.push(*region);
                continue;
            }
            let literal = python_string(value);
            text = pattern
                .replace_all(&text, |caps: &Captures| format!("{}{}", &caps[1], literal))
                .into_owned();
            replaced.push(*region);
        }

        for region in &skipped {
            log::warn!("template has no {} region; left unchanged", region);
        }
        Bundle {
            text,
            replaced,
            skipped,
        }
    }
}

/// Best-effort assembly; never fails.
pub fn assemble(
    template: &str,
    routine: &str,
    config_literal: &str,
    credentials: &Credentials,
) -> String {
    match BundleAssembler::new(template) {
        Ok(assembler) => assembler.assemble(routine, config_literal, credentials).text,
        Err(e) => {
            log::warn!("bundle patterns unavailable, template left unchanged: {}", e);
            template.to_string()
        }
    }
}

/// Wraps a generated program body in the `user_route` routine.
pub fn build_routine(body: &str) -> String {
    let mut out = String::new();
    out.push_str(ROUTINE_SIGNATURE);
    out.push('\n');
    out.push_str(ROUTINE_INDENT);
    out.push_str("startSound()\n");
    for line in body.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(ROUTINE_INDENT);
            out.push_str(line);
            out.push('\n');
        }
    }
    for line in [
        "if _check_victory():",
        "    display.show(Image.YES)",
        "else:",
        "    display.show(Image.NO)",
        "finishSound()",
    ] {
        out.push_str(ROUTINE_INDENT);
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Chains that make up the routine body: function definitions first, then the
/// program hanging off the start block. Without a start block every chain runs.
pub fn routine_chains(workspace: &Workspace) -> Vec<Block> {
    let Some(start) = workspace.top_blocks.iter().find(|b| is_kind(b, "start")) else {
        return workspace.top_blocks.clone();
    };
    let mut chains = workspace
        .top_blocks
        .iter()
        .filter(|b| is_kind(b, "function_def"))
        .cloned()
        .collect::<Vec<_>>();
    if let Some(program) = start.next() {
        chains.push(program.clone());
    }
    chains
}

fn is_kind(block: &Block, suffix: &str) -> bool {
    block
        .kind
        .strip_prefix("ottobit_")
        .or_else(|| block.kind.strip_prefix("ottobot_"))
        == Some(suffix)
}

/// Python text of the routine body for `workspace`.
pub fn routine_body(workspace: &Workspace) -> String {
    let program = Workspace::new(routine_chains(workspace));
    python::routine_registry().generate(&program)
}

/// Renders a JSON value as a Python literal.
pub fn json_to_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => python_string(s),
        Value::Array(items) => {
            let items = items.iter().map(json_to_literal).collect::<Vec<_>>();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_string(k), json_to_literal(v)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
