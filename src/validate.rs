use crate::block::{Block, FieldValue, Workspace};
use crate::generator::is_identifier;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRule {
    Required,
    Number,
    Range { min: f64, max: f64 },
    Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    /// Integer part of the value clamped to `min..=max`, `default` when unreadable.
    Clamp { min: i64, max: i64, default: i64 },
    /// Identifier characters only, prefixed when it would start with a digit.
    Identifier {
        prefix: &'static str,
        default: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub kind: &'static str,
    pub field: &'static str,
    pub label: &'static str,
    pub rules: &'static [FieldRule],
    pub sanitizer: Sanitizer,
}

const STEPS_RULES: [FieldRule; 3] = [
    FieldRule::Required,
    FieldRule::Number,
    FieldRule::Range { min: 1.0, max: 100.0 },
];
const TIMES_RULES: [FieldRule; 3] = [
    FieldRule::Required,
    FieldRule::Number,
    FieldRule::Range { min: 1.0, max: 50.0 },
];
const BOUND_RULES: [FieldRule; 3] = [
    FieldRule::Required,
    FieldRule::Number,
    FieldRule::Range { min: 1.0, max: 1000.0 },
];
const COUNT_RULES: [FieldRule; 3] = [
    FieldRule::Required,
    FieldRule::Number,
    FieldRule::Range { min: 1.0, max: 10.0 },
];
const NAME_RULES: [FieldRule; 2] = [FieldRule::Required, FieldRule::Identifier];

const fn clamp(min: i64, max: i64, default: i64) -> Sanitizer {
    Sanitizer::Clamp { min, max, default }
}

const FUNCTION_NAME: Sanitizer = Sanitizer::Identifier {
    prefix: "func_",
    default: "myFunction",
};

pub const FIELD_SPECS: &[FieldSpec] = &[
    FieldSpec {
        kind: "ottobit_move_forward",
        field: "STEPS",
        label: "Steps",
        rules: &STEPS_RULES,
        sanitizer: clamp(1, 100, 1),
    },
    FieldSpec {
        kind: "ottobit_repeat",
        field: "TIMES",
        label: "Times",
        rules: &TIMES_RULES,
        sanitizer: clamp(1, 50, 3),
    },
    FieldSpec {
        kind: "ottobit_repeat_range",
        field: "FROM",
        label: "From",
        rules: &BOUND_RULES,
        sanitizer: clamp(1, 1000, 1),
    },
    FieldSpec {
        kind: "ottobit_repeat_range",
        field: "TO",
        label: "To",
        rules: &BOUND_RULES,
        sanitizer: clamp(1, 1000, 5),
    },
    FieldSpec {
        kind: "ottobit_repeat_range",
        field: "BY",
        label: "Step",
        rules: &STEPS_RULES,
        sanitizer: clamp(1, 100, 1),
    },
    FieldSpec {
        kind: "ottobit_repeat_range",
        field: "VAR",
        label: "Variable name",
        rules: &[FieldRule::Identifier],
        sanitizer: Sanitizer::Identifier {
            prefix: "var_",
            default: "i",
        },
    },
    FieldSpec {
        kind: "ottobit_collect_green",
        field: "COUNT",
        label: "Count",
        rules: &COUNT_RULES,
        sanitizer: clamp(1, 10, 1),
    },
    FieldSpec {
        kind: "ottobit_collect_red",
        field: "COUNT",
        label: "Count",
        rules: &COUNT_RULES,
        sanitizer: clamp(1, 10, 1),
    },
    FieldSpec {
        kind: "ottobit_collect_yellow",
        field: "COUNT",
        label: "Count",
        rules: &COUNT_RULES,
        sanitizer: clamp(1, 10, 1),
    },
    FieldSpec {
        kind: "ottobit_function_def",
        field: "NAME",
        label: "Function name",
        rules: &NAME_RULES,
        sanitizer: FUNCTION_NAME,
    },
    FieldSpec {
        kind: "ottobit_function_call",
        field: "NAME",
        label: "Function name",
        rules: &NAME_RULES,
        sanitizer: FUNCTION_NAME,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub block_id: String,
    pub block_kind: String,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Display for FieldIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block '{}' ({}) field {}: {}",
            self.block_id, self.block_kind, self.field, self.message
        )
    }
}

/// Block types saved by older editors used the `ottobot_` prefix.
fn canonical_kind(kind: &str) -> String {
    match kind.strip_prefix("ottobot_") {
        Some(rest) => format!("ottobit_{}", rest),
        None => kind.to_string(),
    }
}

pub fn specs_for(kind: &str) -> impl Iterator<Item = &'static FieldSpec> {
    let kind = canonical_kind(kind);
    FIELD_SPECS.iter().filter(move |spec| spec.kind == kind)
}

impl FieldSpec {
    /// Messages for every rule `value` breaks. A missing value only fails `Required`.
    pub fn check(&self, value: Option<&FieldValue>) -> Vec<String> {
        let mut messages = Vec::new();
        let Some(value) = value.filter(|v| !v.is_blank()) else {
            if self.rules.contains(&FieldRule::Required) {
                messages.push(format!("{} is required.", self.label));
            }
            return messages;
        };
        for rule in self.rules {
            match rule {
                FieldRule::Required => {}
                FieldRule::Number => {
                    if value.as_f64().is_none() {
                        messages.push(format!("{} must be a number.", self.label));
                    }
                }
                FieldRule::Range { min, max } => match value.as_f64() {
                    Some(n) if n >= *min && n <= *max => {}
                    Some(_) => messages.push(format!(
                        "{} must be between {} and {}.",
                        self.label, min, max
                    )),
                    None => {}
                },
                FieldRule::Identifier => {
                    if !is_identifier(&value.to_string()) {
                        messages.push(format!("{} must be a valid identifier.", self.label));
                    }
                }
            }
        }
        messages
    }

    pub fn sanitize(&self, value: &FieldValue) -> FieldValue {
        match self.sanitizer {
            Sanitizer::Clamp { min, max, default } => {
                let n = leading_integer(value).unwrap_or(default);
                FieldValue::Number(n.clamp(min, max) as f64)
            }
            Sanitizer::Identifier { prefix, default } => {
                let cleaned = value
                    .to_string()
                    .trim()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect::<String>();
                match cleaned.chars().next() {
                    None => FieldValue::Text(default.to_string()),
                    Some(c) if c.is_ascii_digit() => {
                        FieldValue::Text(format!("{}{}", prefix, cleaned))
                    }
                    Some(_) => FieldValue::Text(cleaned),
                }
            }
        }
    }
}

/// Integer read the way a number box reads typed text: optional sign then digits.
fn leading_integer(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Number(n) if n.is_finite() => Some(n.trunc() as i64),
        FieldValue::Number(_) | FieldValue::Bool(_) => None,
        FieldValue::Text(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
    }
}

fn check_block(block: &Block, issues: &mut Vec<FieldIssue>) {
    for spec in specs_for(&block.kind) {
        // A plugged-in expression replaces the field.
        if block.input(spec.field).is_some() {
            continue;
        }
        for message in spec.check(block.field(spec.field)) {
            issues.push(FieldIssue {
                block_id: block.id.clone(),
                block_kind: block.kind.clone(),
                field: spec.field.to_string(),
                message,
            });
        }
    }
}

pub fn validate_workspace(workspace: &Workspace) -> ValidationReport {
    let mut issues = Vec::new();
    for top in &workspace.top_blocks {
        top.walk(&mut |block| check_block(block, &mut issues));
    }
    ValidationReport { issues }
}

/// Rewrites every out-of-range or malformed field in place. Returns how many
/// fields changed.
pub fn sanitize_workspace(workspace: &mut Workspace) -> usize {
    let mut changed = 0usize;
    for top in &mut workspace.top_blocks {
        top.walk_mut(&mut |block| {
            let specs = specs_for(&block.kind).collect::<Vec<_>>();
            for spec in specs {
                let Some(current) = block.fields.get(spec.field) else {
                    continue;
                };
                let sanitized = spec.sanitize(current);
                if &sanitized != current {
                    log::warn!(
                        "sanitized field {} of block '{}' ({}): {} -> {}",
                        spec.field,
                        block.id,
                        block.kind,
                        current,
                        sanitized
                    );
                    block.fields.insert(spec.field.to_string(), sanitized);
                    changed += 1;
                }
            }
        });
    }
    changed
}
