use crate::block::{Block, Workspace};
use std::collections::HashMap;

/// Binding strength of an emitted expression; lower binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order(pub u16);

impl Order {
    pub const ATOMIC: Order = Order(0);
    pub const NONE: Order = Order(990);
}

/// Surface syntax shared by every rule of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub name: &'static str,
    pub indent: &'static str,
    pub true_literal: &'static str,
    pub false_literal: &'static str,
    pub comment_prefix: &'static str,
    pub statement_terminator: &'static str,
    pub noop_statement: &'static str,
}

pub type StatementRule = fn(&mut Emitter<'_>, &Block) -> String;
pub type ExpressionRule = fn(&mut Emitter<'_>, &Block) -> (String, Order);

#[derive(Clone, Copy)]
pub enum Rule {
    Statement(StatementRule),
    Expression(ExpressionRule),
}

/// Emission rules of one target, keyed by block type. Built once and shared by
/// reference with every compile.
#[derive(Clone)]
pub struct RuleRegistry {
    language: Language,
    rules: HashMap<String, Rule>,
    aliases: HashMap<String, String>,
}

impl RuleRegistry {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            rules: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn statement(&mut self, kind: &str, rule: StatementRule) -> &mut Self {
        self.rules.insert(kind.to_string(), Rule::Statement(rule));
        self
    }

    pub fn expression(&mut self, kind: &str, rule: ExpressionRule) -> &mut Self {
        self.rules.insert(kind.to_string(), Rule::Expression(rule));
        self
    }

    /// Registers `legacy_prefix + rest` as an alias of every `prefix + rest` rule.
    pub fn alias_prefix(&mut self, legacy_prefix: &str, prefix: &str) -> &mut Self {
        let kinds = self
            .rules
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect::<Vec<_>>();
        for kind in kinds {
            let legacy = format!("{}{}", legacy_prefix, &kind[prefix.len()..]);
            if !self.rules.contains_key(&legacy) {
                self.aliases.insert(legacy, kind);
            }
        }
        self
    }

    pub fn rule(&self, kind: &str) -> Option<Rule> {
        if let Some(rule) = self.rules.get(kind) {
            return Some(*rule);
        }
        let target = self.aliases.get(kind)?;
        self.rules.get(target).copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.rule(kind).is_some()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds = self.rules.keys().map(String::as_str).collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds
    }

    /// Source text for every top-level chain, in workspace order.
    pub fn generate(&self, workspace: &Workspace) -> String {
        let mut emitter = Emitter::new(self);
        let mut parts = Vec::new();
        for top in &workspace.top_blocks {
            let code = emitter.chain_to_code(top);
            if !code.trim().is_empty() {
                parts.push(code);
            }
        }
        tidy(&parts.join("\n"))
    }

    /// Source text for one chain, without workspace-level tidying.
    pub fn generate_chain(&self, head: &Block) -> String {
        Emitter::new(self).chain_to_code(head)
    }
}

/// Per-compile state handed to every rule.
pub struct Emitter<'r> {
    registry: &'r RuleRegistry,
    loop_vars: usize,
}

impl<'r> Emitter<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            loop_vars: 0,
        }
    }

    pub fn language(&self) -> &'r Language {
        &self.registry.language
    }

    /// Name for a loop counter the user did not name. Unique within one compile.
    pub fn fresh_loop_var(&mut self, prefix: &str) -> String {
        self.loop_vars += 1;
        format!("{}{}", prefix, self.loop_vars)
    }

    /// Code for a single statement, ignoring its `next` link.
    pub fn block_to_code(&mut self, block: &Block) -> String {
        if !block.enabled {
            return String::new();
        }
        let language = self.language();
        match self.registry.rule(&block.kind) {
            Some(Rule::Statement(rule)) => rule(self, block),
            Some(Rule::Expression(rule)) => {
                let (code, _) = rule(self, block);
                format!("{}{}\n", code, language.statement_terminator)
            }
            None => {
                log::warn!(
                    "no {} rule for block type '{}' (block '{}')",
                    language.name,
                    block.kind,
                    block.id
                );
                unknown_marker(language, &block.kind)
            }
        }
    }

    pub fn chain_to_code(&mut self, head: &Block) -> String {
        let mut code = String::new();
        for block in head.chain() {
            code.push_str(&self.block_to_code(block));
        }
        code
    }

    /// Indented code of the chain plugged into statement socket `socket`.
    pub fn statement_to_code(&mut self, block: &Block, socket: &str) -> String {
        let Some(head) = block.input(socket) else {
            return String::new();
        };
        let code = self.chain_to_code(head);
        self.indent(&code)
    }

    pub fn indent(&self, code: &str) -> String {
        let prefix = self.language().indent;
        let mut out = String::with_capacity(code.len());
        for line in code.split_inclusive('\n') {
            if !line.trim().is_empty() {
                out.push_str(prefix);
            }
            out.push_str(line);
        }
        out
    }

    /// Code of the expression in value socket `socket`, parenthesized when it
    /// binds looser than `slot`. `None` when the socket is empty or unusable.
    pub fn value_to_code(&mut self, block: &Block, socket: &str, slot: Order) -> Option<String> {
        let child = block.input(socket)?;
        if !child.enabled {
            return None;
        }
        match self.registry.rule(&child.kind) {
            Some(Rule::Expression(rule)) => {
                let (code, order) = rule(self, child);
                if code.is_empty() {
                    None
                } else if order > slot {
                    Some(format!("({})", code))
                } else {
                    Some(code)
                }
            }
            Some(Rule::Statement(_)) => {
                log::warn!(
                    "statement block '{}' plugged into value socket {} of '{}'",
                    child.kind,
                    socket,
                    block.kind
                );
                None
            }
            None => {
                log::warn!(
                    "no {} rule for block type '{}' in socket {} of '{}'",
                    self.language().name,
                    child.kind,
                    socket,
                    block.kind
                );
                None
            }
        }
    }

    pub fn value_or(&mut self, block: &Block, socket: &str, slot: Order, default: &str) -> String {
        self.value_to_code(block, socket, slot)
            .unwrap_or_else(|| default.to_string())
    }

    /// Argument that may be a plugged-in expression or a plain field of the same name.
    pub fn arg(&mut self, block: &Block, name: &str, slot: Order, default: &str) -> String {
        match self.value_to_code(block, name, slot) {
            Some(code) => code,
            None => block.field_or(name, default),
        }
    }

    pub fn condition(&mut self, block: &Block, socket: &str) -> String {
        let false_literal = self.language().false_literal;
        self.value_or(block, socket, Order::NONE, false_literal)
    }
}

fn unknown_marker(language: &Language, kind: &str) -> String {
    if language.noop_statement.is_empty() {
        format!("{} unknown block: {}\n", language.comment_prefix, kind)
    } else {
        format!(
            "{}  {} unknown block: {}\n",
            language.noop_statement, language.comment_prefix, kind
        )
    }
}

/// Strips trailing blanks from lines and collapses leading/trailing blank lines.
pub fn tidy(code: &str) -> String {
    let lines = code.lines().map(str::trim_end).collect::<Vec<_>>();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => {
            let mut out = lines[start..=end].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}

pub fn comparison_operator(token: &str) -> &'static str {
    match token {
        "NEQ" => "!=",
        "LT" => "<",
        "LTE" => "<=",
        "GT" => ">",
        "GTE" => ">=",
        _ => "==",
    }
}

pub fn is_equality_token(token: &str) -> bool {
    matches!(token, "EQ" | "NEQ")
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Single-quoted string literal valid in both targets.
pub fn quote_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Numeric literal plus one, or an addition when `value` is not a literal.
pub fn plus_one(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => crate::block::format_num(n + 1.0),
        _ => format!("{} + 1", value),
    }
}
