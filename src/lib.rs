pub mod block;
pub mod bundle;
pub mod generator;
pub mod javascript;
pub mod mutator;
pub mod python;
pub mod validate;
pub mod workspace;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::{anyhow, Context, Result};
use block::Workspace;
use bundle::{Bundle, BundleAssembler, Credentials};
use generator::RuleRegistry;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Target {
    #[default]
    #[value(alias = "py")]
    Python,
    #[value(name = "javascript", alias = "js")]
    JavaScript,
}

pub fn registry_for(target: Target) -> RuleRegistry {
    match target {
        Target::Python => python::registry(),
        Target::JavaScript => javascript::registry(),
    }
}

pub fn generate(workspace: &Workspace, target: Target) -> String {
    registry_for(target).generate(workspace)
}

pub fn compile_workspace_source(source: &str, target: Target) -> Result<String> {
    let workspace = Workspace::from_json_str(source)?;
    Ok(generate(&workspace, target))
}

/// Compiles the routine body, renders `challenge` and splices both into `template`.
pub fn build_firmware_bundle(
    template: &str,
    workspace: &Workspace,
    challenge: &Value,
    credentials: &Credentials,
) -> Result<Bundle> {
    let assembler = BundleAssembler::new(template)?;
    let routine = bundle::build_routine(&bundle::routine_body(workspace));
    let config = bundle::json_to_literal(challenge);
    Ok(assembler.assemble(&routine, &config, credentials))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    if !args.bundle && (args.template.is_some() || args.challenge.is_some()) {
        anyhow::bail!("--template and --challenge require --bundle.");
    }
    if args.bundle && args.target != Target::Python {
        anyhow::bail!("--bundle only supports the python target.");
    }

    let total_stages = 3 + usize::from(args.sanitize) + usize::from(args.bundle);
    let progress = CliProgress::new(if args.bundle { "Bundle" } else { "Compile" }, total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.workspace)?;

    stage += 1;
    progress.emit(stage, "Loading workspace");
    let source = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read '{}'.", input.display()))?;
    let mut workspace = Workspace::from_json_str(&source)
        .with_context(|| format!("Failed to load workspace '{}'.", input.display()))?;

    if args.sanitize {
        stage += 1;
        progress.emit(stage, "Sanitizing fields");
        let changed = validate::sanitize_workspace(&mut workspace);
        log::info!("sanitized {} field(s)", changed);
    }

    let report = validate::validate_workspace(&workspace);
    for issue in &report.issues {
        eprintln!("warning: {}", issue);
    }
    if args.check {
        if !report.is_clean() {
            anyhow::bail!(
                "Workspace has {} invalid field(s).",
                report.issues.len()
            );
        }
        return Ok(());
    }

    let text = if args.bundle {
        stage += 1;
        progress.emit(stage, "Reading template and challenge");
        let template = match &args.template {
            Some(path) => std::fs::read_to_string(canonicalize_file(path)?)
                .with_context(|| format!("Failed to read template '{}'.", path.display()))?,
            None => bundle::DEFAULT_TEMPLATE.to_string(),
        };
        let challenge = match &args.challenge {
            Some(path) => read_challenge(path)?,
            None => Value::Object(Default::default()),
        };

        stage += 1;
        progress.emit(stage, "Assembling firmware bundle");
        let bundle = build_firmware_bundle(&template, &workspace, &challenge, &args.credentials())?;
        bundle.text
    } else {
        stage += 1;
        progress.emit(stage, "Generating code");
        generate(&workspace, args.target)
    };

    match &args.output {
        Some(output) => std::fs::write(output, text.as_bytes())
            .with_context(|| format!("Failed to write '{}'.", output.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn read_challenge(path: &Path) -> Result<Value> {
    let path = canonicalize_file(path)?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read challenge '{}'.", path.display()))?;
    let value = workspace::parse_json(&raw)
        .with_context(|| format!("Challenge '{}' is not valid JSON.", path.display()))?;
    if !value.is_object() {
        return Err(anyhow!(
            "Challenge '{}' must be a JSON object.",
            path.display()
        ));
    }
    Ok(value)
}

pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        let step = step.clamp(1, self.total);
        let bar = render_progress_bar(step, self.total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, self.total, bar
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"{"blocks":{"languageVersion":0,"blocks":[
      {"type":"ottobit_start","next":{"block":{
        "type":"ottobit_move_forward","fields":{"STEPS":2},
        "next":{"block":{"type":"ottobit_if","inputs":{"DO":{"block":{
          "type":"ottobit_move_forward","fields":{"STEPS":1}}}}}}}}}
    ]}}"#;

    #[test]
    fn compiles_both_targets_from_json() {
        let py = compile_workspace_source(PROGRAM, Target::Python).unwrap();
        assert!(py.ends_with("motor.Move(2, 1, 2)\nif False:\n    motor.Move(1, 1, 2)\n"));
        let js = compile_workspace_source(PROGRAM, Target::JavaScript).unwrap();
        assert_eq!(
            js,
            "start();\nmoveForward(2);\nif (false) {\n  moveForward(1);\n}\n"
        );
    }

    #[test]
    fn long_programs_compile() {
        let links = 200;
        let mut source = String::from(r#"[{"type":"ottobit_start","next":{"block":"#);
        for _ in 0..links - 1 {
            source.push_str(r#"{"type":"ottobit_move_forward","fields":{"STEPS":1},"next":{"block":"#);
        }
        source.push_str(r#"{"type":"ottobit_move_forward","fields":{"STEPS":1}}"#);
        for _ in 0..links {
            source.push_str("}}");
        }
        source.push(']');
        let py = compile_workspace_source(&source, Target::Python).unwrap();
        assert_eq!(py.matches("motor.Move(1, 1, 2)\n").count(), links);
    }

    #[test]
    fn oversized_else_if_count_still_compiles() {
        let source = r#"[{"type":"ottobit_if_expandable","extraState":{"elseif":100000000000000000,"else":0}}]"#;
        let py = compile_workspace_source(source, Target::Python).unwrap();
        assert_eq!(
            py.matches("elif False:").count(),
            mutator::MAX_ELSEIF_COUNT
        );
    }

    #[test]
    fn invalid_workspace_is_an_error() {
        assert!(compile_workspace_source("{}", Target::Python).is_err());
    }

    #[test]
    fn bundle_inlines_the_start_chain() {
        let ws = Workspace::from_json_str(PROGRAM).unwrap();
        let challenge = serde_json::json!({"minCards": 2});
        let bundle = build_firmware_bundle(
            bundle::DEFAULT_TEMPLATE,
            &ws,
            &challenge,
            &Credentials::default(),
        )
        .unwrap();
        assert!(bundle.skipped.is_empty());
        assert!(bundle.text.contains("challengeJson = {\"minCards\": 2}\n"));
        assert!(bundle.text.contains(
            "    startSound()\n    forward(2)\n    if False:\n        forward(1)\n    if _check_victory():\n"
        ));
        assert!(!bundle.text.contains("    from ottomotor"));
        assert!(bundle.text.contains("WIFI_SSID = \"Your WiFi SSID\""));
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(render_progress_bar(1, 2, 4), "[==--]");
        assert_eq!(render_progress_bar(3, 3, 4), "[====]");
    }
}
