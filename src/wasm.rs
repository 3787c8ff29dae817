use crate::block::Workspace;
use crate::bundle::{Credentials, DEFAULT_TEMPLATE};
use crate::Target;
use serde_json::Value;
use wasm_bindgen::prelude::*;

fn to_js_error(e: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", e))
}

#[wasm_bindgen]
pub fn generate_python(workspace_json: &str) -> Result<String, JsValue> {
    crate::compile_workspace_source(workspace_json, Target::Python).map_err(to_js_error)
}

#[wasm_bindgen]
pub fn generate_javascript(workspace_json: &str) -> Result<String, JsValue> {
    crate::compile_workspace_source(workspace_json, Target::JavaScript).map_err(to_js_error)
}

/// An empty `template` selects the built-in firmware.
#[wasm_bindgen]
pub fn assemble_bundle(
    template: &str,
    workspace_json: &str,
    challenge_json: &str,
    wifi_ssid: &str,
    wifi_password: &str,
    room_id: &str,
) -> Result<String, JsValue> {
    let workspace = Workspace::from_json_str(workspace_json).map_err(to_js_error)?;
    let challenge: Value = crate::workspace::parse_json(challenge_json)
        .map_err(|e| JsValue::from_str(&format!("Challenge is not valid JSON: {}.", e)))?;
    let template = if template.trim().is_empty() {
        DEFAULT_TEMPLATE
    } else {
        template
    };
    let credentials = Credentials {
        network_name: wifi_ssid.to_string(),
        network_secret: wifi_password.to_string(),
        session_id: room_id.to_string(),
    };
    crate::build_firmware_bundle(template, &workspace, &challenge, &credentials)
        .map(|bundle| bundle.text)
        .map_err(to_js_error)
}
