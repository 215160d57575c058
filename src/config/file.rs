//! File-based configuration sources: an environment-keyed YAML document
//! with `${VAR}` template expansion, and a secrets document exposing the
//! same fields under a namespaced section.

use std::path::Path;

use crate::error::{BridgeError, BridgeResult};

use super::ConfigOverlay;

/// Load the environment section of a config file. A missing file yields an
/// empty overlay (the file is a convention, not a requirement); unparsable
/// content is fatal. When the document has no section for `environment`,
/// the whole document is used.
pub(crate) fn load_config_file(path: &Path, environment: &str) -> BridgeResult<ConfigOverlay> {
    if !path.exists() {
        return Ok(ConfigOverlay::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|err| malformed(path, &err.to_string()))?;
    let expanded = expand_env(&raw);

    let doc: serde_yaml::Value =
        serde_yaml::from_str(&expanded).map_err(|err| malformed(path, &err.to_string()))?;
    let section = doc.get(environment).cloned().unwrap_or(doc);

    serde_yaml::from_value(section).map_err(|err| malformed(path, &err.to_string()))
}

/// Load the namespaced section of a secrets file. Missing file or missing
/// section yields an empty overlay; unparsable content is fatal.
pub(crate) fn load_secrets_file(path: &Path, namespace: &str) -> BridgeResult<ConfigOverlay> {
    if !path.exists() {
        return Ok(ConfigOverlay::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|err| malformed(path, &err.to_string()))?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|err| malformed(path, &err.to_string()))?;

    match doc.get(namespace) {
        Some(section) => serde_yaml::from_value(section.clone())
            .map_err(|err| malformed(path, &err.to_string())),
        None => Ok(ConfigOverlay::default()),
    }
}

fn malformed(path: &Path, detail: &str) -> BridgeError {
    BridgeError::MalformedConfiguration(format!("{}: {detail}", path.display()))
}

/// Expand `${VAR}` references against the process environment. Unset
/// variables expand to the empty string; an unterminated reference is left
/// as-is.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Ok(value) = std::env::var(name) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
