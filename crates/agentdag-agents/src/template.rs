use regex::Regex;

use agentdag_core::error::{DagError, Result};
use agentdag_core::types::{ChildResults, Params};

const PLACEHOLDER: &str = r"\{\{\s*\.?([A-Za-z0-9_\-]+)\s*\}\}";

/// Substitute `{{.name}}` / `{{ name }}` placeholders with child results.
///
/// A placeholder naming a value that is not present is an error rather than
/// an empty string.
pub fn render(template: &str, values: &ChildResults) -> Result<String> {
    let re = Regex::new(PLACEHOLDER).map_err(|e| DagError::Template(e.to_string()))?;

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = values.get(name.as_str()).ok_or_else(|| {
            DagError::Template(format!("unknown placeholder '{}'", name.as_str()))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Names referenced by a template, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let Ok(re) = Regex::new(PLACEHOLDER) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for caps in re.captures_iter(template) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Template strings a node's parameters carry: `template`, `promptTemplate`
/// and every `messages[].content`.
pub fn templates_in(params: &Params) -> Vec<&str> {
    let mut found: Vec<&str> = ["template", "promptTemplate"]
        .iter()
        .filter_map(|key| params.get(*key).and_then(|v| v.as_str()))
        .collect();
    if let Some(messages) = params.get("messages").and_then(|v| v.as_array()) {
        found.extend(
            messages
                .iter()
                .filter_map(|m| m.get("content").and_then(|c| c.as_str())),
        );
    }
    found
}

/// Placeholder names in `params` that are not among `children`.
pub fn unresolved<'a>(params: &Params, children: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let children: Vec<&str> = children.into_iter().collect();
    let mut missing = Vec::new();
    for text in templates_in(params) {
        for name in placeholders(text) {
            if !children.contains(&name.as_str()) && !missing.contains(&name) {
                missing.push(name);
            }
        }
    }
    missing
}
