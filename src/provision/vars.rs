//! Rendering of `-var` command-line values
//!
//! Terraform parses `-var name=value` as a raw string for string variables
//! and as an HCL expression for everything else.

use serde_json::Value;

/// Format one variable as the `name=value` argument that follows `-var`
pub fn format_var(name: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("{name}={s}"),
        other => format!("{name}={}", hcl_expr(other)),
    }
}

/// Render a JSON value as an HCL expression
fn hcl_expr(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // JSON string escaping is a valid HCL quoted string
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(hcl_expr).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{} = {}", Value::String(k.clone()), hcl_expr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}
