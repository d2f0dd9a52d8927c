//! Template interpolation
//!
//! Handles `{{ variable }}` interpolation in pipeline configuration and
//! endpoint paths. `{{ env.NAME }}` reads the process environment, any
//! other path is looked up in the context variables (e.g. `{{ id }}` in a
//! detail path).

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}")
        .unwrap_or_else(|e| panic!("invalid template regex: {e}"))
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Environment variables, addressed as `env.NAME`
    pub env: HashMap<String, String>,
    /// Additional context variables
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the current process environment
    pub fn from_env() -> Self {
        Self {
            env: std::env::vars().collect(),
            vars: Value::Null,
        }
    }

    /// Set additional variables
    #[must_use]
    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = vars;
        self
    }

    /// Set one environment entry
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve a variable path to its string form
    pub fn get(&self, path: &str) -> Option<String> {
        if let Some(name) = path.strip_prefix("env.") {
            return self.env.get(name).cloned();
        }

        let mut current = &self.vars;
        for part in path.split('.') {
            match current {
                Value::Object(map) => current = map.get(part)?,
                _ => return None,
            }
        }
        Some(value_to_string(current))
    }
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let var_path = &caps[1];
        ctx.get(var_path).unwrap_or_else(|| {
            missing.push(var_path.to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render only `{{ env.NAME }}` placeholders, leaving the others in place
pub fn render_env(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let var_path = &caps[1];
        if !var_path.starts_with("env.") {
            return caps[0].to_string();
        }
        ctx.get(var_path).unwrap_or_else(|| {
            missing.push(var_path.to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Resolve environment placeholders in all string values of a JSON value
pub fn render_env_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) if has_templates(s) => Ok(Value::String(render_env(s, ctx)?)),
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                new_map.insert(k.clone(), render_env_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> =
                arr.iter().map(|v| render_env_value(v, ctx)).collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}
