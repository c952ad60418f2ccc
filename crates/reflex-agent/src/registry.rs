//! Name → tool lookup with cached argument validators

use std::{collections::HashMap, future::Future, sync::Arc};

use reflex_ai::ToolDefinition;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    tool::{BoxedTool, FnTool, ToolError, to_definition},
};

struct Entry {
    tool: BoxedTool,
    validator: Option<Arc<jsonschema::Validator>>,
}

/// Registered tools, in registration order.
///
/// Built once during setup and then shared read-only (behind `Arc`) by any
/// number of concurrent runs.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken.
    pub fn register(&mut self, tool: BoxedTool) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }

        let schema = tool.parameters_schema();
        let validator = match jsonschema::validator_for(&schema) {
            Ok(validator) => Some(Arc::new(validator)),
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    name,
                    e
                );
                None
            }
        };

        self.index.insert(name, self.entries.len());
        self.entries.push(Entry { tool, validator });
        Ok(())
    }

    /// Register an async closure as a tool
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        f: F,
    ) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        self.register(Arc::new(FnTool::new(name, description, schema, f)))
    }

    pub fn resolve(&self, name: &str) -> Result<BoxedTool> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.entries[i].tool))
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions for every tool, in registration order
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .map(|e| to_definition(e.tool.as_ref()))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check arguments against the tool's schema.
    /// Returns `Some(error_message)` if validation fails.
    pub fn validate(&self, name: &str, args: &Value) -> Option<String> {
        let validator = self
            .index
            .get(name)
            .and_then(|&i| self.entries[i].validator.as_deref())?;
        validate_with_validator(args, validator)
    }
}

fn validate_with_validator(args: &Value, validator: &jsonschema::Validator) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
