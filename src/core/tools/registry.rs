use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Boxed error type returned by tool handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type AsyncHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<String, BoxError>> + Send>> + Send + Sync>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the tool registry.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    /// The tool's parameter schema does not compile
    #[error("Invalid parameter schema for tool '{name}': {message}")]
    InvalidSchema { name: String, message: String },

    /// No tool with this name exists
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments do not satisfy the declared schema
    #[error("Invalid arguments for tool '{name}': {message}")]
    Validation { name: String, message: String },

    /// The handler itself failed
    #[error("Tool '{name}' failed: {source}")]
    Execution {
        name: String,
        #[source]
        source: BoxError,
    },
}

impl ToolError {
    /// Short machine-readable kind, reported to the backend.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "duplicate_name",
            Self::InvalidSchema { .. } => "invalid_schema",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation { .. } => "validation_error",
            Self::Execution { .. } => "execution_error",
        }
    }

    /// Structured tool-error result sent back to the backend in place of a
    /// normal tool output.
    pub fn to_tool_output(&self) -> String {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
        .to_string()
    }
}

// =============================================================================
// Tool Definition
// =============================================================================

/// A named, schema-validated action the backend may invoke.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    parameters: Value,
    handler: AsyncHandler,
}

impl ToolDefinition {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Description exported to the backend for tool selection.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a tool, without its handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// =============================================================================
// Registry
// =============================================================================

struct RegisteredTool {
    definition: ToolDefinition,
    validator: Validator,
}

/// Registry of tools available to every session.
///
/// Tools are registered once at startup through `&mut self`; the registry is
/// then shared behind an `Arc`, which makes it read-only for the rest of the
/// process and safe to invoke concurrently from many sessions.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. The parameter schema is compiled here so invalid
    /// schemas fail at startup rather than on first use.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        if self.tools.contains_key(definition.name()) {
            return Err(ToolError::DuplicateName(definition.name().to_string()));
        }

        let validator = Validator::new(definition.parameters()).map_err(|e| ToolError::InvalidSchema {
            name: definition.name().to_string(),
            message: e.to_string(),
        })?;

        let name = definition.name().to_string();
        self.order.push(name.clone());
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                validator,
            },
        );
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_tool(mut self, definition: ToolDefinition) -> Result<Self, ToolError> {
        self.register(definition)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool specs in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition.spec())
            .collect()
    }

    /// Validates `args` against the tool's schema, then runs its handler.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let violations: Vec<String> = tool.validator.iter_errors(&args).map(|e| e.to_string()).collect();
        if !violations.is_empty() {
            return Err(ToolError::Validation {
                name: name.to_string(),
                message: violations.join("; "),
            });
        }

        let handler = tool.definition.handler.clone();
        handler(args).await.map_err(|source| ToolError::Execution {
            name: name.to_string(),
            source,
        })
    }

    /// Like [`invoke`](Self::invoke), for arguments still encoded as a JSON
    /// string, which is how the backend delivers them.
    pub async fn invoke_raw(&self, name: &str, raw_args: &str) -> Result<String, ToolError> {
        if !self.contains(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let args = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw_args).map_err(|e| ToolError::Validation {
                name: name.to_string(),
                message: format!("arguments are not valid JSON: {e}"),
            })?
        };

        self.invoke(name, args).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.order).finish()
    }
}
