//! Closed registry of tools available to the model.

use std::collections::HashMap;
use std::sync::Arc;

use super::arguments::ToolArguments;
use super::outcome::ToolOutcome;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolDefinition;
use super::validation::validate_arguments;
use crate::error::EncoreError;
use crate::types::ToolCall;

/// Name-indexed set of tools. Built once, read concurrently.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are a configuration error.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), EncoreError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(EncoreError::Configuration(format!(
                "tool '{name}' registered twice"
            )));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self, EncoreError> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declared schemas, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Status label for a pending call.
    pub fn status_label(&self, call: &ToolCall) -> String {
        match self.tools.get(&call.name) {
            Some(tool) => tool.status_label(&ToolArguments::new(call.arguments.clone())),
            None => format!("Running {}", call.name),
        }
    }

    /// Execute a call. Never fails: every problem becomes an error outcome.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested unknown tool");
            return ToolOutcome::error(EncoreError::UnknownTool(call.name.clone()).to_string());
        };

        let args = ToolArguments::new(call.arguments.clone());
        if let Err(reason) = validate_arguments(args.raw(), &tool.parameters().schema) {
            tracing::warn!(tool = %call.name, %reason, "tool arguments failed validation");
            return ToolOutcome::error(format!("Invalid arguments for {}: {reason}", call.name));
        }

        let ctx = ToolExecutionContext {
            call_id: Some(call.id.clone()),
            ..ctx.clone()
        };
        match tool.execute(&args, &ctx).await {
            Ok(value) => ToolOutcome::success(value),
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "tool execution failed");
                ToolOutcome::error(err.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
