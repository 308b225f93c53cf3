use crate::tool::{Tool, ToolMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Process-wide name→tool map, populated once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata for a subset of tools, in name order. Used to build the
    /// tool-schema section of an agent's system prompt.
    pub fn descriptors_for(&self, names: &[String]) -> Vec<ToolMetadata> {
        let mut metas: Vec<ToolMetadata> = self
            .tools
            .values()
            .filter(|t| names.iter().any(|n| n == &t.metadata().name))
            .map(|t| t.metadata().clone())
            .collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
