//! Tool Registry & Resolver (C1): `namespace.short_name` lookup plus
//! deterministic short-alias resolution (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use crate::contracts::UserContext;
use crate::error::{CoreError, CoreResult};
use crate::tools::context::{Tool, ToolDescriptor, ToolSource};

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.full_name(), tool);
        self
    }

    pub fn find(&self, full_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(full_name).cloned()
    }

    /// Resolves a short alias (no `.`) to a full name, preferring built-in
    /// tools, then by namespace lexical order (spec §4.1 "Tool Registry").
    pub fn resolve_alias(&self, short_name: &str) -> Option<String> {
        let mut matches: Vec<&Arc<dyn Tool>> = self
            .tools
            .values()
            .filter(|t| t.short_name() == short_name)
            .collect();
        if matches.is_empty() {
            return None;
        }
        matches.sort_by(|a, b| {
            let a_builtin = matches!(a.descriptor().source, ToolSource::BuiltIn);
            let b_builtin = matches!(b.descriptor().source, ToolSource::BuiltIn);
            b_builtin
                .cmp(&a_builtin)
                .then_with(|| a.namespace().cmp(b.namespace()))
        });
        Some(matches[0].full_name())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Resolves symbolic tool names (either `namespace.tool` or a bare
    /// alias) to concrete descriptors, applying permission checks.
    pub fn resolve_tools(
        &self,
        names: &[String],
        user_context: &UserContext,
    ) -> CoreResult<Vec<ToolDescriptor>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let full_name = if name.contains('.') {
                name.clone()
            } else {
                self.resolve_alias(name)
                    .ok_or_else(|| CoreError::ToolNotDeclared {
                        tool_full_name: name.clone(),
                    })?
            };
            let tool = self
                .find(&full_name)
                .ok_or_else(|| CoreError::ToolNotDeclared {
                    tool_full_name: full_name.clone(),
                })?;
            if !is_permitted(&full_name, user_context) {
                return Err(CoreError::ToolUnauthorized {
                    tool_full_name: full_name,
                });
            }
            out.push(tool.descriptor());
        }
        Ok(out)
    }
}

fn is_permitted(full_name: &str, user_context: &UserContext) -> bool {
    match user_context.permissions.get(full_name) {
        Some(v) => v.as_bool().unwrap_or(true),
        None => true,
    }
}
