//! Tool registry — two-tier name→handler table.
//!
//! Local handlers ship with the extension; domain-provided handlers are
//! installed at call start for pages whose owner registered custom tools.
//! Local names win on collision so a page can never shadow a built-in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{ToolHandler, ToolNamespace};

/// Name→handler table with local and domain-provided tiers.
#[derive(Default)]
pub struct ToolRegistry {
    local: HashMap<String, Arc<dyn ToolHandler>>,
    domain: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in handler. Replaces any previous local handler
    /// with the same name.
    pub fn register_local(&mut self, handler: Arc<dyn ToolHandler>) {
        let _ = self.local.insert(handler.name().to_string(), handler);
    }

    /// Register a domain-provided handler. Names shadowed by a local
    /// handler are still stored but never resolved.
    pub fn register_domain(&mut self, handler: Arc<dyn ToolHandler>) {
        let _ = self.domain.insert(handler.name().to_string(), handler);
    }

    /// Drop all domain-provided handlers (page navigated away).
    pub fn clear_domain(&mut self) {
        self.domain.clear();
    }

    /// Which namespace a name resolves in.
    pub fn resolve(&self, name: &str) -> ToolNamespace {
        if self.local.contains_key(name) {
            ToolNamespace::Local
        } else if self.domain.contains_key(name) {
            ToolNamespace::DomainProvided
        } else {
            ToolNamespace::Unknown
        }
    }

    /// Look up a handler, local tier first.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.local
            .get(name)
            .or_else(|| self.domain.get(name))
            .cloned()
    }

    /// Registered names, local tier first. For diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.local.keys().map(String::as_str).collect();
        names.extend(
            self.domain
                .keys()
                .map(String::as_str)
                .filter(|n| !self.local.contains_key(*n)),
        );
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StaticTool;
    use halo_core::tools::ToolEnvelope;

    #[test]
    fn local_wins_over_domain() {
        let mut registry = ToolRegistry::new();
        registry.register_domain(Arc::new(StaticTool::new(
            "click_element",
            ToolEnvelope::err("domain"),
        )));
        registry.register_local(Arc::new(StaticTool::new(
            "click_element",
            ToolEnvelope::ok(),
        )));

        assert_eq!(registry.resolve("click_element"), ToolNamespace::Local);
        let handler = registry.get("click_element").unwrap();
        assert_eq!(handler.name(), "click_element");
    }

    #[test]
    fn unknown_name_resolves_unknown() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.resolve("nope"), ToolNamespace::Unknown);
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn clear_domain_keeps_local() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Arc::new(StaticTool::new("a", ToolEnvelope::ok())));
        registry.register_domain(Arc::new(StaticTool::new("b", ToolEnvelope::ok())));
        registry.clear_domain();
        assert_eq!(registry.resolve("a"), ToolNamespace::Local);
        assert_eq!(registry.resolve("b"), ToolNamespace::Unknown);
    }
}
