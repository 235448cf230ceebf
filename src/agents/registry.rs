//! Agent registry: name → agent lookup with a designated default.
//!
//! Built once at startup after all agents and skills are constructed;
//! read-only thereafter.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::agents::Agent;
use crate::errors::{ChatbotError, Result};

/// Minimum keyword vocabulary per agent
const MIN_KEYWORDS: usize = 3;

/// Named collection of agents with a designated fallback
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
    /// Registration order, for deterministic iteration
    order: Vec<String>,
    default_agent: String,
}

impl AgentRegistry {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self { agents: HashMap::new(), order: Vec::new(), default_agent: default_agent.into() }
    }

    /// Register an agent, validating its name and keyword vocabulary
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name();
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ChatbotError::RegistryError(format!(
                "agent name '{name}' must be non-empty lowercase [a-z0-9_]"
            )));
        }
        if self.agents.contains_key(name) {
            return Err(ChatbotError::RegistryError(format!(
                "agent name '{name}' already registered"
            )));
        }
        if agent.keywords().len() < MIN_KEYWORDS {
            return Err(ChatbotError::RegistryError(format!(
                "agent '{name}' declares fewer than {MIN_KEYWORDS} keywords"
            )));
        }

        info!(agent = name, domain = %agent.domain(), "registered agent");
        self.order.push(name.to_string());
        self.agents.insert(name.to_string(), agent);
        Ok(())
    }

    /// Final check after all registrations: the default must exist
    pub fn validate(&self) -> Result<()> {
        if !self.agents.contains_key(&self.default_agent) {
            return Err(ChatbotError::RegistryError(format!(
                "default agent '{}' is not registered",
                self.default_agent
            )));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// All agents in registration order
    pub fn all(&self) -> Vec<Arc<dyn Agent>> {
        self.order.iter().filter_map(|name| self.agents.get(name).cloned()).collect()
    }

    pub fn default_agent_name(&self) -> &str {
        &self.default_agent
    }

    pub fn default_agent(&self) -> Option<Arc<dyn Agent>> {
        self.agents.get(&self.default_agent).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests_support::test_core;
    use crate::agents::{BookAgent, GlossaryAgent, HardwareAgent};

    fn registry_with(agents: Vec<Arc<dyn Agent>>) -> AgentRegistry {
        let mut registry = AgentRegistry::new("book");
        for agent in agents {
            registry.register(agent).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry_with(vec![
            Arc::new(GlossaryAgent::new(test_core())),
            Arc::new(BookAgent::new(test_core())),
        ]);
        assert!(registry.validate().is_ok());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("glossary").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.default_agent().unwrap().name(), "book");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = AgentRegistry::new("book");
        registry.register(Arc::new(GlossaryAgent::new(test_core()))).unwrap();
        let result = registry.register(Arc::new(GlossaryAgent::new(test_core())));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_default_rejected() {
        let registry = registry_with(vec![Arc::new(HardwareAgent::new(test_core()))]);
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_iteration_order_is_registration_order() {
        let registry = registry_with(vec![
            Arc::new(HardwareAgent::new(test_core())),
            Arc::new(GlossaryAgent::new(test_core())),
            Arc::new(BookAgent::new(test_core())),
        ]);
        let names: Vec<&str> = registry.all().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["hardware", "glossary", "book"]);
    }
}
