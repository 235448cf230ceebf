//! Query router: scores agents and decides single- vs multi-agent
//! execution.
//!
//! Routing is deterministic: identical queries always produce identical
//! route results. Ties among equal top scores break by a fixed domain
//! priority.

use std::sync::Arc;
use tracing::{debug, info};

use crate::agents::{Agent, AgentRegistry};
use crate::types::{AgentDomain, RouteResult};

/// Fixed tie-break priority among equal scores
const TIE_BREAK_PRIORITY: [AgentDomain; 4] = [
    AgentDomain::Glossary,
    AgentDomain::Hardware,
    AgentDomain::ModuleInfo,
    AgentDomain::Capstone,
];

/// Secondaries must sit within this many top ranks
const SECONDARY_RANK_WINDOW: usize = 3;

/// Routes queries to the appropriate agent(s)
pub struct QueryRouter {
    registry: Arc<AgentRegistry>,
    confidence_threshold: f32,
    secondary_topk: usize,
}

impl QueryRouter {
    pub fn new(registry: Arc<AgentRegistry>, confidence_threshold: f32, secondary_topk: usize) -> Self {
        Self { registry, confidence_threshold, secondary_topk }
    }

    /// Decide which agent(s) should handle the query.
    ///
    /// The fallback agent never competes; it is selected only when no
    /// specialist clears the confidence threshold.
    pub fn route(&self, query: &str) -> RouteResult {
        let default_name = self.registry.default_agent_name();

        let mut scored: Vec<(Arc<dyn Agent>, f32)> = self
            .registry
            .all()
            .into_iter()
            .filter(|agent| agent.name() != default_name)
            .map(|agent| {
                let score = agent.can_handle(query);
                debug!(agent = agent.name(), score, "scored query");
                (agent, score)
            })
            .collect();

        scored.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| priority_rank(a.domain()).cmp(&priority_rank(b.domain())))
                .then_with(|| a.name().cmp(b.name()))
        });

        let top_score = scored.first().map(|(_, score)| *score).unwrap_or(0.0);
        if top_score < self.confidence_threshold {
            info!(agent = default_name, confidence = top_score, "no agent cleared threshold");
            return RouteResult {
                primary_agent: default_name.to_string(),
                secondary_agents: Vec::new(),
                confidence: top_score,
                routing_reason: "no-match".to_string(),
                is_multi_domain: false,
            };
        }

        let (primary, primary_score) = &scored[0];
        let secondary_agents: Vec<String> = scored
            .iter()
            .take(SECONDARY_RANK_WINDOW)
            .skip(1)
            .filter(|(_, score)| *score >= self.confidence_threshold)
            .take(self.secondary_topk)
            .map(|(agent, _)| agent.name().to_string())
            .collect();

        let is_multi_domain = !secondary_agents.is_empty();
        info!(
            agent = primary.name(),
            confidence = primary_score,
            multi_domain = is_multi_domain,
            "routed query"
        );

        RouteResult {
            primary_agent: primary.name().to_string(),
            secondary_agents,
            confidence: *primary_score,
            routing_reason: format!(
                "keyword match: {} scored {primary_score:.2}",
                primary.name()
            ),
            is_multi_domain,
        }
    }

    /// Same decision function, exposed without execution
    pub fn preview(&self, query: &str) -> RouteResult {
        self.route(query)
    }

    /// Derive the scoped sub-query for a secondary agent: the original
    /// query restricted to tokens matching the agent's keyword
    /// vocabulary, falling back to the full query when nothing matches.
    pub fn derive_subquery(&self, query: &str, agent: &dyn Agent) -> String {
        let keyword_words: Vec<String> = agent
            .keywords()
            .iter()
            .flat_map(|kw| kw.to_lowercase().split_whitespace().map(String::from).collect::<Vec<_>>())
            .collect();

        let matched: Vec<&str> = query
            .split_whitespace()
            .filter(|token| {
                let token = token
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                !token.is_empty()
                    && keyword_words.iter().any(|word| {
                        *word == token || token.strip_suffix('s') == Some(word.as_str())
                    })
            })
            .collect();

        if matched.is_empty() {
            query.to_string()
        } else {
            matched.join(" ")
        }
    }
}

fn priority_rank(domain: AgentDomain) -> usize {
    TIE_BREAK_PRIORITY
        .iter()
        .position(|d| *d == domain)
        .unwrap_or(TIE_BREAK_PRIORITY.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests_support::test_core;
    use crate::agents::{BookAgent, CapstoneAgent, GlossaryAgent, HardwareAgent, ModuleInfoAgent};

    fn router() -> QueryRouter {
        let mut registry = AgentRegistry::new("book");
        registry.register(Arc::new(GlossaryAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(HardwareAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(ModuleInfoAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(CapstoneAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(BookAgent::new(test_core()))).unwrap();
        registry.validate().unwrap();
        QueryRouter::new(Arc::new(registry), 0.3, 2)
    }

    #[test]
    fn test_definition_query_routes_to_glossary_single_domain() {
        let route = router().route("What is a topic in ROS 2?");
        assert_eq!(route.primary_agent, "glossary");
        assert!(!route.is_multi_domain);
        assert!(route.secondary_agents.is_empty());
        assert!(route.confidence >= 0.3);
    }

    #[test]
    fn test_hardware_query_routes_to_hardware() {
        let route = router().route("What hardware do I need for NVIDIA Isaac simulations?");
        assert_eq!(route.primary_agent, "hardware");
    }

    #[test]
    fn test_cross_domain_query_is_multi() {
        let route = router().route("What sensors does Isaac use and what hardware do they require?");
        assert_eq!(route.primary_agent, "module_info");
        assert!(route.is_multi_domain);
        assert!(route.secondary_agents.contains(&"hardware".to_string()));
    }

    #[test]
    fn test_unknown_topic_falls_back_to_default() {
        let route = router().route("What is the recipe for chocolate cake?");
        assert_eq!(route.primary_agent, "book");
        assert!(route.confidence < 0.3);
        assert_eq!(route.routing_reason, "no-match");
        assert!(!route.is_multi_domain);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let router = router();
        let query = "What sensors does Isaac use and what hardware do they require?";
        let first = router.route(query);
        for _ in 0..5 {
            assert_eq!(router.route(query), first);
        }
    }

    #[test]
    fn test_secondaries_capped_by_topk() {
        let mut registry = AgentRegistry::new("book");
        registry.register(Arc::new(GlossaryAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(HardwareAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(ModuleInfoAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(CapstoneAgent::new(test_core()))).unwrap();
        registry.register(Arc::new(BookAgent::new(test_core()))).unwrap();
        let router = QueryRouter::new(Arc::new(registry), 0.3, 1);

        let route = router.route("What sensors does Isaac use and what hardware do they require?");
        assert!(route.secondary_agents.len() <= 1);
    }

    #[test]
    fn test_subquery_restricted_to_matching_tokens() {
        let router = router();
        let hardware = HardwareAgent::new(test_core());
        let sub = router.derive_subquery(
            "What sensors does Isaac use and what hardware do they require?",
            &hardware,
        );
        assert_eq!(sub, "sensors hardware");
    }

    #[test]
    fn test_subquery_falls_back_to_full_query() {
        let router = router();
        let capstone = CapstoneAgent::new(test_core());
        let query = "What is a digital twin?";
        assert_eq!(router.derive_subquery(query, &capstone), query);
    }
}
