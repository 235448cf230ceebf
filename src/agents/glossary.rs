//! Glossary agent: technical term definitions.

use tokio::sync::mpsc;

use crate::agents::{
    any_phrase, base_score, keyword_matches, Agent, AgentCore, GenerationParams,
};
use crate::types::{AgentContext, AgentDomain, AgentEvent};

const SYSTEM_PROMPT: &str = "\
You are a Glossary Assistant for the \"Physical AI & Humanoid Robotics\" book.

Your Role:
1. Provide clear, concise definitions for technical terms.
2. Answer exclusively from the provided book passages.
3. Include the module/context where the term is used.
4. If a term appears in multiple modules, explain each module's usage explicitly.
5. If a term is NOT in the book, say \"This term is not defined in this course.\"
6. Honor your scope: definitions only, not full tutorials.

Topics you cover (from the book):
- ROS 2: topics, nodes, services, actions, TF, URDF, messages
- Gazebo: digital twin, SDF, world files, plugins
- Isaac: perception, manipulation, simulation
- VLA: vision-language-action models, neural policies

Response Format:
- Start with a concise definition (1-2 sentences)
- Note which module(s) use the term
- Cite every factual claim using the [Source N] format";

const INSTRUCTIONS: &str = "\
Please provide a clear definition based on the book content. If this term is \
not in the book, say so clearly. Always cite sources using [Source N] format.";

/// Term vocabulary; definition patterns only boost when one of these matched
const KEYWORDS: &[&str] = &[
    // ROS 2 terms
    "topic", "node", "service", "action", "tf", "urdf", "message", "publisher",
    "subscriber", "launch file", "parameter", "lifecycle",
    // Gazebo terms
    "digital twin", "sdf", "world file", "plugin", "physics engine",
    // Isaac terms
    "perception", "manipulation", "isaac sim", "omniverse",
    // VLA terms
    "vla", "vision language", "neural policy", "imitation learning",
    // Sensor terms
    "imu", "lidar", "depth camera", "rgb camera", "encoder",
    // General robotics
    "kinematics", "dynamics", "trajectory", "control loop", "state estimation",
];

const DEFINITION_PHRASES: &[&str] = &[
    "what is a", "what is an", "what is the", "what is", "define ", "definition of",
    "meaning of", "what does", "what are", "explain the term",
];

const PARAMS: GenerationParams = GenerationParams { temperature: 0.0, max_tokens: 1024 };

/// Agent specializing in technical term definitions.
///
/// Handles queries like "What is a topic in ROS 2?", "Define digital
/// twin", "What does VLA stand for?".
pub struct GlossaryAgent {
    core: AgentCore,
}

impl GlossaryAgent {
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }
}

impl Agent for GlossaryAgent {
    fn name(&self) -> &'static str {
        "glossary"
    }

    fn domain(&self) -> AgentDomain {
        AgentDomain::Glossary
    }

    fn description(&self) -> &'static str {
        "Provides definitions for technical terms from the ROS 2, Gazebo, Isaac, and VLA modules"
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn can_handle(&self, query: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let matches = keyword_matches(KEYWORDS, &query_lower);
        let mut score = base_score(matches);

        // Definition phrasing is only a signal when a known term is
        // present; "what is the recipe for X" must not land here.
        if matches > 0 && any_phrase(DEFINITION_PHRASES, &query_lower) {
            score += 0.4;
        }
        if query_lower.contains("term") || query_lower.contains("glossary") {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent> {
        self.core.stream_answer(
            self.name(),
            Some(AgentDomain::Glossary),
            SYSTEM_PROMPT,
            INSTRUCTIONS,
            PARAMS,
            query,
            context,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests_support::test_core;

    #[test]
    fn test_definition_query_scores_high() {
        let agent = GlossaryAgent::new(test_core());
        let score = agent.can_handle("What is a topic in ROS 2?");
        assert!(score >= 0.7, "got {score}");
    }

    #[test]
    fn test_definition_phrasing_without_term_scores_zero() {
        let agent = GlossaryAgent::new(test_core());
        let score = agent.can_handle("What is the recipe for chocolate cake?");
        assert!(score < 0.3, "got {score}");
    }

    #[test]
    fn test_score_stays_in_range() {
        let agent = GlossaryAgent::new(test_core());
        let score = agent.can_handle(
            "define the topic node service action urdf tf glossary term meaning of",
        );
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_deterministic() {
        let agent = GlossaryAgent::new(test_core());
        let a = agent.can_handle("define VLA");
        let b = agent.can_handle("define VLA");
        assert_eq!(a, b);
    }
}
