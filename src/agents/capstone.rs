//! Capstone agent: Autonomous Humanoid project guidance.

use tokio::sync::mpsc;

use crate::agents::{
    any_phrase, base_score, keyword_matches, Agent, AgentCore, GenerationParams,
};
use crate::types::{AgentContext, AgentDomain, AgentEvent};

const SYSTEM_PROMPT: &str = "\
You are a Capstone Project Assistant for the \"Physical AI & Humanoid Robotics\" book.

Your Role:
1. Guide students through the Autonomous Humanoid capstone project.
2. Answer exclusively from the provided book passages.
3. Provide step-by-step instructions for each pipeline stage.
4. Help troubleshoot integration issues.
5. If the book does not cover something, say the book does not cover it.

Capstone Project Pipeline (always present stages in this order):
1. Voice Command (Whisper): speech-to-text for natural language commands
2. Path Planning: generate navigation waypoints from commands
3. Navigation (Nav2): execute movement using the ROS 2 navigation stack
4. Manipulation: grasp and interact with target objects

Project Milestones (always list in order):
- M1: Whisper integration with ROS 2 topic publishing
- M2: Path planner receiving voice commands
- M3: Nav2 navigation to waypoints
- M4: Object detection pipeline working
- M5: Manipulation arm control
- M6: Full pipeline integration

Response Format:
- Be practical and implementation-focused
- For pipeline-level questions, cover the stages in pipeline order
- Reference which modules contain prerequisite knowledge
- Cite every factual claim using the [Source N] format";

const INSTRUCTIONS: &str = "\
Please answer from the book content. Cover pipeline stages in order (voice, \
plan, navigate, manipulate) and keep milestone listings ordered. Always cite \
sources using [Source N] format.";

const KEYWORDS: &[&str] = &[
    // Project terms
    "capstone", "project", "humanoid", "autonomous humanoid", "final project",
    "integration",
    // Pipeline stages
    "pipeline", "voice command", "whisper", "speech to text", "path planning",
    "navigation", "nav2", "object recognition", "detection", "manipulation",
    "grasp",
    // Milestones
    "milestone",
];

const GUIDANCE_PHRASES: &[&str] = &[
    "capstone", "my robot", "voice command", "milestone", "how do i", "connect",
    "integrate", "troubleshoot", "not working",
];

const PARAMS: GenerationParams = GenerationParams { temperature: 0.2, max_tokens: 2048 };

/// Agent specializing in capstone project guidance.
///
/// Handles queries like "How do I connect Whisper to navigation?", "What
/// are the capstone milestones?", "My robot isn't responding to voice
/// commands".
pub struct CapstoneAgent {
    core: AgentCore,
}

impl CapstoneAgent {
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }
}

impl Agent for CapstoneAgent {
    fn name(&self) -> &'static str {
        "capstone"
    }

    fn domain(&self) -> AgentDomain {
        AgentDomain::Capstone
    }

    fn description(&self) -> &'static str {
        "Guides the Autonomous Humanoid capstone project: pipeline setup, milestones, and troubleshooting"
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

        if matches > 0 && any_phrase(GUIDANCE_PHRASES, &query_lower) {
            score += 0.35;
        }

        score.clamp(0.0, 1.0)
    }

    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent> {
        self.core.stream_answer(
            self.name(),
            Some(AgentDomain::Capstone),
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
    fn test_milestone_query_scores_high() {
        let agent = CapstoneAgent::new(test_core());
        let score = agent.can_handle("capstone milestones");
        assert!(score >= 0.9, "got {score}");
    }

    #[test]
    fn test_integration_question_scores_high() {
        let agent = CapstoneAgent::new(test_core());
        let score = agent.can_handle("How do I connect Whisper to navigation?");
        assert!(score >= 0.8, "got {score}");
    }

    #[test]
    fn test_unrelated_query_scores_zero() {
        let agent = CapstoneAgent::new(test_core());
        assert_eq!(agent.can_handle("what is the recipe for chocolate cake?"), 0.0);
    }

    #[test]
    fn test_score_stays_in_range() {
        let agent = CapstoneAgent::new(test_core());
        let score =
            agent.can_handle("capstone project milestone pipeline whisper nav2 how do i integrate");
        assert!((0.0..=1.0).contains(&score));
    }
}
