//! Module-info agent: in-depth explanations of book module concepts.

use tokio::sync::mpsc;

use crate::agents::{
    any_phrase, base_score, keyword_matches, Agent, AgentCore, GenerationParams,
};
use crate::types::{AgentContext, AgentDomain, AgentEvent};

const SYSTEM_PROMPT: &str = "\
You are a Module Explanation Assistant for the \"Physical AI & Humanoid Robotics\" book.

Your Role:
1. Explain concepts from each book module in depth.
2. Answer exclusively from the provided book passages.
3. Provide step-by-step explanations when appropriate.
4. Cross-reference related concepts across modules.
5. If the book does not cover something, say the book does not cover it.

Book Modules:
- Module 1: ROS 2 Fundamentals (nodes, topics, services, actions, TF, URDF)
- Module 2: Gazebo & Unity Simulation (digital twins, physics, sensors)
- Module 3: NVIDIA Isaac (perception, manipulation, Isaac Sim)
- Module 4: VLA Models (vision-language-action, neural policies)
- Capstone: Autonomous Humanoid Project (integration)

Response Format:
- Start with a concise overview
- When a question spans modules, say so and cover each module in order
- Reference prerequisite concepts from earlier modules when explaining
  advanced ones
- Include code snippets from the book when relevant (use markdown)
- Cite every factual claim using the [Source N] format";

const INSTRUCTIONS: &str = "\
Please explain based on the book content, covering each relevant module in \
order and noting prerequisites. Always cite sources using [Source N] format.";

const KEYWORDS: &[&str] = &[
    // Module and tool names
    "ros 2", "ros2", "gazebo", "unity", "isaac", "omniverse", "vla",
    "vision language", "neural policy", "imitation",
    // Module subjects
    "simulation", "perception", "manipulation", "sensor", "digital twin",
    // Book structure
    "module", "chapter",
];

const QUESTION_PHRASES: &[&str] = &[
    "how does", "how do", "explain", "why does", "what happens when", "how to",
    "walk me through", "step by step", "what sensors", "which sensors",
];

const PARAMS: GenerationParams = GenerationParams { temperature: 0.2, max_tokens: 2048 };

/// Agent specializing in module-level concept explanations.
///
/// Handles queries like "How does ROS 2 handle communication?", "Explain
/// the Isaac perception pipeline", "How do I set up a Gazebo simulation?".
pub struct ModuleInfoAgent {
    core: AgentCore,
}

impl ModuleInfoAgent {
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }
}

impl Agent for ModuleInfoAgent {
    fn name(&self) -> &'static str {
        "module_info"
    }

    fn domain(&self) -> AgentDomain {
        AgentDomain::ModuleInfo
    }

    fn description(&self) -> &'static str {
        "Explains concepts from each book module (ROS 2, Gazebo, Isaac, VLA)"
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

        if any_phrase(QUESTION_PHRASES, &query_lower) {
            if matches > 0 {
                score += 0.3;
            }
        } else if matches == 1 {
            // A lone module mention without an explanation cue is a weak
            // signal; definition-style queries belong to the glossary.
            score *= 0.5;
        }

        score.clamp(0.0, 1.0)
    }

    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent> {
        self.core.stream_answer(
            self.name(),
            Some(AgentDomain::ModuleInfo),
            SYSTEM_PROMPT,
            INSTRUCTIONS,
            PARAMS,
            query,
            context,
        )
    }
}
