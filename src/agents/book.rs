//! Fallback book agent: whole-book retrieval without a domain filter.
//!
//! Never competes in routing (`can_handle` is always 0.0); the router
//! selects it only when no specialist clears the confidence threshold,
//! or as the retry target after an agent failure.

use tokio::sync::mpsc;

use crate::agents::{Agent, AgentCore, GenerationParams};
use crate::types::{AgentContext, AgentDomain, AgentEvent};

const SYSTEM_PROMPT: &str = "\
You are an AI assistant specialized in the \"Physical AI & Humanoid Robotics\" book.

Your responsibilities:
1. Answer questions truthfully and ONLY using the provided book content.
2. If you cannot find relevant information in the provided context, respond
   with: \"I couldn't find relevant information in the book for your question.\"
3. Cite every factual claim using the [Source N] format, where N is the
   source number.
4. If the user provides selected text, prioritize that context first.

Topics covered in the book:
- Physical AI & Humanoid Robotics
- ROS 2, Gazebo, Unity, NVIDIA Isaac
- VLA (Vision-Language-Action)
- Sensors: LiDAR, IMU, cameras
- Capstone Humanoid Project

Response format:
- Be concise and informative
- Use markdown formatting when appropriate
- Include citations as [Source N] inline where you reference information";

const INSTRUCTIONS: &str = "\
Please answer based on the book content above. If the book does not cover \
the topic, say so clearly. Always cite sources using [Source N] format.";

const KEYWORDS: &[&str] = &["book", "physical ai", "robotics"];

const PARAMS: GenerationParams = GenerationParams { temperature: 0.1, max_tokens: 2048 };

/// Whole-book fallback agent
pub struct BookAgent {
    core: AgentCore,
}

impl BookAgent {
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }
}

impl Agent for BookAgent {
    fn name(&self) -> &'static str {
        "book"
    }

    fn domain(&self) -> AgentDomain {
        AgentDomain::General
    }

    fn description(&self) -> &'static str {
        "Answers questions across the whole book when no specialist matches"
    }

    fn keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn can_handle(&self, _query: &str) -> f32 {
        0.0
    }

    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent> {
        // No domain filter: every chunk, tagged or not, is eligible
        self.core.stream_answer(
            self.name(),
            None,
            SYSTEM_PROMPT,
            INSTRUCTIONS,
            PARAMS,
            query,
            context,
        )
    }
}
