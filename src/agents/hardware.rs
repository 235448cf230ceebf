//! Hardware agent: requirements, specifications, and setup guidance.

use tokio::sync::mpsc;

use crate::agents::{
    any_phrase, base_score, keyword_matches, Agent, AgentCore, GenerationParams,
};
use crate::types::{AgentContext, AgentDomain, AgentEvent};

const SYSTEM_PROMPT: &str = "\
You are a Hardware Setup Assistant for the \"Physical AI & Humanoid Robotics\" book.

Your Role:
1. Provide hardware requirements and specifications.
2. Answer exclusively from the provided book passages.
3. Give recommendations based on use case (simulation, edge deployment, lab work).
4. Compare hardware options (RTX workstation vs Jetson, etc.).
5. If the book does not cover something, say the book does not cover it.

Topics you cover (from the book):
- Workstation requirements: CPU, GPU, RAM for simulation
- NVIDIA GPUs: RTX series specifications for Isaac/Gazebo
- Jetson edge kits: Orin, Xavier, Nano specifications
- Sensors: LiDAR, cameras, IMUs, encoders
- Networking: ROS 2 communication setup

Response Format:
- Provide specific specifications when available
- Include minimum vs recommended specs
- For comparative questions, lay out a pros/cons table per option before
  giving the verdict
- Cite every factual claim using the [Source N] format";

const INSTRUCTIONS: &str = "\
Please answer from the book content with specific specifications where \
available. For comparisons, give a pros/cons table per option before the \
verdict. Always cite sources using [Source N] format.";

const KEYWORDS: &[&str] = &[
    // Components
    "hardware", "gpu", "cpu", "ram", "graphics card", "processor", "workstation",
    "system requirements",
    // NVIDIA specific
    "rtx", "nvidia", "cuda", "jetson", "orin", "xavier", "agx",
    // Specifications
    "requirements", "specs", "specifications", "minimum", "recommended",
    // Sensors
    "sensor", "lidar", "camera", "imu", "encoder", "realsense", "zed",
    // Setup
    "setup", "install", "configure",
];

const REQUIREMENT_PHRASES: &[&str] = &[
    "hardware requirements", "gpu requirements", "cpu requirements",
    "ram requirements", "system requirements", "minimum requirements",
    "recommended specs", "what specs", "can i run", "will it run", "do i need",
    "jetson vs", "rtx vs", "compare hardware",
];

const SENSOR_TERMS: &[&str] = &["sensor", "lidar", "camera", "imu", "realsense", "zed"];

const PARAMS: GenerationParams = GenerationParams { temperature: 0.1, max_tokens: 1536 };

/// Agent specializing in hardware requirements and setup.
///
/// Handles queries like "What GPU do I need for Isaac?", "Jetson vs RTX
/// workstation comparison", "What sensors are needed for SLAM?".
pub struct HardwareAgent {
    core: AgentCore,
}

impl HardwareAgent {
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }
}

impl Agent for HardwareAgent {
    fn name(&self) -> &'static str {
        "hardware"
    }

    fn domain(&self) -> AgentDomain {
        AgentDomain::Hardware
    }

    fn description(&self) -> &'static str {
        "Provides hardware requirements, specifications, and setup guidance for robotics development"
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

        if matches > 0 && any_phrase(REQUIREMENT_PHRASES, &query_lower) {
            score += 0.35;
        }
        if matches > 0 && any_phrase(SENSOR_TERMS, &query_lower) {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent> {
        self.core.stream_answer(
            self.name(),
            Some(AgentDomain::Hardware),
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
    fn test_requirement_query_scores_high() {
        let agent = HardwareAgent::new(test_core());
        let score = agent.can_handle("What hardware do I need for NVIDIA Isaac simulations?");
        assert!(score >= 0.8, "got {score}");
    }

    #[test]
    fn test_sensor_query_gets_boost() {
        let agent = HardwareAgent::new(test_core());
        let plain = agent.can_handle("workstation gpu pricing");
        let sensed = agent.can_handle("workstation gpu with a lidar sensor");
        assert!(sensed > plain);
    }

    #[test]
    fn test_unrelated_query_scores_zero() {
        let agent = HardwareAgent::new(test_core());
        assert_eq!(agent.can_handle("what is the recipe for chocolate cake?"), 0.0);
    }

    #[test]
    fn test_score_stays_in_range() {
        let agent = HardwareAgent::new(test_core());
        let score = agent.can_handle(
            "hardware gpu cpu ram jetson rtx nvidia sensor lidar camera system requirements do i need",
        );
        assert!((0.0..=1.0).contains(&score));
    }
}
