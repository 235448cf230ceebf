//! Shared skills injected into agents.
//!
//! Retrieval, citation, and session context are stateless function
//! bundles with collaborator handles passed at construction; there is
//! no global lookup.

pub mod citation;
pub mod context;
pub mod retrieval;

pub use citation::{CitationSkill, MarkerScrubber};
pub use context::{MemorySessionStore, SessionBackend, SessionContextSkill};
pub use retrieval::RetrievalSkill;
