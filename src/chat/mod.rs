//! Chat Module - Core of the Conversational Assistant
//!
//! Implements the per-message orchestration loop that blends RAG answers
//! with job search.
//!
//! Architecture:
//! - Intent: rule-based job-search detection and parameter extraction
//! - Memory: session-keyed, append-only conversation transcripts
//! - Retriever: knowledge-base passages behind a vector index
//! - Jobs: external job-listings API client
//! - Synthesizer: LLM bridge producing the answer text
//! - Orchestrator: the control loop tying the above together

pub mod intent;
pub mod jobs;
pub mod memory;
pub mod orchestrator;
pub mod retriever;
pub mod synthesizer;
pub mod types;

pub use intent::*;
pub use jobs::*;
pub use memory::*;
pub use orchestrator::*;
pub use retriever::*;
pub use synthesizer::*;
pub use types::*;
