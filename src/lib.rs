//! Job Engine - Conversational Assistant with RAG and Job Search
//!
//! A chatbot backend that answers questions from an in-memory knowledge
//! base and detects job-search intent in French messages, routing those
//! turns to an external job-listings API instead.
//!
//! Modules:
//! - `api`: HTTP surface (actix-web routes and server setup)
//! - `chat`: intent detection, session memory, retrieval, job search,
//!   synthesis and the orchestration loop
//! - `config`: environment-driven settings

pub mod api;
pub mod chat;
pub mod config;
