//! Chat Assistant Types
//!
//! Core data structures shared by the intent detector, session memory,
//! collaborator clients and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================
// CONVERSATION TURNS
// ============================================================

/// Who produced a turn in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One exchange unit within a session. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================
// INTENT CLASSIFICATION
// ============================================================

/// Result of classifying one incoming message. Produced fresh per
/// message and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub is_job_search: bool,
    /// Monotonic in the number of matched cues; telemetry only,
    /// never used for branching.
    pub confidence: Option<f32>,
    pub parameters: Option<JobSearchParameters>,
}

impl IntentClassification {
    pub fn general_chat() -> Self {
        Self {
            is_job_search: false,
            confidence: None,
            parameters: None,
        }
    }
}

// ============================================================
// JOB SEARCH PARAMETERS
// ============================================================

/// Employment types understood by the JSearch upstream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contractor,
    Intern,
}

impl EmploymentType {
    /// Wire value expected by the job API
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "FULLTIME",
            EmploymentType::PartTime => "PARTTIME",
            EmploymentType::Contractor => "CONTRACTOR",
            EmploymentType::Intern => "INTERN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FULLTIME" => Some(EmploymentType::FullTime),
            "PARTTIME" => Some(EmploymentType::PartTime),
            "CONTRACTOR" => Some(EmploymentType::Contractor),
            "INTERN" => Some(EmploymentType::Intern),
            _ => None,
        }
    }
}

/// Posting-age filters understood by the JSearch upstream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatePosted {
    Today,
    ThreeDays,
    Week,
    Month,
}

impl DatePosted {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePosted::Today => "today",
            DatePosted::ThreeDays => "3days",
            DatePosted::Week => "week",
            DatePosted::Month => "month",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "today" => Some(DatePosted::Today),
            "3days" => Some(DatePosted::ThreeDays),
            "week" => Some(DatePosted::Week),
            "month" => Some(DatePosted::Month),
            _ => None,
        }
    }
}

/// Structured parameters extracted from a job-search message.
///
/// `country` holds the canonical place name as detected ("France");
/// the job client owns the mapping to the ISO codes its upstream expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSearchParameters {
    pub query: String,
    pub country: Option<String>,
    pub language: Option<String>,
    pub remote_only: Option<bool>,
    pub employment_type: Option<EmploymentType>,
    pub date_posted: Option<DatePosted>,
    pub num_pages: u32,
    pub limit: usize,
}

impl JobSearchParameters {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            country: None,
            language: None,
            remote_only: None,
            employment_type: None,
            date_posted: None,
            num_pages: 1,
            limit: 5,
        }
    }
}

// ============================================================
// JOB LISTINGS
// ============================================================

/// Normalized job posting record.
///
/// `job_id` is stable across repeated queries for the same underlying
/// posting and is usable for detail lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub job_id: String,
    pub title: String,
    pub employer_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub employment_type: Option<String>,
    pub is_remote: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub apply_link: Option<String>,
}

/// Structured block attached to a job-path response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSearchResults {
    pub query: String,
    pub country: Option<String>,
    pub total: usize,
    pub jobs: Vec<JobListing>,
}

// ============================================================
// RETRIEVED PASSAGES
// ============================================================

/// A retrieved chunk of knowledge-base text with a relevance score.
/// Sequences are ordered by descending score; ties keep the index's
/// insertion order so results stay reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub source_metadata: HashMap<String, String>,
    pub score: f32,
}

// ============================================================
// CHAT RESPONSE
// ============================================================

/// Coarse outcome tag for a turn, alongside the textual `error`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatOutcome {
    /// Everything the turn needed succeeded
    Success,
    /// A collaborator failed but a useful answer was still produced
    Degraded,
    /// Only the static fallback answer could be produced
    Failed,
}

/// The unit returned to the caller for every handled message.
///
/// Exactly one of `sources` non-empty or `job_search` present holds per
/// turn: a job-path turn never runs retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<RetrievedPassage>,
    pub session_id: String,
    pub outcome: ChatOutcome,
    pub error: Option<String>,
    pub job_search: Option<JobSearchResults>,
}

impl ChatResponse {
    pub fn new(session_id: &str, answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            sources: Vec::new(),
            session_id: session_id.to_string(),
            outcome: ChatOutcome::Success,
            error: None,
            job_search: None,
        }
    }
}
