//! Response Synthesis
//!
//! The generation port and its OpenAI chat-completions implementation.
//! The synthesizer receives the windowed conversation plus whichever
//! grounding the turn gathered (knowledge passages or job summaries) and
//! produces the natural-language answer text.

use super::types::{RetrievedPassage, Role, Turn};
use crate::config::Settings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

// ============================================================
// ERRORS
// ============================================================

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis upstream failed: {0}")]
    Upstream(String),
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

// ============================================================
// REQUEST SHAPE
// ============================================================

/// Everything a turn hands to the synthesizer
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Windowed prior conversation, oldest first, ending with the
    /// current user message
    pub context: Vec<Turn>,
    /// The current user message
    pub question: String,
    /// Knowledge passages (RAG path; may be empty)
    pub passages: Vec<RetrievedPassage>,
    /// Formatted job summaries (job path; empty otherwise)
    pub job_summaries: Vec<String>,
}

impl SynthesisRequest {
    pub fn rag(context: Vec<Turn>, question: &str, passages: Vec<RetrievedPassage>) -> Self {
        Self {
            context,
            question: question.to_string(),
            passages,
            job_summaries: Vec::new(),
        }
    }

    pub fn jobs(context: Vec<Turn>, question: &str, job_summaries: Vec<String>) -> Self {
        Self {
            context,
            question: question.to_string(),
            passages: Vec::new(),
            job_summaries,
        }
    }
}

/// Generation port consumed by the orchestrator
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn generate(&self, request: &SynthesisRequest) -> Result<String, SynthesisError>;
}

// ============================================================
// PROMPTS
// ============================================================

/// System instruction for knowledge-grounded answers
fn rag_instruction(passages: &[RetrievedPassage]) -> String {
    let mut instruction = String::from(
        "Vous êtes un assistant virtuel intelligent. Utilisez les informations \
         du contexte fourni ci-dessous pour répondre à la question de manière \
         claire, détaillée et utile, en français. Si le contexte ne contient \
         pas d'informations pertinentes, dites-le poliment et répondez avec \
         vos connaissances générales si approprié.",
    );

    if passages.is_empty() {
        instruction.push_str(
            "\n\nAucun document pertinent n'a été trouvé dans la base de \
             connaissances pour cette question.",
        );
    } else {
        instruction.push_str("\n\nCONTEXTE RÉCUPÉRÉ DEPUIS LA BASE DE CONNAISSANCES:\n");
        for passage in passages {
            instruction.push_str("---\n");
            instruction.push_str(&passage.content);
            instruction.push('\n');
        }
    }
    instruction
}

/// System instruction for narrating job listings
fn job_instruction(summaries: &[String]) -> String {
    let mut instruction = String::from(
        "Vous êtes un assistant de recherche d'emploi. Présentez à \
         l'utilisateur les offres d'emploi ci-dessous de manière naturelle et \
         engageante, en français. Mentionnez les postes, les entreprises et \
         les points clés de chaque offre.",
    );
    instruction.push_str("\n\nOFFRES D'EMPLOI TROUVÉES:\n");
    for summary in summaries {
        instruction.push_str("---\n");
        instruction.push_str(summary);
        instruction.push('\n');
    }
    instruction
}

/// Turn a synthesis request into the chat-completion message list: one
/// system instruction, the windowed history, and the current question last.
fn build_messages(request: &SynthesisRequest) -> Vec<ChatMessage> {
    let instruction = if request.job_summaries.is_empty() {
        rag_instruction(&request.passages)
    } else {
        job_instruction(&request.job_summaries)
    };

    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: instruction,
    }];

    for turn in &request.context {
        // the current question closes the list; skip it if the window
        // already contains it as the final user turn
        messages.push(ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        });
    }

    let ends_with_question = request
        .context
        .last()
        .map(|turn| turn.role == Role::User && turn.content == request.question)
        .unwrap_or(false);
    if !ends_with_question {
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.question.clone(),
        });
    }

    messages
}

// ============================================================
// OPENAI IMPLEMENTATION
// ============================================================

/// `Synthesizer` backed by the OpenAI chat-completions endpoint
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiSynthesizer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: settings.openai_api_key.clone(),
            model: settings.openai_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn generate(&self, request: &SynthesisRequest) -> Result<String, SynthesisError> {
        if self.api_key.is_empty() {
            return Err(SynthesisError::Upstream(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let body = CompletionRequest {
            model: self.model.clone(),
            messages: build_messages(request),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| SynthesisError::Upstream(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(SynthesisError::Upstream(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|err| SynthesisError::Upstream(format!("invalid response: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(SynthesisError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn passage(content: &str) -> RetrievedPassage {
        RetrievedPassage {
            content: content.to_string(),
            source_metadata: HashMap::new(),
            score: 0.9,
        }
    }

    #[test]
    fn test_rag_messages_include_passages_and_question() {
        let request = SynthesisRequest::rag(
            vec![Turn::new(Role::User, "Qu'est-ce que Rust ?")],
            "Qu'est-ce que Rust ?",
            vec![passage("Rust est un langage système.")],
        );
        let messages = build_messages(&request);

        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Rust est un langage système."));
        assert_eq!(messages.last().unwrap().role, "user");
        assert_eq!(messages.last().unwrap().content, "Qu'est-ce que Rust ?");
        // the window already ends with the question; no duplicate
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_empty_passages_noted_in_instruction() {
        let request = SynthesisRequest::rag(Vec::new(), "Bonjour", Vec::new());
        let messages = build_messages(&request);
        assert!(messages[0].content.contains("Aucun document pertinent"));
        assert_eq!(messages.last().unwrap().content, "Bonjour");
    }

    #[test]
    fn test_job_messages_use_narration_instruction() {
        let request = SynthesisRequest::jobs(
            Vec::new(),
            "Je cherche un poste",
            vec!["**Data Scientist** chez Acme".to_string()],
        );
        let messages = build_messages(&request);
        assert!(messages[0].content.contains("OFFRES D'EMPLOI TROUVÉES"));
        assert!(messages[0].content.contains("**Data Scientist** chez Acme"));
    }

    #[test]
    fn test_history_preserved_in_order() {
        let context = vec![
            Turn::new(Role::User, "Bonjour"),
            Turn::new(Role::Assistant, "Bonjour !"),
            Turn::new(Role::User, "Parle-moi de Rust"),
        ];
        let request = SynthesisRequest::rag(context, "Parle-moi de Rust", Vec::new());
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "Bonjour");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "Parle-moi de Rust");
    }
}
