//! Session Orchestrator
//!
//! The per-message control loop: classify the intent, gather context from
//! the right collaborator (knowledge retrieval or job search), synthesize
//! an answer, update session memory and emit the response. The orchestrator
//! never leaves a request unanswered: every collaborator failure is caught
//! here and converted into a degraded but valid `ChatResponse`.

use super::intent::IntentDetector;
use super::jobs::{format_job_summary, JobSearchClient, JobSearchError};
use super::memory::SessionStore;
use super::retriever::{KnowledgeRetriever, RetrievalError};
use super::synthesizer::{SynthesisRequest, Synthesizer};
use super::types::{
    ChatOutcome, ChatResponse, JobSearchParameters, JobSearchResults, RetrievedPassage, Role,
    Turn,
};
use crate::config::Settings;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

/// Static fallback when synthesis itself fails
const FALLBACK_ANSWER: &str = "Désolé, une erreur s'est produite. Veuillez réessayer.";
/// Answer for a job search that matched nothing
const NO_RESULTS_ANSWER: &str = "Désolé, je n'ai trouvé aucune offre d'emploi correspondant à \
     votre recherche. Essayez de reformuler avec d'autres termes ou une autre localisation.";
/// Answer when the job upstream is down or rate-limited
const JOBS_UNAVAILABLE_ANSWER: &str = "Désolé, le service de recherche d'emploi est \
     momentanément indisponible. Veuillez réessayer dans quelques instants.";

/// Ties the intent detector, session memory and the three collaborator
/// ports together, one message at a time.
pub struct ChatOrchestrator {
    detector: IntentDetector,
    store: SessionStore,
    retriever: Arc<dyn KnowledgeRetriever>,
    jobs: Arc<dyn JobSearchClient>,
    synthesizer: Arc<dyn Synthesizer>,
    retriever_k: usize,
    context_window_turns: usize,
    upstream_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        settings: &Settings,
        retriever: Arc<dyn KnowledgeRetriever>,
        jobs: Arc<dyn JobSearchClient>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            detector: IntentDetector::new(&settings.default_language),
            store: SessionStore::new(settings.max_sessions),
            retriever,
            jobs,
            synthesizer,
            retriever_k: settings.retriever_k,
            context_window_turns: settings.context_window_turns,
            upstream_timeout: settings.upstream_timeout,
        }
    }

    /// Handle one incoming message to completion. Generates a session id
    /// when the caller supplied none. Messages for the same session are
    /// serialized; other sessions proceed concurrently.
    pub async fn handle_message(&self, session_id: Option<String>, message: &str) -> ChatResponse {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let entry = self.store.entry(&session_id);
        let _turn_guard = entry.turn_lock.lock().await;

        let classification = self.detector.classify(message);
        if let Some(confidence) = classification.confidence {
            info!(
                "session {session_id}: job_search={} confidence={confidence:.2}",
                classification.is_job_search
            );
        }

        // Append the user turn first so the context window can see the
        // latest message if capacity allows.
        entry.append(Role::User, message);
        let context = entry.context_window(self.context_window_turns);

        // A job-search classification with an unusable query must not
        // short-circuit into an empty job call; the detector already folds
        // that case back into general chat.
        let is_job_search = classification.is_job_search;
        let job_params = classification
            .parameters
            .filter(|p| is_job_search && !p.query.trim().is_empty());

        let response = match job_params {
            Some(params) => self.job_path(&session_id, message, context, &params).await,
            None => self.rag_path(&session_id, message, context).await,
        };

        entry.append(Role::Assistant, &response.answer);
        response
    }

    /// Read-only passthrough to memory
    pub fn get_history(&self, session_id: &str) -> Vec<Turn> {
        self.store.history(session_id)
    }

    /// Passthrough to memory reset; idempotent
    pub fn reset(&self, session_id: &str) {
        self.store.reset(session_id);
    }

    pub fn session_summaries(&self) -> Vec<(String, usize)> {
        self.store.session_summaries()
    }

    // ========================================================
    // JOB PATH
    // ========================================================

    async fn job_path(
        &self,
        session_id: &str,
        message: &str,
        context: Vec<Turn>,
        params: &JobSearchParameters,
    ) -> ChatResponse {
        let search = timeout(self.upstream_timeout, self.jobs.search(params)).await;

        match search {
            Ok(Ok(results)) => {
                let summaries: Vec<String> = results.jobs.iter().map(format_job_summary).collect();
                let request = SynthesisRequest::jobs(context, message, summaries);

                let mut response = ChatResponse::new(session_id, "");
                // The structured block survives a narration failure.
                response.job_search = Some(results);

                match timeout(self.upstream_timeout, self.synthesizer.generate(&request)).await {
                    Ok(Ok(answer)) => {
                        response.answer = answer;
                    }
                    Ok(Err(err)) => {
                        warn!("session {session_id}: job narration failed: {err}");
                        response.answer = FALLBACK_ANSWER.to_string();
                        response.outcome = ChatOutcome::Degraded;
                        response.error = Some("synthesis failed".to_string());
                    }
                    Err(_) => {
                        warn!("session {session_id}: job narration timed out");
                        response.answer = FALLBACK_ANSWER.to_string();
                        response.outcome = ChatOutcome::Degraded;
                        response.error = Some("synthesis timed out".to_string());
                    }
                }
                response
            }
            Ok(Err(JobSearchError::NoResults)) => {
                info!("session {session_id}: job search matched nothing");
                let mut response = ChatResponse::new(session_id, NO_RESULTS_ANSWER);
                response.outcome = ChatOutcome::Degraded;
                response.job_search = Some(JobSearchResults {
                    query: params.query.clone(),
                    country: params.country.clone(),
                    total: 0,
                    jobs: Vec::new(),
                });
                response
            }
            Ok(Err(err)) => {
                warn!("session {session_id}: job search failed: {err}");
                let mut response = ChatResponse::new(session_id, JOBS_UNAVAILABLE_ANSWER);
                response.outcome = ChatOutcome::Degraded;
                response.error = Some("job search unavailable".to_string());
                response
            }
            Err(_) => {
                warn!("session {session_id}: job search timed out");
                let mut response = ChatResponse::new(session_id, JOBS_UNAVAILABLE_ANSWER);
                response.outcome = ChatOutcome::Degraded;
                response.error = Some("job search timed out".to_string());
                response
            }
        }
    }

    // ========================================================
    // RAG PATH
    // ========================================================

    async fn rag_path(&self, session_id: &str, message: &str, context: Vec<Turn>) -> ChatResponse {
        let retrieval = timeout(
            self.upstream_timeout,
            self.retriever.retrieve(message, self.retriever_k),
        )
        .await;

        // Zero passages is graceful degradation, not a failure: the
        // synthesizer still runs on conversation context alone.
        let (passages, retrieval_note): (Vec<RetrievedPassage>, Option<String>) = match retrieval {
            Ok(Ok(passages)) => (passages, None),
            Ok(Err(RetrievalError::Empty)) => (Vec::new(), None),
            Ok(Err(err @ RetrievalError::Unavailable(_))) => {
                warn!("session {session_id}: retrieval failed: {err}");
                (Vec::new(), Some("retrieval unavailable".to_string()))
            }
            Err(_) => {
                warn!("session {session_id}: retrieval timed out");
                (Vec::new(), Some("retrieval timed out".to_string()))
            }
        };

        let request = SynthesisRequest::rag(context, message, passages.clone());

        match timeout(self.upstream_timeout, self.synthesizer.generate(&request)).await {
            Ok(Ok(answer)) => {
                let mut response = ChatResponse::new(session_id, &answer);
                response.sources = passages;
                if let Some(note) = retrieval_note {
                    response.outcome = ChatOutcome::Degraded;
                    response.error = Some(note);
                }
                response
            }
            Ok(Err(err)) => {
                warn!("session {session_id}: synthesis failed: {err}");
                self.synthesis_fallback(session_id, passages, "synthesis failed")
            }
            Err(_) => {
                warn!("session {session_id}: synthesis timed out");
                self.synthesis_fallback(session_id, passages, "synthesis timed out")
            }
        }
    }

    /// Static fallback answer; already-gathered sources are preserved.
    /// The turn is `Failed` only when there is nothing useful at all.
    fn synthesis_fallback(
        &self,
        session_id: &str,
        passages: Vec<RetrievedPassage>,
        note: &str,
    ) -> ChatResponse {
        let mut response = ChatResponse::new(session_id, FALLBACK_ANSWER);
        response.outcome = if passages.is_empty() {
            ChatOutcome::Failed
        } else {
            ChatOutcome::Degraded
        };
        response.sources = passages;
        response.error = Some(note.to_string());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::jobs::JobSearchError;
    use crate::chat::synthesizer::SynthesisError;
    use crate::chat::types::JobListing;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================================================
    // STUB COLLABORATORS
    // ========================================================

    enum RetrieverMode {
        Passages(Vec<RetrievedPassage>),
        Empty,
        Unavailable,
    }

    struct StubRetriever {
        mode: RetrieverMode,
    }

    #[async_trait]
    impl KnowledgeRetriever for StubRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
            match &self.mode {
                RetrieverMode::Passages(p) => Ok(p.clone()),
                RetrieverMode::Empty => Err(RetrievalError::Empty),
                RetrieverMode::Unavailable => {
                    Err(RetrievalError::Unavailable("store down".to_string()))
                }
            }
        }
    }

    enum JobsMode {
        Listings(usize),
        NoResults,
        Unavailable,
    }

    struct StubJobs {
        mode: JobsMode,
        calls: AtomicUsize,
    }

    impl StubJobs {
        fn new(mode: JobsMode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn listing(id: &str, remote: bool) -> JobListing {
        JobListing {
            job_id: id.to_string(),
            title: "Data Scientist".to_string(),
            employer_name: "Acme".to_string(),
            city: Some("Paris".to_string()),
            state: None,
            country: Some("FR".to_string()),
            employment_type: Some("FULLTIME".to_string()),
            is_remote: remote,
            posted_at: None,
            apply_link: None,
        }
    }

    #[async_trait]
    impl JobSearchClient for StubJobs {
        async fn search(
            &self,
            params: &JobSearchParameters,
        ) -> Result<JobSearchResults, JobSearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                JobsMode::Listings(n) => {
                    let jobs: Vec<JobListing> = (0..n)
                        .map(|i| listing(&format!("job-{i}"), params.remote_only.unwrap_or(false)))
                        .collect();
                    Ok(JobSearchResults {
                        query: params.query.clone(),
                        country: params.country.clone(),
                        total: n,
                        jobs,
                    })
                }
                JobsMode::NoResults => Err(JobSearchError::NoResults),
                JobsMode::Unavailable => {
                    Err(JobSearchError::Unavailable("rate limited".to_string()))
                }
            }
        }

        async fn get_by_id(&self, job_id: &str) -> Result<JobListing, JobSearchError> {
            Err(JobSearchError::NotFound(job_id.to_string()))
        }
    }

    enum SynthMode {
        Echo,
        Fail,
        Slow(Duration),
    }

    struct StubSynth {
        mode: SynthMode,
    }

    #[async_trait]
    impl Synthesizer for StubSynth {
        async fn generate(&self, request: &SynthesisRequest) -> Result<String, SynthesisError> {
            match self.mode {
                SynthMode::Echo => Ok(format!("réponse à: {}", request.question)),
                SynthMode::Fail => Err(SynthesisError::Upstream("llm down".to_string())),
                SynthMode::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok("trop tard".to_string())
                }
            }
        }
    }

    fn passage(content: &str) -> RetrievedPassage {
        RetrievedPassage {
            content: content.to_string(),
            source_metadata: HashMap::new(),
            score: 0.8,
        }
    }

    struct Fixture {
        orchestrator: ChatOrchestrator,
        jobs: Arc<StubJobs>,
    }

    fn fixture(retriever: RetrieverMode, jobs: JobsMode, synth: SynthMode) -> Fixture {
        let jobs = Arc::new(StubJobs::new(jobs));
        let settings = Settings {
            upstream_timeout: Duration::from_millis(200),
            ..Settings::default()
        };
        let orchestrator = ChatOrchestrator::new(
            &settings,
            Arc::new(StubRetriever { mode: retriever }),
            Arc::clone(&jobs) as Arc<dyn JobSearchClient>,
            Arc::new(StubSynth { mode: synth }),
        );
        Fixture { orchestrator, jobs }
    }

    // ========================================================
    // TESTS
    // ========================================================

    #[tokio::test]
    async fn test_history_ordering_over_turns() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(2), SynthMode::Echo);
        for i in 0..3 {
            f.orchestrator
                .handle_message(Some("s1".to_string()), &format!("message {i}"))
                .await;
        }

        let history = f.orchestrator.get_history("s1");
        assert_eq!(history.len(), 6);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
        assert_eq!(history[0].content, "message 0");
        assert_eq!(history[4].content, "message 2");
    }

    #[tokio::test]
    async fn test_concurrent_messages_same_session_never_interleave() {
        // The synthesizer yields mid-turn, so without per-session turn
        // serialization the user/assistant appends of overlapping tasks
        // would shuffle together.
        let f = Arc::new(fixture(
            RetrieverMode::Empty,
            JobsMode::Listings(1),
            SynthMode::Slow(Duration::from_millis(5)),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let f = Arc::clone(&f);
                tokio::spawn(async move {
                    f.orchestrator
                        .handle_message(Some("s1".to_string()), &format!("message {i}"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let history = f.orchestrator.get_history("s1");
        assert_eq!(history.len(), 16);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected, "turn {i} out of order");
        }
    }

    #[tokio::test]
    async fn test_reset_then_history_is_empty() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(1), SynthMode::Echo);
        f.orchestrator
            .handle_message(Some("s1".to_string()), "Bonjour")
            .await;
        f.orchestrator.reset("s1");
        assert!(f.orchestrator.get_history("s1").is_empty());
        // resetting a session that never existed is a no-op
        f.orchestrator.reset("ghost");
        assert!(f.orchestrator.get_history("ghost").is_empty());
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_answers() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(1), SynthMode::Echo);
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Parle-moi de Rust")
            .await;

        assert!(!response.answer.is_empty());
        assert!(response.sources.is_empty());
        assert!(response.job_search.is_none());
        assert_eq!(response.outcome, ChatOutcome::Success);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_rag_path_attaches_sources() {
        let f = fixture(
            RetrieverMode::Passages(vec![passage("Rust est rapide"), passage("Rust est sûr")]),
            JobsMode::Listings(1),
            SynthMode::Echo,
        );
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Parle-moi de Rust")
            .await;

        assert_eq!(response.sources.len(), 2);
        assert!(response.job_search.is_none());
        assert_eq!(response.outcome, ChatOutcome::Success);
    }

    #[tokio::test]
    async fn test_job_path_populates_structured_block() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(3), SynthMode::Echo);
        let response = f
            .orchestrator
            .handle_message(
                Some("s1".to_string()),
                "Je cherche un poste de data scientist remote",
            )
            .await;

        let block = response.job_search.expect("job_search block");
        assert!(block.query.contains("data scientist"));
        assert_eq!(block.jobs.len(), 3);
        assert!(block.jobs.iter().all(|j| j.is_remote));
        let mut ids: Vec<_> = block.jobs.iter().map(|j| j.job_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        // job path never runs retrieval
        assert!(response.sources.is_empty());
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn test_bare_cue_routes_to_rag_not_jobs() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(1), SynthMode::Echo);
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "je cherche")
            .await;

        assert_eq!(f.jobs.calls.load(Ordering::SeqCst), 0);
        assert!(response.job_search.is_none());
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn test_narration_failure_preserves_job_block() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(2), SynthMode::Fail);
        let response = f
            .orchestrator
            .handle_message(
                Some("s1".to_string()),
                "Je cherche un emploi de développeur Python en France",
            )
            .await;

        let block = response.job_search.expect("structured data must survive");
        assert_eq!(block.jobs.len(), 2);
        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert_eq!(response.outcome, ChatOutcome::Degraded);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_no_results_yields_apology_with_empty_block() {
        let f = fixture(RetrieverMode::Empty, JobsMode::NoResults, SynthMode::Echo);
        let response = f
            .orchestrator
            .handle_message(
                Some("s1".to_string()),
                "Je cherche un emploi de cosmonaute en Suisse",
            )
            .await;

        let block = response.job_search.expect("empty block");
        assert_eq!(block.total, 0);
        assert!(block.jobs.is_empty());
        assert!(!response.answer.is_empty());
        assert_eq!(response.outcome, ChatOutcome::Degraded);
    }

    #[tokio::test]
    async fn test_jobs_unavailable_degrades_without_block() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Unavailable, SynthMode::Echo);
        let response = f
            .orchestrator
            .handle_message(
                Some("s1".to_string()),
                "Je cherche un emploi de développeur Python",
            )
            .await;

        assert!(response.job_search.is_none());
        assert!(!response.answer.is_empty());
        assert_eq!(response.outcome, ChatOutcome::Degraded);
        assert_eq!(response.error.as_deref(), Some("job search unavailable"));
        // the internal error detail never reaches the caller
        assert!(!response.answer.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_preserves_sources() {
        let f = fixture(
            RetrieverMode::Passages(vec![passage("du contexte")]),
            JobsMode::Listings(1),
            SynthMode::Fail,
        );
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Une question")
            .await;

        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.outcome, ChatOutcome::Degraded);
    }

    #[tokio::test]
    async fn test_synthesis_failure_with_nothing_gathered_is_failed() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(1), SynthMode::Fail);
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Une question")
            .await;

        assert_eq!(response.outcome, ChatOutcome::Failed);
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_synthesis_hits_timeout() {
        let f = fixture(
            RetrieverMode::Empty,
            JobsMode::Listings(1),
            SynthMode::Slow(Duration::from_secs(5)),
        );
        let response = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Une question")
            .await;

        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert_eq!(response.error.as_deref(), Some("synthesis timed out"));
        // the turn still updated memory on its way out
        assert_eq!(f.orchestrator.get_history("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_generated_session_id_is_returned_and_reusable() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(1), SynthMode::Echo);
        let first = f.orchestrator.handle_message(None, "Bonjour").await;
        assert!(!first.session_id.is_empty());

        let second = f
            .orchestrator
            .handle_message(Some(first.session_id.clone()), "Encore moi")
            .await;
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(f.orchestrator.get_history(&first.session_id).len(), 4);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let f = fixture(RetrieverMode::Empty, JobsMode::Listings(2), SynthMode::Echo);

        let greeting = f
            .orchestrator
            .handle_message(Some("s1".to_string()), "Bonjour")
            .await;
        assert!(!greeting.answer.is_empty());
        assert!(greeting.job_search.is_none());

        let search = f
            .orchestrator
            .handle_message(
                Some("s1".to_string()),
                "Je cherche un poste de data scientist remote",
            )
            .await;
        let block = search.job_search.expect("job_search populated");
        assert!(block.query.contains("data scientist"));
        assert!(block.jobs.iter().all(|j| j.is_remote));

        assert_eq!(f.orchestrator.get_history("s1").len(), 4);
    }
}
