//! Web API Module
//!
//! Exposes the REST endpoints for the assistant: chat and session
//! management, knowledge-base ingestion, and direct job search. All
//! endpoints return JSON and require no authentication (prototype mode).

use crate::chat::{
    jobs::{format_job_summary, JobSearchClient, JobSearchError, JsearchClient},
    orchestrator::ChatOrchestrator,
    retriever::{KnowledgeRetriever, OpenAiEmbeddings, VectorIndex},
    synthesizer::{OpenAiSynthesizer, Synthesizer},
    types::{ChatResponse, DatePosted, EmploymentType, JobSearchParameters, Turn},
};
use crate::config::Settings;
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================
// APPLICATION STATE
// ============================================================

/// Shared application state
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
    pub index: Arc<VectorIndex>,
    pub jobs: Arc<dyn JobSearchClient>,
    pub settings: Settings,
}

impl AppState {
    /// Wire up the production collaborators from settings
    pub fn new(settings: Settings) -> Self {
        let embeddings = Arc::new(OpenAiEmbeddings::new(&settings.openai_api_key));
        let index = Arc::new(VectorIndex::new(embeddings));
        let jobs: Arc<dyn JobSearchClient> = Arc::new(JsearchClient::new(&settings.rapidapi_key));
        let synthesizer: Arc<dyn Synthesizer> =
            Arc::new(OpenAiSynthesizer::from_settings(&settings));
        Self::with_components(settings, index, jobs, synthesizer)
    }

    /// Assemble state from explicit collaborators (used by tests)
    pub fn with_components(
        settings: Settings,
        index: Arc<VectorIndex>,
        jobs: Arc<dyn JobSearchClient>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let orchestrator = ChatOrchestrator::new(
            &settings,
            Arc::clone(&index) as Arc<dyn KnowledgeRetriever>,
            Arc::clone(&jobs),
            synthesizer,
        );
        Self {
            orchestrator,
            index,
            jobs,
            settings,
        }
    }
}

// ============================================================
// API REQUEST/RESPONSE TYPES
// ============================================================

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub messages: Vec<Turn>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub message_count: usize,
}

#[derive(Deserialize)]
pub struct UploadTextRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
pub struct JobSearchQuery {
    pub query: String,
    pub country: Option<String>,
    pub language: Option<String>,
    pub num_pages: Option<u32>,
    pub employment_types: Option<String>,
    pub date_posted: Option<String>,
    pub remote_jobs_only: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: &str) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

// ============================================================
// CHAT HANDLERS
// ============================================================

/// Health check endpoint
async fn health_check(data: web::Data<Arc<AppState>>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "Job Engine - Chatbot Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "knowledge_chunks": data.index.len(),
    }))
}

/// Service metadata at the root path
async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Assistant virtuel avec RAG et recherche d'emploi",
        "endpoints": {
            "chat": "/chat",
            "knowledge": "/knowledge",
            "jobs": "/jobs"
        }
    }))
}

/// Send a message to the assistant
async fn chat(data: web::Data<Arc<AppState>>, req: web::Json<ChatRequest>) -> impl Responder {
    if req.message.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Le champ 'message' est requis"));
    }

    let response: ChatResponse = data
        .orchestrator
        .handle_message(req.session_id.clone(), &req.message)
        .await;
    HttpResponse::Ok().json(response)
}

/// Send a message for a specific session; the path id wins over the body
async fn chat_with_session(
    data: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    req: web::Json<ChatRequest>,
) -> impl Responder {
    let session_id = path.into_inner();
    if req.message.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Le champ 'message' est requis"));
    }

    let response = data
        .orchestrator
        .handle_message(Some(session_id), &req.message)
        .await;
    HttpResponse::Ok().json(response)
}

/// Conversation history for a session; unknown sessions are simply empty
async fn get_chat_history(
    data: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let session_id = path.into_inner();
    let messages = data.orchestrator.get_history(&session_id);
    let count = messages.len();

    HttpResponse::Ok().json(ChatHistoryResponse {
        session_id,
        messages,
        count,
    })
}

/// Reset a session's memory
async fn delete_session(data: web::Data<Arc<AppState>>, path: web::Path<String>) -> impl Responder {
    let session_id = path.into_inner();
    data.orchestrator.reset(&session_id);

    HttpResponse::Ok().json(json!({
        "message": format!("Session {session_id} réinitialisée avec succès"),
        "session_id": session_id
    }))
}

/// Active sessions with message counts
async fn list_sessions(data: web::Data<Arc<AppState>>) -> impl Responder {
    let sessions: Vec<SessionInfo> = data
        .orchestrator
        .session_summaries()
        .into_iter()
        .map(|(session_id, message_count)| SessionInfo {
            session_id,
            message_count,
        })
        .collect();
    HttpResponse::Ok().json(sessions)
}

// ============================================================
// KNOWLEDGE HANDLERS
// ============================================================

/// Add a text document to the knowledge base
async fn upload_text(
    data: web::Data<Arc<AppState>>,
    req: web::Json<UploadTextRequest>,
) -> impl Responder {
    if req.text.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Le champ 'text' est requis"));
    }

    match data.index.add_text(&req.text, req.metadata.clone()).await {
        Ok(chunks) => HttpResponse::Ok().json(ApiResponse::success(json!({
            "chunks": chunks,
            "message": format!("Texte ajouté avec succès ({chunks} chunks créés)")
        }))),
        Err(err) => {
            log::warn!("knowledge ingestion failed: {err}");
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error("Indexation indisponible"))
        }
    }
}

/// Drop every document from the knowledge base
async fn reset_knowledge(data: web::Data<Arc<AppState>>) -> impl Responder {
    data.index.clear();
    HttpResponse::Ok().json(json!({
        "message": "Base de connaissances réinitialisée avec succès"
    }))
}

// ============================================================
// JOB HANDLERS
// ============================================================

fn params_from_query(query: &JobSearchQuery, settings: &Settings) -> JobSearchParameters {
    let mut params = JobSearchParameters::new(&query.query);
    params.country = query.country.clone();
    params.language = Some(
        query
            .language
            .clone()
            .unwrap_or_else(|| settings.default_language.clone()),
    );
    params.num_pages = query.num_pages.unwrap_or(1).clamp(1, 10);
    params.remote_only = query.remote_jobs_only;
    params.employment_type = query
        .employment_types
        .as_deref()
        .and_then(EmploymentType::from_str);
    params.date_posted = query.date_posted.as_deref().and_then(DatePosted::from_str);
    if let Some(limit) = query.limit {
        params.limit = limit.clamp(1, 20);
    }
    params
}

/// Structured job search, bypassing the chat loop
async fn search_jobs(
    data: web::Data<Arc<AppState>>,
    query: web::Query<JobSearchQuery>,
) -> impl Responder {
    if query.query.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Le paramètre 'query' est requis"));
    }

    let params = params_from_query(&query, &data.settings);
    match data.jobs.search(&params).await {
        Ok(results) => HttpResponse::Ok().json(ApiResponse::success(results)),
        Err(JobSearchError::NoResults) => HttpResponse::Ok().json(ApiResponse::success(json!({
            "query": params.query,
            "country": params.country,
            "total": 0,
            "jobs": []
        }))),
        Err(err) => {
            log::warn!("direct job search failed: {err}");
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error("Service de recherche d'emploi indisponible"))
        }
    }
}

#[derive(Serialize)]
pub struct JobSummaryEntry {
    pub summary: String,
    pub job_id: String,
    pub job_apply_link: Option<String>,
}

/// Job search returning one formatted summary per hit, for clients that
/// render text instead of the full listing records
async fn search_jobs_summary(
    data: web::Data<Arc<AppState>>,
    query: web::Query<JobSearchQuery>,
) -> impl Responder {
    if query.query.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Le paramètre 'query' est requis"));
    }

    let params = params_from_query(&query, &data.settings);
    match data.jobs.search(&params).await {
        Ok(results) => {
            let summaries: Vec<JobSummaryEntry> = results
                .jobs
                .iter()
                .map(|job| JobSummaryEntry {
                    summary: format_job_summary(job),
                    job_id: job.job_id.clone(),
                    job_apply_link: job.apply_link.clone(),
                })
                .collect();
            HttpResponse::Ok().json(ApiResponse::success(json!({
                "query": results.query,
                "country": results.country,
                "total_found": results.total,
                "results": summaries
            })))
        }
        Err(JobSearchError::NoResults) => HttpResponse::Ok().json(ApiResponse::success(json!({
            "query": params.query,
            "country": params.country,
            "total_found": 0,
            "results": []
        }))),
        Err(err) => {
            log::warn!("job summary search failed: {err}");
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error("Service de recherche d'emploi indisponible"))
        }
    }
}

/// Detail lookup for one job by its stable id
async fn get_job_details(
    data: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> impl Responder {
    let job_id = path.into_inner();
    match data.jobs.get_by_id(&job_id).await {
        Ok(job) => HttpResponse::Ok().json(ApiResponse::success(job)),
        Err(JobSearchError::NotFound(_)) => HttpResponse::NotFound()
            .json(ApiResponse::<()>::error("Offre d'emploi introuvable")),
        Err(err) => {
            log::warn!("job detail lookup failed: {err}");
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error("Service de recherche d'emploi indisponible"))
        }
    }
}

// ============================================================
// SERVER CONFIGURATION
// ============================================================

/// Route table, shared between the server and the handler tests
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .route("/health", web::get().to(health_check))
        .route("/chat", web::post().to(chat))
        .route("/chat/sessions", web::get().to(list_sessions))
        .route("/chat/session/{session_id}", web::post().to(chat_with_session))
        .route(
            "/chat/session/{session_id}/history",
            web::get().to(get_chat_history),
        )
        .route("/chat/session/{session_id}", web::delete().to(delete_session))
        .route("/knowledge/upload-text", web::post().to(upload_text))
        .route("/knowledge/reset", web::delete().to(reset_knowledge))
        .route("/jobs/search", web::get().to(search_jobs))
        .route("/jobs/search/summary", web::get().to(search_jobs_summary))
        .route("/jobs/{job_id}", web::get().to(get_job_details));
}

/// Configure and run the API server
pub async fn run_server(settings: Settings) -> std::io::Result<()> {
    let host = settings.host.clone();
    let port = settings.port;
    let state = Arc::new(AppState::new(settings));

    info!("Job Engine API starting at http://{host}:{port}");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(Arc::clone(&state)))
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
