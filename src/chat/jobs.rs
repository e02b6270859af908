//! Job Search Client
//!
//! Port consumed by the orchestrator plus the JSearch (RapidAPI) HTTP
//! implementation. Raw upstream job objects are normalized into the
//! canonical `JobListing` record; `job_id` stays stable across queries and
//! supports detail lookup.

use super::types::{JobListing, JobSearchParameters, JobSearchResults};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

const BASE_URL: &str = "https://jsearch.p.rapidapi.com";
const RAPIDAPI_HOST: &str = "jsearch.p.rapidapi.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================
// ERRORS
// ============================================================

#[derive(Debug, Error)]
pub enum JobSearchError {
    /// External API down, rate-limited or misconfigured
    #[error("job search upstream unavailable: {0}")]
    Unavailable(String),
    /// The query matched zero listings
    #[error("no job listings matched the search")]
    NoResults,
    #[error("job {0} not found")]
    NotFound(String),
}

// ============================================================
// PORT
// ============================================================

/// Job-search contract consumed by the orchestrator
#[async_trait]
pub trait JobSearchClient: Send + Sync {
    async fn search(
        &self,
        params: &JobSearchParameters,
    ) -> Result<JobSearchResults, JobSearchError>;

    async fn get_by_id(&self, job_id: &str) -> Result<JobListing, JobSearchError>;
}

// ============================================================
// JSEARCH CLIENT
// ============================================================

/// `JobSearchClient` backed by the JSearch API on RapidAPI
pub struct JsearchClient {
    client: reqwest::Client,
    api_key: String,
}

impl JsearchClient {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    fn ensure_configured(&self) -> Result<(), JobSearchError> {
        if self.api_key.is_empty() {
            return Err(JobSearchError::Unavailable(
                "RapidAPI key not configured".to_string(),
            ));
        }
        Ok(())
    }

    fn build_query(&self, params: &JobSearchParameters) -> Vec<(String, String)> {
        let mut query = vec![
            ("query".to_string(), params.query.clone()),
            ("num_pages".to_string(), params.num_pages.to_string()),
        ];
        if let Some(language) = &params.language {
            query.push(("language".to_string(), language.clone()));
        }
        if let Some(country) = &params.country {
            query.push(("country".to_string(), country_to_iso(country)));
        }
        if let Some(kind) = params.employment_type {
            query.push(("employment_types".to_string(), kind.as_str().to_string()));
        }
        if let Some(when) = params.date_posted {
            query.push(("date_posted".to_string(), when.as_str().to_string()));
        }
        query.push((
            "remote_jobs_only".to_string(),
            params.remote_only.unwrap_or(false).to_string(),
        ));
        query
    }
}

#[async_trait]
impl JobSearchClient for JsearchClient {
    async fn search(
        &self,
        params: &JobSearchParameters,
    ) -> Result<JobSearchResults, JobSearchError> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(format!("{BASE_URL}/search"))
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", RAPIDAPI_HOST)
            .query(&self.build_query(params))
            .send()
            .await
            .map_err(|err| JobSearchError::Unavailable(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(JobSearchError::Unavailable(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|err| JobSearchError::Unavailable(format!("invalid response: {err}")))?;

        let mut jobs = normalize_jobs(parsed.data);
        if jobs.is_empty() {
            return Err(JobSearchError::NoResults);
        }

        // `total` reflects every match seen; `jobs` is capped at the
        // requested limit.
        let total = jobs.len();
        jobs.truncate(params.limit);

        Ok(JobSearchResults {
            query: params.query.clone(),
            country: params.country.clone(),
            total,
            jobs,
        })
    }

    async fn get_by_id(&self, job_id: &str) -> Result<JobListing, JobSearchError> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(format!("{BASE_URL}/job-details"))
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", RAPIDAPI_HOST)
            .query(&[("job_id", job_id)])
            .send()
            .await
            .map_err(|err| JobSearchError::Unavailable(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(JobSearchError::Unavailable(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|err| JobSearchError::Unavailable(format!("invalid response: {err}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(normalize_job)
            .ok_or_else(|| JobSearchError::NotFound(job_id.to_string()))
    }
}

// ============================================================
// WIRE FORMAT & NORMALIZATION
// ============================================================

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawJob>,
}

/// Raw JSearch job object; only the fields the canonical record needs
#[derive(Deserialize)]
struct RawJob {
    #[serde(default)]
    job_id: String,
    job_title: Option<String>,
    employer_name: Option<String>,
    job_city: Option<String>,
    job_state: Option<String>,
    job_country: Option<String>,
    job_employment_type: Option<String>,
    #[serde(default)]
    job_is_remote: bool,
    job_posted_at_datetime_utc: Option<String>,
    job_apply_link: Option<String>,
}

fn normalize_job(raw: RawJob) -> JobListing {
    JobListing {
        job_id: raw.job_id,
        title: raw
            .job_title
            .unwrap_or_else(|| "Titre non spécifié".to_string()),
        employer_name: raw
            .employer_name
            .unwrap_or_else(|| "Entreprise non spécifiée".to_string()),
        city: raw.job_city,
        state: raw.job_state,
        country: raw.job_country,
        employment_type: raw.job_employment_type,
        is_remote: raw.job_is_remote,
        posted_at: raw.job_posted_at_datetime_utc.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        apply_link: raw.job_apply_link,
    }
}

/// Drop listings without a usable id and dedupe on `job_id`
fn normalize_jobs(raw: Vec<RawJob>) -> Vec<JobListing> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|job| !job.job_id.is_empty())
        .map(normalize_job)
        .filter(|job| seen.insert(job.job_id.clone()))
        .collect()
}

/// Canonical country names → the ISO codes the upstream expects.
/// Unknown names pass through lowercased.
pub fn country_to_iso(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "france" => "fr",
        "allemagne" | "germany" => "de",
        "espagne" | "spain" => "es",
        "italie" | "italy" => "it",
        "belgique" | "belgium" => "be",
        "suisse" | "switzerland" => "ch",
        "canada" => "ca",
        "usa" | "united states" | "états-unis" => "us",
        other => return other.to_string(),
    }
    .to_string()
}

/// Human-readable one-job summary used as prompt context for narration
pub fn format_job_summary(job: &JobListing) -> String {
    let mut location = job.city.clone().unwrap_or_default();
    if let Some(state) = &job.state {
        if !location.is_empty() {
            location.push_str(", ");
        }
        location.push_str(state);
    }
    if let Some(country) = &job.country {
        if !location.is_empty() {
            location.push_str(", ");
        }
        location.push_str(country);
    }

    let mut summary = format!("**{}** chez {}", job.title, job.employer_name);
    if !location.is_empty() {
        summary.push_str(&format!(" - {location}"));
    }
    if let Some(kind) = &job.employment_type {
        let remote = if job.is_remote { " (Télétravail)" } else { "" };
        summary.push_str(&format!(" ({kind}{remote})"));
    }
    if let Some(posted) = &job.posted_at {
        summary.push_str(&format!("\nPublié le: {}", posted.format("%Y-%m-%d")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::EmploymentType;

    fn sample_payload() -> SearchResponse {
        serde_json::from_str(
            r#"{
                "data": [
                    {
                        "job_id": "abc123",
                        "job_title": "Data Scientist",
                        "employer_name": "Acme",
                        "job_city": "Paris",
                        "job_state": null,
                        "job_country": "FR",
                        "job_employment_type": "FULLTIME",
                        "job_is_remote": true,
                        "job_posted_at_datetime_utc": "2024-03-01T08:00:00Z",
                        "job_apply_link": "https://example.com/apply"
                    },
                    {
                        "job_id": "abc123",
                        "job_title": "Data Scientist (duplicate)",
                        "employer_name": "Acme"
                    },
                    {
                        "job_id": "def456",
                        "job_title": "ML Engineer",
                        "employer_name": "Globex",
                        "job_is_remote": false
                    },
                    {
                        "job_id": "",
                        "job_title": "No id, dropped"
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_normalization_dedupes_on_job_id() {
        let jobs = normalize_jobs(sample_payload().data);
        assert_eq!(jobs.len(), 2);
        let ids: HashSet<_> = jobs.iter().map(|j| j.job_id.clone()).collect();
        assert_eq!(ids.len(), jobs.len());
        assert_eq!(jobs[0].job_id, "abc123");
        assert!(jobs[0].is_remote);
        assert!(jobs[0].posted_at.is_some());
    }

    #[test]
    fn test_missing_fields_get_placeholders() {
        let raw: RawJob = serde_json::from_str(r#"{"job_id": "x1"}"#).unwrap();
        let job = normalize_job(raw);
        assert_eq!(job.title, "Titre non spécifié");
        assert_eq!(job.employer_name, "Entreprise non spécifiée");
        assert!(!job.is_remote);
        assert!(job.posted_at.is_none());
    }

    #[test]
    fn test_country_mapping() {
        assert_eq!(country_to_iso("France"), "fr");
        assert_eq!(country_to_iso("Allemagne"), "de");
        assert_eq!(country_to_iso("USA"), "us");
        // unknown names pass through lowercased
        assert_eq!(country_to_iso("Japon"), "japon");
    }

    #[test]
    fn test_query_building() {
        let mut params = JobSearchParameters::new("développeur Python");
        params.country = Some("France".to_string());
        params.language = Some("fr".to_string());
        params.remote_only = Some(true);
        params.employment_type = Some(EmploymentType::FullTime);

        let client = JsearchClient::new("key");
        let query = client.build_query(&params);
        assert!(query.contains(&("country".to_string(), "fr".to_string())));
        assert!(query.contains(&("remote_jobs_only".to_string(), "true".to_string())));
        assert!(query.contains(&("employment_types".to_string(), "FULLTIME".to_string())));
        assert!(query.contains(&("num_pages".to_string(), "1".to_string())));
    }

    #[test]
    fn test_job_summary_format() {
        let jobs = normalize_jobs(sample_payload().data);
        let summary = format_job_summary(&jobs[0]);
        assert!(summary.contains("**Data Scientist** chez Acme"));
        assert!(summary.contains("Paris, FR"));
        assert!(summary.contains("Télétravail"));
        assert!(summary.contains("Publié le: 2024-03-01"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let client = JsearchClient::new("");
        let err = client
            .search(&JobSearchParameters::new("rust"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobSearchError::Unavailable(_)));
    }
}
