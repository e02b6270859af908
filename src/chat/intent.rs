//! Job Search Intent Detection
//!
//! Rule-based classification of incoming chat messages. The detector is a
//! pipeline of independent matchers, each contributing an optional signal
//! (job cue found, location extracted, remote preference, ...), combined by
//! a deterministic reducer. No LLM call is involved, so identical input
//! always classifies identically within a process run.

use super::types::{DatePosted, EmploymentType, IntentClassification, JobSearchParameters};
use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================
// MATCHER CONTRIBUTIONS
// ============================================================

/// One structured signal produced by a matcher
#[derive(Debug, Clone, PartialEq)]
enum Contribution {
    /// Job-intent vocabulary is present
    JobCue,
    /// A known place name was mentioned (canonical name, e.g. "France")
    Country(String),
    /// Remote / télétravail preference
    Remote,
    Employment(EmploymentType),
    Posted(DatePosted),
}

type Matcher = fn(&str) -> Option<Contribution>;

/// The matcher pipeline, run in fixed order over the lowercased message
const MATCHERS: &[Matcher] = &[
    match_job_cue,
    match_country,
    match_remote,
    match_employment_type,
    match_date_posted,
];

// ============================================================
// CUE VOCABULARY
// ============================================================

/// Job-intent vocabulary, French first (the reference deployment's
/// primary locale) with English equivalents.
const JOB_KEYWORDS: &[&str] = &[
    "emploi",
    "job",
    "travail",
    "poste",
    "carrière",
    "recrutement",
    "cherche",
    "recherche",
    "offre",
    "candidature",
    "embauche",
    "hiring",
    "vacancy",
];

static SEARCH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(cherche|recherche|trouve|trouver)\b.*\b(emploi|job|travail|poste)",
        r"(emploi|job|travail|poste)\b.*\b(en|à|dans|pour)\b",
        r"offres?\s+d.emploi",
        r"(looking|searching)\s+for\b.*\b(job|work|position)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("search pattern"))
    .collect()
});

/// Known place names mapped to canonical country names. The job client
/// owns the mapping from canonical names to upstream ISO codes.
const COUNTRIES: &[(&str, &str)] = &[
    ("france", "France"),
    ("french", "France"),
    ("paris", "France"),
    ("lyon", "France"),
    ("allemagne", "Allemagne"),
    ("germany", "Allemagne"),
    ("berlin", "Allemagne"),
    ("espagne", "Espagne"),
    ("spain", "Espagne"),
    ("madrid", "Espagne"),
    ("italie", "Italie"),
    ("italy", "Italie"),
    ("rome", "Italie"),
    ("belgique", "Belgique"),
    ("belgium", "Belgique"),
    ("bruxelles", "Belgique"),
    ("suisse", "Suisse"),
    ("switzerland", "Suisse"),
    ("canada", "Canada"),
    ("usa", "USA"),
    ("united states", "USA"),
];

fn match_job_cue(message: &str) -> Option<Contribution> {
    let has_keyword = JOB_KEYWORDS.iter().any(|k| message.contains(k));
    let matches_pattern = SEARCH_PATTERNS.iter().any(|p| p.is_match(message));
    (has_keyword || matches_pattern).then_some(Contribution::JobCue)
}

fn match_country(message: &str) -> Option<Contribution> {
    COUNTRIES
        .iter()
        .find(|(name, _)| message.contains(name))
        .map(|(_, canonical)| Contribution::Country((*canonical).to_string()))
}

fn match_remote(message: &str) -> Option<Contribution> {
    let remote = message.contains("remote")
        || message.contains("télétravail")
        || message.contains("teletravail")
        || message.contains("à distance");
    remote.then_some(Contribution::Remote)
}

fn match_employment_type(message: &str) -> Option<Contribution> {
    let kind = if message.contains("temps plein") || message.contains("fulltime") {
        EmploymentType::FullTime
    } else if message.contains("temps partiel") || message.contains("parttime") {
        EmploymentType::PartTime
    } else if message.contains("freelance") || message.contains("contractor") {
        EmploymentType::Contractor
    } else if message.contains("stage") || message.contains("intern") {
        EmploymentType::Intern
    } else {
        return None;
    };
    Some(Contribution::Employment(kind))
}

fn match_date_posted(message: &str) -> Option<Contribution> {
    let when = if message.contains("aujourd'hui") || message.contains("today") {
        DatePosted::Today
    } else if message.contains("3 jours") || message.contains("3 days") {
        DatePosted::ThreeDays
    } else if message.contains("cette semaine") || message.contains("this week") {
        DatePosted::Week
    } else if message.contains("ce mois") || message.contains("this month") {
        DatePosted::Month
    } else {
        return None;
    };
    Some(Contribution::Posted(when))
}

// ============================================================
// QUERY EXTRACTION
// ============================================================

/// Intent phrasing stripped out before the remainder becomes the free-text
/// query. Longer alternatives first so partial phrases don't survive.
static CUE_PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(offres?\s+d.emplois?|je\s+cherche|je\s+recherche|je\s+voudrais|je\s+veux|tu\s+peux\s+trouver|trouve[rz]?([-\s]moi)?|cherche[rz]?|recherche[rz]?|looking\s+for|searching\s+for|search\s+for|find\s+me|un\s+emploi\s+(de|en|d')?|un\s+emploi|un\s+poste\s+(de|en|d')?|un\s+poste|un\s+job\s+(de|en|d')?|un\s+job|un\s+travail\s+(de|en|d')?|un\s+travail|du\s+travail|des\s+emplois?|a\s+job\s+(as|in)?|emplois?|postes?|jobs?|travail|recrutement|embauche|candidature)\b",
    )
    .expect("cue phrase pattern")
});

/// Location phrasing ("en France", "à Paris", bare place names) and remote
/// markers, stripped so they don't pollute the query text.
static LOCATION_PHRASES: Lazy<Regex> = Lazy::new(|| {
    let names = COUNTRIES
        .iter()
        .map(|(name, _)| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)\b((en|à|au|aux|dans|in)\s+)?({names}|remote|télétravail|teletravail|à\s+distance)\b"
    ))
    .expect("location phrase pattern")
});

static EMPLOYMENT_PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(temps\s+plein|temps\s+partiel|fulltime|parttime|full[-\s]time|part[-\s]time|freelance|contractor|stage|internship|intern)\b")
        .expect("employment phrase pattern")
});

/// Connector tokens trimmed from the edges of the extracted query
const EDGE_STOPWORDS: &[&str] = &[
    "de", "d'", "du", "des", "un", "une", "le", "la", "les", "pour", "en", "à", "au", "aux",
    "dans", "comme", "a", "an", "as", "for", "in", "me", "moi",
];

/// Remove cue, location and employment phrases from the original-cased
/// message; whatever survives is the free-text query.
fn extract_query(message: &str) -> Option<String> {
    let stripped = CUE_PHRASES.replace_all(message, " ");
    let stripped = LOCATION_PHRASES.replace_all(&stripped, " ");
    let stripped = EMPLOYMENT_PHRASES.replace_all(&stripped, " ");

    let mut tokens: Vec<&str> = stripped
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ';' | ':'))
        .filter(|t| !t.is_empty())
        .collect();

    while let Some(first) = tokens.first() {
        if EDGE_STOPWORDS.contains(&first.to_lowercase().as_str()) {
            tokens.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = tokens.last() {
        if EDGE_STOPWORDS.contains(&last.to_lowercase().as_str()) {
            tokens.pop();
        } else {
            break;
        }
    }

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

// ============================================================
// DETECTOR
// ============================================================

/// Classifies messages as job-search requests vs. general chat
#[derive(Debug, Clone)]
pub struct IntentDetector {
    default_language: String,
}

impl IntentDetector {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
        }
    }

    /// Classify one message. Never panics; empty or whitespace-only input
    /// classifies as general chat with no parameters.
    pub fn classify(&self, message: &str) -> IntentClassification {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return IntentClassification::general_chat();
        }

        let lowered = trimmed.to_lowercase();
        let contributions: Vec<Contribution> =
            MATCHERS.iter().filter_map(|m| m(&lowered)).collect();

        self.reduce(trimmed, contributions)
    }

    /// Deterministic reducer: a job-search classification requires both a
    /// job cue and a usable free-text query. A cue with nothing left after
    /// stripping ("je cherche") falls back to general chat so an empty
    /// query is never sent downstream.
    fn reduce(&self, message: &str, contributions: Vec<Contribution>) -> IntentClassification {
        if !contributions.contains(&Contribution::JobCue) {
            return IntentClassification::general_chat();
        }

        let query = match extract_query(message) {
            Some(q) => q,
            None => return IntentClassification::general_chat(),
        };

        let mut params = JobSearchParameters::new(&query);
        params.language = Some(self.default_language.clone());
        for contribution in &contributions {
            match contribution {
                Contribution::JobCue => {}
                Contribution::Country(name) => params.country = Some(name.clone()),
                Contribution::Remote => params.remote_only = Some(true),
                Contribution::Employment(kind) => params.employment_type = Some(*kind),
                Contribution::Posted(when) => params.date_posted = Some(*when),
            }
        }

        // More matched cues, higher confidence. Telemetry only.
        let confidence = (contributions.len() as f32 / 4.0).min(1.0);

        IntentClassification {
            is_job_search: true,
            confidence: Some(confidence),
            parameters: Some(params),
        }
    }
}
