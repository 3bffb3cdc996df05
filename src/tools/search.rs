//! Search orchestration: parameter validation, limiting, post-filtering, and
//! the result/error envelope shaping for both sources.

use crate::client::{
    scholar::{parse_year_bound, SourceQuery},
    JstorClient, Paper, ScholarClient,
};
use crate::config::Config;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Default result count when the caller does not specify one
const DEFAULT_MAX_RESULTS: i64 = 20;

/// Hard ceiling applied at the limiting stage
const LIMIT_CAP: i64 = 100;

/// Looser ceiling enforced at the validation stage. Both bounds are
/// authoritative at their own stage; they are intentionally not unified.
const VALIDATION_CAP: i64 = 1000;

/// Which database a search targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    Scholar,
    Jstor,
}

impl SearchSource {
    const fn label(self) -> &'static str {
        match self {
            Self::Scholar => "Google Scholar",
            Self::Jstor => "JSTOR",
        }
    }
}

/// Inclusive date bounds; each side is a year or a full date string
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Input parameters for the search tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    /// Search keywords (required, non-empty)
    pub keywords: Vec<String>,
    /// Optional author filter, matched case-insensitively in either direction
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    /// Optional publication date range
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Maximum number of results (default 20, capped at 100)
    #[serde(default)]
    pub max_results: Option<i64>,
    /// Fetch per-paper abstracts from detail pages (Scholar only)
    #[serde(default)]
    pub fetch_abstracts: bool,
    /// Fetch per-paper full text from detail pages (Scholar only)
    #[serde(default)]
    pub fetch_full_text: bool,
}

/// Successful search envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub papers: Vec<Paper>,
    pub total_results: usize,
    /// Human-readable echo of the applied parameters
    pub search_query: String,
    /// Wall-clock duration of the whole orchestration call
    pub execution_time_ms: u64,
    /// Set to "access_restricted" when the institutional path degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Failure envelope; discriminated from `SearchResult` by the `error` tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            error: true,
            code: code.to_string(),
            message,
            details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Discriminated union returned by every search call
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Success(SearchResult),
    Failure(ErrorResponse),
}

impl SearchOutcome {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Cache entry for successful search results
#[derive(Debug, Clone)]
struct CacheEntry {
    result: SearchResult,
    timestamp: SystemTime,
    ttl: Duration,
}

impl CacheEntry {
    fn new(result: SearchResult, ttl: Duration) -> Self {
        Self {
            result,
            timestamp: SystemTime::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.timestamp.elapsed().unwrap_or(Duration::MAX) > self.ttl
    }
}

/// Search orchestrator over both database clients
#[derive(Clone)]
pub struct SearchTool {
    scholar: Arc<ScholarClient>,
    jstor: Arc<JstorClient>,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for SearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchTool")
            .field("scholar", &"ScholarClient")
            .field("jstor", &"JstorClient")
            .field("cache", &"RwLock<HashMap>")
            .finish()
    }
}

impl SearchTool {
    pub fn new(scholar: Arc<ScholarClient>, jstor: Arc<JstorClient>, config: &Config) -> Self {
        info!("Initializing search orchestrator");
        Self {
            scholar,
            jstor,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: Duration::from_secs(config.server.cache_ttl_secs),
        }
    }

    /// Execute a search against one source. Never returns a raw error: every
    /// failure is shaped into an `ErrorResponse` envelope.
    #[instrument(skip(self, input), fields(source = source.label()))]
    pub async fn search(&self, source: SearchSource, input: SearchInput) -> SearchOutcome {
        let started = Instant::now();

        if let Err(response) = Self::validate_input(&input) {
            return SearchOutcome::Failure(response);
        }

        let cache_key = Self::cache_key(source, &input);
        if let Some(cached) = self.get_from_cache(&cache_key).await {
            debug!("Returning cached search result");
            return SearchOutcome::Success(cached);
        }

        let query = Self::to_source_query(&input, source);
        let fetched = match source {
            SearchSource::Scholar => self.scholar.search(&query).await,
            SearchSource::Jstor => self.jstor.search(&query).await,
        };

        let outcome = match fetched {
            Ok(papers) => {
                let result = Self::shape_result(papers, &input, source, started.elapsed());
                self.cache_result(&cache_key, &result).await;
                SearchOutcome::Success(result)
            }
            Err(e) if source == SearchSource::Jstor => {
                // Unauthenticated institutional search is an expected
                // condition, not a bug; degrade to an explanatory notice
                warn!(error = %e, "JSTOR search failed; degrading to access-restricted notice");
                SearchOutcome::Success(SearchResult {
                    papers: Vec::new(),
                    total_results: 0,
                    search_query: Self::describe_query(&input),
                    execution_time_ms: elapsed_ms(started),
                    status: Some("access_restricted".to_string()),
                    notice: Some(format!(
                        "JSTOR search could not be completed: {e}. Use authenticate_jstor to establish an institutional session."
                    )),
                })
            }
            Err(e) => {
                warn!(error = %e, "Search execution failed");
                SearchOutcome::Failure(ErrorResponse::new(
                    "SEARCH_EXECUTION_FAILED",
                    format!("{} search failed", source.label()),
                    Some(serde_json::json!({ "cause": e.to_string() })),
                ))
            }
        };

        info!(
            elapsed_ms = elapsed_ms(started),
            error = outcome.is_error(),
            "Search completed"
        );
        outcome
    }

    /// Validate input in fixed order; the first failure wins
    fn validate_input(input: &SearchInput) -> Result<(), ErrorResponse> {
        if input.keywords.is_empty() {
            return Err(ErrorResponse::new(
                "EMPTY_KEYWORDS",
                "At least one search keyword is required".to_string(),
                None,
            ));
        }
        if input.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ErrorResponse::new(
                "INVALID_KEYWORDS",
                "Keywords must be non-blank strings".to_string(),
                None,
            ));
        }

        if let Some(authors) = &input.authors {
            if authors.iter().any(|a| a.trim().is_empty()) {
                return Err(ErrorResponse::new(
                    "INVALID_AUTHORS",
                    "Authors must be non-blank strings".to_string(),
                    None,
                ));
            }
        }

        if let Some(range) = &input.date_range {
            let mut start_year = None;
            let mut end_year = None;
            for (bound, slot) in [(&range.start, &mut start_year), (&range.end, &mut end_year)] {
                if let Some(value) = bound {
                    match parse_year_bound(value) {
                        Ok(year) => *slot = Some(year),
                        Err(e) => {
                            return Err(ErrorResponse::new(
                                "INVALID_DATE_FORMAT",
                                e.to_string(),
                                None,
                            ));
                        }
                    }
                }
            }
            if let (Some(start), Some(end)) = (start_year, end_year) {
                if start > end {
                    return Err(ErrorResponse::new(
                        "INVALID_DATE_RANGE",
                        format!("Start year {start} is after end year {end}"),
                        None,
                    ));
                }
            }
        }

        if let Some(max) = input.max_results {
            if !(1..=VALIDATION_CAP).contains(&max) {
                return Err(ErrorResponse::new(
                    "INVALID_MAX_RESULTS",
                    format!("maxResults must be between 1 and {VALIDATION_CAP}"),
                    None,
                ));
            }
        }

        Ok(())
    }

    /// Effective result limit: default 20, clamped to the 100 cap
    fn effective_limit(input: &SearchInput) -> usize {
        let requested = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        usize::try_from(requested.clamp(1, LIMIT_CAP)).unwrap_or(DEFAULT_MAX_RESULTS as usize)
    }

    fn to_source_query(input: &SearchInput, source: SearchSource) -> SourceQuery {
        SourceQuery {
            keywords: input.keywords.clone(),
            // Author query clauses are supported by the open-access source
            // only; the post-filter below covers both
            authors: match source {
                SearchSource::Scholar => input.authors.clone().unwrap_or_default(),
                SearchSource::Jstor => Vec::new(),
            },
            date_start: input.date_range.as_ref().and_then(|r| r.start.clone()),
            date_end: input.date_range.as_ref().and_then(|r| r.end.clone()),
            max_results: u32::try_from(Self::effective_limit(input)).unwrap_or(20),
            fetch_abstracts: input.fetch_abstracts,
            fetch_full_text: input.fetch_full_text,
        }
    }

    /// Apply post-fetch filters and truncation, preserving source order
    fn shape_result(
        papers: Vec<Paper>,
        input: &SearchInput,
        source: SearchSource,
        elapsed: Duration,
    ) -> SearchResult {
        let mut papers = papers;

        if let Some(authors) = input.authors.as_ref().filter(|a| !a.is_empty()) {
            papers.retain(|p| Self::matches_authors(p, authors));
        }

        if let Some(range) = &input.date_range {
            let start = range.start.as_deref().and_then(|s| parse_year_bound(s).ok());
            let end = range.end.as_deref().and_then(|s| parse_year_bound(s).ok());
            if start.is_some() || end.is_some() {
                papers.retain(|p| match p.citation.year {
                    Some(year) => {
                        start.map_or(true, |s| year >= s) && end.map_or(true, |e| year <= e)
                    }
                    // Papers without a year cannot satisfy a date filter
                    None => false,
                });
            }
        }

        papers.truncate(Self::effective_limit(input));

        debug!(
            source = source.label(),
            count = papers.len(),
            "Shaped search result"
        );

        SearchResult {
            total_results: papers.len(),
            search_query: Self::describe_query(input),
            execution_time_ms: elapsed.as_millis() as u64,
            status: None,
            notice: None,
            papers,
        }
    }

    /// Case-insensitive bidirectional substring match between requested and
    /// extracted author names
    fn matches_authors(paper: &Paper, requested: &[String]) -> bool {
        requested.iter().any(|req| {
            let req = req.trim().to_lowercase();
            paper.citation.authors.iter().any(|author| {
                let author = author.trim().to_lowercase();
                author.contains(&req) || req.contains(&author)
            })
        })
    }

    /// Human-readable echo of the applied parameters
    fn describe_query(input: &SearchInput) -> String {
        let mut parts = vec![format!("keywords: {}", input.keywords.join(" "))];
        if let Some(authors) = input.authors.as_ref().filter(|a| !a.is_empty()) {
            parts.push(format!("authors: {}", authors.join(", ")));
        }
        if let Some(range) = &input.date_range {
            let start = range.start.as_deref().unwrap_or("*");
            let end = range.end.as_deref().unwrap_or("*");
            if range.start.is_some() || range.end.is_some() {
                parts.push(format!("dates: {start}..{end}"));
            }
        }
        parts.push(format!("limit: {}", Self::effective_limit(input)));
        parts.join("; ")
    }

    fn cache_key(source: SearchSource, input: &SearchInput) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            source.label(),
            input.keywords.join(" ").to_lowercase(),
            input
                .authors
                .as_ref()
                .map(|a| a.join(",").to_lowercase())
                .unwrap_or_default(),
            input
                .date_range
                .as_ref()
                .map(|r| format!(
                    "{}-{}",
                    r.start.as_deref().unwrap_or(""),
                    r.end.as_deref().unwrap_or("")
                ))
                .unwrap_or_default(),
            input.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            input.fetch_abstracts,
            input.fetch_full_text,
        )
    }

    async fn get_from_cache(&self, cache_key: &str) -> Option<SearchResult> {
        let cache = self.cache.read().await;
        cache
            .get(cache_key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.result.clone())
    }

    async fn cache_result(&self, cache_key: &str, result: &SearchResult) {
        let mut cache = self.cache.write().await;
        cache.insert(
            cache_key.to_string(),
            CacheEntry::new(result.clone(), self.cache_ttl),
        );
        cache.retain(|_, entry| !entry.is_expired());
        debug!(size = cache.len(), "Cached search result");
    }

    /// Clear cache (useful for testing)
    #[allow(dead_code)]
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
