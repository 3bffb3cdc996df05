//! Google Scholar client: query URL construction, organic result block
//! extraction, and optional per-paper abstract/full-text enrichment.

use crate::client::{
    citation::parse_author_info, fetcher::RateLimitedFetcher, max_plausible_year, AccessStatus,
    Citation, Paper, MIN_PLAUSIBLE_YEAR,
};
use crate::config::SourceConfig;
use crate::{Error, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};
use url::Url;

/// Query parameters resolved by the orchestrator before a client call
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub keywords: Vec<String>,
    pub authors: Vec<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub max_results: u32,
    pub fetch_abstracts: bool,
    pub fetch_full_text: bool,
}

/// Parse the leading 4-digit year out of a date bound (`"2015"` or
/// `"2015-06-01"`), validating plausibility.
pub fn parse_year_bound(value: &str) -> Result<u16> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    let year: u16 = if digits.len() == 4 {
        digits.parse().unwrap_or(0)
    } else {
        0
    };
    if year < MIN_PLAUSIBLE_YEAR || year > max_plausible_year() {
        return Err(Error::InvalidInput {
            field: "dateRange".to_string(),
            reason: format!("'{value}' must start with a 4-digit year between {MIN_PLAUSIBLE_YEAR} and {}", max_plausible_year()),
        });
    }
    Ok(year)
}

fn cited_by_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Cited by (\d+)").expect("static regex"))
}

fn sentence_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\. +([A-Z])").expect("static regex"))
}

/// Keywords whose presence marks a page as paywalled
const PAYWALL_KEYWORDS: &[&str] = &[
    "subscription required",
    "purchase this article",
    "paywall",
    "institutional access required",
    "buy this article",
    "rent this article",
    "sign in to purchase",
];

/// CSS markers for paywall chrome
const PAYWALL_SELECTORS: &[&str] = &[".paywall", "#paywall", ".subscription-required", ".purchase-options"];

/// Abstract container candidates, tried in order
const ABSTRACT_SELECTORS: &[&str] = &[
    "div.abstract",
    "div#abstract",
    "section.abstract",
    ".abstract-text",
    ".abstractSection",
    "div[class*='abstract']",
];

/// Full-text container candidates scored against each other
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "div.article-body",
    "div.article-content",
    "div.fulltext",
    "div#content",
    "div.content",
    "div.main-content",
];

const ACADEMIC_KEYWORDS: &[&str] = &[
    "abstract",
    "introduction",
    "methodology",
    "results",
    "conclusion",
    "references",
];

const CHROME_KEYWORDS: &[&str] = &["navigation", "menu", "footer", "header", "sidebar"];

/// Client for the open-access source
pub struct ScholarClient {
    fetcher: RateLimitedFetcher,
    base_url: String,
}

impl ScholarClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            fetcher: RateLimitedFetcher::new("Google Scholar", config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Execute a search: build the query URL, fetch, extract, then enrich
    /// papers one at a time when requested.
    #[instrument(skip(self, query), fields(keywords = query.keywords.len()))]
    pub async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        let url = self.build_search_url(query)?;
        debug!(url = %url, "Fetching Scholar results page");

        let html = self.fetcher.fetch_text(url.as_str(), None).await?;
        let mut papers = Self::extract_results(&html);

        if query.fetch_abstracts || query.fetch_full_text {
            // Enrichment is sequential; each detail fetch goes through the
            // same spacing rule as the search itself
            for paper in &mut papers {
                self.enrich(paper, query.fetch_abstracts, query.fetch_full_text)
                    .await;
            }
        }

        Ok(papers)
    }

    /// Map search parameters onto the Scholar query string
    pub fn build_search_url(&self, query: &SourceQuery) -> Result<Url> {
        let mut q = query.keywords.join(" ");
        if !query.authors.is_empty() {
            let author_clause = query
                .authors
                .iter()
                .map(|a| format!("author:\"{a}\""))
                .collect::<Vec<_>>()
                .join(" OR ");
            q.push(' ');
            q.push_str(&author_clause);
        }

        let mut url = Url::parse(&format!("{}/scholar", self.base_url))
            .map_err(|e| Error::Service(format!("Invalid Scholar base URL: {e}")))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("q", &q);
            params.append_pair("hl", "en");
            params.append_pair("num", &query.max_results.min(100).to_string());
            if let Some(start) = &query.date_start {
                params.append_pair("as_ylo", &parse_year_bound(start)?.to_string());
            }
            if let Some(end) = &query.date_end {
                params.append_pair("as_yhi", &parse_year_bound(end)?.to_string());
            }
        }
        Ok(url)
    }

    /// Extract Paper records from a results page. Each organic result sits in
    /// a `div.gs_r.gs_or.gs_scl` block; missing inner elements degrade to
    /// absent fields rather than errors.
    #[must_use]
    pub fn extract_results(html: &str) -> Vec<Paper> {
        let document = Html::parse_document(html);

        let block = Selector::parse("div.gs_r.gs_or.gs_scl").expect("static selector");
        let title_link = Selector::parse("h3.gs_rt a").expect("static selector");
        let title_any = Selector::parse("h3.gs_rt").expect("static selector");
        let byline = Selector::parse("div.gs_a").expect("static selector");
        let snippet = Selector::parse("div.gs_rs").expect("static selector");
        let footer_links = Selector::parse("div.gs_fl a").expect("static selector");

        let max_year = max_plausible_year();
        let mut papers = Vec::new();

        for item in document.select(&block) {
            let (title, url) = if let Some(link) = item.select(&title_link).next() {
                (
                    collect_text(&link),
                    link.value().attr("href").map(ToString::to_string),
                )
            } else if let Some(heading) = item.select(&title_any).next() {
                (collect_text(&heading), None)
            } else {
                continue;
            };

            if title.is_empty() {
                continue;
            }

            let mut citation = Citation::new(title);
            citation.url = url;

            if let Some(meta) = item.select(&byline).next() {
                let info = parse_author_info(&collect_text(&meta));
                citation.authors = info.authors;
                citation.venue = info.venue;
                // Independent plausibility check on top of the token format
                citation.year = info
                    .year
                    .filter(|y| (MIN_PLAUSIBLE_YEAR..=max_year).contains(y));
            }

            for link in item.select(&footer_links) {
                let text = collect_text(&link);
                if let Some(caps) = cited_by_regex().captures(&text) {
                    citation.citation_count = caps[1].parse().ok();
                    break;
                }
            }

            let mut paper = Paper::new(citation);
            if let Some(snippet_elem) = item.select(&snippet).next() {
                let text = collect_text(&snippet_elem);
                if !text.is_empty() {
                    paper.abstract_text = Some(text);
                }
            }

            papers.push(paper);
        }

        debug!(count = papers.len(), "Extracted Scholar result blocks");
        papers
    }

    /// Fetch the detail page and populate abstract/full-text fields that are
    /// still absent. Extraction failures degrade to missing fields.
    async fn enrich(&self, paper: &mut Paper, fetch_abstract: bool, fetch_full_text: bool) {
        let Some(url) = paper.citation.url.clone() else {
            if fetch_full_text {
                paper.access_status = AccessStatus::Unavailable;
            }
            return;
        };

        if fetch_abstract && paper.abstract_text.is_none() {
            match self.fetcher.fetch_text(&url, None).await {
                Ok(html) => paper.abstract_text = Self::extract_abstract(&html),
                Err(e) => warn!(url = %url, error = %e, "Abstract fetch failed"),
            }
        }

        if fetch_full_text && paper.full_text.is_none() {
            match self.fetcher.fetch_text(&url, None).await {
                Ok(html) => {
                    let (status, text) = Self::extract_full_text(&html);
                    paper.access_status = status;
                    paper.full_text = text;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Full-text fetch failed");
                    paper.access_status = AccessStatus::Unavailable;
                }
            }
        }
    }

    /// Locate an abstract on a detail page: ordered container selectors, then
    /// meta-description fallbacks. Candidates are accepted only when the raw
    /// text is within [50, 5000) chars and at least 20 chars remain after
    /// whitespace normalization and stripping a leading "Abstract:" label.
    #[must_use]
    pub fn extract_abstract(html: &str) -> Option<String> {
        let document = Html::parse_document(html);

        for selector_str in ABSTRACT_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            if let Some(element) = document.select(&selector).next() {
                let raw = element.text().collect::<String>();
                if let Some(cleaned) = clean_abstract(&raw) {
                    return Some(cleaned);
                }
            }
        }

        for meta_selector in ["meta[name='description']", "meta[property='og:description']"] {
            let Ok(selector) = Selector::parse(meta_selector) else {
                continue;
            };
            if let Some(content) = document
                .select(&selector)
                .next()
                .and_then(|e| e.value().attr("content"))
            {
                if let Some(cleaned) = clean_abstract(content) {
                    return Some(cleaned);
                }
            }
        }

        None
    }

    /// Full-text heuristic: paywall scan first, then score candidate content
    /// containers and classify by the winner's length.
    #[must_use]
    pub fn extract_full_text(html: &str) -> (AccessStatus, Option<String>) {
        let document = Html::parse_document(html);

        let page_text = document.root_element().text().collect::<String>();
        let lowered = page_text.to_lowercase();
        if PAYWALL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return (AccessStatus::Restricted, None);
        }
        for selector_str in PAYWALL_SELECTORS {
            if let Ok(selector) = Selector::parse(selector_str) {
                if document.select(&selector).next().is_some() {
                    return (AccessStatus::Restricted, None);
                }
            }
        }

        let mut best: Option<(i64, String)> = None;
        let mut longest_len = 0usize;

        for selector_str in CONTENT_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&selector) {
                let text = element.text().collect::<String>();
                let len = text.trim().len();
                longest_len = longest_len.max(len);
                if len <= 500 {
                    continue;
                }

                let score = score_content(&element, &text, len);
                if best.as_ref().map_or(true, |(s, _)| score > *s) {
                    best = Some((score, text));
                }
            }
        }

        match best {
            Some((_, text)) if text.trim().len() > 1000 => {
                (AccessStatus::Free, Some(reflow_text(&text)))
            }
            Some(_) => (AccessStatus::Restricted, None),
            None if longest_len >= 200 => (AccessStatus::Restricted, None),
            None => (AccessStatus::Unavailable, None),
        }
    }
}

/// Text-length score with bonuses for academic section keywords and penalties
/// for UI chrome
fn score_content(element: &ElementRef<'_>, text: &str, len: usize) -> i64 {
    let lowered = text.to_lowercase();
    let markers = format!(
        "{} {}",
        element.value().attr("class").unwrap_or(""),
        element.value().attr("id").unwrap_or("")
    )
    .to_lowercase();

    let mut score = len as i64;
    for keyword in ACADEMIC_KEYWORDS {
        if lowered.contains(keyword) {
            score += 200;
        }
    }
    for keyword in CHROME_KEYWORDS {
        if markers.contains(keyword) || lowered.contains(keyword) {
            score -= 200;
        }
    }
    score
}

/// Normalize whitespace and strip a leading "Abstract:" label; None if the
/// candidate fails the acceptance bounds
fn clean_abstract(raw: &str) -> Option<String> {
    let len = raw.len();
    if !(50..5000).contains(&len) {
        return None;
    }

    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = normalized
        .strip_prefix("Abstract:")
        .or_else(|| normalized.strip_prefix("ABSTRACT:"))
        .or_else(|| normalized.strip_prefix("Abstract"))
        .unwrap_or(&normalized)
        .trim();

    if stripped.len() >= 20 {
        Some(stripped.to_string())
    } else {
        None
    }
}

/// Collapse whitespace runs and re-insert paragraph breaks after
/// sentence-ending periods
fn reflow_text(raw: &str) -> String {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    sentence_break_regex()
        .replace_all(&normalized, ".\n\n$1")
        .into_owned()
}

fn collect_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    fn client() -> ScholarClient {
        ScholarClient::new(&SourceConfig::scholar()).unwrap()
    }

    fn query(keywords: &[&str]) -> SourceQuery {
        SourceQuery {
            keywords: keywords.iter().map(ToString::to_string).collect(),
            max_results: 20,
            ..SourceQuery::default()
        }
    }

    #[test]
    fn test_build_search_url_basic() {
        let url = client().build_search_url(&query(&["machine", "learning"])).unwrap();
        assert!(url.as_str().contains("q=machine+learning"));
        assert!(url.as_str().contains("num=20"));
        assert!(url.as_str().contains("hl=en"));
    }

    #[test]
    fn test_build_search_url_authors_or_combined() {
        let mut q = query(&["deep learning"]);
        q.authors = vec!["Hinton".to_string(), "LeCun".to_string()];
        let url = client().build_search_url(&q).unwrap();
        let q_value = url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(q_value, "deep learning author:\"Hinton\" OR author:\"LeCun\"");
    }

    #[test]
    fn test_build_search_url_year_bounds() {
        let mut q = query(&["test"]);
        q.date_start = Some("2015".to_string());
        q.date_end = Some("2020-12-31".to_string());
        let url = client().build_search_url(&q).unwrap();
        assert!(url.as_str().contains("as_ylo=2015"));
        assert!(url.as_str().contains("as_yhi=2020"));
    }

    #[test]
    fn test_build_search_url_clamps_num() {
        let mut q = query(&["test"]);
        q.max_results = 500;
        let url = client().build_search_url(&q).unwrap();
        assert!(url.as_str().contains("num=100"));
    }

    #[test]
    fn test_invalid_date_rejected() {
        let mut q = query(&["test"]);
        q.date_start = Some("15-06".to_string());
        assert!(client().build_search_url(&q).is_err());

        q.date_start = Some("1492".to_string());
        assert!(client().build_search_url(&q).is_err());
    }

    #[test]
    fn test_parse_year_bound_full_date() {
        assert_eq!(parse_year_bound("2019-01-31").unwrap(), 2019);
        assert!(parse_year_bound("next year").is_err());
    }

    const TWO_RESULT_PAGE: &str = r#"
        <html><body>
        <div class="gs_r gs_or gs_scl">
          <h3 class="gs_rt"><a href="https://example.org/attention">Attention Is All You Need</a></h3>
          <div class="gs_a">A Vaswani, N Shazeer - Advances in neural information processing systems, 2017 - proceedings.neurips.cc</div>
          <div class="gs_rs">The dominant sequence transduction models are based on complex recurrent networks...</div>
          <div class="gs_fl"><a href="/scholar?cites=1">Cited by 90000</a><a href="/scholar?related=1">Related articles</a></div>
        </div>
        <div class="gs_r gs_or gs_scl">
          <h3 class="gs_rt"><a href="https://example.org/ml">Machine learning: Trends, perspectives, and prospects</a></h3>
          <div class="gs_a">MI Jordan, TM Mitchell - Science, 2015 - science.org</div>
          <div class="gs_rs">Machine learning addresses the question of how to build computers that improve...</div>
          <div class="gs_fl"><a href="/scholar?cites=2">Cited by 12000</a></div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_two_result_blocks_in_order() {
        let papers = ScholarClient::extract_results(TWO_RESULT_PAGE);
        assert_eq!(papers.len(), 2);

        let first = &papers[0].citation;
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.authors, vec!["A Vaswani", "N Shazeer"]);
        assert_eq!(
            first.venue.as_deref(),
            Some("Advances in neural information processing systems")
        );
        assert_eq!(first.year, Some(2017));
        assert_eq!(first.citation_count, Some(90000));
        assert_eq!(first.url.as_deref(), Some("https://example.org/attention"));

        let second = &papers[1].citation;
        assert_eq!(second.authors, vec!["MI Jordan", "TM Mitchell"]);
        assert_eq!(second.venue.as_deref(), Some("Science"));
        assert_eq!(second.year, Some(2015));
        assert!(papers[1].abstract_text.as_deref().unwrap().starts_with("Machine learning"));
    }

    #[test]
    fn test_extract_empty_page() {
        assert!(ScholarClient::extract_results("<html><body></body></html>").is_empty());
    }

    #[test]
    fn test_extract_missing_cited_by_is_none() {
        let html = r#"
            <div class="gs_r gs_or gs_scl">
              <h3 class="gs_rt"><a href="https://x.org/p">Some Paper</a></h3>
              <div class="gs_a">A Author - Venue, 2019</div>
              <div class="gs_fl"><a href="/scholar?related=1">Related articles</a></div>
            </div>
        "#;
        let papers = ScholarClient::extract_results(html);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].citation.citation_count, None);
    }

    #[test]
    fn test_implausible_year_dropped() {
        let html = r#"
            <div class="gs_r gs_or gs_scl">
              <h3 class="gs_rt"><a href="https://x.org/p">Old Manuscript</a></h3>
              <div class="gs_a">A Monk - Scriptorium, 1450</div>
            </div>
        "#;
        let papers = ScholarClient::extract_results(html);
        assert_eq!(papers[0].citation.year, None);
    }

    #[test]
    fn test_abstract_acceptance_bounds() {
        let long_body = "x".repeat(120);
        let html = format!(
            "<html><body><div class=\"abstract\">Abstract: {long_body}</div></body></html>"
        );
        let result = ScholarClient::extract_abstract(&html);
        assert!(result.is_some());
        assert!(!result.unwrap().starts_with("Abstract:"));

        // Too short to accept
        let html = "<html><body><div class=\"abstract\">Tiny.</div></body></html>";
        assert!(ScholarClient::extract_abstract(html).is_none());
    }

    #[test]
    fn test_abstract_meta_fallback() {
        let description = "This paper studies long-range dependency modeling in sequence transduction with attention mechanisms.";
        let html = format!(
            "<html><head><meta name=\"description\" content=\"{description}\"></head><body></body></html>"
        );
        assert_eq!(
            ScholarClient::extract_abstract(&html).as_deref(),
            Some(description)
        );
    }

    #[test]
    fn test_full_text_paywall_detected() {
        let html = "<html><body><div>Subscription required to read this article.</div></body></html>";
        let (status, text) = ScholarClient::extract_full_text(html);
        assert_eq!(status, AccessStatus::Restricted);
        assert!(text.is_none());
    }

    #[test]
    fn test_full_text_free_when_long_content() {
        let body = "Introduction. ".repeat(120); // > 1000 chars, academic keyword
        let html = format!("<html><body><article>{body}</article></body></html>");
        let (status, text) = ScholarClient::extract_full_text(&html);
        assert_eq!(status, AccessStatus::Free);
        let text = text.unwrap();
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_full_text_mid_length_is_restricted() {
        let body = "a ".repeat(400); // ~800 chars
        let html = format!("<html><body><article>{body}</article></body></html>");
        let (status, text) = ScholarClient::extract_full_text(&html);
        assert_eq!(status, AccessStatus::Restricted);
        assert!(text.is_none());
    }

    #[test]
    fn test_full_text_unavailable_when_nothing_matches() {
        let html = "<html><body><p>stub</p></body></html>";
        let (status, _) = ScholarClient::extract_full_text(html);
        assert_eq!(status, AccessStatus::Unavailable);
    }

    #[test]
    fn test_reflow_inserts_paragraph_breaks() {
        let raw = "First sentence ends here. Second sentence starts. third clause stays inline.";
        let reflowed = reflow_text(raw);
        assert!(reflowed.contains("here.\n\nSecond"));
        assert!(!reflowed.contains("starts.\n\nthird"));
    }
}
