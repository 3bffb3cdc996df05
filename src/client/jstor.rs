//! JSTOR client: query URL construction, multi-strategy result extraction,
//! and authentication delegation to the session manager.
//!
//! JSTOR markup varies with session and authentication state, so extraction
//! runs an ordered cascade of candidate selectors and falls back to scanning
//! stable-identifier anchors when none of them match.

use crate::client::{
    citation::split_venue_year, fetcher::RateLimitedFetcher, max_plausible_year,
    scholar::{parse_year_bound, SourceQuery},
    AccessStatus, Citation, Paper, MIN_PLAUSIBLE_YEAR,
};
use crate::config::{SessionConfig, SourceConfig};
use crate::session::{AuthReport, AuthStatus, InteractiveAuthenticator, SessionManager};
use crate::{Error, Result};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Hard cap on extracted results regardless of the requested count
const RESULT_CAP: usize = 20;

/// Minimum link-text length for the stable-anchor fallback; shorter text is
/// navigational
const MIN_FALLBACK_TITLE_LEN: usize = 10;

/// Candidate result-block selectors, most specific first
const BLOCK_SELECTORS: &[&str] = &[
    "li.search-result",
    "div.result-item",
    "li.result-item",
    "[data-qa='search-result']",
    "div.media",
];

const TITLE_SELECTORS: &[&str] = &["a.title", "h3 a", "div.title a", "a[href*='/stable/']"];

const AUTHOR_SELECTORS: &[&str] = &["div.contrib", "div.authors", ".author", ".metadata .contrib"];

const PUB_INFO_SELECTORS: &[&str] = &["div.src", "div.citation-line", ".citation", "div.journal-info"];

/// Page-text markers for a login-required interstitial
const LOGIN_PAGE_MARKERS: &[&str] = &[
    "log in to jstor",
    "please sign in",
    "login required",
    "institutional login",
    "access to jstor is provided by your library",
];

/// Client for the institutional source
pub struct JstorClient {
    fetcher: Arc<RateLimitedFetcher>,
    base_url: String,
    session: SessionManager,
}

impl JstorClient {
    pub fn new(
        config: &SourceConfig,
        session_config: SessionConfig,
        authenticator: Arc<dyn InteractiveAuthenticator>,
    ) -> Result<Self> {
        let fetcher = Arc::new(RateLimitedFetcher::new("JSTOR", config)?);
        let session = SessionManager::new(
            session_config,
            &config.base_url,
            authenticator,
            Arc::clone(&fetcher),
        );
        Ok(Self {
            fetcher,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Execute a search. Stored session cookies (when present and unexpired)
    /// are attached to the request; a 403 comes back with a
    /// credentials-aware message from the fetcher.
    #[instrument(skip(self, query), fields(keywords = query.keywords.len()))]
    pub async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        let url = self.build_search_url(query)?;
        let cookie_header = self.session.load_stored_cookies().await?;
        debug!(url = %url, authenticated = cookie_header.is_some(), "Fetching JSTOR results page");

        let html = self
            .fetcher
            .fetch_text(url.as_str(), cookie_header.as_deref())
            .await?;

        let mut papers = Self::extract_results(&html, &self.base_url);

        // Per-item enrichment is not implemented for JSTOR; requests for it
        // get explicit placeholders rather than invented behavior
        if query.fetch_abstracts || query.fetch_full_text {
            for paper in &mut papers {
                if query.fetch_abstracts && paper.abstract_text.is_none() {
                    paper.abstract_text =
                        Some("Abstract not available via JSTOR integration".to_string());
                }
                if query.fetch_full_text {
                    paper.access_status = AccessStatus::Restricted;
                }
            }
        }

        Ok(papers)
    }

    /// Map search parameters onto the JSTOR basic-search query string
    pub fn build_search_url(&self, query: &SourceQuery) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/action/doBasicSearch", self.base_url))
            .map_err(|e| Error::Service(format!("Invalid JSTOR base URL: {e}")))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("Query", &query.keywords.join(" "));
            params.append_pair("per_page", &query.max_results.min(100).to_string());
            if let Some(start) = &query.date_start {
                params.append_pair("sd", &parse_year_bound(start)?.to_string());
            }
            if let Some(end) = &query.date_end {
                params.append_pair("ed", &parse_year_bound(end)?.to_string());
            }
        }
        Ok(url)
    }

    /// Extract Paper records from a results page.
    ///
    /// Strategy order: login-page detection short-circuits to empty; then the
    /// first block selector yielding at least one match wins; then the
    /// stable-anchor fallback.
    #[must_use]
    pub fn extract_results(html: &str, base_url: &str) -> Vec<Paper> {
        let document = Html::parse_document(html);

        let page_text = document.root_element().text().collect::<String>().to_lowercase();
        if LOGIN_PAGE_MARKERS.iter().any(|m| page_text.contains(m)) {
            warn!("JSTOR returned a sign-in page; no results extracted");
            return Vec::new();
        }

        for selector_str in BLOCK_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            let blocks: Vec<ElementRef<'_>> = document.select(&selector).collect();
            if blocks.is_empty() {
                continue;
            }

            debug!(selector = selector_str, count = blocks.len(), "Matched JSTOR result blocks");
            return blocks
                .iter()
                .filter_map(|block| Self::extract_block(block, base_url))
                .take(RESULT_CAP)
                .collect();
        }

        debug!("No block selector matched; falling back to stable-identifier anchors");
        Self::extract_from_stable_anchors(&document, base_url)
    }

    /// Resolve the fields of one result block through per-field candidate
    /// selector lists; first match wins.
    fn extract_block(block: &ElementRef<'_>, base_url: &str) -> Option<Paper> {
        let (title, href) = TITLE_SELECTORS.iter().find_map(|selector_str| {
            let selector = Selector::parse(selector_str).ok()?;
            let link = block.select(&selector).next()?;
            let text = element_text(&link);
            if text.is_empty() {
                return None;
            }
            Some((text, link.value().attr("href").map(ToString::to_string)))
        })?;

        let mut citation = Citation::new(title);
        citation.url = href.map(|h| rebase_url(&h, base_url));

        if let Some(author_text) = first_match_text(block, AUTHOR_SELECTORS) {
            citation.authors = author_text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Some(pub_info) = first_match_text(block, PUB_INFO_SELECTORS) {
            let (venue, year) = split_venue_year(&pub_info);
            citation.venue = venue;
            citation.year =
                year.filter(|y| (MIN_PLAUSIBLE_YEAR..=max_plausible_year()).contains(y));
        }

        Some(Paper::new(citation))
    }

    /// Last-resort scan for anchors pointing at stable-identifier URLs,
    /// filtering out short navigational link text
    fn extract_from_stable_anchors(document: &Html, base_url: &str) -> Vec<Paper> {
        let Ok(selector) = Selector::parse("a[href*='/stable/']") else {
            return Vec::new();
        };

        let mut papers = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for anchor in document.select(&selector) {
            let title = element_text(&anchor);
            if title.len() <= MIN_FALLBACK_TITLE_LEN {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !seen.insert(href.to_string()) {
                continue;
            }

            let mut citation = Citation::new(title);
            citation.url = Some(rebase_url(href, base_url));
            papers.push(Paper::new(citation));

            if papers.len() >= RESULT_CAP {
                break;
            }
        }

        papers
    }

    /// Launch the interactive login flow (see session manager)
    pub async fn authenticate(&self, url: Option<&str>) -> Result<AuthReport> {
        self.session.authenticate(url).await
    }

    /// Current session status
    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        self.session.auth_status()
    }

    /// Drop persisted and cached session state
    pub async fn clear_authentication(&self) -> Result<()> {
        self.session.clear_authentication().await
    }

    /// Whether an unexpired session is available
    pub async fn has_valid_authentication(&self) -> bool {
        self.session.has_valid_authentication().await
    }
}

/// Rebase a relative URL onto the source's domain
fn rebase_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        format!("{base_url}/{href}")
    }
}

fn first_match_text(block: &ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        let element = block.select(&selector).next()?;
        let text = element_text(&element);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SystemBrowserAuthenticator;
    use std::path::PathBuf;

    const BASE: &str = "https://www.jstor.org";

    fn client() -> JstorClient {
        let authenticator = Arc::new(SystemBrowserAuthenticator::new(PathBuf::from(
            ".test_handoff.json",
        )));
        JstorClient::new(
            &SourceConfig::jstor(),
            SessionConfig::default(),
            authenticator,
        )
        .unwrap()
    }

    fn query(keywords: &[&str]) -> SourceQuery {
        SourceQuery {
            keywords: keywords.iter().map(ToString::to_string).collect(),
            max_results: 20,
            ..SourceQuery::default()
        }
    }

    #[test]
    fn test_build_search_url() {
        let mut q = query(&["colonial", "trade"]);
        q.date_start = Some("1990".to_string());
        q.date_end = Some("2005".to_string());
        let url = client().build_search_url(&q).unwrap();
        assert!(url.as_str().contains("Query=colonial+trade"));
        assert!(url.as_str().contains("sd=1990"));
        assert!(url.as_str().contains("ed=2005"));
        assert!(url.as_str().contains("per_page=20"));
    }

    #[test]
    fn test_extract_from_result_blocks() {
        let html = r#"
            <html><body>
            <li class="search-result">
              <div class="title"><a class="title" href="/stable/10.2307/1234">The Economics of Colonial Trade Networks</a></div>
              <div class="contrib">J Smith, A Jones</div>
              <div class="src">The Journal of Economic History, 1995</div>
            </li>
            <li class="search-result">
              <div class="title"><a class="title" href="https://www.jstor.org/stable/5678">Maritime Commerce in the Atlantic World</a></div>
              <div class="contrib">R Brown</div>
              <div class="src">The William and Mary Quarterly, 2001</div>
            </li>
            </body></html>
        "#;

        let papers = JstorClient::extract_results(html, BASE);
        assert_eq!(papers.len(), 2);

        let first = &papers[0].citation;
        assert_eq!(first.title, "The Economics of Colonial Trade Networks");
        assert_eq!(first.authors, vec!["J Smith", "A Jones"]);
        assert_eq!(first.venue.as_deref(), Some("The Journal of Economic History"));
        assert_eq!(first.year, Some(1995));
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.jstor.org/stable/10.2307/1234")
        );

        // Absolute URLs pass through unchanged
        assert_eq!(
            papers[1].citation.url.as_deref(),
            Some("https://www.jstor.org/stable/5678")
        );
    }

    #[test]
    fn test_stable_anchor_fallback() {
        let html = r#"
            <html><body>
            <a href="/stable/111">Home</a>
            <a href="/stable/222">A Sufficiently Long Article Title Here</a>
            <a href="/stable/222">A Sufficiently Long Article Title Here</a>
            <a href="/other/333">Another Long Title That Is Not A Stable Link</a>
            </body></html>
        "#;

        let papers = JstorClient::extract_results(html, BASE);
        assert_eq!(papers.len(), 1);
        assert_eq!(
            papers[0].citation.title,
            "A Sufficiently Long Article Title Here"
        );
        assert_eq!(
            papers[0].citation.url.as_deref(),
            Some("https://www.jstor.org/stable/222")
        );
    }

    #[test]
    fn test_login_page_short_circuits() {
        let html = r#"
            <html><body>
            <h1>Log in to JSTOR</h1>
            <a href="/stable/999">A Result That Should Not Be Extracted</a>
            </body></html>
        "#;
        assert!(JstorClient::extract_results(html, BASE).is_empty());
    }

    #[test]
    fn test_result_cap() {
        let mut html = String::from("<html><body>");
        for i in 0..30 {
            html.push_str(&format!(
                "<a href=\"/stable/{i}\">A Sufficiently Long Article Title Number {i}</a>"
            ));
        }
        html.push_str("</body></html>");

        let papers = JstorClient::extract_results(&html, BASE);
        assert_eq!(papers.len(), RESULT_CAP);
    }

    #[test]
    fn test_block_without_title_is_skipped() {
        let html = r#"
            <html><body>
            <li class="search-result"><div class="contrib">Nameless</div></li>
            <li class="search-result">
              <h3><a href="/stable/42">A Titled Result With Enough Text</a></h3>
            </li>
            </body></html>
        "#;
        let papers = JstorClient::extract_results(html, BASE);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].citation.title, "A Titled Result With Enough Text");
    }
}
