pub mod citation;
pub mod fetcher;
pub mod jstor;
pub mod scholar;

pub use citation::{parse_author_info, AuthorInfo};
pub use fetcher::RateLimitedFetcher;
pub use jstor::JstorClient;
pub use scholar::ScholarClient;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Oldest publication year considered plausible
pub const MIN_PLAUSIBLE_YEAR: u16 = 1900;

/// Newest plausible publication year (in-press papers are dated ahead)
#[must_use]
pub fn max_plausible_year() -> u16 {
    u16::try_from(chrono::Utc::now().year()).unwrap_or(u16::MAX) + 10
}

/// Whether a full-text page appears to be freely readable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Free,
    Restricted,
    Unavailable,
    Unknown,
}

/// Structured bibliographic record extracted from a result page
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Paper title
    pub title: String,
    /// Authors in source order
    pub authors: Vec<String>,
    /// Journal or conference venue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// Publication year
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Digital Object Identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Direct URL to the article
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Number of citing works, when the source reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
}

impl Citation {
    /// Create a citation carrying only a title
    #[must_use]
    pub fn new(title: String) -> Self {
        Self {
            title,
            authors: Vec::new(),
            venue: None,
            year: None,
            doi: None,
            url: None,
            citation_count: None,
        }
    }
}

/// A search hit: one citation plus optional enrichment
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    #[serde(flatten)]
    pub citation: Citation,
    /// Abstract text, populated during extraction (snippet) or enrichment
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Full text, populated only by the enrichment pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    pub access_status: AccessStatus,
}

impl Paper {
    /// Wrap a citation with no enrichment yet
    #[must_use]
    pub fn new(citation: Citation) -> Self {
        Self {
            citation,
            abstract_text: None,
            full_text: None,
            access_status: AccessStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_year_window() {
        let max = max_plausible_year();
        assert!(max > 2030);
        assert!(MIN_PLAUSIBLE_YEAR < max);
    }

    #[test]
    fn test_paper_starts_unenriched() {
        let paper = Paper::new(Citation::new("Attention Is All You Need".to_string()));
        assert!(paper.abstract_text.is_none());
        assert!(paper.full_text.is_none());
        assert_eq!(paper.access_status, AccessStatus::Unknown);
    }
}
