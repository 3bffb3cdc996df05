//! Free-text citation byline parsing.
//!
//! Sources render the author line as a dash-delimited fragment such as
//! `"A Vaswani, N Shazeer - Advances in neural information processing
//! systems, 2017 - proceedings.neurips.cc"`. This module turns that fragment
//! into structured fields. No I/O, no bound checks beyond the token format -
//! callers validate year plausibility independently.

use regex::Regex;
use std::sync::OnceLock;

/// Parsed author/venue/year fields from a raw byline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorInfo {
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<u16>,
}

fn year_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}\b").expect("static regex"))
}

/// Parse a dash-delimited byline fragment into structured fields.
///
/// Segments are split on the literal `" - "` separator:
/// - 3+ segments: authors, venue+year, publisher (ignored)
/// - 2 segments: authors, then either a bare year, venue+year, or venue only
/// - 1 segment: authors only
/// - empty input: all fields empty
#[must_use]
pub fn parse_author_info(raw: &str) -> AuthorInfo {
    if raw.trim().is_empty() {
        return AuthorInfo::default();
    }

    // Split before trimming: a whitespace-only author segment must not
    // swallow the leading separator
    let segments: Vec<&str> = raw.split(" - ").map(str::trim).collect();
    let authors = split_authors(segments[0]);

    match segments.len() {
        1 => AuthorInfo {
            authors,
            ..AuthorInfo::default()
        },
        2 => {
            let tail = segments[1];
            if is_bare_year(tail) {
                AuthorInfo {
                    authors,
                    venue: None,
                    year: tail.parse().ok(),
                }
            } else {
                let (venue, year) = split_venue_year(tail);
                AuthorInfo {
                    authors,
                    venue,
                    year,
                }
            }
        }
        // Third and later segments are typically the publisher; ignored
        _ => {
            let (venue, year) = split_venue_year(segments[1]);
            AuthorInfo {
                authors,
                venue,
                year,
            }
        }
    }
}

/// Comma-split an author segment, trimming and dropping empties
fn split_authors(segment: &str) -> Vec<String> {
    segment
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Whether a segment is exactly a 4-digit year token
fn is_bare_year(segment: &str) -> bool {
    segment.len() == 4 && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Extract a year token from a venue+year segment, stripping the token and
/// stray commas from what remains. Also used on institutional
/// publication-info strings, which follow the same shape.
pub(crate) fn split_venue_year(segment: &str) -> (Option<String>, Option<u16>) {
    let segment = segment.trim();
    if let Some(m) = year_token_regex().find(segment) {
        let year = m.as_str().parse().ok();
        let mut venue = String::with_capacity(segment.len());
        venue.push_str(&segment[..m.start()]);
        venue.push_str(&segment[m.end()..]);
        let venue = venue.trim().trim_matches(',').trim();
        let venue = if venue.is_empty() {
            None
        } else {
            Some(venue.to_string())
        };
        (venue, year)
    } else if segment.is_empty() {
        (None, None)
    } else {
        (Some(segment.to_string()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_segments() {
        let info = parse_author_info("A, B - Venue, 2015 - Publisher");
        assert_eq!(info.authors, vec!["A", "B"]);
        assert_eq!(info.venue.as_deref(), Some("Venue"));
        assert_eq!(info.year, Some(2015));
    }

    #[test]
    fn test_two_segments_bare_year() {
        let info = parse_author_info("X - 2021");
        assert_eq!(info.authors, vec!["X"]);
        assert_eq!(info.venue, None);
        assert_eq!(info.year, Some(2021));
    }

    #[test]
    fn test_three_segments_bare_year_and_publisher() {
        let info = parse_author_info("X - 2021 - publisher.com");
        assert_eq!(info.authors, vec!["X"]);
        assert_eq!(info.venue, None);
        assert_eq!(info.year, Some(2021));
    }

    #[test]
    fn test_two_segments_venue_with_year() {
        let info = parse_author_info("MI Jordan, TM Mitchell - Science, 2015");
        assert_eq!(info.authors, vec!["MI Jordan", "TM Mitchell"]);
        assert_eq!(info.venue.as_deref(), Some("Science"));
        assert_eq!(info.year, Some(2015));
    }

    #[test]
    fn test_two_segments_venue_without_year() {
        let info = parse_author_info("A Smith - Journal of Things");
        assert_eq!(info.authors, vec!["A Smith"]);
        assert_eq!(info.venue.as_deref(), Some("Journal of Things"));
        assert_eq!(info.year, None);
    }

    #[test]
    fn test_single_segment_is_authors_only() {
        let info = parse_author_info("J Doe, R Roe");
        assert_eq!(info.authors, vec!["J Doe", "R Roe"]);
        assert_eq!(info.venue, None);
        assert_eq!(info.year, None);
    }

    #[test]
    fn test_empty_input() {
        let info = parse_author_info("");
        assert!(info.authors.is_empty());
        assert_eq!(info.venue, None);
        assert_eq!(info.year, None);

        let info = parse_author_info("   ");
        assert!(info.authors.is_empty());
    }

    #[test]
    fn test_whitespace_author_segment_keeps_separator() {
        // A blank author segment must not collapse the byline into one segment
        let info = parse_author_info("  - Venue, 2015");
        assert!(info.authors.is_empty());
        assert_eq!(info.venue.as_deref(), Some("Venue"));
        assert_eq!(info.year, Some(2015));

        let info = parse_author_info("   - 2021");
        assert!(info.authors.is_empty());
        assert_eq!(info.venue, None);
        assert_eq!(info.year, Some(2021));
    }

    #[test]
    fn test_empty_author_entries_dropped() {
        let info = parse_author_info("A, , B,  - Venue, 2019");
        assert_eq!(info.authors, vec!["A", "B"]);
    }

    #[test]
    fn test_year_embedded_in_venue_text() {
        let info = parse_author_info("C Writer - Proc. 12th Conf, 2003, Vienna");
        assert_eq!(info.year, Some(2003));
        assert_eq!(info.venue.as_deref(), Some("Proc. 12th Conf, , Vienna"));
    }

    #[test]
    fn test_no_bound_check_on_extracted_year() {
        // Implausible years are still extracted; callers bound-check
        let info = parse_author_info("A - Venue, 1234");
        assert_eq!(info.year, Some(1234));
    }
}
