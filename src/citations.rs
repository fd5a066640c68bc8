//! Citation and URL bookkeeping for a research run.
//!
//! Raw source URIs returned by grounded search are long, unstable, and
//! token-expensive, so each run maps them to short per-run URLs. When the
//! model reports which text spans are supported by which sources, those
//! spans become [`Citation`]s and are spliced into the text as markdown
//! links.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::grounding::{GroundedResponse, GroundingChunk};

pub const RESOLVED_URL_PREFIX: &str = "https://vertexaisearch.cloud.google.com/id/";

/// Trailing file-extension-like suffix on a source title, e.g. ".html".
static TITLE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]+$").unwrap());

/// One raw URI and the short URL assigned to it, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub raw_uri: String,
    pub short_url: String,
}

/// Maps raw source URIs to short, stable per-run URLs.
///
/// Assignment is idempotent: a URI re-presented in a later round keeps the
/// short URL it was given first, and the sequence number only advances for
/// genuinely new URIs. The mapping grows monotonically for the lifetime of
/// the run.
#[derive(Debug)]
pub struct UrlResolver {
    run_id: u64,
    map: HashMap<String, String>,
    order: Vec<String>,
}

impl UrlResolver {
    pub fn new(run_id: u64) -> Self {
        UrlResolver { run_id, map: HashMap::new(), order: Vec::new() }
    }

    /// Record every chunk that carries a usable URI. Chunks without one are
    /// skipped; a partial batch never aborts resolution of the rest.
    pub fn resolve(&mut self, chunks: &[GroundingChunk]) {
        for chunk in chunks {
            let Some(uri) = chunk.web.as_ref().and_then(|w| w.uri.as_deref()) else {
                continue;
            };
            if self.map.contains_key(uri) {
                continue;
            }
            let short = format!("{}{}-{}", RESOLVED_URL_PREFIX, self.run_id, self.order.len());
            self.map.insert(uri.to_string(), short);
            self.order.push(uri.to_string());
        }
    }

    pub fn mapping(&self) -> &HashMap<String, String> {
        &self.map
    }

    pub fn short_url_for(&self, raw_uri: &str) -> Option<&str> {
        self.map.get(raw_uri).map(String::as_str)
    }

    /// All resolved sources in first-seen order.
    pub fn sources(&self) -> Vec<ResolvedSource> {
        self.order
            .iter()
            .map(|uri| ResolvedSource {
                raw_uri: uri.clone(),
                short_url: self.map[uri].clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One source link backing a cited span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSegment {
    pub label: String,
    pub short_url: String,
    /// The raw URI the short URL resolves back to.
    pub value: String,
}

/// A normalized citation: a character range of the generated text plus the
/// sources supporting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub start_index: usize,
    pub end_index: usize,
    pub segments: Vec<CitationSegment>,
}

fn clean_label(title: &str) -> String {
    TITLE_SUFFIX.replace(title, "").into_owned()
}

/// Label fallback when a chunk has no title: the bare host of its URI.
fn host_from_uri(uri: &str) -> String {
    let u = uri.trim();
    let without_scheme = if let Some(pos) = u.find("://") { &u[pos + 3..] } else { u };
    let host = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or(without_scheme);
    let host = if let Some(at) = host.rfind('@') { &host[at + 1..] } else { host };
    let host = host.split(':').next().unwrap_or(host);
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Turn the grounding metadata of a response into normalized citations.
///
/// Chunk references that cannot be resolved (index out of range, no URI, or
/// a URI the resolver never saw) drop that segment only. A support whose
/// references all fail still yields a citation with an empty segment list so
/// its offsets survive for later splicing decisions.
pub fn get_citations(
    response: Option<&GroundedResponse>,
    resolved: &HashMap<String, String>,
) -> Vec<Citation> {
    let Some(metadata) = response
        .and_then(|r| r.candidates.first())
        .and_then(|c| c.grounding_metadata.as_ref())
    else {
        return Vec::new();
    };

    let mut citations = Vec::new();
    for support in &metadata.grounding_supports {
        let (start, end) = support
            .segment
            .as_ref()
            .map(|s| (s.start_index.unwrap_or(0), s.end_index.unwrap_or(0)))
            .unwrap_or((0, 0));

        let mut segments = Vec::new();
        for &idx in &support.grounding_chunk_indices {
            let Ok(idx) = usize::try_from(idx) else { continue };
            let Some(web) = metadata.grounding_chunks.get(idx).and_then(|c| c.web.as_ref())
            else {
                continue;
            };
            let Some(uri) = web.uri.as_deref() else { continue };
            let Some(short_url) = resolved.get(uri) else { continue };
            let label = match web.title.as_deref() {
                Some(title) => clean_label(title),
                None => host_from_uri(uri),
            };
            segments.push(CitationSegment {
                label,
                short_url: short_url.clone(),
                value: uri.to_string(),
            });
        }

        citations.push(Citation {
            start_index: start.max(0) as usize,
            end_index: end.max(0) as usize,
            segments,
        });
    }
    citations
}

/// Byte position of the `char_offset`-th character, clamped to the end.
fn byte_offset(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Splice `[label](short_url)` markers into `text` after each cited span.
///
/// Citations are applied in descending `end_index` order (ties broken by
/// descending `start_index`) so that earlier insertions never shift the
/// offsets of citations still waiting to be applied. Offsets are character
/// offsets and are clamped to the text bounds.
pub fn insert_citation_markers(text: &str, citations: &[Citation]) -> String {
    let mut sorted: Vec<&Citation> = citations.iter().collect();
    sorted.sort_by(|a, b| {
        b.end_index
            .cmp(&a.end_index)
            .then(b.start_index.cmp(&a.start_index))
    });

    let mut out = text.to_string();
    for citation in sorted {
        if citation.segments.is_empty() {
            continue;
        }
        let marker: String = citation
            .segments
            .iter()
            .map(|s| format!("[{}]({})", s.label, s.short_url))
            .collect();
        let at = byte_offset(&out, citation.end_index);
        out.insert_str(at, &marker);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::{
        Candidate, GroundingMetadata, GroundingSupport, TextSegment, WebSource,
    };

    fn chunk(uri: &str, title: Option<&str>) -> GroundingChunk {
        GroundingChunk {
            web: Some(WebSource {
                uri: Some(uri.to_string()),
                title: title.map(str::to_string),
            }),
        }
    }

    fn segment(label: &str, short_url: &str) -> CitationSegment {
        CitationSegment {
            label: label.to_string(),
            short_url: short_url.to_string(),
            value: String::new(),
        }
    }

    fn grounded(
        chunks: Vec<GroundingChunk>,
        supports: Vec<GroundingSupport>,
    ) -> GroundedResponse {
        GroundedResponse {
            candidates: vec![Candidate {
                content: None,
                grounding_metadata: Some(GroundingMetadata {
                    grounding_chunks: chunks,
                    grounding_supports: supports,
                }),
            }],
        }
    }

    fn support(start: Option<i64>, end: Option<i64>, indices: Vec<i64>) -> GroundingSupport {
        GroundingSupport {
            segment: Some(TextSegment { start_index: start, end_index: end }),
            grounding_chunk_indices: indices,
        }
    }

    #[test]
    fn resolver_assigns_sequence_numbers_in_first_seen_order() {
        let mut resolver = UrlResolver::new(1);
        resolver.resolve(&[
            chunk("https://a.com", None),
            chunk("https://b.com", None),
            chunk("https://a.com", None),
        ]);
        assert_eq!(
            resolver.short_url_for("https://a.com"),
            Some("https://vertexaisearch.cloud.google.com/id/1-0")
        );
        assert_eq!(
            resolver.short_url_for("https://b.com"),
            Some("https://vertexaisearch.cloud.google.com/id/1-1")
        );
        assert_eq!(resolver.len(), 2);
    }

    #[test]
    fn resolver_collapses_duplicates_to_one_entry() {
        let mut resolver = UrlResolver::new(1);
        resolver.resolve(&[
            chunk("https://example.com", None),
            chunk("https://example.com", None),
        ]);
        assert_eq!(resolver.len(), 1);
        assert_eq!(
            resolver.short_url_for("https://example.com"),
            Some("https://vertexaisearch.cloud.google.com/id/1-0")
        );
    }

    #[test]
    fn resolver_is_idempotent_across_rounds() {
        let batch = [chunk("https://a.com", None), chunk("https://b.com", None)];
        let mut resolver = UrlResolver::new(7);
        resolver.resolve(&batch);
        let first = resolver.mapping().clone();
        resolver.resolve(&batch);
        assert_eq!(resolver.mapping(), &first);
    }

    #[test]
    fn resolver_skips_chunks_without_uri() {
        let mut resolver = UrlResolver::new(1);
        resolver.resolve(&[
            GroundingChunk { web: None },
            GroundingChunk { web: Some(WebSource { uri: None, title: None }) },
        ]);
        assert!(resolver.is_empty());
        assert!(resolver.mapping().is_empty());
    }

    #[test]
    fn resolver_empty_input_yields_empty_mapping() {
        let mut resolver = UrlResolver::new(1);
        resolver.resolve(&[]);
        assert!(resolver.mapping().is_empty());
    }

    #[test]
    fn citations_absent_response_is_empty() {
        assert!(get_citations(None, &HashMap::new()).is_empty());
    }

    #[test]
    fn citations_zero_candidates_is_empty() {
        let resp = GroundedResponse { candidates: vec![] };
        assert!(get_citations(Some(&resp), &HashMap::new()).is_empty());
    }

    #[test]
    fn citations_missing_grounding_metadata_is_empty() {
        let resp = GroundedResponse {
            candidates: vec![Candidate { content: None, grounding_metadata: None }],
        };
        assert!(get_citations(Some(&resp), &HashMap::new()).is_empty());
    }

    #[test]
    fn citations_extract_and_strip_title_suffix() {
        let resp = grounded(
            vec![chunk(
                "https://example.com/italian-sf",
                Some("Best Italian Restaurants.html"),
            )],
            vec![support(Some(0), Some(10), vec![0])],
        );
        let mut resolved = HashMap::new();
        resolved.insert(
            "https://example.com/italian-sf".to_string(),
            "https://vertexaisearch.cloud.google.com/id/1-0".to_string(),
        );

        let citations = get_citations(Some(&resp), &resolved);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].start_index, 0);
        assert_eq!(citations[0].end_index, 10);
        assert_eq!(citations[0].segments.len(), 1);
        assert_eq!(citations[0].segments[0].label, "Best Italian Restaurants");
        assert_eq!(
            citations[0].segments[0].short_url,
            "https://vertexaisearch.cloud.google.com/id/1-0"
        );
        assert_eq!(citations[0].segments[0].value, "https://example.com/italian-sf");
    }

    #[test]
    fn citations_unresolved_chunk_keeps_citation_with_empty_segments() {
        let resp = grounded(
            vec![chunk("https://unseen.com", Some("Unseen"))],
            vec![support(Some(3), Some(9), vec![0])],
        );
        let citations = get_citations(Some(&resp), &HashMap::new());
        assert_eq!(citations.len(), 1);
        assert!(citations[0].segments.is_empty());
        assert_eq!(citations[0].end_index, 9);
    }

    #[test]
    fn citations_missing_offsets_default_to_zero() {
        let resp = grounded(vec![], vec![support(None, None, vec![])]);
        let citations = get_citations(Some(&resp), &HashMap::new());
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].start_index, 0);
        assert_eq!(citations[0].end_index, 0);
    }

    #[test]
    fn citations_out_of_range_chunk_index_drops_segment_only() {
        let resp = grounded(
            vec![chunk("https://a.com", Some("A"))],
            vec![support(Some(0), Some(4), vec![5, -1, 0])],
        );
        let mut resolved = HashMap::new();
        resolved.insert("https://a.com".to_string(), "short-a".to_string());
        let citations = get_citations(Some(&resp), &resolved);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].segments.len(), 1);
        assert_eq!(citations[0].segments[0].label, "A");
    }

    #[test]
    fn insert_empty_citation_list_is_identity() {
        let text = "This is a test sentence.";
        assert_eq!(insert_citation_markers(text, &[]), text);
    }

    #[test]
    fn insert_single_citation_lands_after_span() {
        let text = "This is a test";
        let citations = [Citation {
            start_index: 5,
            end_index: 7,
            segments: vec![segment("Test", "http://test.com")],
        }];
        let out = insert_citation_markers(text, &citations);
        assert_eq!(out, "This is[Test](http://test.com) a test");
    }

    #[test]
    fn insert_multiple_citations_preserves_unrelated_text() {
        let text = "This is a test sentence with multiple citations.";
        let citations = [
            Citation {
                start_index: 10,
                end_index: 14,
                segments: vec![segment("Source1", "http://url1.com")],
            },
            Citation {
                start_index: 25,
                end_index: 33,
                segments: vec![segment("Source2", "http://url2.com")],
            },
        ];
        let out = insert_citation_markers(text, &citations);
        assert!(out.contains("test[Source1](http://url1.com)"));
        assert!(out.contains("[Source2](http://url2.com)"));
        assert!(out.starts_with("This is a test"));
        assert!(out.ends_with("citations."));
    }

    #[test]
    fn insert_matches_one_at_a_time_from_the_end() {
        let text = "abcdefghij";
        let citations = [
            Citation { start_index: 0, end_index: 2, segments: vec![segment("x", "u1")] },
            Citation { start_index: 4, end_index: 6, segments: vec![segment("y", "u2")] },
            Citation { start_index: 7, end_index: 9, segments: vec![segment("z", "u3")] },
        ];
        // Reference: apply each citation to the original text independently,
        // highest offset first.
        let mut reference = text.to_string();
        for c in citations.iter().rev() {
            let marker = format!("[{}]({})", c.segments[0].label, c.segments[0].short_url);
            reference.insert_str(c.end_index, &marker);
        }
        // Shuffled input order must not change the output.
        let shuffled = [citations[1].clone(), citations[2].clone(), citations[0].clone()];
        assert_eq!(insert_citation_markers(text, &shuffled), reference);
    }

    #[test]
    fn insert_clamps_out_of_bounds_offsets() {
        let text = "short";
        let citations = [Citation {
            start_index: 0,
            end_index: 999,
            segments: vec![segment("S", "u")],
        }];
        assert_eq!(insert_citation_markers(text, &citations), "short[S](u)");
    }

    #[test]
    fn insert_empty_segments_is_a_noop() {
        let text = "unchanged";
        let citations = [Citation { start_index: 0, end_index: 3, segments: vec![] }];
        assert_eq!(insert_citation_markers(text, &citations), text);
    }

    #[test]
    fn insert_offsets_are_character_offsets() {
        // 4 characters, 10 bytes; a byte-indexed splice would panic or land
        // inside a code point.
        let text = "héllo🍝";
        let citations = [Citation {
            start_index: 0,
            end_index: 5,
            segments: vec![segment("S", "u")],
        }];
        let out = insert_citation_markers(text, &citations);
        assert_eq!(out, "héllo[S](u)🍝");
    }

    #[test]
    fn host_fallback_label() {
        assert_eq!(host_from_uri("https://www.eater.com/sf/reviews"), "eater.com");
        assert_eq!(host_from_uri("http://user@menu.example.org:8080/x"), "menu.example.org");
    }
}
