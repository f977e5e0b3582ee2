//! Immutable evidence values shared by every stage of the loop.

mod paper_id;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Metadata key under which a representative lists the sources of the duplicates it absorbed.
pub const ALSO_FOUND_IN: &str = "also_found_in";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvidenceError {
    #[error("evidence content is empty")]
    EmptyContent,
}

/// Bibliographic record attached to exactly one [`Evidence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    source: String,
    title: String,
    url: String,
    date: Option<String>,
    authors: Vec<String>,
}

impl Citation {
    pub fn new(source: impl Into<String>, title: impl Into<String>, url: &str) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            url: canonical_url(url),
            date: None,
            authors: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }
}

/// Parses and re-serialises the URL without its fragment; unparseable input is kept trimmed.
fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Content-derived identity used for pool uniqueness.
///
/// Hex SHA-256 over the content lowercased and reduced to alphanumeric tokens,
/// so whitespace, punctuation and case differences between sources collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(content: &str) -> Self {
        let digest = Sha256::digest(normalize_content(content).as_bytes());
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn normalize_content(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A single finding returned by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    content: String,
    citation: Citation,
    relevance: f64,
    metadata: BTreeMap<String, Value>,
    fingerprint: Fingerprint,
}

impl Evidence {
    /// Fails with [`EvidenceError::EmptyContent`] when the content has no alphanumeric text.
    pub fn new(content: impl Into<String>, citation: Citation) -> Result<Self, EvidenceError> {
        let content = content.into();
        if normalize_content(&content).is_empty() {
            return Err(EvidenceError::EmptyContent);
        }
        let fingerprint = Fingerprint::of(&content);
        Ok(Self {
            content,
            citation,
            relevance: 0.0,
            metadata: BTreeMap::new(),
            fingerprint,
        })
    }

    /// Clamped to `[0.0, 1.0]`; NaN and `-0.0` become 0.0.
    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = if relevance.is_nan() || relevance == 0.0 {
            0.0
        } else {
            relevance.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn citation(&self) -> &Citation {
        &self.citation
    }

    pub fn source(&self) -> &str {
        self.citation.source()
    }

    pub fn relevance(&self) -> f64 {
        self.relevance
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Normalised publication identifier (`PMID:`, `DOI:` or `NCT:`) if one can be derived.
    pub fn paper_id(&self) -> Option<String> {
        paper_id::extract(&self.citation, &self.metadata)
    }

    /// Other sources that returned a duplicate of this evidence, sorted.
    pub fn also_found_in(&self) -> Vec<String> {
        self.metadata
            .get(ALSO_FOUND_IN)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a copy whose `also_found_in` additionally lists `sources` (own source excluded).
    pub(crate) fn absorb_sources<'a>(self, sources: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names = self.also_found_in();
        names.extend(
            sources
                .into_iter()
                .filter(|s| *s != self.source())
                .map(str::to_string),
        );
        names.sort();
        names.dedup();
        if names.is_empty() {
            return self;
        }
        self.with_metadata(ALSO_FOUND_IN, names)
    }
}

/// Outcome of one loop iteration: the query, the evidence it added to the pool,
/// and which sources were tried.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    query: String,
    evidence: Vec<Evidence>,
    sources_queried: Vec<String>,
    sources_failed: Vec<String>,
    errors: Vec<String>,
    total_found: usize,
}

impl SearchResult {
    pub(crate) fn new(
        query: String,
        evidence: Vec<Evidence>,
        sources_queried: Vec<String>,
        failures: Vec<(String, String)>,
        total_found: usize,
    ) -> Self {
        let (sources_failed, errors): (Vec<String>, Vec<String>) = failures
            .into_iter()
            .map(|(name, reason)| {
                let error = format!("{name}: {reason}");
                (name, error)
            })
            .unzip();
        Self {
            query,
            evidence,
            sources_queried,
            sources_failed,
            errors,
            total_found,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Evidence that survived deduplication and was new to the pool.
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Every source attempted, in registration order.
    pub fn sources_queried(&self) -> &[String] {
        &self.sources_queried
    }

    pub fn sources_failed(&self) -> &[String] {
        &self.sources_failed
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Evidence count before deduplication.
    pub fn total_found(&self) -> usize {
        self.total_found
    }
}
