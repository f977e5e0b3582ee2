//! Cross-source near-duplicate collapsing.
//!
//! Candidates are ranked by the representative tie-break (relevance, then
//! configured source priority, then content length) and clustered greedily in
//! that order: each candidate joins the most similar existing cluster at or above
//! the threshold, or founds a new one. Because the ranking is a total order over
//! the candidates themselves, the result depends only on the set of inputs and
//! never on arrival order, and the first member of every cluster is its
//! representative. Existing pool entries seed the clustering and keep their
//! slots; a batch entry that outranks a pool entry takes that slot over, so the
//! kept entry does not depend on which pass delivered it.
//!
//! Pairwise comparison is quadratic in the batch; batches are tens of items.

mod embedding;

pub use embedding::{Embedder, HashingEmbedder, cosine};

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::evidence::{Evidence, Fingerprint};

pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Result of folding a batch into the pool.
#[derive(Debug, Clone)]
pub struct Merge {
    /// Previous pool slots (in their original order) followed by `added`.
    pub pool: Vec<Evidence>,
    /// Representatives that were new to the pool.
    pub added: Vec<Evidence>,
    /// Batch entries discarded as duplicates.
    pub absorbed: usize,
    /// Pool slots whose representative was displaced by a better batch entry.
    pub replaced: usize,
}

struct Candidate {
    evidence: Evidence,
    embedding: Vec<f32>,
    paper_id: Option<String>,
}

struct Cluster {
    representative: Candidate,
    seeded_from_pool: bool,
    replaced: bool,
    members: Vec<Fingerprint>,
    absorbed_sources: Vec<String>,
}

impl Cluster {
    fn absorb(&mut self, member: &Evidence) {
        self.members.push(member.fingerprint().clone());
        self.absorbed_sources.push(member.source().to_string());
        self.absorbed_sources.extend(member.also_found_in());
    }
}

#[derive(Clone)]
pub struct Deduplicator {
    threshold: f64,
    priority: Vec<String>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("threshold", &self.threshold)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl Deduplicator {
    /// `priority` lists source names, most trusted first; unlisted sources rank last.
    pub fn new(threshold: f64, priority: Vec<String>) -> Self {
        Self {
            threshold,
            priority,
            embedder: Arc::new(HashingEmbedder::default()),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Collapses near-duplicates within a single batch.
    pub fn deduplicate(&self, batch: Vec<Evidence>) -> Vec<Evidence> {
        self.merge(&[], batch).added
    }

    /// Clusters `batch` together with `pool`.
    ///
    /// Each pool entry keeps its slot, but a batch entry that ranks ahead of it
    /// takes over that slot and the displaced entry's sources move into
    /// `also_found_in`. The pool never shrinks.
    pub fn merge(&self, pool: &[Evidence], batch: Vec<Evidence>) -> Merge {
        let mut clusters: Vec<Cluster> = pool
            .iter()
            .cloned()
            .map(|ev| Cluster {
                members: vec![ev.fingerprint().clone()],
                representative: self.candidate(ev),
                seeded_from_pool: true,
                replaced: false,
                absorbed_sources: Vec::new(),
            })
            .collect();

        let mut ranked: Vec<Candidate> = batch.into_iter().map(|ev| self.candidate(ev)).collect();
        ranked.sort_by(|a, b| self.rank(&a.evidence, &b.evidence));

        let mut absorbed = 0;
        for candidate in ranked {
            let Some(index) = self.best_cluster(&clusters, &candidate) else {
                clusters.push(Cluster {
                    members: vec![candidate.evidence.fingerprint().clone()],
                    representative: candidate,
                    seeded_from_pool: false,
                    replaced: false,
                    absorbed_sources: Vec::new(),
                });
                continue;
            };

            let cluster = &mut clusters[index];
            if self.rank(&candidate.evidence, &cluster.representative.evidence) == Ordering::Less {
                let displaced = std::mem::replace(&mut cluster.representative, candidate);
                cluster.absorb(&displaced.evidence);
                cluster.replaced = true;
            } else {
                cluster.absorb(&candidate.evidence);
                absorbed += 1;
            }
        }

        let mut merged_pool = Vec::with_capacity(clusters.len());
        let mut added = Vec::new();
        let mut replaced = 0;
        for cluster in clusters {
            let evidence = cluster
                .representative
                .evidence
                .absorb_sources(cluster.absorbed_sources.iter().map(String::as_str));
            if !cluster.seeded_from_pool {
                added.push(evidence.clone());
            } else if cluster.replaced {
                replaced += 1;
            }
            merged_pool.push(evidence);
        }

        debug!(
            pool_before = pool.len(),
            added = added.len(),
            absorbed,
            replaced,
            threshold = self.threshold,
            "deduplication complete"
        );
        Merge {
            pool: merged_pool,
            added,
            absorbed,
            replaced,
        }
    }

    fn candidate(&self, evidence: Evidence) -> Candidate {
        Candidate {
            embedding: self.embedder.embed(evidence.content()),
            paper_id: evidence.paper_id(),
            evidence,
        }
    }

    /// A cluster that already holds this exact content, otherwise the most similar
    /// one at or above the threshold; earliest wins ties.
    fn best_cluster(&self, clusters: &[Cluster], candidate: &Candidate) -> Option<usize> {
        let fingerprint = candidate.evidence.fingerprint();
        if let Some(index) = clusters.iter().position(|c| c.members.contains(fingerprint)) {
            return Some(index);
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, cluster) in clusters.iter().enumerate() {
            let score = self.similarity(candidate, &cluster.representative);
            if score < self.threshold {
                continue;
            }
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }

    fn similarity(&self, a: &Candidate, b: &Candidate) -> f64 {
        if a.evidence.fingerprint() == b.evidence.fingerprint() {
            return 1.0;
        }
        if let (Some(x), Some(y)) = (&a.paper_id, &b.paper_id) {
            if x == y {
                return 1.0;
            }
            if id_kind(x) == id_kind(y) {
                return 0.0;
            }
        }
        cosine(&a.embedding, &b.embedding)
    }

    fn priority_of(&self, source: &str) -> usize {
        self.priority
            .iter()
            .position(|p| p == source)
            .unwrap_or(usize::MAX)
    }

    /// Representative order: better candidates sort first.
    fn rank(&self, a: &Evidence, b: &Evidence) -> Ordering {
        b.relevance()
            .total_cmp(&a.relevance())
            .then_with(|| self.priority_of(a.source()).cmp(&self.priority_of(b.source())))
            .then_with(|| b.content().chars().count().cmp(&a.content().chars().count()))
            .then_with(|| a.fingerprint().cmp(b.fingerprint()))
            .then_with(|| a.source().cmp(b.source()))
            .then_with(|| a.citation().url().cmp(b.citation().url()))
            .then_with(|| canonical_json(a).cmp(&canonical_json(b)))
    }
}

fn id_kind(id: &str) -> &str {
    id.split(':').next().unwrap_or(id)
}

fn canonical_json(evidence: &Evidence) -> String {
    serde_json::to_string(evidence).unwrap_or_default()
}
