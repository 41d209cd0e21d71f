//! Term-frequency index over situation summaries.
//!
//! Documents are bags of lowercase alphanumeric terms. A query only scores
//! documents that share at least one term with it (via the inverted postings),
//! ranked by cosine similarity of raw term-frequency vectors.

use std::collections::HashMap;

/// Terms too common in situation summaries to discriminate between them.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "of", "on", "or", "that", "the", "to", "was", "were", "with",
];

/// Lowercased alphanumeric runs. `.`, `-` and `^` stay inside a term so
/// tickers such as `BRK.B` survive intact.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '-' | '^')))
        .map(|t| t.trim_matches(|c: char| matches!(c, '.' | '-')))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
struct TermVector {
    counts: HashMap<String, u32>,
    norm: f64,
}

impl TermVector {
    fn from_text(text: &str) -> Self {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in tokenize(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        let norm = counts
            .values()
            .map(|c| f64::from(*c).powi(2))
            .sum::<f64>()
            .sqrt();
        Self { counts, norm }
    }

    /// Cosine similarity. Returns 0.0 if either vector has zero magnitude.
    fn cosine(&self, other: &TermVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.counts.len() <= other.counts.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .counts
            .iter()
            .filter_map(|(term, a)| large.counts.get(term).map(|b| f64::from(*a) * f64::from(*b)))
            .sum();
        dot / (self.norm * other.norm)
    }
}

/// Inverted index from term to document ids, plus each document's vector.
///
/// Document ids are insertion positions, so callers can keep a parallel `Vec`.
#[derive(Debug, Clone, Default)]
pub struct TermIndex {
    postings: HashMap<String, Vec<usize>>,
    docs: Vec<TermVector>,
}

impl TermIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document and return its id.
    pub fn add(&mut self, text: &str) -> usize {
        let id = self.docs.len();
        let vector = TermVector::from_text(text);
        for term in vector.counts.keys() {
            self.postings.entry(term.clone()).or_default().push(id);
        }
        self.docs.push(vector);
        id
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Number of documents that would be scored for `text`.
    pub fn candidate_count(&self, text: &str) -> usize {
        self.candidates(&TermVector::from_text(text)).len()
    }

    fn candidates(&self, query: &TermVector) -> Vec<usize> {
        let mut ids: Vec<usize> = query
            .counts
            .keys()
            .filter_map(|term| self.postings.get(term))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Top `k` `(doc id, similarity)` pairs, best first. Ties go to the newer document.
    pub fn query(&self, text: &str, k: usize) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let query = TermVector::from_text(text);
        let mut scored: Vec<(usize, f64)> = self
            .candidates(&query)
            .into_iter()
            .map(|id| (id, query.cosine(&self.docs[id])))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_tickers_and_drops_stopwords() {
        assert_eq!(
            tokenize("NVDA beat the estimates; BRK.B flat."),
            vec!["nvda", "beat", "estimates", "brk.b", "flat"]
        );
    }

    #[test]
    fn identical_text_scores_one() {
        let mut index = TermIndex::new();
        index.add("nvda momentum strong earnings");
        let hits = index.query("nvda momentum strong earnings", 1);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn only_candidates_sharing_terms_are_scored() {
        let mut index = TermIndex::new();
        index.add("nvda earnings beat");
        index.add("aapl buyback announced");
        index.add("tsla deliveries miss");
        assert_eq!(index.candidate_count("nvda guidance"), 1);
        let hits = index.query("nvda guidance", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn ranking_prefers_closer_documents() {
        let mut index = TermIndex::new();
        index.add("nvda earnings");
        index.add("nvda earnings beat guidance raised");
        index.add("nvda");
        let hits = index.query("nvda earnings beat guidance", 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 0);
    }

    #[test]
    fn ties_prefer_newer_documents() {
        let mut index = TermIndex::new();
        index.add("nvda rally");
        index.add("nvda rally");
        let hits = index.query("nvda rally", 2);
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn zero_k_or_no_overlap_returns_nothing() {
        let mut index = TermIndex::new();
        index.add("nvda rally");
        assert!(index.query("nvda", 0).is_empty());
        assert!(index.query("unrelated words", 3).is_empty());
    }
}
