use crate::tokenizer::{tokenize, unique_tokens};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

pub type DocId = u64;

/// One hit from [`KeywordIndex::ranked_search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedNote {
    pub doc_id: DocId,
    /// Number of distinct query tokens present in the document.
    pub score: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_docs: usize,
    pub num_terms: usize,
    pub num_postings: usize,
}

#[derive(Default)]
struct IndexState {
    postings: HashMap<String, HashSet<DocId>>, // token -> docs containing it at least once
    texts: HashMap<DocId, String>,
}

impl IndexState {
    fn insert(&mut self, doc_id: DocId, text: String) {
        for token in unique_tokens(&text) {
            self.postings.entry(token).or_default().insert(doc_id);
        }
        self.texts.insert(doc_id, text);
    }

    fn remove(&mut self, doc_id: DocId) -> Option<String> {
        let text = self.texts.remove(&doc_id)?;
        for token in unique_tokens(&text) {
            if let Some(docs) = self.postings.get_mut(&token) {
                docs.remove(&doc_id);
                if docs.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
        Some(text)
    }
}

/// In-memory inverted index over meeting notes.
///
/// Postings and stored texts live behind one lock, so a reader sees either the
/// state before a mutation or the state after it, never a mix.
#[derive(Default)]
pub struct KeywordIndex {
    state: RwLock<IndexState>,
}

impl KeywordIndex {
    pub fn new() -> Self { Self::default() }

    /// Build an index from `(doc_id, text)` pairs, e.g. every record of the document store at startup.
    pub fn from_documents<I, S>(docs: I) -> Self
    where
        I: IntoIterator<Item = (DocId, S)>,
        S: Into<String>,
    {
        let index = Self::new();
        {
            let mut state = index.state.write();
            for (doc_id, text) in docs {
                state.remove(doc_id);
                state.insert(doc_id, text.into());
            }
        }
        let stats = index.stats();
        tracing::info!(num_docs = stats.num_docs, num_terms = stats.num_terms, "keyword index populated");
        index
    }

    /// Store `text` under `doc_id` and post it under each of its distinct tokens.
    ///
    /// A live `doc_id` has its previous postings dropped first, in the same critical section.
    pub fn add_document(&self, doc_id: DocId, text: impl Into<String>) {
        let text = text.into();
        let mut state = self.state.write();
        if state.remove(doc_id).is_some() {
            tracing::debug!(doc_id, "add_document replaced a live document");
        }
        state.insert(doc_id, text);
        tracing::debug!(doc_id, num_terms = state.postings.len(), "document indexed");
    }

    /// Undo every posting `add_document` created for `doc_id`. Returns false if it was not indexed.
    pub fn remove_document(&self, doc_id: DocId) -> bool {
        let removed = self.state.write().remove(doc_id).is_some();
        if removed {
            tracing::debug!(doc_id, "document removed");
        }
        removed
    }

    /// Replace the text of `doc_id` atomically with respect to concurrent readers.
    pub fn reindex_document(&self, doc_id: DocId, text: impl Into<String>) {
        let text = text.into();
        let mut state = self.state.write();
        state.remove(doc_id);
        state.insert(doc_id, text);
        tracing::debug!(doc_id, "document reindexed");
    }

    /// Documents containing at least one query token (union semantics).
    pub fn search(&self, query: &str) -> BTreeSet<DocId> {
        let tokens = tokenize(query);
        let state = self.state.read();
        tokens
            .iter()
            .filter_map(|token| state.postings.get(token))
            .flatten()
            .copied()
            .collect()
    }

    /// Documents ordered by how many distinct query tokens they contain.
    ///
    /// Ties go to the lower `doc_id`. At most `limit` results are returned.
    pub fn ranked_search(&self, query: &str, limit: usize) -> Vec<RankedNote> {
        if limit == 0 {
            return Vec::new();
        }
        self.ranked_search_with_total(query, limit).1
    }

    /// Like [`ranked_search`](Self::ranked_search), also returning how many documents
    /// matched before truncation. Both come from the same snapshot.
    pub fn ranked_search_with_total(&self, query: &str, limit: usize) -> (usize, Vec<RankedNote>) {
        let tokens = unique_tokens(query);
        let state = self.state.read();

        let mut scores: HashMap<DocId, u32> = HashMap::new();
        for token in &tokens {
            if let Some(docs) = state.postings.get(token) {
                for doc_id in docs {
                    *scores.entry(*doc_id).or_insert(0) += 1;
                }
            }
        }

        let total = scores.len();
        let mut scored: Vec<(DocId, u32)> = scores.into_iter().collect();
        scored.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        let notes = scored
            .into_iter()
            .map(|(doc_id, score)| RankedNote {
                doc_id,
                score,
                text: state.texts.get(&doc_id).cloned().unwrap_or_default(),
            })
            .collect();
        (total, notes)
    }

    /// Stored text for `doc_id`, verbatim.
    pub fn document(&self, doc_id: DocId) -> Option<String> {
        self.state.read().texts.get(&doc_id).cloned()
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.state.read().texts.contains_key(&doc_id)
    }

    pub fn len(&self) -> usize { self.state.read().texts.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            num_docs: state.texts.len(),
            num_terms: state.postings.len(),
            num_postings: state.postings.values().map(HashSet::len).sum(),
        }
    }
}
