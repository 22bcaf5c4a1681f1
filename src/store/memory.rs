use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::models::{Document, Filters, Label};
use crate::text::tokenize;

/// BM25 term-frequency saturation.
const BM25_K1: f32 = 1.5;
/// BM25 length normalisation.
const BM25_B: f32 = 0.75;

/// What to do when a written document id already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Overwrite,
    Skip,
    Fail,
}

/// Documents and feedback labels for one index.
///
/// Documents keep insertion order, which also breaks score ties in search.
pub struct InMemoryDocumentStore {
    index: String,
    documents: RwLock<Vec<Document>>,
    labels: RwLock<Vec<Label>>,
}

impl InMemoryDocumentStore {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            documents: RwLock::new(Vec::new()),
            labels: RwLock::new(Vec::new()),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn read_docs(&self) -> Result<RwLockReadGuard<'_, Vec<Document>>, StoreError> {
        self.documents.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_docs(&self) -> Result<RwLockWriteGuard<'_, Vec<Document>>, StoreError> {
        self.documents.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn read_labels(&self) -> Result<RwLockReadGuard<'_, Vec<Label>>, StoreError> {
        self.labels.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_labels(&self) -> Result<RwLockWriteGuard<'_, Vec<Label>>, StoreError> {
        self.labels.write().map_err(|_| StoreError::LockPoisoned)
    }

    // ── Documents ───────────────────────────────────────────

    /// Write documents, returning how many were inserted or replaced.
    ///
    /// With [`DuplicatePolicy::Fail`] nothing is written if any id collides.
    pub fn write_documents(
        &self,
        documents: Vec<Document>,
        policy: DuplicatePolicy,
    ) -> Result<usize, StoreError> {
        let mut stored = self.write_docs()?;

        if policy == DuplicatePolicy::Fail {
            if let Some(dup) = documents
                .iter()
                .find(|d| stored.iter().any(|s| s.id == d.id))
            {
                return Err(StoreError::DuplicateDocument(dup.id.clone()));
            }
        }

        let mut written = 0;
        for mut doc in documents {
            doc.score = None;
            match stored.iter().position(|s| s.id == doc.id) {
                Some(pos) => {
                    if policy == DuplicatePolicy::Overwrite {
                        stored[pos] = doc;
                        written += 1;
                    }
                }
                None => {
                    stored.push(doc);
                    written += 1;
                }
            }
        }

        tracing::debug!(index = %self.index, written, total = stored.len(), "documents written");
        Ok(written)
    }

    pub fn get_all_documents(&self, filters: &Filters) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .read_docs()?
            .iter()
            .filter(|d| filters.matches(|f| d.field(f)))
            .cloned()
            .collect())
    }

    pub fn get_document_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.read_docs()?.iter().find(|d| d.id == id).cloned())
    }

    pub fn document_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_docs()?.len())
    }

    /// Delete matching documents; an empty filter deletes everything.
    pub fn delete_documents(&self, filters: &Filters) -> Result<usize, StoreError> {
        let mut stored = self.write_docs()?;
        let before = stored.len();
        stored.retain(|d| !filters.matches(|f| d.field(f)));
        Ok(before - stored.len())
    }

    /// Okapi BM25 over every document in the index.
    ///
    /// Only documents scoring above zero and passing `filters` are returned,
    /// best first, at most `top_k` of them.
    pub fn query_bm25(
        &self,
        query: &str,
        top_k: usize,
        filters: &Filters,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.read_docs()?;
        if docs.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_terms = {
            let mut terms = tokenize(query);
            terms.sort();
            terms.dedup();
            terms
        };

        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(&d.content)).collect();
        let n = docs.len() as f32;
        let avg_len = tokenized.iter().map(|t| t.len()).sum::<usize>() as f32 / n;

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for t in seen {
                *doc_freq.entry(t).or_default() += 1;
            }
        }

        let mut scored: Vec<(f32, usize)> = Vec::new();
        for (i, tokens) in tokenized.iter().enumerate() {
            if !filters.matches(|f| docs[i].field(f)) {
                continue;
            }
            let len = tokens.len() as f32;
            let mut score = 0.0f32;
            for term in &query_terms {
                let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let df = doc_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let norm = if avg_len > 0.0 { len / avg_len } else { 0.0 };
                score += idf * (tf * (BM25_K1 + 1.0))
                    / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm));
            }
            if score > 0.0 {
                scored.push((score, i));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, i)| docs[i].clone().with_score(score))
            .collect())
    }

    // ── Labels ──────────────────────────────────────────────

    pub fn write_label(&self, label: Label) -> Result<(), StoreError> {
        let mut labels = self.write_labels()?;
        match labels.iter().position(|l| l.id == label.id) {
            Some(pos) => labels[pos] = label,
            None => labels.push(label),
        }
        Ok(())
    }

    pub fn get_all_labels(&self, filters: &Filters) -> Result<Vec<Label>, StoreError> {
        Ok(self
            .read_labels()?
            .iter()
            .filter(|l| filters.matches(|f| l.field(f)))
            .cloned()
            .collect())
    }

    pub fn delete_labels(&self, filters: &Filters) -> Result<usize, StoreError> {
        let mut labels = self.write_labels()?;
        let before = labels.len();
        labels.retain(|l| !filters.matches(|f| l.field(f)));
        Ok(before - labels.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// The five-person corpus used across pipeline and API tests.
    pub(crate) fn people_documents() -> Vec<Document> {
        [
            ("My name is Carla and I live in Berlin", "filename1"),
            ("My name is Paul and I live in New York", "filename2"),
            ("My name is Christelle and I live in Paris", "filename3"),
            ("My name is Camila and I live in Madrid", "filename4"),
            ("My name is Matteo and I live in Rome", "filename5"),
        ]
        .into_iter()
        .map(|(text, name)| {
            let mut meta = serde_json::Map::new();
            meta.insert("name".into(), json!(name));
            Document::new(text).with_meta(meta)
        })
        .collect()
    }

    fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new("document");
        store
            .write_documents(people_documents(), DuplicatePolicy::Overwrite)
            .unwrap();
        store
    }

    #[test]
    fn bm25_ranks_rare_term_match_first() {
        let store = seeded();
        let hits = store.query_bm25("Who lives in Berlin?", 10, &Filters::new()).unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("Carla"));
        let scores: Vec<f32> = hits.iter().map(|d| d.score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn bm25_respects_top_k_and_filters() {
        let store = seeded();
        assert_eq!(store.query_bm25("live", 2, &Filters::new()).unwrap().len(), 2);

        let only_rome = Filters::new().with("name", vec![json!("filename5")]);
        let hits = store.query_bm25("live", 10, &only_rome).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("Rome"));
    }

    #[test]
    fn bm25_skips_documents_without_overlap() {
        let store = seeded();
        assert!(store.query_bm25("quantum chromodynamics", 10, &Filters::new()).unwrap().is_empty());
    }

    #[test]
    fn duplicate_policies() {
        let store = seeded();
        let again = people_documents();

        assert_eq!(store.write_documents(again.clone(), DuplicatePolicy::Skip).unwrap(), 0);
        assert_eq!(store.write_documents(again.clone(), DuplicatePolicy::Overwrite).unwrap(), 5);
        assert!(matches!(
            store.write_documents(again, DuplicatePolicy::Fail),
            Err(StoreError::DuplicateDocument(_))
        ));
        assert_eq!(store.document_count().unwrap(), 5);
    }

    #[test]
    fn stored_documents_drop_scores() {
        let store = InMemoryDocumentStore::new("document");
        store
            .write_documents(vec![Document::new("x").with_score(3.0)], DuplicatePolicy::Overwrite)
            .unwrap();
        assert_eq!(store.get_all_documents(&Filters::new()).unwrap()[0].score, None);
    }

    #[test]
    fn delete_by_filters() {
        let store = seeded();
        let f = Filters::new().with("name", vec![json!("filename1"), json!("filename2")]);
        assert_eq!(store.delete_documents(&f).unwrap(), 2);
        assert_eq!(store.document_count().unwrap(), 3);
        assert_eq!(store.delete_documents(&Filters::new()).unwrap(), 3);
    }
}
