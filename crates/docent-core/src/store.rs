//! In-memory vector index over doc sections. Built once from the index file, read-only after.
//! Brute-force cosine search; the corpus is a few hundred sections.
use std::cmp::Ordering;

use crate::index_file::EmbeddingFile;

/// A section with the embedding it was indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSection {
    pub title: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A retrieved section and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSection {
    pub section: DocumentSection,
    pub score: f32,
}

#[derive(Debug)]
struct Entry {
    section: DocumentSection,
    /// Unit-length copy of the embedding (cosine similarity via dot product).
    unit: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every section that carries an embedding; the rest are skipped.
    /// All embeddings must share one dimensionality.
    pub fn build(sections: impl IntoIterator<Item = DocumentSection>) -> Result<Self, StoreError> {
        let mut index = Self::new();
        for section in sections {
            if section.embedding.is_empty() {
                continue;
            }
            index.push(section)?;
        }
        Ok(index)
    }

    /// Flatten serialized files (in order) and index their embedded sections.
    pub fn from_files(files: &[EmbeddingFile]) -> Result<Self, StoreError> {
        let sections = files.iter().flat_map(|f| &f.sections).map(|s| DocumentSection {
            title: s.title.clone(),
            text: s.text.clone(),
            embedding: s.embedding.embedding.clone(),
        });
        let index = Self::build(sections)?;
        tracing::debug!(
            files = files.len(),
            sections = index.len(),
            dimension = index.dimension.unwrap_or(0),
            "vector index loaded"
        );
        Ok(index)
    }

    fn push(&mut self, section: DocumentSection) -> Result<(), StoreError> {
        let actual = section.embedding.len();
        match self.dimension {
            Some(expected) if expected != actual => {
                return Err(StoreError::InconsistentDimensions {
                    expected,
                    actual,
                    title: section.title,
                });
            }
            _ => self.dimension = Some(actual),
        }
        let unit = normalize(&section.embedding);
        self.entries.push(Entry { section, unit });
        Ok(())
    }

    /// Top `top_k` sections by cosine similarity, best first.
    /// Equal scores keep index order.
    pub fn retrieve_relevant(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredSection>, StoreError> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query_embedding.len() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: query_embedding.len(),
            });
        }
        let q_unit = normalize(query_embedding);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, dot(&q_unit, &e.unit)))
            .collect();
        // sort_by is stable: ties stay in index order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| ScoredSection {
                section: self.entries[i].section.clone(),
                score,
            })
            .collect())
    }

    /// Number of indexed sections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared embedding dimensionality; `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn sections(&self) -> impl Iterator<Item = &DocumentSection> {
        self.entries.iter().map(|e| &e.section)
    }
}

/// Cosine similarity of two equal-length vectors. Zero when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    dot(&normalize(a), &normalize(b))
}

/// Zero vectors come back as all zeros so they score 0 against anything.
fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 || !norm.is_finite() {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query embedding has {actual} dimensions, index has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("section {title:?} has {actual} dimensions, index has {expected}")]
    InconsistentDimensions {
        expected: usize,
        actual: usize,
        title: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_file::{IndexedSection, SectionEmbedding};

    fn section(title: &str, embedding: Vec<f32>) -> DocumentSection {
        DocumentSection {
            title: title.to_string(),
            text: format!("{title} text"),
            embedding,
        }
    }

    fn titles(results: &[ScoredSection]) -> Vec<&str> {
        results.iter().map(|r| r.section.title.as_str()).collect()
    }

    #[test]
    fn sections_without_embedding_are_not_indexed() {
        let index = VectorIndex::build(vec![
            section("a", vec![1.0, 0.0]),
            section("b", vec![]),
            section("c", vec![0.0, 1.0]),
            section("d", vec![]),
        ])
        .unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.sections().all(|s| !s.embedding.is_empty()));
    }

    #[test]
    fn results_are_sorted_by_similarity() {
        let index = VectorIndex::build(vec![
            section("far", vec![-1.0, 0.0]),
            section("near", vec![1.0, 0.1]),
            section("side", vec![0.0, 1.0]),
            section("exact", vec![2.0, 0.0]),
        ])
        .unwrap();
        let results = index.retrieve_relevant(&[1.0, 0.0], 10).unwrap();
        assert_eq!(titles(&results), vec!["exact", "near", "side", "far"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_k_truncates_and_ties_keep_order() {
        let index = VectorIndex::build(vec![
            section("first", vec![0.0, 1.0]),
            section("second", vec![0.0, 3.0]),
            section("third", vec![0.0, 2.0]),
        ])
        .unwrap();
        let results = index.retrieve_relevant(&[0.0, 1.0], 2).unwrap();
        assert_eq!(titles(&results), vec!["first", "second"]);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = VectorIndex::new();
        assert!(index.retrieve_relevant(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_fails_fast() {
        let index = VectorIndex::build(vec![section("a", vec![1.0, 0.0, 0.0])]).unwrap();
        let err = index.retrieve_relevant(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn mixed_dimensions_are_rejected_at_build() {
        let err = VectorIndex::build(vec![section("a", vec![1.0, 0.0]), section("b", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, StoreError::InconsistentDimensions { .. }));
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn from_files_flattens_in_order() {
        let file = |name: &str, titles: &[(&str, Vec<f32>)]| EmbeddingFile {
            file: name.to_string(),
            sections: titles
                .iter()
                .enumerate()
                .map(|(i, (t, e))| IndexedSection {
                    level: 1,
                    title: t.to_string(),
                    text: String::new(),
                    embedding: SectionEmbedding {
                        index: i,
                        embedding: e.clone(),
                    },
                })
                .collect(),
        };
        let files = vec![
            file("a.md", &[("a1", vec![1.0]), ("a2", vec![])]),
            file("b.md", &[("b1", vec![2.0])]),
        ];
        let index = VectorIndex::from_files(&files).unwrap();
        let names: Vec<_> = index.sections().map(|s| s.title.as_str()).collect();
        assert_eq!(names, vec!["a1", "b1"]);
        assert_eq!(index.dimension(), Some(1));
    }
}
