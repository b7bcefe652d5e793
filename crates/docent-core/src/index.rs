//! Index pipeline: scan → sections → embed → serialized index file.

use std::path::Path;

use crate::docs::{scan_docs, Doc, ScanError};
use crate::embeddings::{EmbedError, Embedder};
use crate::index_file::{write_index_file, EmbeddingFile, IndexFileError, IndexedSection, SectionEmbedding};
use crate::sections::parse_sections;

/// Totals from one build, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub files: usize,
    pub sections: usize,
    pub embedded: usize,
    /// Sections over the size limit, kept without an embedding.
    pub oversized: usize,
}

/// Scans `root`, splits every doc into sections and embeds those within `max_chars`.
pub async fn build_index_file(
    root: &Path,
    embedder: &dyn Embedder,
    max_chars: usize,
) -> Result<(Vec<EmbeddingFile>, BuildStats), IndexError> {
    let docs = scan_docs(root)?;
    embed_docs(root, &docs, embedder, max_chars).await
}

/// Like [`build_index_file`] for docs that were already scanned (e.g. by the watcher).
/// File names are made relative to `root`.
pub async fn embed_docs(
    root: &Path,
    docs: &[Doc],
    embedder: &dyn Embedder,
    max_chars: usize,
) -> Result<(Vec<EmbeddingFile>, BuildStats), IndexError> {
    let mut stats = BuildStats::default();
    let mut files = Vec::with_capacity(docs.len());

    for doc in docs {
        let file = embed_doc(root, doc, embedder, max_chars, &mut stats).await?;
        files.push(file);
    }
    stats.files = files.len();
    tracing::info!(
        files = stats.files,
        sections = stats.sections,
        embedded = stats.embedded,
        oversized = stats.oversized,
        "index built"
    );
    Ok((files, stats))
}

/// Builds the index and writes it to `out`.
pub async fn build_and_write(
    root: &Path,
    out: &Path,
    embedder: &dyn Embedder,
    max_chars: usize,
) -> Result<BuildStats, IndexError> {
    let (files, stats) = build_index_file(root, embedder, max_chars).await?;
    write_index_file(out, &files)?;
    tracing::info!(path = %out.display(), "index written");
    Ok(stats)
}

async fn embed_doc(
    root: &Path,
    doc: &Doc,
    embedder: &dyn Embedder,
    max_chars: usize,
    stats: &mut BuildStats,
) -> Result<EmbeddingFile, IndexError> {
    let file = relative_name(root, &doc.path);
    let mut sections = Vec::new();

    for (index, section) in parse_sections(doc).into_iter().enumerate() {
        stats.sections += 1;
        let embedding = if section.char_len() <= max_chars {
            stats.embedded += 1;
            embedder.embed(&section.text).await?
        } else {
            stats.oversized += 1;
            tracing::debug!(
                file = %file,
                title = %section.title,
                chars = section.char_len(),
                "section too long, skipping embedding"
            );
            Vec::new()
        };
        sections.push(IndexedSection {
            level: section.level,
            title: section.title,
            text: section.text,
            embedding: SectionEmbedding { index, embedding },
        });
    }
    tracing::info!(file = %file, sections = sections.len(), "embedded doc");
    Ok(EmbeddingFile { file, sections })
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),
    #[error("index file error: {0}")]
    File(#[from] IndexFileError),
}
