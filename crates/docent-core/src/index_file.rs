//! On-disk format of the built index: one entry per doc file, each with its sections
//! and (when the section was small enough) the section's embedding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingFile {
    /// Doc path relative to the docs root, `/`-separated.
    pub file: String,
    pub sections: Vec<IndexedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSection {
    pub level: u8,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub embedding: SectionEmbedding,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionEmbedding {
    /// Position of the section within its file.
    #[serde(default)]
    pub index: usize,
    /// Empty when the section was too long to embed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub embedding: Vec<f32>,
}

impl IndexedSection {
    pub fn has_embedding(&self) -> bool {
        !self.embedding.embedding.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<f32>>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn parse_index(json: &str) -> Result<Vec<EmbeddingFile>, IndexFileError> {
    serde_json::from_str(json).map_err(IndexFileError::Parse)
}

pub fn read_index_file(path: &Path) -> Result<Vec<EmbeddingFile>, IndexFileError> {
    let s = std::fs::read_to_string(path).map_err(|e| IndexFileError::Read(path.to_path_buf(), e))?;
    parse_index(&s)
}

/// Writes the index as pretty JSON, creating parent directories.
pub fn write_index_file(path: &Path, files: &[EmbeddingFile]) -> Result<(), IndexFileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IndexFileError::Write(path.to_path_buf(), e))?;
    }
    let s = serde_json::to_string_pretty(files).map_err(IndexFileError::Parse)?;
    std::fs::write(path, s).map_err(|e| IndexFileError::Write(path.to_path_buf(), e))
}

#[derive(Debug, thiserror::Error)]
pub enum IndexFileError {
    #[error("failed to read index {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write index {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("malformed index: {0}")]
    Parse(serde_json::Error),
}
