//! Where Docent keeps its own data (config, built index).
//!
//! Documentation sources stay wherever the site keeps them. Only derived state lives here.

use std::path::PathBuf;

/// File name of the default serialized index inside the app data directory.
pub const INDEX_FILENAME: &str = "embeddings.json";

/// Returns the directory where Docent stores config and the built index.
/// On Linux: `~/.local/share/docent/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("dev", "Docent", "docent")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default location of the serialized index, if the app data directory is available.
pub fn default_index_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(INDEX_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_path_lives_in_app_data() {
        if let (Some(dir), Some(index)) = (app_data_dir(), default_index_path()) {
            assert_eq!(index.parent(), Some(dir.as_path()));
            assert!(index.ends_with(INDEX_FILENAME));
        }
    }
}
