//! Reading documents from disk.
//!
//! A document is either a single text file or a directory of page files
//! (`page-001.txt`, `page-002.txt`, ...) as produced by a PDF text
//! extractor. Pages are joined with `[PAGE n]` markers so answers can be
//! traced back to a page. Form feeds in a single file are treated as page
//! breaks.

use crate::error::{MurmurError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PAGE_BREAK: char = '\u{0c}';

/// Load a document, keeping at most `max_pages` pages.
pub async fn load_document(path: &Path, max_pages: usize) -> Result<String> {
    if max_pages == 0 {
        return Err(MurmurError::InvalidParameter(
            "max_pages must be greater than zero".to_string(),
        ));
    }

    let metadata = tokio::fs::metadata(path).await?;
    let pages = if metadata.is_dir() {
        read_page_files(path, max_pages).await?
    } else {
        let text = tokio::fs::read_to_string(path).await?;
        if !text.contains(PAGE_BREAK) {
            return Ok(text);
        }
        text.split(PAGE_BREAK).map(str::to_string).collect()
    };

    if pages.len() > max_pages {
        warn!("Document has {} pages, keeping the first {}", pages.len(), max_pages);
    }
    Ok(join_pages(pages.iter().take(max_pages).map(String::as_str)))
}

async fn read_page_files(dir: &Path, max_pages: usize) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(MurmurError::InvalidParameter(format!(
            "no .txt page files in {}",
            dir.display()
        )));
    }
    debug!("Reading {} of {} page files", files.len().min(max_pages), files.len());

    let mut pages = Vec::with_capacity(files.len().min(max_pages));
    for file in files.iter().take(max_pages) {
        pages.push(tokio::fs::read_to_string(file).await?);
    }
    Ok(pages)
}

/// Join page texts with one-based `[PAGE n]` markers.
pub fn join_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| format!("[PAGE {}]\n{}", i + 1, page.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_join_pages() {
        assert_eq!(
            join_pages(["first page ", "second"]),
            "[PAGE 1]\nfirst page\n\n[PAGE 2]\nsecond"
        );
    }

    #[tokio::test]
    async fn test_plain_file_is_returned_as_is() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Just some notes.\n").unwrap();
        assert_eq!(load_document(&path, 50).await.unwrap(), "Just some notes.\n");
    }

    #[tokio::test]
    async fn test_form_feeds_split_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "one\u{0c}two\u{0c}three").unwrap();
        assert_eq!(
            load_document(&path, 2).await.unwrap(),
            "[PAGE 1]\none\n\n[PAGE 2]\ntwo"
        );
    }

    #[tokio::test]
    async fn test_page_directory_is_sorted_and_capped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("page-002.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("page-001.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("page-003.txt"), "gamma").unwrap();
        std::fs::write(dir.path().join("cover.png"), "not text").unwrap();

        let text = load_document(dir.path(), 2).await.unwrap();
        assert_eq!(text, "[PAGE 1]\nalpha\n\n[PAGE 2]\nbeta");
    }

    #[tokio::test]
    async fn test_empty_directory_and_missing_path() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_document(dir.path(), 5).await,
            Err(MurmurError::InvalidParameter(_))
        ));
        assert!(matches!(
            load_document(&dir.path().join("missing.txt"), 5).await,
            Err(MurmurError::Io(_))
        ));
    }
}
