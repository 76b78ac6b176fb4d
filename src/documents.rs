//! Input documents: discovery and raw loading.
//!
//! Two kinds of input are understood. A `.json` file is an extraction
//! already done (by hand or by an earlier run) and is used as is. A `.txt`
//! file is quote document text and goes through a `QuoteExtractor`.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::llm::QuoteExtractor;
use crate::schema::QuoteSchema;
use crate::types::QuoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Structured extraction JSON.
    Structured,
    /// Document text needing extraction.
    Text,
}

impl DocumentKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Structured),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Supported documents directly inside `dir`, sorted by file name.
///
/// `exclude` names files to leave out (typically the master record itself
/// when it lives in the input directory).
pub fn discover(dir: &Path, exclude: &[&Path]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let excluded: Vec<Option<&std::ffi::OsStr>> = exclude.iter().map(|p| p.file_name()).collect();

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() || DocumentKind::of(&path).is_none() {
            continue;
        }
        if excluded.contains(&path.file_name()) {
            debug!(path = %path.display(), "Excluded from discovery");
            continue;
        }
        paths.push(path);
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!(dir = %dir.display(), documents = paths.len(), "Documents discovered");
    Ok(paths)
}

/// Load one document as a raw (unconformed) extraction.
pub async fn load_raw(
    path: &Path,
    extractor: Option<&dyn QuoteExtractor>,
    schema: &QuoteSchema,
) -> Result<Value> {
    let kind = DocumentKind::of(path)
        .ok_or_else(|| QuoteError::UnsupportedDocument(path.display().to_string()))?;

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match kind {
        DocumentKind::Structured => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display())),
        DocumentKind::Text => {
            let extractor = extractor.ok_or_else(|| QuoteError::Extraction {
                model: "none".to_string(),
                message: format!("no extractor configured for {}", path.display()),
            })?;
            debug!(path = %path.display(), model = extractor.model_name(), "Extracting document text");
            extractor.extract(&contents, schema).await.map_err(|e| {
                anyhow::Error::from(QuoteError::Extraction {
                    model: extractor.model_name().to_string(),
                    message: format!("{}: {e:#}", path.display()),
                })
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_document_kind() {
        assert_eq!(DocumentKind::of(Path::new("a/chu.json")), Some(DocumentKind::Structured));
        assert_eq!(DocumentKind::of(Path::new("IIS.TXT")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::of(Path::new("quote.pdf")), None);
        assert_eq!(DocumentKind::of(Path::new("README")), None);
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.txt", "c.pdf", "combined_quotes.json", "A.json"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let master = dir.path().join("combined_quotes.json");
        let found = discover(dir.path(), &[master.as_path()]).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.json", "a.txt", "b.json"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        assert!(discover(Path::new("/nonexistent/strata_quotes_input"), &[]).is_err());
    }

    #[tokio::test]
    async fn test_load_structured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chu.json");
        fs::write(&path, r#"{"quotes": {"CHU": {"base": 100}}}"#).unwrap();

        let value = load_raw(&path, None, &QuoteSchema::builtin()).await.unwrap();
        assert_eq!(value["quotes"]["CHU"]["base"], json!(100));
    }

    #[tokio::test]
    async fn test_load_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_raw(&path, None, &QuoteSchema::builtin()).await.is_err());
    }

    #[tokio::test]
    async fn test_load_text_without_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chu.txt");
        fs::write(&path, "CHU quote").unwrap();

        let err = load_raw(&path, None, &QuoteSchema::builtin()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuoteError>(),
            Some(QuoteError::Extraction { .. })
        ));
    }
}
