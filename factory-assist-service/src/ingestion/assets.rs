//! Page-addressable image asset store.
//!
//! Every image extracted from a document lands in one flat directory under the
//! name `{stem}_{tag}_p{page}_{index}.{ext}`. `tag` is a short hash of the full
//! source file name, so `m1.pdf` and `m1.txt` (or `pump manual.pdf` and
//! `pump_manual.pdf`) never share a name. Re-ingesting a document overwrites its
//! assets in place instead of leaving orphans behind.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::hash::compute_content_hash;
use crate::error::ProcessingError;

/// Hex digits of the source name hash kept in asset names
const SOURCE_TAG_LEN: usize = 8;

/// Alt text used for every image marker
pub const MARKER_ALT: &str = "diagram";

/// An extracted image ready to be persisted
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Sanitize a string for use as a filename
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            // Brackets and parens would break the markdown marker
            '(' | ')' | '[' | ']' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// File stem of a source document, sanitized for asset names
pub fn document_stem(source_file: &str) -> String {
    let stem = Path::new(source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file.to_string());
    let sanitized = sanitize_filename(&stem);
    if sanitized.is_empty() {
        "document".to_string()
    } else {
        sanitized
    }
}

/// Name prefix shared by every asset of one source file
pub fn document_prefix(source_file: &str) -> String {
    let hash = compute_content_hash(source_file.as_bytes());
    format!("{}_{}", document_stem(source_file), &hash[..SOURCE_TAG_LEN])
}

/// Deterministic asset name for an image on a page.
pub fn asset_name(source_file: &str, page_number: u32, image_index: usize, extension: &str) -> String {
    format!(
        "{}_p{}_{}.{}",
        document_prefix(source_file),
        page_number,
        image_index,
        extension.trim_start_matches('.').to_ascii_lowercase()
    )
}

/// Whether `name` is an asset carrying the given document prefix.
fn is_owned_by(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix("_p") else {
        return false;
    };
    let Some((page, rest)) = rest.split_once('_') else {
        return false;
    };
    let Some((index, ext)) = rest.split_once('.') else {
        return false;
    };
    !page.is_empty()
        && page.chars().all(|c| c.is_ascii_digit())
        && !index.is_empty()
        && index.chars().all(|c| c.is_ascii_digit())
        && !ext.is_empty()
        && !ext.contains('.')
}

/// Directory-backed image store
pub struct ImageStore {
    dir: PathBuf,
    base_url: String,
}

impl ImageStore {
    /// `base_url` is the public prefix the images are served under, e.g.
    /// `http://localhost:8000/images`.
    pub fn new(dir: PathBuf, base_url: impl Into<String>) -> Self {
        Self {
            dir,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Write an asset, replacing any previous bytes under the same name.
    pub fn persist(&self, asset: &ImageAsset) -> Result<(), ProcessingError> {
        std::fs::create_dir_all(&self.dir).map_err(ProcessingError::Io)?;
        std::fs::write(self.dir.join(&asset.id), &asset.bytes).map_err(ProcessingError::Io)?;
        debug!(asset = %asset.id, size = asset.size_bytes(), "Persisted image asset");
        Ok(())
    }

    /// Public URL of a persisted asset
    pub fn url_for(&self, asset_id: &str) -> String {
        format!("{}/{}", self.base_url, asset_id)
    }

    /// Markdown marker that embeds an asset into page content
    pub fn marker_for(&self, asset_id: &str) -> String {
        format!("![{}]({})", MARKER_ALT, self.url_for(asset_id))
    }

    /// Map a marker URL back to the local file it points at.
    ///
    /// Only the final path segment is used; anything that could escape the
    /// image directory resolves to `None`.
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let name = without_query.rsplit('/').next()?;
        if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Delete the named assets. Missing files and names that are not plain
    /// file names are skipped. Returns the number removed.
    pub fn delete_assets(&self, asset_ids: &[String]) -> usize {
        let mut removed = 0;
        for id in asset_ids {
            if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
                warn!(asset = %id, "Refusing to delete asset with a path in its name");
                continue;
            }
            match std::fs::remove_file(self.dir.join(id)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(asset = %id, error = %e, "Failed to delete image asset"),
            }
        }
        removed
    }

    /// Delete every asset named with the prefix of `source_file`, including
    /// images of pages that never reached the index. Returns the number removed.
    pub fn delete_for_document(&self, source_file: &str) -> usize {
        let prefix = document_prefix(source_file);
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list image directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_owned_by(&name, &prefix) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(asset = %name, error = %e, "Failed to delete image asset"),
            }
        }

        debug!(file = %source_file, removed, "Deleted document image assets");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World"), "Hello_World");
        assert_eq!(sanitize_filename("File/Name:Test"), "File_Name_Test");
        assert_eq!(sanitize_filename("pump (rev 2)"), "pump__rev_2");
        assert_eq!(sanitize_filename("  spaces  "), "spaces");
    }

    #[test]
    fn test_asset_name_is_deterministic() {
        let first = asset_name("Pump Manual.pdf", 3, 1, "png");
        let second = asset_name("Pump Manual.pdf", 3, 1, "PNG");
        assert!(first.starts_with("Pump_Manual_"));
        assert!(first.ends_with("_p3_1.png"));
        assert_eq!(first, second);
        assert_ne!(first, asset_name("Pump Manual.pdf", 3, 2, "png"));
        assert_ne!(first, asset_name("Pump Manual.pdf", 4, 1, "png"));
    }

    #[test]
    fn test_asset_names_differ_per_source_file() {
        assert_ne!(asset_name("m1.pdf", 1, 0, "png"), asset_name("m1.txt", 1, 0, "png"));
        assert_ne!(
            asset_name("pump manual.pdf", 1, 0, "png"),
            asset_name("pump_manual.pdf", 1, 0, "png")
        );
        assert_eq!(document_prefix("m1.pdf").len(), "m1_".len() + SOURCE_TAG_LEN);
    }

    #[test]
    fn test_asset_name_keeps_unicode_stem() {
        let name = asset_name("注塑机手册.pdf", 1, 0, "jpeg");
        assert!(name.starts_with("注塑机手册_"));
        assert!(name.ends_with("_p1_0.jpeg"));
    }

    #[test]
    fn test_marker_and_resolve_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().to_path_buf(), "http://localhost:8000/images/");

        let marker = store.marker_for("m1_p2_0.png");
        assert_eq!(marker, "![diagram](http://localhost:8000/images/m1_p2_0.png)");

        let resolved = store
            .resolve_url("http://localhost:8000/images/m1_p2_0.png?v=1")
            .unwrap();
        assert_eq!(resolved, dir.path().join("m1_p2_0.png"));
        assert!(store.resolve_url("http://localhost:8000/images/..").is_none());
        assert!(store.resolve_url("http://localhost:8000/images/").is_none());
    }

    fn persist_all(store: &ImageStore, ids: &[String]) {
        for id in ids {
            store
                .persist(&ImageAsset {
                    id: id.clone(),
                    bytes: vec![1, 2, 3],
                })
                .unwrap();
        }
    }

    #[test]
    fn test_delete_for_document_only_removes_owned_assets() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().to_path_buf(), "http://localhost:8000/images");

        let owned = vec![asset_name("m1.pdf", 1, 0, "png"), asset_name("m1.pdf", 12, 3, "jpeg")];
        let others = vec![
            asset_name("m10.pdf", 1, 0, "png"),
            asset_name("m1.txt", 1, 0, "png"),
            format!("{}_notes.png", document_prefix("m1.pdf")),
        ];
        persist_all(&store, &owned);
        persist_all(&store, &others);

        assert_eq!(store.delete_for_document("m1.pdf"), 2);
        for id in &owned {
            assert!(!dir.path().join(id).exists(), "{id} should be deleted");
        }
        for id in &others {
            assert!(dir.path().join(id).exists(), "{id} should be kept");
        }
    }

    #[test]
    fn test_sanitized_collisions_keep_separate_assets() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().to_path_buf(), "http://localhost:8000/images");

        let spaced = vec![asset_name("pump manual.pdf", 1, 0, "png")];
        let underscored = vec![asset_name("pump_manual.pdf", 1, 0, "png")];
        persist_all(&store, &spaced);
        persist_all(&store, &underscored);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        assert_eq!(store.delete_for_document("pump_manual.pdf"), 1);
        assert!(dir.path().join(&spaced[0]).exists());
    }

    #[test]
    fn test_delete_assets_removes_exactly_the_named_files() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().to_path_buf(), "http://localhost:8000/images");
        let ids = vec!["a_p1_0.png".to_string(), "a_p1_1.png".to_string()];
        persist_all(&store, &ids);
        std::fs::write(dir.path().join("keep.png"), b"x").unwrap();

        let requested = vec![
            "a_p1_0.png".to_string(),
            "missing.png".to_string(),
            "../keep.png".to_string(),
        ];
        assert_eq!(store.delete_assets(&requested), 1);
        assert!(!dir.path().join("a_p1_0.png").exists());
        assert!(dir.path().join("a_p1_1.png").exists());
        assert!(dir.path().join("keep.png").exists());
    }

    #[test]
    fn test_delete_for_document_with_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().join("absent"), "http://x/images");
        assert_eq!(store.delete_for_document("m1.pdf"), 0);
    }
}
