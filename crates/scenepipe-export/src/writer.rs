//! Document writer
//!
//! Documents are serialized fully in memory, written to a temporary file in
//! the target directory and renamed over the target, so an existing output
//! is either replaced whole or left untouched.

use std::io::Write;
use std::path::{Path, PathBuf};

use scenepipe_format::SceneDocument;
use tempfile::NamedTempFile;

use crate::ExportResult;

/// Default output next to the authoring file: `<file name>.json`
///
/// The source extension is kept, so `level.blend` exports to
/// `level.blend.json`.
pub fn default_output_path(source: &Path) -> PathBuf {
    let mut name = source.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".json");
    source.with_file_name(name)
}

/// Serialize `document` and atomically replace `path` with it
///
/// Returns the number of bytes written.
pub fn write_document_atomic(document: &SceneDocument, path: &Path, pretty: bool) -> ExportResult<u64> {
    let text = document.to_json_string(pretty)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::info!(path = %path.display(), bytes = text.len(), "Wrote scene document");
    Ok(text.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path_keeps_extension() {
        assert_eq!(
            default_output_path(Path::new("/scenes/cube.blend")),
            PathBuf::from("/scenes/cube.blend.json")
        );
        assert_eq!(default_output_path(Path::new("rig")), PathBuf::from("rig.json"));
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.blend.json");
        std::fs::write(&path, "stale").unwrap();

        let document = SceneDocument::new(24.0);
        let bytes = write_document_atomic(&document, &path, true).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.len() as u64, bytes);
        assert_eq!(SceneDocument::from_json_str(&written).unwrap(), document);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
