//! Atomic JSON document writes.
//!
//! Each document is serialized to `{path}.tmp` and renamed over the final
//! path. Rename is atomic on the filesystems we target, so a reader polling
//! the output directory sees either the previous complete document or the
//! new complete document, never a torn one.

use std::error::Error;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::Document;

/// File name of the aggregate document.
pub const AGGREGATE_FILE: &str = "feeds.json";

/// Serialize `value` and atomically replace the document at `path`.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, &json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Write the aggregate and per-category documents under `output_dir`.
///
/// A failed aggregate write fails the run. A failed category write is logged
/// and skipped: the aggregate already carries every entry, so the client
/// still has a complete (if slightly staler per-category) view.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_documents(
    output_dir: &str,
    aggregate: &Document,
    per_category: &[(String, Document)],
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;

    let aggregate_path = Path::new(output_dir).join(AGGREGATE_FILE);
    write_json_atomic(&aggregate_path, aggregate).await?;
    info!(
        path = %aggregate_path.display(),
        count = aggregate.count,
        "wrote aggregate document"
    );

    for (category, document) in per_category {
        let path = Path::new(output_dir).join(format!("{category}.json"));
        match write_json_atomic(&path, document).await {
            Ok(()) => info!(
                path = %path.display(),
                count = document.count,
                "wrote category document"
            ),
            Err(e) => error!(
                path = %path.display(),
                error = %e,
                "failed writing category document; aggregate already written"
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn document(count: usize) -> Document {
        Document {
            generated_at: "2025-06-01T12:00:00Z".to_string(),
            count,
            items: vec![],
        }
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");

        write_json_atomic(&path, &document(1)).await.unwrap();
        write_json_atomic(&path, &document(2)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: Document = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.count, 2);
        assert!(!tmp_path(&path).exists(), "temp file must not linger");
    }

    #[tokio::test]
    async fn test_crash_before_rename_leaves_previous_document_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");
        write_json_atomic(&path, &document(1)).await.unwrap();

        // Simulate a crash between temp-write and rename: the temp file
        // holds a torn write, the rename never happened.
        std::fs::write(tmp_path(&path), b"{\"generatedAt\": \"2025-").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: Document = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.count, 1);
    }

    #[tokio::test]
    async fn test_write_documents_creates_aggregate_and_categories() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data");
        let per_category = vec![
            ("monde".to_string(), document(2)),
            ("tech".to_string(), document(1)),
        ];

        write_documents(out.to_str().unwrap(), &document(3), &per_category)
            .await
            .unwrap();

        assert!(out.join("feeds.json").exists());
        assert!(out.join("monde.json").exists());
        assert!(out.join("tech.json").exists());
    }

    #[tokio::test]
    async fn test_category_write_failure_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        // Occupy the category path with a directory so the rename fails.
        std::fs::create_dir(out.join("monde.json")).unwrap();

        let per_category = vec![("monde".to_string(), document(1))];
        write_documents(out.to_str().unwrap(), &document(1), &per_category)
            .await
            .unwrap();

        assert!(out.join("feeds.json").exists());
    }

    #[tokio::test]
    async fn test_aggregate_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // output_dir is an existing *file*: create_dir_all must fail.
        let bogus = dir.path().join("not_a_dir");
        std::fs::write(&bogus, b"x").unwrap();

        let result = write_documents(bogus.to_str().unwrap(), &document(1), &[]).await;
        assert!(result.is_err());
    }
}
