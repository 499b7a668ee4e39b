use bytes::Bytes;
use common::config::UnionMode;
use common::dataset::TabularDataset;
use common::{Error, Result};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{BlobDescriptor, ObjectVersion, StorageManager, WriteCondition};

const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub bucket: String,
    pub path: String,
    pub rows: usize,
    pub bytes: usize,
    pub version: ObjectVersion,
}

impl WriteOutcome {
    pub fn message(&self) -> String {
        format!("Wrote {} rows to {}/{}", self.rows, self.bucket, self.path)
    }
}

/// Bucket-level operations the pipeline needs: listing, unioning CSV blobs
/// into one dataset, writing datasets and mirroring folders to local disk.
#[derive(Clone)]
pub struct BlobGateway {
    manager: Arc<StorageManager>,
    union_mode: UnionMode,
    conditional_writes: bool,
}

impl BlobGateway {
    pub fn new(manager: Arc<StorageManager>, union_mode: UnionMode, conditional_writes: bool) -> Self {
        Self {
            manager,
            union_mode,
            conditional_writes,
        }
    }

    pub fn manager(&self) -> &Arc<StorageManager> {
        &self.manager
    }

    /// Full listing of the bucket, in backend order.
    pub async fn list(&self, bucket: &str) -> Result<Vec<BlobDescriptor>> {
        let storage = self.manager.bucket(bucket)?;
        let blobs = storage.list_blobs(None).await?;
        debug!(bucket, count = blobs.len(), "Listed bucket");
        Ok(blobs)
    }

    /// Downloads every CSV blob under `prefix`, one at a time, and
    /// concatenates them row-wise in listing order.
    pub async fn union_csv_blobs(
        &self,
        blobs: &[BlobDescriptor],
        prefix: &str,
    ) -> Result<TabularDataset> {
        let mut first: Option<(&str, Vec<String>)> = None;
        let mut datasets = Vec::new();

        for blob in blobs.iter().filter(|blob| is_union_candidate(blob, prefix)) {
            // Listings can report folder placeholders without their trailing
            // slash; those have no content behind the name.
            let dataset = match self.read_csv(blob).await {
                Ok(dataset) => dataset,
                Err(Error::NotFound(_)) => {
                    warn!(blob = %blob.name, "Listed blob has no content, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some((first_name, expected)) = &first {
                if self.union_mode == UnionMode::Strict {
                    dataset.validate_columns(expected.as_slice()).map_err(|e| {
                        Error::SchemaMismatch(format!(
                            "{} does not match {} under '{}': {}",
                            blob.name, first_name, prefix, e
                        ))
                    })?;
                }
            } else {
                first = Some((blob.name.as_str(), dataset.column_names()));
            }
            datasets.push(dataset);
        }

        if datasets.is_empty() {
            return Err(Error::EmptyUnion {
                prefix: prefix.to_string(),
            });
        }

        let blob_count = datasets.len();
        let unioned = TabularDataset::concat(datasets, self.union_mode)?;

        info!(
            prefix,
            blobs = blob_count,
            rows = unioned.num_rows(),
            "Unioned CSV blobs"
        );
        Ok(unioned)
    }

    async fn read_csv(&self, blob: &BlobDescriptor) -> Result<TabularDataset> {
        let storage = self.manager.bucket(&blob.bucket)?;
        let content = storage.get_object(&blob.name).await?;
        TabularDataset::from_csv(&content).map_err(|e| match e {
            Error::SchemaMismatch(reason) => {
                Error::SchemaMismatch(format!("{}: {}", blob.name, reason))
            }
            other => other,
        })
    }

    /// Serializes `dataset` as CSV (header, no index) and stores it at `path`,
    /// replacing any existing object.
    pub async fn write(&self, dataset: &TabularDataset, bucket: &str, path: &str) -> Result<WriteOutcome> {
        let storage = self.manager.bucket(bucket)?;
        let content = dataset.to_csv()?;
        let bytes = content.len();

        let condition = if self.conditional_writes {
            match storage.head_object(path).await? {
                Some(existing) => WriteCondition::Matches(existing.object_version()),
                None => WriteCondition::CreateOnly,
            }
        } else {
            WriteCondition::Overwrite
        };

        let version = storage
            .put_object(path, Bytes::from(content), CSV_CONTENT_TYPE, condition)
            .await?;

        let outcome = WriteOutcome {
            bucket: bucket.to_string(),
            path: path.to_string(),
            rows: dataset.num_rows(),
            bytes,
            version,
        };
        info!(bucket, path, rows = outcome.rows, bytes, "Wrote dataset");
        Ok(outcome)
    }

    /// Mirrors every object whose name starts with `folder_prefix` into
    /// `destination`, keeping the path relative to the prefix.
    pub async fn download_folder(
        &self,
        bucket: &str,
        folder_prefix: &str,
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let storage = self.manager.bucket(bucket)?;
        tokio::fs::create_dir_all(destination).await?;

        // Object store prefixes are whole path segments, so list from the
        // enclosing directory and filter by the raw string prefix.
        let directory = folder_prefix.rsplit_once('/').map(|(dir, _)| dir);
        let blobs = storage.list_blobs(directory).await?;

        let mut written = Vec::new();
        for blob in blobs.iter().filter(|b| b.name.starts_with(folder_prefix)) {
            let relative = blob.name[folder_prefix.len()..].trim_start_matches('/');
            if relative.is_empty() || blob.is_folder_placeholder() {
                continue;
            }
            let Some(target) = safe_join(destination, relative) else {
                warn!(blob = %blob.name, "Skipping blob with unsafe relative path");
                continue;
            };

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = match storage.get_object(&blob.name).await {
                Ok(content) => content,
                Err(Error::NotFound(_)) => {
                    warn!(blob = %blob.name, "Listed blob has no content, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            tokio::fs::write(&target, &content).await?;
            debug!(blob = %blob.name, target = %target.display(), "Downloaded blob");
            written.push(target);
        }

        info!(
            bucket,
            prefix = folder_prefix,
            files = written.len(),
            destination = %destination.display(),
            "Downloaded folder"
        );
        Ok(written)
    }
}

/// Union filter: under `prefix`, a `.csv` name, and not a folder placeholder.
pub fn is_union_candidate(blob: &BlobDescriptor, prefix: &str) -> bool {
    blob.name.starts_with(prefix) && blob.is_csv() && !blob.is_folder_placeholder()
}

fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStorage;

    const BUCKET: &str = "rainday";

    async fn put(gateway: &BlobGateway, name: &str, body: &str) {
        gateway
            .manager()
            .bucket(BUCKET)
            .unwrap()
            .put_object(name, Bytes::from(body.to_string()), CSV_CONTENT_TYPE, WriteCondition::Overwrite)
            .await
            .unwrap();
    }

    fn gateway(mode: UnionMode, conditional: bool) -> BlobGateway {
        BlobGateway::new(Arc::new(StorageManager::in_memory()), mode, conditional)
    }

    fn blob(name: &str) -> BlobDescriptor {
        BlobDescriptor::new(BUCKET, name, 0)
    }

    #[test]
    fn test_union_filter() {
        assert!(is_union_candidate(&blob("forecast/a.csv"), "forecast/"));
        assert!(!is_union_candidate(&blob("other/a.csv"), "forecast/"));
        assert!(!is_union_candidate(&blob("forecast/a.json"), "forecast/"));
        assert!(!is_union_candidate(&blob("forecast/sub/"), "forecast/"));
    }

    #[tokio::test]
    async fn test_union_concatenates_in_listing_order() {
        let gateway = gateway(UnionMode::Strict, false);
        put(&gateway, "forecast/A.csv", "name,temp\nA,1\nA,2\nA,3\n").await;
        put(&gateway, "forecast/B.csv", "name,temp\nB,4\nB,5\n").await;
        put(&gateway, "forecast/readme.txt", "ignore me").await;
        put(&gateway, "other/C.csv", "name,temp\nC,6\n").await;

        let blobs = gateway.list(BUCKET).await.unwrap();
        let unioned = gateway.union_csv_blobs(&blobs, "forecast/").await.unwrap();

        assert_eq!(unioned.num_rows(), 5);
        assert_eq!(unioned.column_names(), vec!["name", "temp"]);
        assert_eq!(
            unioned.column_values("name").unwrap(),
            ["A", "A", "A", "B", "B"].map(|v| Some(v.to_string())).to_vec()
        );
    }

    #[tokio::test]
    async fn test_union_without_matches_is_empty_union() {
        let gateway = gateway(UnionMode::Strict, false);
        put(&gateway, "other/C.csv", "name\nC\n").await;

        let blobs = gateway.list(BUCKET).await.unwrap();
        let result = gateway.union_csv_blobs(&blobs, "forecast/").await;
        assert!(matches!(result, Err(Error::EmptyUnion { prefix }) if prefix == "forecast/"));
    }

    #[tokio::test]
    async fn test_union_skips_listed_names_without_content() {
        let gateway = gateway(UnionMode::Strict, false);
        put(&gateway, "forecast/A.csv", "name,temp\nA,1\n").await;

        // A placeholder "forecast/old.csv/" is listed as "forecast/old.csv".
        let mut blobs = gateway.list(BUCKET).await.unwrap();
        blobs.insert(0, blob("forecast/old.csv"));
        let unioned = gateway.union_csv_blobs(&blobs, "forecast/").await.unwrap();
        assert_eq!(unioned.num_rows(), 1);

        let only_placeholder = vec![blob("forecast/old.csv")];
        assert!(matches!(
            gateway.union_csv_blobs(&only_placeholder, "forecast/").await,
            Err(Error::EmptyUnion { .. })
        ));
    }

    #[tokio::test]
    async fn test_union_column_mismatch_follows_mode() {
        let strict = gateway(UnionMode::Strict, false);
        put(&strict, "f/a.csv", "name,temp\nA,1\n").await;
        put(&strict, "f/b.csv", "name,humidity\nB,80\n").await;
        let blobs = strict.list(BUCKET).await.unwrap();
        assert!(matches!(
            strict.union_csv_blobs(&blobs, "f/").await,
            Err(Error::SchemaMismatch(reason)) if reason.starts_with("f/b.csv")
        ));

        let reconcile = gateway(UnionMode::Reconcile, false);
        put(&reconcile, "f/a.csv", "name,temp\nA,1\n").await;
        put(&reconcile, "f/b.csv", "name,humidity\nB,80\n").await;
        let blobs = reconcile.list(BUCKET).await.unwrap();
        let merged = reconcile.union_csv_blobs(&blobs, "f/").await.unwrap();
        assert_eq!(merged.column_names(), vec!["name", "temp", "humidity"]);
        assert_eq!(merged.num_rows(), 2);
    }

    #[tokio::test]
    async fn test_written_dataset_is_unioned_back() {
        let gateway = gateway(UnionMode::Strict, false);
        let dataset = TabularDataset::from_rows(
            &["name", "temp"],
            vec![vec![Some("A".into()), Some("1.5".into())]],
        )
        .unwrap();

        let outcome = gateway.write(&dataset, BUCKET, "daily/out.csv").await.unwrap();
        assert_eq!(outcome.rows, 1);
        assert!(outcome.message().contains("daily/out.csv"));

        let blobs = gateway.list(BUCKET).await.unwrap();
        let read_back = gateway.union_csv_blobs(&blobs, "daily/").await.unwrap();
        assert_eq!(read_back.column_names(), dataset.column_names());
        assert_eq!(read_back.column_values("temp").unwrap(), vec![Some("1.5".to_string())]);
    }

    #[tokio::test]
    async fn test_conditional_writes_replace_existing_object() {
        let gateway = gateway(UnionMode::Strict, true);
        let first = TabularDataset::from_rows(&["v"], vec![vec![Some("1".into())]]).unwrap();
        let second = TabularDataset::from_rows(&["v"], vec![vec![Some("2".into())]]).unwrap();

        gateway.write(&first, BUCKET, "x.csv").await.unwrap();
        gateway.write(&second, BUCKET, "x.csv").await.unwrap();

        let content = gateway.manager().bucket(BUCKET).unwrap().get_object("x.csv").await.unwrap();
        assert_eq!(content, Bytes::from_static(b"v\n2\n"));
    }

    #[tokio::test]
    async fn test_download_folder_preserves_relative_paths() {
        let gateway = gateway(UnionMode::Strict, false);
        put(&gateway, "logs/run1/a.csv", "a\n1\n").await;
        put(&gateway, "logs/run1/nested/b.csv", "b\n2\n").await;
        put(&gateway, "logs/run2/c.csv", "c\n3\n").await;

        let dir = tempfile::tempdir().unwrap();
        let mut written = gateway
            .download_folder(BUCKET, "logs/run1/", dir.path())
            .await
            .unwrap();
        written.sort();

        assert_eq!(
            written,
            vec![dir.path().join("a.csv"), dir.path().join("nested/b.csv")]
        );
        assert_eq!(std::fs::read_to_string(dir.path().join("nested/b.csv")).unwrap(), "b\n2\n");
        assert!(!dir.path().join("c.csv").exists());
    }

    #[tokio::test]
    async fn test_download_folder_creates_destination_without_matches() {
        let gateway = gateway(UnionMode::Strict, false);
        put(&gateway, "logs/run1/a.csv", "a\n1\n").await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("fresh/nested");
        let written = gateway
            .download_folder(BUCKET, "nothing/", &destination)
            .await
            .unwrap();

        assert!(written.is_empty());
        assert!(destination.is_dir());
    }

    #[test]
    fn test_safe_join_rejects_parent_components() {
        let root = Path::new("/tmp/out");
        assert_eq!(safe_join(root, "a/b.csv"), Some(root.join("a/b.csv")));
        assert_eq!(safe_join(root, "../b.csv"), None);
    }
}
