use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::Result;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion,
};
use serde::Serialize;
use std::sync::Arc;

/// Metadata for one stored object. Folder placeholders are names ending in `/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobDescriptor {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

impl BlobDescriptor {
    pub fn new(bucket: &str, name: &str, size: u64) -> Self {
        Self {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size,
            content_type: content_type_for(name),
            last_modified: None,
            e_tag: None,
            version: None,
        }
    }

    fn from_meta(bucket: &str, meta: ObjectMeta) -> Self {
        let name = meta.location.to_string();
        Self {
            bucket: bucket.to_string(),
            content_type: content_type_for(&name),
            name,
            size: meta.size as u64,
            last_modified: Some(meta.last_modified),
            e_tag: meta.e_tag,
            version: meta.version,
        }
    }

    pub fn is_folder_placeholder(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn is_csv(&self) -> bool {
        self.name.ends_with(".csv")
    }

    pub fn object_version(&self) -> ObjectVersion {
        ObjectVersion {
            e_tag: self.e_tag.clone(),
            version: self.version.clone(),
        }
    }
}

fn content_type_for(name: &str) -> Option<String> {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
    let content_type = match extension.as_str() {
        "csv" => "text/csv",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "parquet" => "application/vnd.apache.parquet",
        _ => return None,
    };
    Some(content_type.to_string())
}

/// Version identity of a stored object as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectVersion {
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    Overwrite,
    /// Fails with `Error::Conflict` if the object already exists.
    CreateOnly,
    /// Fails with `Error::Conflict` unless the stored object still has this version.
    Matches(ObjectVersion),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;

    /// Every object in the bucket, optionally restricted to a path prefix.
    async fn list_blobs(&self, prefix: Option<&str>) -> Result<Vec<BlobDescriptor>>;

    async fn get_object(&self, key: &str) -> Result<Bytes>;

    async fn head_object(&self, key: &str) -> Result<Option<BlobDescriptor>>;

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: WriteCondition,
    ) -> Result<ObjectVersion>;
}

/// [`ObjectStorage`] over any `object_store` backend bound to one bucket.
pub struct BucketStorage {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    supports_attributes: bool,
}

impl BucketStorage {
    pub fn new(bucket: &str, store: Arc<dyn ObjectStore>, supports_attributes: bool) -> Self {
        Self {
            bucket: bucket.to_string(),
            store,
            supports_attributes,
        }
    }
}

#[async_trait]
impl ObjectStorage for BucketStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_blobs(&self, prefix: Option<&str>) -> Result<Vec<BlobDescriptor>> {
        let prefix = prefix
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(ObjectPath::from);

        let metas: Vec<ObjectMeta> = self.store.list(prefix.as_ref()).try_collect().await?;

        Ok(metas
            .into_iter()
            .map(|meta| BlobDescriptor::from_meta(&self.bucket, meta))
            .collect())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let result = self.store.get(&ObjectPath::from(key)).await?;
        Ok(result.bytes().await?)
    }

    async fn head_object(&self, key: &str) -> Result<Option<BlobDescriptor>> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(BlobDescriptor::from_meta(&self.bucket, meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: WriteCondition,
    ) -> Result<ObjectVersion> {
        let mode = match condition {
            WriteCondition::Overwrite => PutMode::Overwrite,
            WriteCondition::CreateOnly => PutMode::Create,
            WriteCondition::Matches(version) => PutMode::Update(UpdateVersion {
                e_tag: version.e_tag,
                version: version.version,
            }),
        };

        let mut options = PutOptions {
            mode,
            ..Default::default()
        };
        if self.supports_attributes {
            options.attributes =
                Attributes::from_iter([(Attribute::ContentType, content_type.to_string())]);
        }

        let result = self
            .store
            .put_opts(&ObjectPath::from(key), PutPayload::from(data), options)
            .await?;

        Ok(ObjectVersion {
            e_tag: result.e_tag,
            version: result.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use object_store::memory::InMemory;

    fn storage() -> BucketStorage {
        BucketStorage::new("weather", Arc::new(InMemory::new()), true)
    }

    #[tokio::test]
    async fn test_list_reports_metadata() {
        let storage = storage();
        storage
            .put_object("daily/a.csv", Bytes::from_static(b"x\n1\n"), "text/csv", WriteCondition::Overwrite)
            .await
            .unwrap();
        storage
            .put_object("notes.txt", Bytes::from_static(b"hi"), "text/plain", WriteCondition::Overwrite)
            .await
            .unwrap();

        let all = storage.list_blobs(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let daily = storage.list_blobs(Some("daily/")).await.unwrap();
        assert_eq!(daily.len(), 1);
        let blob = &daily[0];
        assert_eq!(blob.bucket, "weather");
        assert_eq!(blob.name, "daily/a.csv");
        assert_eq!(blob.size, 4);
        assert_eq!(blob.content_type.as_deref(), Some("text/csv"));
        assert!(blob.last_modified.is_some());
        assert!(blob.e_tag.is_some());
    }

    #[tokio::test]
    async fn test_create_only_refuses_existing_object() {
        let storage = storage();
        storage
            .put_object("a.csv", Bytes::from_static(b"1"), "text/csv", WriteCondition::CreateOnly)
            .await
            .unwrap();

        let second = storage
            .put_object("a.csv", Bytes::from_static(b"2"), "text/csv", WriteCondition::CreateOnly)
            .await;
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_matching_version_detects_concurrent_change() {
        let storage = storage();
        storage
            .put_object("a.csv", Bytes::from_static(b"1"), "text/csv", WriteCondition::Overwrite)
            .await
            .unwrap();
        let seen = storage.head_object("a.csv").await.unwrap().unwrap();

        // Someone else rewrites the object after we read it.
        storage
            .put_object("a.csv", Bytes::from_static(b"2"), "text/csv", WriteCondition::Overwrite)
            .await
            .unwrap();

        let stale = storage
            .put_object(
                "a.csv",
                Bytes::from_static(b"3"),
                "text/csv",
                WriteCondition::Matches(seen.object_version()),
            )
            .await;
        assert!(matches!(stale, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_head_of_missing_object_is_none() {
        assert!(storage().head_object("missing.csv").await.unwrap().is_none());
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for("a/b.CSV").as_deref(), Some("text/csv"));
        assert_eq!(content_type_for("a/b"), None);
        assert_eq!(content_type_for("a/b.bin"), None);
    }
}
