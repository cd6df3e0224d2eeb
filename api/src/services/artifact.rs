use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::ServiceError;

/// The (app, user, session) triple every artifact lives under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactScope {
    pub app_name: String,
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// One stored version of an artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Versioned file storage. Saving the same name again creates a new
/// version; versions are numbered from 0 in save order.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a new version and return its version number.
    async fn save(
        &self,
        scope: &ArtifactScope,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<u32, ServiceError>;

    /// Load a specific version, or the latest when `version` is `None`.
    async fn load(
        &self,
        scope: &ArtifactScope,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>, ServiceError>;

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>, ServiceError>;

    async fn list_versions(
        &self,
        scope: &ArtifactScope,
        name: &str,
    ) -> Result<Vec<u32>, ServiceError>;

    /// Remove all versions. Returns true when anything was deleted.
    async fn delete(&self, scope: &ArtifactScope, name: &str) -> Result<bool, ServiceError>;
}

// ──────────────────────────────────────────────
// In-memory backend
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: RwLock<HashMap<ArtifactScope, BTreeMap<String, Vec<Artifact>>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(
        &self,
        scope: &ArtifactScope,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<u32, ServiceError> {
        let mut inner = self.inner.write();
        let versions = inner
            .entry(scope.clone())
            .or_default()
            .entry(name.to_string())
            .or_default();
        versions.push(Artifact {
            mime_type: mime_type.to_string(),
            data,
        });
        Ok((versions.len() - 1) as u32)
    }

    async fn load(
        &self,
        scope: &ArtifactScope,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>, ServiceError> {
        let inner = self.inner.read();
        let Some(versions) = inner.get(scope).and_then(|names| names.get(name)) else {
            return Ok(None);
        };
        let artifact = match version {
            Some(v) => versions.get(v as usize),
            None => versions.last(),
        };
        Ok(artifact.cloned())
    }

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .inner
            .read()
            .get(scope)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_versions(
        &self,
        scope: &ArtifactScope,
        name: &str,
    ) -> Result<Vec<u32>, ServiceError> {
        Ok(self
            .inner
            .read()
            .get(scope)
            .and_then(|names| names.get(name))
            .map(|versions| (0..versions.len() as u32).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, scope: &ArtifactScope, name: &str) -> Result<bool, ServiceError> {
        let mut inner = self.inner.write();
        Ok(inner
            .get_mut(scope)
            .is_some_and(|names| names.remove(name).is_some()))
    }
}

// ──────────────────────────────────────────────
// Local folder backend
// ──────────────────────────────────────────────

/// Artifacts on the local filesystem, laid out as
/// `{base}/{app}/{user}/{session}/{name}/v{version}` with a `.mime`
/// sidecar per version.
pub struct LocalFolderArtifactStore {
    base: PathBuf,
}

impl LocalFolderArtifactStore {
    pub async fn new(base_path: &str) -> Result<Self, ServiceError> {
        let base = PathBuf::from(base_path);
        tokio::fs::create_dir_all(&base).await?;
        Ok(Self { base })
    }

    fn artifact_dir(&self, scope: &ArtifactScope, name: &str) -> Result<PathBuf, ServiceError> {
        Ok(self
            .scope_dir(scope)?
            .join(checked_component(name, "filename")?))
    }

    fn scope_dir(&self, scope: &ArtifactScope) -> Result<PathBuf, ServiceError> {
        Ok(self
            .base
            .join(checked_component(&scope.app_name, "app_name")?)
            .join(scope.user_id.to_string())
            .join(scope.session_id.to_string()))
    }
}

/// Scope components become directory names, so anything that could climb
/// out of the artifact base is rejected here regardless of what the route
/// layer validated.
fn checked_component<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ServiceError> {
    let bad = value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..");
    if bad {
        return Err(ServiceError::InvalidScope { field });
    }
    Ok(value)
}

async fn versions_in(dir: &Path) -> Result<Vec<u32>, ServiceError> {
    let mut versions = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(version) = name.strip_prefix('v').and_then(|v| v.parse::<u32>().ok()) {
            if !name.ends_with(".mime") {
                versions.push(version);
            }
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

#[async_trait]
impl ArtifactStore for LocalFolderArtifactStore {
    async fn save(
        &self,
        scope: &ArtifactScope,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<u32, ServiceError> {
        let dir = self.artifact_dir(scope, name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let version = versions_in(&dir).await?.last().map_or(0, |last| last + 1);
        tokio::fs::write(dir.join(format!("v{version}")), &data).await?;
        tokio::fs::write(dir.join(format!("v{version}.mime")), mime_type.as_bytes()).await?;
        Ok(version)
    }

    async fn load(
        &self,
        scope: &ArtifactScope,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>, ServiceError> {
        let dir = self.artifact_dir(scope, name)?;
        let version = match version {
            Some(v) => v,
            None => match versions_in(&dir).await?.last() {
                Some(latest) => *latest,
                None => return Ok(None),
            },
        };
        let data = match tokio::fs::read(dir.join(format!("v{version}"))).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mime_type = tokio::fs::read_to_string(dir.join(format!("v{version}.mime")))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok(Some(Artifact { mime_type, data }))
    }

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>, ServiceError> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.scope_dir(scope)?).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn list_versions(
        &self,
        scope: &ArtifactScope,
        name: &str,
    ) -> Result<Vec<u32>, ServiceError> {
        versions_in(&self.artifact_dir(scope, name)?).await
    }

    async fn delete(&self, scope: &ArtifactScope, name: &str) -> Result<bool, ServiceError> {
        let dir = self.artifact_dir(scope, name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ArtifactScope {
        ArtifactScope {
            app_name: "demo".to_string(),
            user_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
        }
    }

    async fn versioning(store: &dyn ArtifactStore) {
        let scope = scope();

        let v0 = store
            .save(&scope, "report.txt", "text/plain", b"first".to_vec())
            .await
            .unwrap();
        let v1 = store
            .save(&scope, "report.txt", "text/plain", b"second".to_vec())
            .await
            .unwrap();
        assert_eq!((v0, v1), (0, 1));

        let latest = store.load(&scope, "report.txt", None).await.unwrap().unwrap();
        assert_eq!(latest.data, b"second");

        let first = store
            .load(&scope, "report.txt", Some(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.data, b"first");
        assert_eq!(first.mime_type, "text/plain");

        assert_eq!(
            store.list_versions(&scope, "report.txt").await.unwrap(),
            vec![0, 1]
        );
        assert_eq!(
            store.list_keys(&scope).await.unwrap(),
            vec!["report.txt".to_string()]
        );

        // Other scopes see nothing
        let other = ArtifactScope {
            session_id: Uuid::now_v7(),
            ..scope.clone()
        };
        assert!(store.list_keys(&other).await.unwrap().is_empty());
        assert!(store.load(&other, "report.txt", None).await.unwrap().is_none());

        assert!(store.delete(&scope, "report.txt").await.unwrap());
        assert!(!store.delete(&scope, "report.txt").await.unwrap());
        assert!(store.load(&scope, "report.txt", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_backend_versioning() {
        versioning(&MemoryArtifactStore::new()).await;
    }

    #[tokio::test]
    async fn local_folder_backend_versioning() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderArtifactStore::new(dir.path().to_str().unwrap())
            .await
            .unwrap();
        versioning(&store).await;
    }

    #[tokio::test]
    async fn traversal_scope_components_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("artifacts");
        let store = LocalFolderArtifactStore::new(base.to_str().unwrap())
            .await
            .unwrap();

        let evil = ArtifactScope {
            app_name: "../escaped".to_string(),
            user_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
        };
        let err = store
            .save(&evil, "payload.bin", "application/octet-stream", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidScope { field: "app_name" }));
        assert!(!tmp.path().join("escaped").exists());

        // Reads and deletes refuse the same scopes
        assert!(store.load(&evil, "payload.bin", None).await.is_err());
        assert!(store.list_keys(&evil).await.is_err());
        assert!(store.delete(&evil, "payload.bin").await.is_err());

        // Filenames are checked at this layer too
        let scope = scope();
        assert!(
            store
                .save(&scope, "../up.txt", "text/plain", b"x".to_vec())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn user_namespace_prefix_is_preserved() {
        let store = MemoryArtifactStore::new();
        let scope = scope();
        store
            .save(&scope, "user:notes.md", "text/markdown", b"notes".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.list_keys(&scope).await.unwrap(),
            vec!["user:notes.md".to_string()]
        );
    }
}
