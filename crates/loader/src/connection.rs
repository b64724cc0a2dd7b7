//! Project → connection resolution.
//!
//! A [`ConnectionProvider`] knows how to find the storage server for a
//! project. The [`ConnectionRegistry`] asks it at most once per project id
//! (while the entry stays in its LRU cache) and hands out the memoised
//! answer afterwards.

use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ertdata_types::ConnectionInfo;
use lru::LruCache;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ConnectionError;

/// Name of the file a running storage server leaves in the project directory.
pub const SERVER_INFO_FILE: &str = "storage_server.json";

/// Upstream collaborator resolving a project to its storage connection.
pub trait ConnectionProvider: Send + Sync {
    fn resolve(&self, project_id: Option<&str>) -> Result<ConnectionInfo, ConnectionError>;
}

/// Always answers with the same connection, whatever the project.
#[derive(Debug, Clone)]
pub struct StaticConnection(pub ConnectionInfo);

impl ConnectionProvider for StaticConnection {
    fn resolve(&self, _project_id: Option<&str>) -> Result<ConnectionInfo, ConnectionError> {
        Ok(self.0.clone())
    }
}

/// Reads `storage_server.json` from a project directory.
///
/// The project id is the directory path. Without one, `default_dir` is
/// used, and without that the lookup fails.
#[derive(Debug, Clone, Default)]
pub struct ServerFileProvider {
    default_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ServerInfoFile {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    baseurl: Option<String>,
    #[serde(default)]
    authtoken: Option<String>,
}

impl ServerFileProvider {
    pub fn new(default_dir: Option<PathBuf>) -> Self {
        Self { default_dir }
    }

    fn read(&self, path: &Path) -> Result<ConnectionInfo, ConnectionError> {
        let content = fs::read_to_string(path).map_err(|source| ConnectionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let info: ServerInfoFile = serde_json::from_str(&content).map_err(|source| ConnectionError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let base_url = info
            .urls
            .into_iter()
            .find(|url| !url.trim().is_empty())
            .or(info.baseurl)
            .ok_or_else(|| ConnectionError::MissingUrl {
                path: path.to_path_buf(),
            })?;
        Ok(ConnectionInfo::new(base_url, info.authtoken)?)
    }
}

impl ConnectionProvider for ServerFileProvider {
    fn resolve(&self, project_id: Option<&str>) -> Result<ConnectionInfo, ConnectionError> {
        let directory = match project_id {
            Some(project) => PathBuf::from(project),
            None => self
                .default_dir
                .clone()
                .ok_or_else(|| ConnectionError::Provider("no project directory given".to_string()))?,
        };
        self.read(&directory.join(SERVER_INFO_FILE))
    }
}

/// Memoising front of a [`ConnectionProvider`].
pub struct ConnectionRegistry {
    provider: Arc<dyn ConnectionProvider>,
    cache: Mutex<LruCache<Option<String>, ConnectionInfo>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("ConnectionRegistry")
            .field("cached", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(provider: Arc<dyn ConnectionProvider>, capacity: NonZeroUsize) -> Self {
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Connection info for `project_id`, asking the provider on a miss.
    ///
    /// The lock is held across the provider call so that concurrent first
    /// lookups of one project reach the provider once. Failures are not
    /// cached.
    pub fn resolve(&self, project_id: Option<&str>) -> Result<ConnectionInfo, ConnectionError> {
        let key = project_id.map(str::to_string);
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(info) = cache.get(&key) {
            debug!(project = ?project_id, "connection cache hit");
            return Ok(info.clone());
        }

        let info = self.provider.resolve(project_id)?;
        info!(
            project = ?project_id,
            base_url = %info.base_url,
            has_token = info.token.is_some(),
            "resolved storage connection"
        );
        cache.put(key, info.clone());
        Ok(info)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl ConnectionProvider for Counting {
        fn resolve(&self, project_id: Option<&str>) -> Result<ConnectionInfo, ConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match project_id {
                Some("broken") => Err(ConnectionError::Provider("server not running".into())),
                Some(project) => Ok(ConnectionInfo::new(format!("http://{project}.local"), Some("t".into()))?),
                None => Ok(ConnectionInfo::new("http://default.local", None)?),
            }
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn resolves_each_project_once() {
        let provider = counting();
        let registry = ConnectionRegistry::new(provider.clone(), NonZeroUsize::new(8).unwrap());

        let first = registry.resolve(Some("alpha")).unwrap();
        let second = registry.resolve(Some("alpha")).unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        registry.resolve(None).unwrap();
        registry.resolve(None).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2, "no-project is its own cache entry");
        assert_eq!(registry.cached_len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let provider = counting();
        let registry = ConnectionRegistry::new(provider.clone(), NonZeroUsize::new(8).unwrap());

        assert!(registry.resolve(Some("broken")).is_err());
        assert!(registry.resolve(Some("broken")).is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.cached_len(), 0);
    }

    #[test]
    fn evicted_projects_are_looked_up_again() {
        let provider = counting();
        let registry = ConnectionRegistry::new(provider.clone(), NonZeroUsize::new(1).unwrap());

        registry.resolve(Some("alpha")).unwrap();
        registry.resolve(Some("beta")).unwrap();
        registry.resolve(Some("alpha")).unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.cached_len(), 1);
    }

    #[test]
    fn server_file_provider_reads_project_directory() {
        let project = tempfile::tempdir().unwrap();
        fs::write(
            project.path().join(SERVER_INFO_FILE),
            r#"{"urls": ["http://127.0.0.1:51820", "http://storage.lan:51820"], "authtoken": "abc", "pid": 42}"#,
        )
        .unwrap();

        let provider = ServerFileProvider::new(None);
        let info = provider.resolve(project.path().to_str()).unwrap();

        assert_eq!(info.base_url, "http://127.0.0.1:51820");
        assert_eq!(info.token.as_deref(), Some("abc"));
    }

    #[test]
    fn server_file_provider_uses_default_directory() {
        let project = tempfile::tempdir().unwrap();
        fs::write(
            project.path().join(SERVER_INFO_FILE),
            r#"{"baseurl": "http://localhost:8000"}"#,
        )
        .unwrap();

        let provider = ServerFileProvider::new(Some(project.path().to_path_buf()));
        let info = provider.resolve(None).unwrap();

        assert_eq!(info.base_url, "http://localhost:8000");
        assert!(info.token.is_none());
    }

    #[test]
    fn server_file_provider_reports_problems() {
        let project = tempfile::tempdir().unwrap();
        let provider = ServerFileProvider::new(None);

        let missing = provider.resolve(project.path().to_str()).unwrap_err();
        assert!(matches!(missing, ConnectionError::Io { .. }));

        fs::write(project.path().join(SERVER_INFO_FILE), r#"{"urls": []}"#).unwrap();
        let no_url = provider.resolve(project.path().to_str()).unwrap_err();
        assert!(matches!(no_url, ConnectionError::MissingUrl { .. }));

        fs::write(project.path().join(SERVER_INFO_FILE), "{not json").unwrap();
        let bad_json = provider.resolve(project.path().to_str()).unwrap_err();
        assert!(matches!(bad_json, ConnectionError::Json { .. }));

        assert!(matches!(
            ServerFileProvider::default().resolve(None),
            Err(ConnectionError::Provider(_))
        ));
    }
}
