//! Remote object stores holding uploaded key blobs
//!
//! A store is a set of containers, one per key id, each holding named text
//! blobs. Absence is not an error at this level: `get_blob` returns `None`
//! and `delete_container` on a missing container succeeds.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, StatsError};

pub trait RemoteStore: Send + Sync {
    fn get_blob(&self, container: &str, name: &str) -> Result<Option<String>>;

    fn put_blob(&self, container: &str, name: &str, contents: &str) -> Result<()>;

    /// Remove a container and all its blobs; idempotent
    fn delete_container(&self, container: &str) -> Result<()>;
}

fn unavailable(what: &str, err: impl std::fmt::Display) -> StatsError {
    StatsError::RemoteUnavailable(format!("{}: {}", what, err))
}

/// Remote store backed by a directory tree `<root>/<container>/<name>`
///
/// Suitable for a mounted object-store bucket or local development.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RemoteStore for DirectoryStore {
    fn get_blob(&self, container: &str, name: &str) -> Result<Option<String>> {
        let path = self.root.join(container).join(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&format!("reading {}", path.display()), e)),
        }
    }

    fn put_blob(&self, container: &str, name: &str, contents: &str) -> Result<()> {
        let dir = self.root.join(container);
        fs::create_dir_all(&dir)
            .map_err(|e| unavailable(&format!("creating {}", dir.display()), e))?;
        let path = dir.join(name);
        fs::write(&path, contents)
            .map_err(|e| unavailable(&format!("writing {}", path.display()), e))
    }

    fn delete_container(&self, container: &str) -> Result<()> {
        let dir = self.root.join(container);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&format!("removing {}", dir.display()), e)),
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    blobs: Mutex<HashMap<(String, String), String>>,
    fetches: AtomicUsize,
    offline: AtomicBool,
}

/// In-process store; clones share contents
///
/// Counts fetches and can be switched offline, which makes it the store of
/// choice for exercising cache behavior.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_blob` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// While offline every call fails with `RemoteUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StatsError::RemoteUnavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn blobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), String>>> {
        self.inner
            .blobs
            .lock()
            .map_err(|_| StatsError::lock_poisoned("memory store"))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl RemoteStore for MemoryStore {
    fn get_blob(&self, container: &str, name: &str) -> Result<Option<String>> {
        self.check_online()?;
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let blobs = self.blobs()?;
        Ok(blobs
            .get(&(container.to_string(), name.to_string()))
            .cloned())
    }

    fn put_blob(&self, container: &str, name: &str, contents: &str) -> Result<()> {
        self.check_online()?;
        self.blobs()?.insert(
            (container.to_string(), name.to_string()),
            contents.to_string(),
        );
        Ok(())
    }

    fn delete_container(&self, container: &str) -> Result<()> {
        self.check_online()?;
        self.blobs()?.retain(|(c, _), _| c != container);
        Ok(())
    }
}

/// Remote store reached over HTTP: `GET|PUT {base}/{container}/{name}`,
/// `DELETE {base}/{container}`
///
/// Uses a blocking client; construct, call and drop it off the async
/// runtime (e.g. inside `spawn_blocking`).
#[cfg(feature = "server")]
pub struct HttpStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "server")]
impl HttpStore {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StatsError::Config(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, container: &str, name: Option<&str>) -> String {
        match name {
            Some(name) => format!("{}/{}/{}", self.base_url, container, name),
            None => format!("{}/{}", self.base_url, container),
        }
    }
}

#[cfg(feature = "server")]
impl RemoteStore for HttpStore {
    fn get_blob(&self, container: &str, name: &str) -> Result<Option<String>> {
        let url = self.url(container, Some(name));
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| unavailable(&format!("GET {}", url), e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| unavailable(&format!("GET {}", url), e))?;
        resp.text()
            .map(Some)
            .map_err(|e| unavailable(&format!("reading body of {}", url), e))
    }

    fn put_blob(&self, container: &str, name: &str, contents: &str) -> Result<()> {
        let url = self.url(container, Some(name));
        self.client
            .put(&url)
            .body(contents.to_string())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(&format!("PUT {}", url), e))?;
        Ok(())
    }

    fn delete_container(&self, container: &str) -> Result<()> {
        let url = self.url(container, None);
        let resp = self
            .client
            .delete(&url)
            .send()
            .map_err(|e| unavailable(&format!("DELETE {}", url), e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status()
            .map_err(|e| unavailable(&format!("DELETE {}", url), e))?;
        Ok(())
    }
}

#[cfg(feature = "server")]
impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}
