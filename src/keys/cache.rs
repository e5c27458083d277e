//! On-disk key cache
//!
//! Layout: `<root>/<key_id>/{galKey, galSingleStepKey, relinKey}`, each file
//! holding the base64 text of one component. An entry is either complete or
//! absent. Writes land in a sibling staging directory that is renamed into
//! place, so readers never see a half-written entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::warn;

use super::material::KeyBlobs;
use crate::error::{Result, StatsError};

pub const GALOIS_FILE: &str = "galKey";
pub const GALOIS_SINGLE_STEP_FILE: &str = "galSingleStepKey";
pub const RELIN_FILE: &str = "relinKey";

const COMPONENT_FILES: [&str; 3] = [GALOIS_FILE, GALOIS_SINGLE_STEP_FILE, RELIN_FILE];

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(KeyBlobs),
    Miss,
}

#[derive(Debug, Clone)]
pub struct KeyCache {
    root: PathBuf,
}

impl KeyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key_id: &str) -> PathBuf {
        self.root.join(key_id)
    }

    /// Look up an entry
    ///
    /// A partial entry is removed and reported as a miss. A complete entry
    /// that cannot be read fails with `CacheCorrupt`.
    pub fn read(&self, key_id: &str) -> Result<CacheLookup> {
        let dir = self.entry_dir(key_id);
        if !dir.is_dir() {
            return Ok(CacheLookup::Miss);
        }

        let complete = COMPONENT_FILES.iter().all(|name| dir.join(name).is_file());
        if !complete {
            warn!(key_id, "Removing partial key cache entry");
            self.remove(key_id)?;
            return Ok(CacheLookup::Miss);
        }

        let read = |name: &str| {
            fs::read_to_string(dir.join(name)).map_err(|source| StatsError::CacheCorrupt {
                key_id: key_id.to_string(),
                source,
            })
        };

        Ok(CacheLookup::Hit(KeyBlobs {
            galois: read(GALOIS_FILE)?,
            galois_single_step: read(GALOIS_SINGLE_STEP_FILE)?,
            relin: read(RELIN_FILE)?,
        }))
    }

    /// Write a complete entry, replacing any existing one
    ///
    /// Either all three components land or the previous state is kept; the
    /// staging directory is removed on failure.
    pub fn store(&self, key_id: &str, blobs: &KeyBlobs) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        let suffix: u64 = rand::thread_rng().gen();
        let staging = self.root.join(format!(".{}.staging-{:016x}", key_id, suffix));

        let result = self.write_staged(&staging, key_id, blobs);
        if result.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        result
    }

    fn write_staged(&self, staging: &Path, key_id: &str, blobs: &KeyBlobs) -> io::Result<()> {
        fs::create_dir(staging)?;
        fs::write(staging.join(GALOIS_FILE), &blobs.galois)?;
        fs::write(staging.join(GALOIS_SINGLE_STEP_FILE), &blobs.galois_single_step)?;
        fs::write(staging.join(RELIN_FILE), &blobs.relin)?;

        let target = self.entry_dir(key_id);
        match fs::remove_dir_all(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::rename(staging, &target)
    }

    /// Remove an entry; absent entries are fine
    pub fn remove(&self, key_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.entry_dir(key_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StatsError::CacheCorrupt {
                key_id: key_id.to_string(),
                source,
            }),
        }
    }
}
