// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Environments: opens and owns the distinct logical stores of a
//! repository, plus the dynamically-populated map of unpacked per-commit
//! ref stores.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::digest::CommitDigest;
use crate::error::HangarError;
use crate::error::Result;
use crate::kv::KvStore;
use crate::kv::TransactionRegistry;

const VERSION_KEY: &[u8] = b"software_version";
const README_FILE_NAME: &str = "README.txt";
const README_CONTENTS: &str = "\
This is a Hangar repository.

It contains a version-controlled, content-addressed history of tensor \
datasets and metadata. Do not edit files under this directory by hand.
";

fn current_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Owns every store that makes up one repository: branch, ref, hash, label,
/// stage-ref, stage-hash, and a lazily-populated map of per-commit unpacked
/// ref stores.
pub struct Environments {
    root: PathBuf,
    registry: TransactionRegistry,
    pub branch: KvStore,
    pub refs: KvStore,
    pub hash: KvStore,
    pub label: KvStore,
    pub stage_ref: KvStore,
    pub stage_hash: KvStore,
    unpacked: Mutex<HashMap<CommitDigest, KvStore>>,
}

impl Environments {
    /// Initializes a fresh repository at `root`, or opens an existing one.
    /// Idempotent unless `remove_old` is set, in which case the directory is
    /// wiped first.
    #[tracing::instrument]
    pub fn init_repo(root: &Path, remove_old: bool) -> Result<Self> {
        if remove_old && root.exists() {
            fs::remove_dir_all(root).map_err(|source| HangarError::Path {
                path: root.to_path_buf(),
                source,
            })?;
        }
        fs::create_dir_all(root).map_err(|source| HangarError::Path {
            path: root.to_path_buf(),
            source,
        })?;
        let is_new = !root.join("branch.lmdb").exists();
        let env = Self::open_stores(root)?;

        if is_new {
            let mut txn = env.branch.begin_writer();
            txn.put(VERSION_KEY, current_version().as_bytes());
            txn.commit()?;
            fs::write(root.join(README_FILE_NAME), README_CONTENTS).map_err(|source| {
                HangarError::Path {
                    path: root.join(README_FILE_NAME),
                    source,
                }
            })?;
            for sub in ["store_data", "stage_data", "remote_data"] {
                fs::create_dir_all(env.data_dir().join(sub)).map_err(|source| HangarError::Path {
                    path: env.data_dir().join(sub),
                    source,
                })?;
            }
            tracing::info!(root = %root.display(), "initialized new repository");
        } else {
            env.check_version()?;
            tracing::debug!(root = %root.display(), "opened existing repository");
        }
        Ok(env)
    }

    /// Opens an existing repository, failing if the version is incompatible.
    pub fn open(root: &Path) -> Result<Self> {
        let env = Self::open_stores(root)?;
        env.check_version()?;
        Ok(env)
    }

    fn open_stores(root: &Path) -> Result<Self> {
        let registry = TransactionRegistry::new();
        let branch = KvStore::open(&root.join("branch.lmdb"), registry.clone(), "branch")?;
        let refs = KvStore::open(&root.join("ref.lmdb"), registry.clone(), "ref")?;
        let hash = KvStore::open(&root.join("hash.lmdb"), registry.clone(), "hash")?;
        let label = KvStore::open(&root.join("meta.lmdb"), registry.clone(), "meta")?;
        let stage_ref = KvStore::open(&root.join("stage_ref.lmdb"), registry.clone(), "stage_ref")?;
        let stage_hash = KvStore::open(&root.join("stage_hash.lmdb"), registry.clone(), "stage_hash")?;
        Ok(Self {
            root: root.to_path_buf(),
            registry,
            branch,
            refs,
            hash,
            label,
            stage_ref,
            stage_hash,
            unpacked: Mutex::new(HashMap::new()),
        })
    }

    fn check_version(&self) -> Result<()> {
        let reader = self.branch.begin_reader();
        let Some(found) = reader.get(VERSION_KEY)? else {
            return Ok(());
        };
        let found = String::from_utf8_lossy(&found).into_owned();
        let expected = current_version();
        if found != expected {
            return Err(HangarError::IncompatibleRepo { found, expected });
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn store_data_dir(&self) -> PathBuf {
        self.data_dir().join("store_data")
    }

    pub fn stage_data_dir(&self) -> PathBuf {
        self.data_dir().join("stage_data")
    }

    pub fn remote_data_dir(&self) -> PathBuf {
        self.data_dir().join("remote_data")
    }

    /// Returns the unpacked ref store for `commit`, opening it on first
    /// request.
    pub fn unpacked_store(&self, commit: &CommitDigest) -> Result<KvStore> {
        let mut unpacked = self.unpacked.lock().unwrap();
        if let Some(store) = unpacked.get(commit) {
            return Ok(store.clone());
        }
        let dir = self.data_dir().join("unpacked").join(commit.hex());
        fs::create_dir_all(dir.parent().unwrap()).map_err(|source| HangarError::Path {
            path: dir.clone(),
            source,
        })?;
        let store = KvStore::open(&dir, self.registry.clone(), &format!("unpacked:{commit}"))?;
        unpacked.insert(*commit, store.clone());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let env1 = Environments::init_repo(dir.path(), false).unwrap();
        drop(env1);
        let env2 = Environments::init_repo(dir.path(), false).unwrap();
        let reader = env2.branch.begin_reader();
        assert!(reader.get(VERSION_KEY).unwrap().is_some());
    }

    #[test]
    fn readme_is_written_on_init() {
        let dir = tempfile::tempdir().unwrap();
        let _env = Environments::init_repo(dir.path(), false).unwrap();
        assert!(dir.path().join(README_FILE_NAME).exists());
    }

    #[test]
    fn remove_old_wipes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        let mut txn = env.branch.begin_writer();
        txn.put(b"branch:feature", b"deadbeef");
        txn.commit().unwrap();
        drop(env);

        let env2 = Environments::init_repo(dir.path(), true).unwrap();
        let reader = env2.branch.begin_reader();
        assert_eq!(reader.get(b"branch:feature").unwrap(), None);
    }

    #[test]
    fn incompatible_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let env = Environments::init_repo(dir.path(), false).unwrap();
            let mut txn = env.branch.begin_writer();
            txn.put(VERSION_KEY, b"0.0.0-does-not-exist");
            txn.commit().unwrap();
        }
        let result = Environments::open(dir.path());
        assert!(matches!(result, Err(HangarError::IncompatibleRepo { .. })));
    }

    #[test]
    fn unpacked_store_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        let commit = CommitDigest::of(b"c0");
        let a = env.unpacked_store(&commit).unwrap();
        let mut txn = a.begin_writer();
        txn.put(b"a:ds1:s0", b"deadbeef");
        txn.commit().unwrap();

        let b = env.unpacked_store(&commit).unwrap();
        let reader = b.begin_reader();
        assert_eq!(reader.get(b"a:ds1:s0").unwrap(), Some(b"deadbeef".to_vec()));
    }
}
