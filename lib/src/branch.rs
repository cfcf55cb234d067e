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

//! Branch & Writer Lock: named branch heads, and the exclusive
//! writer lock with a sentinel "free" value and a forced-release escape
//! hatch.

use std::collections::BTreeMap;

use rand::RngCore as _;

use crate::codec;
use crate::digest::CommitDigest;
use crate::environments::Environments;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::staging::validate_name;

/// Opaque token identifying the current writer-lock holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterToken(String);

impl WriterToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Presented to [`Branches::release_writer_lock`] to force-release an
/// orphaned token without knowing its value.
pub const FORCE_RELEASE: &str = "FORCE_RELEASE";

fn random_token() -> WriterToken {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    WriterToken(crate::hex_util::encode_hex(&bytes))
}

/// Branch heads and the writer lock, both living under the branch store.
pub struct Branches<'e> {
    env: &'e Environments,
}

impl<'e> Branches<'e> {
    pub fn new(env: &'e Environments) -> Self {
        Self { env }
    }

    /// Creates a new branch pointing at `base_commit`. Fails with
    /// `InvalidName` if `name` doesn't match `[A-Za-z0-9._-]+`, or
    /// `BranchExists` if the name is already taken.
    pub fn create_branch(&self, name: &str, base_commit: CommitDigest) -> Result<()> {
        validate_name(name)?;
        let key = codec::encode_branch_key(name);
        let mut txn = self.env.branch.begin_writer();
        if txn.get(&key)?.is_some() {
            return Err(HangarError::AlreadyExists { kind: EntityKind::Branch, id: name.to_string() });
        }
        txn.put(&key, &codec::encode_commit_digest_value(&base_commit));
        txn.commit()
    }

    pub fn set_branch_head(&self, name: &str, commit: CommitDigest) -> Result<()> {
        validate_name(name)?;
        let mut txn = self.env.branch.begin_writer();
        txn.put(&codec::encode_branch_key(name), &codec::encode_commit_digest_value(&commit));
        txn.commit()
    }

    pub fn get_branch_head(&self, name: &str) -> Result<CommitDigest> {
        let reader = self.env.branch.begin_reader();
        let value = reader.get(&codec::encode_branch_key(name))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Branch,
            id: name.to_string(),
        })?;
        codec::decode_commit_digest_value(&value)
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let reader = self.env.branch.begin_reader();
        Ok(reader.get(&codec::encode_branch_key(name))?.is_some())
    }

    pub fn get_branch_names(&self) -> Result<Vec<String>> {
        let reader = self.env.branch.begin_reader();
        let mut names = Vec::new();
        for entry in reader.range(b"branch:") {
            let (key, _) = entry?;
            names.push(codec::decode_branch_key(&key)?);
        }
        Ok(names)
    }

    /// Maps every commit currently at a branch head back to that branch's
    /// name.
    pub fn commit_hash_to_branch_name_map(&self) -> Result<BTreeMap<CommitDigest, String>> {
        let reader = self.env.branch.begin_reader();
        let mut map = BTreeMap::new();
        for entry in reader.range(b"branch:") {
            let (key, value) = entry?;
            let name = codec::decode_branch_key(&key)?;
            let commit = codec::decode_commit_digest_value(&value)?;
            map.insert(commit, name);
        }
        Ok(map)
    }

    /// Acquires the writer lock, returning a fresh opaque token. Fails with
    /// `WriterLockHeld` if another writer already holds it.
    pub fn acquire_writer_lock(&self) -> Result<WriterToken> {
        let key = codec::writer_lock_key();
        let mut txn = self.env.branch.begin_writer();
        let current = txn.get(&key)?;
        let is_free = match &current {
            None => true,
            Some(v) => v.as_slice() == codec::LOCK_AVAILABLE,
        };
        if !is_free {
            return Err(HangarError::WriterLockHeld);
        }
        let token = random_token();
        txn.put(&key, token.as_str().as_bytes());
        txn.commit()?;
        tracing::debug!(token = token.as_str(), "writer lock acquired");
        Ok(token)
    }

    /// Releases the writer lock. Valid only if `token` matches the current
    /// holder, or `token` is [`FORCE_RELEASE`]. Returns whether the
    /// lock was actually released.
    pub fn release_writer_lock(&self, token: &str) -> Result<bool> {
        let key = codec::writer_lock_key();
        let mut txn = self.env.branch.begin_writer();
        let current = txn.get(&key)?;
        let held_by = match &current {
            Some(v) => String::from_utf8_lossy(v).into_owned(),
            None => return Ok(false),
        };
        if held_by.as_bytes() == codec::LOCK_AVAILABLE {
            return Ok(false);
        }
        if token != FORCE_RELEASE && token != held_by {
            return Ok(false);
        }
        txn.put(&key, codec::LOCK_AVAILABLE);
        txn.commit()?;
        if token == FORCE_RELEASE {
            tracing::warn!("writer lock force-released");
        }
        Ok(true)
    }

    /// Unconditionally releases the writer lock, for recovery of an
    /// orphaned token.
    pub fn force_release_writer_lock(&self) -> Result<bool> {
        self.release_writer_lock(FORCE_RELEASE)
    }

    pub fn writer_lock_is_held(&self) -> Result<bool> {
        let reader = self.env.branch.begin_reader();
        match reader.get(&codec::writer_lock_key())? {
            None => Ok(false),
            Some(v) => Ok(v.as_slice() != codec::LOCK_AVAILABLE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_env() -> (tempfile::TempDir, Environments) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        (dir, env)
    }

    #[test]
    fn create_then_get_branch() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let commit = CommitDigest::of(b"c0");
        branches.create_branch("master", commit).unwrap();
        assert_eq!(branches.get_branch_head("master").unwrap(), commit);
    }

    #[test]
    fn create_branch_twice_fails() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let commit = CommitDigest::of(b"c0");
        branches.create_branch("master", commit).unwrap();
        let result = branches.create_branch("master", commit);
        assert!(matches!(result, Err(HangarError::AlreadyExists { .. })));
    }

    #[test]
    fn invalid_branch_name_rejected() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let result = branches.create_branch("has space", CommitDigest::of(b"c0"));
        assert!(matches!(result, Err(HangarError::InvalidName { .. })));
    }

    #[test]
    fn get_missing_branch_not_found() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        assert!(matches!(branches.get_branch_head("nope"), Err(HangarError::NotFound { .. })));
    }

    #[test]
    fn branch_names_are_listed() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        branches.create_branch("master", CommitDigest::of(b"c0")).unwrap();
        branches.create_branch("dev", CommitDigest::of(b"c1")).unwrap();
        let mut names = branches.get_branch_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["dev".to_string(), "master".to_string()]);
    }

    #[test]
    fn writer_lock_exclusion() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let token = branches.acquire_writer_lock().unwrap();
        assert!(matches!(branches.acquire_writer_lock(), Err(HangarError::WriterLockHeld)));
        assert!(branches.release_writer_lock(token.as_str()).unwrap());
        // After release, a new writer can acquire.
        let _token2 = branches.acquire_writer_lock().unwrap();
    }

    #[test]
    fn release_with_wrong_token_is_noop() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let _token = branches.acquire_writer_lock().unwrap();
        assert!(!branches.release_writer_lock("not-the-token").unwrap());
        assert!(branches.writer_lock_is_held().unwrap());
    }

    #[test]
    fn force_release_then_acquire_succeeds() {
        let (_dir, env) = open_env();
        let branches = Branches::new(&env);
        let _token = branches.acquire_writer_lock().unwrap();
        assert!(branches.force_release_writer_lock().unwrap());
        assert!(branches.acquire_writer_lock().is_ok());
    }
}
