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

//! Commit Engine: snapshots the staging area into an immutable
//! commit, writes parent linkage and spec metadata, advances the writer
//! branch head, and migrates pending payloads from stage data into the
//! permanent store.

use crate::backend;
use crate::backend::BackendRegistry;
use crate::codec;
use crate::codec::CommitParents;
use crate::codec::CommitSpec;
use crate::codec::RecordKv;
use crate::compress;
use crate::digest;
use crate::digest::CommitDigest;
use crate::environments::Environments;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::hashstore::HashStore;
use crate::hashstore::MetaStore;
use crate::kv::KvStore;
use crate::staging::StagingArea;

/// Operates over one [`Environments`]' ref/branch stores.
pub struct CommitEngine<'e> {
    env: &'e Environments,
}

impl<'e> CommitEngine<'e> {
    pub fn new(env: &'e Environments) -> Self {
        Self { env }
    }

    /// The commit digest for a given parent linkage and compressed
    /// ref-list/spec bytes: BLAKE2b-160 of their concatenation.
    /// Pure and deterministic — the same inputs always yield the same
    /// digest, which is what lets a re-commit of an unpacked ref list
    /// reproduce its original commit's identity.
    pub fn compute_digest(parents: &CommitParents, compressed_refs: &[u8], compressed_spec: &[u8]) -> CommitDigest {
        let parent_bytes = codec::encode_commit_parents_value(parents);
        CommitDigest::from_bytes(digest::hash_parts([parent_bytes.as_slice(), compressed_refs, compressed_spec]))
    }

    /// Writes a commit's three ref-store records (parent linkage, ref list,
    /// spec) if `digest` is not already present. Returns whether it was
    /// newly written; a `false` return is the idempotent duplicate-commit
    /// no-op used by both local re-commits and sync's `PushCommit`.
    pub fn store_commit_record(
        &self,
        digest: CommitDigest,
        parents: &CommitParents,
        compressed_refs: &[u8],
        compressed_spec: &[u8],
    ) -> Result<bool> {
        let key = codec::encode_commit_key(&digest);
        let mut txn = self.env.refs.begin_writer();
        if txn.get(&key)?.is_some() {
            return Ok(false);
        }
        txn.put(&key, &codec::encode_commit_parents_value(parents));
        txn.put(&codec::encode_commit_ref_key(&digest), compressed_refs);
        txn.put(&codec::encode_commit_spec_key(&digest), compressed_spec);
        txn.commit()?;
        Ok(true)
    }

    /// Full local commit flow: snapshot stage-ref, write the
    /// commit, advance `branch_name`'s head, migrate pending payloads into
    /// the permanent store, and clear the staging area. Returns `None`
    /// without side effects if the resulting digest already exists
    /// (duplicate detection).
    pub fn commit(
        &self,
        staging: &StagingArea<'_>,
        store_backends: &BackendRegistry,
        branch_name: &str,
        parents: CommitParents,
        spec: CommitSpec,
    ) -> Result<Option<CommitDigest>> {
        let records = self.snapshot_stage_ref()?;
        let compressed_refs = compress::compress(&codec::encode_ref_list(&records)?)?;
        let compressed_spec = compress::compress(&codec::encode_commit_spec(&spec)?)?;
        let digest = Self::compute_digest(&parents, &compressed_refs, &compressed_spec);

        if !self.store_commit_record(digest, &parents, &compressed_refs, &compressed_spec)? {
            tracing::debug!(commit = %digest, branch = branch_name, "commit digest already recorded, skipping");
            return Ok(None);
        }

        let mut btxn = self.env.branch.begin_writer();
        btxn.put(&codec::encode_branch_key(branch_name), &codec::encode_commit_digest_value(&digest));
        btxn.commit()?;

        self.migrate_payloads(staging, store_backends)?;
        staging.reset_staging_area()?;
        tracing::info!(commit = %digest, branch = branch_name, "committed");
        Ok(Some(digest))
    }

    fn snapshot_stage_ref(&self) -> Result<Vec<RecordKv>> {
        let reader = self.env.stage_ref.begin_reader();
        reader.all().collect()
    }

    /// Moves tensors, metadata blobs and schema blobs tracked by the staging
    /// area into the permanent hash/label stores. No-ops for anything already present.
    fn migrate_payloads(&self, staging: &StagingArea<'_>, store_backends: &BackendRegistry) -> Result<()> {
        let hash_store = HashStore::new(&self.env.hash, store_backends);
        for (digest, spec) in staging.pending_data_hashes()? {
            if hash_store.contains(&digest)? {
                continue;
            }
            let tag = backend::tag_of_spec(&spec)?;
            let tensor = staging.scratch_backends().get(&tag)?.read_data(&spec)?;
            hash_store.write(digest, &tag, &tensor)?;
        }

        let meta_store = MetaStore::new(&self.env.label);
        for (digest, bytes) in staging.pending_meta_blobs()? {
            meta_store.write(digest, &bytes)?;
        }

        // Every schema declared this session is also content-addressable by
        // its own digest, used by the sync
        // protocol's missing-schema exchange.
        let reader = self.env.stage_ref.begin_reader();
        for entry in reader.range(&codec::schema_key_prefix()) {
            let (_key, value) = entry?;
            let schema = codec::decode_schema_value(&value)?;
            hash_store.write_schema_blob(schema.schema_hash, &value)?;
        }
        Ok(())
    }

    pub fn get_parents(&self, commit: &CommitDigest) -> Result<CommitParents> {
        let reader = self.env.refs.begin_reader();
        let value = reader.get(&codec::encode_commit_key(commit))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Commit,
            id: commit.hex(),
        })?;
        codec::decode_commit_parents_value(&value)
    }

    pub fn get_spec(&self, commit: &CommitDigest) -> Result<CommitSpec> {
        let reader = self.env.refs.begin_reader();
        let compressed = reader.get(&codec::encode_commit_spec_key(commit))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Commit,
            id: commit.hex(),
        })?;
        let bytes = compress::decompress_unknown_size(&compressed)?;
        codec::decode_commit_spec(&bytes)
    }

    pub fn compressed_ref_bytes(&self, commit: &CommitDigest) -> Result<Vec<u8>> {
        let reader = self.env.refs.begin_reader();
        reader.get(&codec::encode_commit_ref_key(commit))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Commit,
            id: commit.hex(),
        })
    }

    pub fn compressed_spec_bytes(&self, commit: &CommitDigest) -> Result<Vec<u8>> {
        let reader = self.env.refs.begin_reader();
        reader.get(&codec::encode_commit_spec_key(commit))?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Commit,
            id: commit.hex(),
        })
    }

    pub fn exists(&self, commit: &CommitDigest) -> Result<bool> {
        let reader = self.env.refs.begin_reader();
        Ok(reader.get(&codec::encode_commit_key(commit))?.is_some())
    }

    /// Every commit digest ever recorded in this repository, regardless of
    /// branch reachability. Distinguishes bare
    /// commit-digest keys from their `:ref`/`:spec` sibling records by length,
    /// since all three share the ref store.
    pub fn list_all_commits(&self) -> Result<Vec<CommitDigest>> {
        let reader = self.env.refs.begin_reader();
        let mut out = Vec::new();
        for entry in reader.all() {
            let (key, _) = entry?;
            if key.len() == digest::DIGEST_LEN * 2 {
                if let Ok(commit) = codec::decode_commit_key(&key) {
                    out.push(commit);
                }
            }
        }
        Ok(out)
    }

    /// Decompresses a commit's ref list and bulk-loads it into that commit's
    /// unpacked store, reproducing the repository state at that commit
    /// without touching any other store.
    pub fn unpack_commit_ref(&self, commit: &CommitDigest) -> Result<KvStore> {
        let compressed = self.compressed_ref_bytes(commit)?;
        let bytes = compress::decompress_unknown_size(&compressed)?;
        let records = codec::decode_ref_list(&bytes)?;

        let store = self.env.unpacked_store(commit)?;
        store.clear()?;
        let mut txn = store.begin_writer();
        for (key, value) in records {
            txn.put(&key, &value);
        }
        txn.commit()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Tensor;
    use crate::schema::DatasetSchema;

    fn open_env() -> (tempfile::TempDir, Environments) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        (dir, env)
    }

    fn sample_spec() -> CommitSpec {
        CommitSpec { time: 1000, message: "m0".into(), user: "alice".into(), email: "a@x".into() }
    }

    #[test]
    fn commit_writes_ref_and_advances_branch() {
        let (dir, env) = open_env();
        let staging = StagingArea::open(&env).unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();

        let store_backends = BackendRegistry::with_localfs(env.store_data_dir());
        let engine = CommitEngine::new(&env);
        let digest = engine
            .commit(&staging, &store_backends, "master", CommitParents::Root, sample_spec())
            .unwrap()
            .expect("first commit is not a duplicate");

        let reader = env.branch.begin_reader();
        let head = reader.get(&codec::encode_branch_key("master")).unwrap().unwrap();
        assert_eq!(codec::decode_commit_digest_value(&head).unwrap(), digest);

        // Staging was cleared.
        assert!(env.stage_ref.begin_reader().is_empty());
        assert!(env.stage_hash.begin_reader().is_empty());

        // Payload moved into the permanent store.
        let hash_store = HashStore::new(&env.hash, &store_backends);
        let data_digest = crate::digest::DataDigest::of(&tensor.bytes);
        assert!(hash_store.contains(&data_digest).unwrap());
        drop(dir);
    }

    #[test]
    fn unpack_commit_ref_reproduces_state() {
        let (_dir, env) = open_env();
        let staging = StagingArea::open(&env).unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();

        let store_backends = BackendRegistry::with_localfs(env.store_data_dir());
        let engine = CommitEngine::new(&env);
        let digest = engine
            .commit(&staging, &store_backends, "master", CommitParents::Root, sample_spec())
            .unwrap()
            .unwrap();

        let unpacked = engine.unpack_commit_ref(&digest).unwrap();
        let reader = unpacked.begin_reader();
        assert!(reader.get(&codec::encode_schema_key("ds1")).unwrap().is_some());
        assert!(reader.get(&codec::encode_sample_key("ds1", "s0")).unwrap().is_some());
    }

    #[test]
    fn duplicate_commit_is_noop() {
        let (_dir, env) = open_env();
        let staging = StagingArea::open(&env).unwrap();
        let store_backends = BackendRegistry::with_localfs(env.store_data_dir());
        let engine = CommitEngine::new(&env);
        let spec = sample_spec();

        let compressed_refs = compress::compress(&codec::encode_ref_list(&[]).unwrap()).unwrap();
        let compressed_spec = compress::compress(&codec::encode_commit_spec(&spec).unwrap()).unwrap();
        let digest = CommitEngine::compute_digest(&CommitParents::Root, &compressed_refs, &compressed_spec);

        assert!(engine.store_commit_record(digest, &CommitParents::Root, &compressed_refs, &compressed_spec).unwrap());
        assert!(!engine.store_commit_record(digest, &CommitParents::Root, &compressed_refs, &compressed_spec).unwrap());

        // An empty-staging commit with identical (parents, spec) reproduces
        // the same digest and is reported as a no-op.
        let result = engine.commit(&staging, &store_backends, "master", CommitParents::Root, spec).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn list_all_commits_ignores_ref_and_spec_siblings() {
        let (_dir, env) = open_env();
        let staging = StagingArea::open(&env).unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();
        let store_backends = BackendRegistry::with_localfs(env.store_data_dir());
        let engine = CommitEngine::new(&env);
        let digest = engine
            .commit(&staging, &store_backends, "master", CommitParents::Root, sample_spec())
            .unwrap()
            .unwrap();

        let all = engine.list_all_commits().unwrap();
        assert_eq!(all, vec![digest]);
    }

    #[test]
    fn compute_digest_is_deterministic() {
        let a = CommitEngine::compute_digest(&CommitParents::Root, b"refs", b"spec");
        let b = CommitEngine::compute_digest(&CommitParents::Root, b"refs", b"spec");
        assert_eq!(a, b);
        let c = CommitEngine::compute_digest(&CommitParents::Root, b"different", b"spec");
        assert_ne!(a, c);
    }
}
