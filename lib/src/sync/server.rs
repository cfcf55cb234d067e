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

//! Sync Protocol, server side: the RPC handlers themselves, expressed as
//! plain methods over a borrowed [`Environments`] rather than a gRPC
//! servicer.

use std::collections::BTreeSet;

use crate::backend::BackendRegistry;
use crate::branch::Branches;
use crate::codec;
use crate::commit::CommitEngine;
use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::environments::Environments;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::hashstore::HashStore;
use crate::hashstore::MetaStore;
use crate::history::History;
use crate::query::RecordQuery;
use crate::schema::DatasetSchema;
use crate::sync::messages::ClientConfig;
use crate::sync::messages::CommitPayload;
use crate::sync::messages::DataBatch;
use crate::sync::messages::DataItem;

/// Serves every sync RPC against one repository's stores. Carries no
/// connection state of its own — a [`crate::sync::transport::Transport`]
/// impl is what turns these methods into something a client can call
/// in-process or over a socket.
pub struct SyncServer<'e> {
    env: &'e Environments,
    backends: &'e BackendRegistry,
}

impl<'e> SyncServer<'e> {
    pub fn new(env: &'e Environments, backends: &'e BackendRegistry) -> Self {
        Self { env, backends }
    }

    fn hash_store(&self) -> HashStore<'e> {
        HashStore::new(&self.env.hash, self.backends)
    }

    fn meta_store(&self) -> MetaStore<'e> {
        MetaStore::new(&self.env.label)
    }

    fn engine(&self) -> CommitEngine<'e> {
        CommitEngine::new(self.env)
    }

    fn branches(&self) -> Branches<'e> {
        Branches::new(self.env)
    }

    pub fn get_client_config(&self) -> ClientConfig {
        ClientConfig::default()
    }

    // -------------------- Branch Record --------------------------------

    pub fn fetch_branch_record(&self, branch_name: &str) -> Result<CommitDigest> {
        self.branches().get_branch_head(branch_name)
    }

    /// Creates `branch_name` if absent, else advances its head. A push that
    /// would be a no-op (head already equals `commit`) is rejected with
    /// `AlreadyExists`.
    pub fn push_branch_record(&self, branch_name: &str, commit: CommitDigest) -> Result<()> {
        let branches = self.branches();
        if !branches.branch_exists(branch_name)? {
            return branches.create_branch(branch_name, commit);
        }
        let current_head = branches.get_branch_head(branch_name)?;
        if current_head == commit {
            return Err(HangarError::AlreadyExists {
                kind: EntityKind::Branch,
                id: format!("{branch_name}@{commit}"),
            });
        }
        branches.set_branch_head(branch_name, commit)
    }

    // -------------------------- Commit Record ---------------------------

    pub fn fetch_commit(&self, commit: CommitDigest) -> Result<CommitPayload> {
        let engine = self.engine();
        let parents = engine.get_parents(&commit)?;
        Ok(CommitPayload {
            parent_bytes: codec::encode_commit_parents_value(&parents),
            compressed_spec: engine.compressed_spec_bytes(&commit)?,
            compressed_refs: engine.compressed_ref_bytes(&commit)?,
        })
    }

    /// Writes a commit pushed by a client. A duplicate digest is a no-op
    /// returning `Ok(false)` here, matching `CommitEngine`'s own idempotent
    /// `store_commit_record`, so a repeated push leaves the server in the
    /// same state as a single push (see DESIGN.md).
    pub fn push_commit(&self, commit: CommitDigest, payload: CommitPayload) -> Result<bool> {
        let parents = codec::decode_commit_parents_value(&payload.parent_bytes)?;
        let written = self.engine().store_commit_record(
            commit,
            &parents,
            &payload.compressed_refs,
            &payload.compressed_spec,
        )?;
        tracing::info!(commit = %commit, written, "received push_commit");
        Ok(written)
    }

    // --------------------- Schema Record ---------------------------------

    pub fn fetch_schema(&self, digest: SchemaDigest) -> Result<Vec<u8>> {
        self.hash_store().read_schema_blob(&digest)
    }

    /// Validates that `blob` really decodes to a schema whose own
    /// `schema_hash` matches `digest` before writing it.
    pub fn push_schema(&self, digest: SchemaDigest, blob: Vec<u8>) -> Result<()> {
        let schema: DatasetSchema = codec::decode_schema_value(&blob)?;
        if schema.schema_hash != digest {
            return Err(HangarError::DigestMismatch {
                expected: digest.hex(),
                actual: schema.schema_hash.hex(),
            });
        }
        self.hash_store().write_schema_blob(digest, &blob)
    }

    // ---------------------------- Data ------------------------------------

    /// Reads tensors for `digests` until the cumulative size of their raw
    /// bytes reaches `max_nbytes`, then stops and reports `truncated`. The caller re-requests with whatever digests
    /// didn't make it into `items`.
    pub fn fetch_data(&self, digests: &[DataDigest], max_nbytes: u64) -> Result<DataBatch> {
        let hash_store = self.hash_store();
        let mut items = Vec::new();
        let mut total: u64 = 0;
        for (idx, digest) in digests.iter().enumerate() {
            let tensor = hash_store.read(digest)?;
            total += tensor.bytes.len() as u64;
            items.push(DataItem { digest: *digest, tensor });
            if total >= max_nbytes {
                return Ok(DataBatch { items, truncated: idx + 1 < digests.len() });
            }
        }
        Ok(DataBatch { items, truncated: false })
    }

    /// Verifies every tensor's digest before writing any of them, so a
    /// mangled stream leaves nothing behind.
    pub fn push_data(&self, schema_hash: SchemaDigest, items: Vec<(DataDigest, crate::backend::Tensor)>) -> Result<()> {
        let hash_store = self.hash_store();
        let blob = hash_store.read_schema_blob(&schema_hash)?;
        let schema: DatasetSchema = codec::decode_schema_value(&blob)?;
        for (digest, tensor) in items {
            hash_store.verify_and_write(digest, &schema.schema_default_backend, &tensor)?;
        }
        Ok(())
    }

    // ----------------------------- Label Data ------------------------------

    pub fn fetch_label(&self, digest: MetaDigest) -> Result<Vec<u8>> {
        self.meta_store().read(&digest)
    }

    pub fn push_label(&self, digest: MetaDigest, bytes: Vec<u8>) -> Result<()> {
        self.meta_store().verify_and_write(digest, &bytes)
    }

    // ------------------------ Find Missing ---------------------------------

    pub fn find_missing_commits_for_fetch(
        &self,
        branch_name: &str,
        client_commits: &BTreeSet<CommitDigest>,
    ) -> Result<(CommitDigest, Vec<CommitDigest>)> {
        let view = History::new(self.env).list_history_for_branch(branch_name)?;
        let server_set: BTreeSet<CommitDigest> = view.order.iter().copied().collect();
        let missing: Vec<CommitDigest> = server_set.difference(client_commits).copied().collect();
        Ok((view.head, missing))
    }

    pub fn find_missing_commits_for_push(&self, client_commits: &BTreeSet<CommitDigest>) -> Result<Vec<CommitDigest>> {
        let server_set: BTreeSet<CommitDigest> = self.engine().list_all_commits()?.into_iter().collect();
        Ok(client_commits.difference(&server_set).copied().collect())
    }

    pub fn find_missing_schemas_for_fetch(
        &self,
        commit: CommitDigest,
        client_schemas: &BTreeSet<SchemaDigest>,
    ) -> Result<Vec<SchemaDigest>> {
        let unpacked = self.engine().unpack_commit_ref(&commit)?;
        let server_schemas = RecordQuery::new(&unpacked).schema_hashes()?;
        Ok(server_schemas.difference(client_schemas).copied().collect())
    }

    pub fn find_missing_schemas_for_push(&self, client_schemas: &BTreeSet<SchemaDigest>) -> Result<Vec<SchemaDigest>> {
        let server_schemas = self.hash_store().list_all_schema_digests()?;
        Ok(client_schemas.difference(&server_schemas).copied().collect())
    }

    pub fn find_missing_hash_records_for_fetch(
        &self,
        commit: CommitDigest,
        client_hashes: &BTreeSet<DataDigest>,
    ) -> Result<Vec<(DataDigest, SchemaDigest)>> {
        let unpacked = self.engine().unpack_commit_ref(&commit)?;
        let server_map = RecordQuery::new(&unpacked).data_hash_to_schema_hash()?;
        Ok(server_map
            .into_iter()
            .filter(|(digest, _)| !client_hashes.contains(digest))
            .collect())
    }

    pub fn find_missing_hash_records_for_push(&self, client_hashes: &BTreeSet<DataDigest>) -> Result<Vec<DataDigest>> {
        let server_hashes = self.hash_store().list_all_data_digests()?;
        Ok(client_hashes.difference(&server_hashes).copied().collect())
    }

    pub fn find_missing_labels_for_fetch(
        &self,
        commit: CommitDigest,
        client_labels: &BTreeSet<MetaDigest>,
    ) -> Result<Vec<MetaDigest>> {
        let unpacked = self.engine().unpack_commit_ref(&commit)?;
        let server_labels = RecordQuery::new(&unpacked).metadata_hashes()?;
        Ok(server_labels.difference(client_labels).copied().collect())
    }

    pub fn find_missing_labels_for_push(&self, client_labels: &BTreeSet<MetaDigest>) -> Result<Vec<MetaDigest>> {
        let server_labels = self.meta_store().list_all_meta_digests()?;
        Ok(client_labels.difference(&server_labels).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Tensor;
    use crate::codec::CommitParents;
    use crate::codec::CommitSpec;
    use crate::staging::StagingArea;

    fn open_env() -> (tempfile::TempDir, Environments) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        (dir, env)
    }

    fn commit_one(env: &Environments, backends: &BackendRegistry) -> CommitDigest {
        let staging = StagingArea::open(env).unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();
        let spec = CommitSpec { time: 1, message: "m".into(), user: "a".into(), email: "a@x".into() };
        CommitEngine::new(env)
            .commit(&staging, backends, "master", CommitParents::Root, spec)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn fetch_branch_record_roundtrip() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let commit = commit_one(&env, &backends);
        let server = SyncServer::new(&env, &backends);
        assert_eq!(server.fetch_branch_record("master").unwrap(), commit);
    }

    #[test]
    fn push_branch_record_rejects_noop_push() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let commit = commit_one(&env, &backends);
        let server = SyncServer::new(&env, &backends);
        let result = server.push_branch_record("master", commit);
        assert!(matches!(result, Err(HangarError::AlreadyExists { .. })));
    }

    #[test]
    fn push_commit_is_idempotent() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let commit = commit_one(&env, &backends);
        let server = SyncServer::new(&env, &backends);
        let payload = server.fetch_commit(commit).unwrap();
        assert!(!server.push_commit(commit, payload).unwrap());
    }

    #[test]
    fn fetch_data_truncates_under_budget() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let hash_store = HashStore::new(&env.hash, &backends);
        let t0 = Tensor { dtype: 5, shape: vec![4], bytes: vec![1; 100] };
        let t1 = Tensor { dtype: 5, shape: vec![4], bytes: vec![2; 100] };
        let d0 = DataDigest::of(&t0.bytes);
        let d1 = DataDigest::of(&t1.bytes);
        hash_store.write(d0, "00", &t0).unwrap();
        hash_store.write(d1, "00", &t1).unwrap();

        let server = SyncServer::new(&env, &backends);
        let batch = server.fetch_data(&[d0, d1], 100).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert!(batch.truncated);

        let rest = server.fetch_data(&[d1], 100).unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.truncated);
    }

    #[test]
    fn find_missing_commits_for_fetch_reports_server_only_commits() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let commit = commit_one(&env, &backends);
        let server = SyncServer::new(&env, &backends);
        let (head, missing) = server.find_missing_commits_for_fetch("master", &BTreeSet::new()).unwrap();
        assert_eq!(head, commit);
        assert_eq!(missing, vec![commit]);
    }

    #[test]
    fn find_missing_hash_records_for_fetch_reports_unknown_digests() {
        let (_dir, env) = open_env();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let commit = commit_one(&env, &backends);
        let server = SyncServer::new(&env, &backends);
        let missing = server.find_missing_hash_records_for_fetch(commit, &BTreeSet::new()).unwrap();
        assert_eq!(missing.len(), 1);
    }
}
