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

//! Sync Protocol, client side: drives clone/fetch/push over any
//! [`Transport`] impl. One `SyncClient` is scoped to a single local
//! repository and a single remote connection.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::backend::BackendRegistry;
use crate::backend::Tensor;
use crate::branch::Branches;
use crate::codec;
use crate::commit::CommitEngine;
use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::environments::Environments;
use crate::error::Result;
use crate::hashstore::HashStore;
use crate::hashstore::MetaStore;
use crate::query::RecordQuery;
use crate::sync::messages::ClientConfig;
use crate::sync::transport::Transport;

/// Orchestrates the sync RPCs in [`Transport`] against one local repository.
/// Generic over the transport so the exact same replay/chunking logic
/// drives an in-process clone in tests and a real socket-backed
/// clone/fetch/push alike.
pub struct SyncClient<'e, T> {
    env: &'e Environments,
    backends: &'e BackendRegistry,
    transport: T,
}

impl<'e, T: Transport> SyncClient<'e, T> {
    pub fn new(env: &'e Environments, backends: &'e BackendRegistry, transport: T) -> Self {
        Self { env, backends, transport }
    }

    fn engine(&self) -> CommitEngine<'e> {
        CommitEngine::new(self.env)
    }

    fn branches(&self) -> Branches<'e> {
        Branches::new(self.env)
    }

    fn hash_store(&self) -> HashStore<'e> {
        HashStore::new(&self.env.hash, self.backends)
    }

    fn meta_store(&self) -> MetaStore<'e> {
        MetaStore::new(&self.env.label)
    }

    fn client_config(&self) -> Result<ClientConfig> {
        self.transport.get_client_config()
    }

    /// Clones `branch_name` into a freshly-initialized, empty repository;
    /// equivalent to [`Self::fetch_branch`] with no prior local state, but
    /// skips the "nothing to do" short circuit since the branch cannot
    /// already exist locally.
    pub fn clone_branch(&self, branch_name: &str) -> Result<CommitDigest> {
        self.fetch_branch(branch_name)
    }

    /// Brings the local `branch_name` up to date with the remote, fetching
    /// every commit (and the schema/data/label payloads it references) the
    /// remote has that the client doesn't, then advancing (or creating) the
    /// local branch head.
    #[tracing::instrument(skip(self))]
    pub fn fetch_branch(&self, branch_name: &str) -> Result<CommitDigest> {
        let config = self.client_config()?;
        let branches = self.branches();

        let client_commits: BTreeSet<CommitDigest> = if branches.branch_exists(branch_name)? {
            let head = branches.get_branch_head(branch_name)?;
            BTreeSet::from_iter(crate::history::History::new(self.env).list_history(head)?.order)
        } else {
            BTreeSet::new()
        };

        let (server_head, missing) = self.transport.find_missing_commits_for_fetch(branch_name, &client_commits)?;
        if missing.is_empty() {
            tracing::debug!(branch = branch_name, "already up to date");
            if branches.branch_exists(branch_name)? {
                return Ok(branches.get_branch_head(branch_name)?);
            }
            branches.create_branch(branch_name, server_head)?;
            return Ok(server_head);
        }

        tracing::info!(branch = branch_name, count = missing.len(), "fetching commits");
        for commit in self.replay_order(missing)? {
            self.fetch_one_commit(commit, &config)?;
        }

        if branches.branch_exists(branch_name)? {
            branches.set_branch_head(branch_name, server_head)?;
        } else {
            branches.create_branch(branch_name, server_head)?;
        }
        Ok(server_head)
    }

    /// Orders a set of commits missing from the client so that every
    /// commit's parents are downloaded (and replayed) before it, by fetching
    /// each one's parent linkage up front and running the same
    /// Kahn's-algorithm style topological sort [`crate::history::History`]
    /// uses for local ancestor traversal.
    fn replay_order(&self, missing: Vec<CommitDigest>) -> Result<Vec<CommitDigest>> {
        let missing_set: BTreeSet<CommitDigest> = missing.iter().copied().collect();
        let mut parents_of: BTreeMap<CommitDigest, Vec<CommitDigest>> = BTreeMap::new();
        for commit in &missing {
            let payload = self.transport.fetch_commit(*commit)?;
            let parents = codec::decode_commit_parents_value(&payload.parent_bytes)?;
            let parents: Vec<CommitDigest> = match parents {
                codec::CommitParents::Root => Vec::new(),
                codec::CommitParents::Single(p) => vec![p],
                codec::CommitParents::Merge(a, b) => vec![a, b],
            };
            parents_of.insert(*commit, parents);
        }

        let mut ready: Vec<CommitDigest> = Vec::new();
        let mut pending_parent_count: BTreeMap<CommitDigest, usize> = BTreeMap::new();
        for (commit, parents) in &parents_of {
            let remaining = parents.iter().filter(|p| missing_set.contains(p)).count();
            if remaining == 0 {
                ready.push(*commit);
            } else {
                pending_parent_count.insert(*commit, remaining);
            }
        }
        ready.sort_by_key(CommitDigest::hex);

        let mut order = Vec::with_capacity(missing.len());
        let mut ready: BTreeSet<String> = ready.iter().map(CommitDigest::hex).collect();
        let by_hex: BTreeMap<String, CommitDigest> = missing.iter().map(|c| (c.hex(), *c)).collect();
        let mut children_of: BTreeMap<CommitDigest, Vec<CommitDigest>> = BTreeMap::new();
        for (commit, parents) in &parents_of {
            for parent in parents {
                if missing_set.contains(parent) {
                    children_of.entry(*parent).or_default().push(*commit);
                }
            }
        }

        while let Some(next_hex) = ready.iter().next().cloned() {
            ready.remove(&next_hex);
            let next = by_hex[&next_hex];
            order.push(next);
            for child in children_of.get(&next).cloned().unwrap_or_default() {
                let count = pending_parent_count.get_mut(&child).expect("child tracked by parent count");
                *count -= 1;
                if *count == 0 {
                    ready.insert(child.hex());
                }
            }
        }
        Ok(order)
    }

    /// Writes one already-fetched commit locally and pulls every
    /// schema/data/label payload it references that the client doesn't
    /// already hold.
    fn fetch_one_commit(&self, commit: CommitDigest, config: &ClientConfig) -> Result<()> {
        let payload = self.transport.fetch_commit(commit)?;
        let parents = codec::decode_commit_parents_value(&payload.parent_bytes)?;
        self.engine()
            .store_commit_record(commit, &parents, &payload.compressed_refs, &payload.compressed_spec)?;
        // Unpacking materializes the commit's ref list into a per-commit
        // store; not queried directly here, but needed so later checkouts
        // of this commit don't have to decompress the ref list again.
        self.engine().unpack_commit_ref(&commit)?;
        let hash_store = self.hash_store();
        let meta_store = self.meta_store();

        let local_schemas = hash_store.list_all_schema_digests()?;
        let missing_schemas = self.transport.find_missing_schemas_for_fetch(commit, &local_schemas)?;
        for digest in missing_schemas {
            let blob = self.transport.fetch_schema(digest)?;
            hash_store.write_schema_blob(digest, &blob)?;
        }

        let local_hashes = hash_store.list_all_data_digests()?;
        let missing_hash_records = self.transport.find_missing_hash_records_for_fetch(commit, &local_hashes)?;
        let schema_by_digest: BTreeMap<DataDigest, SchemaDigest> = missing_hash_records.into_iter().collect();
        let mut remaining: BTreeSet<DataDigest> = schema_by_digest.keys().copied().collect();
        while !remaining.is_empty() {
            let batch_digests: Vec<DataDigest> = remaining.iter().copied().collect();
            let batch = self.transport.fetch_data(&batch_digests, config.fetch_max_nbytes)?;
            if batch.items.is_empty() && !batch.truncated {
                break;
            }
            for item in &batch.items {
                remaining.remove(&item.digest);
            }
            self.write_fetched_data(&hash_store, &schema_by_digest, batch.items)?;
            if !batch.truncated {
                break;
            }
        }

        let local_labels: BTreeSet<MetaDigest> = meta_store.list_all_meta_digests()?;
        let missing_labels = self.transport.find_missing_labels_for_fetch(commit, &local_labels)?;
        for digest in missing_labels {
            let bytes = self.transport.fetch_label(digest)?;
            meta_store.verify_and_write(digest, &bytes)?;
        }

        Ok(())
    }

    fn write_fetched_data(
        &self,
        hash_store: &HashStore<'e>,
        schema_by_digest: &BTreeMap<DataDigest, SchemaDigest>,
        items: Vec<crate::sync::messages::DataItem>,
    ) -> Result<()> {
        for item in items {
            let schema_digest = schema_by_digest
                .get(&item.digest)
                .copied()
                .ok_or_else(|| crate::error::HangarError::MalformedRecord {
                    reason: format!("server returned unrequested data digest {}", item.digest.hex()),
                })?;
            let blob = hash_store.read_schema_blob(&schema_digest)?;
            let schema = codec::decode_schema_value(&blob)?;
            hash_store.verify_and_write(item.digest, &schema.schema_default_backend, &item.tensor)?;
        }
        Ok(())
    }

    /// Pushes every commit on the local `branch_name` the remote doesn't
    /// already have, along with the schema/data/label payloads each one
    /// references, then advances (or creates) the remote branch head.
    /// A remote head already equal to the local head is a no-op.
    #[tracing::instrument(skip(self))]
    pub fn push_branch(&self, branch_name: &str) -> Result<()> {
        let config = self.client_config()?;
        let local_head = self.branches().get_branch_head(branch_name)?;
        let view = crate::history::History::new(self.env).list_history(local_head)?;
        let local_commits: BTreeSet<CommitDigest> = view.order.iter().copied().collect();

        let missing = self.transport.find_missing_commits_for_push(&local_commits)?;
        let missing_set: BTreeSet<CommitDigest> = missing.into_iter().collect();
        tracing::info!(branch = branch_name, count = missing_set.len(), "pushing commits");

        // `view.order` is newest-first; push oldest-first so every parent
        // lands on the remote before its child.
        for commit in view.order.iter().rev().filter(|c| missing_set.contains(c)) {
            self.push_one_commit(*commit, &config)?;
        }

        match self.transport.fetch_branch_record(branch_name) {
            Ok(remote_head) if remote_head == local_head => {}
            _ => self.transport.push_branch_record(branch_name, local_head)?,
        }
        Ok(())
    }

    fn push_one_commit(&self, commit: CommitDigest, config: &ClientConfig) -> Result<()> {
        let unpacked = self.engine().unpack_commit_ref(&commit)?;
        let query = RecordQuery::new(&unpacked);
        let hash_store = self.hash_store();
        let meta_store = self.meta_store();

        let local_schemas = query.schema_hashes()?;
        let missing_schemas = self.transport.find_missing_schemas_for_push(&local_schemas)?;
        for digest in missing_schemas {
            let blob = hash_store.read_schema_blob(&digest)?;
            self.transport.push_schema(digest, blob)?;
        }

        let data_map = query.data_hash_to_schema_hash()?;
        let local_hashes: BTreeSet<DataDigest> = data_map.keys().copied().collect();
        let missing_hashes = self.transport.find_missing_hash_records_for_push(&local_hashes)?;
        self.push_data_batched(&hash_store, &data_map, missing_hashes, config.push_max_nbytes)?;

        let local_labels = query.metadata_hashes()?;
        let missing_labels = self.transport.find_missing_labels_for_push(&local_labels)?;
        for digest in missing_labels {
            let bytes = meta_store.read(&digest)?;
            self.transport.push_label(digest, bytes)?;
        }

        let parents = self.engine().get_parents(&commit)?;
        let payload = crate::sync::messages::CommitPayload {
            parent_bytes: codec::encode_commit_parents_value(&parents),
            compressed_spec: self.engine().compressed_spec_bytes(&commit)?,
            compressed_refs: self.engine().compressed_ref_bytes(&commit)?,
        };
        self.transport.push_commit(commit, payload)?;
        Ok(())
    }

    /// Groups missing digests by the schema they belong to (`push_data` is
    /// scoped to one schema at a time) and chunks each group so no single
    /// `push_data` call exceeds `push_max_nbytes` worth of tensor bytes.
    fn push_data_batched(
        &self,
        hash_store: &HashStore<'e>,
        data_map: &BTreeMap<DataDigest, SchemaDigest>,
        missing: Vec<DataDigest>,
        push_max_nbytes: u64,
    ) -> Result<()> {
        let mut by_schema: BTreeMap<SchemaDigest, Vec<(DataDigest, Tensor)>> = BTreeMap::new();
        for digest in missing {
            let schema_digest = *data_map
                .get(&digest)
                .expect("every digest in `missing` came from this commit's own data_hash_to_schema_hash map");
            let tensor = hash_store.read(&digest)?;
            by_schema.entry(schema_digest).or_default().push((digest, tensor));
        }

        for (schema_digest, items) in by_schema {
            let mut batch = Vec::new();
            let mut batch_bytes: u64 = 0;
            for (digest, tensor) in items {
                let tensor_bytes = tensor.bytes.len() as u64;
                if !batch.is_empty() && batch_bytes + tensor_bytes > push_max_nbytes {
                    self.transport.push_data(schema_digest, std::mem::take(&mut batch))?;
                    batch_bytes = 0;
                }
                batch_bytes += tensor_bytes;
                batch.push((digest, tensor));
            }
            if !batch.is_empty() {
                self.transport.push_data(schema_digest, batch)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::codec::CommitParents;
    use crate::codec::CommitSpec;
    use crate::schema::DatasetSchema;
    use crate::staging::StagingArea;
    use crate::sync::server::SyncServer;
    use crate::sync::transport::InProcessTransport;

    fn open_env() -> (tempfile::TempDir, Environments) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        (dir, env)
    }

    fn commit_one(env: &Environments, backends: &BackendRegistry, branch: &str, parents: CommitParents, sample: &str) -> CommitDigest {
        let staging = StagingArea::open(env).unwrap();
        if staging.get_schema("ds1").unwrap().is_none() {
            staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        }
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: sample.as_bytes().iter().cycle().take(4).copied().collect() };
        staging.put_sample("ds1", Some(sample), &tensor).unwrap();
        staging.put_metadata(sample, sample.as_bytes()).unwrap();
        let spec = CommitSpec { time: 1, message: "m".into(), user: "a".into(), email: "a@x".into() };
        CommitEngine::new(env).commit(&staging, backends, branch, parents, spec).unwrap().unwrap()
    }

    #[test]
    fn clone_replays_full_history_in_order() {
        let (_server_dir, server_env) = open_env();
        let server_backends = BackendRegistry::with_localfs(server_env.store_data_dir());
        let c0 = commit_one(&server_env, &server_backends, "master", CommitParents::Root, "s0");
        let c1 = commit_one(&server_env, &server_backends, "master", CommitParents::Single(c0), "s1");

        let (_client_dir, client_env) = open_env();
        let client_backends = BackendRegistry::with_localfs(client_env.store_data_dir());
        let transport = InProcessTransport::new(SyncServer::new(&server_env, &server_backends));
        let client = SyncClient::new(&client_env, &client_backends, transport);

        let head = client.clone_branch("master").unwrap();
        assert_eq!(head, c1);
        assert_eq!(Branches::new(&client_env).get_branch_head("master").unwrap(), c1);

        let engine = CommitEngine::new(&client_env);
        assert!(engine.exists(&c0).unwrap());
        assert!(engine.exists(&c1).unwrap());

        let hash_store = HashStore::new(&client_env.hash, &client_backends);
        assert!(!hash_store.list_all_data_digests().unwrap().is_empty());
        let meta_store = MetaStore::new(&client_env.label);
        assert_eq!(meta_store.list_all_meta_digests().unwrap().len(), 2);
    }

    #[test]
    fn fetch_is_noop_when_up_to_date() {
        let (_server_dir, server_env) = open_env();
        let server_backends = BackendRegistry::with_localfs(server_env.store_data_dir());
        commit_one(&server_env, &server_backends, "master", CommitParents::Root, "s0");

        let (_client_dir, client_env) = open_env();
        let client_backends = BackendRegistry::with_localfs(client_env.store_data_dir());
        let transport = InProcessTransport::new(SyncServer::new(&server_env, &server_backends));
        let client = SyncClient::new(&client_env, &client_backends, transport);
        let head = client.clone_branch("master").unwrap();

        let transport2 = InProcessTransport::new(SyncServer::new(&server_env, &server_backends));
        let client2 = SyncClient::new(&client_env, &client_backends, transport2);
        assert_eq!(client2.fetch_branch("master").unwrap(), head);
    }

    #[test]
    fn push_roundtrips_into_empty_remote() {
        let (_client_dir, client_env) = open_env();
        let client_backends = BackendRegistry::with_localfs(client_env.store_data_dir());
        let c0 = commit_one(&client_env, &client_backends, "master", CommitParents::Root, "s0");

        let (_server_dir, server_env) = open_env();
        let server_backends = BackendRegistry::with_localfs(server_env.store_data_dir());
        let transport = InProcessTransport::new(SyncServer::new(&server_env, &server_backends));
        let client = SyncClient::new(&client_env, &client_backends, transport);
        client.push_branch("master").unwrap();

        assert_eq!(Branches::new(&server_env).get_branch_head("master").unwrap(), c0);
        assert!(CommitEngine::new(&server_env).exists(&c0).unwrap());
    }

    #[test]
    fn push_twice_is_noop_second_time() {
        let (_client_dir, client_env) = open_env();
        let client_backends = BackendRegistry::with_localfs(client_env.store_data_dir());
        commit_one(&client_env, &client_backends, "master", CommitParents::Root, "s0");

        let (_server_dir, server_env) = open_env();
        let server_backends = BackendRegistry::with_localfs(server_env.store_data_dir());
        let transport = InProcessTransport::new(SyncServer::new(&server_env, &server_backends));
        let client = SyncClient::new(&client_env, &client_backends, transport);
        client.push_branch("master").unwrap();
        // Second push: no missing commits, and the remote head already
        // matches, so this must not hit push_branch_record's AlreadyExists.
        client.push_branch("master").unwrap();
    }
}
