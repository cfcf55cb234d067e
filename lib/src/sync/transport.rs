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

//! Sync Protocol, transport boundary: one concrete method per RPC, without
//! committing this crate to any particular wire format.
//! [`crate::sync::client::SyncClient`] is generic over this trait so the
//! same orchestration logic drives an in-process test harness and a real
//! socket transport alike.

use std::collections::BTreeSet;

use crate::backend::Tensor;
use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::error::Result;
use crate::sync::messages::ClientConfig;
use crate::sync::messages::CommitPayload;
use crate::sync::messages::DataBatch;
use crate::sync::server::SyncServer;

/// Every RPC a Hangar client can issue against a remote: one method per
/// `Fetch*`/`Push*`/`FindMissing*` operation.
pub trait Transport {
    fn ping(&self) -> Result<()>;
    fn get_client_config(&self) -> Result<ClientConfig>;

    fn fetch_branch_record(&self, branch_name: &str) -> Result<CommitDigest>;
    fn push_branch_record(&self, branch_name: &str, commit: CommitDigest) -> Result<()>;

    fn fetch_commit(&self, commit: CommitDigest) -> Result<CommitPayload>;
    fn push_commit(&self, commit: CommitDigest, payload: CommitPayload) -> Result<bool>;

    fn fetch_schema(&self, digest: SchemaDigest) -> Result<Vec<u8>>;
    fn push_schema(&self, digest: SchemaDigest, blob: Vec<u8>) -> Result<()>;

    fn fetch_data(&self, digests: &[DataDigest], max_nbytes: u64) -> Result<DataBatch>;
    fn push_data(&self, schema_hash: SchemaDigest, items: Vec<(DataDigest, Tensor)>) -> Result<()>;

    fn fetch_label(&self, digest: MetaDigest) -> Result<Vec<u8>>;
    fn push_label(&self, digest: MetaDigest, bytes: Vec<u8>) -> Result<()>;

    fn find_missing_commits_for_fetch(
        &self,
        branch_name: &str,
        client_commits: &BTreeSet<CommitDigest>,
    ) -> Result<(CommitDigest, Vec<CommitDigest>)>;
    fn find_missing_commits_for_push(&self, client_commits: &BTreeSet<CommitDigest>) -> Result<Vec<CommitDigest>>;

    fn find_missing_schemas_for_fetch(
        &self,
        commit: CommitDigest,
        client_schemas: &BTreeSet<SchemaDigest>,
    ) -> Result<Vec<SchemaDigest>>;
    fn find_missing_schemas_for_push(&self, client_schemas: &BTreeSet<SchemaDigest>) -> Result<Vec<SchemaDigest>>;

    fn find_missing_hash_records_for_fetch(
        &self,
        commit: CommitDigest,
        client_hashes: &BTreeSet<DataDigest>,
    ) -> Result<Vec<(DataDigest, SchemaDigest)>>;
    fn find_missing_hash_records_for_push(&self, client_hashes: &BTreeSet<DataDigest>) -> Result<Vec<DataDigest>>;

    fn find_missing_labels_for_fetch(
        &self,
        commit: CommitDigest,
        client_labels: &BTreeSet<MetaDigest>,
    ) -> Result<Vec<MetaDigest>>;
    fn find_missing_labels_for_push(&self, client_labels: &BTreeSet<MetaDigest>) -> Result<Vec<MetaDigest>>;
}

/// Calls a [`SyncServer`] directly, with no (de)serialization — used by
/// tests and any same-process clone/fetch/push.
pub struct InProcessTransport<'e> {
    server: SyncServer<'e>,
}

impl<'e> InProcessTransport<'e> {
    pub fn new(server: SyncServer<'e>) -> Self {
        Self { server }
    }
}

impl<'e> Transport for InProcessTransport<'e> {
    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn get_client_config(&self) -> Result<ClientConfig> {
        Ok(self.server.get_client_config())
    }

    fn fetch_branch_record(&self, branch_name: &str) -> Result<CommitDigest> {
        self.server.fetch_branch_record(branch_name)
    }

    fn push_branch_record(&self, branch_name: &str, commit: CommitDigest) -> Result<()> {
        self.server.push_branch_record(branch_name, commit)
    }

    fn fetch_commit(&self, commit: CommitDigest) -> Result<CommitPayload> {
        self.server.fetch_commit(commit)
    }

    fn push_commit(&self, commit: CommitDigest, payload: CommitPayload) -> Result<bool> {
        self.server.push_commit(commit, payload)
    }

    fn fetch_schema(&self, digest: SchemaDigest) -> Result<Vec<u8>> {
        self.server.fetch_schema(digest)
    }

    fn push_schema(&self, digest: SchemaDigest, blob: Vec<u8>) -> Result<()> {
        self.server.push_schema(digest, blob)
    }

    fn fetch_data(&self, digests: &[DataDigest], max_nbytes: u64) -> Result<DataBatch> {
        self.server.fetch_data(digests, max_nbytes)
    }

    fn push_data(&self, schema_hash: SchemaDigest, items: Vec<(DataDigest, Tensor)>) -> Result<()> {
        self.server.push_data(schema_hash, items)
    }

    fn fetch_label(&self, digest: MetaDigest) -> Result<Vec<u8>> {
        self.server.fetch_label(digest)
    }

    fn push_label(&self, digest: MetaDigest, bytes: Vec<u8>) -> Result<()> {
        self.server.push_label(digest, bytes)
    }

    fn find_missing_commits_for_fetch(
        &self,
        branch_name: &str,
        client_commits: &BTreeSet<CommitDigest>,
    ) -> Result<(CommitDigest, Vec<CommitDigest>)> {
        self.server.find_missing_commits_for_fetch(branch_name, client_commits)
    }

    fn find_missing_commits_for_push(&self, client_commits: &BTreeSet<CommitDigest>) -> Result<Vec<CommitDigest>> {
        self.server.find_missing_commits_for_push(client_commits)
    }

    fn find_missing_schemas_for_fetch(
        &self,
        commit: CommitDigest,
        client_schemas: &BTreeSet<SchemaDigest>,
    ) -> Result<Vec<SchemaDigest>> {
        self.server.find_missing_schemas_for_fetch(commit, client_schemas)
    }

    fn find_missing_schemas_for_push(&self, client_schemas: &BTreeSet<SchemaDigest>) -> Result<Vec<SchemaDigest>> {
        self.server.find_missing_schemas_for_push(client_schemas)
    }

    fn find_missing_hash_records_for_fetch(
        &self,
        commit: CommitDigest,
        client_hashes: &BTreeSet<DataDigest>,
    ) -> Result<Vec<(DataDigest, SchemaDigest)>> {
        self.server.find_missing_hash_records_for_fetch(commit, client_hashes)
    }

    fn find_missing_hash_records_for_push(&self, client_hashes: &BTreeSet<DataDigest>) -> Result<Vec<DataDigest>> {
        self.server.find_missing_hash_records_for_push(client_hashes)
    }

    fn find_missing_labels_for_fetch(
        &self,
        commit: CommitDigest,
        client_labels: &BTreeSet<MetaDigest>,
    ) -> Result<Vec<MetaDigest>> {
        self.server.find_missing_labels_for_fetch(commit, client_labels)
    }

    fn find_missing_labels_for_push(&self, client_labels: &BTreeSet<MetaDigest>) -> Result<Vec<MetaDigest>> {
        self.server.find_missing_labels_for_push(client_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::environments::Environments;

    #[test]
    fn in_process_ping_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environments::init_repo(dir.path(), false).unwrap();
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        let transport = InProcessTransport::new(SyncServer::new(&env, &backends));
        transport.ping().unwrap();
        let config = transport.get_client_config().unwrap();
        assert!(config.enable_compression);
    }
}
