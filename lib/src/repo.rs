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

//! A single-handle view over one repository on disk: owns its
//! [`Environments`] and tensor [`BackendRegistry`] together, and builds every
//! other per-repository component (branches, remotes, staging, commit
//! engine, history, sync client/server) scoped to them. Commands in the
//! `hangar` binary hold one `Repository` for the lifetime of an invocation
//! instead of wiring these components up by hand each time.

use std::path::Path;

use crate::backend::BackendRegistry;
use crate::branch::Branches;
use crate::commit::CommitEngine;
use crate::digest::CommitDigest;
use crate::environments::Environments;
use crate::error::Result;
use crate::hashstore::HashStore;
use crate::hashstore::MetaStore;
use crate::history::History;
use crate::kv::KvStore;
use crate::query::RecordQuery;
use crate::remotes::Remotes;
use crate::staging::StagingArea;
use crate::sync::client::SyncClient;
use crate::sync::server::SyncServer;
use crate::sync::transport::Transport;

pub struct Repository {
    env: Environments,
    backends: BackendRegistry,
}

impl Repository {
    /// Initializes a fresh repository at `root` (or opens it if already
    /// initialized) and a local-filesystem tensor backend rooted at its
    /// `data/store_data/` directory.
    pub fn init(root: &Path) -> Result<Self> {
        let env = Environments::init_repo(root, false)?;
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        Ok(Self { env, backends })
    }

    /// Opens an existing repository at `root`, failing if its on-disk
    /// version doesn't match this build.
    pub fn open(root: &Path) -> Result<Self> {
        let env = Environments::open(root)?;
        let backends = BackendRegistry::with_localfs(env.store_data_dir());
        Ok(Self { env, backends })
    }

    pub fn env(&self) -> &Environments {
        &self.env
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn branches(&self) -> Branches<'_> {
        Branches::new(&self.env)
    }

    pub fn remotes(&self) -> Remotes<'_> {
        Remotes::new(&self.env)
    }

    pub fn history(&self) -> History<'_> {
        History::new(&self.env)
    }

    pub fn commit_engine(&self) -> CommitEngine<'_> {
        CommitEngine::new(&self.env)
    }

    /// Opens the staging area for the current process.
    pub fn staging(&self) -> Result<StagingArea<'_>> {
        StagingArea::open(&self.env)
    }

    pub fn hash_store(&self) -> HashStore<'_> {
        HashStore::new(&self.env.hash, &self.backends)
    }

    pub fn meta_store(&self) -> MetaStore<'_> {
        MetaStore::new(&self.env.label)
    }

    /// Unpacks `commit`'s ref list (materializing it if not already cached)
    /// and returns the store to run [`RecordQuery`] against.
    pub fn checkout(&self, commit: &CommitDigest) -> Result<KvStore> {
        self.commit_engine().unpack_commit_ref(commit)
    }

    /// Convenience for `RecordQuery::new(&self.checkout(commit)?)`, since a
    /// query never outlives the store it borrows.
    pub fn query_at<'s>(&self, store: &'s KvStore) -> RecordQuery<'s> {
        RecordQuery::new(store)
    }

    pub fn sync_server(&self) -> SyncServer<'_> {
        SyncServer::new(&self.env, &self.backends)
    }

    pub fn sync_client<T: Transport>(&self, transport: T) -> SyncClient<'_, T> {
        SyncClient::new(&self.env, &self.backends, transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Tensor;
    use crate::codec::CommitParents;
    use crate::codec::CommitSpec;
    use crate::schema::DatasetSchema;
    use crate::sync::transport::InProcessTransport;

    #[test]
    fn init_then_commit_then_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let staging = repo.staging().unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();

        let spec = CommitSpec { time: 1, message: "m0".into(), user: "alice".into(), email: "a@x".into() };
        let commit = repo
            .commit_engine()
            .commit(&staging, repo.backends(), "master", CommitParents::Root, spec)
            .unwrap()
            .unwrap();
        assert_eq!(repo.branches().get_branch_head("master").unwrap(), commit);

        let store = repo.checkout(&commit).unwrap();
        let query = repo.query_at(&store);
        assert_eq!(query.datasets().unwrap(), vec!["ds1".to_string()]);
    }

    #[test]
    fn reopen_sees_prior_commit() {
        let dir = tempfile::tempdir().unwrap();
        let commit = {
            let repo = Repository::init(dir.path()).unwrap();
            let staging = repo.staging().unwrap();
            staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
            let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
            staging.put_sample("ds1", Some("s0"), &tensor).unwrap();
            let spec = CommitSpec { time: 1, message: "m0".into(), user: "alice".into(), email: "a@x".into() };
            repo.commit_engine()
                .commit(&staging, repo.backends(), "master", CommitParents::Root, spec)
                .unwrap()
                .unwrap()
        };

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.branches().get_branch_head("master").unwrap(), commit);
    }

    #[test]
    fn clone_between_two_repositories() {
        let server_dir = tempfile::tempdir().unwrap();
        let server = Repository::init(server_dir.path()).unwrap();
        let staging = server.staging().unwrap();
        staging.declare_schema("ds1", &DatasetSchema::new(5, false, vec![4], true, "00")).unwrap();
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        staging.put_sample("ds1", Some("s0"), &tensor).unwrap();
        let spec = CommitSpec { time: 1, message: "m0".into(), user: "alice".into(), email: "a@x".into() };
        server
            .commit_engine()
            .commit(&staging, server.backends(), "master", CommitParents::Root, spec)
            .unwrap()
            .unwrap();

        let client_dir = tempfile::tempdir().unwrap();
        let client = Repository::init(client_dir.path()).unwrap();
        let transport = InProcessTransport::new(server.sync_server());
        let head = client.sync_client(transport).clone_branch("master").unwrap();
        assert_eq!(client.branches().get_branch_head("master").unwrap(), head);
    }
}
