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

//! Wire payload types carried by the sync protocol, independent of
//! whichever [`crate::sync::transport::Transport`] impl moves them.

use serde::Deserialize;
use serde::Serialize;

use crate::backend::Tensor;
use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;

/// Subset of server-side config a client needs to size its requests,
/// returned by `GetClientConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientConfig {
    pub push_max_nbytes: u64,
    pub fetch_max_nbytes: u64,
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            push_max_nbytes: 250_000_000,
            fetch_max_nbytes: 250_000_000,
            enable_compression: true,
        }
    }
}

/// A commit's three ref-store records, as moved over the wire by
/// `FetchCommit`/`PushCommit`. `parent_bytes` is the raw encoded form of
/// [`crate::codec::CommitParents`] (`codec::encode_commit_parents_value`),
/// kept opaque here so this type doesn't need its own `Serialize` impl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitPayload {
    pub parent_bytes: Vec<u8>,
    pub compressed_spec: Vec<u8>,
    pub compressed_refs: Vec<u8>,
}

/// One tensor handed back by `FetchData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataItem {
    pub digest: DataDigest,
    pub tensor: Tensor,
}

/// A (possibly partial) reply to `FetchData`: `truncated` is set when the
/// server stopped short of `fetch_max_nbytes` worth of requested digests
/// and the caller must re-request the remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBatch {
    pub items: Vec<DataItem>,
    pub truncated: bool,
}

/// Everything the sync client needs to replay a missing commit locally:
/// the commit bytes themselves, plus every schema/data/label payload its
/// ref list touches that the client doesn't already hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitClosure {
    pub commit: CommitDigest,
    pub payload: CommitPayload,
    pub schemas: Vec<(SchemaDigest, Vec<u8>)>,
    pub data: Vec<DataItem>,
    pub labels: Vec<(MetaDigest, Vec<u8>)>,
}
