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

//! Sync Protocol, framed I/O transport: a length-delimited,
//! zstd-compressed `bincode` envelope over any `Read + Write` stream
//! (typically a `TcpStream`), without pulling in a protobuf/gRPC stack the
//! rest of this crate doesn't otherwise need.
//!
//! Wire shape: `[u32 big-endian frame length][zstd-compressed bincode bytes]`,
//! repeated once per request and once per reply, request and reply strictly
//! alternating on one stream.

use std::collections::BTreeSet;
use std::io::Read;
use std::io::Write;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::backend::Tensor;
use crate::compress;
use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::error::HangarError;
use crate::error::Result;
use crate::sync::messages::ClientConfig;
use crate::sync::messages::CommitPayload;
use crate::sync::messages::DataBatch;
use crate::sync::server::SyncServer;
use crate::sync::transport::Transport;

/// Ceiling on a single frame's length, guarding against a corrupt or
/// malicious length prefix causing an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 1 << 30;

#[derive(Debug, Serialize, Deserialize)]
enum Request {
    Ping,
    GetClientConfig,
    FetchBranchRecord { branch_name: String },
    PushBranchRecord { branch_name: String, commit: CommitDigest },
    FetchCommit { commit: CommitDigest },
    PushCommit { commit: CommitDigest, payload: CommitPayload },
    FetchSchema { digest: SchemaDigest },
    PushSchema { digest: SchemaDigest, blob: Vec<u8> },
    FetchData { digests: Vec<DataDigest>, max_nbytes: u64 },
    PushData { schema_hash: SchemaDigest, items: Vec<(DataDigest, Tensor)> },
    FetchLabel { digest: MetaDigest },
    PushLabel { digest: MetaDigest, bytes: Vec<u8> },
    FindMissingCommitsForFetch { branch_name: String, client_commits: BTreeSet<CommitDigest> },
    FindMissingCommitsForPush { client_commits: BTreeSet<CommitDigest> },
    FindMissingSchemasForFetch { commit: CommitDigest, client_schemas: BTreeSet<SchemaDigest> },
    FindMissingSchemasForPush { client_schemas: BTreeSet<SchemaDigest> },
    FindMissingHashRecordsForFetch { commit: CommitDigest, client_hashes: BTreeSet<DataDigest> },
    FindMissingHashRecordsForPush { client_hashes: BTreeSet<DataDigest> },
    FindMissingLabelsForFetch { commit: CommitDigest, client_labels: BTreeSet<MetaDigest> },
    FindMissingLabelsForPush { client_labels: BTreeSet<MetaDigest> },
}

#[derive(Debug, Serialize, Deserialize)]
enum Reply {
    Ok,
    Error { code: i32, message: String },
    ClientConfig(ClientConfig),
    CommitDigest(CommitDigest),
    CommitPayload(CommitPayload),
    Bool(bool),
    Bytes(Vec<u8>),
    DataBatch(DataBatch),
    MissingCommitsForFetch(CommitDigest, Vec<CommitDigest>),
    CommitDigestList(Vec<CommitDigest>),
    SchemaDigestList(Vec<SchemaDigest>),
    HashRecordList(Vec<(DataDigest, SchemaDigest)>),
    DataDigestList(Vec<DataDigest>),
    MetaDigestList(Vec<MetaDigest>),
}

impl Reply {
    fn from_error(err: &HangarError) -> Self {
        Reply::Error { code: err.wire_code(), message: err.to_string() }
    }

    fn into_error(self) -> Option<HangarError> {
        match self {
            Reply::Error { code, message } => {
                Some(HangarError::from_wire(code, message).unwrap_or(HangarError::Transport { reason: "unknown error".into() }))
            }
            _ => None,
        }
    }
}

fn write_frame<W: Write>(stream: &mut W, payload: &impl Serialize) -> Result<()> {
    let raw = bincode::serialize(payload).map_err(|e| HangarError::Encoding(e.to_string()))?;
    let compressed = compress::compress(&raw)?;
    let len = u32::try_from(compressed.len()).map_err(|_| HangarError::Transport {
        reason: "frame too large to encode".into(),
    })?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(&compressed)?;
    stream.flush()?;
    Ok(())
}

fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(stream: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(HangarError::ResourceExhausted {
            reason: format!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES}-byte limit"),
        });
    }
    let mut compressed = vec![0u8; len as usize];
    stream.read_exact(&mut compressed)?;
    let raw = compress::decompress_unknown_size(&compressed)?;
    bincode::deserialize(&raw).map_err(|e| HangarError::Encoding(e.to_string()))
}

/// Client side of the framed transport: serializes one [`Request`] per call,
/// blocks for the matching [`Reply`]. `S` is typically a `TcpStream`; tests
/// use an in-memory duplex pipe.
pub struct FramedTransport<S> {
    stream: Mutex<S>,
}

impl<S: Read + Write> FramedTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream: Mutex::new(stream) }
    }

    fn call(&self, request: Request) -> Result<Reply> {
        let mut stream = self.stream.lock().expect("transport mutex is never poisoned by a panic mid-call");
        write_frame(&mut *stream, &request)?;
        let reply: Reply = read_frame(&mut *stream)?;
        match reply.into_error() {
            Some(err) => Err(err),
            None => Ok(reply),
        }
    }
}

macro_rules! expect_reply {
    ($reply:expr, $variant:ident) => {
        match $reply {
            Reply::$variant(v) => Ok(v),
            other => Err(HangarError::Transport { reason: format!("unexpected reply {other:?}") }),
        }
    };
}

impl<S: Read + Write> Transport for FramedTransport<S> {
    fn ping(&self) -> Result<()> {
        self.call(Request::Ping).map(|_| ())
    }

    fn get_client_config(&self) -> Result<ClientConfig> {
        expect_reply!(self.call(Request::GetClientConfig)?, ClientConfig)
    }

    fn fetch_branch_record(&self, branch_name: &str) -> Result<CommitDigest> {
        let reply = self.call(Request::FetchBranchRecord { branch_name: branch_name.to_string() })?;
        expect_reply!(reply, CommitDigest)
    }

    fn push_branch_record(&self, branch_name: &str, commit: CommitDigest) -> Result<()> {
        self.call(Request::PushBranchRecord { branch_name: branch_name.to_string(), commit }).map(|_| ())
    }

    fn fetch_commit(&self, commit: CommitDigest) -> Result<CommitPayload> {
        expect_reply!(self.call(Request::FetchCommit { commit })?, CommitPayload)
    }

    fn push_commit(&self, commit: CommitDigest, payload: CommitPayload) -> Result<bool> {
        expect_reply!(self.call(Request::PushCommit { commit, payload })?, Bool)
    }

    fn fetch_schema(&self, digest: SchemaDigest) -> Result<Vec<u8>> {
        expect_reply!(self.call(Request::FetchSchema { digest })?, Bytes)
    }

    fn push_schema(&self, digest: SchemaDigest, blob: Vec<u8>) -> Result<()> {
        self.call(Request::PushSchema { digest, blob }).map(|_| ())
    }

    fn fetch_data(&self, digests: &[DataDigest], max_nbytes: u64) -> Result<DataBatch> {
        expect_reply!(self.call(Request::FetchData { digests: digests.to_vec(), max_nbytes })?, DataBatch)
    }

    fn push_data(&self, schema_hash: SchemaDigest, items: Vec<(DataDigest, Tensor)>) -> Result<()> {
        self.call(Request::PushData { schema_hash, items }).map(|_| ())
    }

    fn fetch_label(&self, digest: MetaDigest) -> Result<Vec<u8>> {
        expect_reply!(self.call(Request::FetchLabel { digest })?, Bytes)
    }

    fn push_label(&self, digest: MetaDigest, bytes: Vec<u8>) -> Result<()> {
        self.call(Request::PushLabel { digest, bytes }).map(|_| ())
    }

    fn find_missing_commits_for_fetch(
        &self,
        branch_name: &str,
        client_commits: &BTreeSet<CommitDigest>,
    ) -> Result<(CommitDigest, Vec<CommitDigest>)> {
        let reply = self.call(Request::FindMissingCommitsForFetch {
            branch_name: branch_name.to_string(),
            client_commits: client_commits.clone(),
        })?;
        match reply {
            Reply::MissingCommitsForFetch(head, missing) => Ok((head, missing)),
            other => Err(HangarError::Transport { reason: format!("unexpected reply {other:?}") }),
        }
    }

    fn find_missing_commits_for_push(&self, client_commits: &BTreeSet<CommitDigest>) -> Result<Vec<CommitDigest>> {
        let reply = self.call(Request::FindMissingCommitsForPush { client_commits: client_commits.clone() })?;
        expect_reply!(reply, CommitDigestList)
    }

    fn find_missing_schemas_for_fetch(
        &self,
        commit: CommitDigest,
        client_schemas: &BTreeSet<SchemaDigest>,
    ) -> Result<Vec<SchemaDigest>> {
        let reply = self.call(Request::FindMissingSchemasForFetch { commit, client_schemas: client_schemas.clone() })?;
        expect_reply!(reply, SchemaDigestList)
    }

    fn find_missing_schemas_for_push(&self, client_schemas: &BTreeSet<SchemaDigest>) -> Result<Vec<SchemaDigest>> {
        let reply = self.call(Request::FindMissingSchemasForPush { client_schemas: client_schemas.clone() })?;
        expect_reply!(reply, SchemaDigestList)
    }

    fn find_missing_hash_records_for_fetch(
        &self,
        commit: CommitDigest,
        client_hashes: &BTreeSet<DataDigest>,
    ) -> Result<Vec<(DataDigest, SchemaDigest)>> {
        let reply = self.call(Request::FindMissingHashRecordsForFetch { commit, client_hashes: client_hashes.clone() })?;
        expect_reply!(reply, HashRecordList)
    }

    fn find_missing_hash_records_for_push(&self, client_hashes: &BTreeSet<DataDigest>) -> Result<Vec<DataDigest>> {
        let reply = self.call(Request::FindMissingHashRecordsForPush { client_hashes: client_hashes.clone() })?;
        expect_reply!(reply, DataDigestList)
    }

    fn find_missing_labels_for_fetch(
        &self,
        commit: CommitDigest,
        client_labels: &BTreeSet<MetaDigest>,
    ) -> Result<Vec<MetaDigest>> {
        let reply = self.call(Request::FindMissingLabelsForFetch { commit, client_labels: client_labels.clone() })?;
        expect_reply!(reply, MetaDigestList)
    }

    fn find_missing_labels_for_push(&self, client_labels: &BTreeSet<MetaDigest>) -> Result<Vec<MetaDigest>> {
        let reply = self.call(Request::FindMissingLabelsForPush { client_labels: client_labels.clone() })?;
        expect_reply!(reply, MetaDigestList)
    }
}

/// Services one request read from `stream`, writing exactly one reply back.
/// The caller loops this for the lifetime of a connection.
pub fn serve_one<S: Read + Write>(stream: &mut S, server: &SyncServer<'_>) -> Result<()> {
    let request: Request = read_frame(stream)?;
    let reply = dispatch(server, request);
    let reply = reply.unwrap_or_else(|err| Reply::from_error(&err));
    write_frame(stream, &reply)
}

fn dispatch(server: &SyncServer<'_>, request: Request) -> Result<Reply> {
    Ok(match request {
        Request::Ping => Reply::Ok,
        Request::GetClientConfig => Reply::ClientConfig(server.get_client_config()),
        Request::FetchBranchRecord { branch_name } => Reply::CommitDigest(server.fetch_branch_record(&branch_name)?),
        Request::PushBranchRecord { branch_name, commit } => {
            server.push_branch_record(&branch_name, commit)?;
            Reply::Ok
        }
        Request::FetchCommit { commit } => Reply::CommitPayload(server.fetch_commit(commit)?),
        Request::PushCommit { commit, payload } => Reply::Bool(server.push_commit(commit, payload)?),
        Request::FetchSchema { digest } => Reply::Bytes(server.fetch_schema(digest)?),
        Request::PushSchema { digest, blob } => {
            server.push_schema(digest, blob)?;
            Reply::Ok
        }
        Request::FetchData { digests, max_nbytes } => Reply::DataBatch(server.fetch_data(&digests, max_nbytes)?),
        Request::PushData { schema_hash, items } => {
            server.push_data(schema_hash, items)?;
            Reply::Ok
        }
        Request::FetchLabel { digest } => Reply::Bytes(server.fetch_label(digest)?),
        Request::PushLabel { digest, bytes } => {
            server.push_label(digest, bytes)?;
            Reply::Ok
        }
        Request::FindMissingCommitsForFetch { branch_name, client_commits } => {
            let (head, missing) = server.find_missing_commits_for_fetch(&branch_name, &client_commits)?;
            Reply::MissingCommitsForFetch(head, missing)
        }
        Request::FindMissingCommitsForPush { client_commits } => {
            Reply::CommitDigestList(server.find_missing_commits_for_push(&client_commits)?)
        }
        Request::FindMissingSchemasForFetch { commit, client_schemas } => {
            Reply::SchemaDigestList(server.find_missing_schemas_for_fetch(commit, &client_schemas)?)
        }
        Request::FindMissingSchemasForPush { client_schemas } => {
            Reply::SchemaDigestList(server.find_missing_schemas_for_push(&client_schemas)?)
        }
        Request::FindMissingHashRecordsForFetch { commit, client_hashes } => {
            Reply::HashRecordList(server.find_missing_hash_records_for_fetch(commit, &client_hashes)?)
        }
        Request::FindMissingHashRecordsForPush { client_hashes } => {
            Reply::DataDigestList(server.find_missing_hash_records_for_push(&client_hashes)?)
        }
        Request::FindMissingLabelsForFetch { commit, client_labels } => {
            Reply::MetaDigestList(server.find_missing_labels_for_fetch(commit, &client_labels)?)
        }
        Request::FindMissingLabelsForPush { client_labels } => {
            Reply::MetaDigestList(server.find_missing_labels_for_push(&client_labels)?)
        }
    })
}

/// Serves every request on `stream` in sequence until the client disconnects
/// (EOF on a frame's length prefix), for a `serve` command's connection
/// handler loop.
pub fn serve_connection<S: Read + Write>(mut stream: S, server: &SyncServer<'_>) -> Result<()> {
    loop {
        match serve_one(&mut stream, server) {
            Ok(()) => continue,
            Err(HangarError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}
