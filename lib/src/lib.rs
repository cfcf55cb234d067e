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

//! Core engine for Hangar: a version-controlled, content-addressed
//! repository for tensor datasets.
//!
//! This crate has no notion of a CLI or a network listener of its own; it
//! owns the on-disk repository format, the commit graph, and the sync
//! protocol's RPC semantics, and leaves process/transport concerns (the
//! `hangar` binary, a TCP server loop) to callers.
//!
//! Module map, by the repository component each one owns:
//!
//! - [`kv`] / [`codec`] — the embedded KV store abstraction and the
//!   byte-level key/value encoding for every record class.
//! - [`digest`] / [`compress`] / [`hex_util`] / [`file_util`] — content
//!   addressing, zstd framing, and hex/atomic-write helpers shared
//!   throughout.
//! - [`environments`] — opens and owns a repository's logical stores.
//! - [`backend`] — the pluggable tensor storage backend trait and the
//!   reference local-filesystem backend.
//! - [`hashstore`] — the content-addressed data/metadata stores.
//! - [`schema`] — a dataset's declared shape/dtype contract.
//! - [`staging`] — the mutable working set of pending writes.
//! - [`commit`] — snapshots the staging area into an immutable commit.
//! - [`branch`] — named branch heads and the exclusive writer lock.
//! - [`history`] — ancestor traversal, lowest common ancestor, and merge.
//! - [`query`] — read-only prefix-scan queries over a commit's records.
//! - [`remotes`] — the local registry of named remote addresses.
//! - [`name_gen`] — positional sample name generation.
//! - [`sync`] — the client/server sync protocol.
//! - [`repo`] — a single-handle facade combining the above for callers.
//! - [`error`] — the crate-wide error and wire error-code mapping.

pub mod backend;
pub mod branch;
pub mod codec;
pub mod commit;
pub mod compress;
pub mod digest;
pub mod environments;
pub mod error;
pub mod file_util;
pub mod hashstore;
pub mod hex_util;
pub mod history;
pub mod kv;
pub mod name_gen;
pub mod query;
pub mod remotes;
pub mod repo;
pub mod schema;
pub mod staging;
pub mod sync;
