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

//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// The kind of entity a [`HangarError::NotFound`] or
/// [`HangarError::AlreadyExists`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Branch,
    Commit,
    Digest,
    Schema,
    Metadata,
    Remote,
    Dataset,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Branch => "branch",
            Self::Commit => "commit",
            Self::Digest => "digest",
            Self::Schema => "schema",
            Self::Metadata => "metadata",
            Self::Remote => "remote",
            Self::Dataset => "dataset",
        };
        f.write_str(s)
    }
}

/// The single error type returned by every `hangar-lib` operation.
#[derive(Debug, Error)]
pub enum HangarError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("writer lock is held by another writer")]
    WriterLockHeld,

    #[error("invalid name {name:?}: must match [A-Za-z0-9._-]+")]
    InvalidName { name: String },

    #[error("repository version {found} is incompatible with this build ({expected})")]
    IncompatibleRepo { found: String, expected: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("merge conflict on key {key:?}")]
    MergeConflict { key: String },

    #[error("resource exhausted: {reason}")]
    ResourceExhausted { reason: String },

    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("cannot access {path}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] sled::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T, E = HangarError> = std::result::Result<T, E>;

impl HangarError {
    /// Flat numeric error code as carried in sync protocol reply envelopes:
    /// 0 OK, 5 NOT_FOUND, 6 ALREADY_EXISTS, 8 RESOURCE_EXHAUSTED, 15 DATA_LOSS.
    pub fn wire_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 5,
            Self::AlreadyExists { .. } => 6,
            Self::ResourceExhausted { .. } => 8,
            Self::DigestMismatch { .. } => 15,
            _ => 1,
        }
    }

    pub fn from_wire(code: i32, message: String) -> Option<Self> {
        match code {
            0 => None,
            5 => Some(Self::NotFound {
                kind: EntityKind::Commit,
                id: message,
            }),
            6 => Some(Self::AlreadyExists {
                kind: EntityKind::Commit,
                id: message,
            }),
            8 => Some(Self::ResourceExhausted { reason: message }),
            15 => Some(Self::DigestMismatch {
                expected: String::new(),
                actual: message,
            }),
            _ => Some(Self::Transport { reason: message }),
        }
    }
}
