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

//! Staging Area: the mutable working set of record writes that will
//! become the next commit. Schema declarations and sample/metadata writes
//! land in the stage-ref store; tensor bytes land in a per-process scratch
//! directory under `data/stage_data/`, with their digests tracked in
//! stage-hash so [`crate::commit::CommitEngine`] can move them into the
//! permanent store on commit.

use std::fs;

use crate::backend::BackendRegistry;
use crate::backend::Tensor;
use crate::codec;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::environments::Environments;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::kv::KvStore;
use crate::name_gen;
use crate::schema::DatasetSchema;

/// Pending-entry key prefixes internal to stage-hash bookkeeping, distinct
/// from the permanent hash/label store's `"h:"` record class so a single
/// pending scratch store can disambiguate the two kinds of payload.
const PENDING_DATA_PREFIX: &[u8] = b"D:";
const PENDING_META_PREFIX: &[u8] = b"M:";

fn pending_data_key(digest: &DataDigest) -> Vec<u8> {
    [PENDING_DATA_PREFIX, digest.hex().as_bytes()].concat()
}

fn pending_meta_key(digest: &MetaDigest) -> Vec<u8> {
    [PENDING_META_PREFIX, digest.hex().as_bytes()].concat()
}

fn decode_pending_key(key: &[u8], prefix: &[u8]) -> Result<String> {
    let rest = key.strip_prefix(prefix).ok_or_else(|| HangarError::MalformedRecord {
        reason: "not a pending stage-hash key".into(),
    })?;
    std::str::from_utf8(rest).map(str::to_owned).map_err(|_| HangarError::MalformedRecord {
        reason: "pending stage-hash key is not valid UTF-8".into(),
    })
}

/// Working set of record writes not yet committed. Borrows the
/// environment's stage-ref/stage-hash stores and owns a scratch
/// [`BackendRegistry`] rooted at this process' stage data directory.
pub struct StagingArea<'e> {
    env: &'e Environments,
    scratch: BackendRegistry,
}

impl<'e> StagingArea<'e> {
    /// Opens the staging area for the current process, creating its scratch
    /// data directory (`data/stage_data/<pid>/`) if absent.
    pub fn open(env: &'e Environments) -> Result<Self> {
        let root = env.stage_data_dir().join(std::process::id().to_string());
        fs::create_dir_all(&root).map_err(|source| HangarError::Path { path: root.clone(), source })?;
        Ok(Self { env, scratch: BackendRegistry::with_localfs(root) })
    }

    fn stage_ref(&self) -> &KvStore {
        &self.env.stage_ref
    }

    fn stage_hash(&self) -> &KvStore {
        &self.env.stage_hash
    }

    /// Reads a dataset's declared schema from the stage-ref store, if any.
    pub fn get_schema(&self, dataset: &str) -> Result<Option<DatasetSchema>> {
        let key = codec::encode_schema_key(dataset);
        match self.stage_ref().begin_reader().get(&key)? {
            Some(bytes) => Ok(Some(codec::decode_schema_value(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Declares the schema for a new dataset. A dataset's schema cannot be
    /// redeclared once set.
    pub fn declare_schema(&self, dataset: &str, schema: &DatasetSchema) -> Result<()> {
        validate_name(dataset)?;
        let key = codec::encode_schema_key(dataset);
        let mut txn = self.stage_ref().begin_writer();
        if txn.get(&key)?.is_some() {
            return Err(HangarError::AlreadyExists {
                kind: EntityKind::Schema,
                id: dataset.to_string(),
            });
        }
        txn.put(&key, &codec::encode_schema_value(schema)?);
        txn.put(&codec::encode_dataset_count_key(dataset), &codec::encode_count_value(0));
        bump_count(&mut txn, &codec::total_dataset_count_key())?;
        txn.commit()
    }

    /// Writes a sample's tensor bytes into the scratch store and records its
    /// digest under `"a:" + dataset + ":" + name`. `name` is generated via
    /// [`name_gen::generate`] when the dataset's schema is not name-addressed
    /// or no name is supplied.
    pub fn put_sample(&self, dataset: &str, name: Option<&str>, tensor: &Tensor) -> Result<String> {
        let schema = self.get_schema(dataset)?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Schema,
            id: dataset.to_string(),
        })?;
        let name = match name {
            Some(n) if schema.schema_is_named => n.to_string(),
            _ => name_gen::generate(),
        };
        let digest = DataDigest::of(&tensor.bytes);
        let spec = self
            .scratch
            .get(&schema.schema_default_backend)?
            .write_data(&digest, tensor)?;

        let mut htxn = self.stage_hash().begin_writer();
        htxn.put(&pending_data_key(&digest), &spec);
        htxn.commit()?;

        let sample_key = codec::encode_sample_key(dataset, &name);
        let mut txn = self.stage_ref().begin_writer();
        let is_new = txn.get(&sample_key)?.is_none();
        txn.put(&sample_key, &codec::encode_data_digest_value(&digest));
        if is_new {
            bump_count(&mut txn, &codec::encode_dataset_count_key(dataset))?;
        }
        txn.commit()?;
        Ok(name)
    }

    /// Removes a sample record. A no-op (returns `Ok(false)`) if absent.
    pub fn delete_sample(&self, dataset: &str, name: &str) -> Result<bool> {
        let key = codec::encode_sample_key(dataset, name);
        let mut txn = self.stage_ref().begin_writer();
        if txn.get(&key)?.is_none() {
            return Ok(false);
        }
        txn.delete(&key);
        decrement_count(&mut txn, &codec::encode_dataset_count_key(dataset))?;
        txn.commit()?;
        Ok(true)
    }

    /// Writes a metadata (label) value, content-addressed by its own digest,
    /// into the scratch hash namespace and records `"l:" + name -> digest`.
    pub fn put_metadata(&self, name: &str, bytes: &[u8]) -> Result<MetaDigest> {
        let digest = MetaDigest::of(bytes);
        let meta_key = codec::encode_meta_key(name);
        let mut txn = self.stage_ref().begin_writer();
        let is_new = txn.get(&meta_key)?.is_none();
        txn.put(&meta_key, digest.hex().as_bytes());
        if is_new {
            bump_count(&mut txn, &codec::total_meta_count_key())?;
        }
        txn.commit()?;

        // Metadata values are raw bytes (no backend indirection); stash them
        // in stage-hash under their own pending prefix so a `reset_staging_area`
        // before commit never touches the permanent label store.
        let mut htxn = self.stage_hash().begin_writer();
        htxn.put(&pending_meta_key(&digest), bytes);
        htxn.commit()?;
        Ok(digest)
    }

    pub fn delete_metadata(&self, name: &str) -> Result<bool> {
        let key = codec::encode_meta_key(name);
        let mut txn = self.stage_ref().begin_writer();
        if txn.get(&key)?.is_none() {
            return Ok(false);
        }
        txn.delete(&key);
        decrement_count(&mut txn, &codec::total_meta_count_key())?;
        txn.commit()?;
        Ok(true)
    }

    /// Pending tensor digests written this staging session, paired with
    /// their scratch-store location spec, for [`crate::commit::CommitEngine`]
    /// to move into the permanent hash store.
    pub fn pending_data_hashes(&self) -> Result<Vec<(DataDigest, Vec<u8>)>> {
        let reader = self.stage_hash().begin_reader();
        reader
            .range(PENDING_DATA_PREFIX)
            .map(|r| {
                let (key, value) = r?;
                let hex = decode_pending_key(&key, PENDING_DATA_PREFIX)?;
                let digest = DataDigest::try_from_hex(&hex).ok_or_else(|| HangarError::MalformedRecord {
                    reason: format!("{hex} is not a valid data digest"),
                })?;
                Ok((digest, value))
            })
            .collect()
    }

    /// Pending metadata digests and their raw bytes.
    pub fn pending_meta_blobs(&self) -> Result<Vec<(MetaDigest, Vec<u8>)>> {
        let reader = self.stage_hash().begin_reader();
        reader
            .range(PENDING_META_PREFIX)
            .map(|r| {
                let (key, value) = r?;
                let hex = decode_pending_key(&key, PENDING_META_PREFIX)?;
                let digest = MetaDigest::try_from_hex(&hex).ok_or_else(|| HangarError::MalformedRecord {
                    reason: format!("{hex} is not a valid metadata digest"),
                })?;
                Ok((digest, value))
            })
            .collect()
    }

    pub fn scratch_backends(&self) -> &BackendRegistry {
        &self.scratch
    }

    /// Wipes stage-ref and stage-hash and deletes this process' scratch data
    /// directory.
    pub fn reset_staging_area(&self) -> Result<()> {
        self.stage_ref().clear()?;
        self.stage_hash().clear()?;
        let root = self.env.stage_data_dir().join(std::process::id().to_string());
        if root.exists() {
            fs::remove_dir_all(&root).map_err(|source| HangarError::Path { path: root, source })?;
        }
        Ok(())
    }
}

fn bump_count(txn: &mut crate::kv::WriteTxn<'_>, key: &[u8]) -> Result<()> {
    let current = match txn.get(key)? {
        Some(v) => codec::decode_count_value(&v)?,
        None => 0,
    };
    txn.put(key, &codec::encode_count_value(current + 1));
    Ok(())
}

fn decrement_count(txn: &mut crate::kv::WriteTxn<'_>, key: &[u8]) -> Result<()> {
    let current = match txn.get(key)? {
        Some(v) => codec::decode_count_value(&v)?,
        None => 0,
    };
    txn.put(key, &codec::encode_count_value(current.saturating_sub(1)));
    Ok(())
}

/// Branch/dataset name validation shared with [`crate::branch`]:
/// `^[A-Za-z0-9._-]+$`.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
    && name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(HangarError::InvalidName { name: name.to_string() })
    }
}
