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

//! Hash / Content Store: maps a content digest to a backend-specific
//! location spec, writing tensor bytes through a [`crate::backend::TensorBackend`]
//! and verifying digests on receive.

use crate::backend::BackendRegistry;
use crate::backend::Tensor;
use crate::codec;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::error::EntityKind;
use crate::error::HangarError;
use crate::error::Result;
use crate::kv::KvStore;

pub struct HashStore<'a> {
    hash: &'a KvStore,
    registry: &'a BackendRegistry,
}

impl<'a> HashStore<'a> {
    pub fn new(hash: &'a KvStore, registry: &'a BackendRegistry) -> Self {
        Self { hash, registry }
    }

    /// Writes `tensor` content-addressed by `digest` through the backend
    /// named by `backend_tag`. A no-op if `digest` is already present.
    pub fn write(&self, digest: DataDigest, backend_tag: &str, tensor: &Tensor) -> Result<()> {
        let key = codec::encode_hash_key(&digest);
        if self.hash.begin_reader().get(&key)?.is_some() {
            return Ok(());
        }
        let backend = self.registry.get(backend_tag)?;
        let spec = backend.write_data(&digest, tensor)?;
        let mut txn = self.hash.begin_writer();
        txn.put(&key, &spec);
        txn.commit()?;
        Ok(())
    }

    /// As [`Self::write`], but recomputes `digest` from `tensor.bytes` first
    /// and rejects a mismatch before writing anything.
    pub fn verify_and_write(&self, declared: DataDigest, backend_tag: &str, tensor: &Tensor) -> Result<()> {
        let actual = DataDigest::of(&tensor.bytes);
        if actual != declared {
            return Err(HangarError::DigestMismatch {
                expected: declared.hex(),
                actual: actual.hex(),
            });
        }
        self.write(declared, backend_tag, tensor)
    }

    pub fn read(&self, digest: &DataDigest) -> Result<Tensor> {
        let key = codec::encode_hash_key(digest);
        let spec = self
            .hash
            .begin_reader()
            .get(&key)?
            .ok_or_else(|| HangarError::NotFound {
                kind: EntityKind::Digest,
                id: digest.hex(),
            })?;
        let tag = crate::backend::tag_of_spec(&spec)?;
        self.registry.get(&tag)?.read_data(&spec)
    }

    pub fn contains(&self, digest: &DataDigest) -> Result<bool> {
        let key = codec::encode_hash_key(digest);
        Ok(self.hash.begin_reader().get(&key)?.is_some())
    }

    /// Writes a content-addressed schema blob into the hash store. No-op if already present.
    pub fn write_schema_blob(&self, digest: SchemaDigest, bytes: &[u8]) -> Result<()> {
        let key = codec::encode_schema_hash_key(&digest);
        if self.hash.begin_reader().get(&key)?.is_some() {
            return Ok(());
        }
        let mut txn = self.hash.begin_writer();
        txn.put(&key, bytes);
        txn.commit()?;
        Ok(())
    }

    pub fn read_schema_blob(&self, digest: &SchemaDigest) -> Result<Vec<u8>> {
        let key = codec::encode_schema_hash_key(digest);
        self.hash.begin_reader().get(&key)?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Schema,
            id: digest.hex(),
        })
    }

    /// Every data digest held on this repository, regardless of which commit
    /// references it.
    pub fn list_all_data_digests(&self) -> Result<std::collections::BTreeSet<DataDigest>> {
        let reader = self.hash.begin_reader();
        let mut digests = std::collections::BTreeSet::new();
        for entry in reader.range(&codec::hash_key_prefix()) {
            let (key, _) = entry?;
            digests.insert(codec::decode_hash_key(&key)?);
        }
        Ok(digests)
    }

    /// Every schema digest with a stored blob, regardless of dataset.
    pub fn list_all_schema_digests(&self) -> Result<std::collections::BTreeSet<SchemaDigest>> {
        let reader = self.hash.begin_reader();
        let mut digests = std::collections::BTreeSet::new();
        for entry in reader.range(&codec::schema_key_prefix()) {
            let (key, _) = entry?;
            digests.insert(codec::decode_schema_hash_key(&key)?);
        }
        Ok(digests)
    }
}

/// Metadata (label) store: raw bytes, content-addressed, no backend
/// indirection.
pub struct MetaStore<'a> {
    label: &'a KvStore,
}

impl<'a> MetaStore<'a> {
    pub fn new(label: &'a KvStore) -> Self {
        Self { label }
    }

    pub fn write(&self, digest: MetaDigest, bytes: &[u8]) -> Result<()> {
        let key = codec::encode_meta_hash_key(&digest);
        if self.label.begin_reader().get(&key)?.is_some() {
            return Ok(());
        }
        let mut txn = self.label.begin_writer();
        txn.put(&key, bytes);
        txn.commit()?;
        Ok(())
    }

    pub fn verify_and_write(&self, declared: MetaDigest, bytes: &[u8]) -> Result<()> {
        let actual = MetaDigest::of(bytes);
        if actual != declared {
            return Err(HangarError::DigestMismatch {
                expected: declared.hex(),
                actual: actual.hex(),
            });
        }
        self.write(declared, bytes)
    }

    pub fn read(&self, digest: &MetaDigest) -> Result<Vec<u8>> {
        let key = codec::encode_meta_hash_key(digest);
        self.label.begin_reader().get(&key)?.ok_or_else(|| HangarError::NotFound {
            kind: EntityKind::Metadata,
            id: digest.hex(),
        })
    }

    /// Every metadata blob digest held on this repository.
    pub fn list_all_meta_digests(&self) -> Result<std::collections::BTreeSet<MetaDigest>> {
        let reader = self.label.begin_reader();
        let mut digests = std::collections::BTreeSet::new();
        for entry in reader.range(&codec::hash_key_prefix()) {
            let (key, _) = entry?;
            digests.insert(codec::decode_meta_hash_key(&key)?);
        }
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::TransactionRegistry;

    fn setup() -> (tempfile::TempDir, KvStore, BackendRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let hash = KvStore::open(&dir.path().join("hash.lmdb"), TransactionRegistry::new(), "hash").unwrap();
        let registry = BackendRegistry::with_localfs(dir.path().join("store_data"));
        (dir, hash, registry)
    }

    #[test]
    fn write_then_read() {
        let (_dir, hash, registry) = setup();
        let store = HashStore::new(&hash, &registry);
        let tensor = Tensor {
            dtype: 5,
            shape: vec![4],
            bytes: vec![1, 2, 3, 4],
        };
        let digest = DataDigest::of(&tensor.bytes);
        store.write(digest, "00", &tensor).unwrap();
        let read_back = store.read(&digest).unwrap();
        assert_eq!(read_back, tensor);
    }

    #[test]
    fn digest_mismatch_rejected() {
        let (_dir, hash, registry) = setup();
        let store = HashStore::new(&hash, &registry);
        let tensor = Tensor {
            dtype: 5,
            shape: vec![4],
            bytes: vec![1, 2, 3, 4],
        };
        let wrong_digest = DataDigest::of(b"not the tensor bytes");
        let result = store.verify_and_write(wrong_digest, "00", &tensor);
        assert!(matches!(result, Err(HangarError::DigestMismatch { .. })));
        assert!(!store.contains(&wrong_digest).unwrap());
    }

    #[test]
    fn not_found_for_missing_digest() {
        let (_dir, hash, registry) = setup();
        let store = HashStore::new(&hash, &registry);
        let missing = DataDigest::of(b"missing");
        assert!(matches!(store.read(&missing), Err(HangarError::NotFound { .. })));
    }

    #[test]
    fn list_all_data_digests_tracks_writes() {
        let (_dir, hash, registry) = setup();
        let store = HashStore::new(&hash, &registry);
        let tensor = Tensor { dtype: 5, shape: vec![4], bytes: vec![1, 2, 3, 4] };
        let digest = DataDigest::of(&tensor.bytes);
        store.write(digest, "00", &tensor).unwrap();
        let listed = store.list_all_data_digests().unwrap();
        assert!(listed.contains(&digest));
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn meta_store_list_all_digests() {
        let dir = tempfile::tempdir().unwrap();
        let label = KvStore::open(&dir.path().join("meta.lmdb"), TransactionRegistry::new(), "meta").unwrap();
        let store = MetaStore::new(&label);
        let digest = MetaDigest::of(b"hello");
        store.write(digest, b"hello").unwrap();
        let listed = store.list_all_meta_digests().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.contains(&digest));
    }
}
