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

//! Record Query: pure prefix-range reads over an unpacked commit
//! store or the stage-ref store, with no mutation.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::codec;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::error::Result;
use crate::kv::KvStore;

/// Read-only views over one record store (an unpacked commit's ref store,
/// or the live stage-ref store), scoped to this component's five pure
/// queries.
pub struct RecordQuery<'s> {
    store: &'s KvStore,
}

impl<'s> RecordQuery<'s> {
    pub fn new(store: &'s KvStore) -> Self {
        Self { store }
    }

    /// Every declared dataset name, by range-scanning the schema record
    /// prefix.
    pub fn datasets(&self) -> Result<Vec<String>> {
        let reader = self.store.begin_reader();
        let mut names = Vec::new();
        for entry in reader.range(&codec::schema_key_prefix()) {
            let (key, _) = entry?;
            names.push(codec::decode_schema_key(&key)?);
        }
        Ok(names)
    }

    /// Every sample name declared under `dataset`.
    pub fn samples_in(&self, dataset: &str) -> Result<Vec<String>> {
        let reader = self.store.begin_reader();
        let mut names = Vec::new();
        for entry in reader.range(&codec::dataset_sample_prefix(dataset)) {
            let (key, _) = entry?;
            let (_, sample) = codec::decode_sample_key(&key)?;
            names.push(sample);
        }
        Ok(names)
    }

    /// Maps every sample's data digest to the schema digest of the dataset
    /// it belongs to, by joining sample records against their dataset's
    /// schema record.
    pub fn data_hash_to_schema_hash(&self) -> Result<BTreeMap<DataDigest, SchemaDigest>> {
        let reader = self.store.begin_reader();
        let mut map = BTreeMap::new();
        for dataset in self.datasets()? {
            let schema_key = codec::encode_schema_key(&dataset);
            let Some(value) = reader.get(&schema_key)? else { continue };
            let schema_hash = codec::decode_schema_value(&value)?.schema_hash;

            for entry in reader.range(&codec::dataset_sample_prefix(&dataset)) {
                let (_key, value) = entry?;
                let digest = codec::decode_data_digest_value(&value)?;
                map.insert(digest, schema_hash);
            }
        }
        Ok(map)
    }

    /// Every distinct metadata blob digest referenced by a `"l:"` record.
    pub fn metadata_hashes(&self) -> Result<BTreeSet<MetaDigest>> {
        let reader = self.store.begin_reader();
        let prefix = codec::meta_key_prefix();
        let mut digests = BTreeSet::new();
        for entry in reader.range(&prefix) {
            let (key, value) = entry?;
            if key == prefix {
                // The total-metadata-count record shares this prefix exactly.
                continue;
            }
            let s = String::from_utf8_lossy(&value).into_owned();
            if let Some(digest) = MetaDigest::try_from_hex(&s) {
                digests.insert(digest);
            }
        }
        Ok(digests)
    }

    /// Every distinct schema digest among declared dataset schemas.
    pub fn schema_hashes(&self) -> Result<BTreeSet<SchemaDigest>> {
        let reader = self.store.begin_reader();
        let mut digests = BTreeSet::new();
        for entry in reader.range(&codec::schema_key_prefix()) {
            let (_key, value) = entry?;
            digests.insert(codec::decode_schema_value(&value)?.schema_hash);
        }
        Ok(digests)
    }
}
