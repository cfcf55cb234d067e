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

//! The schema spec recorded alongside a dataset.

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::digest::SchemaDigest;

/// The declared shape/type contract of a dataset. Serializes to the JSON
/// blob stored as the value of a `"s:" + dataset-name` record and, digested,
/// as the value behind its `"h:" + digest` hash-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub schema_uuid: Uuid,
    pub schema_hash: SchemaDigest,
    pub schema_dtype: u8,
    pub schema_is_var: bool,
    pub schema_max_shape: Vec<u64>,
    pub schema_is_named: bool,
    pub schema_default_backend: String,
}

impl DatasetSchema {
    /// Builds a new schema, computing `schema_hash` from the rest of the
    /// fields so two schemas with identical shape/dtype/backend always
    /// digest identically regardless of their random `schema_uuid`.
    pub fn new(
        schema_dtype: u8,
        schema_is_var: bool,
        schema_max_shape: Vec<u64>,
        schema_is_named: bool,
        schema_default_backend: impl Into<String>,
    ) -> Self {
        let schema_default_backend = schema_default_backend.into();
        let schema_hash = Self::compute_hash(
            schema_dtype,
            schema_is_var,
            &schema_max_shape,
            schema_is_named,
            &schema_default_backend,
        );
        Self {
            schema_uuid: Uuid::new_v4(),
            schema_hash,
            schema_dtype,
            schema_is_var,
            schema_max_shape,
            schema_is_named,
            schema_default_backend,
        }
    }

    fn compute_hash(
        dtype: u8,
        is_var: bool,
        max_shape: &[u64],
        is_named: bool,
        backend: &str,
    ) -> SchemaDigest {
        let mut buf = Vec::new();
        buf.push(dtype);
        buf.push(is_var as u8);
        for dim in max_shape {
            buf.extend_from_slice(&dim.to_le_bytes());
        }
        buf.push(is_named as u8);
        buf.extend_from_slice(backend.as_bytes());
        SchemaDigest::from_bytes(crate::digest::hash_bytes(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_shapes_hash_equal() {
        let a = DatasetSchema::new(5, false, vec![4], true, "00");
        let b = DatasetSchema::new(5, false, vec![4], true, "00");
        assert_eq!(a.schema_hash, b.schema_hash);
        assert_ne!(a.schema_uuid, b.schema_uuid);
    }

    #[test]
    fn differing_shapes_hash_differ() {
        let a = DatasetSchema::new(5, false, vec![4], true, "00");
        let b = DatasetSchema::new(5, false, vec![5], true, "00");
        assert_ne!(a.schema_hash, b.schema_hash);
    }

    #[test]
    fn json_roundtrip() {
        let schema = DatasetSchema::new(5, true, vec![10, 10], false, "00");
        let json = serde_json::to_vec(&schema).unwrap();
        let back: DatasetSchema = serde_json::from_slice(&json).unwrap();
        assert_eq!(schema, back);
    }
}
