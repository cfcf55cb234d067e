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

//! Key/value encoding for every record class of the record key namespace.
//! Pure, allocation-light, no I/O: one `encode_*`/`decode_*` pair per
//! record class, deterministic so that digest-addressed ref lists are
//! reproducible.

use serde::Deserialize;
use serde::Serialize;

use crate::digest::CommitDigest;
use crate::digest::DataDigest;
use crate::digest::MetaDigest;
use crate::digest::SchemaDigest;
use crate::error::HangarError;
use crate::error::Result;
use crate::schema::DatasetSchema;

/// Separator between key components (e.g. `"a:" + name`).
pub const SEP_KEY: u8 = b':';
/// Separator between elements of a joined list value (e.g. backend spec
/// fields).
pub const SEP_LST: u8 = b' ';
/// Separator between the two parent digests of a merge commit.
pub const SEP_CMT: &str = " << ";

const HEAD_KEY: &[u8] = b"head";
const BRANCH_PREFIX: &[u8] = b"branch:";
const WRITERLOCK_KEY: &[u8] = b"writerlock:";
pub const LOCK_AVAILABLE: &[u8] = b"LOCK_AVAILABLE";
const REMOTE_PREFIX: &[u8] = b"remote:";
const SCHEMA_PREFIX: &[u8] = b"s:";
const SAMPLE_PREFIX: &[u8] = b"a:";
const META_PREFIX: &[u8] = b"l:";
const HASH_PREFIX: &[u8] = b"h:";
const REF_SUFFIX: &[u8] = b":ref";
const SPEC_SUFFIX: &[u8] = b":spec";

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| HangarError::MalformedRecord {
            reason: format!("{what} is not valid UTF-8"),
        })
}

// ---- Head pointer ---------------------------------------------------

pub fn head_key() -> Vec<u8> {
    HEAD_KEY.to_vec()
}

pub fn encode_head_value(branch_name: &str) -> Vec<u8> {
    [BRANCH_PREFIX, branch_name.as_bytes()].concat()
}

pub fn decode_head_value(value: &[u8]) -> Result<String> {
    let rest = value
        .strip_prefix(BRANCH_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "head value missing branch prefix".into(),
        })?;
    utf8(rest, "head value")
}

// ---- Branch head ------------------------------------------------------

pub fn encode_branch_key(name: &str) -> Vec<u8> {
    [BRANCH_PREFIX, name.as_bytes()].concat()
}

pub fn decode_branch_key(key: &[u8]) -> Result<String> {
    let rest = key
        .strip_prefix(BRANCH_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a branch key".into(),
        })?;
    utf8(rest, "branch name")
}

pub fn encode_commit_digest_value(digest: &CommitDigest) -> Vec<u8> {
    digest.hex().into_bytes()
}

pub fn decode_commit_digest_value(value: &[u8]) -> Result<CommitDigest> {
    let s = utf8(value, "commit digest")?;
    CommitDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid commit digest"),
    })
}

// ---- Writer lock --------------------------------------------------------

pub fn writer_lock_key() -> Vec<u8> {
    WRITERLOCK_KEY.to_vec()
}

// ---- Remote -------------------------------------------------------------

pub fn encode_remote_key(name: &str) -> Vec<u8> {
    [REMOTE_PREFIX, name.as_bytes()].concat()
}

pub fn decode_remote_key(key: &[u8]) -> Result<String> {
    let rest = key
        .strip_prefix(REMOTE_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a remote key".into(),
        })?;
    utf8(rest, "remote name")
}

pub fn remote_prefix() -> Vec<u8> {
    REMOTE_PREFIX.to_vec()
}

// ---- Dataset schema -------------------------------------------------------

pub fn encode_schema_key(dataset: &str) -> Vec<u8> {
    [SCHEMA_PREFIX, dataset.as_bytes()].concat()
}

pub fn decode_schema_key(key: &[u8]) -> Result<String> {
    let rest = key
        .strip_prefix(SCHEMA_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a schema key".into(),
        })?;
    utf8(rest, "dataset name")
}

pub fn encode_schema_value(schema: &DatasetSchema) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(schema)?)
}

pub fn decode_schema_value(value: &[u8]) -> Result<DatasetSchema> {
    Ok(serde_json::from_slice(value)?)
}

pub fn schema_key_prefix() -> Vec<u8> {
    SCHEMA_PREFIX.to_vec()
}

// ---- Dataset record (sample) ---------------------------------------------

pub fn encode_sample_key(dataset: &str, sample: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(SAMPLE_PREFIX.len() + dataset.len() + sample.len() + 1);
    key.extend_from_slice(SAMPLE_PREFIX);
    key.extend_from_slice(dataset.as_bytes());
    key.push(SEP_KEY);
    key.extend_from_slice(sample.as_bytes());
    key
}

pub fn decode_sample_key(key: &[u8]) -> Result<(String, String)> {
    let rest = key
        .strip_prefix(SAMPLE_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a sample key".into(),
        })?;
    let idx = rest
        .iter()
        .position(|&b| b == SEP_KEY)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "sample key missing separator".into(),
        })?;
    let dataset = utf8(&rest[..idx], "dataset name")?;
    let sample = utf8(&rest[idx + 1..], "sample name")?;
    Ok((dataset, sample))
}

pub fn encode_data_digest_value(digest: &DataDigest) -> Vec<u8> {
    digest.hex().into_bytes()
}

pub fn decode_data_digest_value(value: &[u8]) -> Result<DataDigest> {
    let s = utf8(value, "data digest")?;
    DataDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid data digest"),
    })
}

/// Key shape of a sample range scan restricted to one dataset
/// (`"a:" + dataset + ":"`), used by [`crate::query`].
pub fn dataset_sample_prefix(dataset: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(SAMPLE_PREFIX.len() + dataset.len() + 1);
    key.extend_from_slice(SAMPLE_PREFIX);
    key.extend_from_slice(dataset.as_bytes());
    key.push(SEP_KEY);
    key
}

// ---- Dataset count / total dataset count ---------------------------------

pub fn encode_dataset_count_key(dataset: &str) -> Vec<u8> {
    [SAMPLE_PREFIX, dataset.as_bytes()].concat()
}

pub fn total_dataset_count_key() -> Vec<u8> {
    SAMPLE_PREFIX.to_vec()
}

pub fn encode_count_value(n: u64) -> Vec<u8> {
    n.to_string().into_bytes()
}

pub fn decode_count_value(value: &[u8]) -> Result<u64> {
    let s = utf8(value, "count")?;
    s.parse().map_err(|_| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid decimal count"),
    })
}

// ---- Metadata record / metadata count -------------------------------------

pub fn encode_meta_key(name: &str) -> Vec<u8> {
    [META_PREFIX, name.as_bytes()].concat()
}

pub fn decode_meta_key(key: &[u8]) -> Result<String> {
    let rest = key
        .strip_prefix(META_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a metadata key".into(),
        })?;
    utf8(rest, "metadata name")
}

pub fn total_meta_count_key() -> Vec<u8> {
    META_PREFIX.to_vec()
}

pub fn meta_key_prefix() -> Vec<u8> {
    META_PREFIX.to_vec()
}

// ---- Hash -> location / blob -----------------------------------------------

pub fn encode_hash_key(digest: &DataDigest) -> Vec<u8> {
    [HASH_PREFIX, digest.hex().as_bytes()].concat()
}

pub fn decode_hash_key(key: &[u8]) -> Result<DataDigest> {
    let rest = key
        .strip_prefix(HASH_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a hash key".into(),
        })?;
    let s = utf8(rest, "hash key")?;
    DataDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid data digest"),
    })
}

pub fn hash_key_prefix() -> Vec<u8> {
    HASH_PREFIX.to_vec()
}

/// Key of a content-addressed schema blob in the hash store: `"s:" + digest`.
pub fn encode_schema_hash_key(digest: &SchemaDigest) -> Vec<u8> {
    [SCHEMA_PREFIX, digest.hex().as_bytes()].concat()
}

pub fn decode_schema_hash_key(key: &[u8]) -> Result<SchemaDigest> {
    let rest = key
        .strip_prefix(SCHEMA_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a schema hash key".into(),
        })?;
    let s = utf8(rest, "schema hash key")?;
    SchemaDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid schema digest"),
    })
}

/// Key of a metadata blob in the label store:
/// `"h:" + digest`.
pub fn encode_meta_hash_key(digest: &MetaDigest) -> Vec<u8> {
    [HASH_PREFIX, digest.hex().as_bytes()].concat()
}

pub fn decode_meta_hash_key(key: &[u8]) -> Result<MetaDigest> {
    let rest = key
        .strip_prefix(HASH_PREFIX)
        .ok_or_else(|| HangarError::MalformedRecord {
            reason: "not a meta hash key".into(),
        })?;
    let s = utf8(rest, "meta hash key")?;
    MetaDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid metadata digest"),
    })
}

// ---- Commit parent / ref / spec --------------------------------------------

/// Parent linkage of a commit: root (no parent), a
/// single regular parent, or two parents for a merge commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitParents {
    Root,
    Single(CommitDigest),
    Merge(CommitDigest, CommitDigest),
}

pub fn encode_commit_key(digest: &CommitDigest) -> Vec<u8> {
    digest.hex().into_bytes()
}

pub fn decode_commit_key(key: &[u8]) -> Result<CommitDigest> {
    let s = utf8(key, "commit key")?;
    CommitDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
        reason: format!("{s} is not a valid commit digest"),
    })
}

pub fn encode_commit_parents_value(parents: &CommitParents) -> Vec<u8> {
    match parents {
        CommitParents::Root => Vec::new(),
        CommitParents::Single(p) => p.hex().into_bytes(),
        CommitParents::Merge(master, dev) => format!("{}{SEP_CMT}{}", master.hex(), dev.hex()).into_bytes(),
    }
}

pub fn decode_commit_parents_value(value: &[u8]) -> Result<CommitParents> {
    if value.is_empty() {
        return Ok(CommitParents::Root);
    }
    let s = utf8(value, "commit parents")?;
    if let Some((master, dev)) = s.split_once(SEP_CMT) {
        let master = CommitDigest::try_from_hex(master).ok_or_else(|| HangarError::MalformedRecord {
            reason: format!("{master} is not a valid commit digest"),
        })?;
        let dev = CommitDigest::try_from_hex(dev).ok_or_else(|| HangarError::MalformedRecord {
            reason: format!("{dev} is not a valid commit digest"),
        })?;
        Ok(CommitParents::Merge(master, dev))
    } else {
        let p = CommitDigest::try_from_hex(&s).ok_or_else(|| HangarError::MalformedRecord {
            reason: format!("{s} is not a valid commit digest"),
        })?;
        Ok(CommitParents::Single(p))
    }
}

pub fn encode_commit_ref_key(digest: &CommitDigest) -> Vec<u8> {
    [digest.hex().as_bytes(), REF_SUFFIX].concat()
}

pub fn encode_commit_spec_key(digest: &CommitDigest) -> Vec<u8> {
    [digest.hex().as_bytes(), SPEC_SUFFIX].concat()
}

/// Serializable (time, message, user, email) commit metadata, JSON-encoded then compressed by [`crate::commit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSpec {
    pub time: u64,
    pub message: String,
    pub user: String,
    pub email: String,
}

pub fn encode_commit_spec(spec: &CommitSpec) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(spec)?)
}

pub fn decode_commit_spec(value: &[u8]) -> Result<CommitSpec> {
    Ok(serde_json::from_slice(value)?)
}

/// A raw (key, value) record pair as stored in an unpacked ref store or the
/// stage-ref store; the unit a commit ref list is made of.
pub type RecordKv = (Vec<u8>, Vec<u8>);

pub fn encode_ref_list(records: &[RecordKv]) -> Result<Vec<u8>> {
    bincode::serialize(records).map_err(|e| HangarError::Encoding(e.to_string()))
}

pub fn decode_ref_list(bytes: &[u8]) -> Result<Vec<RecordKv>> {
    bincode::deserialize(bytes).map_err(|e| HangarError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_roundtrip() {
        let v = encode_head_value("master");
        assert_eq!(decode_head_value(&v).unwrap(), "master");
    }

    #[test]
    fn branch_key_roundtrip() {
        let k = encode_branch_key("feature-x");
        assert_eq!(decode_branch_key(&k).unwrap(), "feature-x");
    }

    #[test]
    fn sample_key_roundtrip() {
        let k = encode_sample_key("ds1", "sample:with:colons");
        let (ds, sample) = decode_sample_key(&k).unwrap();
        assert_eq!(ds, "ds1");
        assert_eq!(sample, "sample:with:colons");
    }

    #[test]
    fn count_value_roundtrip() {
        let v = encode_count_value(42);
        assert_eq!(decode_count_value(&v).unwrap(), 42);
    }

    #[test]
    fn commit_parents_roundtrip_root() {
        let v = encode_commit_parents_value(&CommitParents::Root);
        assert_eq!(decode_commit_parents_value(&v).unwrap(), CommitParents::Root);
    }

    #[test]
    fn commit_parents_roundtrip_single() {
        let p = CommitDigest::of(b"c0");
        let v = encode_commit_parents_value(&CommitParents::Single(p));
        assert_eq!(decode_commit_parents_value(&v).unwrap(), CommitParents::Single(p));
    }

    #[test]
    fn commit_parents_roundtrip_merge() {
        let a = CommitDigest::of(b"master");
        let b = CommitDigest::of(b"dev");
        let v = encode_commit_parents_value(&CommitParents::Merge(a, b));
        assert_eq!(decode_commit_parents_value(&v).unwrap(), CommitParents::Merge(a, b));
    }

    #[test]
    fn ref_list_roundtrip() {
        let records: Vec<RecordKv> = vec![
            (b"a:ds1:s0".to_vec(), b"deadbeef".to_vec()),
            (b"s:ds1".to_vec(), b"{}".to_vec()),
        ];
        let encoded = encode_ref_list(&records).unwrap();
        assert_eq!(decode_ref_list(&encoded).unwrap(), records);
    }

    #[test]
    fn malformed_record_rejected() {
        assert!(decode_count_value(b"not-a-number").is_err());
        assert!(decode_branch_key(b"not-a-branch-key").is_err());
    }
}
