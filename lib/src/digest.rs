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

//! Content digests.
//!
//! One digest type is shared by tensor data, metadata blobs, schema blobs
//! and commits: a fixed 20-byte BLAKE2b-160 hash, displayed and parsed as a
//! 40-character lowercase hex string. All four semantic uses (`DataDigest`,
//! `MetaDigest`, `SchemaDigest`, `CommitDigest`) are newtypes over the same
//! representation so digests cannot be silently mixed up between unrelated
//! record classes.

use blake2::Blake2bVar;
use blake2::digest::Update;
use blake2::digest::VariableOutput;

use crate::hex_util;

/// Number of raw bytes in a digest (BLAKE2b-160).
pub const DIGEST_LEN: usize = 20;

/// Computes the BLAKE2b-160 digest of `data`.
pub fn hash_bytes(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Blake2bVar::new(DIGEST_LEN).expect("20 is a valid Blake2b output size");
    hasher.update(data);
    let mut out = [0u8; DIGEST_LEN];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches configured size");
    out
}

/// Computes the BLAKE2b-160 digest of the concatenation of `parts`, in order,
/// without allocating an intermediate buffer.
pub fn hash_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> [u8; DIGEST_LEN] {
    let mut hasher = Blake2bVar::new(DIGEST_LEN).expect("20 is a valid Blake2b output size");
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_LEN];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches configured size");
    out
}

macro_rules! digest_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; DIGEST_LEN]);

        impl $name {
            pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
                Self(bytes)
            }

            pub fn of(data: &[u8]) -> Self {
                Self(hash_bytes(data))
            }

            pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
                &self.0
            }

            pub fn hex(&self) -> String {
                hex_util::encode_hex(&self.0)
            }

            pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
                let bytes = hex_util::decode_hex(hex)?;
                let bytes: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
                Some(Self(bytes))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.hex()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::HangarError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from_hex(s).ok_or_else(|| crate::error::HangarError::MalformedRecord {
                    reason: format!("{} is not a valid {} hex digest", s, stringify!($name)),
                })
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
            S: serde::Serializer,
            {
                self.hex().serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
            D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::try_from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid hex digest: {s}")))
            }
        }
    };
}

digest_type!(
    /// Content address of raw tensor bytes.
    DataDigest
);
digest_type!(
    /// Content address of a metadata (label) blob.
    MetaDigest
);
digest_type!(
    /// Content address of a JSON-encoded schema blob.
    SchemaDigest
);
digest_type!(
    /// Content address of a commit (parents || compressed refs || compressed spec).
    CommitDigest
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let d = DataDigest::of(b"hello world");
        let hex = d.hex();
        assert_eq!(hex.len(), DIGEST_LEN * 2);
        assert_eq!(DataDigest::try_from_hex(&hex), Some(d));
    }

    #[test]
    fn deterministic() {
        assert_eq!(DataDigest::of(b"abc"), DataDigest::of(b"abc"));
        assert_ne!(DataDigest::of(b"abc"), DataDigest::of(b"abd"));
    }

    #[test]
    fn hash_parts_matches_concatenation() {
        let a = hash_parts([b"foo".as_slice(), b"bar".as_slice()]);
        let b = hash_bytes(b"foobar");
        assert_eq!(a, b);
    }

    #[test]
    fn bad_hex_rejected() {
        assert_eq!(DataDigest::try_from_hex("zz"), None);
        assert_eq!(DataDigest::try_from_hex("ab"), None); // too short
    }
}
