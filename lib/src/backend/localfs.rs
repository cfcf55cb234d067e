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

//! Reference backend: stores each tensor as a single flat file named
//! by its content digest under `data/store_data/`, using the
//! temp-file-then-atomic-rename pattern for crash safety.

use std::fs;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;

use super::Tensor;
use super::TensorBackend;
use crate::codec::SEP_LST;
use crate::digest::DataDigest;
use crate::error::HangarError;
use crate::error::Result;
use crate::file_util;

/// Two-character numeric backend tag.
const TAG: &str = "00";

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, digest: &DataDigest) -> PathBuf {
        self.root.join(format!("{}.tensor", digest.hex()))
    }

    fn encode_spec(&self, digest: &DataDigest, tensor: &Tensor) -> Vec<u8> {
        let mut spec = Vec::new();
        spec.extend_from_slice(TAG.as_bytes());
        spec.push(SEP_LST);
        spec.extend_from_slice(tensor.dtype.to_string().as_bytes());
        spec.push(SEP_LST);
        let shape = tensor
            .shape
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        spec.extend_from_slice(shape.as_bytes());
        spec.push(SEP_LST);
        spec.extend_from_slice(digest.hex().as_bytes());
        spec
    }

    fn decode_spec(&self, spec: &[u8]) -> Result<(u8, Vec<u64>, PathBuf)> {
        let s = std::str::from_utf8(spec).map_err(|_| HangarError::MalformedRecord {
            reason: "location spec is not valid UTF-8".into(),
        })?;
        let mut fields = s.split(' ');
        let malformed = || HangarError::MalformedRecord {
            reason: format!("malformed localfs location spec: {s:?}"),
        };
        let tag = fields.next().ok_or_else(malformed)?;
        if tag != TAG {
            return Err(malformed());
        }
        let dtype: u8 = fields.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
        let shape: Vec<u64> = fields
            .next()
            .ok_or_else(malformed)?
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| malformed()))
            .collect::<Result<_>>()?;
        let digest_hex = fields.next().ok_or_else(malformed)?;
        let path = self.root.join(format!("{digest_hex}.tensor"));
        Ok((dtype, shape, path))
    }
}

impl TensorBackend for LocalFsBackend {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn write_data(&self, digest: &DataDigest, tensor: &Tensor) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.root).map_err(|source| HangarError::Path {
            path: self.root.clone(),
            source,
        })?;
        let dest = self.path_for(digest);
        if !dest.exists() {
            let mut temp = tempfile::NamedTempFile::new_in(&self.root).map_err(|source| HangarError::Path {
                path: self.root.clone(),
                source,
            })?;
            temp.write_all(&tensor.bytes)?;
            file_util::persist_content_addressed_temp_file(temp, &dest)?;
        }
        Ok(self.encode_spec(digest, tensor))
    }

    fn read_data(&self, spec: &[u8]) -> Result<Tensor> {
        let (dtype, shape, path) = self.decode_spec(spec)?;
        let mut file = File::open(&path).map_err(|source| HangarError::Path { path: path.clone(), source })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| HangarError::Path { path, source })?;
        Ok(Tensor { dtype, shape, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path().to_path_buf());
        let tensor = Tensor {
            dtype: 5,
            shape: vec![2, 2],
            bytes: vec![1, 2, 3, 4],
        };
        let digest = DataDigest::of(&tensor.bytes);
        let spec = backend.write_data(&digest, &tensor).unwrap();
        let read_back = backend.read_data(&spec).unwrap();
        assert_eq!(read_back, tensor);
    }

    #[test]
    fn write_is_noop_if_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path().to_path_buf());
        let tensor = Tensor {
            dtype: 5,
            shape: vec![4],
            bytes: vec![9, 9, 9, 9],
        };
        let digest = DataDigest::of(&tensor.bytes);
        backend.write_data(&digest, &tensor).unwrap();
        let spec2 = backend.write_data(&digest, &tensor).unwrap();
        let read_back = backend.read_data(&spec2).unwrap();
        assert_eq!(read_back.bytes, tensor.bytes);
    }
}
