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

//! Pluggable tensor backends: a closed registry keyed by a short tag, each
//! entry a capability object scoped to reading/writing raw tensor bytes.

mod localfs;

use std::collections::HashMap;
use std::sync::Arc;

pub use localfs::LocalFsBackend;
use serde::Deserialize;
use serde::Serialize;

use crate::digest::DataDigest;
use crate::error::HangarError;
use crate::error::Result;

/// A typed n-dimensional array's bytes plus the minimal metadata needed to
/// reinterpret them (a dtype code and a shape). Carries
/// `serde` impls so it can travel as-is over the sync protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    pub dtype: u8,
    pub shape: Vec<u64>,
    pub bytes: Vec<u8>,
}

/// A pluggable accessor capability for one backend tag:
/// `{open, read_data, write_data}`.
pub trait TensorBackend: Send + Sync {
    /// The short tag recorded in `schema_default_backend` and as the first
    /// field of every location spec this backend produces.
    fn tag(&self) -> &'static str;

    /// Writes `tensor`'s bytes under the content address `digest`, returning
    /// the opaque location spec to record as the value of `"h:" + digest`.
    fn write_data(&self, digest: &DataDigest, tensor: &Tensor) -> Result<Vec<u8>>;

    /// Reads the tensor described by a previously-returned location spec.
    fn read_data(&self, spec: &[u8]) -> Result<Tensor>;
}

/// Closed enumeration of backends, keyed by tag, registered at construction
/// time.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn TensorBackend>>,
}

impl BackendRegistry {
    /// A registry carrying only the reference `localfs` backend (tag
    /// `"00"`), rooted at `store_dir`.
    pub fn with_localfs(store_dir: std::path::PathBuf) -> Self {
        let mut backends: HashMap<&'static str, Arc<dyn TensorBackend>> = HashMap::new();
        let backend = Arc::new(LocalFsBackend::new(store_dir));
        backends.insert(backend.tag(), backend);
        Self { backends }
    }

    pub fn register(&mut self, backend: Arc<dyn TensorBackend>) {
        self.backends.insert(backend.tag(), backend);
    }

    pub fn get(&self, tag: &str) -> Result<Arc<dyn TensorBackend>> {
        self.backends
            .get(tag)
            .cloned()
            .ok_or_else(|| HangarError::MalformedRecord {
                reason: format!("unknown backend tag {tag:?}"),
            })
    }
}

/// Extracts the backend tag (the first `SEP_LST`-delimited field) from an
/// opaque location spec, shared by [`crate::hashstore`] and
/// [`crate::commit::CommitEngine`]'s payload migration.
pub fn tag_of_spec(spec: &[u8]) -> Result<String> {
    let idx = spec.iter().position(|&b| b == crate::codec::SEP_LST).unwrap_or(spec.len());
    std::str::from_utf8(&spec[..idx])
        .map(str::to_owned)
        .map_err(|_| HangarError::MalformedRecord {
            reason: "location spec tag is not valid UTF-8".into(),
        })
}
